use clap::Parser;
use std::error::Error;
use std::sync::Arc;
use tracing::{error, info};
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use speedwatch::probe_modules::config::{ConfigOverrides, ProbeConfig};
use speedwatch::probe_modules::scheduler::TargetScheduler;
use speedwatch::probe_modules::secure_channel::SecureConnector;
use speedwatch::probe_modules::sink::{ConsoleSink, FanoutSink, ResultSink, SheetLogSink};
use speedwatch::version::VERSION;

#[derive(Parser, Debug)]
#[command(author, about, long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Where to write the results table
    #[arg(long)]
    results: Option<String>,

    /// Directory for rolling log files
    #[arg(long)]
    log_dir: Option<String>,

    /// Pause between cycles of the same target, in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Print the version and exit
    #[arg(long)]
    version: bool,
}

fn init_logging(log_dir: &str) {
    // Log to a file: JSON format, daily rotation
    let file_appender = rolling::daily(log_dir, "speedwatch.log");
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .json();

    // Log to stderr so stdout carries only the measurement display
    let console_layer = fmt::layer().with_writer(std::io::stderr);

    // Default to `info` level if RUST_LOG is not set.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let args = Args::parse();
    if args.version {
        println!("speedwatch version: {VERSION}");
        return Ok(());
    }

    let overrides = ConfigOverrides {
        results_path: args.results.clone(),
        log_dir: args.log_dir.clone(),
        interval_ms: args.interval_ms,
    };
    // Logging needs the log directory, so configuration problems found
    // before the subscriber exists go to stderr directly.
    let config = match ProbeConfig::load(args.config.as_deref(), &overrides) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return Err(e.into());
        }
    };

    init_logging(&config.log_dir);
    info!(version = VERSION, targets = config.targets.len(), "Starting speedwatch...");

    let connector = match SecureConnector::with_native_roots() {
        Ok(connector) => connector,
        Err(e) => {
            error!(error = %e, "Failed to build TLS client configuration.");
            return Err(e.into());
        }
    };

    let sheet_log = match SheetLogSink::create(&config.results_path) {
        Ok(sink) => Arc::new(sink),
        Err(e) => {
            error!(path = %config.results_path, error = %e, "Failed to create results log.");
            return Err(e.into());
        }
    };
    let sink: Arc<dyn ResultSink> = Arc::new(
        FanoutSink::new()
            .with(Arc::new(ConsoleSink::new()))
            .with(sheet_log.clone()),
    );

    let mut scheduler = TargetScheduler::start(
        config.targets.clone(),
        sink,
        connector,
        config.settings(),
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal, stopping now.");
    }
    info!("Shutdown signal received.");

    scheduler.stop().await;
    sheet_log.close().await;
    info!("speedwatch stopped.");
    Ok(())
}
