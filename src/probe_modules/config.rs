use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::probe_modules::error::ConfigError;
use crate::probe_modules::models::Target;

/// Fully resolved runtime configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeConfig {
    pub targets: Vec<Target>,
    pub interval_ms: u64,
    pub connect_timeout_ms: u64,
    pub io_timeout_ms: u64,
    pub stop_timeout_ms: Option<u64>,
    pub results_path: String,
    pub log_dir: String,
}

// Partial config for layering
#[derive(Deserialize, Default, Debug)]
#[serde(deny_unknown_fields)]
struct PartialProbeConfig {
    targets: Option<Vec<Target>>,
    interval_ms: Option<u64>,
    connect_timeout_ms: Option<u64>,
    io_timeout_ms: Option<u64>,
    stop_timeout_ms: Option<u64>,
    results_path: Option<String>,
    log_dir: Option<String>,
}

/// Values supplied on the command line; they win over the file.
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub results_path: Option<String>,
    pub log_dir: Option<String>,
    pub interval_ms: Option<u64>,
}

pub fn default_targets() -> Vec<Target> {
    vec![
        Target::new("www.pesuacademy.com", 443),
        Target::new("www.facebook.com", 443),
        Target::new("www.github.com", 443),
    ]
}

const DEFAULT_INTERVAL_MS: u64 = 1_000;
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_IO_TIMEOUT_MS: u64 = 5_000;

fn default_results_path() -> String {
    "speed_data.csv".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            targets: default_targets(),
            interval_ms: DEFAULT_INTERVAL_MS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            io_timeout_ms: DEFAULT_IO_TIMEOUT_MS,
            stop_timeout_ms: None,
            results_path: default_results_path(),
            log_dir: default_log_dir(),
        }
    }
}

impl PartialProbeConfig {
    /// Resolves the partial file values into a full config: overrides win,
    /// then the file, then the defaults. The result is validated.
    fn merge(self, overrides: &ConfigOverrides) -> Result<ProbeConfig, ConfigError> {
        let config = ProbeConfig {
            targets: self.targets.unwrap_or_else(default_targets),
            interval_ms: overrides
                .interval_ms
                .or(self.interval_ms)
                .unwrap_or(DEFAULT_INTERVAL_MS),
            connect_timeout_ms: self
                .connect_timeout_ms
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT_MS),
            io_timeout_ms: self.io_timeout_ms.unwrap_or(DEFAULT_IO_TIMEOUT_MS),
            stop_timeout_ms: self.stop_timeout_ms,
            results_path: overrides
                .results_path
                .clone()
                .or(self.results_path)
                .unwrap_or_else(default_results_path),
            log_dir: overrides
                .log_dir
                .clone()
                .or(self.log_dir)
                .unwrap_or_else(default_log_dir),
        };
        config.validate()?;
        Ok(config)
    }
}

impl ProbeConfig {
    /// Loads the optional TOML file, fills gaps with defaults and applies
    /// command line overrides. A path that does not exist yields defaults.
    pub fn load(
        config_path: Option<&str>,
        overrides: &ConfigOverrides,
    ) -> Result<Self, ConfigError> {
        let file_config: PartialProbeConfig = match config_path {
            Some(path_str) if Path::new(path_str).exists() => {
                let contents = fs::read_to_string(path_str).map_err(|source| ConfigError::Read {
                    path: path_str.to_string(),
                    source,
                })?;
                info!(path = %path_str, "Loaded config file.");
                Self::parse_partial(&contents, path_str)?
            }
            Some(path_str) => {
                warn!(path = %path_str, "Config file not found, using defaults.");
                PartialProbeConfig::default()
            }
            None => PartialProbeConfig::default(),
        };
        file_config.merge(overrides)
    }

    /// Parses TOML text on top of the defaults, without overrides.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Self::parse_partial(contents, "<inline>")?.merge(&ConfigOverrides::default())
    }

    fn parse_partial(contents: &str, path: &str) -> Result<PartialProbeConfig, ConfigError> {
        toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.targets.is_empty() {
            return Err(ConfigError::Invalid("at least one target is required".into()));
        }
        for target in &self.targets {
            if target.host.trim().is_empty() {
                return Err(ConfigError::Invalid("target host must not be empty".into()));
            }
            if target.port == 0 {
                return Err(ConfigError::Invalid(format!(
                    "target {} has port 0",
                    target.host
                )));
            }
        }
        if self.connect_timeout_ms == 0 || self.io_timeout_ms == 0 {
            return Err(ConfigError::Invalid("timeouts must be non-zero".into()));
        }
        if self.stop_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid("stop_timeout_ms must be non-zero".into()));
        }
        Ok(())
    }

    pub fn settings(&self) -> ProbeSettings {
        let connect_timeout = Duration::from_millis(self.connect_timeout_ms);
        let io_timeout = Duration::from_millis(self.io_timeout_ms);
        let interval = Duration::from_millis(self.interval_ms);
        let stop_timeout = match self.stop_timeout_ms {
            Some(ms) => Duration::from_millis(ms),
            None => ProbeSettings::worst_case_cycle(connect_timeout, io_timeout) + interval,
        };
        ProbeSettings {
            interval,
            connect_timeout,
            io_timeout,
            stop_timeout,
        }
    }
}

/// Timing envelope shared by every target's execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeSettings {
    /// Sleep between the end of one cycle and the start of the next.
    pub interval: Duration,
    /// Bound on a plain or TLS connect, handshake included.
    pub connect_timeout: Duration,
    /// Bound on each send and receive.
    pub io_timeout: Duration,
    /// How long `stop()` waits for in-flight cycles before aborting them.
    pub stop_timeout: Duration,
}

impl ProbeSettings {
    /// Upper bound for one cycle: latency connect, then two TLS probes each
    /// made of a connect, a send and a receive.
    pub fn worst_case_cycle(connect_timeout: Duration, io_timeout: Duration) -> Duration {
        connect_timeout * 3 + io_timeout * 4
    }
}

impl Default for ProbeSettings {
    fn default() -> Self {
        ProbeConfig::default().settings()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_reference_endpoints() {
        let config = ProbeConfig::default();
        assert_eq!(config.targets.len(), 3);
        assert!(config.targets.iter().all(|t| t.port == 443));
        assert_eq!(config.targets[2].host, "www.github.com");
        let settings = config.settings();
        assert_eq!(settings.interval, Duration::from_secs(1));
        assert_eq!(settings.connect_timeout, Duration::from_secs(5));
    }

    #[test]
    fn parses_targets_and_fills_defaults() {
        let config = ProbeConfig::from_toml_str(
            r#"
            interval_ms = 250

            [[targets]]
            host = "example.org"
            port = 8443
            "#,
        )
        .unwrap();
        assert_eq!(config.targets, vec![Target::new("example.org", 8443)]);
        assert_eq!(config.interval_ms, 250);
        assert_eq!(config.io_timeout_ms, DEFAULT_IO_TIMEOUT_MS);
        assert_eq!(config.results_path, "speed_data.csv");
    }

    #[test]
    fn rejects_empty_target_list() {
        let err = ProbeConfig::from_toml_str("targets = []").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_unknown_keys() {
        let err = ProbeConfig::from_toml_str("intervall_ms = 5").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn rejects_zero_port() {
        let err = ProbeConfig::from_toml_str(
            r#"
            [[targets]]
            host = "example.org"
            port = 0
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn overrides_win_over_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "interval_ms = 2000\nresults_path = \"file.csv\"").unwrap();
        let overrides = ConfigOverrides {
            results_path: Some("cli.csv".into()),
            log_dir: None,
            interval_ms: Some(10),
        };
        let config = ProbeConfig::load(file.path().to_str(), &overrides).unwrap();
        assert_eq!(config.results_path, "cli.csv");
        assert_eq!(config.interval_ms, 10);
        assert_eq!(config.log_dir, "logs");
    }

    #[test]
    fn file_and_inline_loading_resolve_identically() {
        let text = "interval_ms = 300\nio_timeout_ms = 700\nlog_dir = \"var/log\"\n\n\
                    [[targets]]\nhost = \"example.net\"\nport = 443\n";
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{text}").unwrap();

        let from_file =
            ProbeConfig::load(file.path().to_str(), &ConfigOverrides::default()).unwrap();
        let inline = ProbeConfig::from_toml_str(text).unwrap();
        assert_eq!(from_file, inline);
        assert_eq!(inline.connect_timeout_ms, DEFAULT_CONNECT_TIMEOUT_MS);
        assert_eq!(inline.log_dir, "var/log");
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config =
            ProbeConfig::load(Some("/nonexistent/speedwatch.toml"), &ConfigOverrides::default())
                .unwrap();
        assert_eq!(config, ProbeConfig::default());
    }

    #[test]
    fn stop_timeout_defaults_to_worst_case_cycle() {
        let settings = ProbeConfig::default().settings();
        assert_eq!(settings.stop_timeout, Duration::from_millis(5_000 * 3 + 5_000 * 4 + 1_000));
    }
}
