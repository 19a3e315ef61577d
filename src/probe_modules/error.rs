use thiserror::Error;

/// Failure of a single probe. Folded into a zero reading at the cycle boundary.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Connect to {target} failed: {reason}")]
    ConnectFailure { target: String, reason: String },
    #[error("TLS validation for {target} failed: {reason}")]
    TlsValidationFailure { target: String, reason: String },
    #[error("Probe I/O with {target} failed: {reason}")]
    ProbeFailure { target: String, reason: String },
}

impl ProbeError {
    pub fn connect(target: impl ToString, reason: impl ToString) -> Self {
        ProbeError::ConnectFailure {
            target: target.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn tls(target: impl ToString, reason: impl ToString) -> Self {
        ProbeError::TlsValidationFailure {
            target: target.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn io(target: impl ToString, reason: impl ToString) -> Self {
        ProbeError::ProbeFailure {
            target: target.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Short label used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            ProbeError::ConnectFailure { .. } => "connect_failure",
            ProbeError::TlsValidationFailure { .. } => "tls_validation_failure",
            ProbeError::ProbeFailure { .. } => "probe_failure",
        }
    }
}

#[derive(Error, Debug)]
pub enum TlsSetupError {
    #[error("System trust store yielded no usable certificates ({0} load errors)")]
    EmptyTrustStore(usize),
    #[error("TLS client configuration failed: {0}")]
    Config(#[from] rustls::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse TOML from config file at {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Results log I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Results log CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Sink is closed")]
    Closed,
}
