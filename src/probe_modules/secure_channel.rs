//! Validated TLS connections for the throughput probes.
//!
//! Certificates are checked against the system trust store (or an injected
//! root store) and the presented certificate must name the host that was
//! dialled. There is no opt-out.
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tracing::{debug, info, warn};

use crate::probe_modules::error::{ProbeError, TlsSetupError};

/// Shared TLS client configuration. Cloning is cheap.
#[derive(Clone)]
pub struct SecureConnector {
    connector: TlsConnector,
}

impl SecureConnector {
    /// Builds a connector trusting the platform's native root certificates.
    pub fn with_native_roots() -> Result<Self, TlsSetupError> {
        let loaded = rustls_native_certs::load_native_certs();
        for e in &loaded.errors {
            warn!(error = %e, "Failed to load a native certificate source.");
        }

        let mut roots = RootCertStore::empty();
        let (added, ignored) = roots.add_parsable_certificates(loaded.certs);
        if ignored > 0 {
            debug!(ignored, "Ignored unparsable native root certificates.");
        }
        if roots.is_empty() {
            return Err(TlsSetupError::EmptyTrustStore(loaded.errors.len()));
        }
        info!(roots = added, "Loaded system trust store.");
        Self::with_roots(roots)
    }

    /// Builds a connector trusting exactly `roots`.
    pub fn with_roots(roots: RootCertStore) -> Result<Self, TlsSetupError> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .with_root_certificates(roots)
            .with_no_client_auth();
        Ok(Self {
            connector: TlsConnector::from(Arc::new(config)),
        })
    }

    /// Connects to `host:port` and completes a verified handshake, both within
    /// `timeout`. The TCP socket is dropped, and so closed, on every error path.
    pub async fn open(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<SecureChannel, ProbeError> {
        let peer = format!("{host}:{port}");
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|e| ProbeError::tls(&peer, format!("invalid server name: {e}")))?;

        let tcp = match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(ProbeError::connect(&peer, e)),
            Err(_) => {
                return Err(ProbeError::connect(
                    &peer,
                    format!("connect timed out after {timeout:?}"),
                ));
            }
        };

        let handshake = self.connector.connect(server_name, tcp);
        let stream = match tokio::time::timeout(timeout, handshake).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(ProbeError::tls(&peer, e)),
            Err(_) => {
                return Err(ProbeError::tls(
                    &peer,
                    format!("handshake timed out after {timeout:?}"),
                ));
            }
        };

        debug!(peer = %peer, "TLS session established.");
        Ok(SecureChannel { stream, peer })
    }
}

/// An established, verified TLS byte stream.
pub struct SecureChannel {
    stream: TlsStream<TcpStream>,
    peer: String,
}

impl SecureChannel {
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Writes all of `bytes` and flushes them.
    pub async fn send(&mut self, bytes: &[u8], timeout: Duration) -> Result<(), ProbeError> {
        let Self { stream, peer } = self;
        let write = async {
            stream.write_all(bytes).await?;
            stream.flush().await
        };
        match tokio::time::timeout(timeout, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ProbeError::io(&*peer, format!("send failed: {e}"))),
            Err(_) => Err(ProbeError::io(
                &*peer,
                format!("send timed out after {timeout:?}"),
            )),
        }
    }

    /// Performs a single read of at most `max_bytes`. An empty result means
    /// the peer closed the stream.
    pub async fn receive(
        &mut self,
        max_bytes: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>, ProbeError> {
        let mut buf = vec![0u8; max_bytes];
        match tokio::time::timeout(timeout, self.stream.read(&mut buf)).await {
            Ok(Ok(n)) => {
                buf.truncate(n);
                Ok(buf)
            }
            Ok(Err(e)) => Err(ProbeError::io(&self.peer, format!("receive failed: {e}"))),
            Err(_) => Err(ProbeError::io(
                &self.peer,
                format!("receive timed out after {timeout:?}"),
            )),
        }
    }

    /// Sends close_notify and shuts the socket down. Best effort: the socket
    /// is released when `self` drops regardless of the outcome.
    pub async fn close(mut self, timeout: Duration) {
        if let Ok(Err(e)) = tokio::time::timeout(timeout, self.stream.shutdown()).await {
            debug!(peer = %self.peer, error = %e, "TLS shutdown was not clean.");
        }
    }
}
