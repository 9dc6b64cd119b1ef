//! Per-destination message forwarders and the retry policy around them.

mod tcp;
mod udp;

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::time::{sleep, Duration};
use tracing::warn;

use crate::config::{DestinationConfig, Protocol};
use crate::error::RelayError;
use crate::message::{MessageFormat, SyslogMessage};
use crate::metrics::Metrics;

use tcp::TcpForwarder;
use udp::UdpForwarder;

enum Connection {
    Udp(UdpForwarder),
    Tcp(TcpForwarder),
}

impl Connection {
    fn is_connected(&self) -> bool {
        match self {
            Connection::Udp(f) => f.is_connected(),
            Connection::Tcp(f) => f.is_connected(),
        }
    }

    async fn connect(&mut self) -> Result<(), RelayError> {
        match self {
            Connection::Udp(f) => f.connect().await,
            Connection::Tcp(f) => f.connect().await,
        }
    }

    fn disconnect(&mut self) {
        match self {
            Connection::Udp(f) => f.disconnect(),
            Connection::Tcp(f) => f.disconnect(),
        }
    }

    async fn send(&mut self, data: &[u8]) -> Result<(), RelayError> {
        match self {
            Connection::Udp(f) => f.send(data).await,
            Connection::Tcp(f) => f.send(data).await,
        }
    }
}

/// Forwards messages to a single configured destination, reconnecting and
/// retrying with exponential backoff on failure.
pub struct Forwarder {
    name: String,
    format: MessageFormat,
    max_attempts: u32,
    backoff_seconds: f64,
    metrics: Arc<Metrics>,
    connection: Mutex<Connection>,
}

impl Forwarder {
    pub fn new(config: &DestinationConfig, metrics: Arc<Metrics>) -> Result<Self, RelayError> {
        let host = config.host().to_string();
        let port = config.port();

        let connection = match config.protocol {
            Protocol::Udp => Connection::Udp(UdpForwarder::new(host, port)),
            Protocol::Tcp => Connection::Tcp(TcpForwarder::new(host, port)),
            Protocol::Tls => {
                return Err(RelayError::unsupported(format!(
                    "destination '{}': tls transport is not implemented",
                    config.name
                )))
            }
        };

        Ok(Self {
            name: config.name.clone(),
            format: config.format,
            max_attempts: config.retry.max_attempts,
            backoff_seconds: config.retry.backoff_seconds,
            metrics,
            connection: Mutex::new(connection),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Proactively establish the connection. `send_with_retry` would otherwise
    /// connect lazily on first use; calling this at startup matches the
    /// documented `start()` ordering (connect outputs, then start inputs).
    pub async fn connect(&self) {
        let mut conn = self.connection.lock().await;
        if !conn.is_connected() {
            match conn.connect().await {
                Ok(()) => self.metrics.set_destination_up(&self.name, true),
                Err(e) => {
                    warn!(destination = %self.name, error = %e, "failed to connect output at startup");
                    self.metrics.set_destination_up(&self.name, false);
                }
            }
        }
    }

    pub async fn disconnect(&self) {
        let mut conn = self.connection.lock().await;
        conn.disconnect();
        self.metrics.set_destination_up(&self.name, false);
    }

    /// Send `message`, retrying with exponential backoff up to `max_attempts` times.
    /// Each retry sleeps `backoff_seconds * 2^attempt_index` before the next attempt;
    /// no sleep follows the final attempt.
    pub async fn send_with_retry(&self, message: &SyslogMessage) -> Result<(), RelayError> {
        let data = message.serialize(self.format);
        let mut last_err = None;

        for attempt in 0..self.max_attempts {
            let mut conn = self.connection.lock().await;

            if !conn.is_connected() {
                if let Err(e) = conn.connect().await {
                    self.metrics.set_destination_up(&self.name, false);
                    last_err = Some(e);
                    drop(conn);
                    self.sleep_before_retry(attempt).await;
                    continue;
                }
                self.metrics.set_destination_up(&self.name, true);
            }

            match conn.send(&data).await {
                Ok(()) => {
                    self.metrics.inc_messages_forwarded(&self.name);
                    return Ok(());
                }
                Err(e) => {
                    warn!(destination = %self.name, attempt = attempt + 1, max_attempts = self.max_attempts, error = %e, "send failed");
                    conn.disconnect();
                    self.metrics.set_destination_up(&self.name, false);
                    last_err = Some(e);
                }
            }
            drop(conn);
            self.sleep_before_retry(attempt).await;
        }

        Err(last_err.unwrap_or_else(|| RelayError::send(self.name.clone(), "exhausted retries".to_string())))
    }

    async fn sleep_before_retry(&self, attempt: u32) {
        if attempt + 1 < self.max_attempts {
            let delay = self.backoff_seconds * 2f64.powi(attempt as i32);
            sleep(Duration::from_secs_f64(delay)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;

    fn dest(protocol: Protocol, address: &str) -> DestinationConfig {
        DestinationConfig {
            name: "test-dest".to_string(),
            protocol,
            address: address.to_string(),
            format: MessageFormat::Rfc5424,
            retry: RetryConfig {
                max_attempts: 2,
                backoff_seconds: 0.01,
            },
        }
    }

    #[tokio::test]
    async fn udp_forwarder_sends_without_a_listener_present() {
        // UDP has no handshake, so sending to a closed port still succeeds locally.
        let metrics = Arc::new(Metrics::new());
        let forwarder = Forwarder::new(&dest(Protocol::Udp, "127.0.0.1:19999"), metrics.clone()).unwrap();
        let msg = crate::parser::parse(b"<34>1 - - - - - - hi").unwrap();
        assert!(forwarder.send_with_retry(&msg).await.is_ok());
    }

    #[tokio::test]
    async fn tcp_forwarder_exhausts_retries_against_a_closed_port() {
        let metrics = Arc::new(Metrics::new());
        let forwarder = Forwarder::new(&dest(Protocol::Tcp, "127.0.0.1:1"), metrics.clone()).unwrap();
        let msg = crate::parser::parse(b"<34>1 - - - - - - hi").unwrap();
        assert!(forwarder.send_with_retry(&msg).await.is_err());
    }

    #[tokio::test]
    async fn tls_destination_is_rejected_at_construction() {
        let metrics = Arc::new(Metrics::new());
        let result = Forwarder::new(&dest(Protocol::Tls, "127.0.0.1:514"), metrics);
        assert!(matches!(result, Err(RelayError::Unsupported(_))));
    }

    #[tokio::test]
    async fn udp_forwarder_accepts_a_hostname_destination() {
        // "localhost" has no numeric SocketAddr form; DNS resolution happens at connect time.
        let metrics = Arc::new(Metrics::new());
        let forwarder = Forwarder::new(&dest(Protocol::Udp, "localhost:19999"), metrics.clone()).unwrap();
        let msg = crate::parser::parse(b"<34>1 - - - - - - hi").unwrap();
        assert!(forwarder.send_with_retry(&msg).await.is_ok());
    }
}
