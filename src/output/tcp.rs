//! TCP forwarding connection: newline-framed writes with a connect timeout
//! and a per-write deadline.

use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::error::RelayError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TcpForwarder {
    host: String,
    port: u16,
    stream: Option<TcpStream>,
}

impl TcpForwarder {
    pub fn new(host: String, port: u16) -> Self {
        Self { host, port, stream: None }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub async fn connect(&mut self) -> Result<(), RelayError> {
        let stream = timeout(CONNECT_TIMEOUT, TcpStream::connect((self.host.as_str(), self.port)))
            .await
            .map_err(|_| RelayError::connect(self.target(), "connect timed out".to_string()))?
            .map_err(|e| RelayError::connect(self.target(), e.to_string()))?;
        self.stream = Some(stream);
        Ok(())
    }

    pub fn disconnect(&mut self) {
        self.stream = None;
    }

    pub async fn send(&mut self, data: &[u8]) -> Result<(), RelayError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| RelayError::send(self.target(), "not connected".to_string()))?;

        let mut framed = Vec::with_capacity(data.len() + 1);
        framed.extend_from_slice(data);
        framed.push(b'\n');

        let write_result = timeout(WRITE_TIMEOUT, async {
            stream.write_all(&framed).await?;
            stream.flush().await
        })
        .await;

        match write_result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                self.stream = None;
                Err(RelayError::send(self.target(), e.to_string()))
            }
            Err(_) => {
                self.stream = None;
                Err(RelayError::send(self.target(), "write timed out".to_string()))
            }
        }
    }
}
