//! UDP forwarding socket: connectionless, no handshake to retry.

use std::net::SocketAddr;

use tokio::net::{lookup_host, UdpSocket};

use crate::error::RelayError;

pub struct UdpForwarder {
    host: String,
    port: u16,
    socket: Option<UdpSocket>,
}

impl UdpForwarder {
    pub fn new(host: String, port: u16) -> Self {
        Self { host, port, socket: None }
    }

    pub fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub async fn connect(&mut self) -> Result<(), RelayError> {
        let resolved: SocketAddr = lookup_host((self.host.as_str(), self.port))
            .await
            .map_err(|e| RelayError::connect(self.target(), e.to_string()))?
            .next()
            .ok_or_else(|| RelayError::connect(self.target(), "no addresses resolved".to_string()))?;

        let bind_addr: SocketAddr = if resolved.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" }
            .parse()
            .expect("static bind address is valid");
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(resolved).await?;
        self.socket = Some(socket);
        Ok(())
    }

    pub fn disconnect(&mut self) {
        self.socket = None;
    }

    pub async fn send(&self, data: &[u8]) -> Result<(), RelayError> {
        let socket = self
            .socket
            .as_ref()
            .ok_or_else(|| RelayError::send(self.target(), "not connected".to_string()))?;
        socket
            .send(data)
            .await
            .map_err(|e| RelayError::send(self.target(), e.to_string()))?;
        Ok(())
    }
}
