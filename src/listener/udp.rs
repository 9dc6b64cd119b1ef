//! UDP syslog listener: one datagram is one message, dispatched without blocking
//! on the downstream channel.

use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::InputConfig;
use crate::error::RelayError;
use crate::listener::ReceivedMessage;
use crate::metrics::Metrics;
use crate::parser;

const MAX_DATAGRAM_SIZE: usize = 65536;

pub async fn run(
    config: &InputConfig,
    tx: mpsc::Sender<ReceivedMessage>,
    metrics: Arc<Metrics>,
) -> Result<(), RelayError> {
    let socket = UdpSocket::bind(&config.address).await?;
    info!(input = %config.name, address = %config.address, "UDP listener started");

    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

    loop {
        let (len, addr) = socket.recv_from(&mut buf).await?;
        let data = &buf[..len];

        match parser::parse(data) {
            Ok(message) => {
                metrics.inc_messages_received("udp", &message.facility_name(), &message.severity_name());
                let received = ReceivedMessage {
                    message,
                    input_name: config.name.clone(),
                };
                if tx.send(received).await.is_err() {
                    debug!(input = %config.name, "downstream channel closed, stopping UDP listener");
                    break;
                }
            }
            Err(e) => {
                metrics.inc_parse_errors("udp");
                warn!(input = %config.name, %addr, error = %e, "failed to parse UDP datagram");
            }
        }
    }

    Ok(())
}
