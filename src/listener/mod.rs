//! Network listeners that turn configured inputs into a stream of parsed messages.

mod tcp;
mod udp;

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::error;

use crate::config::{InputConfig, Protocol};
use crate::error::RelayError;
use crate::message::SyslogMessage;
use crate::metrics::Metrics;

/// A message received on one of the configured inputs.
#[derive(Debug)]
pub struct ReceivedMessage {
    pub message: SyslogMessage,
    pub input_name: String,
}

/// Start every configured input listener.
///
/// Returns a channel fed by all of them plus the listener tasks' join handles,
/// so the caller can abort them on shutdown.
pub async fn start_listeners(
    inputs: &[InputConfig],
    metrics: Arc<Metrics>,
) -> Result<(mpsc::Receiver<ReceivedMessage>, Vec<JoinHandle<()>>), RelayError> {
    let (tx, rx) = mpsc::channel(1024);
    let mut handles = Vec::with_capacity(inputs.len());

    for input in inputs {
        let tx = tx.clone();
        let metrics = metrics.clone();
        let input = input.clone();

        let handle = match input.protocol {
            Protocol::Udp => tokio::spawn(async move {
                if let Err(e) = udp::run(&input, tx, metrics).await {
                    error!(input = %input.name, error = %e, "UDP listener stopped");
                }
            }),
            Protocol::Tcp => tokio::spawn(async move {
                if let Err(e) = tcp::run(&input, tx, metrics).await {
                    error!(input = %input.name, error = %e, "TCP listener stopped");
                }
            }),
            Protocol::Tls => {
                return Err(RelayError::unsupported(format!(
                    "input '{}': tls transport is not implemented",
                    input.name
                )));
            }
        };
        handles.push(handle);
    }

    Ok((rx, handles))
}
