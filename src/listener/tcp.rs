//! TCP syslog listener supporting both RFC 6587 octet-counting and
//! newline/CRLF-delimited framing on the same connection.

use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::InputConfig;
use crate::error::RelayError;
use crate::listener::ReceivedMessage;
use crate::metrics::Metrics;
use crate::parser;

const READ_CHUNK: usize = 8192;
const MAX_LENGTH_PREFIX_DIGITS: usize = 9;

pub async fn run(
    config: &InputConfig,
    tx: mpsc::Sender<ReceivedMessage>,
    metrics: Arc<Metrics>,
) -> Result<(), RelayError> {
    let listener = TcpListener::bind(&config.address).await?;
    info!(input = %config.name, address = %config.address, "TCP listener started");

    loop {
        let (stream, addr) = listener.accept().await?;
        let tx = tx.clone();
        let metrics = metrics.clone();
        let input_name = config.name.clone();

        tokio::spawn(async move {
            metrics.inc_active_connections(&input_name);
            if let Err(e) = handle_connection(stream, &input_name, &tx, &metrics).await {
                debug!(input = %input_name, %addr, error = %e, "TCP connection error");
            }
            metrics.dec_active_connections(&input_name);
        });
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    input_name: &str,
    tx: &mpsc::Sender<ReceivedMessage>,
    metrics: &Metrics,
) -> Result<(), RelayError> {
    let mut buffer: Vec<u8> = Vec::new();
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);

        while let Some((msg_range, consumed)) = find_message_bounds(&buffer) {
            let message = buffer[msg_range].to_vec();
            buffer.drain(..consumed);
            dispatch(&message, input_name, tx, metrics).await;
        }
    }

    Ok(())
}

async fn dispatch(data: &[u8], input_name: &str, tx: &mpsc::Sender<ReceivedMessage>, metrics: &Metrics) {
    match parser::parse(data) {
        Ok(message) => {
            metrics.inc_messages_received("tcp", &message.facility_name(), &message.severity_name());
            let received = ReceivedMessage {
                message,
                input_name: input_name.to_string(),
            };
            if tx.send(received).await.is_err() {
                error!(input = %input_name, "downstream channel closed mid-connection");
            }
        }
        Err(e) => {
            metrics.inc_parse_errors("tcp");
            warn!(input = %input_name, error = %e, "failed to parse TCP message");
        }
    }
}

/// Locate one complete message at the front of `buffer`, if available.
///
/// Tries RFC 6587 octet-counting ("LEN SP MSG") first, then falls back to
/// newline/CRLF-delimited framing. Returns the message's byte range and the
/// total number of leading bytes (message plus framing) to discard once read.
fn find_message_bounds(buffer: &[u8]) -> Option<(std::ops::Range<usize>, usize)> {
    if buffer.is_empty() {
        return None;
    }

    if buffer[0].is_ascii_digit() {
        if let Some(space_idx) = buffer.iter().position(|b| *b == b' ') {
            if space_idx > 0 && space_idx <= MAX_LENGTH_PREFIX_DIGITS {
                if let Ok(len_str) = std::str::from_utf8(&buffer[..space_idx]) {
                    if let Ok(msg_len) = len_str.parse::<usize>() {
                        let msg_start = space_idx + 1;
                        let msg_end = msg_start + msg_len;
                        if buffer.len() >= msg_end {
                            return Some((msg_start..msg_end, msg_end));
                        }
                        return None;
                    }
                }
            }
        }
    }

    if let Some(idx) = buffer.iter().position(|b| *b == b'\n') {
        let end = if idx > 0 && buffer[idx - 1] == b'\r' { idx - 1 } else { idx };
        return Some((0..end, idx + 1));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_octet_counted_message() {
        let buf = b"5 hello6 world!";
        let (range, consumed) = find_message_bounds(buf).unwrap();
        assert_eq!(&buf[range], b"hello");
        assert_eq!(consumed, 7);
    }

    #[test]
    fn waits_for_full_octet_counted_message() {
        let buf = b"10 short";
        assert!(find_message_bounds(buf).is_none());
    }

    #[test]
    fn extracts_newline_delimited_message() {
        let buf = b"<34>hello\n<35>world\n";
        let (range, consumed) = find_message_bounds(buf).unwrap();
        assert_eq!(&buf[range], b"<34>hello");
        assert_eq!(consumed, b"<34>hello\n".len());
    }

    #[test]
    fn extracts_crlf_delimited_message() {
        let buf = b"<34>hello\r\nrest";
        let (range, consumed) = find_message_bounds(buf).unwrap();
        assert_eq!(&buf[range], b"<34>hello");
        assert_eq!(consumed, b"<34>hello\r\n".len());
    }

    #[test]
    fn returns_none_when_no_complete_message_available() {
        assert!(find_message_bounds(b"<34>partial").is_none());
    }
}
