//! Syslog message parser supporting RFC 5424, RFC 3164, and a PRI-only fallback.

use chrono::{DateTime, Datelike, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::bytes::Regex as BytesRegex;

use crate::error::RelayError;
use crate::message::{MessageFormat, SyslogMessage};

// RFC 5424: <PRI>1 SP TIMESTAMP SP HOSTNAME SP APP-NAME SP PROCID SP MSGID SP (SD|-) [SP] MSG
static RFC5424_REGEX: Lazy<BytesRegex> = Lazy::new(|| {
    BytesRegex::new(
        r"(?s)^<([0-9]{1,3})>1 (\S+) (\S+) (\S+) (\S+) (\S+) (\[.*?\]|-) ?(.*)$",
    )
    .unwrap()
});

// RFC 3164: <PRI>Mmm D[D] HH:MM:SS SP HOSTNAME SP REST
static RFC3164_REGEX: Lazy<BytesRegex> = Lazy::new(|| {
    BytesRegex::new(r"(?s)^<([0-9]{1,3})>([A-Z][a-z]{2} [ 0-9][0-9] [0-9]{2}:[0-9]{2}:[0-9]{2}) (\S+) (.*)$")
        .unwrap()
});

// PRI-only fallback: <PRI>REST
static SIMPLE_REGEX: Lazy<BytesRegex> = Lazy::new(|| BytesRegex::new(r"(?s)^<([0-9]{1,3})>(.*)$").unwrap());

// Splits RFC 3164's REST into TAG[PID]: MSG.
static TAG_REGEX: Lazy<regex::Regex> =
    Lazy::new(|| regex::Regex::new(r"(?s)^(\S+?)(?:\[([0-9]+)\])?:\s*(.*)$").unwrap());

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Parse a raw syslog message, trying RFC 5424, then RFC 3164, then the PRI-only fallback.
pub fn parse(data: &[u8]) -> Result<SyslogMessage, RelayError> {
    let data = strip_trailing_newline(data);

    if let Some(caps) = RFC5424_REGEX.captures(data) {
        return parse_rfc5424(&caps, data);
    }
    if let Some(caps) = RFC3164_REGEX.captures(data) {
        return parse_rfc3164(&caps, data);
    }
    if let Some(caps) = SIMPLE_REGEX.captures(data) {
        return parse_simple(&caps, data);
    }

    let preview = data.iter().take(100).copied().collect();
    Err(RelayError::Unparseable(preview))
}

fn strip_trailing_newline(data: &[u8]) -> &[u8] {
    let mut end = data.len();
    while end > 0 && (data[end - 1] == b'\n' || data[end - 1] == b'\r') {
        end -= 1;
    }
    &data[..end]
}

fn parse_priority(pri_bytes: &[u8]) -> Result<(u8, u8), RelayError> {
    let pri_str = String::from_utf8_lossy(pri_bytes);
    let pri: u32 = pri_str.parse().map_err(|_| RelayError::InvalidPriority(u32::MAX))?;
    if pri > 191 {
        return Err(RelayError::InvalidPriority(pri));
    }
    Ok(((pri >> 3) as u8, (pri & 0x07) as u8))
}

fn bytes_to_string(b: &[u8]) -> String {
    String::from_utf8_lossy(b).into_owned()
}

fn nilvalue_to_option(b: &[u8]) -> Option<String> {
    if b == b"-" {
        None
    } else {
        Some(bytes_to_string(b))
    }
}

fn parse_rfc5424(caps: &regex::bytes::Captures, raw: &[u8]) -> Result<SyslogMessage, RelayError> {
    let (facility, severity) = parse_priority(&caps[1])?;

    let ts_str = bytes_to_string(&caps[2]);
    let timestamp = parse_rfc5424_timestamp(&ts_str);

    let hostname = nilvalue_to_option(&caps[3]);
    let app_name = nilvalue_to_option(&caps[4]);
    let proc_id = nilvalue_to_option(&caps[5]);
    let msg_id = nilvalue_to_option(&caps[6]);
    let structured_data = nilvalue_to_option(&caps[7]);
    let message = caps.get(8).map(|m| bytes_to_string(m.as_bytes())).unwrap_or_default();

    Ok(SyslogMessage {
        facility,
        severity,
        timestamp,
        hostname,
        app_name,
        proc_id,
        msg_id,
        structured_data,
        message,
        raw: raw.to_vec(),
        format: MessageFormat::Rfc5424,
    })
}

fn parse_rfc5424_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if s == "-" {
        return None;
    }
    let normalized = s.replace('Z', "+00:00");
    DateTime::parse_from_rfc3339(&normalized)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

fn parse_rfc3164(caps: &regex::bytes::Captures, raw: &[u8]) -> Result<SyslogMessage, RelayError> {
    let (facility, severity) = parse_priority(&caps[1])?;

    let ts_str = bytes_to_string(&caps[2]);
    let timestamp = parse_rfc3164_timestamp(&ts_str);

    let hostname = Some(bytes_to_string(&caps[3]));
    let rest = bytes_to_string(&caps[4]);

    let (app_name, proc_id, message) = match TAG_REGEX.captures(&rest) {
        Some(tag_caps) => (
            Some(tag_caps[1].to_string()),
            tag_caps.get(2).map(|m| m.as_str().to_string()),
            tag_caps[3].to_string(),
        ),
        None => (None, None, rest),
    };

    Ok(SyslogMessage {
        facility,
        severity,
        timestamp,
        hostname,
        app_name,
        proc_id,
        msg_id: None,
        structured_data: None,
        message,
        raw: raw.to_vec(),
        format: MessageFormat::Rfc3164,
    })
}

fn parse_rfc3164_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let mut parts = s.split_whitespace();
    let month_str = parts.next()?;
    let month = MONTHS.iter().position(|m| *m == month_str)? as u32 + 1;
    let day: u32 = parts.next()?.parse().ok()?;
    let time = parts.next()?;
    let mut time_parts = time.split(':');
    let hour: u32 = time_parts.next()?.parse().ok()?;
    let minute: u32 = time_parts.next()?.parse().ok()?;
    let second: u32 = time_parts.next()?.parse().ok()?;

    let year = Utc::now().year();
    let naive = NaiveDateTime::parse_from_str(
        &format!("{year}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}"),
        "%Y-%m-%d %H:%M:%S",
    )
    .ok()?;
    Some(naive.and_utc())
}

fn parse_simple(caps: &regex::bytes::Captures, raw: &[u8]) -> Result<SyslogMessage, RelayError> {
    let (facility, severity) = parse_priority(&caps[1])?;
    let message = caps.get(2).map(|m| bytes_to_string(m.as_bytes())).unwrap_or_default();

    Ok(SyslogMessage {
        facility,
        severity,
        timestamp: Some(Utc::now()),
        hostname: None,
        app_name: None,
        proc_id: None,
        msg_id: None,
        structured_data: None,
        message,
        raw: raw.to_vec(),
        format: MessageFormat::Rfc3164,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rfc5424_basic() {
        let msg = parse(
            b"<34>1 2024-01-15T12:30:45.123Z hostname app 1234 ID47 - Test message",
        )
        .unwrap();
        assert_eq!(msg.facility, 4);
        assert_eq!(msg.severity, 2);
        assert_eq!(msg.hostname.as_deref(), Some("hostname"));
        assert_eq!(msg.app_name.as_deref(), Some("app"));
        assert_eq!(msg.proc_id.as_deref(), Some("1234"));
        assert_eq!(msg.msg_id.as_deref(), Some("ID47"));
        assert_eq!(msg.structured_data, None);
        assert_eq!(msg.message, "Test message");
        assert_eq!(msg.format, MessageFormat::Rfc5424);
    }

    #[test]
    fn parses_rfc5424_nilvalues() {
        let msg = parse(b"<14>1 - - - - - - Just a message").unwrap();
        assert_eq!(msg.timestamp, None);
        assert_eq!(msg.hostname, None);
        assert_eq!(msg.app_name, None);
        assert_eq!(msg.proc_id, None);
        assert_eq!(msg.msg_id, None);
        assert_eq!(msg.message, "Just a message");
    }

    #[test]
    fn parses_rfc3164_basic() {
        let msg = parse(b"<34>Jan 15 12:30:45 myhost sshd[1234]: Connection from 192.168.1.1").unwrap();
        assert_eq!(msg.facility, 4);
        assert_eq!(msg.severity, 2);
        assert_eq!(msg.hostname.as_deref(), Some("myhost"));
        assert_eq!(msg.app_name.as_deref(), Some("sshd"));
        assert_eq!(msg.proc_id.as_deref(), Some("1234"));
        assert_eq!(msg.message, "Connection from 192.168.1.1");
        assert_eq!(msg.format, MessageFormat::Rfc3164);
    }

    #[test]
    fn rfc3164_accepts_single_and_double_digit_day() {
        assert!(parse(b"<13>Jan  5 10:00:00 host kernel: msg").is_ok());
        assert!(parse(b"<13>Jan 15 10:00:00 host kernel: msg").is_ok());
    }

    #[test]
    fn rfc3164_without_pid() {
        let msg = parse(b"<13>Oct 22 10:52:12 localhost kernel: Device eth0 entered promiscuous mode").unwrap();
        assert_eq!(msg.app_name.as_deref(), Some("kernel"));
        assert_eq!(msg.proc_id, None);
    }

    #[test]
    fn falls_back_to_simple_parsing() {
        let msg = parse(b"<14>A simple message without structure").unwrap();
        assert_eq!(msg.facility, 1);
        assert_eq!(msg.severity, 6);
        assert_eq!(msg.message, "A simple message without structure");
        assert!(msg.timestamp.is_some());
    }

    #[test]
    fn pri_191_parses_and_192_is_rejected() {
        assert!(parse(b"<191>msg").is_ok());
        match parse(b"<192>msg") {
            Err(RelayError::InvalidPriority(192)) => {}
            other => panic!("expected InvalidPriority(192), got {other:?}"),
        }
    }

    #[test]
    fn priority_roundtrips_through_facility_and_severity() {
        let msg = parse(b"<165>1 - - - - - - Test").unwrap();
        assert_eq!(msg.facility, 20);
        assert_eq!(msg.severity, 5);
        assert_eq!(msg.priority(), 165);
    }

    #[test]
    fn unparseable_message_carries_a_preview() {
        match parse(b"not a syslog message at all") {
            Err(RelayError::Unparseable(_)) => {}
            other => panic!("expected Unparseable, got {other:?}"),
        }
    }

    #[test]
    fn strips_trailing_crlf() {
        let a = parse(b"<14>hello\n").unwrap();
        let b = parse(b"<14>hello\r\n").unwrap();
        assert_eq!(a.message, "hello");
        assert_eq!(b.message, "hello");
    }
}
