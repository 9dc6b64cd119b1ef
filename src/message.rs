//! The parsed syslog message value and its wire serializations.

use chrono::{DateTime, Utc};

/// Facility names indexed by code (0..23), per RFC 3164 §4.1.1.
pub const FACILITY_NAMES: [&str; 24] = [
    "kern", "user", "mail", "daemon", "auth", "syslog", "lpr", "news", "uucp", "cron",
    "authpriv", "ftp", "ntp", "audit", "alert", "clock", "local0", "local1", "local2", "local3",
    "local4", "local5", "local6", "local7",
];

/// Severity names indexed by code (0..7), per RFC 3164 §4.1.1.
pub const SEVERITY_NAMES: [&str; 8] = [
    "emerg", "alert", "crit", "err", "warning", "notice", "info", "debug",
];

/// Look up a facility name by code, falling back to `unknown(N)` for out-of-range codes.
pub fn facility_name(code: u8) -> String {
    FACILITY_NAMES
        .get(code as usize)
        .map(|s| s.to_string())
        .unwrap_or_else(|| format!("unknown({code})"))
}

/// Look up a facility code by name (case-sensitive, matches `FACILITY_NAMES`).
pub fn facility_code(name: &str) -> Option<u8> {
    FACILITY_NAMES.iter().position(|n| *n == name).map(|i| i as u8)
}

/// Look up a severity name by code, falling back to `unknown(N)` for out-of-range codes.
pub fn severity_name(code: u8) -> String {
    SEVERITY_NAMES
        .get(code as usize)
        .map(|s| s.to_string())
        .unwrap_or_else(|| format!("unknown({code})"))
}

/// Look up a severity code by name (case-sensitive, matches `SEVERITY_NAMES`).
pub fn severity_code(name: &str) -> Option<u8> {
    SEVERITY_NAMES.iter().position(|n| *n == name).map(|i| i as u8)
}

/// Which wire grammar a message was parsed from, or should be serialized as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageFormat {
    /// Render/parse using the message's own recorded format.
    Auto,
    Rfc3164,
    Rfc5424,
}

/// A parsed syslog message.
///
/// Produced only by [`crate::parser::parse`]; every transform step produces a
/// new value rather than mutating this one (see `transform.rs`).
#[derive(Debug, Clone, PartialEq)]
pub struct SyslogMessage {
    pub facility: u8,
    pub severity: u8,
    pub timestamp: Option<DateTime<Utc>>,
    pub hostname: Option<String>,
    pub app_name: Option<String>,
    pub proc_id: Option<String>,
    pub msg_id: Option<String>,
    pub structured_data: Option<String>,
    pub message: String,
    pub raw: Vec<u8>,
    pub format: MessageFormat,
}

impl SyslogMessage {
    /// `PRI = facility * 8 + severity`, invariant `0..=191`.
    pub fn priority(&self) -> u16 {
        self.facility as u16 * 8 + self.severity as u16
    }

    pub fn facility_name(&self) -> String {
        facility_name(self.facility)
    }

    pub fn severity_name(&self) -> String {
        severity_name(self.severity)
    }

    /// Render as `<PRI>MMM D HH:MM:SS HOSTNAME TAG: MSG`.
    pub fn to_rfc3164(&self) -> Vec<u8> {
        let pri = self.priority();
        let ts = self
            .timestamp
            .map(|t| t.format("%b %e %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        let hostname = self.hostname.as_deref().unwrap_or("-");
        let mut tag = self.app_name.as_deref().unwrap_or("-").to_string();
        if let Some(pid) = &self.proc_id {
            tag = format!("{tag}[{pid}]");
        }
        format!("<{pri}>{ts} {hostname} {tag}: {}", self.message).into_bytes()
    }

    /// Render as `<PRI>1 TIMESTAMP HOSTNAME APP-NAME PROCID MSGID SD MSG`.
    pub fn to_rfc5424(&self) -> Vec<u8> {
        let pri = self.priority();
        let ts = self
            .timestamp
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        let hostname = self.hostname.as_deref().unwrap_or("-");
        let app_name = self.app_name.as_deref().unwrap_or("-");
        let proc_id = self.proc_id.as_deref().unwrap_or("-");
        let msg_id = self.msg_id.as_deref().unwrap_or("-");
        let sd = self.structured_data.as_deref().unwrap_or("-");
        format!(
            "<{pri}>1 {ts} {hostname} {app_name} {proc_id} {msg_id} {sd} {}",
            self.message
        )
        .into_bytes()
    }

    /// Render per `format`, using the message's own recorded format for `Auto`.
    pub fn serialize(&self, format: MessageFormat) -> Vec<u8> {
        match format {
            MessageFormat::Rfc5424 => self.to_rfc5424(),
            MessageFormat::Rfc3164 => self.to_rfc3164(),
            MessageFormat::Auto => match self.format {
                MessageFormat::Rfc5424 => self.to_rfc5424(),
                _ => self.to_rfc3164(),
            },
        }
    }
}
