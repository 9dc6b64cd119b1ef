//! Relay configuration: a YAML document deserialized into a validated, read-only record.
//!
//! Loading (`load_from_file`) is intentionally thin — no environment-variable
//! interpolation is performed; values come from the YAML document as written.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::RelayError;
use crate::message::MessageFormat;

fn default_format_auto() -> MessageFormat {
    MessageFormat::Auto
}

fn default_format_rfc5424() -> MessageFormat {
    MessageFormat::Rfc5424
}

fn default_version() -> String {
    "1".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_address() -> String {
    "0.0.0.0:9090".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_seconds() -> f64 {
    1.0
}

/// Wire protocol for an input or output endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Udp,
    Tcp,
    Tls,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Udp => write!(f, "udp"),
            Self::Tcp => write!(f, "tcp"),
            Self::Tls => write!(f, "tls"),
        }
    }
}

/// Action a matched filter rule takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterAction {
    Forward,
    Drop,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    pub name: String,
    #[serde(default = "default_protocol_udp")]
    pub protocol: Protocol,
    #[serde(default = "default_input_address")]
    pub address: String,
    #[serde(default = "default_format_auto")]
    pub format: MessageFormat,
}

fn default_protocol_udp() -> Protocol {
    Protocol::Udp
}

fn default_input_address() -> String {
    "0.0.0.0:514".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterMatch {
    #[serde(default)]
    pub facility: Option<Vec<String>>,
    #[serde(default)]
    pub severity: Option<Vec<String>>,
    #[serde(default)]
    pub hostname_pattern: Option<String>,
    #[serde(default)]
    pub message_pattern: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplaceConfig {
    pub pattern: String,
    #[serde(default)]
    pub replacement: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaskConfig {
    pub pattern: String,
    #[serde(default = "default_mask_replacement")]
    pub replacement: String,
}

fn default_mask_replacement() -> String {
    "***MASKED***".to_string()
}

/// Valid targets for `TransformConfig::remove_fields`.
pub const REMOVABLE_FIELDS: [&str; 5] =
    ["hostname", "app_name", "proc_id", "msg_id", "structured_data"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformConfig {
    pub name: String,
    #[serde(default)]
    pub match_pattern: Option<String>,
    #[serde(default)]
    pub remove_fields: Option<Vec<String>>,
    #[serde(default)]
    pub set_fields: Option<HashMap<String, String>>,
    #[serde(default)]
    pub message_replace: Option<ReplaceConfig>,
    #[serde(default)]
    pub mask_patterns: Option<Vec<MaskConfig>>,
    #[serde(default)]
    pub message_prefix: Option<String>,
    #[serde(default)]
    pub message_suffix: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    pub name: String,
    #[serde(rename = "match", default)]
    pub match_: Option<FilterMatch>,
    #[serde(default = "default_action_forward")]
    pub action: FilterAction,
    #[serde(default)]
    pub destinations: Option<Vec<String>>,
    #[serde(default)]
    pub transforms: Option<Vec<String>>,
}

fn default_action_forward() -> FilterAction {
    FilterAction::Forward
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_seconds")]
    pub backoff_seconds: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_seconds: default_backoff_seconds(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationConfig {
    pub name: String,
    #[serde(default = "default_protocol_udp")]
    pub protocol: Protocol,
    pub address: String,
    #[serde(default = "default_format_rfc5424")]
    pub format: MessageFormat,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl DestinationConfig {
    pub fn host(&self) -> &str {
        self.address.rsplit_once(':').map(|(h, _)| h).unwrap_or(&self.address)
    }

    pub fn port(&self) -> u16 {
        self.address
            .rsplit_once(':')
            .and_then(|(_, p)| p.parse().ok())
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_metrics_address")]
    pub address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            address: default_metrics_address(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

/// Root configuration record. Constructed once at startup and read-only thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub inputs: Vec<InputConfig>,
    #[serde(default)]
    pub transforms: Vec<TransformConfig>,
    #[serde(default)]
    pub filters: Vec<FilterConfig>,
    #[serde(default)]
    pub destinations: Vec<DestinationConfig>,
    #[serde(default)]
    pub service: ServiceConfig,
}

impl Config {
    /// Load and validate a configuration file. No environment-variable interpolation
    /// is performed; the YAML document is taken literally.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, RelayError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            RelayError::config(format!("failed to read config file '{}': {e}", path.display()))
        })?;
        let config: Self = serde_yaml::from_str(&content).map_err(|e| {
            RelayError::config(format!("failed to parse config file '{}': {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate address shapes, numeric bounds, the forward/drop invariant, and
    /// referential integrity between filters and transforms/destinations.
    pub fn validate(&self) -> Result<(), RelayError> {
        reject_duplicate_names("input", self.inputs.iter().map(|i| i.name.as_str()))?;
        reject_duplicate_names("destination", self.destinations.iter().map(|d| d.name.as_str()))?;
        reject_duplicate_names("transform", self.transforms.iter().map(|t| t.name.as_str()))?;
        reject_duplicate_names("filter", self.filters.iter().map(|f| f.name.as_str()))?;

        for input in &self.inputs {
            validate_address(&input.address).map_err(|e| {
                RelayError::config(format!("input '{}': {e}", input.name))
            })?;
        }

        for dest in &self.destinations {
            validate_address(&dest.address).map_err(|e| {
                RelayError::config(format!("destination '{}': {e}", dest.name))
            })?;
            if !(1..=10).contains(&dest.retry.max_attempts) {
                return Err(RelayError::config(format!(
                    "destination '{}': retry.max_attempts must be in 1..=10",
                    dest.name
                )));
            }
            if !(0.1..=60.0).contains(&dest.retry.backoff_seconds) {
                return Err(RelayError::config(format!(
                    "destination '{}': retry.backoff_seconds must be in 0.1..=60.0",
                    dest.name
                )));
            }
        }

        for transform in &self.transforms {
            if let Some(fields) = &transform.remove_fields {
                for field in fields {
                    if !REMOVABLE_FIELDS.contains(&field.as_str()) {
                        return Err(RelayError::config(format!(
                            "transform '{}': invalid remove_fields entry '{field}'",
                            transform.name
                        )));
                    }
                }
            }
        }

        let dest_names: HashSet<&str> = self.destinations.iter().map(|d| d.name.as_str()).collect();
        let transform_names: HashSet<&str> =
            self.transforms.iter().map(|t| t.name.as_str()).collect();

        for filter in &self.filters {
            match filter.action {
                FilterAction::Forward => {
                    if filter.destinations.as_ref().map(|d| d.is_empty()).unwrap_or(true) {
                        return Err(RelayError::config(format!(
                            "filter '{}': action=forward requires a non-empty destinations list",
                            filter.name
                        )));
                    }
                }
                FilterAction::Drop => {
                    if filter.destinations.as_ref().map(|d| !d.is_empty()).unwrap_or(false) {
                        return Err(RelayError::config(format!(
                            "filter '{}': action=drop must not specify destinations",
                            filter.name
                        )));
                    }
                }
            }

            if let Some(dests) = &filter.destinations {
                for dest in dests {
                    if !dest_names.contains(dest.as_str()) {
                        return Err(RelayError::config(format!(
                            "filter '{}' references unknown destination '{dest}'",
                            filter.name
                        )));
                    }
                }
            }
            if let Some(transforms) = &filter.transforms {
                for name in transforms {
                    if !transform_names.contains(name.as_str()) {
                        return Err(RelayError::config(format!(
                            "filter '{}' references unknown transform '{name}'",
                            filter.name
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}

fn reject_duplicate_names<'a>(
    kind: &str,
    names: impl Iterator<Item = &'a str>,
) -> Result<(), RelayError> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(RelayError::config(format!("duplicate {kind} name '{name}'")));
        }
    }
    Ok(())
}

fn validate_address(address: &str) -> Result<(), String> {
    let (_, port_str) = address
        .rsplit_once(':')
        .ok_or_else(|| "address must be in the form 'host:port'".to_string())?;
    let port: u32 = port_str
        .parse()
        .map_err(|_| format!("invalid port '{port_str}'"))?;
    if !(1..=65535).contains(&port) {
        return Err(format!("port {port} out of range 1..=65535"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_yaml() -> &'static str {
        r#"
inputs:
  - name: in-udp
    protocol: udp
    address: "0.0.0.0:514"
destinations:
  - name: central
    protocol: udp
    address: "10.0.0.1:514"
filters:
  - name: default
    action: forward
    destinations: ["central"]
"#
    }

    #[test]
    fn parses_minimal_config() {
        let config: Config = serde_yaml::from_str(minimal_yaml()).unwrap();
        assert_eq!(config.inputs.len(), 1);
        assert_eq!(config.destinations[0].name, "central");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn destination_format_defaults_to_rfc5424() {
        let config: Config = serde_yaml::from_str(minimal_yaml()).unwrap();
        assert_eq!(config.destinations[0].format, MessageFormat::Rfc5424);
    }

    #[test]
    fn input_format_defaults_to_auto() {
        let config: Config = serde_yaml::from_str(minimal_yaml()).unwrap();
        assert_eq!(config.inputs[0].format, MessageFormat::Auto);
    }

    #[test]
    fn rejects_missing_port() {
        let yaml = r#"
inputs:
  - name: in-udp
    address: "0.0.0.0"
destinations: []
filters: []
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_forward_without_destinations() {
        let yaml = r#"
inputs: []
destinations: []
filters:
  - name: bad
    action: forward
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_drop_with_destinations() {
        let yaml = r#"
inputs: []
destinations:
  - name: d1
    address: "127.0.0.1:1"
filters:
  - name: bad
    action: drop
    destinations: ["d1"]
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_unknown_destination_reference() {
        let yaml = r#"
inputs: []
destinations: []
filters:
  - name: bad
    action: forward
    destinations: ["ghost"]
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_unknown_transform_reference() {
        let yaml = r#"
inputs: []
destinations:
  - name: d1
    address: "127.0.0.1:1"
transforms: []
filters:
  - name: bad
    action: forward
    destinations: ["d1"]
    transforms: ["ghost"]
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_retry_bounds_out_of_range() {
        let yaml = r#"
inputs: []
destinations:
  - name: d1
    address: "127.0.0.1:1"
    retry:
      max_attempts: 20
      backoff_seconds: 1.0
filters: []
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_duplicate_destination_names() {
        let yaml = r#"
inputs: []
destinations:
  - name: d1
    address: "127.0.0.1:1"
  - name: d1
    address: "127.0.0.1:2"
filters: []
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_invalid_remove_fields_entry() {
        let yaml = r#"
inputs: []
destinations: []
transforms:
  - name: t1
    remove_fields: ["nonexistent"]
filters: []
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }
}
