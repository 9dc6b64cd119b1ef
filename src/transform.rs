//! Ordered, immutable, regex-driven message transformation.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;

use crate::config::{MaskConfig, TransformConfig};
use crate::message::SyslogMessage;

struct CompiledTransform {
    name: String,
    match_pattern: Option<Regex>,
    remove_fields: Vec<String>,
    set_fields: HashMap<String, String>,
    message_replace: Option<(Regex, String)>,
    mask_patterns: Vec<(Regex, String)>,
    message_prefix: Option<String>,
    message_suffix: Option<String>,
}

fn compile_transform(t: &TransformConfig) -> Result<CompiledTransform, regex::Error> {
    let match_pattern = t.match_pattern.as_deref().map(Regex::new).transpose()?;
    let message_replace = t
        .message_replace
        .as_ref()
        .map(|r| Regex::new(&r.pattern).map(|re| (re, r.replacement.clone())))
        .transpose()?;
    let mask_patterns = t
        .mask_patterns
        .as_ref()
        .map(|masks| {
            masks
                .iter()
                .map(|m: &MaskConfig| Regex::new(&m.pattern).map(|re| (re, m.replacement.clone())))
                .collect::<Result<Vec<_>, _>>()
        })
        .transpose()?
        .unwrap_or_default();

    Ok(CompiledTransform {
        name: t.name.clone(),
        match_pattern,
        remove_fields: t.remove_fields.clone().unwrap_or_default(),
        set_fields: t.set_fields.clone().unwrap_or_default(),
        message_replace,
        mask_patterns,
        message_prefix: t.message_prefix.clone(),
        message_suffix: t.message_suffix.clone(),
    })
}

/// Applies named, ordered transform recipes to produce new message values.
pub struct Transformer {
    transforms: RwLock<Arc<Vec<CompiledTransform>>>,
}

impl Transformer {
    pub fn new(transforms: &[TransformConfig]) -> Result<Self, regex::Error> {
        let compiled = transforms
            .iter()
            .map(compile_transform)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            transforms: RwLock::new(Arc::new(compiled)),
        })
    }

    pub fn reload(&self, transforms: &[TransformConfig]) -> Result<(), regex::Error> {
        let compiled = transforms
            .iter()
            .map(compile_transform)
            .collect::<Result<Vec<_>, _>>()?;
        *self.transforms.write() = Arc::new(compiled);
        Ok(())
    }

    /// Apply `names` in the given order if provided, else all configured transforms
    /// in declared order. Names with no matching transform are silently skipped.
    pub fn transform(&self, message: &SyslogMessage, names: Option<&[String]>) -> SyslogMessage {
        let transforms = self.transforms.read().clone();
        let mut result = message.clone();

        match names {
            Some(names) => {
                for name in names {
                    if let Some(t) = transforms.iter().find(|t| &t.name == name) {
                        if should_apply(t, &result) {
                            result = apply_transform(t, &result);
                        }
                    }
                }
            }
            None => {
                for t in transforms.iter() {
                    if should_apply(t, &result) {
                        result = apply_transform(t, &result);
                    }
                }
            }
        }

        result
    }
}

fn should_apply(t: &CompiledTransform, message: &SyslogMessage) -> bool {
    match &t.match_pattern {
        Some(pattern) => pattern.is_match(&message.message),
        None => true,
    }
}

fn apply_transform(t: &CompiledTransform, message: &SyslogMessage) -> SyslogMessage {
    let mut result = message.clone();

    for field in &t.remove_fields {
        match field.as_str() {
            "hostname" => result.hostname = None,
            "app_name" => result.app_name = None,
            "proc_id" => result.proc_id = None,
            "msg_id" => result.msg_id = None,
            "structured_data" => result.structured_data = None,
            _ => {}
        }
    }

    for (field, value) in &t.set_fields {
        match field.as_str() {
            "hostname" => result.hostname = Some(value.clone()),
            "app_name" => result.app_name = Some(value.clone()),
            "proc_id" => result.proc_id = Some(value.clone()),
            "msg_id" => result.msg_id = Some(value.clone()),
            "structured_data" => result.structured_data = Some(value.clone()),
            "facility" => {
                if let Ok(v) = value.parse::<u8>() {
                    result.facility = v;
                }
            }
            "severity" => {
                if let Ok(v) = value.parse::<u8>() {
                    result.severity = v;
                }
            }
            _ => {}
        }
    }

    if let Some((pattern, replacement)) = &t.message_replace {
        result.message = pattern.replace_all(&result.message, replacement.as_str()).into_owned();
    }

    for (pattern, replacement) in &t.mask_patterns {
        result.message = pattern.replace_all(&result.message, replacement.as_str()).into_owned();
    }

    if let Some(prefix) = &t.message_prefix {
        result.message = format!("{prefix}{}", result.message);
    }
    if let Some(suffix) = &t.message_suffix {
        result.message = format!("{}{suffix}", result.message);
    }

    result
}

/// Common, ready-made transform recipes an operator's config MAY reuse.
pub static PRESET_TRANSFORMS: Lazy<HashMap<&'static str, TransformConfig>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert(
        "remove-pid",
        TransformConfig {
            name: "remove-pid".to_string(),
            match_pattern: None,
            remove_fields: Some(vec!["proc_id".to_string()]),
            set_fields: None,
            message_replace: None,
            mask_patterns: None,
            message_prefix: None,
            message_suffix: None,
        },
    );
    m.insert(
        "remove-structured-data",
        TransformConfig {
            name: "remove-structured-data".to_string(),
            match_pattern: None,
            remove_fields: Some(vec!["structured_data".to_string()]),
            set_fields: None,
            message_replace: None,
            mask_patterns: None,
            message_prefix: None,
            message_suffix: None,
        },
    );
    m.insert(
        "anonymize-ip",
        TransformConfig {
            name: "anonymize-ip".to_string(),
            match_pattern: None,
            remove_fields: None,
            set_fields: None,
            message_replace: None,
            mask_patterns: Some(vec![MaskConfig {
                pattern: r"\b\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}\b".to_string(),
                replacement: "x.x.x.x".to_string(),
            }]),
            message_prefix: None,
            message_suffix: None,
        },
    );
    m.insert(
        "mask-email",
        TransformConfig {
            name: "mask-email".to_string(),
            match_pattern: None,
            remove_fields: None,
            set_fields: None,
            message_replace: None,
            mask_patterns: Some(vec![MaskConfig {
                pattern: r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b".to_string(),
                replacement: "***@***.***".to_string(),
            }]),
            message_prefix: None,
            message_suffix: None,
        },
    );
    m.insert(
        "mask-password",
        TransformConfig {
            name: "mask-password".to_string(),
            match_pattern: None,
            remove_fields: None,
            set_fields: None,
            message_replace: None,
            mask_patterns: Some(vec![MaskConfig {
                pattern: r#"(password|passwd|pwd|secret|token|api_key|apikey)[\s]*[=:][\s]*['"]?([^'"\s]+)['"]?"#
                    .to_string(),
                replacement: r"$1=***REDACTED***".to_string(),
            }]),
            message_prefix: None,
            message_suffix: None,
        },
    );
    m
});
