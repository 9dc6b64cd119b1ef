//! First-match-wins filter rule evaluation.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use regex::Regex;

use crate::config::{FilterAction, FilterConfig, FilterMatch};
use crate::message::{facility_code, severity_code, SyslogMessage};
use crate::metrics::Metrics;

/// Outcome of evaluating a message against the configured rule list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterResult {
    pub matched: bool,
    pub filter_name: Option<String>,
    pub action: FilterAction,
    pub destinations: Vec<String>,
    pub transforms: Vec<String>,
}

struct CompiledMatch {
    facility: Option<Vec<u8>>,
    severity: Option<Vec<u8>>,
    hostname_pattern: Option<Regex>,
    message_pattern: Option<Regex>,
}

struct CompiledRule {
    name: String,
    match_: Option<CompiledMatch>,
    action: FilterAction,
    destinations: Vec<String>,
    transforms: Vec<String>,
}

fn compile_match(m: &FilterMatch) -> Result<CompiledMatch, regex::Error> {
    let facility = m.facility.as_ref().map(|names| {
        names.iter().filter_map(|n| facility_code(n)).collect()
    });
    let severity = m.severity.as_ref().map(|names| {
        names.iter().filter_map(|n| severity_code(n)).collect()
    });
    let hostname_pattern = m.hostname_pattern.as_deref().map(Regex::new).transpose()?;
    let message_pattern = m.message_pattern.as_deref().map(Regex::new).transpose()?;
    Ok(CompiledMatch {
        facility,
        severity,
        hostname_pattern,
        message_pattern,
    })
}

fn compile_rule(rule: &FilterConfig) -> Result<CompiledRule, regex::Error> {
    Ok(CompiledRule {
        name: rule.name.clone(),
        match_: rule.match_.as_ref().map(compile_match).transpose()?,
        action: rule.action,
        destinations: rule.destinations.clone().unwrap_or_default(),
        transforms: rule.transforms.clone().unwrap_or_default(),
    })
}

fn rule_matches(rule: &CompiledRule, message: &SyslogMessage) -> bool {
    let Some(m) = &rule.match_ else {
        return true;
    };

    if let Some(facilities) = &m.facility {
        if !facilities.contains(&message.facility) {
            return false;
        }
    }
    if let Some(severities) = &m.severity {
        if !severities.contains(&message.severity) {
            return false;
        }
    }
    if let Some(pattern) = &m.hostname_pattern {
        match &message.hostname {
            Some(hostname) => {
                if !pattern.is_match(hostname) {
                    return false;
                }
            }
            None => return false,
        }
    }
    if let Some(pattern) = &m.message_pattern {
        if !pattern.is_match(&message.message) {
            return false;
        }
    }

    true
}

/// Evaluates ordered filter rules against messages with first-match-wins semantics.
///
/// Holds no per-message state; compiled rules are swapped atomically on `reload`.
pub struct FilterEngine {
    rules: RwLock<Arc<Vec<CompiledRule>>>,
    metrics: Arc<Metrics>,
}

impl FilterEngine {
    pub fn new(rules: &[FilterConfig], metrics: Arc<Metrics>) -> Result<Self, regex::Error> {
        let compiled = rules.iter().map(compile_rule).collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            rules: RwLock::new(Arc::new(compiled)),
            metrics,
        })
    }

    /// Atomically replace the compiled rule set. In-flight `evaluate` calls observe
    /// either the old or the new set, never a partially replaced one.
    pub fn reload(&self, rules: &[FilterConfig]) -> Result<(), regex::Error> {
        let compiled = rules.iter().map(compile_rule).collect::<Result<Vec<_>, _>>()?;
        *self.rules.write() = Arc::new(compiled);
        Ok(())
    }

    pub fn evaluate(&self, message: &SyslogMessage) -> FilterResult {
        let started = Instant::now();
        let rules = self.rules.read().clone();

        let result = rules
            .iter()
            .find(|rule| rule_matches(rule, message))
            .map(|rule| FilterResult {
                matched: true,
                filter_name: Some(rule.name.clone()),
                action: rule.action,
                destinations: rule.destinations.clone(),
                transforms: rule.transforms.clone(),
            })
            .unwrap_or(FilterResult {
                matched: false,
                filter_name: None,
                action: FilterAction::Drop,
                destinations: Vec::new(),
                transforms: Vec::new(),
            });

        let label = result.filter_name.as_deref().unwrap_or("none");
        self.metrics.observe_processing_latency(label, started.elapsed().as_secs_f64());

        if result.action == FilterAction::Drop {
            let reason = match &result.filter_name {
                Some(name) => format!("filter:{name}"),
                None => "no_match".to_string(),
            };
            self.metrics.inc_messages_dropped(&reason);
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn engine(rules: Vec<FilterConfig>) -> FilterEngine {
        FilterEngine::new(&rules, Arc::new(Metrics::new())).unwrap()
    }

    fn rule(name: &str, action: FilterAction, destinations: Vec<&str>) -> FilterConfig {
        FilterConfig {
            name: name.to_string(),
            match_: None,
            action,
            destinations: Some(destinations.into_iter().map(String::from).collect()),
            transforms: None,
        }
    }

    #[test]
    fn first_match_wins() {
        let mut critical = rule("critical", FilterAction::Forward, vec!["alerts"]);
        critical.match_ = Some(FilterMatch {
            severity: Some(vec!["crit".to_string()]),
            ..Default::default()
        });
        let mut auth = rule("auth", FilterAction::Forward, vec!["siem"]);
        auth.match_ = Some(FilterMatch {
            facility: Some(vec!["auth".to_string()]),
            ..Default::default()
        });
        let default = rule("default", FilterAction::Forward, vec!["central"]);

        let engine = engine(vec![critical, auth, default]);
        let msg = parse(b"<34>1 - - - - - - hi").unwrap(); // facility=auth(4), severity=crit(2)
        let result = engine.evaluate(&msg);

        assert_eq!(result.filter_name.as_deref(), Some("critical"));
        assert_eq!(result.destinations, vec!["alerts".to_string()]);
    }

    #[test]
    fn no_match_drops_with_no_match_reason() {
        let engine = engine(vec![]);
        let msg = parse(b"<34>1 - - - - - - hi").unwrap();
        let result = engine.evaluate(&msg);
        assert!(!result.matched);
        assert_eq!(result.action, FilterAction::Drop);
    }

    #[test]
    fn catch_all_rule_with_no_match_predicate_matches_everything() {
        let engine = engine(vec![rule("default", FilterAction::Forward, vec!["central"])]);
        let msg = parse(b"<191>1 - - - - - - hi").unwrap();
        let result = engine.evaluate(&msg);
        assert_eq!(result.filter_name.as_deref(), Some("default"));
    }

    #[test]
    fn hostname_pattern_does_not_match_absent_hostname() {
        let mut r = rule("has-host", FilterAction::Forward, vec!["central"]);
        r.match_ = Some(FilterMatch {
            hostname_pattern: Some("example".to_string()),
            ..Default::default()
        });
        let engine = engine(vec![r]);
        let msg = parse(b"<34>1 - - - - - - hi").unwrap(); // no hostname
        let result = engine.evaluate(&msg);
        assert!(!result.matched);
    }

    #[test]
    fn severity_set_membership_is_disjunctive() {
        let mut r = rule("sev", FilterAction::Forward, vec!["central"]);
        r.match_ = Some(FilterMatch {
            severity: Some(vec!["crit".to_string(), "err".to_string()]),
            ..Default::default()
        });
        let engine = engine(vec![r]);

        let crit = parse(b"<2>1 - - - - - - hi").unwrap(); // facility=0,severity=2=crit
        assert!(engine.evaluate(&crit).matched);

        let warning = parse(b"<4>1 - - - - - - hi").unwrap(); // severity=4=warning
        assert!(!engine.evaluate(&warning).matched);
    }

    #[test]
    fn reload_swaps_rule_set() {
        let engine = engine(vec![rule("a", FilterAction::Forward, vec!["central"])]);
        engine.reload(&[rule("b", FilterAction::Forward, vec!["other"])]).unwrap();
        let msg = parse(b"<34>1 - - - - - - hi").unwrap();
        let result = engine.evaluate(&msg);
        assert_eq!(result.filter_name.as_deref(), Some("b"));
    }
}
