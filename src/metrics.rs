//! Fixed-name Prometheus counters/gauges/histogram for the relay, hand-rolled
//! into the text exposition format rather than pulled through a metrics client.

use std::collections::HashMap;
use std::fmt::Write as _;

use parking_lot::RwLock;

const LATENCY_BUCKETS: [f64; 7] = [0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1];

struct Histogram {
    bucket_counts: Vec<u64>,
    sum: f64,
    count: u64,
}

impl Histogram {
    fn new() -> Self {
        Self {
            bucket_counts: vec![0; LATENCY_BUCKETS.len()],
            sum: 0.0,
            count: 0,
        }
    }

    fn observe(&mut self, value: f64) {
        for (i, bound) in LATENCY_BUCKETS.iter().enumerate() {
            if value <= *bound {
                self.bucket_counts[i] += 1;
            }
        }
        self.sum += value;
        self.count += 1;
    }
}

/// Holds every counter/gauge/histogram series the relay exposes, keyed by label set.
pub struct Metrics {
    messages_received: RwLock<HashMap<(String, String, String), u64>>,
    messages_forwarded: RwLock<HashMap<String, u64>>,
    messages_dropped: RwLock<HashMap<String, u64>>,
    messages_parse_errors: RwLock<HashMap<String, u64>>,
    destination_up: RwLock<HashMap<String, f64>>,
    processing_latency: RwLock<HashMap<String, Histogram>>,
    active_connections: RwLock<HashMap<String, i64>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            messages_received: RwLock::new(HashMap::new()),
            messages_forwarded: RwLock::new(HashMap::new()),
            messages_dropped: RwLock::new(HashMap::new()),
            messages_parse_errors: RwLock::new(HashMap::new()),
            destination_up: RwLock::new(HashMap::new()),
            processing_latency: RwLock::new(HashMap::new()),
            active_connections: RwLock::new(HashMap::new()),
        }
    }

    pub fn inc_messages_received(&self, protocol: &str, facility: &str, severity: &str) {
        *self
            .messages_received
            .write()
            .entry((protocol.to_string(), facility.to_string(), severity.to_string()))
            .or_insert(0) += 1;
    }

    pub fn inc_messages_forwarded(&self, destination: &str) {
        *self.messages_forwarded.write().entry(destination.to_string()).or_insert(0) += 1;
    }

    pub fn inc_messages_dropped(&self, reason: &str) {
        *self.messages_dropped.write().entry(reason.to_string()).or_insert(0) += 1;
    }

    pub fn inc_parse_errors(&self, protocol: &str) {
        *self.messages_parse_errors.write().entry(protocol.to_string()).or_insert(0) += 1;
    }

    pub fn set_destination_up(&self, destination: &str, up: bool) {
        self.destination_up
            .write()
            .insert(destination.to_string(), if up { 1.0 } else { 0.0 });
    }

    pub fn observe_processing_latency(&self, filter: &str, seconds: f64) {
        self.processing_latency
            .write()
            .entry(filter.to_string())
            .or_insert_with(Histogram::new)
            .observe(seconds);
    }

    pub fn inc_active_connections(&self, input: &str) {
        *self.active_connections.write().entry(input.to_string()).or_insert(0) += 1;
    }

    pub fn dec_active_connections(&self, input: &str) {
        *self.active_connections.write().entry(input.to_string()).or_insert(0) -= 1;
    }

    /// Render every series in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut out = String::new();

        writeln!(out, "# TYPE syslog_messages_received_total counter").ok();
        for ((protocol, facility, severity), count) in self.messages_received.read().iter() {
            writeln!(
                out,
                "syslog_messages_received_total{{protocol=\"{}\",facility=\"{}\",severity=\"{}\"}} {count}",
                escape(protocol),
                escape(facility),
                escape(severity)
            )
            .ok();
        }

        writeln!(out, "# TYPE syslog_messages_forwarded_total counter").ok();
        for (destination, count) in self.messages_forwarded.read().iter() {
            writeln!(
                out,
                "syslog_messages_forwarded_total{{destination=\"{}\"}} {count}",
                escape(destination)
            )
            .ok();
        }

        writeln!(out, "# TYPE syslog_messages_dropped_total counter").ok();
        for (reason, count) in self.messages_dropped.read().iter() {
            writeln!(
                out,
                "syslog_messages_dropped_total{{reason=\"{}\"}} {count}",
                escape(reason)
            )
            .ok();
        }

        writeln!(out, "# TYPE syslog_messages_parse_errors_total counter").ok();
        for (protocol, count) in self.messages_parse_errors.read().iter() {
            writeln!(
                out,
                "syslog_messages_parse_errors_total{{protocol=\"{}\"}} {count}",
                escape(protocol)
            )
            .ok();
        }

        writeln!(out, "# TYPE syslog_destination_up gauge").ok();
        for (destination, up) in self.destination_up.read().iter() {
            writeln!(
                out,
                "syslog_destination_up{{destination=\"{}\"}} {}",
                escape(destination),
                format_value(*up)
            )
            .ok();
        }

        writeln!(out, "# TYPE syslog_processing_latency_seconds histogram").ok();
        for (filter, hist) in self.processing_latency.read().iter() {
            let label = escape(filter);
            let mut cumulative = 0u64;
            for (i, bound) in LATENCY_BUCKETS.iter().enumerate() {
                cumulative = cumulative.max(hist.bucket_counts[i]);
                writeln!(
                    out,
                    "syslog_processing_latency_seconds_bucket{{filter=\"{label}\",le=\"{bound}\"}} {cumulative}"
                )
                .ok();
            }
            writeln!(
                out,
                "syslog_processing_latency_seconds_bucket{{filter=\"{label}\",le=\"+Inf\"}} {}",
                hist.count
            )
            .ok();
            writeln!(
                out,
                "syslog_processing_latency_seconds_sum{{filter=\"{label}\"}} {}",
                format_value(hist.sum)
            )
            .ok();
            writeln!(out, "syslog_processing_latency_seconds_count{{filter=\"{label}\"}} {}", hist.count).ok();
        }

        writeln!(out, "# TYPE syslog_active_connections gauge").ok();
        for (input, count) in self.active_connections.read().iter() {
            writeln!(
                out,
                "syslog_active_connections{{input=\"{}\"}} {count}",
                escape(input)
            )
            .ok();
        }

        out
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value.is_sign_positive() { "+Inf".to_string() } else { "-Inf".to_string() }
    } else if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_received_counter_with_labels() {
        let m = Metrics::new();
        m.inc_messages_received("udp", "auth", "crit");
        let rendered = m.render();
        assert!(rendered.contains(r#"syslog_messages_received_total{protocol="udp",facility="auth",severity="crit"} 1"#));
    }

    #[test]
    fn destination_up_gauge_reflects_latest_value() {
        let m = Metrics::new();
        m.set_destination_up("central", true);
        assert!(m.render().contains(r#"syslog_destination_up{destination="central"} 1"#));
        m.set_destination_up("central", false);
        assert!(m.render().contains(r#"syslog_destination_up{destination="central"} 0"#));
    }

    #[test]
    fn active_connections_increments_and_decrements() {
        let m = Metrics::new();
        m.inc_active_connections("in-tcp");
        m.inc_active_connections("in-tcp");
        m.dec_active_connections("in-tcp");
        assert!(m.render().contains(r#"syslog_active_connections{input="in-tcp"} 1"#));
    }

    #[test]
    fn histogram_counts_are_cumulative_across_buckets() {
        let m = Metrics::new();
        m.observe_processing_latency("default", 0.0002);
        let rendered = m.render();
        assert!(rendered.contains(r#"le="0.0001"} 0"#));
        assert!(rendered.contains(r#"le="0.0005"} 1"#));
        assert!(rendered.contains(r#"le="+Inf"} 1"#));
    }
}
