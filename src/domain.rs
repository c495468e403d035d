//! Core data model: entities shared across every component.
//!
//! Kept free of HTTP/JSON concerns — [`crate::client::decode`] absorbs the
//! upstream wire shapes before any of these types are constructed.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// A tenant ("organization") visible to the configured credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantRef {
    pub id: String,
    pub name: String,
}

/// An environment within a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentRef {
    pub id: String,
    pub name: String,
    pub tenant: TenantRef,
    pub env_type: String,
}

/// Attributes shared by both destination kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestinationCommon {
    pub id: String,
    pub display_name: Option<String>,
    pub environment_id: String,
    pub region: String,
    pub encrypted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueAttrs {
    pub fifo: bool,
    pub default_ttl: Option<i64>,
    pub max_deliveries: Option<i64>,
    pub dead_letter_destination_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeAttrs {}

/// A messaging destination, tagged by kind so the stats fetch method is
/// selected on the type rather than on a nullable-field flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Destination {
    Queue(DestinationCommon, QueueAttrs),
    Exchange(DestinationCommon, ExchangeAttrs),
}

impl Destination {
    pub fn common(&self) -> &DestinationCommon {
        match self {
            Destination::Queue(c, _) => c,
            Destination::Exchange(c, _) => c,
        }
    }

    pub fn id(&self) -> &str {
        &self.common().id
    }

    /// Display name, falling back to the identifier when absent.
    pub fn name(&self) -> &str {
        self.common()
            .display_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.common().id)
    }

    pub fn environment_id(&self) -> &str {
        &self.common().environment_id
    }

    pub fn region(&self) -> &str {
        &self.common().region
    }

    pub fn is_queue(&self) -> bool {
        matches!(self, Destination::Queue(..))
    }
}

/// Replace every character outside `[A-Za-z0-9_-]` with `_`; fall back to
/// `"unknown"` when the input is absent. Idempotent by construction.
pub fn sanitize_name(name: Option<&str>) -> String {
    match name {
        None => "unknown".to_string(),
        Some(n) if n.is_empty() => "unknown".to_string(),
        Some(n) => n
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect(),
    }
}

/// Name-based dead-letter-queue heuristic (spec.md §3's DLQ heuristic).
/// Operates on the sanitized name so the match is stable regardless of the
/// raw display name's punctuation.
pub fn is_dlq_heuristic(sanitized_name: &str) -> bool {
    let lower = sanitized_name.to_ascii_lowercase();
    lower.contains("dlq")
        || lower.contains("dead-letter")
        || lower.contains("deadletter")
        || lower.ends_with("-dead")
        || lower.ends_with("-dl")
}

/// Queue statistics for a single collection window, after array/scalar
/// normalization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    pub messages_in_queue: i64,
    pub messages_in_flight: i64,
    pub messages_sent: i64,
    pub messages_received: i64,
    pub messages_acked: i64,
    pub queue_size_bytes: Option<f64>,
    pub average_message_size: Option<f64>,
}

/// Exchange statistics for a single collection window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ExchangeStats {
    pub messages_published: i64,
    pub messages_delivered: i64,
}

/// Monitor threshold comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThresholdCondition {
    Gt,
    Lt,
    Gte,
    Lte,
    Eq,
    PctChange,
}

impl ThresholdCondition {
    /// Evaluate GT/LT/GTE/LTE/EQ. `PctChange` is handled by the throughput
    /// monitor types directly and should never reach this function.
    pub fn evaluate(self, current: f64, threshold: f64) -> bool {
        match self {
            ThresholdCondition::Gt => current > threshold,
            ThresholdCondition::Lt => current < threshold,
            ThresholdCondition::Gte => current >= threshold,
            ThresholdCondition::Lte => current <= threshold,
            ThresholdCondition::Eq => (current - threshold).abs() <= crate::config::defaults::EQ_EPSILON,
            ThresholdCondition::PctChange => {
                debug_assert!(false, "PctChange must be evaluated by throughput monitor types");
                false
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum MonitorType {
    QueueDepth,
    DlqAlert,
    ThroughputDrop,
    ThroughputSpike,
    QueueHealth,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

/// A configured monitor definition (spec.md §3's MonitorDefinition).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub monitor_type: MonitorType,
    pub target: String,
    pub condition: ThresholdCondition,
    pub threshold: f64,
    #[serde(default)]
    pub evaluation_window_minutes: Option<usize>,
    #[serde(default)]
    pub cooldown_minutes: Option<i64>,
    pub severity: Severity,
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl MonitorDefinition {
    /// The glob target compiled to an anchored, whole-string regex:
    /// `.` is literal, `*` becomes `.*`, `?` becomes `.`.
    pub fn compiled_target(&self) -> Regex {
        compile_glob(&self.target)
    }

    pub fn cooldown_minutes_or_default(&self) -> i64 {
        self.cooldown_minutes
            .unwrap_or(crate::config::defaults::MONITOR_DEFAULT_COOLDOWN_MINUTES)
    }

    pub fn evaluation_window_minutes_or_default(&self) -> usize {
        self.evaluation_window_minutes
            .unwrap_or(crate::config::defaults::MONITOR_DEFAULT_EVALUATION_WINDOW_MINUTES)
    }
}

/// Translate a `*`/`?` glob into an anchored whole-string regex.
pub fn compile_glob(pattern: &str) -> Regex {
    let mut out = String::with_capacity(pattern.len() * 2 + 2);
    out.push('^');
    for c in pattern.chars() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '.' | '+' | '(' | ')' | '[' | ']' | '{' | '}' | '|' | '^' | '$' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            other => out.push(other),
        }
    }
    out.push('$');
    // A malformed pattern (shouldn't happen once glob syntax above is
    // escaped correctly) degrades to matching nothing rather than panicking.
    Regex::new(&out).unwrap_or_else(|_| Regex::new("$^").expect("literal regex always compiles"))
}

/// Identity of a (monitor, destination) pair, used as the MonitorState key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DestinationIdentity {
    pub destination_name: String,
    pub environment_name: String,
    pub region: String,
}

/// A single evaluation result (spec.md §3's MonitorResult).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorResult {
    pub monitor_name: String,
    pub destination: DestinationIdentity,
    pub triggered: bool,
    pub current_value: f64,
    pub threshold: f64,
    pub message: String,
    pub severity: Severity,
    pub evaluated_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// A configured notification channel (spec.md §3's ChannelConfig).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ChannelConfig {
    Slack {
        name: String,
        webhook_url: String,
        #[serde(default = "default_true")]
        enabled: bool,
    },
    PagerDuty {
        name: String,
        routing_key: String,
        #[serde(default = "default_true")]
        enabled: bool,
    },
    Email {
        name: String,
        recipient: String,
        sender: String,
        #[serde(default = "default_true")]
        enabled: bool,
    },
    Teams {
        name: String,
        webhook_url: String,
        #[serde(default = "default_true")]
        enabled: bool,
    },
    Webhook {
        name: String,
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
        #[serde(default = "default_true")]
        enabled: bool,
    },
}

impl ChannelConfig {
    pub fn name(&self) -> &str {
        match self {
            ChannelConfig::Slack { name, .. }
            | ChannelConfig::PagerDuty { name, .. }
            | ChannelConfig::Email { name, .. }
            | ChannelConfig::Teams { name, .. }
            | ChannelConfig::Webhook { name, .. } => name,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ChannelConfig::Slack { .. } => "slack",
            ChannelConfig::PagerDuty { .. } => "pagerduty",
            ChannelConfig::Email { .. } => "email",
            ChannelConfig::Teams { .. } => "teams",
            ChannelConfig::Webhook { .. } => "webhook",
        }
    }

    pub fn enabled(&self) -> bool {
        match self {
            ChannelConfig::Slack { enabled, .. }
            | ChannelConfig::PagerDuty { enabled, .. }
            | ChannelConfig::Email { enabled, .. }
            | ChannelConfig::Teams { enabled, .. }
            | ChannelConfig::Webhook { enabled, .. } => *enabled,
        }
    }

    /// A channel is "configured" iff its mandatory type-specific fields are
    /// non-empty.
    pub fn is_configured(&self) -> bool {
        match self {
            ChannelConfig::Slack { webhook_url, .. } => !webhook_url.trim().is_empty(),
            ChannelConfig::PagerDuty { routing_key, .. } => !routing_key.trim().is_empty(),
            ChannelConfig::Email {
                recipient, sender, ..
            } => !recipient.trim().is_empty() && !sender.trim().is_empty(),
            ChannelConfig::Teams { webhook_url, .. } => !webhook_url.trim().is_empty(),
            ChannelConfig::Webhook { url, .. } => !url.trim().is_empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_idempotent_and_charset() {
        for raw in ["orders-dlq", "orders.v2!!", "", "already_ok-1"] {
            let once = sanitize_name(Some(raw));
            let twice = sanitize_name(Some(&once));
            assert_eq!(once, twice);
            assert!(
                once == "unknown" || once.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            );
        }
        assert_eq!(sanitize_name(None), "unknown");
    }

    #[test]
    fn dlq_heuristic_matches_spec_patterns() {
        assert!(is_dlq_heuristic("orders-dlq"));
        assert!(is_dlq_heuristic("orders_dead_letter"));
        assert!(is_dlq_heuristic("ORDERS-DEADLETTER"));
        assert!(is_dlq_heuristic("orders-dead"));
        assert!(is_dlq_heuristic("orders-dl"));
        assert!(!is_dlq_heuristic("orders"));
        assert!(!is_dlq_heuristic("orders-delivery"));
    }

    #[test]
    fn glob_matches_literal_dot_and_wildcards() {
        let re = compile_glob("order-*");
        assert!(re.is_match("order-123"));
        assert!(!re.is_match("orders"));

        let re = compile_glob("a.b");
        assert!(re.is_match("a.b"));
        assert!(!re.is_match("axb"));

        let re = compile_glob("q???");
        assert!(re.is_match("qabc"));
        assert!(!re.is_match("qab"));
    }

    #[test]
    fn channel_configured_requires_mandatory_fields() {
        let slack = ChannelConfig::Slack {
            name: "ops".into(),
            webhook_url: String::new(),
            enabled: true,
        };
        assert!(!slack.is_configured());

        let webhook = ChannelConfig::Webhook {
            name: "generic".into(),
            url: "https://example.com/hook".into(),
            headers: HashMap::new(),
            enabled: true,
        };
        assert!(webhook.is_configured());
    }
}
