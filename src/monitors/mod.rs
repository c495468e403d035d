//! Monitor Evaluator (C5) — pattern-matches destinations to monitor
//! definitions, maintains per-(monitor, destination) windowed state, and
//! produces evaluation results.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::collector::CurrentStatsMap;
use crate::config::defaults::MONITOR_STATE_BUFFER_CAPACITY;
use crate::domain::{DestinationIdentity, MonitorDefinition, MonitorResult, MonitorType, Severity};

/// Key into the monitor-state map: (monitor name, destination identity).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StateKey {
    pub monitor_name: String,
    pub destination: DestinationIdentity,
}

/// Windowed per-(monitor, destination) state: last-triggered/last-notified
/// instants, a consecutive-triggered count, and a bounded FIFO of observed
/// values backing the baseline mean/stddev.
#[derive(Debug, Clone, Default)]
pub struct MonitorState {
    pub last_triggered: Option<DateTime<Utc>>,
    pub last_notified: Option<DateTime<Utc>>,
    pub consecutive_triggered: u32,
    buffer: VecDeque<f64>,
}

impl MonitorState {
    fn push(&mut self, value: f64) {
        if self.buffer.len() >= MONITOR_STATE_BUFFER_CAPACITY {
            self.buffer.pop_front();
        }
        self.buffer.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Mean over the full buffer (defined iff non-empty).
    pub fn baseline_mean(&self) -> Option<f64> {
        if self.buffer.is_empty() {
            return None;
        }
        Some(self.buffer.iter().sum::<f64>() / self.buffer.len() as f64)
    }

    /// Population standard deviation over the full buffer.
    pub fn baseline_stddev(&self) -> Option<f64> {
        let mean = self.baseline_mean()?;
        let variance =
            self.buffer.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / self.buffer.len() as f64;
        Some(variance.sqrt())
    }

    /// Mean of the last `window` samples (proxy for the evaluation window).
    pub fn recent_avg(&self, window: usize) -> Option<f64> {
        if self.buffer.is_empty() {
            return None;
        }
        let window = window.min(self.buffer.len()).max(1);
        let recent: Vec<f64> = self.buffer.iter().rev().take(window).copied().collect();
        Some(recent.iter().sum::<f64>() / recent.len() as f64)
    }
}

/// A capability gate for license-tiered features (monitors + dependent API
/// surfaces). A pure predicate, consulted at each entry point rather than
/// threaded through the evaluation logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LicenseTier {
    Free,
    Pro,
}

impl LicenseTier {
    pub fn from_key(key: Option<&str>) -> Self {
        match key {
            Some(k) if !k.trim().is_empty() => LicenseTier::Pro,
            _ => LicenseTier::Free,
        }
    }

    pub fn monitors_enabled(self) -> bool {
        matches!(self, LicenseTier::Pro)
    }
}

pub struct MonitorEvaluator {
    definitions: Vec<MonitorDefinition>,
    states: DashMap<StateKey, MonitorState>,
    tier: LicenseTier,
}

impl MonitorEvaluator {
    pub fn new(definitions: Vec<MonitorDefinition>, tier: LicenseTier) -> Self {
        Self {
            definitions,
            states: DashMap::new(),
            tier,
        }
    }

    pub fn definitions(&self) -> &[MonitorDefinition] {
        &self.definitions
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    /// Evaluate every enabled definition against the current stats snapshot.
    /// Returns all results (triggered and not) — callers filter for
    /// `triggered` before forwarding to the cooldown gate.
    pub fn evaluate_cycle(&self, current_stats: &CurrentStatsMap) -> Vec<MonitorResult> {
        if !self.tier.monitors_enabled() {
            return Vec::new();
        }

        let mut results = Vec::new();
        let now = Utc::now();

        for def in self.definitions.iter().filter(|d| d.enabled) {
            let regex = def.compiled_target();
            let window = def.evaluation_window_minutes_or_default();

            for entry in current_stats.iter() {
                let key = entry.key();
                if !regex.is_match(&key.queue_name) {
                    continue;
                }

                let identity = DestinationIdentity {
                    destination_name: key.queue_name.clone(),
                    environment_name: key.environment.clone(),
                    region: key.region.clone(),
                };
                let state_key = StateKey {
                    monitor_name: def.name.clone(),
                    destination: identity.clone(),
                };

                let mut state = self.states.entry(state_key).or_default();
                let result = evaluate_one(def, &identity, entry.value().stats, entry.value().is_dlq, &mut state, window, now);

                if result.triggered {
                    state.last_triggered = Some(now);
                    state.consecutive_triggered += 1;
                } else {
                    state.consecutive_triggered = 0;
                }

                results.push(result);
            }
        }

        results
    }

    pub fn mark_notified(&self, monitor_name: &str, destination: &DestinationIdentity, at: DateTime<Utc>) {
        if let Some(mut state) = self.states.get_mut(&StateKey {
            monitor_name: monitor_name.to_string(),
            destination: destination.clone(),
        }) {
            state.last_notified = Some(at);
        }
    }

    pub fn last_notified(&self, monitor_name: &str, destination: &DestinationIdentity) -> Option<DateTime<Utc>> {
        self.states
            .get(&StateKey {
                monitor_name: monitor_name.to_string(),
                destination: destination.clone(),
            })
            .and_then(|s| s.last_notified)
    }
}

fn evaluate_one(
    def: &MonitorDefinition,
    identity: &DestinationIdentity,
    stats: crate::domain::QueueStats,
    is_dlq: bool,
    state: &mut MonitorState,
    window: usize,
    now: DateTime<Utc>,
) -> MonitorResult {
    let mut metadata = std::collections::HashMap::new();

    let (current_value, triggered, message) = match def.monitor_type {
        MonitorType::QueueDepth => {
            let value = stats.messages_in_queue as f64;
            state.push(value);
            let triggered = def.condition.evaluate(value, def.threshold);
            (value, triggered, format!("messagesInQueue={value} threshold={}", def.threshold))
        }
        MonitorType::DlqAlert => {
            let value = stats.messages_in_queue as f64;
            state.push(value);
            let triggered = is_dlq && def.condition.evaluate(value, def.threshold);
            metadata.insert("is_dlq".to_string(), serde_json::json!(is_dlq));
            (value, triggered, format!("dlq messagesInQueue={value} threshold={}", def.threshold))
        }
        MonitorType::ThroughputDrop | MonitorType::ThroughputSpike => {
            let value = stats.messages_received as f64;
            state.push(value);
            if state.len() < 2 {
                (value, false, "insufficient history for throughput comparison".to_string())
            } else {
                let recent_avg = state.recent_avg(window).unwrap_or(value);
                let baseline_avg = state.baseline_mean().unwrap_or(value);
                if baseline_avg == 0.0 {
                    (value, false, "baseline average is zero, cannot compute percent change".to_string())
                } else {
                    let pct_change = ((recent_avg - baseline_avg) / baseline_avg) * 100.0;
                    metadata.insert("percentChange".to_string(), serde_json::json!(pct_change));
                    let triggered = if def.monitor_type == MonitorType::ThroughputDrop {
                        pct_change <= def.threshold
                    } else {
                        pct_change >= def.threshold
                    };
                    (
                        value,
                        triggered,
                        format!("recentAvg={recent_avg:.2} baselineAvg={baseline_avg:.2} pctChange={pct_change:.2}"),
                    )
                }
            }
        }
        MonitorType::QueueHealth => {
            let score = crate::monitors::health::composite_score(&stats, is_dlq, state);
            state.push(score);
            let triggered = def.condition.evaluate(score, def.threshold);
            (score, triggered, format!("healthScore={score:.2} threshold={}", def.threshold))
        }
        MonitorType::Custom => (0.0, false, "custom monitor type is reserved and never triggers".to_string()),
    };

    MonitorResult {
        monitor_name: def.name.clone(),
        destination: identity.clone(),
        triggered,
        current_value,
        threshold: def.threshold,
        message,
        severity: severity_for(def, triggered),
        evaluated_at: now,
        metadata,
    }
}

fn severity_for(def: &MonitorDefinition, triggered: bool) -> Severity {
    if triggered {
        def.severity
    } else {
        Severity::Info
    }
}

pub mod health {
    use crate::domain::QueueStats;
    use crate::monitors::MonitorState;

    /// Composite health score in [0, 100], starting at 100 and subtracting
    /// weighted penalties.
    pub fn composite_score(stats: &QueueStats, is_dlq: bool, state: &MonitorState) -> f64 {
        let mut score = 100.0;

        let depth_penalty = (20.0_f64).min((stats.messages_in_queue as f64 + 1.0).log10() * 5.0);
        score -= depth_penalty;

        if is_dlq && stats.messages_in_queue > 0 {
            score -= 30.0;
        }

        if stats.messages_received > 0 {
            let lag_ratio = stats.messages_in_flight as f64 / stats.messages_received as f64;
            if lag_ratio > 0.1 {
                score -= (25.0_f64).min(lag_ratio * 50.0);
            }
        }

        if let (Some(mean), Some(stddev)) = (state.baseline_mean(), state.baseline_stddev()) {
            if mean > 0.0 {
                let cv = stddev / mean;
                if cv > 0.5 {
                    score -= (15.0_f64).min(cv * 20.0);
                }
            }
        }

        score.clamp(0.0, 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{QueueStats, ThresholdCondition};

    fn def(monitor_type: MonitorType, condition: ThresholdCondition, threshold: f64) -> MonitorDefinition {
        MonitorDefinition {
            name: "m1".to_string(),
            monitor_type,
            target: "*".to_string(),
            condition,
            threshold,
            evaluation_window_minutes: Some(2),
            cooldown_minutes: Some(15),
            severity: Severity::Warning,
            channels: vec![],
            enabled: true,
        }
    }

    fn identity() -> DestinationIdentity {
        DestinationIdentity {
            destination_name: "orders".to_string(),
            environment_name: "Prod".to_string(),
            region: "us-east-1".to_string(),
        }
    }

    #[test]
    fn baseline_matches_mean_and_population_stddev() {
        let mut state = MonitorState::default();
        for v in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            state.push(v);
        }
        let mean = state.baseline_mean().unwrap();
        let stddev = state.baseline_stddev().unwrap();
        assert!((mean - 5.0).abs() < 1e-9);
        assert!((stddev - 2.0).abs() < 1e-9);
    }

    #[test]
    fn buffer_evicts_oldest_beyond_capacity() {
        let mut state = MonitorState::default();
        for v in 0..150 {
            state.push(v as f64);
        }
        assert_eq!(state.len(), 100);
        // Oldest 50 values (0..50) were evicted; mean should reflect 50..150.
        let expected_mean: f64 = (50..150).sum::<i32>() as f64 / 100.0;
        assert!((state.baseline_mean().unwrap() - expected_mean).abs() < 1e-9);
    }

    #[test]
    fn queue_depth_triggers_on_condition() {
        let d = def(MonitorType::QueueDepth, ThresholdCondition::Gt, 5.0);
        let mut state = MonitorState::default();
        let stats = QueueStats {
            messages_in_queue: 7,
            ..Default::default()
        };
        let result = evaluate_one(&d, &identity(), stats, false, &mut state, 2, Utc::now());
        assert!(result.triggered);
        assert_eq!(result.current_value, 7.0);
    }

    #[test]
    fn dlq_alert_requires_heuristic_flag() {
        let d = def(MonitorType::DlqAlert, ThresholdCondition::Gt, 0.0);
        let mut state = MonitorState::default();
        let stats = QueueStats {
            messages_in_queue: 3,
            ..Default::default()
        };
        let not_dlq = evaluate_one(&d, &identity(), stats, false, &mut state, 2, Utc::now());
        assert!(!not_dlq.triggered);

        let mut state = MonitorState::default();
        let is_dlq = evaluate_one(&d, &identity(), stats, true, &mut state, 2, Utc::now());
        assert!(is_dlq.triggered);
    }

    #[test]
    fn throughput_drop_matches_spec_scenario_s3() {
        let d = def(MonitorType::ThroughputDrop, ThresholdCondition::PctChange, -50.0);
        let mut state = MonitorState::default();
        for v in [100.0, 100.0, 100.0, 100.0, 100.0, 40.0] {
            state.push(v);
        }
        let stats = QueueStats {
            messages_received: 40,
            ..Default::default()
        };
        // Append the 7th sample (also 40) as "the latest value" and evaluate.
        let result = evaluate_one(&d, &identity(), stats, false, &mut state, 2, Utc::now());
        assert!(result.triggered);
        let pct = result.metadata.get("percentChange").unwrap().as_f64().unwrap();
        assert!((pct - (-51.7)).abs() < 0.5, "pct={pct}");
    }

    #[test]
    fn throughput_needs_at_least_two_history_points() {
        let d = def(MonitorType::ThroughputDrop, ThresholdCondition::PctChange, -50.0);
        let mut state = MonitorState::default();
        let stats = QueueStats {
            messages_received: 10,
            ..Default::default()
        };
        let result = evaluate_one(&d, &identity(), stats, false, &mut state, 2, Utc::now());
        assert!(!result.triggered);
    }

    #[test]
    fn health_score_matches_spec_scenario_s6() {
        let state = MonitorState::default();
        let stats = QueueStats {
            messages_in_queue: 1000,
            messages_in_flight: 300,
            messages_received: 1000,
            ..Default::default()
        };
        let score = health::composite_score(&stats, false, &state);
        assert!((score - 69.98).abs() < 0.1, "score={score}");
    }

    #[test]
    fn custom_monitor_never_triggers() {
        let d = def(MonitorType::Custom, ThresholdCondition::Gt, 0.0);
        let mut state = MonitorState::default();
        let result = evaluate_one(&d, &identity(), QueueStats::default(), false, &mut state, 2, Utc::now());
        assert!(!result.triggered);
    }
}
