//! Alert State & Cooldown Gate (C6) — decides whether a triggered monitor
//! result is allowed to reach the notification dispatcher, or is dropped as
//! still within its cooldown window.

use chrono::{DateTime, Utc};

use crate::domain::{MonitorDefinition, MonitorResult};
use crate::monitors::MonitorEvaluator;

/// Outcome of passing a triggered result through the cooldown gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Dispatch now; the caller must call `record_notified` after a
    /// successful send so the cooldown window starts from delivery.
    Dispatch,
    /// Still within cooldown; `remaining_seconds` until eligible again.
    Suppressed { remaining_seconds: i64 },
}

/// Stateless gate function: not triggered results never reach here. Pass
/// `last_notified` (read from the evaluator's per-(monitor, destination)
/// state) and the definition's cooldown.
pub fn gate(last_notified: Option<DateTime<Utc>>, cooldown_minutes: i64, now: DateTime<Utc>) -> GateDecision {
    match last_notified {
        None => GateDecision::Dispatch,
        Some(last) => {
            let eligible_at = last + chrono::Duration::minutes(cooldown_minutes);
            if now >= eligible_at {
                GateDecision::Dispatch
            } else {
                GateDecision::Suppressed {
                    remaining_seconds: (eligible_at - now).num_seconds().max(0),
                }
            }
        }
    }
}

/// Filter a batch of evaluation results down to those that should be
/// dispatched right now, consulting and updating the evaluator's per-state
/// `last_notified` bookkeeping is the caller's responsibility post-dispatch.
pub fn filter_dispatchable<'a>(
    results: &'a [MonitorResult],
    definitions: &[MonitorDefinition],
    evaluator: &MonitorEvaluator,
    now: DateTime<Utc>,
) -> Vec<&'a MonitorResult> {
    results
        .iter()
        .filter(|r| r.triggered)
        .filter(|r| {
            let Some(def) = definitions.iter().find(|d| d.name == r.monitor_name) else {
                return false;
            };
            let last_notified = evaluator.last_notified(&r.monitor_name, &r.destination);
            matches!(gate(last_notified, def.cooldown_minutes_or_default(), now), GateDecision::Dispatch)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_trigger_with_no_history_dispatches() {
        let now = Utc::now();
        assert_eq!(gate(None, 15, now), GateDecision::Dispatch);
    }

    #[test]
    fn within_cooldown_window_is_suppressed() {
        let now = Utc::now();
        let last = now - chrono::Duration::minutes(5);
        let decision = gate(Some(last), 15, now);
        match decision {
            GateDecision::Suppressed { remaining_seconds } => {
                assert!(remaining_seconds > 0 && remaining_seconds <= 600);
            }
            _ => panic!("expected suppression within cooldown"),
        }
    }

    #[test]
    fn cooldown_expiry_dispatches_again() {
        let now = Utc::now();
        let last = now - chrono::Duration::minutes(16);
        assert_eq!(gate(Some(last), 15, now), GateDecision::Dispatch);
    }

    #[test]
    fn exact_boundary_is_eligible() {
        let now = Utc::now();
        let last = now - chrono::Duration::minutes(15);
        assert_eq!(gate(Some(last), 15, now), GateDecision::Dispatch);
    }
}
