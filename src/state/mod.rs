//! Discrete operational state machine.
//!
//! Raw metrics are classified into one of six [`SystemState`]s by a pure,
//! total function. The [`SystemStateMachine`] holds the current value and
//! notifies subscribers synchronously, in registration order, and only when
//! the value actually changes.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::callback::call_guarded;
use crate::config::StateThresholds;

// ============================================================================
// SystemState
// ============================================================================

/// Coarse operational health of the host system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemState {
    Stable,
    Processing,
    Warning,
    Danger,
    /// Nothing is known yet. This is the start-up value.
    #[default]
    Unknown,
    Offline,
}

impl SystemState {
    /// Every state, in declaration order.
    pub const ALL: [SystemState; 6] = [
        SystemState::Stable,
        SystemState::Processing,
        SystemState::Warning,
        SystemState::Danger,
        SystemState::Unknown,
        SystemState::Offline,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stable => "stable",
            Self::Processing => "processing",
            Self::Warning => "warning",
            Self::Danger => "danger",
            Self::Unknown => "unknown",
            Self::Offline => "offline",
        }
    }

    /// Whether this state signals trouble (`warning` or `danger`).
    pub fn is_degraded(self) -> bool {
        matches!(self, Self::Warning | Self::Danger)
    }
}

impl fmt::Display for SystemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Metrics
// ============================================================================

/// One reading from the metrics feed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemMetrics {
    /// Cpu usage, percent.
    pub cpu: f64,
    /// Memory usage, percent.
    pub memory: f64,
    pub errors: u32,
    pub connections: u32,
}

impl SystemMetrics {
    /// Normalized load in [0, 1]: the busier of cpu and memory.
    pub fn load(&self) -> f32 {
        let load = (self.cpu.max(self.memory) / 100.0) as f32;
        if load.is_finite() {
            load.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    fn any_nonzero(&self) -> bool {
        self.cpu != 0.0 || self.memory != 0.0 || self.errors != 0 || self.connections != 0
    }
}

/// Classify a metrics reading.
///
/// Rules are checked in fixed priority order, so the error count always
/// outranks resource pressure:
///
/// 1. errors above `danger_error_count` → `danger`
/// 2. any error → `warning`
/// 3. cpu or memory above critical → `danger`
/// 4. cpu or memory above warning → `warning`
/// 5. connections above threshold → `processing`
/// 6. any nonzero metric → `stable`
/// 7. otherwise `unknown`
pub fn determine_state_from_metrics(
    metrics: &SystemMetrics,
    thresholds: &StateThresholds,
) -> SystemState {
    if metrics.errors > thresholds.danger_error_count {
        SystemState::Danger
    } else if metrics.errors > 0 {
        SystemState::Warning
    } else if metrics.cpu > thresholds.cpu_critical || metrics.memory > thresholds.memory_critical
    {
        SystemState::Danger
    } else if metrics.cpu > thresholds.cpu_warning || metrics.memory > thresholds.memory_warning {
        SystemState::Warning
    } else if metrics.connections > thresholds.connection_threshold {
        SystemState::Processing
    } else if metrics.any_nonzero() {
        SystemState::Stable
    } else {
        SystemState::Unknown
    }
}

// ============================================================================
// Subscriptions
// ============================================================================

/// A state change as seen by subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: SystemState,
    pub to: SystemState,
}

type StateHandler = Arc<dyn Fn(StateTransition) + Send + Sync>;

#[derive(Default)]
struct SubscriberList {
    next_id: u64,
    entries: Vec<(u64, StateHandler)>,
}

/// Handle returned by [`SystemStateMachine::on_state_change`].
///
/// Dropping the handle keeps the subscription alive; call
/// [`unsubscribe`](Self::unsubscribe) to remove it.
#[must_use = "keep the subscription to be able to unsubscribe"]
pub struct Subscription {
    id: u64,
    list: Weak<Mutex<SubscriberList>>,
}

impl Subscription {
    /// Remove the callback. Returns `false` if it was already gone.
    pub fn unsubscribe(self) -> bool {
        let Some(list) = self.list.upgrade() else {
            return false;
        };
        let mut list = list.lock();
        let before = list.entries.len();
        list.entries.retain(|(id, _)| *id != self.id);
        list.entries.len() != before
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Subscription({})", self.id)
    }
}

// ============================================================================
// SystemStateMachine
// ============================================================================

/// Holds the current [`SystemState`] and fans out changes.
pub struct SystemStateMachine {
    current: SystemState,
    previous: Option<SystemState>,
    thresholds: StateThresholds,
    subscribers: Arc<Mutex<SubscriberList>>,
}

impl fmt::Debug for SystemStateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemStateMachine")
            .field("current", &self.current)
            .field("previous", &self.previous)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl Default for SystemStateMachine {
    fn default() -> Self {
        Self::new(StateThresholds::default())
    }
}

impl SystemStateMachine {
    pub fn new(thresholds: StateThresholds) -> Self {
        Self {
            current: SystemState::default(),
            previous: None,
            thresholds,
            subscribers: Arc::new(Mutex::new(SubscriberList::default())),
        }
    }

    pub fn current(&self) -> SystemState {
        self.current
    }

    /// The state held before the most recent change.
    pub fn previous(&self) -> Option<SystemState> {
        self.previous
    }

    pub fn thresholds(&self) -> &StateThresholds {
        &self.thresholds
    }

    /// Assign a new state.
    ///
    /// Assigning the current value is a no-op and notifies nobody.
    /// Otherwise every subscriber is called before this returns.
    pub fn set_state(&mut self, state: SystemState) -> Option<StateTransition> {
        if state == self.current {
            return None;
        }
        let transition = StateTransition {
            from: self.current,
            to: state,
        };
        self.previous = Some(self.current);
        self.current = state;
        log::debug!("[SystemStateMachine] {} -> {}", transition.from, transition.to);

        // Snapshot so callbacks may unsubscribe without deadlocking.
        let handlers: Vec<(u64, StateHandler)> = self.subscribers.lock().entries.clone();
        for (id, handler) in handlers {
            call_guarded("SystemStateMachine", &id.to_string(), || handler(transition));
        }
        Some(transition)
    }

    /// Classify `metrics` and assign the result.
    pub fn update_from_metrics(&mut self, metrics: &SystemMetrics) -> Option<StateTransition> {
        let state = determine_state_from_metrics(metrics, &self.thresholds);
        self.set_state(state)
    }

    /// Classify `metrics` with this machine's thresholds without changing state.
    pub fn classify(&self, metrics: &SystemMetrics) -> SystemState {
        determine_state_from_metrics(metrics, &self.thresholds)
    }

    /// Register a callback for state changes.
    pub fn on_state_change<F>(&self, callback: F) -> Subscription
    where
        F: Fn(StateTransition) + Send + Sync + 'static,
    {
        let mut list = self.subscribers.lock();
        let id = list.next_id;
        list.next_id += 1;
        list.entries.push((id, Arc::new(callback)));
        Subscription {
            id,
            list: Arc::downgrade(&self.subscribers),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().entries.len()
    }

    /// Restore the start-up state. Subscriptions survive and are not notified.
    pub fn reset(&mut self) {
        self.current = SystemState::default();
        self.previous = None;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn classify(metrics: SystemMetrics) -> SystemState {
        determine_state_from_metrics(&metrics, &StateThresholds::default())
    }

    #[test]
    fn test_error_count_outranks_cpu() {
        let m = SystemMetrics {
            errors: 15,
            cpu: 10.0,
            ..Default::default()
        };
        assert_eq!(classify(m), SystemState::Danger);
    }

    #[test]
    fn test_cpu_thresholds() {
        let hot = SystemMetrics {
            cpu: 95.0,
            ..Default::default()
        };
        let warm = SystemMetrics {
            cpu: 75.0,
            ..Default::default()
        };
        assert_eq!(classify(hot), SystemState::Danger);
        assert_eq!(classify(warm), SystemState::Warning);
    }

    #[test]
    fn test_classification_ladder() {
        let few_errors = SystemMetrics {
            errors: 2,
            cpu: 99.0,
            ..Default::default()
        };
        assert_eq!(classify(few_errors), SystemState::Warning);

        let memory = SystemMetrics {
            memory: 91.0,
            ..Default::default()
        };
        assert_eq!(classify(memory), SystemState::Danger);

        let busy = SystemMetrics {
            cpu: 20.0,
            connections: 80,
            ..Default::default()
        };
        assert_eq!(classify(busy), SystemState::Processing);

        let idle = SystemMetrics {
            cpu: 5.0,
            ..Default::default()
        };
        assert_eq!(classify(idle), SystemState::Stable);

        assert_eq!(classify(SystemMetrics::default()), SystemState::Unknown);
    }

    #[test]
    fn test_nan_metrics_still_classify() {
        let m = SystemMetrics {
            cpu: f64::NAN,
            ..Default::default()
        };
        assert_eq!(classify(m), SystemState::Stable);
        assert_eq!(m.load(), 0.0);
    }

    #[test]
    fn test_same_state_is_a_no_op() {
        let mut machine = SystemStateMachine::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let _sub = machine.on_state_change(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        assert!(machine.set_state(SystemState::Stable).is_some());
        assert!(machine.set_state(SystemState::Stable).is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(machine.previous(), Some(SystemState::Unknown));
    }

    #[test]
    fn test_subscribers_called_in_registration_order() {
        let mut machine = SystemStateMachine::default();
        let order = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            let order = order.clone();
            let _ = machine.on_state_change(move |t| order.lock().push((tag, t.to)));
        }
        machine.set_state(SystemState::Danger);
        let seen = order.lock().clone();
        assert_eq!(
            seen,
            vec![
                ("first", SystemState::Danger),
                ("second", SystemState::Danger),
                ("third", SystemState::Danger)
            ]
        );
    }

    #[test]
    fn test_unsubscribe_stops_notifications() {
        let mut machine = SystemStateMachine::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let sub = machine.on_state_change(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        machine.set_state(SystemState::Warning);
        assert!(sub.unsubscribe());
        machine.set_state(SystemState::Stable);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(machine.subscriber_count(), 0);
    }

    #[test]
    fn test_panicking_subscriber_does_not_block_others() {
        let mut machine = SystemStateMachine::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let _bad = machine.on_state_change(|_| panic!("renderer exploded"));
        let c = calls.clone();
        let _good = machine.on_state_change(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert!(machine.set_state(SystemState::Offline).is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(machine.current(), SystemState::Offline);
    }

    #[test]
    fn test_update_from_metrics_and_reset() {
        let mut machine = SystemStateMachine::default();
        let t = machine
            .update_from_metrics(&SystemMetrics {
                cpu: 95.0,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(t.to, SystemState::Danger);
        machine.reset();
        assert_eq!(machine.current(), SystemState::Unknown);
        assert_eq!(machine.previous(), None);
    }
}
