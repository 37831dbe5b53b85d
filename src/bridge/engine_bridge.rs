//! EngineBridge: owns the state machine and the event bus.
//!
//! Every state change goes through [`EngineBridge::set_state`], which
//! publishes the transition and then fans out presentation events in a
//! fixed order: sound cue, depth, motion speed.
//!
//! Alerts override the state immediately and schedule a revert to the
//! pre-alert state. The revert is unconditional: a second alert or a
//! manual change inside the window is overwritten when the first revert
//! fires.

use crate::config::AffectConfig;
use crate::runtime::scheduler::{Scheduler, TimerHandle};
use crate::runtime::task::AffectTask;
use crate::state::{StateTransition, SystemMetrics, SystemState, SystemStateMachine};

use super::bus::EventBus;
use super::events::{AlertSeverity, EventPayload, EventPriority};

/// Presentation constants for one state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatePresentation {
    pub sound_cue: &'static str,
    pub depth: f32,
    pub motion_speed: f32,
}

impl StatePresentation {
    pub fn for_state(state: SystemState) -> Self {
        let (sound_cue, depth, motion_speed) = match state {
            SystemState::Stable => ("ambient_soft", 1.0, 1.0),
            SystemState::Processing => ("processing_tick", 1.1, 1.2),
            SystemState::Warning => ("warning_tone", 1.2, 1.4),
            SystemState::Danger => ("alarm", 1.4, 1.8),
            SystemState::Unknown => ("ambient_hum", 1.0, 0.9),
            SystemState::Offline => ("power_down", 0.6, 0.3),
        };
        Self {
            sound_cue,
            depth,
            motion_speed,
        }
    }
}

/// What [`EngineBridge::emit_alert`] did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertOutcome {
    /// `None` if the state already matched the severity.
    pub transition: Option<StateTransition>,
    /// State the revert will restore.
    pub restore: SystemState,
    pub revert_timer: TimerHandle,
}

#[derive(Debug)]
pub struct EngineBridge {
    bus: EventBus,
    machine: SystemStateMachine,
    alert_revert_ms: u64,
    pending_reverts: Vec<TimerHandle>,
}

impl Default for EngineBridge {
    fn default() -> Self {
        Self::new(&AffectConfig::default())
    }
}

impl EngineBridge {
    pub fn new(config: &AffectConfig) -> Self {
        Self {
            bus: EventBus::new(config.history.event_capacity),
            machine: SystemStateMachine::new(config.thresholds.clone()),
            alert_revert_ms: config.timing.alert_revert_ms,
            pending_reverts: Vec::new(),
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// For subscribing and unsubscribing handlers.
    pub fn bus_mut(&mut self) -> &mut EventBus {
        &mut self.bus
    }

    pub fn state_machine(&self) -> &SystemStateMachine {
        &self.machine
    }

    pub fn state(&self) -> SystemState {
        self.machine.current()
    }

    /// Publish an arbitrary payload.
    pub fn emit(&mut self, payload: EventPayload, priority: EventPriority, now_ms: u64) {
        self.bus.emit(payload, priority, now_ms);
    }

    /// Assign a state; on change publish the transition and its fan-out.
    pub fn set_state(&mut self, state: SystemState, now_ms: u64) -> Option<StateTransition> {
        let transition = self.machine.set_state(state)?;
        self.bus.emit(
            EventPayload::StateChanged {
                from: transition.from,
                to: transition.to,
            },
            EventPriority::for_state(transition.to),
            now_ms,
        );
        self.handle_state_change(transition.to, now_ms);
        Some(transition)
    }

    /// Classify a metrics reading and assign the result.
    pub fn update_from_metrics(
        &mut self,
        metrics: &SystemMetrics,
        now_ms: u64,
    ) -> Option<StateTransition> {
        let state = self.machine.classify(metrics);
        self.set_state(state, now_ms)
    }

    /// Presentation fan-out for `state`, always sound, then depth, then
    /// motion speed.
    pub fn handle_state_change(&mut self, state: SystemState, now_ms: u64) {
        let p = StatePresentation::for_state(state);
        let priority = EventPriority::for_state(state);
        self.bus.emit(
            EventPayload::SoundCue {
                cue: p.sound_cue.to_string(),
                state,
            },
            priority,
            now_ms,
        );
        self.bus
            .emit(EventPayload::DepthChanged { depth: p.depth }, priority, now_ms);
        self.bus.emit(
            EventPayload::MotionSpeedChanged {
                speed: p.motion_speed,
            },
            priority,
            now_ms,
        );
    }

    /// Override the state for an alert and schedule the revert.
    pub fn emit_alert(
        &mut self,
        scheduler: &mut Scheduler<AffectTask>,
        severity: AlertSeverity,
        message: impl Into<String>,
    ) -> AlertOutcome {
        let now_ms = scheduler.now_ms();
        let restore = self.machine.current();
        let target = severity.mapped_state();
        let message = message.into();
        log::info!("[EngineBridge] {} alert: {}", severity, message);

        self.bus.emit(
            EventPayload::AlertRaised {
                severity,
                message,
                state: target,
            },
            severity.priority(),
            now_ms,
        );
        let transition = self.set_state(target, now_ms);
        if transition.is_none() {
            // No transition means no fan-out; the cue still plays.
            self.bus.emit(
                EventPayload::SoundCue {
                    cue: StatePresentation::for_state(target).sound_cue.to_string(),
                    state: target,
                },
                severity.priority(),
                now_ms,
            );
        }

        let revert_timer =
            scheduler.schedule_once(self.alert_revert_ms, AffectTask::AlertRevert { restore });
        self.pending_reverts.push(revert_timer);
        AlertOutcome {
            transition,
            restore,
            revert_timer,
        }
    }

    /// Revert timer callback.
    pub fn revert_alert(
        &mut self,
        handle: TimerHandle,
        restore: SystemState,
        now_ms: u64,
    ) -> Option<StateTransition> {
        self.pending_reverts.retain(|h| *h != handle);
        log::debug!("[EngineBridge] alert window over, restoring {}", restore);
        let transition = self.set_state(restore, now_ms);
        self.bus.emit(
            EventPayload::AlertReverted { restored: restore },
            EventPriority::Normal,
            now_ms,
        );
        transition
    }

    pub fn pending_alert_reverts(&self) -> usize {
        self.pending_reverts.len()
    }

    pub fn cancel_alert_reverts(&mut self, scheduler: &mut Scheduler<AffectTask>) {
        for handle in self.pending_reverts.drain(..) {
            scheduler.cancel(handle);
        }
    }

    /// Cancel pending reverts, restore the start-up state and clear history.
    /// Handlers stay registered.
    pub fn reset(&mut self, scheduler: &mut Scheduler<AffectTask>) {
        self.cancel_alert_reverts(scheduler);
        self.machine.reset();
        self.bus.clear_history();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::events::EventKind;

    fn kinds(bridge: &EngineBridge) -> Vec<EventKind> {
        bridge.bus().history().map(|e| e.kind()).collect()
    }

    fn run_reverts(bridge: &mut EngineBridge, scheduler: &mut Scheduler<AffectTask>, until: u64) {
        while let Some(fired) = scheduler.pop_due(until) {
            if let AffectTask::AlertRevert { restore } = fired.task {
                bridge.revert_alert(fired.handle, restore, fired.at_ms);
            }
        }
        scheduler.settle(until);
    }

    #[test]
    fn test_state_change_fan_out_order() {
        let mut bridge = EngineBridge::default();
        bridge.set_state(SystemState::Warning, 10);
        assert_eq!(
            kinds(&bridge),
            vec![
                EventKind::StateChanged,
                EventKind::SoundCue,
                EventKind::DepthChanged,
                EventKind::MotionSpeedChanged,
            ]
        );
    }

    #[test]
    fn test_same_state_emits_nothing() {
        let mut bridge = EngineBridge::default();
        bridge.set_state(SystemState::Stable, 0);
        let before = bridge.bus().history().len();
        assert!(bridge.set_state(SystemState::Stable, 1).is_none());
        assert_eq!(bridge.bus().history().len(), before);
    }

    #[test]
    fn test_metrics_drive_state() {
        let mut bridge = EngineBridge::default();
        let t = bridge.update_from_metrics(
            &SystemMetrics {
                cpu: 95.0,
                ..Default::default()
            },
            0,
        );
        assert_eq!(t.map(|t| t.to), Some(SystemState::Danger));
    }

    #[test]
    fn test_critical_alert_reverts_after_delay() {
        let mut scheduler = Scheduler::new();
        let mut bridge = EngineBridge::default();
        bridge.set_state(SystemState::Stable, 0);
        scheduler.settle(1_000);

        let outcome = bridge.emit_alert(&mut scheduler, AlertSeverity::Critical, "disk failing");
        assert_eq!(outcome.restore, SystemState::Stable);
        assert_ne!(bridge.state(), SystemState::Stable);
        assert_eq!(bridge.state(), SystemState::Danger);

        run_reverts(&mut bridge, &mut scheduler, 2_999);
        assert_eq!(bridge.state(), SystemState::Danger);
        run_reverts(&mut bridge, &mut scheduler, 3_000);
        assert_eq!(bridge.state(), SystemState::Stable);
        assert_eq!(bridge.pending_alert_reverts(), 0);
        assert_eq!(bridge.bus().last().map(|e| e.kind()), Some(EventKind::AlertReverted));
    }

    #[test]
    fn test_revert_clobbers_intervening_change() {
        let mut scheduler = Scheduler::new();
        let mut bridge = EngineBridge::default();
        bridge.set_state(SystemState::Stable, 0);
        bridge.emit_alert(&mut scheduler, AlertSeverity::Warning, "slow");
        scheduler.settle(500);
        bridge.set_state(SystemState::Offline, 500);
        run_reverts(&mut bridge, &mut scheduler, 2_000);
        assert_eq!(bridge.state(), SystemState::Stable);
    }

    #[test]
    fn test_alert_at_same_state_still_cues() {
        let mut scheduler = Scheduler::new();
        let mut bridge = EngineBridge::default();
        bridge.set_state(SystemState::Danger, 0);
        bridge.bus_mut().clear_history();
        let outcome = bridge.emit_alert(&mut scheduler, AlertSeverity::Critical, "again");
        assert!(outcome.transition.is_none());
        assert_eq!(kinds(&bridge), vec![EventKind::AlertRaised, EventKind::SoundCue]);
    }

    #[test]
    fn test_reset_cancels_reverts() {
        let mut scheduler = Scheduler::new();
        let mut bridge = EngineBridge::default();
        bridge.emit_alert(&mut scheduler, AlertSeverity::Info, "note");
        assert_eq!(scheduler.pending_count(), 1);
        bridge.reset(&mut scheduler);
        assert_eq!(scheduler.pending_count(), 0);
        assert_eq!(bridge.state(), SystemState::Unknown);
        assert_eq!(bridge.bus().history().len(), 0);
    }
}
