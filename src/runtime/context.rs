//! The affect context: one explicit owner for every engine.
//!
//! Hosts construct an [`AffectContext`], feed it metrics and interactions,
//! and move virtual time forward with [`AffectContext::advance`]. Periodic
//! work (interaction sampling, persona sync, stats refresh) and one-shot
//! work (alert reverts, reaction expiry) are timers on the context's own
//! [`Scheduler`], dispatched in due order.
//!
//! Across timers, staleness of up to one tick period is expected: the
//! compositor reads whatever the engines held at its last tick.

use serde::Serialize;

use crate::archetype::{
    ArchetypeGraph, ArchetypeNode, InteractionKind, InteractionSample, InteractionSampler,
};
use crate::behavior::{
    ActiveReaction, BehavioralLayer, Posture, ReactionKey, ReactionOverrides, TriggerKind,
};
use crate::bridge::{
    AlertOutcome, AlertSeverity, BridgeEvent, EngineBridge, EventKind, EventPayload,
    EventPriority, HandlerId,
};
use crate::compositor::{CompositorInputs, OutputPreferences, PersonaCompositor, PersonaOutput};
use crate::config::AffectConfig;
use crate::error::AffectResult;
use crate::mood::{MoodEngine, MoodRecord, MoodType};
use crate::personality::{PersonalityCore, PersonalitySnapshot};
use crate::state::{StateTransition, SystemMetrics, SystemState};
use crate::storage::{self, PreferenceStore, UserPreferences};

use super::scheduler::{FiredTimer, Scheduler, TimerHandle};
use super::task::AffectTask;

/// Pull-style view of every engine at one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AffectSnapshot {
    pub now_ms: u64,
    pub state: SystemState,
    pub previous_state: Option<SystemState>,
    pub metrics: SystemMetrics,
    pub mood: MoodRecord,
    pub dominant_recent_mood: MoodType,
    pub personality: PersonalitySnapshot,
    pub posture: Posture,
    pub active_reactions: Vec<ActiveReaction>,
    pub archetypes: Vec<ArchetypeNode>,
    pub most_active_archetype: Option<String>,
    pub persona: Option<PersonaOutput>,
    pub event_count: usize,
    pub pending_timers: usize,
}

#[derive(Debug)]
pub struct AffectContext {
    config: AffectConfig,
    scheduler: Scheduler<AffectTask>,
    bridge: EngineBridge,
    graph: ArchetypeGraph,
    sampler: InteractionSampler,
    mood: MoodEngine,
    personality: PersonalityCore,
    behavior: BehavioralLayer,
    compositor: PersonaCompositor,
    last_metrics: SystemMetrics,
    last_dominant: Option<String>,
    stats_timer: Option<TimerHandle>,
    running: bool,
}

impl Default for AffectContext {
    fn default() -> Self {
        Self::build(AffectConfig::default())
    }
}

impl AffectContext {
    /// Validate `config` and build every engine with its defaults.
    pub fn new(config: AffectConfig) -> AffectResult<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: AffectConfig) -> Self {
        let graph = ArchetypeGraph::with_defaults(&config.graph);
        let last_dominant = graph.get_most_active().map(|n| n.id.clone());
        Self {
            scheduler: Scheduler::new(),
            bridge: EngineBridge::new(&config),
            graph,
            sampler: InteractionSampler::new(),
            mood: MoodEngine::new(&config.history),
            personality: PersonalityCore::new(config.personality.clone()),
            behavior: BehavioralLayer::new(),
            compositor: PersonaCompositor::new(),
            last_metrics: SystemMetrics::default(),
            last_dominant,
            stats_timer: None,
            running: false,
            config,
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Arm the periodic timers. Calling twice is a no-op.
    pub fn start(&mut self) {
        if self.running {
            return;
        }
        let timing = &self.config.timing;
        self.sampler
            .start(&mut self.scheduler, timing.interaction_sample_ms);
        self.compositor
            .start(&mut self.scheduler, timing.persona_sync_ms);
        self.stats_timer = Some(
            self.scheduler
                .schedule_interval(timing.stats_refresh_ms, AffectTask::StatsRefresh),
        );
        self.running = true;
        log::info!(
            "Affect context started (sample {} ms, sync {} ms, refresh {} ms)",
            timing.interaction_sample_ms,
            timing.persona_sync_ms,
            timing.stats_refresh_ms
        );
    }

    /// Cancel every timer the context owns. Engine state is kept.
    pub fn destroy(&mut self) {
        self.stop_timers();
        self.behavior.stop(&mut self.scheduler);
        self.bridge.cancel_alert_reverts(&mut self.scheduler);
        self.running = false;
        log::info!("Affect context destroyed");
    }

    /// Restore every engine to its defaults. A running context keeps
    /// running with freshly armed timers.
    pub fn reset(&mut self) {
        let was_running = self.running;
        self.stop_timers();
        self.running = false;

        let now_ms = self.scheduler.now_ms();
        self.behavior.reset(&mut self.scheduler);
        self.bridge.reset(&mut self.scheduler);
        self.sampler.reset(&mut self.scheduler);
        self.compositor.reset(&mut self.scheduler);
        self.graph.reset();
        self.mood.reset(now_ms);
        self.personality.reset();
        self.last_metrics = SystemMetrics::default();
        self.last_dominant = self.graph.get_most_active().map(|n| n.id.clone());
        log::info!("Affect context reset");

        if was_running {
            self.start();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    fn stop_timers(&mut self) {
        self.sampler.stop(&mut self.scheduler);
        self.compositor.stop(&mut self.scheduler);
        if let Some(handle) = self.stats_timer.take() {
            self.scheduler.cancel(handle);
        }
    }

    // -----------------------------------------------------------------------
    // Time
    // -----------------------------------------------------------------------

    pub fn now_ms(&self) -> u64 {
        self.scheduler.now_ms()
    }

    /// Move virtual time forward by `ms`, firing due timers in order.
    pub fn advance(&mut self, ms: u64) -> usize {
        let until = self.scheduler.now_ms().saturating_add(ms);
        self.advance_to(until)
    }

    /// Move virtual time to `until_ms`. Returns how many timers fired.
    pub fn advance_to(&mut self, until_ms: u64) -> usize {
        let mut fired = 0;
        while let Some(timer) = self.scheduler.pop_due(until_ms) {
            self.dispatch(timer);
            fired += 1;
        }
        self.scheduler.settle(until_ms);
        fired
    }

    fn dispatch(&mut self, timer: FiredTimer<AffectTask>) {
        let now_ms = timer.at_ms;
        log::trace!("timer {} fired at {} ms", timer.task.name(), now_ms);
        match timer.task {
            AffectTask::InteractionSample => self.on_interaction_sample(now_ms),
            AffectTask::PersonaSync => self.on_persona_sync(now_ms),
            AffectTask::StatsRefresh => self.on_stats_refresh(now_ms),
            AffectTask::AlertRevert { restore } => {
                if let Some(transition) = self.bridge.revert_alert(timer.handle, restore, now_ms) {
                    self.apply_transition(transition);
                }
            }
            AffectTask::ExpireReaction { key } => {
                self.behavior.expire(&key, now_ms);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Inputs
    // -----------------------------------------------------------------------

    /// Feed one metrics reading. Returns the resulting state.
    pub fn ingest_metrics(&mut self, metrics: SystemMetrics) -> SystemState {
        self.last_metrics = metrics;
        let now_ms = self.now_ms();
        if let Some(transition) = self.bridge.update_from_metrics(&metrics, now_ms) {
            self.apply_transition(transition);
        }
        self.bridge.state()
    }

    /// Force a state, bypassing classification.
    pub fn set_state(&mut self, state: SystemState) -> Option<StateTransition> {
        let now_ms = self.now_ms();
        let transition = self.bridge.set_state(state, now_ms)?;
        self.apply_transition(transition);
        Some(transition)
    }

    pub fn record_interaction(&mut self, kind: InteractionKind) {
        self.sampler.record(InteractionSample {
            kind,
            timestamp_ms: self.now_ms(),
        });
    }

    /// Start a behavioral reaction and publish it.
    pub fn trigger(
        &mut self,
        kind: TriggerKind,
        overrides: Option<ReactionOverrides>,
    ) -> ReactionKey {
        let key = self
            .behavior
            .trigger_reaction(&mut self.scheduler, kind, overrides);
        self.bridge.emit(
            EventPayload::ReactionTriggered {
                kind,
                posture: self.behavior.posture(),
            },
            EventPriority::Normal,
            self.now_ms(),
        );
        key
    }

    /// Raise an alert: override state and mood, schedule the revert.
    pub fn emit_alert(
        &mut self,
        severity: AlertSeverity,
        message: impl Into<String>,
    ) -> AlertOutcome {
        let message = message.into();
        let outcome = self
            .bridge
            .emit_alert(&mut self.scheduler, severity, message.clone());
        if let Some(transition) = outcome.transition {
            self.apply_transition(transition);
        }

        let now_ms = self.now_ms();
        let before = self.mood.current();
        let intensity = match severity {
            AlertSeverity::Info => None,
            AlertSeverity::Warning => Some(0.85),
            AlertSeverity::Critical => Some(1.0),
        };
        self.mood
            .set_mood(MoodType::for_state(severity.mapped_state()), intensity, message, now_ms);
        self.publish_mood_change(before, now_ms);
        outcome
    }

    /// Set an archetype's intensity directly, with one-hop propagation.
    pub fn update_archetype(&mut self, id: &str, intensity: f32) -> AffectResult<()> {
        self.graph.update_intensity(id, intensity)?;
        self.publish_archetype_shift(self.now_ms());
        Ok(())
    }

    pub fn set_output_preferences(&mut self, preferences: OutputPreferences) {
        self.compositor.set_preferences(preferences);
    }

    // -----------------------------------------------------------------------
    // Subscriptions
    // -----------------------------------------------------------------------

    pub fn subscribe(
        &mut self,
        kind: EventKind,
        name: impl Into<String>,
        handler: impl Fn(&BridgeEvent) + Send + Sync + 'static,
    ) -> HandlerId {
        self.bridge.bus_mut().on(kind, name, handler)
    }

    pub fn unsubscribe(&mut self, handler_id: &HandlerId) -> bool {
        self.bridge.bus_mut().off(handler_id)
    }

    // -----------------------------------------------------------------------
    // Cross-engine propagation
    // -----------------------------------------------------------------------

    /// A state change reaches mood first, then behavior.
    fn apply_transition(&mut self, transition: StateTransition) {
        let now_ms = self.now_ms();
        let before = self.mood.current();
        if self.mood.update_from_system_state(transition.to, now_ms) {
            self.publish_mood_change(before, now_ms);
        }

        if let Some(kind) = reaction_for_transition(transition) {
            self.trigger(kind, None);
        }
        self.behavior.apply_optimal_posture(
            transition.to,
            self.last_metrics.errors,
            self.last_metrics.load(),
        );
    }

    fn publish_mood_change(&mut self, before: MoodType, now_ms: u64) {
        let record = self.mood.record();
        if record.current == before {
            return;
        }
        let payload = EventPayload::MoodChanged {
            from: before,
            to: record.current,
            intensity: record.intensity,
        };
        self.bridge.emit(payload, EventPriority::Normal, now_ms);
    }

    fn publish_archetype_shift(&mut self, now_ms: u64) {
        let Some(node) = self.graph.get_most_active() else {
            return;
        };
        if self.last_dominant.as_deref() == Some(node.id.as_str()) {
            return;
        }
        let payload = EventPayload::ArchetypeShift {
            dominant: node.id.clone(),
            intensity: node.intensity,
        };
        self.last_dominant = Some(node.id.clone());
        self.bridge.emit(payload, EventPriority::Low, now_ms);
    }

    // -----------------------------------------------------------------------
    // Timer handlers
    // -----------------------------------------------------------------------

    fn on_interaction_sample(&mut self, now_ms: u64) {
        let summary = self
            .sampler
            .take_sample(now_ms, &self.config.graph, &self.config.timing);
        let smoothing = self.config.graph.intensity_smoothing;
        for (id, target) in summary.archetype_targets(self.config.graph.interaction_saturation) {
            let current = self.graph.intensity(id).unwrap_or(0.0);
            let blended = current * (1.0 - smoothing) + target * smoothing;
            if let Err(e) = self.graph.update_intensity(id, blended) {
                log::warn!("Skipping interaction update: {}", e);
            }
        }
        self.publish_archetype_shift(now_ms);

        if summary.became_idle {
            self.trigger(TriggerKind::Idle, None);
        }
    }

    fn on_persona_sync(&mut self, now_ms: u64) {
        let output = self.compositor.sync(
            CompositorInputs {
                personality: &self.personality,
                mood: &self.mood,
                behavior: &self.behavior,
                graph: &self.graph,
            },
            now_ms,
        );
        let channels = output.to_map();
        self.bridge
            .emit(EventPayload::PersonaSynced { channels }, EventPriority::Low, now_ms);
    }

    fn on_stats_refresh(&mut self, now_ms: u64) {
        let before = self.personality.temperament();
        let changed = self.personality.evolve(
            self.last_metrics.load(),
            self.last_metrics.errors,
            self.sampler.last_activity(),
        );
        if changed {
            let payload = EventPayload::TemperamentChanged {
                from: before,
                to: self.personality.temperament(),
            };
            self.bridge.emit(payload, EventPriority::Normal, now_ms);
        }
        self.graph.harmonize_all();
        self.behavior.prune(&mut self.scheduler, now_ms);
        self.mood.tick(now_ms);
    }

    // -----------------------------------------------------------------------
    // Preferences
    // -----------------------------------------------------------------------

    /// Load the preference record and apply it. Never fails.
    pub fn load_preferences(&mut self, store: &dyn PreferenceStore) -> UserPreferences {
        let prefs = storage::load_preferences(store);
        self.personality.restore(prefs.traits, prefs.evolution);
        self.compositor.set_preferences(OutputPreferences {
            sound_enabled: prefs.sound_enabled,
            reduced_motion: prefs.reduced_motion,
        });
        prefs
    }

    /// Persist the current preferences. Returns `false` if the write failed.
    pub fn save_preferences(&self, store: &dyn PreferenceStore) -> bool {
        storage::save_preferences(store, &self.current_preferences())
    }

    pub fn current_preferences(&self) -> UserPreferences {
        let output = self.compositor.preferences();
        UserPreferences {
            traits: *self.personality.traits(),
            evolution: self.personality.evolution(),
            sound_enabled: output.sound_enabled,
            reduced_motion: output.reduced_motion,
            ..Default::default()
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn snapshot(&self) -> AffectSnapshot {
        let now_ms = self.now_ms();
        AffectSnapshot {
            now_ms,
            state: self.bridge.state(),
            previous_state: self.bridge.state_machine().previous(),
            metrics: self.last_metrics,
            mood: self.mood.record().clone(),
            dominant_recent_mood: self.mood.get_dominant_recent_mood(now_ms),
            personality: self.personality.snapshot(),
            posture: self.behavior.posture(),
            active_reactions: self.behavior.active_reactions(),
            archetypes: self.graph.nodes().to_vec(),
            most_active_archetype: self.graph.get_most_active().map(|n| n.id.clone()),
            persona: self.compositor.latest().cloned(),
            event_count: self.bridge.bus().history().len(),
            pending_timers: self.scheduler.pending_count(),
        }
    }

    pub fn config(&self) -> &AffectConfig {
        &self.config
    }

    pub fn state(&self) -> SystemState {
        self.bridge.state()
    }

    pub fn scheduler(&self) -> &Scheduler<AffectTask> {
        &self.scheduler
    }

    pub fn bridge(&self) -> &EngineBridge {
        &self.bridge
    }

    pub fn graph(&self) -> &ArchetypeGraph {
        &self.graph
    }

    pub fn sampler(&self) -> &InteractionSampler {
        &self.sampler
    }

    pub fn mood(&self) -> &MoodEngine {
        &self.mood
    }

    pub fn personality(&self) -> &PersonalityCore {
        &self.personality
    }

    pub fn behavior(&self) -> &BehavioralLayer {
        &self.behavior
    }

    pub fn compositor(&self) -> &PersonaCompositor {
        &self.compositor
    }
}

/// Reaction a state change provokes, if any.
fn reaction_for_transition(transition: StateTransition) -> Option<TriggerKind> {
    match transition.to {
        SystemState::Danger => Some(TriggerKind::Overload),
        SystemState::Warning => Some(TriggerKind::Warning),
        SystemState::Offline => Some(TriggerKind::Idle),
        SystemState::Stable if transition.from.is_degraded() => Some(TriggerKind::Success),
        _ => None,
    }
}

// ============================================================================
// Tests
// ============================================================================
