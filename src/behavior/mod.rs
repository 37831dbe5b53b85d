//! Behavioral layer: timed reactions and posture.
//!
//! A trigger produces a [`BehaviorReaction`] from a fixed default table,
//! optionally patched by [`ReactionOverrides`]. Active reactions are keyed
//! by trigger kind and start time and expire exactly when
//! `now - start > duration_ms`. Each reaction arms its own expiry timer.
//!
//! Posture is always derived, either from the most recent trigger or from
//! [`determine_optimal_posture`]; the most recent derivation wins.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::channels::{clamp_unit, ChannelMultipliers};
use crate::runtime::scheduler::{Scheduler, TimerHandle};
use crate::runtime::task::AffectTask;
use crate::state::SystemState;

// ============================================================================
// Vocabulary
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    Error,
    Success,
    Warning,
    Overload,
    Idle,
}

impl TriggerKind {
    pub const ALL: [TriggerKind; 5] = [
        TriggerKind::Error,
        TriggerKind::Success,
        TriggerKind::Warning,
        TriggerKind::Overload,
        TriggerKind::Idle,
    ];

    /// Posture this trigger pushes toward.
    pub fn posture(self) -> Posture {
        match self {
            Self::Error | Self::Warning | Self::Overload => Posture::Vigilant,
            Self::Success => Posture::Relaxed,
            Self::Idle => Posture::Minimal,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Overload => "overload",
            Self::Idle => "idle",
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MotionType {
    Shake,
    Pulse,
    Flicker,
    Throb,
    Drift,
}

/// Behavioral stance. Ordered from most to least reactive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Posture {
    Vigilant,
    Attentive,
    Relaxed,
    Minimal,
}

impl Posture {
    /// Channel profile applied by the compositor.
    pub fn multipliers(self) -> ChannelMultipliers {
        match self {
            Self::Vigilant => ChannelMultipliers::new(1.2, 1.3, 1.2, 0.9),
            Self::Attentive => ChannelMultipliers::new(1.1, 1.1, 1.0, 1.0),
            Self::Relaxed => ChannelMultipliers::new(0.9, 0.8, 0.9, 1.1),
            Self::Minimal => ChannelMultipliers::new(0.6, 0.5, 0.4, 0.8),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Vigilant => "vigilant",
            Self::Attentive => "attentive",
            Self::Relaxed => "relaxed",
            Self::Minimal => "minimal",
        }
    }
}

impl fmt::Display for Posture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pure posture derivation from coarse system signals.
///
/// vigilant if danger or more than five errors; attentive if warning or
/// load above 0.7; minimal when offline or unknown; relaxed otherwise.
pub fn determine_optimal_posture(state: SystemState, error_count: u32, load: f32) -> Posture {
    if state == SystemState::Danger || error_count > 5 {
        Posture::Vigilant
    } else if state == SystemState::Warning || load > 0.7 {
        Posture::Attentive
    } else if matches!(state, SystemState::Offline | SystemState::Unknown) {
        Posture::Minimal
    } else {
        Posture::Relaxed
    }
}

// ============================================================================
// Reactions
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorReaction {
    pub trigger: TriggerKind,
    pub glow_intensity: f32,
    pub motion_type: MotionType,
    pub sound_ref: Option<String>,
    pub narrative: Option<String>,
    pub duration_ms: u64,
}

impl BehaviorReaction {
    /// The compiled-in reaction for a trigger kind.
    pub fn default_for(kind: TriggerKind) -> Self {
        let (glow, motion, sound, narrative, duration_ms) = match kind {
            TriggerKind::Error => (
                0.9,
                MotionType::Shake,
                Some("error_tone"),
                "Something went wrong.",
                3_000,
            ),
            TriggerKind::Success => (
                0.6,
                MotionType::Pulse,
                Some("success_chime"),
                "All clear.",
                2_000,
            ),
            TriggerKind::Warning => (
                0.7,
                MotionType::Flicker,
                Some("warning_tone"),
                "Keeping an eye on things.",
                2_500,
            ),
            TriggerKind::Overload => (
                1.0,
                MotionType::Throb,
                Some("overload_drone"),
                "Running hot.",
                4_000,
            ),
            TriggerKind::Idle => (0.2, MotionType::Drift, None, "Resting.", 6_000),
        };
        Self {
            trigger: kind,
            glow_intensity: glow,
            motion_type: motion,
            sound_ref: sound.map(str::to_string),
            narrative: Some(narrative.to_string()),
            duration_ms,
        }
    }

    /// Whether a reaction started at `start_ms` is over at `now_ms`.
    fn is_expired(&self, start_ms: u64, now_ms: u64) -> bool {
        now_ms.saturating_sub(start_ms) > self.duration_ms
    }
}

/// Fields to patch onto a default reaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReactionOverrides {
    pub glow_intensity: Option<f32>,
    pub motion_type: Option<MotionType>,
    pub sound_ref: Option<String>,
    pub narrative: Option<String>,
    pub duration_ms: Option<u64>,
}

impl ReactionOverrides {
    fn apply(self, mut reaction: BehaviorReaction) -> BehaviorReaction {
        if let Some(glow) = self.glow_intensity {
            reaction.glow_intensity = glow;
        }
        if let Some(motion) = self.motion_type {
            reaction.motion_type = motion;
        }
        if self.sound_ref.is_some() {
            reaction.sound_ref = self.sound_ref;
        }
        if self.narrative.is_some() {
            reaction.narrative = self.narrative;
        }
        if let Some(duration) = self.duration_ms {
            reaction.duration_ms = duration;
        }
        reaction.glow_intensity = clamp_unit(reaction.glow_intensity);
        reaction
    }
}

/// Identifies one active reaction. Keys order by start time, then by
/// trigger order within the same millisecond.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReactionKey {
    pub started_at_ms: u64,
    /// Disambiguates triggers in the same millisecond.
    pub seq: u64,
    pub kind: TriggerKind,
}

/// An active reaction with its start time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveReaction {
    pub key: ReactionKey,
    pub reaction: BehaviorReaction,
}

// ============================================================================
// BehavioralLayer
// ============================================================================

#[derive(Debug)]
pub struct BehavioralLayer {
    active: BTreeMap<ReactionKey, BehaviorReaction>,
    timers: HashMap<ReactionKey, TimerHandle>,
    posture: Posture,
    next_seq: u64,
}

impl Default for BehavioralLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl BehavioralLayer {
    pub fn new() -> Self {
        Self {
            active: BTreeMap::new(),
            timers: HashMap::new(),
            posture: Posture::Relaxed,
            next_seq: 0,
        }
    }

    pub fn posture(&self) -> Posture {
        self.posture
    }

    /// Active reactions, oldest first.
    pub fn active_reactions(&self) -> Vec<ActiveReaction> {
        self.active
            .iter()
            .map(|(key, reaction)| ActiveReaction {
                key: *key,
                reaction: reaction.clone(),
            })
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn is_active(&self, key: &ReactionKey) -> bool {
        self.active.contains_key(key)
    }

    /// Start a reaction at the scheduler's current time.
    ///
    /// Expired reactions are pruned first, then the new one is stored with
    /// an expiry timer one millisecond past its duration. Posture follows
    /// the trigger just fired, so the last of several same-tick triggers wins.
    pub fn trigger_reaction(
        &mut self,
        scheduler: &mut Scheduler<AffectTask>,
        kind: TriggerKind,
        overrides: Option<ReactionOverrides>,
    ) -> ReactionKey {
        let now_ms = scheduler.now_ms();
        self.prune(scheduler, now_ms);

        let reaction = overrides
            .unwrap_or_default()
            .apply(BehaviorReaction::default_for(kind));
        let key = ReactionKey {
            kind,
            started_at_ms: now_ms,
            seq: self.next_seq,
        };
        self.next_seq += 1;

        let handle = scheduler.schedule_once(
            reaction.duration_ms.saturating_add(1),
            AffectTask::ExpireReaction { key },
        );
        log::debug!(
            "[BehavioralLayer] {} reaction for {} ms",
            kind,
            reaction.duration_ms
        );
        self.timers.insert(key, handle);
        self.active.insert(key, reaction);
        self.set_posture(kind.posture());
        key
    }

    /// Expiry timer callback. Returns `true` if the reaction was removed.
    pub fn expire(&mut self, key: &ReactionKey, now_ms: u64) -> bool {
        let expired = self
            .active
            .get(key)
            .map(|r| r.is_expired(key.started_at_ms, now_ms))
            .unwrap_or(false);
        if !expired {
            return false;
        }
        self.active.remove(key);
        self.timers.remove(key);
        if let Some(newest) = self.active.keys().next_back() {
            self.set_posture(newest.kind.posture());
        }
        true
    }

    /// Drop every reaction past its duration. Returns how many were dropped.
    pub fn prune(&mut self, scheduler: &mut Scheduler<AffectTask>, now_ms: u64) -> usize {
        let expired: Vec<ReactionKey> = self
            .active
            .iter()
            .filter(|(key, r)| r.is_expired(key.started_at_ms, now_ms))
            .map(|(key, _)| *key)
            .collect();
        for key in &expired {
            self.active.remove(key);
            if let Some(handle) = self.timers.remove(key) {
                scheduler.cancel(handle);
            }
        }
        expired.len()
    }

    /// Re-derive posture from system signals. Overrides the reaction-derived
    /// posture until the next trigger.
    pub fn apply_optimal_posture(&mut self, state: SystemState, error_count: u32, load: f32) {
        self.set_posture(determine_optimal_posture(state, error_count, load));
    }

    /// Posture profile, with glow boosted by the strongest active reaction.
    pub fn behavior_multipliers(&self) -> ChannelMultipliers {
        let mut m = self.posture.multipliers();
        let strongest = self
            .active
            .values()
            .map(|r| r.glow_intensity)
            .fold(None, |acc: Option<f32>, g| Some(acc.map_or(g, |a| a.max(g))));
        if let Some(glow) = strongest {
            m.glow *= 0.5 + glow;
        }
        m
    }

    /// Cancel every expiry timer. Active reactions and posture are kept;
    /// stale ones are dropped by the next [`Self::prune`].
    pub fn stop(&mut self, scheduler: &mut Scheduler<AffectTask>) {
        for (_, handle) in self.timers.drain() {
            scheduler.cancel(handle);
        }
    }

    /// Cancel every expiry timer and drop all reactions.
    pub fn reset(&mut self, scheduler: &mut Scheduler<AffectTask>) {
        self.stop(scheduler);
        self.active.clear();
        self.posture = Posture::Relaxed;
        self.next_seq = 0;
    }

    fn set_posture(&mut self, posture: Posture) {
        if posture != self.posture {
            log::debug!("[BehavioralLayer] posture {} -> {}", self.posture, posture);
            self.posture = posture;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn fire_due(layer: &mut BehavioralLayer, scheduler: &mut Scheduler<AffectTask>, until: u64) {
        while let Some(fired) = scheduler.pop_due(until) {
            if let AffectTask::ExpireReaction { key } = fired.task {
                layer.expire(&key, fired.at_ms);
            }
        }
        scheduler.settle(until);
    }

    #[test]
    fn test_default_table() {
        let r = BehaviorReaction::default_for(TriggerKind::Overload);
        assert_eq!(r.motion_type, MotionType::Throb);
        assert_eq!(r.glow_intensity, 1.0);
        assert!(BehaviorReaction::default_for(TriggerKind::Idle).sound_ref.is_none());
    }

    #[test]
    fn test_overrides_merge_and_clamp() {
        let mut scheduler = Scheduler::new();
        let mut layer = BehavioralLayer::new();
        let key = layer.trigger_reaction(
            &mut scheduler,
            TriggerKind::Success,
            Some(ReactionOverrides {
                glow_intensity: Some(4.0),
                narrative: Some("Deployed".into()),
                ..Default::default()
            }),
        );
        let active = layer.active_reactions();
        assert_eq!(active[0].key, key);
        assert_eq!(active[0].reaction.glow_intensity, 1.0);
        assert_eq!(active[0].reaction.narrative.as_deref(), Some("Deployed"));
        assert_eq!(active[0].reaction.sound_ref.as_deref(), Some("success_chime"));
        assert_eq!(active[0].reaction.duration_ms, 2_000);
    }

    #[test]
    fn test_reaction_lifetime_boundaries() {
        let mut scheduler = Scheduler::starting_at(1_000);
        let mut layer = BehavioralLayer::new();
        let key = layer.trigger_reaction(
            &mut scheduler,
            TriggerKind::Warning,
            Some(ReactionOverrides {
                duration_ms: Some(500),
                ..Default::default()
            }),
        );

        fire_due(&mut layer, &mut scheduler, 1_499);
        assert!(layer.is_active(&key));
        fire_due(&mut layer, &mut scheduler, 1_500);
        assert!(layer.is_active(&key));
        fire_due(&mut layer, &mut scheduler, 1_501);
        assert!(!layer.is_active(&key));
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[test]
    fn test_trigger_prunes_expired() {
        let mut scheduler = Scheduler::new();
        let mut layer = BehavioralLayer::new();
        layer.trigger_reaction(&mut scheduler, TriggerKind::Success, None);
        // skip past expiry without firing the timer
        scheduler.settle(2_500);
        layer.trigger_reaction(&mut scheduler, TriggerKind::Idle, None);
        assert_eq!(layer.active_count(), 1);
        assert_eq!(scheduler.pending_count(), 1);
    }

    #[test]
    fn test_last_trigger_sets_posture() {
        let mut scheduler = Scheduler::new();
        let mut layer = BehavioralLayer::new();
        layer.trigger_reaction(&mut scheduler, TriggerKind::Idle, None);
        assert_eq!(layer.posture(), Posture::Minimal);
        layer.trigger_reaction(&mut scheduler, TriggerKind::Error, None);
        assert_eq!(layer.posture(), Posture::Vigilant);
        // same tick, error still active
        layer.trigger_reaction(&mut scheduler, TriggerKind::Success, None);
        assert_eq!(layer.posture(), Posture::Relaxed);
        assert_eq!(layer.active_count(), 3);
    }

    #[test]
    fn test_active_reactions_oldest_first() {
        let mut scheduler = Scheduler::new();
        let mut layer = BehavioralLayer::new();
        let first = layer.trigger_reaction(&mut scheduler, TriggerKind::Warning, None);
        let second = layer.trigger_reaction(&mut scheduler, TriggerKind::Error, None);
        scheduler.settle(10);
        let third = layer.trigger_reaction(&mut scheduler, TriggerKind::Error, None);
        let keys: Vec<ReactionKey> = layer.active_reactions().iter().map(|a| a.key).collect();
        assert_eq!(keys, vec![first, second, third]);
    }

    #[test]
    fn test_posture_follows_newest_after_expiry() {
        let mut scheduler = Scheduler::new();
        let mut layer = BehavioralLayer::new();
        layer.trigger_reaction(&mut scheduler, TriggerKind::Idle, None);
        scheduler.settle(100);
        layer.trigger_reaction(&mut scheduler, TriggerKind::Error, None);
        scheduler.settle(200);
        layer.trigger_reaction(&mut scheduler, TriggerKind::Success, None);
        assert_eq!(layer.posture(), Posture::Relaxed);

        // success expires at 2201, the error is now the newest
        fire_due(&mut layer, &mut scheduler, 2_201);
        assert_eq!(layer.active_count(), 2);
        assert_eq!(layer.posture(), Posture::Vigilant);

        // error expires at 3101, only idle remains
        fire_due(&mut layer, &mut scheduler, 3_101);
        assert_eq!(layer.active_count(), 1);
        assert_eq!(layer.posture(), Posture::Minimal);
    }

    #[test]
    fn test_stop_keeps_reactions() {
        let mut scheduler = Scheduler::new();
        let mut layer = BehavioralLayer::new();
        let key = layer.trigger_reaction(&mut scheduler, TriggerKind::Error, None);
        layer.stop(&mut scheduler);
        assert_eq!(scheduler.pending_count(), 0);
        assert!(layer.is_active(&key));
        assert_eq!(layer.posture(), Posture::Vigilant);
    }

    #[test]
    fn test_optimal_posture() {
        assert_eq!(determine_optimal_posture(SystemState::Danger, 0, 0.0), Posture::Vigilant);
        assert_eq!(determine_optimal_posture(SystemState::Stable, 6, 0.0), Posture::Vigilant);
        assert_eq!(determine_optimal_posture(SystemState::Warning, 0, 0.0), Posture::Attentive);
        assert_eq!(determine_optimal_posture(SystemState::Stable, 0, 0.8), Posture::Attentive);
        assert_eq!(determine_optimal_posture(SystemState::Offline, 0, 0.0), Posture::Minimal);
        assert_eq!(determine_optimal_posture(SystemState::Unknown, 0, 0.0), Posture::Minimal);
        assert_eq!(determine_optimal_posture(SystemState::Processing, 1, 0.5), Posture::Relaxed);
    }

    #[test]
    fn test_multipliers_boosted_by_reaction() {
        let mut scheduler = Scheduler::new();
        let mut layer = BehavioralLayer::new();
        let base = layer.behavior_multipliers();
        assert_eq!(base, Posture::Relaxed.multipliers());
        layer.trigger_reaction(&mut scheduler, TriggerKind::Overload, None);
        let boosted = layer.behavior_multipliers();
        assert!((boosted.glow - 1.2 * 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_reset_cancels_timers() {
        let mut scheduler = Scheduler::new();
        let mut layer = BehavioralLayer::new();
        for kind in TriggerKind::ALL {
            layer.trigger_reaction(&mut scheduler, kind, None);
        }
        assert_eq!(scheduler.pending_count(), 5);
        layer.reset(&mut scheduler);
        assert_eq!(scheduler.pending_count(), 0);
        assert_eq!(layer.active_count(), 0);
        assert_eq!(layer.posture(), Posture::Relaxed);
    }
}
