//! Mood engine.
//!
//! Each [`SystemState`] maps to exactly one [`MoodType`] through a fixed
//! table. A mood only changes when the mapped mood differs from the current
//! one; otherwise the current mood simply accumulates duration. Prior moods
//! are kept in a bounded FIFO history.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::channels::{clamp_unit, ChannelMultipliers};
use crate::config::HistoryConfig;
use crate::state::SystemState;

// ============================================================================
// MoodType and profile table
// ============================================================================

/// Discrete mood labels, one per system state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoodType {
    /// Calm contentment (`stable`).
    Serein,
    /// Busy but composed (`processing`).
    Concentre,
    /// Uneasy (`warning`).
    Inquiet,
    /// Alarmed (`danger`).
    Alerte,
    /// Watching, waiting to learn more (`unknown`).
    Curieux,
    /// Asleep (`offline`).
    Endormi,
}

/// Static parameters of a mood.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoodProfile {
    pub baseline_intensity: f32,
    /// Full-strength channel effect; scaled by intensity before use.
    pub effect: ChannelMultipliers,
}

impl MoodType {
    pub const ALL: [MoodType; 6] = [
        MoodType::Serein,
        MoodType::Concentre,
        MoodType::Inquiet,
        MoodType::Alerte,
        MoodType::Curieux,
        MoodType::Endormi,
    ];

    pub fn for_state(state: SystemState) -> Self {
        match state {
            SystemState::Stable => Self::Serein,
            SystemState::Processing => Self::Concentre,
            SystemState::Warning => Self::Inquiet,
            SystemState::Danger => Self::Alerte,
            SystemState::Unknown => Self::Curieux,
            SystemState::Offline => Self::Endormi,
        }
    }

    pub fn profile(self) -> MoodProfile {
        let (baseline_intensity, effect) = match self {
            Self::Serein => (0.5, ChannelMultipliers::new(1.0, 0.8, 0.8, 1.0)),
            Self::Concentre => (0.7, ChannelMultipliers::new(1.2, 1.1, 0.9, 1.2)),
            Self::Inquiet => (0.75, ChannelMultipliers::new(1.3, 1.3, 1.2, 1.1)),
            Self::Alerte => (0.95, ChannelMultipliers::new(1.6, 1.6, 1.5, 1.3)),
            Self::Curieux => (0.4, ChannelMultipliers::new(1.1, 1.0, 0.9, 1.0)),
            Self::Endormi => (0.2, ChannelMultipliers::new(0.4, 0.2, 0.1, 0.6)),
        };
        MoodProfile {
            baseline_intensity,
            effect,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Serein => "serein",
            Self::Concentre => "concentre",
            Self::Inquiet => "inquiet",
            Self::Alerte => "alerte",
            Self::Curieux => "curieux",
            Self::Endormi => "endormi",
        }
    }
}

impl fmt::Display for MoodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scale a mood's effect toward neutral by intensity: at intensity 0 the
/// effect is neutral, at 1 it is the full profile.
pub fn visual_effect(mood: MoodType, intensity: f32) -> ChannelMultipliers {
    let intensity = clamp_unit(intensity);
    let effect = mood.profile().effect;
    ChannelMultipliers::new(
        1.0 + (effect.glow - 1.0) * intensity,
        1.0 + (effect.motion - 1.0) * intensity,
        1.0 + (effect.sound - 1.0) * intensity,
        1.0 + (effect.depth - 1.0) * intensity,
    )
}

// ============================================================================
// Records
// ============================================================================

/// Why the current mood was entered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MoodTrigger {
    Initial,
    SystemState { state: SystemState },
    Override { reason: String },
}

/// The current mood.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoodRecord {
    pub current: MoodType,
    pub intensity: f32,
    pub duration_ms: u64,
    pub trigger: MoodTrigger,
    pub visual_effect: ChannelMultipliers,
}

impl MoodRecord {
    fn enter(mood: MoodType, intensity: f32, trigger: MoodTrigger) -> Self {
        let intensity = clamp_unit(intensity);
        Self {
            current: mood,
            intensity,
            duration_ms: 0,
            trigger,
            visual_effect: visual_effect(mood, intensity),
        }
    }
}

/// A mood that was left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MoodHistoryEntry {
    pub mood: MoodType,
    pub intensity: f32,
    /// When the mood was replaced.
    pub timestamp_ms: u64,
}

// ============================================================================
// MoodEngine
// ============================================================================

#[derive(Debug, Clone)]
pub struct MoodEngine {
    record: MoodRecord,
    history: VecDeque<MoodHistoryEntry>,
    capacity: usize,
    window_ms: u64,
    last_update_ms: u64,
}

impl Default for MoodEngine {
    fn default() -> Self {
        Self::new(&HistoryConfig::default())
    }
}

impl MoodEngine {
    pub fn new(config: &HistoryConfig) -> Self {
        let capacity = config.mood_capacity.max(1);
        Self {
            record: Self::initial_record(),
            history: VecDeque::new(),
            capacity,
            window_ms: config.dominant_mood_window_ms,
            last_update_ms: 0,
        }
    }

    fn initial_record() -> MoodRecord {
        let mood = MoodType::for_state(SystemState::default());
        MoodRecord::enter(mood, mood.profile().baseline_intensity, MoodTrigger::Initial)
    }

    pub fn record(&self) -> &MoodRecord {
        &self.record
    }

    pub fn current(&self) -> MoodType {
        self.record.current
    }

    pub fn intensity(&self) -> f32 {
        self.record.intensity
    }

    pub fn visual_effect(&self) -> ChannelMultipliers {
        self.record.visual_effect
    }

    /// Prior moods, oldest first.
    pub fn history(&self) -> impl ExactSizeIterator<Item = &MoodHistoryEntry> {
        self.history.iter()
    }

    /// Follow a system state. Returns `true` when the mood changed.
    pub fn update_from_system_state(&mut self, state: SystemState, now_ms: u64) -> bool {
        let elapsed = self.elapsed(now_ms);
        let mapped = MoodType::for_state(state);
        if mapped == self.record.current {
            self.record.duration_ms = self.record.duration_ms.saturating_add(elapsed);
            return false;
        }
        self.replace(
            MoodRecord::enter(
                mapped,
                mapped.profile().baseline_intensity,
                MoodTrigger::SystemState { state },
            ),
            now_ms,
        );
        true
    }

    /// Force a mood, optionally with an explicit intensity.
    ///
    /// This is the override path used by alert handling. Re-asserting the
    /// current mood only changes its intensity.
    pub fn set_mood(
        &mut self,
        mood: MoodType,
        intensity: Option<f32>,
        reason: impl Into<String>,
        now_ms: u64,
    ) {
        let elapsed = self.elapsed(now_ms);
        let intensity = intensity.unwrap_or(mood.profile().baseline_intensity);
        if mood == self.record.current {
            self.record.intensity = clamp_unit(intensity);
            self.record.visual_effect = visual_effect(mood, self.record.intensity);
            self.record.duration_ms = self.record.duration_ms.saturating_add(elapsed);
            return;
        }
        let trigger = MoodTrigger::Override {
            reason: reason.into(),
        };
        self.replace(MoodRecord::enter(mood, intensity, trigger), now_ms);
    }

    /// Accumulate duration without a state change.
    pub fn tick(&mut self, now_ms: u64) {
        let elapsed = self.elapsed(now_ms);
        self.record.duration_ms = self.record.duration_ms.saturating_add(elapsed);
    }

    /// Plurality mood among history entries in the trailing window.
    ///
    /// Ties go to the mood encountered first (oldest). With no entries in
    /// the window, the current mood is returned.
    pub fn get_dominant_recent_mood(&self, now_ms: u64) -> MoodType {
        let since = now_ms.saturating_sub(self.window_ms);
        let mut tally: Vec<(MoodType, usize)> = Vec::new();
        for entry in self.history.iter().filter(|e| e.timestamp_ms >= since) {
            match tally.iter_mut().find(|(m, _)| *m == entry.mood) {
                Some((_, count)) => *count += 1,
                None => tally.push((entry.mood, 1)),
            }
        }
        let mut best: Option<(MoodType, usize)> = None;
        for (mood, count) in tally {
            match best {
                Some((_, c)) if count <= c => {}
                _ => best = Some((mood, count)),
            }
        }
        best.map(|(m, _)| m).unwrap_or(self.record.current)
    }

    /// Back to the start-up mood with an empty history.
    pub fn reset(&mut self, now_ms: u64) {
        self.record = Self::initial_record();
        self.history.clear();
        self.last_update_ms = now_ms;
    }

    fn elapsed(&mut self, now_ms: u64) -> u64 {
        let elapsed = now_ms.saturating_sub(self.last_update_ms);
        self.last_update_ms = self.last_update_ms.max(now_ms);
        elapsed
    }

    fn replace(&mut self, next: MoodRecord, now_ms: u64) {
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(MoodHistoryEntry {
            mood: self.record.current,
            intensity: self.record.intensity,
            timestamp_ms: now_ms,
        });
        log::debug!(
            "[MoodEngine] {} -> {} ({:.2})",
            self.record.current,
            next.current,
            next.intensity
        );
        self.record = next;
    }
}

// ============================================================================
// Tests
// ============================================================================
