//! Persona compositor.
//!
//! On its own periodic timer, independent of the reactive state path, the
//! compositor multiplies personality, mood and behavior multipliers channel
//! by channel:
//!
//! ```text
//! combined = personality × mood × behavior
//! ```
//!
//! The product is multiplicative on purpose: a channel that collapses to
//! zero in any one engine is zero in the output. User preferences apply as
//! further factors on the same product. Results are clamped to
//! `[0, MAX_CHANNEL]`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::archetype::ArchetypeGraph;
use crate::behavior::{BehavioralLayer, Posture};
use crate::channels::ChannelMultipliers;
use crate::mood::{MoodEngine, MoodType};
use crate::personality::{PersonalityCore, Temperament};
use crate::runtime::scheduler::{Scheduler, TimerHandle};
use crate::runtime::task::AffectTask;

/// Upper bound of any composed channel.
pub const MAX_CHANNEL: f32 = 3.0;

/// Motion factor applied when the user asked for reduced motion.
pub const REDUCED_MOTION_FACTOR: f32 = 0.5;

/// Channel-wise product of the three engine multipliers, clamped.
pub fn compose(
    personality: ChannelMultipliers,
    mood: ChannelMultipliers,
    behavior: ChannelMultipliers,
) -> ChannelMultipliers {
    (personality * mood * behavior).clamped(0.0, MAX_CHANNEL)
}

/// User-facing output switches, applied multiplicatively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputPreferences {
    pub sound_enabled: bool,
    pub reduced_motion: bool,
}

impl Default for OutputPreferences {
    fn default() -> Self {
        Self {
            sound_enabled: true,
            reduced_motion: false,
        }
    }
}

impl OutputPreferences {
    fn factors(self) -> ChannelMultipliers {
        ChannelMultipliers::new(
            1.0,
            if self.reduced_motion {
                REDUCED_MOTION_FACTOR
            } else {
                1.0
            },
            if self.sound_enabled { 1.0 } else { 0.0 },
            1.0,
        )
    }
}

/// The engines a sync reads from.
#[derive(Debug, Clone, Copy)]
pub struct CompositorInputs<'a> {
    pub personality: &'a PersonalityCore,
    pub mood: &'a MoodEngine,
    pub behavior: &'a BehavioralLayer,
    pub graph: &'a ArchetypeGraph,
}

/// One composed frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaOutput {
    pub channels: ChannelMultipliers,
    /// Intensity of the most active archetype, 0 with none active.
    pub archetype_intensity: f32,
    /// Influence flowing into the most active archetype.
    pub archetype_influence: f32,
    pub dominant_archetype: Option<String>,
    pub temperament: Temperament,
    pub mood: MoodType,
    pub posture: Posture,
    pub computed_at_ms: u64,
}

impl PersonaOutput {
    /// Flat map of named numeric channels for the presentation layer.
    pub fn to_map(&self) -> BTreeMap<String, f32> {
        let mut map = self.channels.to_map();
        map.insert("archetype_intensity".into(), self.archetype_intensity);
        map.insert("archetype_influence".into(), self.archetype_influence);
        map
    }
}

#[derive(Debug, Default)]
pub struct PersonaCompositor {
    preferences: OutputPreferences,
    latest: Option<PersonaOutput>,
    sync_count: u64,
    timer: Option<TimerHandle>,
}

impl PersonaCompositor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn preferences(&self) -> OutputPreferences {
        self.preferences
    }

    pub fn set_preferences(&mut self, preferences: OutputPreferences) {
        self.preferences = preferences;
    }

    /// Most recent frame, if any sync has run.
    pub fn latest(&self) -> Option<&PersonaOutput> {
        self.latest.as_ref()
    }

    pub fn sync_count(&self) -> u64 {
        self.sync_count
    }

    /// Compose a frame from the current engine states.
    pub fn sync(&mut self, inputs: CompositorInputs<'_>, now_ms: u64) -> &PersonaOutput {
        let combined = compose(
            inputs.personality.get_visual_multipliers(),
            inputs.mood.visual_effect(),
            inputs.behavior.behavior_multipliers(),
        );
        let channels = (combined * self.preferences.factors()).clamped(0.0, MAX_CHANNEL);

        let dominant = inputs.graph.get_most_active();
        let (dominant_archetype, archetype_intensity, archetype_influence) = match dominant {
            Some(node) => (
                Some(node.id.clone()),
                node.intensity,
                inputs.graph.calculate_total_influence(&node.id),
            ),
            None => (None, 0.0, 0.0),
        };

        self.sync_count += 1;
        self.latest.insert(PersonaOutput {
            channels,
            archetype_intensity,
            archetype_influence,
            dominant_archetype,
            temperament: inputs.personality.temperament(),
            mood: inputs.mood.current(),
            posture: inputs.behavior.posture(),
            computed_at_ms: now_ms,
        })
    }

    /// Arm the sync timer. Calling twice keeps the first timer.
    pub fn start(&mut self, scheduler: &mut Scheduler<AffectTask>, period_ms: u64) {
        if self.timer.is_none() {
            self.timer = Some(scheduler.schedule_interval(period_ms, AffectTask::PersonaSync));
        }
    }

    pub fn stop(&mut self, scheduler: &mut Scheduler<AffectTask>) {
        if let Some(handle) = self.timer.take() {
            scheduler.cancel(handle);
        }
    }

    pub fn is_running(&self) -> bool {
        self.timer.is_some()
    }

    /// Stop and forget the last frame. Preferences survive.
    pub fn reset(&mut self, scheduler: &mut Scheduler<AffectTask>) {
        self.stop(scheduler);
        self.latest = None;
        self.sync_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GraphConfig;
    use crate::state::SystemState;

    struct Engines {
        personality: PersonalityCore,
        mood: MoodEngine,
        behavior: BehavioralLayer,
        graph: ArchetypeGraph,
    }

    impl Engines {
        fn new() -> Self {
            Self {
                personality: PersonalityCore::default(),
                mood: MoodEngine::default(),
                behavior: BehavioralLayer::new(),
                graph: ArchetypeGraph::with_defaults(&GraphConfig::default()),
            }
        }

        fn inputs(&self) -> CompositorInputs<'_> {
            CompositorInputs {
                personality: &self.personality,
                mood: &self.mood,
                behavior: &self.behavior,
                graph: &self.graph,
            }
        }
    }

    #[test]
    fn test_compose_is_multiplicative() {
        let p = ChannelMultipliers::new(1.0, 2.0, 1.0, 1.0);
        let m = ChannelMultipliers::new(0.5, 1.0, 0.0, 1.0);
        let b = ChannelMultipliers::new(2.0, 0.5, 5.0, 1.0);
        assert_eq!(compose(p, m, b), ChannelMultipliers::new(1.0, 1.0, 0.0, 1.0));
    }

    #[test]
    fn test_zero_in_one_engine_zeroes_channel() {
        let zero_motion = ChannelMultipliers::new(1.0, 0.0, 1.0, 1.0);
        let loud = ChannelMultipliers::new(2.0, 3.0, 2.0, 2.0);
        assert_eq!(compose(loud, zero_motion, loud).motion, 0.0);
    }

    #[test]
    fn test_compose_clamps() {
        let big = ChannelMultipliers::new(2.0, 2.0, 2.0, 2.0);
        assert_eq!(compose(big, big, big).glow, MAX_CHANNEL);
    }

    #[test]
    fn test_sync_matches_engine_product() {
        let engines = Engines::new();
        let mut compositor = PersonaCompositor::new();
        let out = compositor.sync(engines.inputs(), 5_000).clone();

        let expected = compose(
            engines.personality.get_visual_multipliers(),
            engines.mood.visual_effect(),
            engines.behavior.behavior_multipliers(),
        );
        assert_eq!(out.channels, expected);
        assert_eq!(out.computed_at_ms, 5_000);
        assert_eq!(out.mood, MoodType::Curieux);
        assert_eq!(out.dominant_archetype.as_deref(), Some("sage"));
        assert_eq!(compositor.sync_count(), 1);
    }

    #[test]
    fn test_preferences_apply_as_factors() {
        let engines = Engines::new();
        let mut compositor = PersonaCompositor::new();
        let plain = compositor.sync(engines.inputs(), 0).channels;

        compositor.set_preferences(OutputPreferences {
            sound_enabled: false,
            reduced_motion: true,
        });
        let muted = compositor.sync(engines.inputs(), 1).channels;
        assert_eq!(muted.sound, 0.0);
        assert!((muted.motion - plain.motion * REDUCED_MOTION_FACTOR).abs() < 1e-6);
        assert_eq!(muted.glow, plain.glow);
    }

    #[test]
    fn test_output_map_is_flat() {
        let mut engines = Engines::new();
        engines.mood.update_from_system_state(SystemState::Danger, 0);
        let mut compositor = PersonaCompositor::new();
        let map = compositor.sync(engines.inputs(), 0).to_map();
        let keys = [
            "glow",
            "motion",
            "sound",
            "depth",
            "archetype_intensity",
            "archetype_influence",
        ];
        for key in keys {
            assert!(map.contains_key(key), "missing {key}");
        }
    }

    #[test]
    fn test_timer_lifecycle() {
        let mut scheduler = Scheduler::new();
        let mut compositor = PersonaCompositor::new();
        compositor.start(&mut scheduler, 5_000);
        compositor.start(&mut scheduler, 5_000);
        assert_eq!(scheduler.pending_count(), 1);
        compositor.reset(&mut scheduler);
        assert!(!compositor.is_running());
        assert_eq!(scheduler.pending_count(), 0);
        assert!(compositor.latest().is_none());
    }
}
