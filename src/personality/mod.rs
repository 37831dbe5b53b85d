//! Personality core: a slowly evolving trait vector and a temperament label.
//!
//! Traits move by `(target - trait) * rate * urgency` per adjustment, with a
//! rate around 1e-4. No single call meaningfully changes behavior; only
//! sustained pressure over many refresh ticks does, which keeps the
//! personality stable under noisy input.
//!
//! The temperament is re-derived from load, error count and activity on
//! every refresh and is what the presentation layer mostly feels.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::channels::{clamp_unit, ChannelMultipliers};
use crate::config::PersonalityConfig;

// ============================================================================
// Traits
// ============================================================================

/// Names of the five trait dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trait {
    /// Dampens motion; grows under sustained low load.
    Calm,
    /// Scales glow and sound; grows with user activity.
    Responsive,
    /// Scales depth; grows with varied interaction.
    Curious,
    Expressive,
    /// Grows when errors are weathered.
    Resilient,
}

impl Trait {
    pub const ALL: [Trait; 5] = [
        Trait::Calm,
        Trait::Responsive,
        Trait::Curious,
        Trait::Expressive,
        Trait::Resilient,
    ];
}

/// The five-dimensional trait vector, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonalityTraits {
    pub calm: f32,
    pub responsive: f32,
    pub curious: f32,
    pub expressive: f32,
    pub resilient: f32,
}

impl Default for PersonalityTraits {
    fn default() -> Self {
        Self {
            calm: 0.6,
            responsive: 0.5,
            curious: 0.5,
            expressive: 0.5,
            resilient: 0.5,
        }
    }
}

impl PersonalityTraits {
    pub fn get(&self, t: Trait) -> f32 {
        match t {
            Trait::Calm => self.calm,
            Trait::Responsive => self.responsive,
            Trait::Curious => self.curious,
            Trait::Expressive => self.expressive,
            Trait::Resilient => self.resilient,
        }
    }

    fn slot(&mut self, t: Trait) -> &mut f32 {
        match t {
            Trait::Calm => &mut self.calm,
            Trait::Responsive => &mut self.responsive,
            Trait::Curious => &mut self.curious,
            Trait::Expressive => &mut self.expressive,
            Trait::Resilient => &mut self.resilient,
        }
    }

    /// Copy with every trait clamped into [0, 1].
    pub fn clamped(mut self) -> Self {
        for t in Trait::ALL {
            let slot = self.slot(t);
            *slot = clamp_unit(*slot);
        }
        self
    }
}

// ============================================================================
// Temperament
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Temperament {
    Serene,
    Focused,
    Alert,
    Dormant,
}

impl Temperament {
    /// Base (glow, motion, sound, depth) before trait modulation.
    fn base_multipliers(self) -> ChannelMultipliers {
        match self {
            Self::Serene => ChannelMultipliers::new(0.8, 0.6, 0.7, 1.1),
            Self::Focused => ChannelMultipliers::new(1.0, 0.9, 0.8, 1.0),
            Self::Alert => ChannelMultipliers::new(1.3, 1.4, 1.2, 0.9),
            Self::Dormant => ChannelMultipliers::new(0.4, 0.3, 0.2, 0.7),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Serene => "serene",
            Self::Focused => "focused",
            Self::Alert => "alert",
            Self::Dormant => "dormant",
        }
    }
}

impl fmt::Display for Temperament {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pick a temperament for the given pressure.
///
/// `load` and `activity` are normalized to [0, 1]. Rules apply in order:
/// dormant, alert, serene, then focused.
pub fn determine_temperament(
    load: f32,
    error_count: u32,
    activity: f32,
    config: &PersonalityConfig,
) -> Temperament {
    if activity < config.low_activity && load < config.low_load {
        Temperament::Dormant
    } else if error_count > config.alert_error_count || load > config.high_load {
        Temperament::Alert
    } else if activity < config.serene_ceiling && load < config.serene_ceiling && error_count == 0
    {
        Temperament::Serene
    } else {
        Temperament::Focused
    }
}

// ============================================================================
// PersonalityCore
// ============================================================================

/// Serializable view of the personality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonalitySnapshot {
    pub traits: PersonalityTraits,
    pub temperament: Temperament,
    pub evolution: f32,
}

#[derive(Debug, Clone)]
pub struct PersonalityCore {
    traits: PersonalityTraits,
    temperament: Temperament,
    /// Lifetime drift, in [0, 1].
    evolution: f32,
    config: PersonalityConfig,
}

impl Default for PersonalityCore {
    fn default() -> Self {
        Self::new(PersonalityConfig::default())
    }
}

impl PersonalityCore {
    pub fn new(config: PersonalityConfig) -> Self {
        Self {
            traits: PersonalityTraits::default(),
            temperament: Temperament::Focused,
            evolution: 0.0,
            config,
        }
    }

    pub fn traits(&self) -> &PersonalityTraits {
        &self.traits
    }

    pub fn temperament(&self) -> Temperament {
        self.temperament
    }

    pub fn evolution(&self) -> f32 {
        self.evolution
    }

    pub fn snapshot(&self) -> PersonalitySnapshot {
        PersonalitySnapshot {
            traits: self.traits,
            temperament: self.temperament,
            evolution: self.evolution,
        }
    }

    /// Nudge one trait toward `target`. Returns the applied delta.
    pub fn adjust_trait(&mut self, t: Trait, target: f32, urgency: f32) -> f32 {
        let target = clamp_unit(target);
        let urgency = if urgency.is_nan() { 0.0 } else { urgency.max(0.0) };
        let rate = self.config.evolution_rate;
        let slot = self.traits.slot(t);
        let before = *slot;
        *slot = clamp_unit(before + (target - before) * rate * urgency);
        let delta = *slot - before;
        self.evolution = clamp_unit(self.evolution + delta.abs());
        delta
    }

    /// Re-derive the temperament. Returns `true` if it changed.
    pub fn update_temperament(&mut self, load: f32, error_count: u32, activity: f32) -> bool {
        let next = determine_temperament(load, error_count, activity, &self.config);
        if next == self.temperament {
            return false;
        }
        log::debug!("[PersonalityCore] temperament {} -> {}", self.temperament, next);
        self.temperament = next;
        true
    }

    /// One refresh tick: update the temperament, then apply slow pressure
    /// on every trait. Returns `true` if the temperament changed.
    pub fn evolve(&mut self, load: f32, error_count: u32, activity: f32) -> bool {
        let load = clamp_unit(load);
        let activity = clamp_unit(activity);
        let changed = self.update_temperament(load, error_count, activity);

        self.adjust_trait(Trait::Calm, 1.0 - load, 1.0);
        self.adjust_trait(Trait::Responsive, activity, 1.0);
        self.adjust_trait(Trait::Curious, activity, 0.5);
        self.adjust_trait(Trait::Expressive, (activity + load) / 2.0, 0.5);
        if error_count > 0 {
            let urgency = (error_count as f32 / 10.0).min(1.0);
            self.adjust_trait(Trait::Resilient, 1.0, urgency);
        }
        changed
    }

    /// Glow, motion, sound and depth scalars for the current temperament,
    /// modulated by traits: `calm` dampens motion, `responsive` scales glow
    /// and sound, `curious` scales depth.
    pub fn get_visual_multipliers(&self) -> ChannelMultipliers {
        let base = self.temperament.base_multipliers();
        let t = &self.traits;
        ChannelMultipliers::new(
            base.glow * (0.8 + 0.4 * t.responsive),
            base.motion * (1.2 - 0.4 * t.calm),
            base.sound * (0.8 + 0.4 * t.responsive),
            base.depth * (0.8 + 0.4 * t.curious),
        )
    }

    /// Adopt persisted traits and drift.
    pub fn restore(&mut self, traits: PersonalityTraits, evolution: f32) {
        self.traits = traits.clamped();
        self.evolution = clamp_unit(evolution);
    }

    pub fn reset(&mut self) {
        self.traits = PersonalityTraits::default();
        self.temperament = Temperament::Focused;
        self.evolution = 0.0;
    }
}

// ============================================================================
// Tests
// ============================================================================
