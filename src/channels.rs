//! Multiplier channels shared by every engine.
//!
//! Each engine expresses its influence on the presentation layer as a
//! [`ChannelMultipliers`] value; the compositor multiplies them together.

use std::collections::BTreeMap;
use std::ops::Mul;

use serde::{Deserialize, Serialize};

/// Clamp into [0, 1], mapping NaN to 0. Every intensity is written through this.
pub fn clamp_unit(v: f32) -> f32 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

/// A named output channel consumed by renderers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Glow,
    Motion,
    Sound,
    Depth,
}

impl Channel {
    pub const ALL: [Channel; 4] = [Channel::Glow, Channel::Motion, Channel::Sound, Channel::Depth];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Glow => "glow",
            Self::Motion => "motion",
            Self::Sound => "sound",
            Self::Depth => "depth",
        }
    }
}

/// Per-channel scale factors. `1.0` is neutral.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelMultipliers {
    pub glow: f32,
    pub motion: f32,
    pub sound: f32,
    pub depth: f32,
}

impl Default for ChannelMultipliers {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

impl ChannelMultipliers {
    pub const NEUTRAL: ChannelMultipliers = ChannelMultipliers {
        glow: 1.0,
        motion: 1.0,
        sound: 1.0,
        depth: 1.0,
    };

    pub const fn new(glow: f32, motion: f32, sound: f32, depth: f32) -> Self {
        Self {
            glow,
            motion,
            sound,
            depth,
        }
    }

    pub fn get(&self, channel: Channel) -> f32 {
        match channel {
            Channel::Glow => self.glow,
            Channel::Motion => self.motion,
            Channel::Sound => self.sound,
            Channel::Depth => self.depth,
        }
    }

    /// Apply `f` to every channel.
    pub fn map(self, f: impl Fn(f32) -> f32) -> Self {
        Self::new(f(self.glow), f(self.motion), f(self.sound), f(self.depth))
    }

    /// Uniformly scale every channel.
    pub fn scaled(self, factor: f32) -> Self {
        self.map(|v| v * factor)
    }

    /// Clamp every channel into `[min, max]`, mapping NaN to `min`.
    pub fn clamped(self, min: f32, max: f32) -> Self {
        self.map(|v| if v.is_nan() { min } else { v.clamp(min, max) })
    }

    pub fn to_map(&self) -> BTreeMap<String, f32> {
        Channel::ALL
            .iter()
            .map(|c| (c.as_str().to_string(), self.get(*c)))
            .collect()
    }
}

/// Channel-wise product.
impl Mul for ChannelMultipliers {
    type Output = ChannelMultipliers;

    fn mul(self, rhs: Self) -> Self::Output {
        Self::new(
            self.glow * rhs.glow,
            self.motion * rhs.motion,
            self.sound * rhs.sound,
            self.depth * rhs.depth,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_is_channelwise() {
        let a = ChannelMultipliers::new(2.0, 1.0, 0.5, 1.0);
        let b = ChannelMultipliers::new(0.5, 3.0, 0.0, 1.0);
        assert_eq!(a * b, ChannelMultipliers::new(1.0, 3.0, 0.0, 1.0));
    }

    #[test]
    fn test_clamped_handles_nan() {
        let m = ChannelMultipliers::new(f32::NAN, 5.0, -1.0, 0.5).clamped(0.0, 3.0);
        assert_eq!(m, ChannelMultipliers::new(0.0, 3.0, 0.0, 0.5));
    }

    #[test]
    fn test_map_names() {
        let map = ChannelMultipliers::NEUTRAL.to_map();
        assert_eq!(
            map.keys().cloned().collect::<Vec<_>>(),
            vec!["depth", "glow", "motion", "sound"]
        );
    }
}
