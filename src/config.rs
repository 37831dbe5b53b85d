//! Configuration for the affect layer.
//!
//! All tunables live in [`AffectConfig`]. Defaults are compiled in; a YAML
//! document may override any subset of them, and `AFFECT_*` environment
//! variables are applied last.
//!
//! # Environment Variables
//!
//! - `AFFECT_CPU_WARNING` / `AFFECT_CPU_CRITICAL` — cpu thresholds (percent)
//! - `AFFECT_MEMORY_WARNING` / `AFFECT_MEMORY_CRITICAL` — memory thresholds (percent)
//! - `AFFECT_CONNECTION_THRESHOLD` — connection count that means "processing"
//! - `AFFECT_SAMPLE_MS` — interaction sampling period
//! - `AFFECT_PERSONA_SYNC_MS` — compositor period
//! - `AFFECT_STATS_MS` — stats refresh period
//! - `AFFECT_ALERT_REVERT_MS` — delay before an alert override reverts
//! - `AFFECT_EVENT_HISTORY` — event ring buffer capacity

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Metric thresholds used by the state classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateThresholds {
    /// Cpu percentage above which the system is in `warning`.
    pub cpu_warning: f64,
    /// Cpu percentage above which the system is in `danger`.
    pub cpu_critical: f64,
    /// Memory percentage above which the system is in `warning`.
    pub memory_warning: f64,
    /// Memory percentage above which the system is in `danger`.
    pub memory_critical: f64,
    /// Connection count above which the system is `processing`.
    pub connection_threshold: u32,
    /// Error count above which the system is in `danger`.
    pub danger_error_count: u32,
}

impl Default for StateThresholds {
    fn default() -> Self {
        Self {
            cpu_warning: 70.0,
            cpu_critical: 90.0,
            memory_warning: 70.0,
            memory_critical: 90.0,
            connection_threshold: 50,
            danger_error_count: 10,
        }
    }
}

/// Timer cadences, all in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub interaction_sample_ms: u64,
    pub persona_sync_ms: u64,
    pub stats_refresh_ms: u64,
    pub alert_revert_ms: u64,
    /// Quiet span after which the sampler reports the user as idle.
    pub idle_after_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            interaction_sample_ms: 2_000,
            persona_sync_ms: 5_000,
            stats_refresh_ms: 10_000,
            alert_revert_ms: 2_000,
            idle_after_ms: 30_000,
        }
    }
}

/// Archetype graph dynamics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Share of a source's intensity pushed to each direct neighbor.
    pub propagation_factor: f32,
    /// Fraction of the distance to the mean covered by one harmonize pass.
    pub harmonize_rate: f32,
    /// Interaction count per sample that maps to full intensity.
    pub interaction_saturation: u32,
    /// Weight of a fresh sample when blending into the current intensity.
    pub intensity_smoothing: f32,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            propagation_factor: 0.15,
            harmonize_rate: 0.2,
            interaction_saturation: 10,
            intensity_smoothing: 0.3,
        }
    }
}

/// Largest accepted value for either history capacity.
pub const MAX_HISTORY_CAPACITY: usize = 100_000;

/// Bounded buffer sizes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub event_capacity: usize,
    pub mood_capacity: usize,
    /// Trailing window used by the dominant-mood query.
    pub dominant_mood_window_ms: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            event_capacity: 100,
            mood_capacity: 20,
            dominant_mood_window_ms: 10_000,
        }
    }
}

/// Personality evolution and temperament thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonalityConfig {
    pub evolution_rate: f32,
    pub low_activity: f32,
    pub low_load: f32,
    /// Activity and load below this (with no errors) read as serene.
    pub serene_ceiling: f32,
    pub high_load: f32,
    pub alert_error_count: u32,
}

impl Default for PersonalityConfig {
    fn default() -> Self {
        Self {
            evolution_rate: 1e-4,
            low_activity: 0.1,
            low_load: 0.1,
            serene_ceiling: 0.4,
            high_load: 0.8,
            alert_error_count: 3,
        }
    }
}

// ---------------------------------------------------------------------------
// AffectConfig
// ---------------------------------------------------------------------------

/// Complete affect layer configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AffectConfig {
    pub thresholds: StateThresholds,
    pub timing: TimingConfig,
    pub graph: GraphConfig,
    pub history: HistoryConfig,
    pub personality: PersonalityConfig,
}

impl AffectConfig {
    /// Parse a YAML document. Missing keys keep their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: AffectConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&raw)
    }

    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Apply `AFFECT_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup, then re-validate.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        override_value(&lookup, "AFFECT_CPU_WARNING", &mut self.thresholds.cpu_warning)?;
        override_value(&lookup, "AFFECT_CPU_CRITICAL", &mut self.thresholds.cpu_critical)?;
        override_value(&lookup, "AFFECT_MEMORY_WARNING", &mut self.thresholds.memory_warning)?;
        override_value(&lookup, "AFFECT_MEMORY_CRITICAL", &mut self.thresholds.memory_critical)?;
        override_value(
            &lookup,
            "AFFECT_CONNECTION_THRESHOLD",
            &mut self.thresholds.connection_threshold,
        )?;
        override_value(&lookup, "AFFECT_SAMPLE_MS", &mut self.timing.interaction_sample_ms)?;
        override_value(&lookup, "AFFECT_PERSONA_SYNC_MS", &mut self.timing.persona_sync_ms)?;
        override_value(&lookup, "AFFECT_STATS_MS", &mut self.timing.stats_refresh_ms)?;
        override_value(&lookup, "AFFECT_ALERT_REVERT_MS", &mut self.timing.alert_revert_ms)?;
        override_value(&lookup, "AFFECT_EVENT_HISTORY", &mut self.history.event_capacity)?;
        self.validate()
    }

    /// Check ranges and orderings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.thresholds;
        if t.cpu_warning >= t.cpu_critical {
            return Err(invalid("thresholds.cpu_warning", "must be below cpu_critical"));
        }
        if t.memory_warning >= t.memory_critical {
            return Err(invalid("thresholds.memory_warning", "must be below memory_critical"));
        }

        let timing = &self.timing;
        for (key, value) in [
            ("timing.interaction_sample_ms", timing.interaction_sample_ms),
            ("timing.persona_sync_ms", timing.persona_sync_ms),
            ("timing.stats_refresh_ms", timing.stats_refresh_ms),
            ("timing.alert_revert_ms", timing.alert_revert_ms),
        ] {
            if value == 0 {
                return Err(invalid(key, "must be greater than zero"));
            }
        }

        for (key, value) in [
            ("graph.propagation_factor", self.graph.propagation_factor),
            ("graph.harmonize_rate", self.graph.harmonize_rate),
            ("graph.intensity_smoothing", self.graph.intensity_smoothing),
            ("personality.evolution_rate", self.personality.evolution_rate),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(key, "must be within [0, 1]"));
            }
        }

        for (key, value) in [
            ("history.event_capacity", self.history.event_capacity),
            ("history.mood_capacity", self.history.mood_capacity),
        ] {
            if value == 0 || value > MAX_HISTORY_CAPACITY {
                return Err(invalid(key, "must be within [1, 100000]"));
            }
        }
        Ok(())
    }
}

fn invalid(key: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn override_value<T, F>(lookup: &F, key: &str, slot: &mut T) -> Result<(), ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(key) {
        *slot = raw
            .trim()
            .parse()
            .map_err(|_| invalid(key, &format!("cannot parse '{raw}'")))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = AffectConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.history.event_capacity, 100);
        assert_eq!(config.history.mood_capacity, 20);
        assert_eq!(config.timing.alert_revert_ms, 2_000);
        assert_eq!(config.graph.propagation_factor, 0.15);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
thresholds:
  cpu_warning: 60
timing:
  persona_sync_ms: 1000
"#;
        let config = AffectConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.thresholds.cpu_warning, 60.0);
        assert_eq!(config.thresholds.cpu_critical, 90.0);
        assert_eq!(config.timing.persona_sync_ms, 1000);
        assert_eq!(config.timing.stats_refresh_ms, 10_000);
    }

    #[test]
    fn test_yaml_rejects_inverted_thresholds() {
        let yaml = "thresholds:\n  cpu_warning: 95\n  cpu_critical: 90\n";
        let err = AffectConfig::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_overrides_apply_and_validate() {
        let env: HashMap<&str, &str> =
            [("AFFECT_ALERT_REVERT_MS", "500"), ("AFFECT_EVENT_HISTORY", "10")].into();
        let mut config = AffectConfig::default();
        config
            .apply_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.timing.alert_revert_ms, 500);
        assert_eq!(config.history.event_capacity, 10);
    }

    #[test]
    fn test_unparseable_override_is_an_error() {
        let mut config = AffectConfig::default();
        let err = config
            .apply_overrides(|k| (k == "AFFECT_SAMPLE_MS").then(|| "soon".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("AFFECT_SAMPLE_MS"));
    }

    #[test]
    fn test_zero_period_rejected() {
        let mut config = AffectConfig::default();
        config.timing.persona_sync_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_history_capacity_bounds() {
        let mut config = AffectConfig::default();
        config.history.event_capacity = usize::MAX;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "history.event_capacity"
        ));
        config.history.event_capacity = MAX_HISTORY_CAPACITY;
        assert!(config.validate().is_ok());
        config.history.mood_capacity = 0;
        assert!(config.validate().is_err());
    }
}
