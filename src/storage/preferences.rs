//! The single versioned user-preference record.
//!
//! Stored as JSON under [`PREFERENCES_KEY`]. [`load_preferences`] and
//! [`save_preferences`] never fail: errors are logged and defaults are used.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::PreferenceStore;
use crate::error::StoreError;
use crate::personality::PersonalityTraits;

pub const PREFERENCES_KEY: &str = "affect.preferences";
pub const PREFERENCES_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserPreferences {
    pub version: u32,
    pub traits: PersonalityTraits,
    pub evolution: f32,
    pub sound_enabled: bool,
    pub reduced_motion: bool,
    pub saved_at: Option<DateTime<Utc>>,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            version: PREFERENCES_VERSION,
            traits: PersonalityTraits::default(),
            evolution: 0.0,
            sound_enabled: true,
            reduced_motion: false,
            saved_at: None,
        }
    }
}

/// Read the record, surfacing every failure.
pub fn read_preferences(
    store: &dyn PreferenceStore,
) -> Result<Option<UserPreferences>, StoreError> {
    let Some(raw) = store.get(PREFERENCES_KEY)? else {
        return Ok(None);
    };
    let prefs: UserPreferences = serde_json::from_str(&raw)?;
    if prefs.version != PREFERENCES_VERSION {
        return Err(StoreError::VersionMismatch {
            found: prefs.version,
            expected: PREFERENCES_VERSION,
        });
    }
    Ok(Some(prefs))
}

/// Write the record, stamping `saved_at`.
pub fn write_preferences(
    store: &dyn PreferenceStore,
    prefs: &UserPreferences,
) -> Result<(), StoreError> {
    let record = UserPreferences {
        version: PREFERENCES_VERSION,
        saved_at: Some(Utc::now()),
        ..prefs.clone()
    };
    let json = serde_json::to_string(&record)?;
    store.set(PREFERENCES_KEY, &json)
}

/// Read the record, falling back to defaults on absence or any error.
pub fn load_preferences(store: &dyn PreferenceStore) -> UserPreferences {
    match read_preferences(store) {
        Ok(Some(prefs)) => {
            log::info!("Loaded user preferences (saved {:?})", prefs.saved_at);
            prefs
        }
        Ok(None) => UserPreferences::default(),
        Err(e) => {
            log::warn!("Failed to load user preferences, using defaults: {}", e);
            UserPreferences::default()
        }
    }
}

/// Write the record. Returns `false` if the write failed; the failure is
/// logged, never raised.
pub fn save_preferences(store: &dyn PreferenceStore, prefs: &UserPreferences) -> bool {
    match write_preferences(store, prefs) {
        Ok(()) => {
            log::info!("Saved user preferences");
            true
        }
        Err(e) => {
            log::warn!("Failed to save user preferences: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryPreferenceStore;

    /// A store whose every operation fails.
    #[derive(Debug)]
    struct BrokenStore;

    impl PreferenceStore for BrokenStore {
        fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Io(std::io::Error::other("disk gone")))
        }

        fn set(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
            Err(StoreError::Io(std::io::Error::other("disk gone")))
        }
    }

    #[test]
    fn test_missing_record_gives_defaults() {
        let store = MemoryPreferenceStore::new();
        assert_eq!(load_preferences(&store), UserPreferences::default());
    }

    #[test]
    fn test_save_then_load() {
        let store = MemoryPreferenceStore::new();
        let prefs = UserPreferences {
            reduced_motion: true,
            evolution: 0.25,
            ..Default::default()
        };
        assert!(save_preferences(&store, &prefs));
        let loaded = load_preferences(&store);
        assert!(loaded.reduced_motion);
        assert_eq!(loaded.evolution, 0.25);
        assert!(loaded.saved_at.is_some());
    }

    #[test]
    fn test_failures_fall_back_silently() {
        assert_eq!(load_preferences(&BrokenStore), UserPreferences::default());
        assert!(!save_preferences(&BrokenStore, &UserPreferences::default()));
    }

    #[test]
    fn test_corrupt_and_foreign_records() {
        let store = MemoryPreferenceStore::new();
        store.set(PREFERENCES_KEY, "{not json").unwrap();
        assert!(matches!(
            read_preferences(&store),
            Err(StoreError::Serialization(_))
        ));
        assert_eq!(load_preferences(&store), UserPreferences::default());

        store.set(PREFERENCES_KEY, r#"{"version": 7}"#).unwrap();
        assert!(matches!(
            read_preferences(&store),
            Err(StoreError::VersionMismatch { found: 7, expected: 1 })
        ));
    }
}
