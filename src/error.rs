//! Error types for the affect layer.
//!
//! Every failure in this crate is local and non-fatal. Operations that can
//! legitimately fail (unknown archetype ids, bad configuration, storage
//! trouble) return these errors; the runtime logs them and carries on.

use thiserror::Error;

/// Top-level error for affect layer operations.
#[derive(Debug, Error)]
pub enum AffectError {
    /// An archetype id that is not part of the graph.
    #[error("Unknown archetype: {id}")]
    UnknownArchetype { id: String },

    /// Configuration could not be loaded or failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Preference storage failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors raised while loading or validating [`crate::config::AffectConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// YAML could not be parsed.
    #[error("Configuration parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A configuration file could not be read.
    #[error("Configuration read error: {0}")]
    Io(#[from] std::io::Error),

    /// A value is out of its allowed range or inconsistent with another.
    #[error("Invalid configuration value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}

/// Errors from a [`crate::storage::PreferenceStore`] backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite backend failure.
    #[error("Preference store sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The stored record could not be (de)serialized.
    #[error("Preference record serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem failure while opening the store.
    #[error("Preference store io error: {0}")]
    Io(#[from] std::io::Error),

    /// The stored record was written by an incompatible version.
    #[error("Preference record version {found} is not supported (expected {expected})")]
    VersionMismatch { found: u32, expected: u32 },
}

/// Convenience result alias used across the crate.
pub type AffectResult<T> = Result<T, AffectError>;
