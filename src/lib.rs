//! # affect-layer
//!
//! An always-on affect layer for adaptive user interfaces. Coarse
//! operational signals (load, errors, interaction cadence) go in; a small
//! bounded set of expressive parameters comes out for renderers to consume.
//!
//! The engines, leaves first:
//!
//! - [`state`]: discrete classification of system health
//! - [`archetype`]: one-hop influence graph fed by user interactions
//! - [`mood`]: state-driven mood with bounded history
//! - [`personality`]: slowly evolving traits and a temperament label
//! - [`behavior`]: timed reactions and posture
//! - [`compositor`]: multiplicative composition into output channels
//! - [`bridge`]: the typed event bus tying them together
//!
//! [`runtime::AffectContext`] owns one instance of each, plus the
//! virtual-time [`runtime::Scheduler`] that drives their timers.

pub mod archetype;
pub mod behavior;
pub mod bridge;
mod callback;
pub mod channels;
pub mod compositor;
pub mod config;
pub mod error;
pub mod mood;
pub mod personality;
pub mod runtime;
pub mod state;
pub mod storage;

pub use bridge::{AlertSeverity, BridgeEvent, EngineBridge, EventKind, EventPayload};
pub use channels::{Channel, ChannelMultipliers};
pub use config::AffectConfig;
pub use error::{AffectError, AffectResult, ConfigError, StoreError};
pub use runtime::{AffectContext, AffectSnapshot};
pub use state::{SystemMetrics, SystemState};
