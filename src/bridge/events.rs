//! Event types carried by the bridge.
//!
//! Every payload is a variant of [`EventPayload`], carrying only the fields
//! relevant to that kind. Events are immutable once emitted.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::behavior::{Posture, TriggerKind};
use crate::mood::MoodType;
use crate::personality::Temperament;
use crate::state::SystemState;

// ---------------------------------------------------------------------------
// Priority and severity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventPriority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl EventPriority {
    /// Priority of events describing `state`.
    pub fn for_state(state: SystemState) -> Self {
        match state {
            SystemState::Danger => Self::Critical,
            SystemState::Warning => Self::High,
            SystemState::Offline | SystemState::Unknown => Self::Low,
            SystemState::Stable | SystemState::Processing => Self::Normal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

impl AlertSeverity {
    /// State an alert of this severity overrides to.
    pub fn mapped_state(self) -> SystemState {
        match self {
            Self::Info => SystemState::Processing,
            Self::Warning => SystemState::Warning,
            Self::Critical => SystemState::Danger,
        }
    }

    pub fn priority(self) -> EventPriority {
        match self {
            Self::Info => EventPriority::Normal,
            Self::Warning => EventPriority::High,
            Self::Critical => EventPriority::Critical,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    StateChanged {
        from: SystemState,
        to: SystemState,
    },
    SoundCue {
        cue: String,
        state: SystemState,
    },
    DepthChanged {
        depth: f32,
    },
    MotionSpeedChanged {
        speed: f32,
    },
    MoodChanged {
        from: MoodType,
        to: MoodType,
        intensity: f32,
    },
    TemperamentChanged {
        from: Temperament,
        to: Temperament,
    },
    ReactionTriggered {
        kind: TriggerKind,
        posture: Posture,
    },
    ArchetypeShift {
        dominant: String,
        intensity: f32,
    },
    AlertRaised {
        severity: AlertSeverity,
        message: String,
        state: SystemState,
    },
    AlertReverted {
        restored: SystemState,
    },
    PersonaSynced {
        channels: BTreeMap<String, f32>,
    },
}

/// Payload discriminant, used as the subscription key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    StateChanged,
    SoundCue,
    DepthChanged,
    MotionSpeedChanged,
    MoodChanged,
    TemperamentChanged,
    ReactionTriggered,
    ArchetypeShift,
    AlertRaised,
    AlertReverted,
    PersonaSynced,
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::StateChanged { .. } => EventKind::StateChanged,
            Self::SoundCue { .. } => EventKind::SoundCue,
            Self::DepthChanged { .. } => EventKind::DepthChanged,
            Self::MotionSpeedChanged { .. } => EventKind::MotionSpeedChanged,
            Self::MoodChanged { .. } => EventKind::MoodChanged,
            Self::TemperamentChanged { .. } => EventKind::TemperamentChanged,
            Self::ReactionTriggered { .. } => EventKind::ReactionTriggered,
            Self::ArchetypeShift { .. } => EventKind::ArchetypeShift,
            Self::AlertRaised { .. } => EventKind::AlertRaised,
            Self::AlertReverted { .. } => EventKind::AlertReverted,
            Self::PersonaSynced { .. } => EventKind::PersonaSynced,
        }
    }
}

// ---------------------------------------------------------------------------
// BridgeEvent
// ---------------------------------------------------------------------------

/// One emitted event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeEvent {
    pub id: Uuid,
    pub payload: EventPayload,
    /// Virtual time of emission.
    pub timestamp_ms: u64,
    pub priority: EventPriority,
}

impl BridgeEvent {
    pub fn new(payload: EventPayload, priority: EventPriority, timestamp_ms: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            payload,
            timestamp_ms,
            priority,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}
