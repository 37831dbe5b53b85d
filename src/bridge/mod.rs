//! Central event bus coordinating all engines.

pub mod bus;
pub mod engine_bridge;
pub mod events;

pub use bus::{EventBus, EventHandler, HandlerId};
pub use engine_bridge::{AlertOutcome, EngineBridge, StatePresentation};
pub use events::{AlertSeverity, BridgeEvent, EventKind, EventPayload, EventPriority};
