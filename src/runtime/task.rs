//! Timer vocabulary of the affect runtime.

use crate::behavior::ReactionKey;
use crate::state::SystemState;

/// What a fired timer asks the context to do.
#[derive(Debug, Clone, PartialEq)]
pub enum AffectTask {
    /// Drain buffered interactions into the archetype graph.
    InteractionSample,
    /// Recompose persona multipliers and publish them.
    PersonaSync,
    /// Personality evolution, graph harmonization, reaction pruning.
    StatsRefresh,
    /// Return from an alert override to the state held before it.
    AlertRevert { restore: SystemState },
    ExpireReaction { key: ReactionKey },
}

impl AffectTask {
    pub fn name(&self) -> &'static str {
        match self {
            Self::InteractionSample => "interaction_sample",
            Self::PersonaSync => "persona_sync",
            Self::StatsRefresh => "stats_refresh",
            Self::AlertRevert { .. } => "alert_revert",
            Self::ExpireReaction { .. } => "expire_reaction",
        }
    }
}
