//! Archetype graph and the interaction sampler that feeds it.

pub mod graph;
pub mod sampler;

pub use graph::{default_archetypes, ids, ArchetypeGraph, ArchetypeNode};
pub use sampler::{InteractionKind, InteractionSample, InteractionSampler, SampleSummary};
