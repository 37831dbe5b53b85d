//! Interaction sampling.
//!
//! User interaction events are buffered between sampling ticks. Each tick
//! turns the buffered counts into an activity level and per-archetype
//! intensity targets, then clears the buffer.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::graph::ids;
use crate::config::{GraphConfig, TimingConfig};
use crate::runtime::scheduler::{Scheduler, TimerHandle};
use crate::runtime::task::AffectTask;

/// Discrete kinds of user interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionKind {
    Click,
    Scroll,
    Hover,
    Keypress,
}

impl InteractionKind {
    pub const ALL: [InteractionKind; 4] = [
        InteractionKind::Click,
        InteractionKind::Scroll,
        InteractionKind::Hover,
        InteractionKind::Keypress,
    ];

    /// The archetype this kind of interaction feeds.
    pub fn archetype(self) -> &'static str {
        match self {
            Self::Click => ids::ARTISAN,
            Self::Scroll => ids::EXPLORER,
            Self::Hover => ids::DREAMER,
            Self::Keypress => ids::SAGE,
        }
    }
}

/// One timestamped interaction from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionSample {
    pub kind: InteractionKind,
    pub timestamp_ms: u64,
}

/// What one sampling tick observed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleSummary {
    pub counts: BTreeMap<InteractionKind, u32>,
    /// Total interactions relative to the saturation count, in [0, 1].
    pub activity: f32,
    /// `true` exactly once per quiet span, on the tick that crosses the
    /// idle threshold.
    pub became_idle: bool,
}

impl SampleSummary {
    /// Intensity target per archetype for every kind seen this tick.
    pub fn archetype_targets(&self, saturation: u32) -> Vec<(&'static str, f32)> {
        let saturation = saturation.max(1) as f32;
        self.counts
            .iter()
            .filter(|(_, &count)| count > 0)
            .map(|(kind, &count)| (kind.archetype(), (count as f32 / saturation).min(1.0)))
            .collect()
    }
}

/// Buffers interactions between sampling ticks.
#[derive(Debug, Default)]
pub struct InteractionSampler {
    pending: BTreeMap<InteractionKind, u32>,
    /// Start of the current quiet span.
    quiet_since_ms: u64,
    idle_reported: bool,
    last_activity: f32,
    timer: Option<TimerHandle>,
}

impl InteractionSampler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, sample: InteractionSample) {
        *self.pending.entry(sample.kind).or_insert(0) += 1;
        self.quiet_since_ms = self.quiet_since_ms.max(sample.timestamp_ms);
        self.idle_reported = false;
    }

    /// Drain the buffer into a summary.
    pub fn take_sample(
        &mut self,
        now_ms: u64,
        graph: &GraphConfig,
        timing: &TimingConfig,
    ) -> SampleSummary {
        let counts = std::mem::take(&mut self.pending);
        let total: u32 = counts.values().sum();
        let activity = (total as f32 / graph.interaction_saturation.max(1) as f32).min(1.0);
        self.last_activity = activity;

        let quiet_for = now_ms.saturating_sub(self.quiet_since_ms);
        let became_idle =
            total == 0 && !self.idle_reported && quiet_for >= timing.idle_after_ms;
        if became_idle {
            self.idle_reported = true;
        }

        SampleSummary {
            counts,
            activity,
            became_idle,
        }
    }

    /// Activity level measured by the most recent sample.
    pub fn last_activity(&self) -> f32 {
        self.last_activity
    }

    pub fn pending_total(&self) -> u32 {
        self.pending.values().sum()
    }

    /// Arm the sampling tick. Calling twice keeps the first timer.
    pub fn start(&mut self, scheduler: &mut Scheduler<AffectTask>, period_ms: u64) {
        if self.timer.is_none() {
            self.quiet_since_ms = self.quiet_since_ms.max(scheduler.now_ms());
            let handle = scheduler.schedule_interval(period_ms, AffectTask::InteractionSample);
            self.timer = Some(handle);
        }
    }

    pub fn stop(&mut self, scheduler: &mut Scheduler<AffectTask>) {
        if let Some(handle) = self.timer.take() {
            scheduler.cancel(handle);
        }
    }

    pub fn is_running(&self) -> bool {
        self.timer.is_some()
    }

    /// Cancel the tick and forget buffered samples.
    pub fn reset(&mut self, scheduler: &mut Scheduler<AffectTask>) {
        self.stop(scheduler);
        *self = Self {
            quiet_since_ms: scheduler.now_ms(),
            ..Self::default()
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(kind: InteractionKind, t: u64) -> InteractionSample {
        InteractionSample {
            kind,
            timestamp_ms: t,
        }
    }

    #[test]
    fn test_sample_drains_counts() {
        let mut s = InteractionSampler::new();
        for t in 0..4 {
            s.record(sample(InteractionKind::Click, t));
        }
        s.record(sample(InteractionKind::Scroll, 5));
        let summary = s.take_sample(2_000, &GraphConfig::default(), &TimingConfig::default());
        assert_eq!(summary.counts[&InteractionKind::Click], 4);
        assert!((summary.activity - 0.5).abs() < 1e-6);
        assert!(!summary.became_idle);
        assert_eq!(s.pending_total(), 0);

        let targets = summary.archetype_targets(10);
        assert_eq!(targets, vec![(ids::ARTISAN, 0.4), (ids::EXPLORER, 0.1)]);
    }

    #[test]
    fn test_activity_saturates() {
        let mut s = InteractionSampler::new();
        for t in 0..50 {
            s.record(sample(InteractionKind::Keypress, t));
        }
        let summary = s.take_sample(100, &GraphConfig::default(), &TimingConfig::default());
        assert_eq!(summary.activity, 1.0);
        assert_eq!(summary.archetype_targets(10), vec![(ids::SAGE, 1.0)]);
    }

    #[test]
    fn test_idle_reported_once_per_quiet_span() {
        let graph = GraphConfig::default();
        let timing = TimingConfig::default();
        let mut s = InteractionSampler::new();
        s.record(sample(InteractionKind::Hover, 1_000));
        assert!(!s.take_sample(2_000, &graph, &timing).became_idle);
        assert!(!s.take_sample(30_000, &graph, &timing).became_idle);
        assert!(s.take_sample(31_000, &graph, &timing).became_idle);
        assert!(!s.take_sample(60_000, &graph, &timing).became_idle);

        s.record(sample(InteractionKind::Hover, 61_000));
        assert!(!s.take_sample(62_000, &graph, &timing).became_idle);
        assert!(s.take_sample(91_000, &graph, &timing).became_idle);
    }

    #[test]
    fn test_start_is_idempotent_and_stop_cancels() {
        let mut scheduler = Scheduler::new();
        let mut s = InteractionSampler::new();
        s.start(&mut scheduler, 2_000);
        s.start(&mut scheduler, 2_000);
        assert_eq!(scheduler.pending_count(), 1);
        s.stop(&mut scheduler);
        assert_eq!(scheduler.pending_count(), 0);
        assert!(!s.is_running());
    }
}
