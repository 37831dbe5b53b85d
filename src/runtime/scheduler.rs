//! Virtual-time timer queue.
//!
//! Replaces implicit host timers with an explicit, deterministic queue.
//! Nothing here sleeps: the owner moves time forward with
//! [`Scheduler::pop_due`] / [`Scheduler::advance_to`], which makes tick
//! cadence and teardown testable without wall-clock waits.
//!
//! Timers due at the same instant fire in the order they were scheduled.
//! An interval timer keeps its original place in that order every time it
//! re-arms.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies one scheduled timer. Retained by the owning engine so it can
/// cancel the timer on `stop`/`reset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimerHandle(u64);

/// A timer that came due.
#[derive(Debug, Clone, PartialEq)]
pub struct FiredTimer<T> {
    pub handle: TimerHandle,
    pub task: T,
    /// The virtual instant the timer was due.
    pub at_ms: u64,
}

struct TimerEntry<T> {
    task: T,
    period_ms: Option<u64>,
    key: (u64, u64),
}

/// Deterministic timer queue over an arbitrary task vocabulary `T`.
pub struct Scheduler<T> {
    now_ms: u64,
    next_id: u64,
    next_seq: u64,
    /// `(due_ms, seq)` → timer id.
    queue: BTreeMap<(u64, u64), u64>,
    timers: HashMap<u64, TimerEntry<T>>,
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Scheduler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("now_ms", &self.now_ms)
            .field("pending", &self.timers.len())
            .finish()
    }
}

impl<T> Scheduler<T> {
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    /// A scheduler whose clock starts at `now_ms`.
    pub fn starting_at(now_ms: u64) -> Self {
        Self {
            now_ms,
            next_id: 1,
            next_seq: 0,
            queue: BTreeMap::new(),
            timers: HashMap::new(),
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    /// Fire `task` once, `delay_ms` from now.
    pub fn schedule_once(&mut self, delay_ms: u64, task: T) -> TimerHandle {
        self.insert(self.now_ms.saturating_add(delay_ms), None, task)
    }

    /// Fire `task` every `period_ms`, first firing one period from now.
    /// A zero period is raised to 1 ms so the queue always makes progress.
    pub fn schedule_interval(&mut self, period_ms: u64, task: T) -> TimerHandle {
        let period = period_ms.max(1);
        self.insert(self.now_ms.saturating_add(period), Some(period), task)
    }

    /// Cancel a timer. Returns `false` if it already fired (one-shot) or was
    /// cancelled before.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        match self.timers.remove(&handle.0) {
            Some(entry) => {
                self.queue.remove(&entry.key);
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&mut self) {
        self.queue.clear();
        self.timers.clear();
    }

    pub fn is_scheduled(&self, handle: TimerHandle) -> bool {
        self.timers.contains_key(&handle.0)
    }

    pub fn pending_count(&self) -> usize {
        self.timers.len()
    }

    /// Due instant of the earliest pending timer.
    pub fn next_due(&self) -> Option<u64> {
        self.queue.keys().next().map(|(due, _)| *due)
    }

    /// Move the clock forward to `until_ms` without firing anything.
    /// Never moves backwards.
    pub fn settle(&mut self, until_ms: u64) {
        self.now_ms = self.now_ms.max(until_ms);
    }

    fn insert(&mut self, due_ms: u64, period_ms: Option<u64>, task: T) -> TimerHandle {
        let id = self.next_id;
        self.next_id += 1;
        let key = (due_ms, self.bump_seq());
        self.queue.insert(key, id);
        self.timers.insert(
            id,
            TimerEntry {
                task,
                period_ms,
                key,
            },
        );
        TimerHandle(id)
    }

    fn bump_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }
}

impl<T: Clone> Scheduler<T> {
    /// Pop the earliest timer due at or before `until_ms`.
    ///
    /// The clock moves to the timer's due instant. Interval timers are
    /// re-armed one period later, under their original sequence number,
    /// before being returned, so a handler may cancel them through the
    /// returned handle.
    pub fn pop_due(&mut self, until_ms: u64) -> Option<FiredTimer<T>> {
        let (&key, &id) = self.queue.iter().next()?;
        if key.0 > until_ms {
            return None;
        }
        self.queue.remove(&key);
        self.now_ms = self.now_ms.max(key.0);

        let period = self.timers.get(&id).and_then(|e| e.period_ms);
        let task = match period {
            Some(period) => {
                let next_key = (key.0.saturating_add(period), key.1);
                let entry = self.timers.get_mut(&id)?;
                entry.key = next_key;
                self.queue.insert(next_key, id);
                entry.task.clone()
            }
            None => self.timers.remove(&id)?.task,
        };

        Some(FiredTimer {
            handle: TimerHandle(id),
            task,
            at_ms: key.0,
        })
    }

    /// Fire everything due up to `until_ms` and leave the clock there.
    pub fn advance_to(&mut self, until_ms: u64) -> Vec<FiredTimer<T>> {
        let mut fired = Vec::new();
        while let Some(timer) = self.pop_due(until_ms) {
            fired.push(timer);
        }
        self.settle(until_ms);
        fired
    }
}
