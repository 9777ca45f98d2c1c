//! Incremental discovery over a "load more" style listing.
//!
//! The loop repeatedly asks a [`PageSource`] for more content, merges newly
//! visible [`CandidateItem`]s into an [`AccumulatedSet`], and stops once the
//! target is met, the attempt budget is spent, or the source stops
//! responding to triggers.
//!
//! # Termination
//!
//! | State       | Condition                                              |
//! |-------------|--------------------------------------------------------|
//! | `Satisfied` | accumulated items `>= target_size`                     |
//! | `Stalled`   | `consecutive_failures >= max_consecutive_failures`     |
//! | `Exhausted` | `attempts_made >= max_attempts`, or the trigger ceiling |
//! | `Running`   | none of the above; the loop triggers again             |
//!
//! Conditions are checked top to bottom. All three terminal states return
//! the accumulated items; none is an error.
//!
//! The trigger ceiling caps trigger actions at
//! `max_attempts + max_consecutive_failures` per run, successful or not.

use crate::error::ScrapeError;
use crate::models::CandidateItem;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

/// A listing that can show its current items and be asked for more.
///
/// Implementors wrap a rendered page (see [`crate::browser`]) together with
/// the site-specific selectors used to read candidates out of it.
pub trait PageSource {
    /// Extract every candidate currently visible.
    async fn snapshot(&mut self) -> Result<Vec<CandidateItem>, ScrapeError>;

    /// Request more content. Returns [`ScrapeError::Trigger`] when no
    /// actionable control exists.
    async fn trigger_more(&mut self) -> Result<(), ScrapeError>;
}

/// Whether a trigger that worked but surfaced nothing new counts as a failure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum StallPolicy {
    /// Only a trigger that could not be performed counts.
    #[default]
    TriggerOnly,
    /// A successful trigger yielding zero new items also counts.
    CountEmptyYield,
}

/// Bounds and pacing for one discovery run.
#[derive(Debug, Clone)]
pub struct DiscoveryLimits {
    pub target_size: usize,
    pub max_attempts: usize,
    pub max_consecutive_failures: usize,
    /// Pause after a successful trigger so asynchronously rendered items land.
    pub settle_delay: Duration,
    /// Cut the result down to `target_size` items.
    pub truncate: bool,
    pub stall_policy: StallPolicy,
}

/// Mutable counters for one run of the loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub attempts_made: usize,
    pub consecutive_failures: usize,
    /// Trigger actions performed, successful or not.
    pub triggers: usize,
    pub target_size: usize,
    pub max_attempts: usize,
    pub max_consecutive_failures: usize,
}

impl SessionState {
    pub fn new(limits: &DiscoveryLimits) -> Self {
        Self {
            attempts_made: 0,
            consecutive_failures: 0,
            triggers: 0,
            target_size: limits.target_size,
            max_attempts: limits.max_attempts,
            // a ceiling of zero would stall on the first successful trigger
            max_consecutive_failures: limits.max_consecutive_failures.max(1),
        }
    }

    /// Upper bound on trigger actions for the run.
    pub fn trigger_ceiling(&self) -> usize {
        self.max_attempts.saturating_add(self.max_consecutive_failures)
    }

    /// Where the loop stands with `collected` items accumulated.
    pub fn status(&self, collected: usize) -> DiscoveryState {
        if collected >= self.target_size {
            DiscoveryState::Satisfied
        } else if self.stalled() {
            DiscoveryState::Stalled
        } else if self.attempts_made >= self.max_attempts || self.triggers >= self.trigger_ceiling() {
            DiscoveryState::Exhausted
        } else {
            DiscoveryState::Running
        }
    }

    fn record_success(&mut self, added: usize, policy: StallPolicy) {
        self.attempts_made += 1;
        match (policy, added) {
            (StallPolicy::CountEmptyYield, 0) => self.consecutive_failures += 1,
            _ => self.consecutive_failures = 0,
        }
    }

    fn record_failure(&mut self) {
        self.consecutive_failures += 1;
    }

    fn stalled(&self) -> bool {
        self.consecutive_failures >= self.max_consecutive_failures
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryState {
    Running,
    Satisfied,
    Exhausted,
    Stalled,
}

impl fmt::Display for DiscoveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DiscoveryState::Running => "running",
            DiscoveryState::Satisfied => "satisfied",
            DiscoveryState::Exhausted => "exhausted",
            DiscoveryState::Stalled => "stalled",
        };
        f.write_str(s)
    }
}

/// Insertion-ordered, URL-keyed set that only grows.
#[derive(Debug, Default)]
pub struct AccumulatedSet {
    items: Vec<CandidateItem>,
    seen: HashSet<String>,
}

impl AccumulatedSet {
    /// Merge a batch, keeping the first-seen copy of each URL.
    ///
    /// Returns the number of items that were new.
    pub fn merge(&mut self, batch: Vec<CandidateItem>) -> usize {
        let before = self.items.len();
        for item in batch {
            if self.seen.insert(item.url.clone()) {
                self.items.push(item);
            }
        }
        self.items.len() - before
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[CandidateItem] {
        &self.items
    }

    pub fn into_items(self) -> Vec<CandidateItem> {
        self.items
    }
}

/// What a discovery run produced.
#[derive(Debug)]
pub struct Discovery {
    pub items: Vec<CandidateItem>,
    pub state: DiscoveryState,
    pub attempts_made: usize,
    /// Trigger actions performed, successful or not.
    pub triggers: usize,
}

/// Run the discovery loop against `source` until a terminal state.
///
/// Never fails: extraction errors count as an empty batch, trigger errors
/// count toward the consecutive-failure ceiling.
#[instrument(level = "info", skip_all, fields(target = limits.target_size, policy = ?limits.stall_policy))]
pub async fn discover<S: PageSource>(source: &mut S, limits: &DiscoveryLimits) -> Discovery {
    let mut state = SessionState::new(limits);
    let mut acc = AccumulatedSet::default();

    let initial = merge_snapshot(source, &mut acc).await;
    info!(
        found = initial,
        total = acc.len(),
        state = %state.status(acc.len()),
        "Initial listing extracted"
    );

    let outcome = loop {
        match state.status(acc.len()) {
            DiscoveryState::Running => {}
            terminal => break terminal,
        }

        state.triggers += 1;
        match source.trigger_more().await {
            Ok(()) => {
                debug!(attempt = state.attempts_made + 1, delay = ?limits.settle_delay, "Trigger succeeded; settling");
                sleep(limits.settle_delay).await;
                let added = merge_snapshot(source, &mut acc).await;
                state.record_success(added, limits.stall_policy);
                info!(
                    added,
                    total = acc.len(),
                    target = state.target_size,
                    attempts = state.attempts_made,
                    max_attempts = state.max_attempts,
                    "Loaded more items"
                );
            }
            Err(e) => {
                state.record_failure();
                warn!(
                    error = %e,
                    consecutive_failures = state.consecutive_failures,
                    max = state.max_consecutive_failures,
                    "Trigger failed"
                );
            }
        }
    };

    let mut items = acc.into_items();
    if limits.truncate {
        items.truncate(state.target_size);
    }

    info!(
        state = %outcome,
        count = items.len(),
        attempts = state.attempts_made,
        triggers = state.triggers,
        "Discovery finished"
    );

    Discovery {
        items,
        state: outcome,
        attempts_made: state.attempts_made,
        triggers: state.triggers,
    }
}

async fn merge_snapshot<S: PageSource>(source: &mut S, acc: &mut AccumulatedSet) -> usize {
    match source.snapshot().await {
        Ok(batch) => acc.merge(batch),
        Err(e) => {
            warn!(error = %e, kind = e.kind(), "Snapshot extraction failed; treating as empty");
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Replays fixed snapshot and trigger outcomes.
    struct ScriptedSource {
        snapshots: VecDeque<Vec<CandidateItem>>,
        triggers: VecDeque<bool>,
        trigger_calls: usize,
    }

    impl ScriptedSource {
        fn new(snapshots: Vec<Vec<CandidateItem>>, triggers: Vec<bool>) -> Self {
            Self {
                snapshots: snapshots.into(),
                triggers: triggers.into(),
                trigger_calls: 0,
            }
        }
    }

    impl PageSource for ScriptedSource {
        async fn snapshot(&mut self) -> Result<Vec<CandidateItem>, ScrapeError> {
            Ok(self.snapshots.pop_front().unwrap_or_default())
        }

        async fn trigger_more(&mut self) -> Result<(), ScrapeError> {
            self.trigger_calls += 1;
            match self.triggers.pop_front() {
                Some(true) => Ok(()),
                _ => Err(ScrapeError::Trigger("no load-more control".to_string())),
            }
        }
    }

    /// Yields `per_trigger` fresh items after each trigger, forever.
    struct GrowingSource {
        per_trigger: usize,
        next_id: usize,
        visible: Vec<CandidateItem>,
    }

    impl GrowingSource {
        fn new(initial: usize, per_trigger: usize) -> Self {
            let mut source = Self {
                per_trigger,
                next_id: 0,
                visible: Vec::new(),
            };
            source.grow(initial);
            source
        }

        fn grow(&mut self, n: usize) {
            for _ in 0..n {
                self.visible.push(item(self.next_id, "t"));
                self.next_id += 1;
            }
        }
    }

    impl PageSource for GrowingSource {
        async fn snapshot(&mut self) -> Result<Vec<CandidateItem>, ScrapeError> {
            Ok(self.visible.clone())
        }

        async fn trigger_more(&mut self) -> Result<(), ScrapeError> {
            let n = self.per_trigger;
            self.grow(n);
            Ok(())
        }
    }

    fn item(id: usize, title: &str) -> CandidateItem {
        CandidateItem::new(format!("https://mil.example.com/{id}"), title)
    }

    fn limits(target: usize, max_attempts: usize, max_failures: usize) -> DiscoveryLimits {
        DiscoveryLimits {
            target_size: target,
            max_attempts,
            max_consecutive_failures: max_failures,
            settle_delay: Duration::ZERO,
            truncate: true,
            stall_policy: StallPolicy::TriggerOnly,
        }
    }

    #[test]
    fn test_merge_keeps_first_seen_title() {
        let mut acc = AccumulatedSet::default();
        assert_eq!(acc.merge(vec![item(1, "first")]), 1);
        assert_eq!(acc.merge(vec![item(1, "second")]), 0);
        assert_eq!(acc.len(), 1);
        assert_eq!(acc.items()[0].title, "first");
    }

    #[test]
    fn test_merge_dedups_within_a_batch() {
        let mut acc = AccumulatedSet::default();
        let added = acc.merge(vec![item(1, "a"), item(2, "b"), item(1, "c")]);
        assert_eq!(added, 2);
        let urls: Vec<&str> = acc.items().iter().map(|i| i.url.as_str()).collect();
        assert_eq!(urls, vec!["https://mil.example.com/1", "https://mil.example.com/2"]);
    }

    #[test]
    fn test_merge_size_never_decreases() {
        // deterministic pseudo-random batches with heavy overlap
        let mut acc = AccumulatedSet::default();
        let mut seed: u64 = 0x5eed;
        let mut last = 0;
        for _ in 0..200 {
            let mut batch = Vec::new();
            for _ in 0..(seed % 7) {
                seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                batch.push(item((seed >> 33) as usize % 40, "x"));
            }
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
            acc.merge(batch);
            assert!(acc.len() >= last);
            last = acc.len();
        }
        assert!(acc.len() <= 40);
    }

    #[test]
    fn test_status_order() {
        let mut state = SessionState::new(&limits(5, 2, 2));
        assert_eq!(state.status(0), DiscoveryState::Running);
        assert_eq!(state.trigger_ceiling(), 4);

        state.consecutive_failures = 2;
        state.attempts_made = 2;
        assert_eq!(state.status(4), DiscoveryState::Stalled);
        assert_eq!(state.status(5), DiscoveryState::Satisfied);

        state.consecutive_failures = 0;
        assert_eq!(state.status(4), DiscoveryState::Exhausted);

        state.attempts_made = 1;
        state.triggers = 4;
        assert_eq!(state.status(4), DiscoveryState::Exhausted);
    }

    #[tokio::test]
    async fn test_satisfied_after_one_trigger() {
        let first = vec![item(1, "a"), item(2, "b"), item(3, "c")];
        let mut second = first.clone();
        second.push(item(4, "d"));
        second.push(item(5, "e"));
        let mut source = ScriptedSource::new(vec![first, second], vec![true]);

        let result = discover(&mut source, &limits(5, 10, 3)).await;

        assert_eq!(result.state, DiscoveryState::Satisfied);
        let ids: Vec<&str> = result.items.iter().map(|i| i.url.as_str()).collect();
        assert_eq!(
            ids,
            (1..=5)
                .map(|i| format!("https://mil.example.com/{i}"))
                .collect::<Vec<_>>()
        );
        assert_eq!(result.attempts_made, 1);
        assert_eq!(source.trigger_calls, 1);
    }

    #[tokio::test]
    async fn test_stalled_with_nothing_found_returns_empty() {
        let mut source = ScriptedSource::new(vec![], vec![false, false, false, false]);

        let result = discover(&mut source, &limits(5, 10, 3)).await;

        assert_eq!(result.state, DiscoveryState::Stalled);
        assert!(result.items.is_empty());
        assert_eq!(source.trigger_calls, 3);
    }

    #[tokio::test]
    async fn test_exhausted_when_attempts_spent() {
        let mut source = GrowingSource::new(1, 1);

        let result = discover(&mut source, &limits(100, 3, 5)).await;

        assert_eq!(result.state, DiscoveryState::Exhausted);
        assert_eq!(result.attempts_made, 3);
        assert_eq!(result.items.len(), 4);
    }

    #[tokio::test]
    async fn test_satisfied_exactly_n_when_truncating() {
        let mut source = GrowingSource::new(3, 3);

        let result = discover(&mut source, &limits(10, 50, 3)).await;

        assert_eq!(result.state, DiscoveryState::Satisfied);
        assert_eq!(result.items.len(), 10);
    }

    #[tokio::test]
    async fn test_satisfied_at_least_n_without_truncation() {
        let mut source = GrowingSource::new(3, 3);
        let mut l = limits(10, 50, 3);
        l.truncate = false;

        let result = discover(&mut source, &l).await;

        assert_eq!(result.state, DiscoveryState::Satisfied);
        assert_eq!(result.items.len(), 12);
    }

    #[tokio::test]
    async fn test_empty_yield_not_a_failure_under_trigger_only() {
        let same = vec![item(1, "a")];
        let mut source = ScriptedSource::new(
            vec![same.clone(), same.clone(), same.clone(), same.clone()],
            vec![true, true, true],
        );

        let result = discover(&mut source, &limits(5, 3, 1)).await;

        assert_eq!(result.state, DiscoveryState::Exhausted);
        assert_eq!(result.attempts_made, 3);
        assert_eq!(result.items.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_yield_stalls_under_count_empty_yield() {
        let same = vec![item(1, "a")];
        let mut source = ScriptedSource::new(
            vec![same.clone(), same.clone(), same.clone()],
            vec![true, true, true],
        );
        let mut l = limits(5, 10, 1);
        l.stall_policy = StallPolicy::CountEmptyYield;

        let result = discover(&mut source, &l).await;

        assert_eq!(result.state, DiscoveryState::Stalled);
        assert_eq!(source.trigger_calls, 1);
        assert_eq!(result.items.len(), 1);
    }

    #[tokio::test]
    async fn test_failure_counter_resets_on_success() {
        let mut source = ScriptedSource::new(
            vec![vec![item(1, "a")], vec![item(2, "b")], vec![item(3, "c")]],
            vec![false, true, false, true, false, false],
        );

        let result = discover(&mut source, &limits(10, 10, 2)).await;

        assert_eq!(result.state, DiscoveryState::Stalled);
        assert_eq!(result.items.len(), 3);
        assert_eq!(result.attempts_made, 2);
        assert_eq!(source.trigger_calls, 6);
    }

    #[tokio::test]
    async fn test_alternating_source_stays_within_trigger_ceiling() {
        let max_attempts = 4;
        let max_failures = 3;
        let pattern: Vec<bool> = (0..100).map(|i| i % 3 == 2).collect();
        let mut source = ScriptedSource::new(vec![], pattern);

        let result = discover(&mut source, &limits(1000, max_attempts, max_failures)).await;

        assert!(source.trigger_calls <= max_attempts + max_failures);
        assert_eq!(result.triggers, source.trigger_calls);
        assert_ne!(result.state, DiscoveryState::Satisfied);
    }

    #[tokio::test]
    async fn test_snapshot_error_counts_as_empty_batch() {
        struct Broken;
        impl PageSource for Broken {
            async fn snapshot(&mut self) -> Result<Vec<CandidateItem>, ScrapeError> {
                Err(ScrapeError::Parse("no listing container".to_string()))
            }
            async fn trigger_more(&mut self) -> Result<(), ScrapeError> {
                Ok(())
            }
        }

        let result = discover(&mut Broken, &limits(3, 2, 2)).await;

        assert_eq!(result.state, DiscoveryState::Exhausted);
        assert!(result.items.is_empty());
    }

    #[tokio::test]
    async fn test_zero_target_is_immediately_satisfied() {
        let mut source = ScriptedSource::new(vec![vec![item(1, "a")]], vec![]);

        let result = discover(&mut source, &limits(0, 5, 5)).await;

        assert_eq!(result.state, DiscoveryState::Satisfied);
        assert!(result.items.is_empty());
        assert_eq!(source.trigger_calls, 0);
    }
}
