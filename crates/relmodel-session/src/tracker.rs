//! Statement tracking and repeated association load detection.
//!
//! When `track_statements` is enabled every statement the engine issues is
//! recorded, which is what tests use to check how many round trips an
//! operation made (one secondary query per preloaded relation, for instance).
//!
//! Independently of that log, association loads made one owner at a time are
//! counted per `(entity, relation)`. Reaching the threshold emits a warning,
//! since loading a relation for N owners in a loop costs N queries where a
//! preload costs one.
//!
//! ```ignore
//! for user in &users {
//!     db.association(user, "addresses")?.find::<Address>()?; // warns on the 3rd
//! }
//! // batch instead:
//! db.model::<User>().preload("addresses").find()?;
//! ```

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Call sites kept per `(entity, relation)`.
const MAX_CALL_SITES: usize = 5;

/// One executed statement.
#[derive(Debug, Clone)]
pub struct TrackedStatement {
    /// SQL as sent to the driver.
    pub sql: String,
    /// Number of bound parameters.
    pub params: usize,
    /// Rows returned (queries) or affected (writes).
    pub rows: u64,
    /// Wall time.
    pub elapsed: Duration,
}

/// Where an association load was triggered.
#[derive(Debug, Clone)]
pub struct CallSite {
    /// Owner entity name.
    pub entity: &'static str,
    /// Relation name.
    pub relation: &'static str,
    /// Source file of the caller.
    pub file: &'static str,
    /// Line in the source file.
    pub line: u32,
    /// When the load happened.
    pub at: Instant,
}

/// Load statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadStats {
    /// Total association loads recorded.
    pub total_loads: usize,
    /// Distinct `(entity, relation)` pairs loaded.
    pub relations_loaded: usize,
    /// Pairs whose load count reached the threshold.
    pub repeated: usize,
}

/// Statement log plus per-relation load counters.
#[derive(Debug, Clone)]
pub struct StatementTracker {
    statements: Vec<TrackedStatement>,
    recording: bool,
    loads: HashMap<(&'static str, &'static str), usize>,
    threshold: usize,
    call_sites: Vec<CallSite>,
}

impl Default for StatementTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StatementTracker {
    /// Tracker with a load threshold of 3.
    pub fn new() -> Self {
        Self {
            statements: Vec::new(),
            recording: true,
            loads: HashMap::new(),
            threshold: 3,
            call_sites: Vec::new(),
        }
    }

    /// Set the repeated-load threshold.
    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold;
        self
    }

    /// Current threshold.
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Stop or resume recording statements.
    pub fn set_recording(&mut self, recording: bool) {
        self.recording = recording;
    }

    /// Record an executed statement.
    pub fn record_statement(&mut self, sql: &str, params: usize, rows: u64, elapsed: Duration) {
        if !self.recording {
            return;
        }
        self.statements.push(TrackedStatement {
            sql: sql.to_string(),
            params,
            rows,
            elapsed,
        });
    }

    /// Recorded statements, oldest first.
    pub fn statements(&self) -> &[TrackedStatement] {
        &self.statements
    }

    /// Number of recorded statements whose SQL starts with `prefix`
    /// (case-insensitive), e.g. `"SELECT"`.
    pub fn count_starting_with(&self, prefix: &str) -> usize {
        let prefix = prefix.to_ascii_uppercase();
        self.statements
            .iter()
            .filter(|s| s.sql.trim_start().to_ascii_uppercase().starts_with(&prefix))
            .count()
    }

    /// Record one association load for `(entity, relation)`.
    #[track_caller]
    pub fn record_load(&mut self, entity: &'static str, relation: &'static str) {
        let count = {
            let slot = self.loads.entry((entity, relation)).or_insert(0);
            *slot += 1;
            *slot
        };
        if count <= MAX_CALL_SITES {
            let caller = std::panic::Location::caller();
            self.call_sites.push(CallSite {
                entity,
                relation,
                file: caller.file(),
                line: caller.line(),
                at: Instant::now(),
            });
        }
        if count == self.threshold {
            self.emit_warning(entity, relation, count);
        }
    }

    fn emit_warning(&self, entity: &'static str, relation: &'static str, count: usize) {
        tracing::warn!(
            target: "relmodel::n1",
            entity,
            relation,
            loads = count,
            threshold = self.threshold,
            "Relation loaded once per owner; preload it instead"
        );
        for (i, site) in self
            .call_sites
            .iter()
            .filter(|s| s.entity == entity && s.relation == relation)
            .take(MAX_CALL_SITES)
            .enumerate()
        {
            tracing::debug!(
                target: "relmodel::n1",
                index = i,
                file = site.file,
                line = site.line,
                "Load call site"
            );
        }
    }

    /// Loads recorded for `(entity, relation)`.
    pub fn load_count(&self, entity: &str, relation: &str) -> usize {
        self.loads
            .iter()
            .find(|((e, r), _)| *e == entity && *r == relation)
            .map_or(0, |(_, n)| *n)
    }

    /// Load statistics.
    pub fn stats(&self) -> LoadStats {
        LoadStats {
            total_loads: self.loads.values().sum(),
            relations_loaded: self.loads.len(),
            repeated: self.loads.values().filter(|n| **n >= self.threshold).count(),
        }
    }

    /// Recorded call sites: the first few loads of each relation.
    pub fn call_sites(&self) -> &[CallSite] {
        &self.call_sites
    }

    /// Forget all statements, counters and call sites.
    pub fn reset(&mut self) {
        self.statements.clear();
        self.loads.clear();
        self.call_sites.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_statements() {
        let mut tracker = StatementTracker::new();
        tracker.record_statement("SELECT 1", 0, 1, Duration::from_millis(1));
        tracker.record_statement("insert into t values (?1)", 1, 1, Duration::ZERO);
        tracker.record_statement("  SELECT * FROM t", 0, 3, Duration::ZERO);
        assert_eq!(tracker.statements().len(), 3);
        assert_eq!(tracker.count_starting_with("select"), 2);
        assert_eq!(tracker.count_starting_with("INSERT"), 1);
    }

    #[test]
    fn test_recording_can_pause() {
        let mut tracker = StatementTracker::new();
        tracker.set_recording(false);
        tracker.record_statement("SELECT 1", 0, 1, Duration::ZERO);
        assert!(tracker.statements().is_empty());
        tracker.set_recording(true);
        tracker.record_statement("SELECT 1", 0, 1, Duration::ZERO);
        assert_eq!(tracker.statements().len(), 1);
    }

    #[test]
    fn test_load_counts_per_relation() {
        let mut tracker = StatementTracker::new().with_threshold(10);
        tracker.record_load("User", "addresses");
        tracker.record_load("User", "addresses");
        tracker.record_load("User", "wallet");
        assert_eq!(tracker.load_count("User", "addresses"), 2);
        assert_eq!(tracker.load_count("User", "wallet"), 1);
        assert_eq!(tracker.load_count("Address", "user"), 0);
    }

    #[test]
    fn test_stats_repeated() {
        let mut tracker = StatementTracker::new().with_threshold(2);
        tracker.record_load("User", "addresses");
        tracker.record_load("User", "addresses");
        tracker.record_load("User", "wallet");
        let stats = tracker.stats();
        assert_eq!(stats.total_loads, 3);
        assert_eq!(stats.relations_loaded, 2);
        assert_eq!(stats.repeated, 1);
    }

    #[test]
    fn test_call_site_points_here() {
        let mut tracker = StatementTracker::new();
        tracker.record_load("User", "addresses");
        let site = &tracker.call_sites()[0];
        assert!(site.file.ends_with("tracker.rs"));
        assert!(site.line > 0);
    }

    #[test]
    fn test_call_sites_are_bounded_per_relation() {
        let mut tracker = StatementTracker::new();
        tracker.set_recording(false);
        for _ in 0..1000 {
            tracker.record_load("User", "addresses");
        }
        tracker.record_load("User", "wallet");
        assert_eq!(tracker.load_count("User", "addresses"), 1000);
        assert_eq!(tracker.call_sites().len(), MAX_CALL_SITES + 1);
        assert_eq!(
            tracker
                .call_sites()
                .iter()
                .filter(|s| s.relation == "wallet")
                .count(),
            1
        );
    }

    #[test]
    fn test_reset() {
        let mut tracker = StatementTracker::new();
        tracker.record_statement("SELECT 1", 0, 1, Duration::ZERO);
        tracker.record_load("User", "addresses");
        tracker.reset();
        assert!(tracker.statements().is_empty());
        assert_eq!(tracker.load_count("User", "addresses"), 0);
        assert!(tracker.call_sites().is_empty());
    }
}
