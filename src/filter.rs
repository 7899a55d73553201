//! Admission filter
//!
//! Stateful gate between the record parser and the dispatch queue. Rules run
//! in a fixed order and each rejection increments exactly one counter:
//!
//! 1. empty entity
//! 2. duplicate `(category, entity, source_context)` within the current
//!    burst group (records sharing one timestamp)
//! 3. category not in the configured allow-set
//! 4. confidence below the fixed floor
//! 5. entity token count below the minimum, unless an override applies
//!
//! The dedup state is the only mutable piece; it sits behind its own mutex
//! which is held for rule 2 only, never across rules 3-5.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::FilterConfig;
use crate::metrics::PipelineMetrics;
use crate::record::Record;

/// Fixed confidence floor for rule 4
///
/// Deliberately not configurable: boundary inclusive, `0.5` is admitted and
/// `0.49` is not.
pub const CONFIDENCE_FLOOR: f64 = 0.5;

/// All-uppercase entities up to this length pass the token gate
const UPPERCASE_MAX_LEN: usize = 6;

/// Dedup state for the single active burst group
#[derive(Debug, Default)]
struct BurstGroup {
    /// Timestamp of the group currently being tracked
    timestamp: Option<String>,

    /// Keys already admitted or seen in this group
    seen: HashSet<(String, String, String)>,
}

/// Stateful admission gate
///
/// One instance per pipeline; `accept` is safe to call concurrently, though
/// the watcher is the only producer in practice.
#[derive(Debug)]
pub struct AdmissionFilter {
    config: FilterConfig,
    group: Mutex<BurstGroup>,
    metrics: Arc<PipelineMetrics>,
}

impl AdmissionFilter {
    /// Create a filter with the given rules
    pub fn new(config: FilterConfig, metrics: Arc<PipelineMetrics>) -> Self {
        Self {
            config,
            group: Mutex::new(BurstGroup::default()),
            metrics,
        }
    }

    /// Decide whether a record becomes a task
    ///
    /// Increments exactly one rejection counter on `false`, or the admitted
    /// counter on `true`.
    pub fn accept(&self, record: &Record) -> bool {
        if record.entity.is_empty() {
            self.metrics.record_rejected_empty_entity();
            return false;
        }

        if self.config.dedup_within_group && !self.check_and_mark(record) {
            self.metrics.record_rejected_duplicate();
            return false;
        }

        if !self.config.allowed_categories.contains(&record.category) {
            self.metrics.record_rejected_category();
            return false;
        }

        if record.confidence < CONFIDENCE_FLOOR {
            self.metrics.record_rejected_confidence();
            return false;
        }

        if !self.passes_token_gate(record) {
            self.metrics.record_rejected_tokens();
            return false;
        }

        self.metrics.record_admitted();
        true
    }

    /// Clear the burst-group state (called on source file rotation)
    pub fn reset_group(&self) {
        let mut group = self.group.lock();
        group.timestamp = None;
        group.seen.clear();
    }

    /// Rule 2: returns false if the record is a duplicate in the current
    /// group. A new timestamp starts a fresh group. The key is marked on
    /// first sight even if a later rule rejects the record, matching the
    /// upstream source's burst semantics.
    fn check_and_mark(&self, record: &Record) -> bool {
        let mut group = self.group.lock();

        if group.timestamp.as_deref() != Some(record.timestamp.as_str()) {
            group.timestamp = Some(record.timestamp.clone());
            group.seen.clear();
        }

        let key = (
            record.category.clone(),
            record.entity.clone(),
            record.source_context.clone(),
        );
        group.seen.insert(key)
    }

    /// Rule 5: token-count gate with short-term overrides
    fn passes_token_gate(&self, record: &Record) -> bool {
        let tokens = record
            .entity
            .split(['-', '/', ' ', '\t'])
            .filter(|t| !t.is_empty())
            .count();
        if tokens >= self.config.min_term_tokens {
            return true;
        }

        let entity = record.entity.as_str();
        record.confidence >= self.config.one_token_confidence_override
            || (is_all_uppercase(entity) && entity.chars().count() <= UPPERCASE_MAX_LEN)
            || entity.chars().count() <= self.config.acronym_max_len
    }
}

/// True when every cased character is uppercase and at least one exists
fn is_all_uppercase(s: &str) -> bool {
    let mut has_alpha = false;
    for ch in s.chars() {
        if ch.is_lowercase() {
            return false;
        }
        if ch.is_alphabetic() {
            has_alpha = true;
        }
    }
    has_alpha
}

#[cfg(test)]
#[path = "filter_test.rs"]
mod filter_test;
