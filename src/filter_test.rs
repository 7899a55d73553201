use std::sync::Arc;

use super::*;
use crate::config::FilterConfig;

fn filter() -> (AdmissionFilter, Arc<PipelineMetrics>) {
    let metrics = Arc::new(PipelineMetrics::new());
    (
        AdmissionFilter::new(FilterConfig::default(), Arc::clone(&metrics)),
        metrics,
    )
}

fn record(timestamp: &str, category: &str, entity: &str, confidence: f64, context: &str) -> Record {
    Record {
        timestamp: timestamp.into(),
        category: category.into(),
        entity: entity.into(),
        confidence,
        source_context: context.into(),
    }
}

#[test]
fn test_accepts_valid_record() {
    let (filter, metrics) = filter();
    assert!(filter.accept(&record("t1", "Product", "MES alarm", 0.95, "ctx")));
    assert_eq!(metrics.snapshot().records_admitted, 1);
}

#[test]
fn test_rejects_empty_entity() {
    let (filter, metrics) = filter();
    assert!(!filter.accept(&record("t1", "Product", "", 0.95, "ctx")));
    assert_eq!(metrics.snapshot().rejected_empty_entity, 1);
}

#[test]
fn test_dedup_within_burst_group() {
    let (filter, metrics) = filter();
    let r = record("t1", "Product", "MES alarm", 0.95, "ctx");

    assert!(filter.accept(&r));
    assert!(!filter.accept(&r));
    assert!(!filter.accept(&r));

    let s = metrics.snapshot();
    assert_eq!(s.records_admitted, 1);
    assert_eq!(s.rejected_duplicate, 2);
}

#[test]
fn test_new_timestamp_resets_dedup() {
    let (filter, _) = filter();

    assert!(filter.accept(&record("t1", "Product", "MES alarm", 0.95, "ctx")));
    assert!(!filter.accept(&record("t1", "Product", "MES alarm", 0.95, "ctx")));

    // Same key under a new timestamp is admitted again
    assert!(filter.accept(&record("t2", "Product", "MES alarm", 0.95, "ctx")));
}

#[test]
fn test_reset_group_clears_state() {
    let (filter, _) = filter();

    assert!(filter.accept(&record("t1", "Product", "MES alarm", 0.95, "ctx")));
    filter.reset_group();
    assert!(filter.accept(&record("t1", "Product", "MES alarm", 0.95, "ctx")));
}

#[test]
fn test_distinct_context_not_duplicate() {
    let (filter, _) = filter();

    assert!(filter.accept(&record("t1", "Product", "MES alarm", 0.95, "ctx a")));
    assert!(filter.accept(&record("t1", "Product", "MES alarm", 0.95, "ctx b")));
}

#[test]
fn test_rejects_disallowed_category() {
    let (filter, metrics) = filter();
    assert!(!filter.accept(&record("t1", "Location", "Seoul Station", 0.95, "ctx")));
    assert_eq!(metrics.snapshot().rejected_category, 1);
}

#[test]
fn test_duplicate_counted_as_dup_even_when_category_rejected_first_time() {
    let (filter, metrics) = filter();
    let r = record("t1", "Location", "Seoul Station", 0.95, "ctx");

    // First sight marks the group key, then category rejects it
    assert!(!filter.accept(&r));
    assert!(!filter.accept(&r));

    let s = metrics.snapshot();
    assert_eq!(s.rejected_category, 1);
    assert_eq!(s.rejected_duplicate, 1);
}

#[test]
fn test_confidence_floor_boundary() {
    let (filter, metrics) = filter();

    assert!(!filter.accept(&record("t1", "Product", "MES alarm", 0.49, "a")));
    assert!(filter.accept(&record("t1", "Product", "MES alarm", 0.5, "b")));

    let s = metrics.snapshot();
    assert_eq!(s.rejected_confidence, 1);
    assert_eq!(s.records_admitted, 1);
}

#[test]
fn test_token_gate_rejects_single_low_confidence_token() {
    let (filter, metrics) = filter();
    assert!(!filter.accept(&record("t1", "Product", "middleware", 0.7, "ctx")));
    assert_eq!(metrics.snapshot().rejected_tokens, 1);
}

#[test]
fn test_token_gate_high_confidence_override() {
    let (filter, _) = filter();
    assert!(filter.accept(&record("t1", "Product", "middleware", 0.93, "ctx")));
}

#[test]
fn test_token_gate_uppercase_acronym() {
    let (filter, _) = filter();
    // Single token, below 0.92, but all-uppercase and short
    assert!(filter.accept(&record("t1", "Product", "SCADA", 0.8, "ctx")));
}

#[test]
fn test_token_gate_short_entity_allowance() {
    let (filter, _) = filter();
    // Single lowercase token of length <= 3
    assert!(filter.accept(&record("t1", "Product", "db", 0.8, "ctx")));
}

#[test]
fn test_token_gate_splits_on_hyphen_and_slash() {
    let (filter, _) = filter();
    assert!(filter.accept(&record("t1", "Product", "plc-gateway", 0.7, "a")));
    assert!(filter.accept(&record("t1", "Product", "tcp/ip stack", 0.7, "b")));
}

#[test]
fn test_dedup_disabled() {
    let metrics = Arc::new(PipelineMetrics::new());
    let config = FilterConfig {
        dedup_within_group: false,
        ..Default::default()
    };
    let filter = AdmissionFilter::new(config, Arc::clone(&metrics));

    let r = record("t1", "Product", "MES alarm", 0.95, "ctx");
    assert!(filter.accept(&r));
    assert!(filter.accept(&r));
    assert_eq!(metrics.snapshot().rejected_duplicate, 0);
}
