//! Property-based tests for the session state machines
//!
//! These cover the invariants that must hold for any input sequence:
//! accepted progress is strictly increasing, ids are never handed out twice,
//! and every pending request resolves exactly once.

use proptest::prelude::*;
use serde_json::json;
use tokio::sync::mpsc;

use tandem_protocol::{LogLevel, RequestId};
use tandem_session::{
    CorrelationTable, LoggingFilter, ProgressCoordinator, ProgressDisposition,
};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// The observer sees exactly the running-maximum subsequence of reports
    #[test]
    fn prop_progress_strictly_increasing(values in prop::collection::vec(0.0f64..1000.0, 0..64)) {
        let coordinator = ProgressCoordinator::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let token = coordinator.attach_token(RequestId::Number(1), Some(tx));

        let mut expected = Vec::new();
        let mut last: Option<f64> = None;
        for value in &values {
            let disposition = coordinator.on_progress(&token, *value, None, None);
            if last.is_none_or(|last| *value > last) {
                prop_assert_eq!(disposition, ProgressDisposition::Accepted);
                expected.push(*value);
                last = Some(*value);
            } else {
                prop_assert_eq!(disposition, ProgressDisposition::NotIncreasing);
            }
        }

        let mut observed = Vec::new();
        while let Ok(update) = rx.try_recv() {
            observed.push(update.progress);
        }
        prop_assert!(observed.windows(2).all(|pair| pair[0] < pair[1]));
        prop_assert_eq!(observed, expected);
        prop_assert_eq!(
            coordinator.dropped_reports() as usize,
            values.len() - coordinator_accepted(&values)
        );
    }

    /// Reports after the owning request resolved are always dropped
    #[test]
    fn prop_progress_after_detach_dropped(values in prop::collection::vec(0.0f64..1000.0, 1..16)) {
        let coordinator = ProgressCoordinator::new();
        let token = coordinator.attach_token(RequestId::Number(1), None);
        coordinator.detach(&RequestId::Number(1));
        for value in values {
            prop_assert_eq!(
                coordinator.on_progress(&token, value, None, None),
                ProgressDisposition::UnknownToken
            );
        }
    }

    /// Allocated ids are distinct and each resolves exactly once
    #[test]
    fn prop_each_id_resolves_once(count in 1usize..200, repeats in 1usize..4) {
        let table = CorrelationTable::new();
        let handles: Vec<_> = (0..count)
            .map(|_| table.register("m", None).unwrap())
            .collect();

        let mut ids: Vec<RequestId> = handles.iter().map(|h| h.id().clone()).collect();
        ids.sort();
        ids.dedup();
        prop_assert_eq!(ids.len(), count);

        for id in &ids {
            prop_assert!(table.resolve(id, Ok(json!(id.to_string()))));
            for _ in 0..repeats {
                prop_assert!(!table.resolve(id, Ok(json!(null))));
            }
        }
        prop_assert!(table.is_empty());

        for handle in handles {
            let expected = json!(handle.id().to_string());
            let outcome = tokio_test::block_on(handle.wait()).unwrap();
            prop_assert_eq!(outcome, expected);
        }
    }

    /// `should_emit` is exactly `level >= threshold`
    #[test]
    fn prop_filter_matches_ordering(threshold in 0u8..8, level in 0u8..8) {
        let threshold = LogLevel::from_rank(threshold).unwrap();
        let level = LogLevel::from_rank(level).unwrap();
        let filter = LoggingFilter::new(threshold);
        prop_assert_eq!(filter.should_emit(level), level >= threshold);
    }
}

fn coordinator_accepted(values: &[f64]) -> usize {
    let mut last: Option<f64> = None;
    values
        .iter()
        .filter(|value| {
            let accepted = last.is_none_or(|last| **value > last);
            if accepted {
                last = Some(**value);
            }
            accepted
        })
        .count()
}

#[test]
fn warning_threshold_blocks_info_allows_error() {
    let filter = LoggingFilter::default();
    filter.set_threshold(LogLevel::Warning);
    for _ in 0..10 {
        assert!(!filter.should_emit(LogLevel::Info));
        assert!(filter.should_emit(LogLevel::Error));
    }
}
