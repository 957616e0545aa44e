//! Property-based tests for explog-core.

use std::sync::Arc;

use arrow::array::{Float64Array, Int64Array, RecordBatch, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use explog_core::{
    AddMode, ExperimentLog, Nested, ResolveOptions, RowRange, Specifier, Value,
};
use proptest::prelude::*;

// ============================================================================
// Strategies
// ============================================================================

fn arb_batch(max_rows: usize) -> impl Strategy<Value = RecordBatch> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("step", DataType::Int64, true),
        Field::new("loss", DataType::Float64, true),
        Field::new("tag", DataType::Utf8, true),
    ]));
    (0..=max_rows).prop_flat_map(move |rows| {
        let schema = schema.clone();
        (
            proptest::collection::vec(any::<i64>(), rows),
            proptest::collection::vec(-1e6f64..1e6, rows),
            proptest::collection::vec("[a-z]{0,6}", rows),
        )
            .prop_map(move |(steps, losses, tags)| {
                RecordBatch::try_new(
                    schema.clone(),
                    vec![
                        Arc::new(Int64Array::from(steps)),
                        Arc::new(Float64Array::from(losses)),
                        Arc::new(StringArray::from(tags)),
                    ],
                )
                .unwrap()
            })
    })
}

fn arb_conf() -> impl Strategy<Value = Specifier> {
    (any::<i32>(), "[a-z \"'\\\\]{0,8}", any::<bool>()).prop_map(|(n, s, b)| {
        Specifier::fields([
            ("n", Value::from(n)),
            ("s", Value::from(s)),
            ("b", Value::from(b)),
        ])
    })
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Replace then select returns the data with index 0..len
    #[test]
    fn prop_replace_round_trip(batch in arb_batch(20)) {
        let mut log = ExperimentLog::in_memory();
        let assigned = log.add_data("t", batch.clone(), AddMode::Replace).unwrap();
        prop_assert_eq!(assigned, 0..batch.num_rows() as u64);

        let frame = log.select("t", &Specifier::All, RowRange::ALL, None).unwrap();
        let expected: Vec<u64> = (0..batch.num_rows() as u64).collect();
        prop_assert_eq!(frame.index(), expected.as_slice());
        for (got, want) in frame.batch().columns().iter().zip(batch.columns()) {
            prop_assert_eq!(got.to_data(), want.to_data());
        }
    }

    /// Appending continues the index after the existing rows
    #[test]
    fn prop_append_indices_are_monotonic(
        first in arb_batch(10),
        second in arb_batch(10),
    ) {
        let mut log = ExperimentLog::in_memory();
        let n = first.num_rows() as u64;
        let m = second.num_rows() as u64;
        log.add_data("t", first, AddMode::Replace).unwrap();
        let assigned = log.add_data("t", second, AddMode::Append).unwrap();
        prop_assert_eq!(assigned, n..n + m);

        let frame = log.select("t", &Specifier::All, RowRange::ALL, None).unwrap();
        prop_assert!(frame.index().windows(2).all(|w| w[0] < w[1]));
        prop_assert_eq!(frame.num_rows() as u64, n + m);
    }

    /// Find-or-create returns the same single row on repeated calls
    #[test]
    fn prop_find_or_create_is_deterministic(conf in arb_conf()) {
        let mut log = ExperimentLog::in_memory();
        let first = log.conf2idx("e", &conf, ResolveOptions::find_or_create()).unwrap();
        let second = log.conf2idx("e", &conf, ResolveOptions::find_or_create()).unwrap();
        prop_assert_eq!(&first.indices, &Nested::many_of([0]));
        prop_assert_eq!(&second.indices, &first.indices);
        prop_assert!(second.added.is_empty());
        prop_assert_eq!(log.num_rows("e").unwrap(), 1);
    }

    /// Reloading an image changes nothing observable
    #[test]
    fn prop_image_round_trip(batch in arb_batch(15)) {
        let mut log = ExperimentLog::in_memory();
        log.add_data("a/b", batch, AddMode::Append).unwrap();
        let copy = ExperimentLog::from_image(&log.image().unwrap()).unwrap();
        prop_assert_eq!(
            copy.select("a/b", &Specifier::All, RowRange::ALL, None).unwrap(),
            log.select("a/b", &Specifier::All, RowRange::ALL, None).unwrap()
        );
    }
}
