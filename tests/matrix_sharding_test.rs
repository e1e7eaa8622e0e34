mod common;

use proptest::prelude::*;
use simstore::{Error, MatrixReadPlan, RecordedData};

#[test]
fn matrix_round_trip_with_explicit_timestamps() {
    let mut store = common::store_with_segment();
    store.register_matrix_source("pop1", "v", 0, &common::voltage_spec(3)).unwrap();

    let timestamps = [0.0, 0.1, 0.2, 0.3];
    let rows: Vec<Vec<f64>> = (0..4).map(|k| vec![k as f64, -(k as f64), 0.5]).collect();
    let written = store
        .insert_matrix_with_timestamps("pop1", "v", 0, rows.clone(), &[10, 11, 12], Some(&timestamps))
        .unwrap();
    assert_eq!(written, 4);

    let data = store.get_matrix_data("pop1", "v", 0).unwrap();
    assert_eq!(data.ids, vec![10, 11, 12]);
    assert_eq!(data.timestamps, timestamps.to_vec());
    assert_eq!(data.shape(), (4, 3));
    assert_eq!(data.data, rows);
}

#[test]
fn matrix_round_trip_with_embedded_timestamps() {
    let mut store = common::store_with_segment();
    store.register_matrix_source("pop1", "v", 0, &common::voltage_spec(5)).unwrap();

    let ids = [3, 1, 4];
    store
        .insert_matrix_with_timestamps("pop1", "v", 0, common::embedded_rows(&ids, 3), &ids, None)
        .unwrap();

    let data = store.get_matrix_data("pop1", "v", 0).unwrap();
    // Column order is insert order, not sorted.
    assert_eq!(data.ids, vec![3, 1, 4]);
    assert_eq!(data.timestamps, vec![0.0, 1.0, 2.0]);
    assert_eq!(data.data[2], vec![common::cell(2, 3), common::cell(2, 1), common::cell(2, 4)]);
}

#[test]
fn unwritten_matrix_reads_empty() {
    let mut store = common::store_with_segment();
    store.register_matrix_source("pop1", "v", 0, &common::voltage_spec(5)).unwrap();

    let data = store.get_matrix_data("pop1", "v", 0).unwrap();
    assert!(data.is_empty());
    assert!(data.ids.is_empty());
    assert_eq!(store.matrix_read_plan("pop1", "v", 0).unwrap(), MatrixReadPlan::Empty);
}

#[test]
fn two_calls_of_2000_ids_read_back_4000_ids() {
    let mut store = common::store_with_segment();
    store.register_matrix_source("pop1", "v", 0, &common::voltage_spec(4000)).unwrap();

    let low: Vec<u32> = (0..2000).collect();
    let high: Vec<u32> = (2000..4000).collect();
    store
        .insert_matrix_with_timestamps("pop1", "v", 0, common::embedded_rows(&low, 3), &low, None)
        .unwrap();
    store
        .insert_matrix_with_timestamps("pop1", "v", 0, common::embedded_rows(&high, 3), &high, None)
        .unwrap();

    let descriptor = store.get_recording_descriptor("pop1", "v", 0).unwrap();
    assert_eq!(descriptor.data_table, None);
    assert_eq!(descriptor.n_ids, 4000);

    let plan = store.matrix_read_plan("pop1", "v", 0).unwrap();
    assert!(matches!(plan, MatrixReadPlan::ConcatenateShards(_)));
    let firsts: Vec<u32> = plan.shards().iter().map(|s| s.first_id).collect();
    assert_eq!(firsts, vec![0, 1990, 2000, 3990]);

    let data = store.get_matrix_data("pop1", "v", 0).unwrap();
    assert_eq!(data.ids.len(), 4000);
    assert_eq!(data.ids, (0..4000).collect::<Vec<u32>>());
    assert_eq!(data.shape(), (3, 4000));
    assert_eq!(data.data[1][3999], common::cell(1, 3999));
    assert_eq!(data.data[2][1990], common::cell(2, 1990));
}

#[test]
fn shards_within_ceiling_share_one_view() {
    let mut store = common::store_with_segment();
    store.register_matrix_source("pop1", "v", 0, &common::voltage_spec(30)).unwrap();

    for first in [0u32, 10, 20] {
        let ids: Vec<u32> = (first..first + 10).collect();
        store
            .insert_matrix_with_timestamps("pop1", "v", 0, common::embedded_rows(&ids, 2), &ids, None)
            .unwrap();
    }

    let descriptor = store.get_recording_descriptor("pop1", "v", 0).unwrap();
    assert_eq!(descriptor.n_ids, 30);
    let plan = store.matrix_read_plan("pop1", "v", 0).unwrap();
    match &plan {
        MatrixReadPlan::JoinedViews { view, shards } => {
            assert_eq!(descriptor.data_table.as_deref(), Some(view.as_str()));
            assert_eq!(shards.len(), 3);
        }
        other => panic!("expected joined views, got {other:?}"),
    }

    let RecordedData::Matrix(data) = store.get_data("pop1", "v", 0).unwrap() else {
        panic!("expected matrix data");
    };
    assert_eq!(data.ids, (0..30).collect::<Vec<u32>>());
}

#[test]
fn many_small_shards_fall_back_to_concatenation() {
    let mut store = common::store_with_segment();
    store.register_matrix_source("pop1", "v", 0, &common::voltage_spec(100)).unwrap();

    for id in 0..(simstore::MAX_JOINED_SHARDS as u32 + 1) {
        store
            .insert_matrix_with_timestamps("pop1", "v", 0, vec![vec![0.0, f64::from(id)]], &[id], None)
            .unwrap();
    }

    let descriptor = store.get_recording_descriptor("pop1", "v", 0).unwrap();
    assert_eq!(descriptor.data_table, None);
    let data = store.get_matrix_data("pop1", "v", 0).unwrap();
    assert_eq!(data.ids.len(), simstore::MAX_JOINED_SHARDS + 1);
    assert_eq!(data.data[0][5], 5.0);
}

#[test]
fn shard_id_list_is_fixed() {
    let mut store = common::store_with_segment();
    store.register_matrix_source("pop1", "v", 0, &common::voltage_spec(10)).unwrap();
    store
        .insert_matrix_with_timestamps("pop1", "v", 0, common::embedded_rows(&[0, 1, 2], 1), &[0, 1, 2], None)
        .unwrap();

    let err = store
        .insert_matrix_with_timestamps("pop1", "v", 0, common::embedded_rows(&[0, 2, 1], 1), &[0, 2, 1], None)
        .unwrap_err();
    assert!(matches!(err, Error::ShardIdMismatch { first_id: 0, .. }));
}

#[test]
fn row_width_must_match_ids() {
    let mut store = common::store_with_segment();
    store.register_matrix_source("pop1", "v", 0, &common::voltage_spec(10)).unwrap();

    let err = store
        .insert_matrix_with_timestamps("pop1", "v", 0, vec![vec![0.0, 1.0]], &[0, 1], None)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidData(_)));
    assert_eq!(store.matrix_read_plan("pop1", "v", 0).unwrap(), MatrixReadPlan::Empty);
}

#[test]
fn redelivered_matrix_rows_are_ignored() {
    let mut store = common::store_with_segment();
    store.register_matrix_source("pop1", "v", 0, &common::voltage_spec(2)).unwrap();

    let rows = common::embedded_rows(&[0, 1], 2);
    store.insert_matrix_with_timestamps("pop1", "v", 0, rows.clone(), &[0, 1], None).unwrap();
    store.insert_matrix_with_timestamps("pop1", "v", 0, rows, &[0, 1], None).unwrap();

    let data = store.get_matrix_data("pop1", "v", 0).unwrap();
    assert_eq!(data.shape(), (2, 2));
}

/// Splits `0..n` into contiguous chunks at `cuts`.
fn partition(n: u32, mut cuts: Vec<u32>) -> Vec<Vec<u32>> {
    cuts.retain(|c| *c > 0 && *c < n);
    cuts.sort_unstable();
    cuts.dedup();

    let mut chunks = Vec::new();
    let mut start = 0;
    for cut in cuts.into_iter().chain(std::iter::once(n)) {
        chunks.push((start..cut).collect());
        start = cut;
    }
    chunks
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn partitioning_does_not_change_reads(
        n in 1u32..24,
        cuts in proptest::collection::vec(0u32..24, 0..5),
        max_columns in 2usize..12,
    ) {
        let all: Vec<u32> = (0..n).collect();

        let mut reference = common::store_with_max_columns(max_columns);
        reference.register_matrix_source("pop1", "v", 0, &common::voltage_spec(n)).unwrap();
        reference
            .insert_matrix_with_timestamps("pop1", "v", 0, common::embedded_rows(&all, 3), &all, None)
            .unwrap();

        let mut split = common::store_with_max_columns(max_columns);
        split.register_matrix_source("pop1", "v", 0, &common::voltage_spec(n)).unwrap();
        for chunk in partition(n, cuts) {
            split
                .insert_matrix_with_timestamps("pop1", "v", 0, common::embedded_rows(&chunk, 3), &chunk, None)
                .unwrap();
        }

        let expected = reference.get_matrix_data("pop1", "v", 0).unwrap();
        let actual = split.get_matrix_data("pop1", "v", 0).unwrap();
        prop_assert_eq!(&expected.ids, &all);
        prop_assert_eq!(actual, expected);
        prop_assert_eq!(
            split.get_recording_descriptor("pop1", "v", 0).unwrap().n_ids,
            n as usize
        );
    }
}
