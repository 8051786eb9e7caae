use std::sync::Arc;

use ragged_rs::array::{LayoutArena, LayoutNode};
use ragged_rs::backend::ReduceKind;
use ragged_rs::ops::{reduce, value_equal};
use ragged_rs::{ArrayView, Buffer, Error, MissingPolicy, ReduceOptions};

fn setup() {
    ragged_rs_backend_ref_cpu::register_host_backend();
}

/// `[[1, 2], [3]]` as a view, plus a two-deep variant for flattening tests.
fn two_deep() -> ArrayView {
    // [[[1, 2], [3, 4]], [[5]]]
    let mut arena = LayoutArena::new();
    let flat = arena.push(LayoutNode::Flat {
        values: Buffer::from_vec(vec![1.0f64, 2.0, 3.0, 4.0, 5.0]),
    });
    let inner = arena.push(LayoutNode::ListOffset {
        offsets: Buffer::from_vec(vec![0i64, 2, 4, 5]),
        content: flat,
    });
    let outer = arena.push(LayoutNode::ListOffset {
        offsets: Buffer::from_vec(vec![0i64, 2, 3]),
        content: inner,
    });
    ArrayView::from_arena(Arc::new(arena), outer)
}

#[test]
fn sum_skips_missing_by_default() {
    setup();
    let view = ArrayView::option_f64(&[Some(1.0), None, Some(3.0)]);
    let total = reduce(&view, ReduceKind::Sum, ReduceOptions::default()).unwrap();
    assert!(value_equal(&total, &ArrayView::from_f64(vec![4.0])));
}

#[test]
fn count_reports_present_elements() {
    setup();
    let view = ArrayView::option_f64(&[Some(1.0), None, Some(3.0)]);
    let count = reduce(&view, ReduceKind::Count, ReduceOptions::default()).unwrap();
    assert!(value_equal(&count, &ArrayView::from_i64(vec![2])));
}

#[test]
fn propagate_makes_the_result_missing() {
    setup();
    let view = ArrayView::option_f64(&[Some(1.0), None, Some(3.0)]);
    let options = ReduceOptions {
        missing: MissingPolicy::Propagate,
        ..Default::default()
    };
    let total = reduce(&view, ReduceKind::Sum, options).unwrap();
    assert!(value_equal(&total, &ArrayView::option_f64(&[None])));
}

#[test]
fn sum_folds_each_sublist() {
    setup();
    let view = ArrayView::list_of_f64(&[vec![1.0, 2.0], vec![3.0]]);
    let sums = reduce(&view, ReduceKind::Sum, ReduceOptions::default()).unwrap();
    assert!(value_equal(&sums, &ArrayView::from_f64(vec![3.0, 3.0])));
}

#[test]
fn sum_of_an_empty_sublist_is_zero() {
    setup();
    let view = ArrayView::list_of_f64(&[vec![1.0, 2.0], vec![]]);
    let sums = reduce(&view, ReduceKind::Sum, ReduceOptions::default()).unwrap();
    assert!(value_equal(&sums, &ArrayView::from_f64(vec![3.0, 0.0])));
}

#[test]
fn min_of_an_empty_sublist_is_missing() {
    setup();
    let view = ArrayView::list_of_f64(&[vec![5.0, 1.0], vec![]]);
    let mins = reduce(&view, ReduceKind::Min, ReduceOptions::default()).unwrap();
    assert!(value_equal(&mins, &ArrayView::option_f64(&[Some(1.0), None])));
}

#[test]
fn missing_entries_inside_sublists_follow_the_policy() {
    setup();
    let view = ArrayView::list_of_option_f64(&[
        vec![Some(1.0), None],
        vec![Some(2.0), Some(3.0)],
    ]);
    let skipped = reduce(&view, ReduceKind::Sum, ReduceOptions::default()).unwrap();
    assert!(value_equal(&skipped, &ArrayView::from_f64(vec![1.0, 5.0])));

    let options = ReduceOptions {
        missing: MissingPolicy::Propagate,
        ..Default::default()
    };
    let propagated = reduce(&view, ReduceKind::Sum, options).unwrap();
    assert!(value_equal(
        &propagated,
        &ArrayView::option_f64(&[None, Some(5.0)])
    ));
}

#[test]
fn reduce_folds_only_the_innermost_dimension() {
    setup();
    let folded = reduce(&two_deep(), ReduceKind::Sum, ReduceOptions::default()).unwrap();
    let expected = ArrayView::list_of_f64(&[vec![3.0, 7.0], vec![5.0]]);
    assert!(value_equal(&folded, &expected));
}

#[test]
fn flatten_option_folds_to_a_single_value() {
    setup();
    let options = ReduceOptions {
        flatten: true,
        ..Default::default()
    };
    let folded = reduce(&two_deep(), ReduceKind::Sum, options).unwrap();
    assert!(value_equal(&folded, &ArrayView::from_f64(vec![15.0])));
}

#[test]
fn max_keeps_the_input_dtype() {
    setup();
    let view = ArrayView::from_i64(vec![3, 9, 1]);
    let max = reduce(&view, ReduceKind::Max, ReduceOptions::default()).unwrap();
    assert!(value_equal(&max, &ArrayView::from_i64(vec![9])));
}

#[test]
fn records_do_not_reduce() {
    setup();
    let record = ragged_rs::ops::zip(&[("x", ArrayView::from_f64(vec![1.0]))]).unwrap();
    assert!(matches!(
        reduce(&record, ReduceKind::Sum, ReduceOptions::default()),
        Err(Error::Type { .. })
    ));
}

#[test]
fn reduce_respects_a_sliced_window() {
    setup();
    let view = ArrayView::list_of_f64(&[vec![1.0], vec![2.0, 3.0], vec![4.0]]);
    let sliced = view.slice(1..3).unwrap();
    let sums = reduce(&sliced, ReduceKind::Sum, ReduceOptions::default()).unwrap();
    assert!(value_equal(&sums, &ArrayView::from_f64(vec![5.0, 4.0])));
}
