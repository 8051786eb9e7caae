use std::sync::Arc;

use ragged_rs::array::{LayoutArena, LayoutNode};
use ragged_rs::{ArrayElement, ArrayView, Buffer, Error, Scalar};

#[test]
fn slice_composes_with_parent_window() {
    let view = ArrayView::list_of_f64(&[vec![1.0, 2.0], vec![3.0], vec![4.0, 5.0]]);
    let sliced = view.slice(1..3).unwrap();
    assert_eq!(sliced.len(), 2);

    // Element 0 of the slice is element 1 of the parent.
    let inner = match sliced.get(0).unwrap() {
        ArrayElement::List(inner) => inner,
        other => panic!("expected a list element, got {other:?}"),
    };
    assert_eq!(inner.len(), 1);
    assert!(matches!(
        inner.get(0).unwrap(),
        ArrayElement::Scalar(Scalar::Float(v)) if v == 3.0
    ));

    // Slicing a slice keeps composing against the original buffers.
    let nested = sliced.slice(1..2).unwrap();
    let inner = match nested.get(0).unwrap() {
        ArrayElement::List(inner) => inner,
        other => panic!("expected a list element, got {other:?}"),
    };
    assert!(matches!(
        inner.get(1).unwrap(),
        ArrayElement::Scalar(Scalar::Float(v)) if v == 5.0
    ));
}

#[test]
fn empty_slice_preserves_type() {
    let view = ArrayView::list_of_f64(&[vec![1.0], vec![2.0]]);
    let empty = view.slice(1..1).unwrap();
    assert!(empty.is_empty());
    assert_eq!(empty.type_signature(), view.type_signature());
}

#[test]
fn out_of_bounds_slice_is_structural() {
    let view = ArrayView::from_f64(vec![1.0, 2.0]);
    let result = view.slice(1..5);
    assert!(matches!(result, Err(Error::Structural { .. })));
}

#[test]
fn get_past_the_end_is_an_error() {
    let view = ArrayView::from_f64(vec![1.0]);
    assert!(view.get(0).is_ok());
    assert!(matches!(view.get(1), Err(Error::Structural { .. })));
}

#[test]
fn missing_elements_resolve_to_missing() {
    let view = ArrayView::option_f64(&[Some(1.0), None, Some(3.0)]);
    assert!(matches!(view.get(0).unwrap(), ArrayElement::Scalar(_)));
    assert!(matches!(view.get(1).unwrap(), ArrayElement::Missing));
}

#[test]
fn validate_reports_decreasing_offsets_with_path() {
    let mut arena = LayoutArena::new();
    let content = arena.push(LayoutNode::Flat {
        values: Buffer::from_vec(vec![1.0f64, 2.0, 3.0]),
    });
    let root = arena.push(LayoutNode::ListOffset {
        offsets: Buffer::from_vec(vec![0i64, 2, 1]),
        content,
    });
    let view = ArrayView::from_arena(Arc::new(arena), root);
    match view.validate() {
        Err(Error::Structural { path, position, .. }) => {
            assert_eq!(path, "list-offset");
            assert_eq!(position, 1);
        }
        other => panic!("expected a structural failure, got {other:?}"),
    }
}

#[test]
fn validate_reports_option_index_out_of_bounds() {
    let mut arena = LayoutArena::new();
    let content = arena.push(LayoutNode::Flat {
        values: Buffer::from_vec(vec![1.0f64]),
    });
    let root = arena.push(LayoutNode::IndexedOption {
        index: Buffer::from_vec(vec![0i64, 5]),
        content,
    });
    let view = ArrayView::from_arena(Arc::new(arena), root);
    assert!(matches!(view.validate(), Err(Error::Structural { .. })));
}

fn union_view(tags: Vec<i8>, index: Vec<i64>) -> ArrayView {
    let mut arena = LayoutArena::new();
    let floats = arena.push(LayoutNode::Flat {
        values: Buffer::from_vec(vec![1.5f64]),
    });
    let ints = arena.push(LayoutNode::Flat {
        values: Buffer::from_vec(vec![7i64]),
    });
    let root = arena.push(LayoutNode::Union {
        tags: Buffer::from_vec(tags),
        index: Buffer::from_vec(index),
        contents: vec![floats, ints],
    });
    ArrayView::from_arena(Arc::new(arena), root)
}

#[test]
fn validate_reports_union_tag_out_of_range() {
    let view = union_view(vec![0i8, 5], vec![0i64, 0]);
    match view.validate() {
        Err(Error::Structural { path, position, .. }) => {
            assert_eq!(path, "union");
            assert_eq!(position, 1);
        }
        other => panic!("expected a structural failure, got {other:?}"),
    }
}

#[test]
fn validate_reports_union_index_out_of_bounds() {
    let view = union_view(vec![0i8, 1], vec![0i64, 3]);
    assert!(matches!(view.validate(), Err(Error::Structural { .. })));
}

#[test]
fn resolving_bad_union_metadata_is_an_error_not_a_panic() {
    // Unvalidated views still surface bad metadata through `get`.
    let bad_tag = union_view(vec![0i8, -2], vec![0i64, 0]);
    assert!(matches!(bad_tag.get(1), Err(Error::Structural { .. })));

    let bad_index = union_view(vec![0i8, 1], vec![0i64, 9]);
    assert!(matches!(
        bad_index.get(0).unwrap(),
        ArrayElement::Scalar(Scalar::Float(v)) if v == 1.5
    ));
    assert!(matches!(bad_index.get(1), Err(Error::Structural { .. })));
}

#[test]
fn bool_views_resolve_scalars() {
    let view = ArrayView::from_bools(&[true, false, true]);
    assert_eq!(view.type_signature().to_string(), "bool");
    assert!(matches!(
        view.get(1).unwrap(),
        ArrayElement::Scalar(Scalar::Bool(false))
    ));
}

#[test]
fn depth_counts_lists_not_options() {
    assert_eq!(ArrayView::from_f64(vec![1.0]).depth(), 1);
    assert_eq!(ArrayView::option_f64(&[Some(1.0)]).depth(), 1);
    assert_eq!(ArrayView::list_of_f64(&[vec![1.0]]).depth(), 2);
    assert_eq!(ArrayView::list_of_option_f64(&[vec![Some(1.0)]]).depth(), 2);
}

#[test]
fn sublist_lengths_follow_the_window() {
    let view = ArrayView::list_of_f64(&[vec![1.0, 2.0], vec![], vec![3.0]]);
    assert_eq!(view.sublist_lengths().unwrap(), vec![2, 0, 1]);
    let sliced = view.slice(1..3).unwrap();
    assert_eq!(sliced.sublist_lengths().unwrap(), vec![0, 1]);
}
