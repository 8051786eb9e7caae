//! Reductions over nested views, folding per-sublist at the innermost level.

use std::sync::Arc;

use crate::array::layout::{read_index, read_offsets};
use crate::array::{ArrayView, Buffer, LayoutArena, LayoutNode, NodeId, TypeSignature};
use crate::backend::dispatch::Dispatcher;
use crate::backend::spec::{KernelOp, ReduceKind};
use crate::error::{Error, Result};

/// How missing values participate in a reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingPolicy {
    /// Missing elements do not contribute: `sum [1, missing, 3] == 4`.
    #[default]
    Skip,
    /// Any missing element makes the whole sublist result missing.
    Propagate,
}

/// Configuration for [`reduce`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ReduceOptions {
    pub missing: MissingPolicy,
    /// Keep folding across outer dimensions until a single value remains.
    pub flatten: bool,
}

/// Reduces a view, folding each innermost sublist to one value.
///
/// A depth-1 view folds to a length-1 array. With `flatten` set, the fold
/// repeats across outer dimensions until one value remains. Results become
/// option-typed when a sublist produces no value (empty `Min`/`Max`, or any
/// missing element under [`MissingPolicy::Propagate`]).
pub fn reduce(view: &ArrayView, kind: ReduceKind, options: ReduceOptions) -> Result<ArrayView> {
    reduce_with(&Dispatcher::default(), view, kind, options)
}

/// [`reduce`] with an explicit dispatcher.
pub fn reduce_with(
    dispatcher: &Dispatcher,
    view: &ArrayView,
    kind: ReduceKind,
    options: ReduceOptions,
) -> Result<ArrayView> {
    let mut current = reduce_innermost(dispatcher, view, kind, options)?;
    if options.flatten {
        while current.depth() > 1 || current.len() > 1 {
            current = reduce_innermost(dispatcher, &current, kind, options)?;
        }
    }
    Ok(current)
}

fn reduce_innermost(
    dispatcher: &Dispatcher,
    view: &ArrayView,
    kind: ReduceKind,
    options: ReduceOptions,
) -> Result<ArrayView> {
    let mut out = LayoutArena::new();
    let root = reduce_node(
        dispatcher,
        view.arena(),
        view.root(),
        view.start(),
        view.len(),
        kind,
        options,
        &mut out,
        view.type_signature(),
    )?;
    Ok(ArrayView::from_arena(Arc::new(out), root))
}

#[allow(clippy::too_many_arguments)]
fn reduce_node(
    dispatcher: &Dispatcher,
    arena: &LayoutArena,
    node: NodeId,
    start: usize,
    len: usize,
    kind: ReduceKind,
    options: ReduceOptions,
    out: &mut LayoutArena,
    sig: &TypeSignature,
) -> Result<NodeId> {
    match arena.node(node) {
        // Depth-1 inputs fold to a single value.
        LayoutNode::Flat { .. } | LayoutNode::IndexedOption { .. }
            if leaf_reducible(arena, node) =>
        {
            let segments = [0i64, len as i64];
            fold_segments(dispatcher, arena, node, start, len, &segments, kind, options, out, sig)
        }
        LayoutNode::ListOffset { offsets, content } => {
            let offsets = read_offsets(offsets, "list-offset")?;
            let first = offsets[start];
            if leaf_reducible(arena, *content) {
                let segments: Vec<i64> = offsets[start..start + len + 1]
                    .iter()
                    .map(|&o| o - first)
                    .collect();
                fold_segments(
                    dispatcher,
                    arena,
                    *content,
                    first as usize,
                    (offsets[start + len] - first) as usize,
                    &segments,
                    kind,
                    options,
                    out,
                    sig,
                )
            } else {
                // Deeper nesting: fold the innermost level, keeping this
                // level's offsets (each inner list maps to one value, so
                // element counts are unchanged).
                let inner = reduce_node(
                    dispatcher,
                    arena,
                    *content,
                    first as usize,
                    (offsets[start + len] - first) as usize,
                    kind,
                    options,
                    out,
                    sig,
                )?;
                let rebased: Vec<i64> = offsets[start..start + len + 1]
                    .iter()
                    .map(|&o| o - first)
                    .collect();
                Ok(out.push(LayoutNode::ListOffset {
                    offsets: Buffer::from_vec(rebased),
                    content: inner,
                }))
            }
        }
        _ => Err(Error::type_mismatch(sig, sig)),
    }
}

/// True when a node is a flat leaf or an option over one.
fn leaf_reducible(arena: &LayoutArena, node: NodeId) -> bool {
    match arena.node(node) {
        LayoutNode::Flat { values } => values.dtype().is_numeric(),
        LayoutNode::IndexedOption { content, .. } => {
            matches!(arena.node(*content), LayoutNode::Flat { values } if values.dtype().is_numeric())
        }
        _ => false,
    }
}

/// Runs the segmented-reduce kernel over a leaf window and masks segments
/// that produced no value.
#[allow(clippy::too_many_arguments)]
fn fold_segments(
    dispatcher: &Dispatcher,
    arena: &LayoutArena,
    leaf: NodeId,
    start: usize,
    len: usize,
    segments: &[i64],
    kind: ReduceKind,
    options: ReduceOptions,
    out: &mut LayoutArena,
    sig: &TypeSignature,
) -> Result<NodeId> {
    // Align the leaf window into a contiguous values buffer plus validity.
    let (values, validity) = match arena.node(leaf) {
        LayoutNode::Flat { values } => (values.slice(start, len)?, None),
        LayoutNode::IndexedOption { index, content } => {
            let index = read_index(index, "indexed-option")?;
            let window = &index[start..start + len];
            let validity: Vec<u8> = window.iter().map(|&i| (i >= 0) as u8).collect();
            let clamped: Vec<i64> = window.iter().map(|&i| i.max(0)).collect();
            let inner = match arena.node(*content) {
                LayoutNode::Flat { values } => values,
                _ => return Err(Error::type_mismatch(sig, sig)),
            };
            let (backend, operands) = dispatcher.select(KernelOp::Gather, &[inner])?;
            let gathered = backend.gather(&operands[0], &clamped)?;
            (gathered, Some(validity))
        }
        _ => return Err(Error::type_mismatch(sig, sig)),
    };

    let (backend, operands) =
        dispatcher.select(KernelOp::SegmentedReduce(kind), &[&values])?;
    let reduction =
        backend.segmented_reduce(kind, &operands[0], segments, validity.as_deref())?;

    let segment_count = segments.len() - 1;
    let mut index: Vec<i64> = Vec::with_capacity(segment_count);
    let mut any_missing = false;
    for i in 0..segment_count {
        let total = segments[i + 1] - segments[i];
        let present = reduction.present[i];
        let valid = match (kind, options.missing) {
            (ReduceKind::Sum | ReduceKind::Count, MissingPolicy::Skip) => true,
            (ReduceKind::Min | ReduceKind::Max, MissingPolicy::Skip) => present > 0,
            (ReduceKind::Count, MissingPolicy::Propagate) => present == total,
            (ReduceKind::Sum, MissingPolicy::Propagate) => present == total,
            (ReduceKind::Min | ReduceKind::Max, MissingPolicy::Propagate) => {
                present == total && total > 0
            }
        };
        if valid {
            index.push(i as i64);
        } else {
            index.push(-1);
            any_missing = true;
        }
    }

    let flat = out.push(LayoutNode::Flat {
        values: reduction.values,
    });
    if any_missing {
        Ok(out.push(LayoutNode::IndexedOption {
            index: Buffer::from_vec(index),
            content: flat,
        }))
    } else {
        Ok(flat)
    }
}
