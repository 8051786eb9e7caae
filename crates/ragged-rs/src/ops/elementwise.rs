//! Broadcasting element-wise arithmetic over nested views.
//!
//! Operations lower to flat kernels at the leaves: list levels align by
//! per-element sublist length (no implicit padding or truncation), a
//! shallower operand broadcasts across the sublists of a deeper one through
//! an offsets-derived gather, and option sentinels merge so the result is
//! missing wherever either operand is.

use std::sync::Arc;

use crate::array::layout::{read_index, read_offsets};
use crate::array::{ArrayView, DType, LayoutArena, LayoutNode, NodeId, TypeSignature};
use crate::backend::dispatch::Dispatcher;
use crate::backend::spec::{BinaryOp, KernelOp, UnaryOp};
use crate::array::Buffer;
use crate::error::{Error, Result};

/// Applies a binary operation with broadcasting, using the default dispatch
/// policy.
pub fn binary(op: BinaryOp, lhs: &ArrayView, rhs: &ArrayView) -> Result<ArrayView> {
    binary_with(&Dispatcher::default(), op, lhs, rhs)
}

/// Applies a binary operation with an explicit dispatcher.
pub fn binary_with(
    dispatcher: &Dispatcher,
    op: BinaryOp,
    lhs: &ArrayView,
    rhs: &ArrayView,
) -> Result<ArrayView> {
    let (sig_l, sig_r) = (lhs.type_signature(), rhs.type_signature());
    let prim_l = sig_l
        .primitive()
        .filter(|dtype| dtype.is_numeric())
        .ok_or_else(|| Error::type_mismatch(sig_l, sig_r))?;
    let prim_r = sig_r
        .primitive()
        .filter(|dtype| dtype.is_numeric())
        .ok_or_else(|| Error::type_mismatch(sig_l, sig_r))?;
    let dtype =
        DType::promote(prim_l, prim_r).ok_or_else(|| Error::type_mismatch(sig_l, sig_r))?;

    let mut walker = BinaryWalker {
        dispatcher,
        op,
        dtype,
        sig_l,
        sig_r,
        out: LayoutArena::new(),
    };
    let left = Side::classify(lhs.arena(), lhs.root(), lhs.start(), lhs.len(), sig_l, sig_r)?;
    let right = Side::classify(rhs.arena(), rhs.root(), rhs.start(), rhs.len(), sig_l, sig_r)?;
    let root = walker.walk(left, right)?;
    Ok(ArrayView::from_arena(Arc::new(walker.out), root))
}

/// Applies a unary operation, preserving list and option structure.
pub fn unary(op: UnaryOp, operand: &ArrayView) -> Result<ArrayView> {
    unary_with(&Dispatcher::default(), op, operand)
}

/// Applies a unary operation with an explicit dispatcher.
pub fn unary_with(dispatcher: &Dispatcher, op: UnaryOp, operand: &ArrayView) -> Result<ArrayView> {
    let sig = operand.type_signature();
    sig.primitive()
        .filter(|dtype| dtype.is_numeric())
        .ok_or_else(|| Error::type_mismatch(sig, sig))?;
    let mut out = LayoutArena::new();
    let root = unary_walk(
        dispatcher,
        op,
        operand.arena(),
        operand.root(),
        operand.start(),
        operand.len(),
        &mut out,
    )?;
    Ok(ArrayView::from_arena(Arc::new(out), root))
}

fn unary_walk(
    dispatcher: &Dispatcher,
    op: UnaryOp,
    arena: &LayoutArena,
    node: NodeId,
    start: usize,
    len: usize,
    out: &mut LayoutArena,
) -> Result<NodeId> {
    match arena.node(node) {
        LayoutNode::Flat { values } => {
            let window = values.slice(start, len)?;
            let (backend, operands) =
                dispatcher.select(KernelOp::Unary(op), &[&window])?;
            let result = backend.unary(op, &operands[0])?;
            Ok(out.push(LayoutNode::Flat { values: result }))
        }
        LayoutNode::ListOffset { offsets, content } => {
            let offsets = read_offsets(offsets, "list-offset")?;
            let (first, last) = (offsets[start], offsets[start + len]);
            let mapped = unary_walk(
                dispatcher,
                op,
                arena,
                *content,
                first as usize,
                (last - first) as usize,
                out,
            )?;
            let rebased: Vec<i64> = offsets[start..start + len + 1]
                .iter()
                .map(|&o| o - first)
                .collect();
            Ok(out.push(LayoutNode::ListOffset {
                offsets: Buffer::from_vec(rebased),
                content: mapped,
            }))
        }
        LayoutNode::IndexedOption { index, content } => {
            let index = index.slice(start, len)?;
            let content_len = arena.node_length(*content);
            let mapped = unary_walk(dispatcher, op, arena, *content, 0, content_len, out)?;
            Ok(out.push(LayoutNode::IndexedOption {
                index,
                content: mapped,
            }))
        }
        _ => {
            let sig = TypeSignature::of(arena, node);
            Err(Error::type_mismatch(&sig, &sig))
        }
    }
}

/// One operand of the aligned walk: either a list level or a flat leaf
/// (possibly behind an option index).
enum Side<'a> {
    List {
        arena: &'a LayoutArena,
        offsets: &'a [i64],
        content: NodeId,
        start: usize,
        len: usize,
    },
    Leaf(Leaf),
}

/// A flat leaf carried through broadcasting.
///
/// Each position of `index` is `-1` (missing) or an absolute offset into
/// `values`; non-option leaves carry an identity index over their window.
struct Leaf {
    values: Buffer,
    index: Vec<i64>,
    len: usize,
}

impl<'a> Side<'a> {
    fn classify(
        arena: &'a LayoutArena,
        node: NodeId,
        start: usize,
        len: usize,
        sig_l: &TypeSignature,
        sig_r: &TypeSignature,
    ) -> Result<Side<'a>> {
        match arena.node(node) {
            LayoutNode::Flat { values } => Ok(Side::Leaf(Leaf {
                values: values.clone(),
                index: (start as i64..(start + len) as i64).collect(),
                len,
            })),
            LayoutNode::ListOffset { offsets, content } => Ok(Side::List {
                arena,
                offsets: read_offsets(offsets, "list-offset")?,
                content: *content,
                start,
                len,
            }),
            LayoutNode::IndexedOption { index, content } => match arena.node(*content) {
                LayoutNode::Flat { values } => {
                    let index = read_index(index, "indexed-option")?;
                    Ok(Side::Leaf(Leaf {
                        values: values.clone(),
                        index: index[start..start + len].to_vec(),
                        len,
                    }))
                }
                // Options over nested structure have no aligned lowering
                // here; they are rejected as type-incompatible.
                _ => Err(Error::type_mismatch(sig_l, sig_r)),
            },
            _ => Err(Error::type_mismatch(sig_l, sig_r)),
        }
    }

}

struct BinaryWalker<'a> {
    dispatcher: &'a Dispatcher,
    op: BinaryOp,
    dtype: DType,
    sig_l: &'a TypeSignature,
    sig_r: &'a TypeSignature,
    out: LayoutArena,
}

impl<'a> BinaryWalker<'a> {
    fn walk(&mut self, left: Side<'a>, right: Side<'a>) -> Result<NodeId> {
        match (left, right) {
            (Side::Leaf(l), Side::Leaf(r)) => self.leaf_op(l, r),
            (
                Side::List {
                    arena: arena_l,
                    offsets: off_l,
                    content: content_l,
                    start: start_l,
                    len: len_l,
                },
                Side::List {
                    arena: arena_r,
                    offsets: off_r,
                    content: content_r,
                    start: start_r,
                    len: len_r,
                },
            ) => {
                if len_l != len_r {
                    if len_l == 1 {
                        return self.broadcast_single_list(
                            (arena_l, off_l, content_l, start_l),
                            (arena_r, off_r, content_r, start_r, len_r),
                            true,
                        );
                    }
                    if len_r == 1 {
                        return self.broadcast_single_list(
                            (arena_r, off_r, content_r, start_r),
                            (arena_l, off_l, content_l, start_l, len_l),
                            false,
                        );
                    }
                    return Err(Error::broadcast(
                        self.sig_l,
                        self.sig_r,
                        format!("outer lengths differ ({len_l} vs {len_r})"),
                    ));
                }
                for i in 0..len_l {
                    let size_l = off_l[start_l + i + 1] - off_l[start_l + i];
                    let size_r = off_r[start_r + i + 1] - off_r[start_r + i];
                    if size_l != size_r {
                        return Err(Error::broadcast(
                            self.sig_l,
                            self.sig_r,
                            format!("sublist lengths differ at position {i} ({size_l} vs {size_r})"),
                        ));
                    }
                }
                let (first_l, last_l) = (off_l[start_l], off_l[start_l + len_l]);
                let (first_r, last_r) = (off_r[start_r], off_r[start_r + len_r]);
                let inner_l = Side::classify(
                    arena_l,
                    content_l,
                    first_l as usize,
                    (last_l - first_l) as usize,
                    self.sig_l,
                    self.sig_r,
                )?;
                let inner_r = Side::classify(
                    arena_r,
                    content_r,
                    first_r as usize,
                    (last_r - first_r) as usize,
                    self.sig_l,
                    self.sig_r,
                )?;
                let content = self.walk(inner_l, inner_r)?;
                let rebased: Vec<i64> = off_l[start_l..start_l + len_l + 1]
                    .iter()
                    .map(|&o| o - first_l)
                    .collect();
                Ok(self.out.push(LayoutNode::ListOffset {
                    offsets: Buffer::from_vec(rebased),
                    content,
                }))
            }
            (
                Side::List {
                    arena,
                    offsets,
                    content,
                    start,
                    len,
                },
                Side::Leaf(leaf),
            ) => {
                let spread = self.spread_across(&offsets[start..start + len + 1], leaf)?;
                let inner = Side::classify(
                    arena,
                    content,
                    offsets[start] as usize,
                    (offsets[start + len] - offsets[start]) as usize,
                    self.sig_l,
                    self.sig_r,
                )?;
                let mapped = self.walk(inner, Side::Leaf(spread))?;
                self.rebuild_list(&offsets[start..start + len + 1], mapped)
            }
            (
                Side::Leaf(leaf),
                Side::List {
                    arena,
                    offsets,
                    content,
                    start,
                    len,
                },
            ) => {
                let spread = self.spread_across(&offsets[start..start + len + 1], leaf)?;
                let inner = Side::classify(
                    arena,
                    content,
                    offsets[start] as usize,
                    (offsets[start + len] - offsets[start]) as usize,
                    self.sig_l,
                    self.sig_r,
                )?;
                let mapped = self.walk(Side::Leaf(spread), inner)?;
                self.rebuild_list(&offsets[start..start + len + 1], mapped)
            }
        }
    }

    /// Repeats a length-1 list operand across the outer length of the other
    /// side, aligning its single sublist against every sublist.
    fn broadcast_single_list(
        &mut self,
        single: (&'a LayoutArena, &'a [i64], NodeId, usize),
        many: (&'a LayoutArena, &'a [i64], NodeId, usize, usize),
        single_is_left: bool,
    ) -> Result<NodeId> {
        let (arena_s, off_s, content_s, start_s) = single;
        let (arena_m, off_m, content_m, start_m, len_m) = many;
        let m = (off_s[start_s + 1] - off_s[start_s]) as usize;
        for i in 0..len_m {
            let size = (off_m[start_m + i + 1] - off_m[start_m + i]) as usize;
            if size != m {
                let (lhs, rhs) = if single_is_left { (m, size) } else { (size, m) };
                return Err(Error::broadcast(
                    self.sig_l,
                    self.sig_r,
                    format!("sublist lengths differ at position {i} ({lhs} vs {rhs})"),
                ));
            }
        }
        let inner_s = Side::classify(
            arena_s,
            content_s,
            off_s[start_s] as usize,
            m,
            self.sig_l,
            self.sig_r,
        )?;
        let leaf = match inner_s {
            Side::Leaf(leaf) => leaf,
            Side::List { .. } => {
                return Err(Error::broadcast(
                    self.sig_l,
                    self.sig_r,
                    "a length-1 operand with nested sublists does not repeat",
                ))
            }
        };
        let mut tiled = Vec::with_capacity(m * len_m);
        for _ in 0..len_m {
            tiled.extend_from_slice(&leaf.index);
        }
        let tiled = Leaf {
            values: leaf.values,
            index: tiled,
            len: m * len_m,
        };
        let inner_m = Side::classify(
            arena_m,
            content_m,
            off_m[start_m] as usize,
            (off_m[start_m + len_m] - off_m[start_m]) as usize,
            self.sig_l,
            self.sig_r,
        )?;
        let mapped = if single_is_left {
            self.walk(Side::Leaf(tiled), inner_m)?
        } else {
            self.walk(inner_m, Side::Leaf(tiled))?
        };
        self.rebuild_list(&off_m[start_m..start_m + len_m + 1], mapped)
    }

    /// Repeats a per-outer-element leaf across each sublist of a list level.
    fn spread_across(&mut self, offsets: &[i64], leaf: Leaf) -> Result<Leaf> {
        let outer = offsets.len() - 1;
        let leaf = if leaf.len == 1 && outer > 1 {
            self.expand_scalar(leaf, outer)?
        } else {
            leaf
        };
        if leaf.len != outer {
            return Err(Error::broadcast(
                self.sig_l,
                self.sig_r,
                format!(
                    "cannot spread {} elements across {outer} sublists",
                    leaf.len
                ),
            ));
        }
        let total = (offsets[outer] - offsets[0]) as usize;
        let mut spread = Vec::with_capacity(total);
        for (i, window) in offsets.windows(2).enumerate() {
            let count = (window[1] - window[0]) as usize;
            for _ in 0..count {
                spread.push(leaf.index[i]);
            }
        }
        Ok(Leaf {
            values: leaf.values,
            index: spread,
            len: total,
        })
    }

    fn expand_scalar(&mut self, leaf: Leaf, len: usize) -> Result<Leaf> {
        Ok(Leaf {
            values: leaf.values,
            index: vec![leaf.index[0]; len],
            len,
        })
    }

    fn rebuild_list(&mut self, offsets: &[i64], content: NodeId) -> Result<NodeId> {
        let first = offsets[0];
        let rebased: Vec<i64> = offsets.iter().map(|&o| o - first).collect();
        Ok(self.out.push(LayoutNode::ListOffset {
            offsets: Buffer::from_vec(rebased),
            content,
        }))
    }

    /// Computes the kernel call for two aligned leaves, merging validity.
    fn leaf_op(&mut self, mut left: Leaf, mut right: Leaf) -> Result<NodeId> {
        if left.len == 1 && right.len > 1 {
            left = self.expand_scalar(left, right.len)?;
        } else if right.len == 1 && left.len > 1 {
            right = self.expand_scalar(right, left.len)?;
        }
        if left.len != right.len {
            return Err(Error::broadcast(
                self.sig_l,
                self.sig_r,
                format!("leaf lengths differ ({} vs {})", left.len, right.len),
            ));
        }
        let len = left.len;
        let index_l = left.index;
        let index_r = right.index;
        let any_missing = index_l.iter().any(|&i| i < 0) || index_r.iter().any(|&i| i < 0);

        // Compact both operands down to the jointly-present positions.
        let mut gather_l = Vec::with_capacity(len);
        let mut gather_r = Vec::with_capacity(len);
        let mut merged: Vec<i64> = Vec::with_capacity(len);
        for i in 0..len {
            if index_l[i] >= 0 && index_r[i] >= 0 {
                merged.push(gather_l.len() as i64);
                gather_l.push(index_l[i]);
                gather_r.push(index_r[i]);
            } else {
                merged.push(-1);
            }
        }

        let lhs = self.gather_cast(&left.values, &gather_l)?;
        let rhs = self.gather_cast(&right.values, &gather_r)?;
        let (backend, operands) = self
            .dispatcher
            .select(KernelOp::Binary(self.op), &[&lhs, &rhs])?;
        let values = backend.binary(self.op, &operands[0], &operands[1])?;
        let flat = self.out.push(LayoutNode::Flat { values });
        if any_missing {
            Ok(self.out.push(LayoutNode::IndexedOption {
                index: Buffer::from_vec(merged),
                content: flat,
            }))
        } else {
            Ok(flat)
        }
    }

    /// Gathers leaf values into a compact buffer and casts to the promoted
    /// dtype.
    fn gather_cast(&self, values: &Buffer, index: &[i64]) -> Result<Buffer> {
        let (backend, operands) = self.dispatcher.select(KernelOp::Gather, &[values])?;
        let gathered = backend.gather(&operands[0], index)?;
        if gathered.dtype() == self.dtype {
            return Ok(gathered);
        }
        let (backend, operands) = self.dispatcher.select(KernelOp::Cast, &[&gathered])?;
        backend.cast(&operands[0], self.dtype)
    }
}
