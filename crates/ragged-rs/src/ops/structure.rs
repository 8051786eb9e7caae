//! Structural transforms: flatten, concatenate, and record zip.

use std::sync::Arc;

use half::f16;

use crate::array::layout::{read_index, read_offsets};
use crate::array::{
    ArrayElement, ArrayView, Buffer, DType, LayoutArena, LayoutNode, NodeId, TypeSignature,
};
use crate::backend::dispatch::Dispatcher;
use crate::backend::spec::KernelOp;
use crate::error::{Error, Result};

/// Removes one list level, exposing the concatenated sublist contents.
///
/// For a plain list this is an O(1) re-window of the shared content. A list
/// behind an option projects first: missing entries contribute nothing.
pub fn flatten(view: &ArrayView) -> Result<ArrayView> {
    let arena = view.arena();
    match arena.node(view.root()) {
        LayoutNode::ListOffset { offsets, content } => {
            let offsets = read_offsets(offsets, "list-offset")?;
            let first = offsets[view.start()] as usize;
            let last = offsets[view.start() + view.len()] as usize;
            Ok(ArrayView::with_window(
                Arc::clone(arena),
                *content,
                first,
                last - first,
            ))
        }
        LayoutNode::IndexedOption { index, content } => match arena.node(*content) {
            LayoutNode::ListOffset {
                offsets,
                content: inner,
            } => {
                let values = match arena.node(*inner) {
                    LayoutNode::Flat { values } => values,
                    _ => {
                        return Err(Error::type_mismatch(
                            view.type_signature(),
                            "flatten through option needs flat list content",
                        ))
                    }
                };
                let index = read_index(index, "indexed-option")?;
                let offsets = read_offsets(offsets, "list-offset")?;
                let mut gather = Vec::new();
                for &at in &index[view.start()..view.start() + view.len()] {
                    if at < 0 {
                        continue;
                    }
                    gather.extend(offsets[at as usize]..offsets[at as usize + 1]);
                }
                let dispatcher = Dispatcher::default();
                let (backend, operands) = dispatcher.select(KernelOp::Gather, &[values])?;
                let flat = backend.gather(&operands[0], &gather)?;
                let mut out = LayoutArena::new();
                let root = out.push(LayoutNode::Flat { values: flat });
                Ok(ArrayView::from_arena(Arc::new(out), root))
            }
            _ => Err(Error::type_mismatch(
                view.type_signature(),
                "flatten needs a list dimension",
            )),
        },
        _ => Err(Error::type_mismatch(
            view.type_signature(),
            "flatten needs a list dimension",
        )),
    }
}

/// Concatenates views along the outer axis.
///
/// Operands must share a generalized type: the least-upper-bound signature
/// is computed first (e.g. flat + flat-with-missing becomes option-of-flat)
/// and every operand is promoted to it before buffers are spliced.
pub fn concatenate(views: &[ArrayView]) -> Result<ArrayView> {
    let first = views.first().ok_or_else(|| {
        Error::structural("concatenate", 0, "at least one operand is required")
    })?;
    let mut target = first.type_signature().clone();
    for view in &views[1..] {
        target = TypeSignature::unify(&target, view.type_signature())
            .ok_or_else(|| Error::type_mismatch(&target, view.type_signature()))?;
    }
    let mut out = LayoutArena::new();
    let root = concat_into(&mut out, &target, views)?;
    Ok(ArrayView::from_arena(Arc::new(out), root))
}

fn concat_into(
    out: &mut LayoutArena,
    target: &TypeSignature,
    parts: &[ArrayView],
) -> Result<NodeId> {
    match target {
        TypeSignature::Primitive(dtype) => {
            let mut leaves = Vec::with_capacity(parts.len());
            for part in parts {
                leaves.push(flat_window(part)?);
            }
            let values = splice_flat(&leaves, *dtype)?;
            Ok(out.push(LayoutNode::Flat { values }))
        }
        TypeSignature::Option(inner) => {
            let mut index: Vec<i64> = Vec::new();
            let mut contents: Vec<ArrayView> = Vec::with_capacity(parts.len());
            let mut base = 0i64;
            for part in parts {
                match part.arena().node(part.root()) {
                    LayoutNode::IndexedOption {
                        index: part_index,
                        content,
                    } => {
                        let part_index = read_index(part_index, "indexed-option")?;
                        for &at in &part_index[part.start()..part.start() + part.len()] {
                            index.push(if at < 0 { -1 } else { at + base });
                        }
                        let content_view =
                            ArrayView::with_window(
                                Arc::clone(part.arena()),
                                *content,
                                0,
                                part.arena().node_length(*content),
                            );
                        base += content_view.len() as i64;
                        contents.push(content_view);
                    }
                    _ => {
                        // Promote a non-optional operand: identity indices
                        // over its own window.
                        index.extend((0..part.len() as i64).map(|i| i + base));
                        base += part.len() as i64;
                        contents.push(part.clone());
                    }
                }
            }
            let content = concat_into(out, inner, &contents)?;
            Ok(out.push(LayoutNode::IndexedOption {
                index: Buffer::from_vec(index),
                content,
            }))
        }
        TypeSignature::List(inner) => {
            let mut offsets: Vec<i64> = vec![0];
            let mut contents: Vec<ArrayView> = Vec::with_capacity(parts.len());
            let mut base = 0i64;
            for part in parts {
                match part.arena().node(part.root()) {
                    LayoutNode::ListOffset {
                        offsets: part_offsets,
                        content,
                    } => {
                        let part_offsets = read_offsets(part_offsets, "list-offset")?;
                        let first = part_offsets[part.start()];
                        let last = part_offsets[part.start() + part.len()];
                        for window in
                            part_offsets[part.start()..part.start() + part.len() + 1].windows(2)
                        {
                            offsets.push(window[1] - first + base);
                        }
                        contents.push(ArrayView::with_window(
                            Arc::clone(part.arena()),
                            *content,
                            first as usize,
                            (last - first) as usize,
                        ));
                        base += last - first;
                    }
                    _ => {
                        return Err(Error::type_mismatch(
                            target,
                            part.type_signature(),
                        ))
                    }
                }
            }
            let content = concat_into(out, inner, &contents)?;
            Ok(out.push(LayoutNode::ListOffset {
                offsets: Buffer::from_vec(offsets),
                content,
            }))
        }
        TypeSignature::Record(fields) => {
            let mut assembled: Vec<(Arc<str>, NodeId)> = Vec::with_capacity(fields.len());
            for (name, field_sig) in fields {
                let mut projected = Vec::with_capacity(parts.len());
                for part in parts {
                    projected.push(part.field(name)?);
                }
                assembled.push((Arc::clone(name), concat_into(out, field_sig, &projected)?));
            }
            let length = parts.iter().map(ArrayView::len).sum();
            Ok(out.push(LayoutNode::Record {
                fields: assembled,
                length,
            }))
        }
        TypeSignature::Union(variants) => {
            // Unions only concatenate with identical signatures, so tags can
            // be spliced directly and indices rebased per variant.
            let mut tags: Vec<i8> = Vec::new();
            let mut index: Vec<i64> = Vec::new();
            let mut bases = vec![0i64; variants.len()];
            let mut per_variant: Vec<Vec<ArrayView>> = vec![Vec::new(); variants.len()];
            for part in parts {
                match part.arena().node(part.root()) {
                    LayoutNode::Union {
                        tags: part_tags,
                        index: part_index,
                        contents,
                    } => {
                        let part_tags = part_tags.expect_slice::<i8>()?;
                        let part_index = read_index(part_index, "union")?;
                        for i in part.start()..part.start() + part.len() {
                            let tag = part_tags[i];
                            tags.push(tag);
                            index.push(part_index[i] + bases[tag as usize]);
                        }
                        for (variant, content) in contents.iter().enumerate() {
                            let content_view = ArrayView::with_window(
                                Arc::clone(part.arena()),
                                *content,
                                0,
                                part.arena().node_length(*content),
                            );
                            bases[variant] += content_view.len() as i64;
                            per_variant[variant].push(content_view);
                        }
                    }
                    _ => {
                        return Err(Error::type_mismatch(
                            target,
                            part.type_signature(),
                        ))
                    }
                }
            }
            let contents = variants
                .iter()
                .zip(per_variant)
                .map(|(variant_sig, views)| concat_into(out, variant_sig, &views))
                .collect::<Result<Vec<_>>>()?;
            Ok(out.push(LayoutNode::Union {
                tags: Buffer::from_vec(tags),
                index: Buffer::from_vec(index),
                contents,
            }))
        }
    }
}

/// Zips equal-length views into a record with named fields.
pub fn zip(fields: &[(&str, ArrayView)]) -> Result<ArrayView> {
    let (_, first) = fields.first().ok_or_else(|| {
        Error::structural("zip", 0, "at least one field is required")
    })?;
    for (name, view) in fields {
        if view.len() != first.len() {
            return Err(Error::broadcast(
                first.type_signature(),
                view.type_signature(),
                format!(
                    "field `{name}` has length {} but the record needs {}",
                    view.len(),
                    first.len()
                ),
            ));
        }
    }
    let mut out = LayoutArena::new();
    let mut assembled: Vec<(Arc<str>, NodeId)> = Vec::with_capacity(fields.len());
    for (name, view) in fields {
        assembled.push((Arc::from(*name), view.reroot_into(&mut out)?));
    }
    let root = out.push(LayoutNode::Record {
        fields: assembled,
        length: first.len(),
    });
    Ok(ArrayView::from_arena(Arc::new(out), root))
}

/// Structural and value equality between two views.
pub fn value_equal(a: &ArrayView, b: &ArrayView) -> bool {
    if a.type_signature() != b.type_signature() || a.len() != b.len() {
        return false;
    }
    for i in 0..a.len() {
        let (ea, eb) = match (a.get(i), b.get(i)) {
            (Ok(ea), Ok(eb)) => (ea, eb),
            _ => return false,
        };
        if !element_equal(&ea, &eb) {
            return false;
        }
    }
    true
}

fn element_equal(a: &ArrayElement, b: &ArrayElement) -> bool {
    match (a, b) {
        (ArrayElement::Scalar(x), ArrayElement::Scalar(y)) => x == y,
        (ArrayElement::Missing, ArrayElement::Missing) => true,
        (ArrayElement::List(x), ArrayElement::List(y)) => value_equal(x, y),
        (ArrayElement::Record(xs), ArrayElement::Record(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .zip(ys)
                    .all(|((nx, ex), (ny, ey))| nx == ny && element_equal(ex, ey))
        }
        _ => false,
    }
}

/// Extracts a part's flat window, used when splicing primitive leaves.
fn flat_window(part: &ArrayView) -> Result<Buffer> {
    match part.arena().node(part.root()) {
        LayoutNode::Flat { values } => values.slice(part.start(), part.len()),
        _ => Err(Error::type_mismatch(
            part.type_signature(),
            "flat values",
        )),
    }
}

/// Splices flat leaves into one host buffer, casting to the target kind.
fn splice_flat(leaves: &[Buffer], dtype: DType) -> Result<Buffer> {
    let dispatcher = Dispatcher::default();
    let mut normalized = Vec::with_capacity(leaves.len());
    for leaf in leaves {
        let leaf = if leaf.dtype() == dtype {
            leaf.clone()
        } else {
            let (backend, operands) = dispatcher.select(KernelOp::Cast, &[leaf])?;
            backend.cast(&operands[0], dtype)?
        };
        normalized.push(leaf.materialize(&crate::backend::spec::Residency::host())?);
    }

    macro_rules! splice {
        ($ty:ty) => {{
            let mut values: Vec<$ty> = Vec::new();
            for leaf in &normalized {
                values.extend_from_slice(leaf.expect_slice::<$ty>()?);
            }
            Buffer::from_vec(values)
        }};
    }
    Ok(match dtype {
        DType::Bool => {
            let mut bools: Vec<bool> = Vec::new();
            for leaf in &normalized {
                let bytes = leaf
                    .as_bools()
                    .ok_or_else(|| Error::execution("bool buffer storage mismatch"))?;
                bools.extend(bytes.iter().map(|&b| b != 0));
            }
            Buffer::from_bools(&bools)
        }
        DType::I8 => splice!(i8),
        DType::U8 => splice!(u8),
        DType::I16 => splice!(i16),
        DType::U16 => splice!(u16),
        DType::I32 => splice!(i32),
        DType::U32 => splice!(u32),
        DType::I64 => splice!(i64),
        DType::U64 => splice!(u64),
        DType::F16 => splice!(f16),
        DType::F32 => splice!(f32),
        DType::F64 => splice!(f64),
    })
}
