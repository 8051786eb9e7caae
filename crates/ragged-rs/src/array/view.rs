//! Typed, immutable handles over shared layout arenas and buffers.

use std::fmt;
use std::sync::Arc;

use half::f16;
use once_cell::sync::OnceCell;

use crate::error::{Error, Result};

use super::buffer::Buffer;
use super::dtype::DType;
use super::layout::{read_index, read_offsets, LayoutArena, LayoutNode, NodeId};
use super::types::TypeSignature;

/// Primitive value resolved out of a flat leaf.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
}

/// Result of resolving one element of a view.
///
/// Option sentinels produce [`ArrayElement::Missing`] rather than an error;
/// nested dimensions resolve to sub-views sharing the same buffers.
#[derive(Debug, Clone)]
pub enum ArrayElement {
    Scalar(Scalar),
    Missing,
    List(ArrayView),
    Record(Vec<(Arc<str>, ArrayElement)>),
}

/// An immutable `(layout, start, length)` handle over shared buffers.
///
/// Views are freely shareable across threads; every interior reference is
/// reference-counted and mutation always produces new buffers, so dropping
/// the last view releases the storage.
#[derive(Clone)]
pub struct ArrayView {
    arena: Arc<LayoutArena>,
    root: NodeId,
    start: usize,
    length: usize,
    signature: OnceCell<TypeSignature>,
}

impl ArrayView {
    /// Wraps an arena root as a full-length view.
    pub fn from_arena(arena: Arc<LayoutArena>, root: NodeId) -> ArrayView {
        let length = arena.node_length(root);
        ArrayView {
            arena,
            root,
            start: 0,
            length,
            signature: OnceCell::new(),
        }
    }

    /// Wraps an arena root restricted to a window.
    pub(crate) fn with_window(
        arena: Arc<LayoutArena>,
        root: NodeId,
        start: usize,
        length: usize,
    ) -> ArrayView {
        ArrayView {
            arena,
            root,
            start,
            length,
            signature: OnceCell::new(),
        }
    }

    /// Builds a flat view over owned values.
    pub fn from_vec<T: super::buffer::Element>(values: Vec<T>) -> ArrayView {
        let mut arena = LayoutArena::new();
        let root = arena.push(LayoutNode::Flat {
            values: Buffer::from_vec(values),
        });
        ArrayView::from_arena(Arc::new(arena), root)
    }

    /// Builds a flat `float64` view.
    pub fn from_f64(values: Vec<f64>) -> ArrayView {
        ArrayView::from_vec(values)
    }

    /// Builds a flat `int64` view.
    pub fn from_i64(values: Vec<i64>) -> ArrayView {
        ArrayView::from_vec(values)
    }

    /// Builds a flat `bool` view.
    pub fn from_bools(values: &[bool]) -> ArrayView {
        let mut arena = LayoutArena::new();
        let root = arena.push(LayoutNode::Flat {
            values: Buffer::from_bools(values),
        });
        ArrayView::from_arena(Arc::new(arena), root)
    }

    /// Assembles a view from a layout form plus raw host buffers.
    ///
    /// See [`super::form::build`].
    pub fn from_parts(form: &super::form::LayoutForm, buffers: Vec<Buffer>) -> Result<ArrayView> {
        super::form::build(form, buffers)
    }

    /// Builds a list-of-`float64` view from per-sublist values.
    pub fn list_of_f64(sublists: &[Vec<f64>]) -> ArrayView {
        let mut offsets = Vec::with_capacity(sublists.len() + 1);
        offsets.push(0i64);
        let mut values = Vec::new();
        for sublist in sublists {
            values.extend_from_slice(sublist);
            offsets.push(values.len() as i64);
        }
        let mut arena = LayoutArena::new();
        let content = arena.push(LayoutNode::Flat {
            values: Buffer::from_vec(values),
        });
        let root = arena.push(LayoutNode::ListOffset {
            offsets: Buffer::from_vec(offsets),
            content,
        });
        ArrayView::from_arena(Arc::new(arena), root)
    }

    /// Builds an option-of-`float64` view, mapping `None` to the missing
    /// sentinel.
    pub fn option_f64(values: &[Option<f64>]) -> ArrayView {
        let mut index = Vec::with_capacity(values.len());
        let mut present = Vec::new();
        for value in values {
            match value {
                Some(v) => {
                    index.push(present.len() as i64);
                    present.push(*v);
                }
                None => index.push(-1),
            }
        }
        let mut arena = LayoutArena::new();
        let content = arena.push(LayoutNode::Flat {
            values: Buffer::from_vec(present),
        });
        let root = arena.push(LayoutNode::IndexedOption {
            index: Buffer::from_vec(index),
            content,
        });
        ArrayView::from_arena(Arc::new(arena), root)
    }

    /// Builds a list-of-option-of-`float64` view.
    pub fn list_of_option_f64(sublists: &[Vec<Option<f64>>]) -> ArrayView {
        let mut offsets = vec![0i64];
        let mut index = Vec::new();
        let mut present = Vec::new();
        for sublist in sublists {
            for value in sublist {
                match value {
                    Some(v) => {
                        index.push(present.len() as i64);
                        present.push(*v);
                    }
                    None => index.push(-1),
                }
            }
            offsets.push(index.len() as i64);
        }
        let mut arena = LayoutArena::new();
        let flat = arena.push(LayoutNode::Flat {
            values: Buffer::from_vec(present),
        });
        let option = arena.push(LayoutNode::IndexedOption {
            index: Buffer::from_vec(index),
            content: flat,
        });
        let root = arena.push(LayoutNode::ListOffset {
            offsets: Buffer::from_vec(offsets),
            content: option,
        });
        ArrayView::from_arena(Arc::new(arena), root)
    }

    /// Number of outermost elements visible through this view.
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub(crate) fn arena(&self) -> &Arc<LayoutArena> {
        &self.arena
    }

    pub(crate) fn root(&self) -> NodeId {
        self.root
    }

    pub(crate) fn start(&self) -> usize {
        self.start
    }

    /// The view's nested type, memoized per view.
    pub fn type_signature(&self) -> &TypeSignature {
        self.signature
            .get_or_init(|| TypeSignature::of(&self.arena, self.root))
    }

    /// Nesting depth down to the primitive leaf.
    pub fn depth(&self) -> usize {
        self.type_signature().depth()
    }

    /// Returns a new view over the same buffers with an adjusted window.
    ///
    /// O(1); an empty range is valid and yields a zero-length view of the
    /// same type.
    pub fn slice(&self, range: std::ops::Range<usize>) -> Result<ArrayView> {
        if range.start > range.end || range.end > self.length {
            return Err(Error::structural(
                self.arena.node(self.root).kind(),
                range.start,
                format!(
                    "slice {}..{} exceeds view length {}",
                    range.start, range.end, self.length
                ),
            ));
        }
        let mut sliced = self.clone();
        sliced.start = self.start + range.start;
        sliced.length = range.end - range.start;
        // The nested type is unchanged, carry the memoized signature across.
        Ok(sliced)
    }

    /// Checks structural invariants over this view's window.
    pub fn validate(&self) -> Result<()> {
        self.arena.validate(self.root, self.start, self.length)
    }

    /// Resolves a single element by walking nested layout descriptors.
    pub fn get(&self, index: usize) -> Result<ArrayElement> {
        if index >= self.length {
            return Err(Error::structural(
                self.arena.node(self.root).kind(),
                index,
                format!("index {index} out of bounds for length {}", self.length),
            ));
        }
        self.resolve(self.root, self.start + index)
    }

    fn resolve(&self, id: NodeId, position: usize) -> Result<ArrayElement> {
        match self.arena.node(id) {
            LayoutNode::Flat { values } => Ok(ArrayElement::Scalar(read_scalar(values, position)?)),
            LayoutNode::ListOffset { offsets, content } => {
                let offsets = read_offsets(offsets, "list-offset")?;
                let (lo, hi) = (offsets[position], offsets[position + 1]);
                Ok(ArrayElement::List(ArrayView::with_window(
                    Arc::clone(&self.arena),
                    *content,
                    lo as usize,
                    (hi - lo) as usize,
                )))
            }
            LayoutNode::IndexedOption { index, content } => {
                let index = read_index(index, "indexed-option")?;
                match index[position] {
                    -1 => Ok(ArrayElement::Missing),
                    at => self.resolve(*content, at as usize),
                }
            }
            LayoutNode::Record { fields, .. } => {
                let mut resolved = Vec::with_capacity(fields.len());
                for (name, field) in fields {
                    resolved.push((Arc::clone(name), self.resolve(*field, position)?));
                }
                Ok(ArrayElement::Record(resolved))
            }
            LayoutNode::Union {
                tags,
                index,
                contents,
            } => {
                let tag = tags.expect_slice::<i8>()?[position];
                if tag < 0 || tag as usize >= contents.len() {
                    return Err(Error::structural(
                        "union",
                        position,
                        format!("tag {tag} outside the {} union variants", contents.len()),
                    ));
                }
                let content = contents[tag as usize];
                let index = read_index(index, "union")?;
                let at = index[position];
                let content_len = self.arena.node_length(content);
                if at < 0 || at as usize >= content_len {
                    return Err(Error::structural(
                        "union",
                        position,
                        format!("index {at} outside variant of length {content_len}"),
                    ));
                }
                self.resolve(content, at as usize)
            }
        }
    }

    /// Projects one record field over the same window.
    pub fn field(&self, name: &str) -> Result<ArrayView> {
        match self.arena.node(self.root) {
            LayoutNode::Record { fields, .. } => fields
                .iter()
                .find(|(field, _)| field.as_ref() == name)
                .map(|(_, id)| {
                    ArrayView::with_window(Arc::clone(&self.arena), *id, self.start, self.length)
                })
                .ok_or_else(|| {
                    Error::structural("record", 0, format!("no field named `{name}`"))
                }),
            other => Err(Error::type_mismatch(
                self.type_signature(),
                format!("record projection on {}", other.kind()),
            )),
        }
    }

    /// Names of record fields, empty for non-record views.
    pub fn fields(&self) -> Vec<Arc<str>> {
        match self.arena.node(self.root) {
            LayoutNode::Record { fields, .. } => {
                fields.iter().map(|(name, _)| Arc::clone(name)).collect()
            }
            _ => Vec::new(),
        }
    }

    /// For list views, the number of elements each sublist holds.
    pub fn sublist_lengths(&self) -> Result<Vec<usize>> {
        match self.arena.node(self.root) {
            LayoutNode::ListOffset { offsets, .. } => {
                let offsets = read_offsets(offsets, "list-offset")?;
                Ok((self.start..self.start + self.length)
                    .map(|i| (offsets[i + 1] - offsets[i]) as usize)
                    .collect())
            }
            other => Err(Error::type_mismatch(
                self.type_signature(),
                format!("sublist lengths on {}", other.kind()),
            )),
        }
    }

    /// Copies this view's window into a fresh arena, returning the new root.
    ///
    /// Buffers stay shared; only layout nodes are re-rooted. Used when a
    /// view becomes a child of a new structure (zip, concatenate).
    pub(crate) fn reroot_into(&self, arena: &mut LayoutArena) -> Result<NodeId> {
        arena.import(&self.arena, self.root, self.start, self.length)
    }
}

impl fmt::Debug for ArrayView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayView")
            .field("type", &self.type_signature().to_string())
            .field("start", &self.start)
            .field("length", &self.length)
            .finish()
    }
}

/// Reads one primitive value out of a flat buffer.
fn read_scalar(values: &Buffer, position: usize) -> Result<Scalar> {
    macro_rules! read {
        ($ty:ty, $wrap:expr) => {{
            let slice = values.expect_slice::<$ty>()?;
            $wrap(slice[position])
        }};
    }
    Ok(match values.dtype() {
        DType::Bool => {
            let bytes = values
                .as_bools()
                .ok_or_else(|| Error::execution("bool buffer storage mismatch"))?;
            Scalar::Bool(bytes[position] != 0)
        }
        DType::I8 => read!(i8, |v| Scalar::Int(v as i64)),
        DType::I16 => read!(i16, |v| Scalar::Int(v as i64)),
        DType::I32 => read!(i32, |v| Scalar::Int(v as i64)),
        DType::I64 => read!(i64, Scalar::Int),
        DType::U8 => read!(u8, |v| Scalar::UInt(v as u64)),
        DType::U16 => read!(u16, |v| Scalar::UInt(v as u64)),
        DType::U32 => read!(u32, |v| Scalar::UInt(v as u64)),
        DType::U64 => read!(u64, Scalar::UInt),
        DType::F16 => read!(f16, |v: f16| Scalar::Float(v.to_f64())),
        DType::F32 => read!(f32, |v| Scalar::Float(v as f64)),
        DType::F64 => read!(f64, Scalar::Float),
    })
}
