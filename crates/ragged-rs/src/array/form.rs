//! Serializable layout-form specifications for the construction API.
//!
//! A [`LayoutForm`] mirrors the layout node tree without payload buffers.
//! Language-binding ingestion code describes the structure as a form (often
//! as JSON) and supplies the raw host buffers separately; [`build`] pairs
//! them up in preorder and validates the assembled view.

use std::collections::VecDeque;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::buffer::Buffer;
use super::dtype::DType;
use super::layout::{LayoutArena, LayoutNode, NodeId};
use super::view::ArrayView;

/// Buffer-free description of one layout nesting level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum LayoutForm {
    /// Flat leaf of primitives; consumes one values buffer.
    Flat { dtype: DType },
    /// Variable-length lists; consumes one `int64` offsets buffer.
    ListOffset { content: Box<LayoutForm> },
    /// Possibly-missing values; consumes one `int64` index buffer.
    IndexedOption { content: Box<LayoutForm> },
    /// Named fields sharing one length; consumes no buffer itself.
    Record { fields: Vec<(String, Box<LayoutForm>)> },
    /// Tagged variants; consumes an `int8` tags buffer then an `int64`
    /// index buffer.
    Union { contents: Vec<LayoutForm> },
}

impl LayoutForm {
    /// Parses a form from its JSON representation.
    pub fn from_json(json: &str) -> Result<LayoutForm> {
        serde_json::from_str(json)
            .map_err(|err| Error::structural("form", 0, format!("invalid form JSON: {err}")))
    }

    /// Renders the form as JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("layout forms always serialize")
    }

    /// Number of buffers the form consumes in preorder.
    pub fn buffer_count(&self) -> usize {
        match self {
            LayoutForm::Flat { .. } => 1,
            LayoutForm::ListOffset { content } | LayoutForm::IndexedOption { content } => {
                1 + content.buffer_count()
            }
            LayoutForm::Record { fields } => {
                fields.iter().map(|(_, field)| field.buffer_count()).sum()
            }
            LayoutForm::Union { contents } => {
                2 + contents.iter().map(LayoutForm::buffer_count).sum::<usize>()
            }
        }
    }
}

/// Assembles an [`ArrayView`] from a layout form plus raw host buffers.
///
/// Buffers are consumed in preorder: offsets/index/tags metadata first, then
/// the node's content subtree. The assembled layout is validated before the
/// view is returned, so a mismatched buffer never escapes as a live view.
pub fn build(form: &LayoutForm, buffers: Vec<Buffer>) -> Result<ArrayView> {
    let expected = form.buffer_count();
    if buffers.len() != expected {
        return Err(Error::structural(
            "form",
            0,
            format!("form consumes {expected} buffers, {} supplied", buffers.len()),
        ));
    }
    let mut queue: VecDeque<Buffer> = buffers.into();
    let mut arena = LayoutArena::new();
    let root = assemble(form, &mut queue, &mut arena)?;
    let view = ArrayView::from_arena(Arc::new(arena), root);
    view.validate()?;
    Ok(view)
}

fn assemble(
    form: &LayoutForm,
    queue: &mut VecDeque<Buffer>,
    arena: &mut LayoutArena,
) -> Result<NodeId> {
    match form {
        LayoutForm::Flat { dtype } => {
            let values = take(queue, "flat values", *dtype)?;
            Ok(arena.push(LayoutNode::Flat { values }))
        }
        LayoutForm::ListOffset { content } => {
            let offsets = take(queue, "list offsets", DType::I64)?;
            if offsets.is_empty() {
                return Err(Error::structural(
                    "list-offset",
                    0,
                    "offsets buffer needs at least one entry",
                ));
            }
            let content = assemble(content, queue, arena)?;
            Ok(arena.push(LayoutNode::ListOffset { offsets, content }))
        }
        LayoutForm::IndexedOption { content } => {
            let index = take(queue, "option index", DType::I64)?;
            let content = assemble(content, queue, arena)?;
            Ok(arena.push(LayoutNode::IndexedOption { index, content }))
        }
        LayoutForm::Record { fields } => {
            if fields.is_empty() {
                return Err(Error::structural(
                    "record",
                    0,
                    "record forms need at least one field",
                ));
            }
            let mut assembled: Vec<(Arc<str>, NodeId)> = Vec::with_capacity(fields.len());
            for (name, field) in fields {
                assembled.push((Arc::from(name.as_str()), assemble(field, queue, arena)?));
            }
            let length = assembled
                .iter()
                .map(|(_, id)| arena.node_length(*id))
                .min()
                .unwrap_or(0);
            Ok(arena.push(LayoutNode::Record {
                fields: assembled,
                length,
            }))
        }
        LayoutForm::Union { contents } => {
            let tags = take(queue, "union tags", DType::I8)?;
            let index = take(queue, "union index", DType::I64)?;
            if tags.len() != index.len() {
                return Err(Error::structural(
                    "union",
                    0,
                    format!(
                        "tags length {} differs from index length {}",
                        tags.len(),
                        index.len()
                    ),
                ));
            }
            let contents = contents
                .iter()
                .map(|content| assemble(content, queue, arena))
                .collect::<Result<Vec<_>>>()?;
            Ok(arena.push(LayoutNode::Union {
                tags,
                index,
                contents,
            }))
        }
    }
}

fn take(queue: &mut VecDeque<Buffer>, role: &str, dtype: DType) -> Result<Buffer> {
    let buffer = queue
        .pop_front()
        .ok_or_else(|| Error::structural("form", 0, format!("missing buffer for {role}")))?;
    if buffer.dtype() != dtype {
        return Err(Error::structural(
            "form",
            0,
            format!(
                "{role} expects {}, found {}",
                dtype.name(),
                buffer.dtype().name()
            ),
        ));
    }
    Ok(buffer)
}
