//! Arena-indexed layout descriptors for nested, variable-length structure.
//!
//! Layout nodes live in a [`LayoutArena`] and reference their children by
//! [`NodeId`], so shared substructure costs one node instead of a deep copy
//! and cycles are unrepresentable (a child must exist before its parent is
//! pushed). Nesting depth is unbounded but always terminates in a
//! [`LayoutNode::Flat`] leaf.

use std::sync::Arc;

use crate::error::{Error, Result};

use super::buffer::Buffer;
use super::dtype::DType;

/// Index of a layout node within its arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub usize);

/// One nesting level of a ragged array.
#[derive(Debug, Clone)]
pub enum LayoutNode {
    /// Contiguous primitive values; the leaf of every layout tree.
    Flat { values: Buffer },
    /// Variable-length sublists encoded as `length + 1` monotonically
    /// non-decreasing `i64` offsets into the content.
    ListOffset { offsets: Buffer, content: NodeId },
    /// Possibly-missing values: `i64` positions into the content, with `-1`
    /// as the missing sentinel.
    IndexedOption { index: Buffer, content: NodeId },
    /// Named fields sharing one logical length (struct-of-arrays).
    Record {
        fields: Vec<(Arc<str>, NodeId)>,
        length: usize,
    },
    /// Tagged variants: an `i8` tag selecting the content and an `i64`
    /// position within it.
    Union {
        tags: Buffer,
        index: Buffer,
        contents: Vec<NodeId>,
    },
}

impl LayoutNode {
    /// Short kind name used in validation paths and error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            LayoutNode::Flat { .. } => "flat",
            LayoutNode::ListOffset { .. } => "list-offset",
            LayoutNode::IndexedOption { .. } => "indexed-option",
            LayoutNode::Record { .. } => "record",
            LayoutNode::Union { .. } => "union",
        }
    }
}

/// Owning store of layout nodes, keyed by [`NodeId`].
#[derive(Debug, Clone, Default)]
pub struct LayoutArena {
    nodes: Vec<LayoutNode>,
}

impl LayoutArena {
    pub fn new() -> Self {
        LayoutArena { nodes: Vec::new() }
    }

    /// Appends a node and returns its id. Children must already exist.
    pub fn push(&mut self, node: LayoutNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    pub fn node(&self, id: NodeId) -> &LayoutNode {
        &self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Logical length of a node (number of outermost elements).
    pub fn node_length(&self, id: NodeId) -> usize {
        match self.node(id) {
            LayoutNode::Flat { values } => values.len(),
            LayoutNode::ListOffset { offsets, .. } => offsets.len().saturating_sub(1),
            LayoutNode::IndexedOption { index, .. } => index.len(),
            LayoutNode::Record { length, .. } => *length,
            LayoutNode::Union { tags, .. } => tags.len(),
        }
    }

    /// Copies the subtree rooted at `root` in `src` into this arena,
    /// materializing the `[start, start + length)` window into the copied
    /// root node. Buffers are shared, never duplicated.
    pub fn import(
        &mut self,
        src: &LayoutArena,
        root: NodeId,
        start: usize,
        length: usize,
    ) -> Result<NodeId> {
        let available = src.node_length(root);
        if start
            .checked_add(length)
            .map(|end| end > available)
            .unwrap_or(true)
        {
            return Err(Error::structural(
                src.node(root).kind(),
                start,
                format!("window {start}+{length} exceeds node length {available}"),
            ));
        }
        let node = match src.node(root) {
            LayoutNode::Flat { values } => LayoutNode::Flat {
                values: values.slice(start, length)?,
            },
            LayoutNode::ListOffset { offsets, content } => LayoutNode::ListOffset {
                offsets: offsets.slice(start, length + 1)?,
                content: self.import_full(src, *content),
            },
            LayoutNode::IndexedOption { index, content } => LayoutNode::IndexedOption {
                index: index.slice(start, length)?,
                content: self.import_full(src, *content),
            },
            LayoutNode::Record { fields, .. } => {
                let mut copied = Vec::with_capacity(fields.len());
                for (name, field) in fields {
                    copied.push((Arc::clone(name), self.import(src, *field, start, length)?));
                }
                LayoutNode::Record {
                    fields: copied,
                    length,
                }
            }
            LayoutNode::Union {
                tags,
                index,
                contents,
            } => LayoutNode::Union {
                tags: tags.slice(start, length)?,
                index: index.slice(start, length)?,
                contents: contents
                    .iter()
                    .map(|content| self.import_full(src, *content))
                    .collect(),
            },
        };
        Ok(self.push(node))
    }

    /// Copies a full subtree without windowing.
    pub fn import_full(&mut self, src: &LayoutArena, root: NodeId) -> NodeId {
        let node = match src.node(root) {
            LayoutNode::Flat { values } => LayoutNode::Flat {
                values: values.clone(),
            },
            LayoutNode::ListOffset { offsets, content } => LayoutNode::ListOffset {
                offsets: offsets.clone(),
                content: self.import_full(src, *content),
            },
            LayoutNode::IndexedOption { index, content } => LayoutNode::IndexedOption {
                index: index.clone(),
                content: self.import_full(src, *content),
            },
            LayoutNode::Record { fields, length } => LayoutNode::Record {
                fields: fields
                    .iter()
                    .map(|(name, field)| (Arc::clone(name), self.import_full(src, *field)))
                    .collect(),
                length: *length,
            },
            LayoutNode::Union {
                tags,
                index,
                contents,
            } => LayoutNode::Union {
                tags: tags.clone(),
                index: index.clone(),
                contents: contents
                    .iter()
                    .map(|content| self.import_full(src, *content))
                    .collect(),
            },
        };
        self.push(node)
    }

    /// Checks structural invariants over the `[start, start + length)` window
    /// of `root`: offset monotonicity and bounds, option index bounds, union
    /// tag and index validity. The failure identifies the offending position
    /// and the path of node kinds leading to it.
    pub fn validate(&self, root: NodeId, start: usize, length: usize) -> Result<()> {
        self.validate_at(root, start, length, String::new())
    }

    fn validate_at(&self, id: NodeId, start: usize, length: usize, path: String) -> Result<()> {
        let path = if path.is_empty() {
            self.node(id).kind().to_string()
        } else {
            format!("{path}.{}", self.node(id).kind())
        };
        let available = self.node_length(id);
        if start + length > available {
            return Err(Error::structural(
                path,
                start,
                format!("window {start}+{length} exceeds node length {available}"),
            ));
        }
        match self.node(id) {
            LayoutNode::Flat { .. } => Ok(()),
            LayoutNode::ListOffset { offsets, content } => {
                let offsets = read_offsets(offsets, &path)?;
                let content_len = self.node_length(*content) as i64;
                for i in start..start + length {
                    let (lo, hi) = (offsets[i], offsets[i + 1]);
                    if hi < lo {
                        return Err(Error::structural(
                            path,
                            i,
                            format!("offsets decrease from {lo} to {hi}"),
                        ));
                    }
                    if lo < 0 || hi > content_len {
                        return Err(Error::structural(
                            path,
                            i,
                            format!("offsets {lo}..{hi} outside content length {content_len}"),
                        ));
                    }
                }
                if length == 0 {
                    return Ok(());
                }
                let (first, last) = (offsets[start].max(0) as usize, offsets[start + length] as usize);
                self.validate_at(*content, first, last.saturating_sub(first), path)
            }
            LayoutNode::IndexedOption { index, content } => {
                let index = read_index(index, &path)?;
                let content_len = self.node_length(*content) as i64;
                for (i, &position) in index[start..start + length].iter().enumerate() {
                    if position < -1 || position >= content_len {
                        return Err(Error::structural(
                            path,
                            start + i,
                            format!("index {position} outside content length {content_len}"),
                        ));
                    }
                }
                // Indices reference arbitrary positions, so the content is
                // checked over its full extent.
                self.validate_at(*content, 0, self.node_length(*content), path)
            }
            LayoutNode::Record { fields, .. } => {
                for (_, field) in fields {
                    self.validate_at(*field, start, length, path.clone())?;
                }
                Ok(())
            }
            LayoutNode::Union {
                tags,
                index,
                contents,
            } => {
                let tags = tags.expect_slice::<i8>().map_err(|_| {
                    Error::structural(path.clone(), 0, "union tags must be int8")
                })?;
                let index = read_index(index, &path)?;
                for i in start..start + length {
                    let tag = tags[i];
                    if tag < 0 || tag as usize >= contents.len() {
                        return Err(Error::structural(
                            path,
                            i,
                            format!("tag {tag} outside {} union contents", contents.len()),
                        ));
                    }
                    let content_len = self.node_length(contents[tag as usize]) as i64;
                    if index[i] < 0 || index[i] >= content_len {
                        return Err(Error::structural(
                            path,
                            i,
                            format!(
                                "union index {} outside content length {content_len}",
                                index[i]
                            ),
                        ));
                    }
                }
                for content in contents {
                    self.validate_at(*content, 0, self.node_length(*content), path.clone())?;
                }
                Ok(())
            }
        }
    }
}

/// Reads a list-offset buffer as `i64`, enforcing the metadata dtype.
pub(crate) fn read_offsets<'a>(offsets: &'a Buffer, path: &str) -> Result<&'a [i64]> {
    if offsets.dtype() != DType::I64 {
        return Err(Error::structural(
            path.to_string(),
            0,
            format!("offsets must be int64, found {}", offsets.dtype().name()),
        ));
    }
    offsets.expect_slice::<i64>()
}

/// Reads an option or union index buffer as `i64`.
pub(crate) fn read_index<'a>(index: &'a Buffer, path: &str) -> Result<&'a [i64]> {
    if index.dtype() != DType::I64 {
        return Err(Error::structural(
            path.to_string(),
            0,
            format!("index must be int64, found {}", index.dtype().name()),
        ));
    }
    index.expect_slice::<i64>()
}
