//! Derived nested-type signatures and generalized-type computation.

use std::fmt;
use std::sync::Arc;

use super::dtype::DType;
use super::layout::{LayoutArena, LayoutNode, NodeId};

/// Cached description of a view's nested type, used for operation dispatch
/// and compatibility checks.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeSignature {
    Primitive(DType),
    List(Box<TypeSignature>),
    Option(Box<TypeSignature>),
    Record(Vec<(Arc<str>, TypeSignature)>),
    Union(Vec<TypeSignature>),
}

impl TypeSignature {
    /// Derives the signature of a layout subtree.
    pub fn of(arena: &LayoutArena, root: NodeId) -> TypeSignature {
        match arena.node(root) {
            LayoutNode::Flat { values } => TypeSignature::Primitive(values.dtype()),
            LayoutNode::ListOffset { content, .. } => {
                TypeSignature::List(Box::new(TypeSignature::of(arena, *content)))
            }
            LayoutNode::IndexedOption { content, .. } => {
                TypeSignature::Option(Box::new(TypeSignature::of(arena, *content)))
            }
            LayoutNode::Record { fields, .. } => TypeSignature::Record(
                fields
                    .iter()
                    .map(|(name, field)| (Arc::clone(name), TypeSignature::of(arena, *field)))
                    .collect(),
            ),
            LayoutNode::Union { contents, .. } => TypeSignature::Union(
                contents
                    .iter()
                    .map(|content| TypeSignature::of(arena, *content))
                    .collect(),
            ),
        }
    }

    /// Nesting depth down to the primitive leaf; options are transparent.
    pub fn depth(&self) -> usize {
        match self {
            TypeSignature::Primitive(_) => 1,
            TypeSignature::List(inner) => 1 + inner.depth(),
            TypeSignature::Option(inner) => inner.depth(),
            TypeSignature::Record(_) | TypeSignature::Union(_) => 1,
        }
    }

    /// Primitive leaf kind, when the signature bottoms out in one.
    pub fn primitive(&self) -> Option<DType> {
        match self {
            TypeSignature::Primitive(dtype) => Some(*dtype),
            TypeSignature::List(inner) | TypeSignature::Option(inner) => inner.primitive(),
            TypeSignature::Record(_) | TypeSignature::Union(_) => None,
        }
    }

    /// Reports whether the signature carries an option at any level.
    pub fn has_option(&self) -> bool {
        match self {
            TypeSignature::Primitive(_) => false,
            TypeSignature::Option(_) => true,
            TypeSignature::List(inner) => inner.has_option(),
            TypeSignature::Record(fields) => fields.iter().any(|(_, f)| f.has_option()),
            TypeSignature::Union(contents) => contents.iter().any(|c| c.has_option()),
        }
    }

    /// Computes the least-upper-bound type of two signatures.
    ///
    /// The LUB is the minimal common type both operands can be viewed as:
    /// options absorb their content type, lists unify recursively, primitives
    /// promote, and records unify field-wise when names agree. Returns `None`
    /// when no common type exists.
    pub fn unify(a: &TypeSignature, b: &TypeSignature) -> Option<TypeSignature> {
        use TypeSignature::*;
        match (a, b) {
            (Option(x), Option(y)) => Some(Option(Box::new(Self::unify(x, y)?))),
            (Option(x), other) | (other, Option(x)) => {
                Some(Option(Box::new(Self::unify(x, other)?)))
            }
            (Primitive(x), Primitive(y)) => Some(Primitive(DType::promote(*x, *y)?)),
            (List(x), List(y)) => Some(List(Box::new(Self::unify(x, y)?))),
            (Record(xs), Record(ys)) => {
                if xs.len() != ys.len() {
                    return None;
                }
                let mut fields = Vec::with_capacity(xs.len());
                for ((name_a, field_a), (name_b, field_b)) in xs.iter().zip(ys) {
                    if name_a != name_b {
                        return None;
                    }
                    fields.push((Arc::clone(name_a), Self::unify(field_a, field_b)?));
                }
                Some(Record(fields))
            }
            (Union(xs), Union(ys)) => {
                if xs == ys {
                    Some(Union(xs.clone()))
                } else {
                    None
                }
            }
            _ => None,
        }
    }
}

impl fmt::Display for TypeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSignature::Primitive(dtype) => f.write_str(dtype.name()),
            TypeSignature::List(inner) => write!(f, "list of {inner}"),
            TypeSignature::Option(inner) => write!(f, "option of {inner}"),
            TypeSignature::Record(fields) => {
                f.write_str("record of {")?;
                for (i, (name, field)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name}: {field}")?;
                }
                f.write_str("}")
            }
            TypeSignature::Union(contents) => {
                f.write_str("union of [")?;
                for (i, content) in contents.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{content}")?;
                }
                f.write_str("]")
            }
        }
    }
}
