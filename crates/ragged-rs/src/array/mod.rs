//! Core array abstractions: buffers, layout descriptors, views, and types.
//!
//! The array module defines the columnar data model shared by every
//! operation. Buffers own raw storage, layout nodes describe how nested
//! variable-length structure is encoded over them, and [`ArrayView`] is the
//! immutable handle callers slice, index, and feed to the operation engine.

pub mod buffer;
pub mod dtype;
pub mod form;
pub mod layout;
pub mod types;
mod view;

pub use buffer::{Buffer, BufferData, BufferExport, Element};
pub use dtype::DType;
pub use form::{build, LayoutForm};
pub use layout::{LayoutArena, LayoutNode, NodeId};
pub use types::TypeSignature;
pub use view::{ArrayElement, ArrayView, Scalar};
