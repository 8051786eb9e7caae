//! Columnar containers for nested, variable-length data.
//!
//! Arrays are described by layout descriptors (flat values, list offsets,
//! option indices, records, unions) over shared immutable buffers. The
//! [`ArrayView`] handle slices and indexes in O(1); the operation engine in
//! [`ops`] provides broadcasting arithmetic, segmented reductions, and
//! structural transforms, all lowered onto pluggable compute backends
//! registered through [`backend`].

pub mod array;
pub mod backend;
pub mod error;
pub mod ops;

pub use array::{ArrayElement, ArrayView, Buffer, DType, LayoutForm, Scalar, TypeSignature};
pub use backend::{Dispatcher, KernelBackend, MigrationPolicy, Residency};
pub use error::{Error, Result};
pub use ops::{MissingPolicy, ReduceOptions};
