//! Backend contract, registry, and residency-based dispatch.

pub mod dispatch;
pub mod registry;
pub mod spec;

pub use dispatch::{Dispatcher, MigrationPolicy};
pub use spec::{
    BinaryOp, KernelBackend, KernelOp, ReduceKind, Residency, SegmentedReduction, UnaryOp,
};
