//! Kernel contract implemented by compute backends.
//!
//! The operation engine lowers every array operation to a small set of flat
//! kernels over leaf buffers; layout metadata (offsets, indices, tags) stays
//! host-side. A backend owns one memory space, named by its [`Residency`]
//! tag, and advertises the kernels it can serve through a capability check.

use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::array::{Buffer, DType};
use crate::error::Result;

/// Interned tag naming the memory space a buffer resides in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Residency(Arc<str>);

static HOST: Lazy<Residency> = Lazy::new(|| Residency(Arc::from("host")));

impl Residency {
    pub fn new(name: impl Into<String>) -> Self {
        Residency(Arc::from(name.into()))
    }

    /// The built-in host memory space.
    pub fn host() -> Self {
        HOST.clone()
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Residency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Element-wise binary kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Minimum,
    Maximum,
}

/// Element-wise unary kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Abs,
}

/// Reduction families served by the segmented-reduce kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReduceKind {
    Sum,
    Min,
    Max,
    Count,
}

/// Identifies a kernel for capability checks and dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelOp {
    Binary(BinaryOp),
    Unary(UnaryOp),
    Cast,
    Gather,
    SegmentedReduce(ReduceKind),
}

impl KernelOp {
    /// Stable kernel name used in dispatch errors.
    pub fn name(self) -> &'static str {
        match self {
            KernelOp::Binary(BinaryOp::Add) => "add",
            KernelOp::Binary(BinaryOp::Sub) => "sub",
            KernelOp::Binary(BinaryOp::Mul) => "mul",
            KernelOp::Binary(BinaryOp::Div) => "div",
            KernelOp::Binary(BinaryOp::Minimum) => "minimum",
            KernelOp::Binary(BinaryOp::Maximum) => "maximum",
            KernelOp::Unary(UnaryOp::Neg) => "neg",
            KernelOp::Unary(UnaryOp::Abs) => "abs",
            KernelOp::Cast => "cast",
            KernelOp::Gather => "gather",
            KernelOp::SegmentedReduce(ReduceKind::Sum) => "segmented_sum",
            KernelOp::SegmentedReduce(ReduceKind::Min) => "segmented_min",
            KernelOp::SegmentedReduce(ReduceKind::Max) => "segmented_max",
            KernelOp::SegmentedReduce(ReduceKind::Count) => "segmented_count",
        }
    }
}

/// Per-segment reduction output.
pub struct SegmentedReduction {
    /// One reduced value per segment. Segments with no contributing element
    /// hold the kind's identity and must be masked by the caller using
    /// `present`.
    pub values: Buffer,
    /// Number of contributing (valid) elements per segment.
    pub present: Vec<i64>,
}

/// Compute backend operating on flat leaf buffers.
///
/// Implementations are registered once at process startup and shared behind
/// `Arc`s; every method is immutable and safe to call concurrently.
/// Transfers are synchronous: when a method returns, dependent kernels may
/// run immediately on its output.
pub trait KernelBackend: Send + Sync + std::fmt::Debug {
    /// Human-readable backend identifier (e.g. `"ref-cpu"`).
    fn name(&self) -> &str;

    /// Memory space this backend computes in.
    fn residency(&self) -> Residency;

    /// Capability check consulted by dispatch before selection.
    fn supports(&self, op: KernelOp) -> bool;

    /// Element-wise binary kernel over two equal-length, equal-dtype buffers.
    fn binary(&self, op: BinaryOp, lhs: &Buffer, rhs: &Buffer) -> Result<Buffer>;

    /// Element-wise unary kernel.
    fn unary(&self, op: UnaryOp, operand: &Buffer) -> Result<Buffer>;

    /// Converts a buffer to another element kind.
    fn cast(&self, operand: &Buffer, dtype: DType) -> Result<Buffer>;

    /// Gathers `values[index[i]]` per position; a negative index yields the
    /// dtype's zero (used to compact option projections).
    fn gather(&self, values: &Buffer, index: &[i64]) -> Result<Buffer>;

    /// Reduces each `offsets[i]..offsets[i + 1]` segment of `values`,
    /// skipping positions whose `validity` byte is zero when provided.
    fn segmented_reduce(
        &self,
        kind: ReduceKind,
        values: &Buffer,
        offsets: &[i64],
        validity: Option<&[u8]>,
    ) -> Result<SegmentedReduction>;

    /// Copies a host buffer into this backend's memory space.
    fn transfer_in(&self, host: &Buffer) -> Result<Buffer>;

    /// Copies one of this backend's buffers back to host memory.
    fn transfer_to_host(&self, buffer: &Buffer) -> Result<Buffer>;
}
