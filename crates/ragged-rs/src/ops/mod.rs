//! The operation engine: element-wise arithmetic, reductions, and structural
//! transforms over [`crate::array::ArrayView`]s.

pub mod elementwise;
pub mod reduce;
pub mod structure;

pub use elementwise::{binary, binary_with, unary, unary_with};
pub use reduce::{reduce, reduce_with, MissingPolicy, ReduceOptions};
pub use structure::{concatenate, flatten, value_equal, zip};
