//! Scalar reference implementation of every kernel in the backend contract.
//!
//! Correctness over speed: each kernel is a straightforward loop over typed
//! slices. Integer arithmetic wraps; integer division by zero is a kernel
//! execution error rather than a panic. `float16` values are computed
//! through `f32`.

use half::f16;

use ragged_rs::array::{Buffer, DType};
use ragged_rs::backend::spec::{
    BinaryOp, KernelBackend, KernelOp, ReduceKind, Residency, SegmentedReduction, UnaryOp,
};
use ragged_rs::error::{Error, Result};

/// Host-resident reference backend.
#[derive(Debug, Default)]
pub struct CpuBackend;

impl CpuBackend {
    pub fn new() -> Self {
        CpuBackend
    }
}

impl KernelBackend for CpuBackend {
    fn name(&self) -> &str {
        "ref-cpu"
    }

    fn residency(&self) -> Residency {
        Residency::host()
    }

    fn supports(&self, _op: KernelOp) -> bool {
        true
    }

    fn binary(&self, op: BinaryOp, lhs: &Buffer, rhs: &Buffer) -> Result<Buffer> {
        if lhs.dtype() != rhs.dtype() {
            return Err(Error::execution(format!(
                "binary kernel operands disagree on dtype ({} vs {})",
                lhs.dtype().name(),
                rhs.dtype().name()
            )));
        }
        if lhs.len() != rhs.len() {
            return Err(Error::execution(format!(
                "binary kernel operands disagree on length ({} vs {})",
                lhs.len(),
                rhs.len()
            )));
        }

        macro_rules! int_binary {
            ($ty:ty) => {{
                let a = lhs.expect_slice::<$ty>()?;
                let b = rhs.expect_slice::<$ty>()?;
                let mut out: Vec<$ty> = Vec::with_capacity(a.len());
                for (&x, &y) in a.iter().zip(b) {
                    out.push(match op {
                        BinaryOp::Add => x.wrapping_add(y),
                        BinaryOp::Sub => x.wrapping_sub(y),
                        BinaryOp::Mul => x.wrapping_mul(y),
                        BinaryOp::Div => {
                            if y == 0 {
                                return Err(Error::execution("integer division by zero"));
                            }
                            x.wrapping_div(y)
                        }
                        BinaryOp::Minimum => x.min(y),
                        BinaryOp::Maximum => x.max(y),
                    });
                }
                Buffer::from_vec(out)
            }};
        }
        macro_rules! float_binary {
            ($ty:ty) => {{
                let a = lhs.expect_slice::<$ty>()?;
                let b = rhs.expect_slice::<$ty>()?;
                let mut out: Vec<$ty> = Vec::with_capacity(a.len());
                for (&x, &y) in a.iter().zip(b) {
                    out.push(match op {
                        BinaryOp::Add => x + y,
                        BinaryOp::Sub => x - y,
                        BinaryOp::Mul => x * y,
                        BinaryOp::Div => x / y,
                        BinaryOp::Minimum => x.min(y),
                        BinaryOp::Maximum => x.max(y),
                    });
                }
                Buffer::from_vec(out)
            }};
        }

        Ok(match lhs.dtype() {
            DType::I8 => int_binary!(i8),
            DType::U8 => int_binary!(u8),
            DType::I16 => int_binary!(i16),
            DType::U16 => int_binary!(u16),
            DType::I32 => int_binary!(i32),
            DType::U32 => int_binary!(u32),
            DType::I64 => int_binary!(i64),
            DType::U64 => int_binary!(u64),
            DType::F32 => float_binary!(f32),
            DType::F64 => float_binary!(f64),
            DType::F16 => {
                let a = lhs.expect_slice::<f16>()?;
                let b = rhs.expect_slice::<f16>()?;
                let mut out: Vec<f16> = Vec::with_capacity(a.len());
                for (&x, &y) in a.iter().zip(b) {
                    let (x, y) = (x.to_f32(), y.to_f32());
                    out.push(f16::from_f32(match op {
                        BinaryOp::Add => x + y,
                        BinaryOp::Sub => x - y,
                        BinaryOp::Mul => x * y,
                        BinaryOp::Div => x / y,
                        BinaryOp::Minimum => x.min(y),
                        BinaryOp::Maximum => x.max(y),
                    }));
                }
                Buffer::from_vec(out)
            }
            DType::Bool => {
                return Err(Error::execution("binary kernels do not cover bool"));
            }
        })
    }

    fn unary(&self, op: UnaryOp, operand: &Buffer) -> Result<Buffer> {
        macro_rules! signed_unary {
            ($ty:ty) => {{
                let values = operand.expect_slice::<$ty>()?;
                let mapped: Vec<$ty> = values
                    .iter()
                    .map(|&v| match op {
                        UnaryOp::Neg => v.wrapping_neg(),
                        UnaryOp::Abs => v.wrapping_abs(),
                    })
                    .collect();
                Buffer::from_vec(mapped)
            }};
        }
        macro_rules! float_unary {
            ($ty:ty) => {{
                let values = operand.expect_slice::<$ty>()?;
                let mapped: Vec<$ty> = values
                    .iter()
                    .map(|&v| match op {
                        UnaryOp::Neg => -v,
                        UnaryOp::Abs => v.abs(),
                    })
                    .collect();
                Buffer::from_vec(mapped)
            }};
        }
        macro_rules! unsigned_unary {
            ($ty:ty) => {{
                match op {
                    UnaryOp::Neg => {
                        return Err(Error::execution(format!(
                            "cannot negate unsigned {} values",
                            operand.dtype().name()
                        )))
                    }
                    UnaryOp::Abs => {
                        let values = operand.expect_slice::<$ty>()?;
                        Buffer::from_vec(values.to_vec())
                    }
                }
            }};
        }

        Ok(match operand.dtype() {
            DType::I8 => signed_unary!(i8),
            DType::I16 => signed_unary!(i16),
            DType::I32 => signed_unary!(i32),
            DType::I64 => signed_unary!(i64),
            DType::U8 => unsigned_unary!(u8),
            DType::U16 => unsigned_unary!(u16),
            DType::U32 => unsigned_unary!(u32),
            DType::U64 => unsigned_unary!(u64),
            DType::F32 => float_unary!(f32),
            DType::F64 => float_unary!(f64),
            DType::F16 => {
                let values = operand.expect_slice::<f16>()?;
                let mapped: Vec<f16> = values
                    .iter()
                    .map(|&v| {
                        let v = v.to_f32();
                        f16::from_f32(match op {
                            UnaryOp::Neg => -v,
                            UnaryOp::Abs => v.abs(),
                        })
                    })
                    .collect();
                Buffer::from_vec(mapped)
            }
            DType::Bool => {
                return Err(Error::execution("unary kernels do not cover bool"));
            }
        })
    }

    fn cast(&self, operand: &Buffer, dtype: DType) -> Result<Buffer> {
        if operand.dtype() == dtype {
            return Ok(operand.clone());
        }
        let widened = read_as_f64(operand)?;
        write_from_f64(&widened, dtype)
    }

    fn gather(&self, values: &Buffer, index: &[i64]) -> Result<Buffer> {
        macro_rules! gather_typed {
            ($ty:ty, $zero:expr) => {{
                let source = values.expect_slice::<$ty>()?;
                let mut out: Vec<$ty> = Vec::with_capacity(index.len());
                for &at in index {
                    if at < 0 {
                        out.push($zero);
                    } else {
                        let at = at as usize;
                        if at >= source.len() {
                            return Err(Error::execution(format!(
                                "gather index {at} out of bounds for {} values",
                                source.len()
                            )));
                        }
                        out.push(source[at]);
                    }
                }
                Buffer::from_vec(out)
            }};
        }

        Ok(match values.dtype() {
            DType::I8 => gather_typed!(i8, 0),
            DType::U8 => gather_typed!(u8, 0),
            DType::I16 => gather_typed!(i16, 0),
            DType::U16 => gather_typed!(u16, 0),
            DType::I32 => gather_typed!(i32, 0),
            DType::U32 => gather_typed!(u32, 0),
            DType::I64 => gather_typed!(i64, 0),
            DType::U64 => gather_typed!(u64, 0),
            DType::F16 => gather_typed!(f16, f16::ZERO),
            DType::F32 => gather_typed!(f32, 0.0),
            DType::F64 => gather_typed!(f64, 0.0),
            DType::Bool => {
                let source = values
                    .as_bools()
                    .ok_or_else(|| Error::execution("bool buffer storage mismatch"))?;
                let mut out: Vec<bool> = Vec::with_capacity(index.len());
                for &at in index {
                    if at < 0 {
                        out.push(false);
                    } else {
                        let at = at as usize;
                        if at >= source.len() {
                            return Err(Error::execution(format!(
                                "gather index {at} out of bounds for {} values",
                                source.len()
                            )));
                        }
                        out.push(source[at] != 0);
                    }
                }
                Buffer::from_bools(&out)
            }
        })
    }

    fn segmented_reduce(
        &self,
        kind: ReduceKind,
        values: &Buffer,
        offsets: &[i64],
        validity: Option<&[u8]>,
    ) -> Result<SegmentedReduction> {
        check_segments(offsets, values.len())?;
        if let Some(validity) = validity {
            if validity.len() != values.len() {
                return Err(Error::execution(format!(
                    "validity length {} does not match {} values",
                    validity.len(),
                    values.len()
                )));
            }
        }
        let is_valid = |i: usize| validity.map(|v| v[i] != 0).unwrap_or(true);

        let segment_count = offsets.len() - 1;
        let mut present: Vec<i64> = Vec::with_capacity(segment_count);
        for window in offsets.windows(2) {
            let count = (window[0]..window[1]).filter(|&i| is_valid(i as usize)).count();
            present.push(count as i64);
        }

        if kind == ReduceKind::Count {
            return Ok(SegmentedReduction {
                values: Buffer::from_vec(present.clone()),
                present,
            });
        }

        macro_rules! fold {
            ($ty:ty, $acc:ty, $lift:expr, $lower:expr, $init:expr, $step:expr) => {{
                let source = values.expect_slice::<$ty>()?;
                let mut out: Vec<_> = Vec::with_capacity(segment_count);
                for window in offsets.windows(2) {
                    let mut acc: Option<$acc> = $init;
                    for i in window[0]..window[1] {
                        let i = i as usize;
                        if !is_valid(i) {
                            continue;
                        }
                        let v = $lift(source[i]);
                        acc = Some(match acc {
                            None => v,
                            Some(acc) => $step(acc, v),
                        });
                    }
                    out.push($lower(acc));
                }
                Buffer::from_vec(out)
            }};
        }
        // Sum widens to the 64-bit accumulator of the value's sign class;
        // Min and Max keep the input dtype. Empty segments hold the dtype's
        // zero and are masked by the caller via `present`.
        macro_rules! per_kind {
            ($ty:ty, $sum_acc:ty, $lift_sum:expr, $zero:expr) => {{
                match kind {
                    ReduceKind::Sum => fold!(
                        $ty,
                        $sum_acc,
                        $lift_sum,
                        |acc: Option<$sum_acc>| acc.unwrap_or_default(),
                        None,
                        |acc: $sum_acc, v: $sum_acc| acc.wrapping_add(v)
                    ),
                    ReduceKind::Min => fold!(
                        $ty,
                        $ty,
                        |v| v,
                        |acc: Option<$ty>| acc.unwrap_or($zero),
                        None,
                        |acc: $ty, v: $ty| acc.min(v)
                    ),
                    ReduceKind::Max => fold!(
                        $ty,
                        $ty,
                        |v| v,
                        |acc: Option<$ty>| acc.unwrap_or($zero),
                        None,
                        |acc: $ty, v: $ty| acc.max(v)
                    ),
                    ReduceKind::Count => unreachable!("handled above"),
                }
            }};
        }
        macro_rules! per_kind_float {
            ($ty:ty, $lift:expr, $zero:expr) => {{
                match kind {
                    ReduceKind::Sum => fold!(
                        $ty,
                        f64,
                        $lift,
                        |acc: Option<f64>| acc.unwrap_or(0.0),
                        None,
                        |acc: f64, v: f64| acc + v
                    ),
                    ReduceKind::Min => fold!(
                        $ty,
                        $ty,
                        |v| v,
                        |acc: Option<$ty>| acc.unwrap_or($zero),
                        None,
                        |acc: $ty, v: $ty| acc.min(v)
                    ),
                    ReduceKind::Max => fold!(
                        $ty,
                        $ty,
                        |v| v,
                        |acc: Option<$ty>| acc.unwrap_or($zero),
                        None,
                        |acc: $ty, v: $ty| acc.max(v)
                    ),
                    ReduceKind::Count => unreachable!("handled above"),
                }
            }};
        }

        let reduced = match values.dtype() {
            DType::I8 => per_kind!(i8, i64, |v| v as i64, 0),
            DType::I16 => per_kind!(i16, i64, |v| v as i64, 0),
            DType::I32 => per_kind!(i32, i64, |v| v as i64, 0),
            DType::I64 => per_kind!(i64, i64, |v| v, 0),
            DType::U8 => per_kind!(u8, u64, |v| v as u64, 0),
            DType::U16 => per_kind!(u16, u64, |v| v as u64, 0),
            DType::U32 => per_kind!(u32, u64, |v| v as u64, 0),
            DType::U64 => per_kind!(u64, u64, |v| v, 0),
            DType::F32 => per_kind_float!(f32, |v| v as f64, 0.0),
            DType::F64 => per_kind_float!(f64, |v| v, 0.0),
            DType::F16 => match kind {
                ReduceKind::Sum => fold!(
                    f16,
                    f64,
                    |v: f16| v.to_f64(),
                    |acc: Option<f64>| acc.unwrap_or(0.0),
                    None,
                    |acc: f64, v: f64| acc + v
                ),
                ReduceKind::Min => fold!(
                    f16,
                    f16,
                    |v| v,
                    |acc: Option<f16>| acc.unwrap_or(f16::ZERO),
                    None,
                    |acc: f16, v: f16| if v < acc { v } else { acc }
                ),
                ReduceKind::Max => fold!(
                    f16,
                    f16,
                    |v| v,
                    |acc: Option<f16>| acc.unwrap_or(f16::ZERO),
                    None,
                    |acc: f16, v: f16| if v > acc { v } else { acc }
                ),
                ReduceKind::Count => unreachable!("handled above"),
            },
            DType::Bool => {
                return Err(Error::execution("reduction kernels do not cover bool"));
            }
        };
        Ok(SegmentedReduction {
            values: reduced,
            present,
        })
    }

    fn transfer_in(&self, host: &Buffer) -> Result<Buffer> {
        if *host.residency() != Residency::host() {
            return Err(Error::execution(format!(
                "ref-cpu cannot import buffers resident on `{}`",
                host.residency()
            )));
        }
        Ok(host.clone())
    }

    fn transfer_to_host(&self, buffer: &Buffer) -> Result<Buffer> {
        if *buffer.residency() != Residency::host() {
            return Err(Error::execution(format!(
                "ref-cpu does not own buffers resident on `{}`",
                buffer.residency()
            )));
        }
        Ok(buffer.clone())
    }
}

fn check_segments(offsets: &[i64], len: usize) -> Result<()> {
    if offsets.is_empty() {
        return Err(Error::execution("segment offsets must not be empty"));
    }
    for window in offsets.windows(2) {
        if window[1] < window[0] {
            return Err(Error::execution(format!(
                "segment offsets decrease from {} to {}",
                window[0], window[1]
            )));
        }
    }
    let (first, last) = (offsets[0], offsets[offsets.len() - 1]);
    if first < 0 || last as usize > len {
        return Err(Error::execution(format!(
            "segments {first}..{last} outside {len} values"
        )));
    }
    Ok(())
}

/// Widens any numeric buffer to `f64` values; booleans become 0 or 1.
fn read_as_f64(operand: &Buffer) -> Result<Vec<f64>> {
    macro_rules! widen {
        ($ty:ty, $map:expr) => {
            operand.expect_slice::<$ty>()?.iter().map($map).collect()
        };
    }
    Ok(match operand.dtype() {
        DType::Bool => operand
            .as_bools()
            .ok_or_else(|| Error::execution("bool buffer storage mismatch"))?
            .iter()
            .map(|&b| (b != 0) as u8 as f64)
            .collect(),
        DType::I8 => widen!(i8, |&v| v as f64),
        DType::U8 => widen!(u8, |&v| v as f64),
        DType::I16 => widen!(i16, |&v| v as f64),
        DType::U16 => widen!(u16, |&v| v as f64),
        DType::I32 => widen!(i32, |&v| v as f64),
        DType::U32 => widen!(u32, |&v| v as f64),
        DType::I64 => widen!(i64, |&v| v as f64),
        DType::U64 => widen!(u64, |&v| v as f64),
        DType::F16 => widen!(f16, |&v| v.to_f64()),
        DType::F32 => widen!(f32, |&v| v as f64),
        DType::F64 => widen!(f64, |&v| v),
    })
}

/// Narrows `f64` values into the target kind with saturating conversions.
fn write_from_f64(widened: &[f64], dtype: DType) -> Result<Buffer> {
    macro_rules! narrow {
        ($ty:ty) => {
            Buffer::from_vec(widened.iter().map(|&v| v as $ty).collect::<Vec<$ty>>())
        };
    }
    Ok(match dtype {
        DType::Bool => {
            let bools: Vec<bool> = widened.iter().map(|&v| v != 0.0).collect();
            Buffer::from_bools(&bools)
        }
        DType::I8 => narrow!(i8),
        DType::U8 => narrow!(u8),
        DType::I16 => narrow!(i16),
        DType::U16 => narrow!(u16),
        DType::I32 => narrow!(i32),
        DType::U32 => narrow!(u32),
        DType::I64 => narrow!(i64),
        DType::U64 => narrow!(u64),
        DType::F16 => Buffer::from_vec(
            widened
                .iter()
                .map(|&v| f16::from_f64(v))
                .collect::<Vec<f16>>(),
        ),
        DType::F32 => narrow!(f32),
        DType::F64 => Buffer::from_vec(widened.to_vec()),
    })
}
