//! Enumerates the fixed-width element kinds carried by buffers.

use serde::{Deserialize, Serialize};

/// Logical element kind shared between buffers, type signatures, and kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    Bool,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F16,
    F32,
    F64,
}

impl DType {
    /// Returns the number of bytes required per element.
    pub fn size_in_bytes(self) -> usize {
        match self {
            DType::Bool | DType::I8 | DType::U8 => 1,
            DType::I16 | DType::U16 | DType::F16 => 2,
            DType::I32 | DType::U32 | DType::F32 => 4,
            DType::I64 | DType::U64 | DType::F64 => 8,
        }
    }

    /// Returns `true` for signed or unsigned integer kinds.
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            DType::I8
                | DType::U8
                | DType::I16
                | DType::U16
                | DType::I32
                | DType::U32
                | DType::I64
                | DType::U64
        )
    }

    /// Returns `true` for signed integer kinds.
    pub fn is_signed(self) -> bool {
        matches!(self, DType::I8 | DType::I16 | DType::I32 | DType::I64)
    }

    /// Returns `true` for floating-point kinds.
    pub fn is_float(self) -> bool {
        matches!(self, DType::F16 | DType::F32 | DType::F64)
    }

    /// Returns `true` for kinds element-wise arithmetic accepts.
    pub fn is_numeric(self) -> bool {
        self.is_integer() || self.is_float()
    }

    /// Produces a stable tag used when crossing FFI boundaries.
    pub fn tag(self) -> u32 {
        match self {
            DType::Bool => 0,
            DType::I8 => 1,
            DType::U8 => 2,
            DType::I16 => 3,
            DType::U16 => 4,
            DType::I32 => 5,
            DType::U32 => 6,
            DType::I64 => 7,
            DType::U64 => 8,
            DType::F16 => 9,
            DType::F32 => 10,
            DType::F64 => 11,
        }
    }

    /// Reconstructs a `DType` from its stable tag.
    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(DType::Bool),
            1 => Some(DType::I8),
            2 => Some(DType::U8),
            3 => Some(DType::I16),
            4 => Some(DType::U16),
            5 => Some(DType::I32),
            6 => Some(DType::U32),
            7 => Some(DType::I64),
            8 => Some(DType::U64),
            9 => Some(DType::F16),
            10 => Some(DType::F32),
            11 => Some(DType::F64),
            _ => None,
        }
    }

    /// Canonical lowercase name used by type-signature rendering.
    pub fn name(self) -> &'static str {
        match self {
            DType::Bool => "bool",
            DType::I8 => "int8",
            DType::U8 => "uint8",
            DType::I16 => "int16",
            DType::U16 => "uint16",
            DType::I32 => "int32",
            DType::U32 => "uint32",
            DType::I64 => "int64",
            DType::U64 => "uint64",
            DType::F16 => "float16",
            DType::F32 => "float32",
            DType::F64 => "float64",
        }
    }

    /// Computes the least-upper-bound kind two operands promote to.
    ///
    /// Follows NumPy-style rules: equal kinds are fixed points, integers
    /// widen, mixed signedness widens to the next signed kind, floats absorb
    /// integers (widening to `F64` when the integer does not fit), and `Bool`
    /// promotes only with itself. Returns `None` when no common kind exists.
    pub fn promote(a: DType, b: DType) -> Option<DType> {
        use DType::*;
        if a == b {
            return Some(a);
        }
        match (a, b) {
            (Bool, _) | (_, Bool) => None,
            _ if a.is_float() || b.is_float() => {
                let widest_float = match (float_rank(a), float_rank(b)) {
                    (Some(x), Some(y)) => float_from_rank(x.max(y)),
                    (Some(x), None) | (None, Some(x)) => {
                        // Integer operand: a float of equal or greater
                        // mantissa width is required, otherwise fall to F64.
                        let int = if a.is_float() { b } else { a };
                        if int_bits(int) < float_mantissa_bits(float_from_rank(x)) {
                            float_from_rank(x)
                        } else {
                            F64
                        }
                    }
                    (None, None) => unreachable!(),
                };
                Some(widest_float)
            }
            _ => promote_integers(a, b),
        }
    }
}

fn float_rank(dtype: DType) -> Option<u8> {
    match dtype {
        DType::F16 => Some(0),
        DType::F32 => Some(1),
        DType::F64 => Some(2),
        _ => None,
    }
}

fn float_from_rank(rank: u8) -> DType {
    match rank {
        0 => DType::F16,
        1 => DType::F32,
        _ => DType::F64,
    }
}

fn float_mantissa_bits(dtype: DType) -> u32 {
    match dtype {
        DType::F16 => 11,
        DType::F32 => 24,
        _ => 53,
    }
}

fn int_bits(dtype: DType) -> u32 {
    (dtype.size_in_bytes() * 8) as u32
}

fn promote_integers(a: DType, b: DType) -> Option<DType> {
    use DType::*;
    let (bits_a, bits_b) = (int_bits(a), int_bits(b));
    if a.is_signed() == b.is_signed() {
        return Some(if bits_a >= bits_b { a } else { b });
    }
    // Mixed signedness: widen to the smallest signed kind that covers the
    // unsigned operand, saturating at I64 (U64 + signed has no exact LUB in
    // this kind set, so it widens to F64 NumPy-style).
    let (signed, unsigned) = if a.is_signed() { (a, b) } else { (b, a) };
    let needed = int_bits(unsigned) * 2;
    let target_bits = needed.max(int_bits(signed));
    match target_bits {
        0..=16 => Some(I16),
        32 => Some(I32),
        64 => Some(I64),
        _ => Some(F64),
    }
}

#[cfg(test)]
mod tests {
    use super::DType;

    #[test]
    fn promotion_is_commutative() {
        let kinds = [
            DType::Bool,
            DType::I8,
            DType::U8,
            DType::I32,
            DType::U32,
            DType::I64,
            DType::U64,
            DType::F16,
            DType::F32,
            DType::F64,
        ];
        for &a in &kinds {
            for &b in &kinds {
                assert_eq!(DType::promote(a, b), DType::promote(b, a));
            }
        }
    }

    #[test]
    fn promotion_widens() {
        assert_eq!(DType::promote(DType::I32, DType::F64), Some(DType::F64));
        assert_eq!(DType::promote(DType::I8, DType::U8), Some(DType::I16));
        assert_eq!(DType::promote(DType::U32, DType::I32), Some(DType::I64));
        assert_eq!(DType::promote(DType::U64, DType::I64), Some(DType::F64));
        assert_eq!(DType::promote(DType::I64, DType::F32), Some(DType::F64));
        assert_eq!(DType::promote(DType::I8, DType::F16), Some(DType::F16));
        assert_eq!(DType::promote(DType::Bool, DType::I8), None);
    }
}
