//! Reference-counted, immutable buffers of fixed-width values.
//!
//! A [`Buffer`] is the only owner of raw numeric storage in the crate. Views
//! and layout descriptors share buffers through `Arc`s; every transformation
//! is copy-on-write, so a published buffer is never mutated. Slicing adjusts
//! an element window over the shared allocation in O(1).

use std::sync::Arc;

use half::f16;

use crate::backend::spec::Residency;
use crate::error::{Error, Result};

use super::dtype::DType;

/// Typed storage variants backing a buffer.
///
/// Keeping the payload typed (rather than `Arc<[u8]>`) preserves alignment
/// for zero-copy exports and keeps kernel access safe.
#[derive(Debug, Clone)]
pub enum BufferData {
    Bool(Arc<[u8]>),
    I8(Arc<[i8]>),
    U8(Arc<[u8]>),
    I16(Arc<[i16]>),
    U16(Arc<[u16]>),
    I32(Arc<[i32]>),
    U32(Arc<[u32]>),
    I64(Arc<[i64]>),
    U64(Arc<[u64]>),
    F16(Arc<[f16]>),
    F32(Arc<[f32]>),
    F64(Arc<[f64]>),
}

impl BufferData {
    fn dtype(&self) -> DType {
        match self {
            BufferData::Bool(_) => DType::Bool,
            BufferData::I8(_) => DType::I8,
            BufferData::U8(_) => DType::U8,
            BufferData::I16(_) => DType::I16,
            BufferData::U16(_) => DType::U16,
            BufferData::I32(_) => DType::I32,
            BufferData::U32(_) => DType::U32,
            BufferData::I64(_) => DType::I64,
            BufferData::U64(_) => DType::U64,
            BufferData::F16(_) => DType::F16,
            BufferData::F32(_) => DType::F32,
            BufferData::F64(_) => DType::F64,
        }
    }

    fn len(&self) -> usize {
        match self {
            BufferData::Bool(v) => v.len(),
            BufferData::I8(v) => v.len(),
            BufferData::U8(v) => v.len(),
            BufferData::I16(v) => v.len(),
            BufferData::U16(v) => v.len(),
            BufferData::I32(v) => v.len(),
            BufferData::U32(v) => v.len(),
            BufferData::I64(v) => v.len(),
            BufferData::U64(v) => v.len(),
            BufferData::F16(v) => v.len(),
            BufferData::F32(v) => v.len(),
            BufferData::F64(v) => v.len(),
        }
    }

    fn base_ptr(&self) -> *const u8 {
        match self {
            BufferData::Bool(v) => v.as_ptr() as *const u8,
            BufferData::I8(v) => v.as_ptr() as *const u8,
            BufferData::U8(v) => v.as_ptr() as *const u8,
            BufferData::I16(v) => v.as_ptr() as *const u8,
            BufferData::U16(v) => v.as_ptr() as *const u8,
            BufferData::I32(v) => v.as_ptr() as *const u8,
            BufferData::U32(v) => v.as_ptr() as *const u8,
            BufferData::I64(v) => v.as_ptr() as *const u8,
            BufferData::U64(v) => v.as_ptr() as *const u8,
            BufferData::F16(v) => v.as_ptr() as *const u8,
            BufferData::F32(v) => v.as_ptr() as *const u8,
            BufferData::F64(v) => v.as_ptr() as *const u8,
        }
    }
}

/// Scalar types storable in buffers.
pub trait Element: Copy + Send + Sync + 'static {
    const DTYPE: DType;

    fn wrap(values: Arc<[Self]>) -> BufferData;
    fn unwrap(data: &BufferData) -> Option<&[Self]>;
}

macro_rules! impl_element {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl Element for $ty {
                const DTYPE: DType = DType::$variant;

                fn wrap(values: Arc<[Self]>) -> BufferData {
                    BufferData::$variant(values)
                }

                fn unwrap(data: &BufferData) -> Option<&[Self]> {
                    match data {
                        BufferData::$variant(values) => Some(values),
                        _ => None,
                    }
                }
            }
        )*
    };
}

impl_element! {
    i8 => I8,
    u8 => U8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
    f16 => F16,
    f32 => F32,
    f64 => F64,
}

/// Zero-copy interop descriptor for a host-resident buffer.
#[derive(Debug, Clone, Copy)]
pub struct BufferExport {
    /// Pointer to the first element of the buffer window.
    pub ptr: *const u8,
    /// Number of elements in the window.
    pub len: usize,
    /// Element kind of the exposed values.
    pub dtype: DType,
}

/// An owned, reference-counted, contiguous block of fixed-width values.
///
/// `offset` and `len` describe the element window this handle exposes over
/// the shared allocation; slicing the same storage keeps a stable ownership
/// handle (`ptr_eq` holds between slices).
#[derive(Debug, Clone)]
pub struct Buffer {
    data: BufferData,
    offset: usize,
    len: usize,
    residency: Residency,
}

impl Buffer {
    /// Wraps an owned vector as a host-resident buffer without copying.
    pub fn from_vec<T: Element>(values: Vec<T>) -> Self {
        let len = values.len();
        Buffer {
            data: T::wrap(Arc::from(values.into_boxed_slice())),
            offset: 0,
            len,
            residency: Residency::host(),
        }
    }

    /// Wraps boolean values using their byte representation.
    pub fn from_bools(values: &[bool]) -> Self {
        let bytes: Vec<u8> = values.iter().map(|&b| b as u8).collect();
        Buffer {
            len: bytes.len(),
            data: BufferData::Bool(Arc::from(bytes.into_boxed_slice())),
            offset: 0,
            residency: Residency::host(),
        }
    }

    /// Returns a zero-initialized host buffer of the requested kind.
    ///
    /// A failed reservation reports [`Error::OutOfMemory`] without leaving
    /// partially-initialized state observable.
    pub fn allocate(dtype: DType, len: usize) -> Result<Self> {
        macro_rules! zeroed {
            ($ty:ty, $zero:expr) => {{
                let mut values: Vec<$ty> = Vec::new();
                values.try_reserve_exact(len).map_err(|_| Error::OutOfMemory {
                    bytes: len.saturating_mul(dtype.size_in_bytes()),
                })?;
                values.resize(len, $zero);
                Buffer::from_vec(values)
            }};
        }
        Ok(match dtype {
            DType::Bool => {
                let mut bytes: Vec<u8> = Vec::new();
                bytes.try_reserve_exact(len).map_err(|_| Error::OutOfMemory { bytes: len })?;
                bytes.resize(len, 0);
                Buffer {
                    len,
                    data: BufferData::Bool(Arc::from(bytes.into_boxed_slice())),
                    offset: 0,
                    residency: Residency::host(),
                }
            }
            DType::I8 => zeroed!(i8, 0),
            DType::U8 => zeroed!(u8, 0),
            DType::I16 => zeroed!(i16, 0),
            DType::U16 => zeroed!(u16, 0),
            DType::I32 => zeroed!(i32, 0),
            DType::U32 => zeroed!(u32, 0),
            DType::I64 => zeroed!(i64, 0),
            DType::U64 => zeroed!(u64, 0),
            DType::F16 => zeroed!(f16, f16::ZERO),
            DType::F32 => zeroed!(f32, 0.0),
            DType::F64 => zeroed!(f64, 0.0),
        })
    }

    /// Rebuilds a buffer around existing storage with an explicit residency.
    ///
    /// Used by backends when producing kernel outputs that live in their own
    /// memory space.
    pub fn from_data(data: BufferData, residency: Residency) -> Self {
        let len = data.len();
        Buffer {
            data,
            offset: 0,
            len,
            residency,
        }
    }

    /// Element kind of the stored values.
    pub fn dtype(&self) -> DType {
        self.data.dtype()
    }

    /// Number of elements in this buffer window.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Reports whether the window is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Memory space currently holding the values.
    pub fn residency(&self) -> &Residency {
        &self.residency
    }

    /// Returns a window over the same storage without copying.
    pub fn slice(&self, start: usize, len: usize) -> Result<Buffer> {
        if start
            .checked_add(len)
            .map(|end| end > self.len)
            .unwrap_or(true)
        {
            return Err(Error::structural(
                "buffer",
                start,
                format!("slice {start}+{len} exceeds buffer length {}", self.len),
            ));
        }
        Ok(Buffer {
            data: self.data.clone(),
            offset: self.offset + start,
            len,
            residency: self.residency.clone(),
        })
    }

    /// Borrows the window as a typed slice when the element type matches.
    pub fn as_slice<T: Element>(&self) -> Option<&[T]> {
        T::unwrap(&self.data).map(|values| &values[self.offset..self.offset + self.len])
    }

    /// Borrows the window as a typed slice, reporting execution failure on a
    /// kind mismatch. Used by kernels after dtype checks.
    pub fn expect_slice<T: Element>(&self) -> Result<&[T]> {
        self.as_slice::<T>().ok_or_else(|| {
            Error::execution(format!(
                "buffer holds {} values, expected {}",
                self.dtype().name(),
                T::DTYPE.name()
            ))
        })
    }

    /// Borrows boolean storage as raw bytes.
    pub fn as_bools(&self) -> Option<&[u8]> {
        match &self.data {
            BufferData::Bool(values) => Some(&values[self.offset..self.offset + self.len]),
            _ => None,
        }
    }

    /// Forces a compact copy of the window, optionally changing residency.
    ///
    /// The result always starts at offset zero with exact length, so a
    /// `materialize` of a slice equals a direct copy of the sliced range.
    pub fn materialize(&self, target: &Residency) -> Result<Buffer> {
        macro_rules! compact {
            ($variant:ident, $values:expr) => {{
                let window = &$values[self.offset..self.offset + self.len];
                let mut copy = Vec::new();
                copy.try_reserve_exact(window.len())
                    .map_err(|_| Error::OutOfMemory {
                        bytes: window.len().saturating_mul(self.dtype().size_in_bytes()),
                    })?;
                copy.extend_from_slice(window);
                BufferData::$variant(Arc::from(copy.into_boxed_slice()))
            }};
        }
        let data = match &self.data {
            BufferData::Bool(v) => compact!(Bool, v),
            BufferData::I8(v) => compact!(I8, v),
            BufferData::U8(v) => compact!(U8, v),
            BufferData::I16(v) => compact!(I16, v),
            BufferData::U16(v) => compact!(U16, v),
            BufferData::I32(v) => compact!(I32, v),
            BufferData::U32(v) => compact!(U32, v),
            BufferData::I64(v) => compact!(I64, v),
            BufferData::U64(v) => compact!(U64, v),
            BufferData::F16(v) => compact!(F16, v),
            BufferData::F32(v) => compact!(F32, v),
            BufferData::F64(v) => compact!(F64, v),
        };
        Ok(Buffer {
            data,
            offset: 0,
            len: self.len,
            residency: target.clone(),
        })
    }

    /// Exposes the window for zero-copy interop with host numeric arrays.
    ///
    /// Only host-resident buffers may be exported; the pointer stays valid
    /// for as long as any clone of this buffer is alive.
    pub fn export(&self) -> Result<BufferExport> {
        if self.residency != Residency::host() {
            return Err(Error::execution(format!(
                "cannot export buffer resident on `{}`",
                self.residency.name()
            )));
        }
        let elem = self.dtype().size_in_bytes();
        // Safety of downstream reads relies on the window bound checked at
        // construction time.
        let ptr = unsafe { self.data.base_ptr().add(self.offset * elem) };
        Ok(BufferExport {
            ptr,
            len: self.len,
            dtype: self.dtype(),
        })
    }

    /// Reports whether two buffers share the same underlying allocation.
    pub fn ptr_eq(a: &Buffer, b: &Buffer) -> bool {
        a.data.base_ptr() == b.data.base_ptr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slices_share_storage() {
        let buffer = Buffer::from_vec(vec![1.0f64, 2.0, 3.0, 4.0]);
        let window = buffer.slice(1, 2).unwrap();
        assert!(Buffer::ptr_eq(&buffer, &window));
        assert_eq!(window.as_slice::<f64>().unwrap(), &[2.0, 3.0]);
    }

    #[test]
    fn oversized_reservation_is_reported() {
        let result = Buffer::allocate(DType::F64, usize::MAX / 16);
        assert!(matches!(result, Err(Error::OutOfMemory { .. })));
    }

    #[test]
    fn reservation_failure_saturates_the_byte_count() {
        let result = Buffer::allocate(DType::F64, usize::MAX);
        match result {
            Err(Error::OutOfMemory { bytes }) => assert_eq!(bytes, usize::MAX),
            other => panic!("expected an out-of-memory error, got {other:?}"),
        }
    }
}
