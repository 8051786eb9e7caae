use ragged_rs::backend::{BinaryOp, KernelBackend, ReduceKind, UnaryOp};
use ragged_rs::{Buffer, DType, Error};
use ragged_rs_backend_ref_cpu::CpuBackend;

#[test]
fn binary_add_and_minimum() {
    let backend = CpuBackend::new();
    let lhs = Buffer::from_vec(vec![1.0f64, 5.0]);
    let rhs = Buffer::from_vec(vec![2.0f64, 3.0]);
    let sum = backend.binary(BinaryOp::Add, &lhs, &rhs).unwrap();
    assert_eq!(sum.as_slice::<f64>().unwrap(), &[3.0, 8.0]);
    let min = backend.binary(BinaryOp::Minimum, &lhs, &rhs).unwrap();
    assert_eq!(min.as_slice::<f64>().unwrap(), &[1.0, 3.0]);
}

#[test]
fn integer_arithmetic_wraps() {
    let backend = CpuBackend::new();
    let lhs = Buffer::from_vec(vec![i8::MAX]);
    let rhs = Buffer::from_vec(vec![1i8]);
    let sum = backend.binary(BinaryOp::Add, &lhs, &rhs).unwrap();
    assert_eq!(sum.as_slice::<i8>().unwrap(), &[i8::MIN]);
}

#[test]
fn division_by_zero_depends_on_the_dtype() {
    let backend = CpuBackend::new();
    // Integers report a kernel failure; floats follow IEEE 754.
    let int = backend.binary(
        BinaryOp::Div,
        &Buffer::from_vec(vec![1i64]),
        &Buffer::from_vec(vec![0i64]),
    );
    assert!(matches!(int, Err(Error::Execution(_))));
    let float = backend
        .binary(
            BinaryOp::Div,
            &Buffer::from_vec(vec![1.0f64]),
            &Buffer::from_vec(vec![0.0f64]),
        )
        .unwrap();
    assert!(float.as_slice::<f64>().unwrap()[0].is_infinite());
}

#[test]
fn mismatched_operands_are_rejected() {
    let backend = CpuBackend::new();
    let result = backend.binary(
        BinaryOp::Add,
        &Buffer::from_vec(vec![1.0f64]),
        &Buffer::from_vec(vec![1.0f32]),
    );
    assert!(matches!(result, Err(Error::Execution(_))));
    let result = backend.binary(
        BinaryOp::Add,
        &Buffer::from_vec(vec![1.0f64]),
        &Buffer::from_vec(vec![1.0f64, 2.0]),
    );
    assert!(matches!(result, Err(Error::Execution(_))));
}

#[test]
fn unary_neg_rejects_unsigned_values() {
    let backend = CpuBackend::new();
    let values = Buffer::from_vec(vec![1u32, 2]);
    assert!(matches!(
        backend.unary(UnaryOp::Neg, &values),
        Err(Error::Execution(_))
    ));
    let abs = backend.unary(UnaryOp::Abs, &values).unwrap();
    assert_eq!(abs.as_slice::<u32>().unwrap(), &[1, 2]);
}

#[test]
fn cast_converts_between_kinds() {
    let backend = CpuBackend::new();
    let ints = Buffer::from_vec(vec![1i64, -2, 3]);
    let floats = backend.cast(&ints, DType::F64).unwrap();
    assert_eq!(floats.as_slice::<f64>().unwrap(), &[1.0, -2.0, 3.0]);
    let bools = backend.cast(&ints, DType::Bool).unwrap();
    assert_eq!(bools.as_bools().unwrap(), &[1, 1, 1]);
    let narrowed = backend.cast(&floats, DType::I32).unwrap();
    assert_eq!(narrowed.as_slice::<i32>().unwrap(), &[1, -2, 3]);
}

#[test]
fn gather_fills_negative_positions_with_zero() {
    let backend = CpuBackend::new();
    let values = Buffer::from_vec(vec![10.0f64, 20.0, 30.0]);
    let gathered = backend.gather(&values, &[2, -1, 0]).unwrap();
    assert_eq!(gathered.as_slice::<f64>().unwrap(), &[30.0, 0.0, 10.0]);
    assert!(matches!(
        backend.gather(&values, &[3]),
        Err(Error::Execution(_))
    ));
}

#[test]
fn segmented_sum_reports_present_counts() {
    let backend = CpuBackend::new();
    let values = Buffer::from_vec(vec![1.0f64, 2.0, 3.0, 4.0]);
    let out = backend
        .segmented_reduce(ReduceKind::Sum, &values, &[0, 2, 2, 4], None)
        .unwrap();
    assert_eq!(out.values.as_slice::<f64>().unwrap(), &[3.0, 0.0, 7.0]);
    assert_eq!(out.present, vec![2, 0, 2]);
}

#[test]
fn segmented_reduce_skips_invalid_positions() {
    let backend = CpuBackend::new();
    let values = Buffer::from_vec(vec![1.0f64, 9.0, 3.0]);
    let out = backend
        .segmented_reduce(ReduceKind::Max, &values, &[0, 3], Some(&[1, 0, 1]))
        .unwrap();
    assert_eq!(out.values.as_slice::<f64>().unwrap(), &[3.0]);
    assert_eq!(out.present, vec![2]);
}

#[test]
fn segmented_sum_widens_small_integers() {
    let backend = CpuBackend::new();
    let values = Buffer::from_vec(vec![100i8, 100, 100]);
    let out = backend
        .segmented_reduce(ReduceKind::Sum, &values, &[0, 3], None)
        .unwrap();
    assert_eq!(out.values.dtype(), DType::I64);
    assert_eq!(out.values.as_slice::<i64>().unwrap(), &[300]);
}

#[test]
fn segmented_count_ignores_the_value_dtype() {
    let backend = CpuBackend::new();
    let values = Buffer::from_vec(vec![1u16, 2, 3]);
    let out = backend
        .segmented_reduce(ReduceKind::Count, &values, &[0, 1, 3], None)
        .unwrap();
    assert_eq!(out.values.as_slice::<i64>().unwrap(), &[1, 2]);
}

#[test]
fn invalid_segments_are_rejected() {
    let backend = CpuBackend::new();
    let values = Buffer::from_vec(vec![1.0f64]);
    assert!(matches!(
        backend.segmented_reduce(ReduceKind::Sum, &values, &[0, 2], None),
        Err(Error::Execution(_))
    ));
    assert!(matches!(
        backend.segmented_reduce(ReduceKind::Sum, &values, &[1, 0], None),
        Err(Error::Execution(_))
    ));
}
