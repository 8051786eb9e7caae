use ragged_rs::backend::Residency;
use ragged_rs::ops::value_equal;
use ragged_rs::{ArrayView, Buffer, DType};

#[test]
fn a_full_slice_equals_the_original() {
    let view = ArrayView::list_of_option_f64(&[vec![Some(1.0), None], vec![Some(3.0)]]);
    let full = view.slice(0..view.len()).unwrap();
    assert_eq!(full.type_signature(), view.type_signature());
    assert!(value_equal(&full, &view));
}

#[test]
fn materializing_a_slice_equals_a_direct_copy() {
    let buffer = Buffer::from_vec(vec![1.0f64, 2.0, 3.0, 4.0, 5.0]);
    let window = buffer.slice(1, 3).unwrap();
    let compact = window.materialize(&Residency::host()).unwrap();
    assert_eq!(compact.as_slice::<f64>().unwrap(), &[2.0, 3.0, 4.0]);
    // The copy no longer shares the original allocation.
    assert!(!Buffer::ptr_eq(&buffer, &compact));
    assert!(Buffer::ptr_eq(&buffer, &window));
}

#[test]
fn export_exposes_the_window() {
    let buffer = Buffer::from_vec(vec![10i64, 20, 30]);
    let window = buffer.slice(1, 2).unwrap();
    let export = window.export().unwrap();
    assert_eq!(export.len, 2);
    assert_eq!(export.dtype, DType::I64);
    let seen = unsafe { std::slice::from_raw_parts(export.ptr as *const i64, export.len) };
    assert_eq!(seen, &[20, 30]);
}

#[test]
fn export_refuses_non_host_buffers() {
    let device = Buffer::from_vec(vec![1.0f64])
        .materialize(&Residency::new("elsewhere"))
        .unwrap();
    assert!(device.export().is_err());
}

#[test]
fn allocate_zero_initializes() {
    let buffer = Buffer::allocate(DType::I32, 4).unwrap();
    assert_eq!(buffer.as_slice::<i32>().unwrap(), &[0, 0, 0, 0]);
    assert_eq!(buffer.residency(), &Residency::host());
}
