use std::sync::Arc;

use ragged_rs::backend::registry::{backend, has_backend, list_backends, register_backend};
use ragged_rs::backend::spec::SegmentedReduction;
use ragged_rs::backend::{
    BinaryOp, Dispatcher, KernelBackend, KernelOp, ReduceKind, Residency, UnaryOp,
};
use ragged_rs::{Buffer, DType, Error, Result};
use ragged_rs_backend_ref_cpu::CpuBackend;

const DEVICE: &str = "unit-device";

/// Fake accelerator: runs every kernel on the reference implementation but
/// tags its buffers with a non-host residency.
#[derive(Debug)]
struct DeviceStub {
    inner: CpuBackend,
}

impl DeviceStub {
    fn new() -> Self {
        DeviceStub {
            inner: CpuBackend::new(),
        }
    }

    fn residency_tag() -> Residency {
        Residency::new(DEVICE)
    }
}

impl KernelBackend for DeviceStub {
    fn name(&self) -> &str {
        "unit-device-stub"
    }

    fn residency(&self) -> Residency {
        Self::residency_tag()
    }

    fn supports(&self, _op: KernelOp) -> bool {
        true
    }

    fn binary(&self, op: BinaryOp, lhs: &Buffer, rhs: &Buffer) -> Result<Buffer> {
        let out = self.inner.binary(op, lhs, rhs)?;
        out.materialize(&Self::residency_tag())
    }

    fn unary(&self, op: UnaryOp, operand: &Buffer) -> Result<Buffer> {
        let out = self.inner.unary(op, operand)?;
        out.materialize(&Self::residency_tag())
    }

    fn cast(&self, operand: &Buffer, dtype: DType) -> Result<Buffer> {
        let out = self.inner.cast(operand, dtype)?;
        out.materialize(&Self::residency_tag())
    }

    fn gather(&self, values: &Buffer, index: &[i64]) -> Result<Buffer> {
        let out = self.inner.gather(values, index)?;
        out.materialize(&Self::residency_tag())
    }

    fn segmented_reduce(
        &self,
        kind: ReduceKind,
        values: &Buffer,
        offsets: &[i64],
        validity: Option<&[u8]>,
    ) -> Result<SegmentedReduction> {
        let out = self.inner.segmented_reduce(kind, values, offsets, validity)?;
        Ok(SegmentedReduction {
            values: out.values.materialize(&Self::residency_tag())?,
            present: out.present,
        })
    }

    fn transfer_in(&self, host: &Buffer) -> Result<Buffer> {
        host.materialize(&Self::residency_tag())
    }

    fn transfer_to_host(&self, buffer: &Buffer) -> Result<Buffer> {
        buffer.materialize(&Residency::host())
    }
}

fn setup() {
    ragged_rs_backend_ref_cpu::register_host_backend();
    if !has_backend("unit-device-stub") {
        register_backend(Arc::new(DeviceStub::new()));
    }
}

fn device_buffer(values: Vec<f64>) -> Buffer {
    Buffer::from_vec(values)
        .materialize(&DeviceStub::residency_tag())
        .unwrap()
}

#[test]
fn registry_resolves_backends_by_name() {
    setup();
    assert!(has_backend("ref-cpu"));
    assert!(list_backends().contains(&"ref-cpu".to_string()));
    assert_eq!(backend("ref-cpu").unwrap().name(), "ref-cpu");
    assert!(backend("nonexistent").is_none());
}

#[test]
fn uniform_residency_selects_the_matching_backend() {
    setup();
    let lhs = device_buffer(vec![1.0, 2.0]);
    let rhs = device_buffer(vec![10.0, 20.0]);
    let dispatcher = Dispatcher::default();
    let (selected, operands) = dispatcher
        .select(KernelOp::Binary(BinaryOp::Add), &[&lhs, &rhs])
        .unwrap();
    assert_eq!(selected.name(), "unit-device-stub");
    assert!(operands
        .iter()
        .all(|b| b.residency().name() == DEVICE));
}

#[test]
fn ties_migrate_to_the_host_side() {
    setup();
    let host = Buffer::from_vec(vec![1.0f64, 2.0]);
    let device = device_buffer(vec![10.0, 20.0]);
    let dispatcher = Dispatcher::default();
    let (selected, operands) = dispatcher
        .select(KernelOp::Binary(BinaryOp::Add), &[&host, &device])
        .unwrap();
    assert_eq!(selected.name(), "ref-cpu");
    assert!(operands
        .iter()
        .all(|b| *b.residency() == Residency::host()));
    // Migration is a copy: the moved operand carries the same values.
    assert_eq!(operands[1].as_slice::<f64>().unwrap(), &[10.0, 20.0]);
}

#[test]
fn the_device_majority_wins() {
    setup();
    let host = Buffer::from_vec(vec![1.0f64]);
    let a = device_buffer(vec![2.0]);
    let b = device_buffer(vec![3.0]);
    let dispatcher = Dispatcher::default();
    let (selected, operands) = dispatcher
        .select(KernelOp::Gather, &[&a, &b, &host])
        .unwrap();
    assert_eq!(selected.name(), "unit-device-stub");
    assert!(operands
        .iter()
        .all(|buffer| buffer.residency().name() == DEVICE));
}

#[test]
fn strict_dispatch_refuses_mixed_residency() {
    setup();
    let host = Buffer::from_vec(vec![1.0f64]);
    let device = device_buffer(vec![2.0]);
    let result = Dispatcher::strict().select(KernelOp::Binary(BinaryOp::Add), &[&host, &device]);
    match result {
        Err(Error::BackendMismatch { reason, .. }) => {
            assert!(reason.contains("migration is disabled"), "reason: {reason}");
        }
        other => panic!("expected a backend mismatch, got {other:?}"),
    }
}

#[test]
fn operations_run_end_to_end_on_device_views() {
    setup();
    // A view whose leaf buffer lives on the fake device still adds fine:
    // dispatch routes the kernel to the device backend.
    use ragged_rs::array::{LayoutArena, LayoutNode};
    use ragged_rs::ops::{binary, value_equal};
    use ragged_rs::ArrayView;

    let mut arena = LayoutArena::new();
    let root = arena.push(LayoutNode::Flat {
        values: device_buffer(vec![1.0, 2.0]),
    });
    let lhs = ArrayView::from_arena(Arc::new(arena), root);
    let rhs = ArrayView::from_f64(vec![10.0, 20.0]);
    let sum = binary(BinaryOp::Add, &lhs, &rhs).unwrap();
    assert!(value_equal(&sum, &ArrayView::from_f64(vec![11.0, 22.0])));
}
