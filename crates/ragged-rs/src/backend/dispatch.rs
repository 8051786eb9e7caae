//! Residency-based backend selection for kernel calls.

use std::sync::Arc;

use smallvec::SmallVec;

use crate::array::Buffer;
use crate::error::{Error, Result};

use super::registry;
use super::spec::{KernelBackend, KernelOp, Residency};

/// What dispatch may do when operands live in different memory spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MigrationPolicy {
    /// Move the minority of operands to the majority residency (host wins
    /// ties).
    #[default]
    ToMajority,
    /// Never move data; mixed residency is an error.
    Deny,
}

/// Selects a backend per kernel call based on operand residency tags.
#[derive(Debug, Clone, Copy, Default)]
pub struct Dispatcher {
    policy: MigrationPolicy,
}

impl Dispatcher {
    pub fn new(policy: MigrationPolicy) -> Self {
        Dispatcher { policy }
    }

    /// A dispatcher that refuses automatic migration.
    pub fn strict() -> Self {
        Dispatcher {
            policy: MigrationPolicy::Deny,
        }
    }

    /// Chooses a backend capable of serving `op` for all operands, migrating
    /// minority operands when the policy allows it.
    ///
    /// Returns the backend together with the operands, re-materialized where
    /// a migration was required.
    pub fn select(
        &self,
        op: KernelOp,
        operands: &[&Buffer],
    ) -> Result<(Arc<dyn KernelBackend>, Vec<Buffer>)> {
        let target = self.target_residency(op, operands)?;
        let backend = registry::backend_for(&target, op).ok_or_else(|| {
            Error::backend_mismatch(
                op.name(),
                format!("no registered backend supports it on `{target}`"),
            )
        })?;
        let mut migrated = Vec::with_capacity(operands.len());
        for operand in operands {
            migrated.push(migrate(operand, &backend)?);
        }
        Ok((backend, migrated))
    }

    fn target_residency(&self, op: KernelOp, operands: &[&Buffer]) -> Result<Residency> {
        let mut tallies: SmallVec<[(Residency, usize); 2]> = SmallVec::new();
        for operand in operands {
            let residency = operand.residency();
            match tallies.iter_mut().find(|(tag, _)| tag == residency) {
                Some((_, count)) => *count += 1,
                None => tallies.push((residency.clone(), 1)),
            }
        }
        match tallies.len() {
            0 => Ok(Residency::host()),
            1 => Ok(tallies[0].0.clone()),
            _ => match self.policy {
                MigrationPolicy::Deny => Err(Error::backend_mismatch(
                    op.name(),
                    format!(
                        "operands span residencies [{}] and migration is disabled",
                        tallies
                            .iter()
                            .map(|(tag, _)| tag.name())
                            .collect::<Vec<_>>()
                            .join(", ")
                    ),
                )),
                MigrationPolicy::ToMajority => {
                    let top = tallies.iter().map(|(_, count)| *count).max().unwrap_or(0);
                    let host = Residency::host();
                    // Host wins ties so migrations degrade gracefully when no
                    // accelerator majority exists.
                    if tallies.iter().any(|(tag, count)| *count == top && *tag == host) {
                        Ok(host)
                    } else {
                        Ok(tallies
                            .iter()
                            .find(|(_, count)| *count == top)
                            .map(|(tag, _)| tag.clone())
                            .unwrap_or(host))
                    }
                }
            },
        }
    }
}

/// Moves one buffer into the backend's memory space when needed.
fn migrate(buffer: &Buffer, backend: &Arc<dyn KernelBackend>) -> Result<Buffer> {
    let target = backend.residency();
    if *buffer.residency() == target {
        return Ok(buffer.clone());
    }
    if *buffer.residency() == Residency::host() {
        return backend.transfer_in(buffer);
    }
    // Route device-to-device moves through host memory.
    let source = registry::backend_for(buffer.residency(), KernelOp::Cast).ok_or_else(|| {
        Error::backend_mismatch(
            "transfer",
            format!("no backend can read buffers on `{}`", buffer.residency()),
        )
    })?;
    let host = source.transfer_to_host(buffer)?;
    if target == Residency::host() {
        Ok(host)
    } else {
        backend.transfer_in(&host)
    }
}
