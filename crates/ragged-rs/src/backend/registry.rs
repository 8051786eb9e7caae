//! Runtime backend registry for residency-based selection.
//!
//! External collaborators register available backends at process startup;
//! dispatch then resolves backends by name or by the residency tag their
//! buffers carry. Registering a duplicate name replaces the previous entry.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use super::spec::{KernelBackend, KernelOp, Residency};

struct BackendRegistry {
    backends: RwLock<HashMap<String, Arc<dyn KernelBackend>>>,
}

impl BackendRegistry {
    fn new() -> Self {
        Self {
            backends: RwLock::new(HashMap::new()),
        }
    }
}

static GLOBAL_REGISTRY: OnceLock<BackendRegistry> = OnceLock::new();

fn global_registry() -> &'static BackendRegistry {
    GLOBAL_REGISTRY.get_or_init(BackendRegistry::new)
}

/// Registers a backend instance under its own name.
pub fn register_backend(backend: Arc<dyn KernelBackend>) {
    global_registry()
        .backends
        .write()
        .unwrap()
        .insert(backend.name().to_string(), backend);
}

/// Looks up a backend by name.
pub fn backend(name: &str) -> Option<Arc<dyn KernelBackend>> {
    global_registry().backends.read().unwrap().get(name).cloned()
}

/// Finds a registered backend computing in `residency` that supports `op`.
pub fn backend_for(residency: &Residency, op: KernelOp) -> Option<Arc<dyn KernelBackend>> {
    let registry = global_registry().backends.read().unwrap();
    registry
        .values()
        .find(|backend| backend.residency() == *residency && backend.supports(op))
        .cloned()
}

/// Names of all registered backends.
pub fn list_backends() -> Vec<String> {
    global_registry().backends.read().unwrap().keys().cloned().collect()
}

/// Checks whether a backend with the given name is registered.
pub fn has_backend(name: &str) -> bool {
    global_registry().backends.read().unwrap().contains_key(name)
}
