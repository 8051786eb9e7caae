pub mod cpu;

pub use cpu::CpuBackend;

/// Register the reference host backend with the global backend registry.
///
/// This function is called automatically via a static initializer, but can
/// also be called manually to ensure the backend is registered.
pub fn register_host_backend() {
    ragged_rs::backend::registry::register_backend(std::sync::Arc::new(CpuBackend::new()));
}

// Auto-register on library load
#[cfg(not(target_family = "wasm"))]
#[used]
#[link_section = ".init_array"]
static REGISTER_HOST_BACKEND: extern "C" fn() = {
    extern "C" fn register() {
        register_host_backend();
    }
    register
};
