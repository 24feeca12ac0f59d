//! Backend selection
//!
//! Enable the desired backend via feature flags:
//!
//! - `ndarray`: CPU backend using ndarray (default)
//! - `wgpu`: WebGPU backend (cross-platform GPU support)
//!
//! Training wraps the backend in [`burn::backend::Autodiff`]; see
//! [`TrainBackend`].

#[cfg(feature = "ndarray")]
pub use burn_ndarray::{NdArray, NdArrayDevice};

#[cfg(feature = "wgpu")]
pub use burn_wgpu::{Wgpu, WgpuDevice};

/// Type alias for the default backend when using ndarray feature
#[cfg(feature = "ndarray")]
pub type DefaultBackend = NdArray;

/// Type alias for the default backend when using wgpu feature
#[cfg(all(feature = "wgpu", not(feature = "ndarray")))]
pub type DefaultBackend = Wgpu;

/// Default backend with gradients
#[cfg(any(feature = "ndarray", feature = "wgpu"))]
pub type TrainBackend = burn::backend::Autodiff<DefaultBackend>;

/// Get the default device for the enabled backend
#[cfg(feature = "ndarray")]
pub fn default_device() -> NdArrayDevice {
    NdArrayDevice::default()
}

/// Get the default device for the enabled backend
#[cfg(all(feature = "wgpu", not(feature = "ndarray")))]
pub fn default_device() -> WgpuDevice {
    WgpuDevice::default()
}

/// Name of the backend selected at compile time
pub fn backend_name() -> &'static str {
    if cfg!(feature = "ndarray") {
        "ndarray"
    } else if cfg!(feature = "wgpu") {
        "wgpu"
    } else {
        "none"
    }
}
