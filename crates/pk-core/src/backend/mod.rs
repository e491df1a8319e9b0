#[cfg(feature = "wgpu")]
pub mod wgpu_impl;

#[cfg(feature = "wgpu")]
pub use wgpu_impl::{Backend, BackendArrayF32, BackendArrayI32, WgpuBackend};
