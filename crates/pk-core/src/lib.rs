//! pointkit core: batched point-cloud kernels (farthest-point sampling, ball
//! query, gather and its adjoint, three-nearest-neighbour) on an ndarray
//! tensor substrate, with an optional wgpu compute backend.

mod autograd;
mod device;
mod dtype;
mod error;
mod tensor;

pub mod ops;

#[cfg(feature = "wgpu")]
pub mod backend;

pub use crate::autograd::{BackwardNode, GradFn};
pub use crate::device::Device;
pub use crate::dtype::DType;
pub use crate::error::{PointError, Result};
pub use crate::tensor::Tensor;
