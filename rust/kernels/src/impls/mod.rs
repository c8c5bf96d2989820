//! [`FusedKernelBackend`](crate::FusedKernelBackend) implementations.
//!
//! - `cube`: every `CubeBackend` launches the `cubecl` kernels.
//! - `reference`: the ndarray backends run the tensor-op reference.

mod cube;
mod reference;
