//! Core traits for the fused kernels.
//!
//! [`FusedKernel`] is the boundary between the recurrence engines and the
//! device code. Each kernel family provides a `cubecl` launch path that works
//! on raw `CubeTensor`s and a reference path written in plain burn tensor
//! ops. [`FusedKernelBackend`] picks one per backend: every `CubeBackend`
//! launches the `cubecl` kernels, the ndarray backends run the reference.
//!
//! Unlike an autodiff op, backward here is called explicitly by the
//! recurrence engine with whatever saved state the engine chose to keep, so
//! the saved state and gradient bundles are separate associated types.

use std::fmt::Debug;

use burn::tensor::{backend::Backend, ops::FloatTensor};
use burn_cubecl::{CubeRuntime, FloatElement, tensor::CubeTensor};

use crate::bundle::TensorBundle;

/// A forward/backward pair of device kernels.
pub trait FusedKernel: 'static + Send + Debug + Clone {
    type Inputs<T: Debug + Clone + Send>: TensorBundle<T>;
    type Outputs<T: Debug + Clone + Send>: TensorBundle<T>;
    /// Tensors the backward kernel reads besides the upstream gradients.
    type SavedState<T: Debug + Clone + Send>: TensorBundle<T>;
    /// Upstream gradients w.r.t. the outputs.
    type GradOutputs<T: Debug + Clone + Send>: TensorBundle<T>;
    /// Gradients produced by the backward kernel.
    type GradInputs<T: Debug + Clone + Send>: TensorBundle<T>;
    type Config: Debug + Clone + Send;

    fn forward_launch<R: CubeRuntime, F: FloatElement>(
        inputs: Self::Inputs<CubeTensor<R>>,
        config: Self::Config,
    ) -> Self::Outputs<CubeTensor<R>>;

    fn backward_launch<R: CubeRuntime, F: FloatElement>(
        saved: Self::SavedState<CubeTensor<R>>,
        grad_outputs: Self::GradOutputs<CubeTensor<R>>,
        config: Self::Config,
    ) -> Self::GradInputs<CubeTensor<R>>;

    /// Same math as [`FusedKernel::forward_launch`] in burn tensor ops.
    fn forward_reference<B: Backend>(
        inputs: Self::Inputs<FloatTensor<B>>,
        config: Self::Config,
    ) -> Self::Outputs<FloatTensor<B>>;

    /// Same math as [`FusedKernel::backward_launch`] in burn tensor ops.
    fn backward_reference<B: Backend>(
        saved: Self::SavedState<FloatTensor<B>>,
        grad_outputs: Self::GradOutputs<FloatTensor<B>>,
        config: Self::Config,
    ) -> Self::GradInputs<FloatTensor<B>>;
}

// =============================================================================
// Backend trait
// =============================================================================

/// Backend trait for a specific kernel.
pub trait FusedKernelBackend<K: FusedKernel>: Backend {
    fn forward(inputs: K::Inputs<FloatTensor<Self>>, config: K::Config)
    -> K::Outputs<FloatTensor<Self>>;

    fn backward(
        saved: K::SavedState<FloatTensor<Self>>,
        grad_outputs: K::GradOutputs<FloatTensor<Self>>,
        config: K::Config,
    ) -> K::GradInputs<FloatTensor<Self>>;
}
