//! Shared utilities for `lnlstm_kernels`.

use burn::tensor::{Tensor, TensorPrimitive, backend::Backend, ops::FloatTensor};
use burn_backend::Shape;
use burn_cubecl::{CubeRuntime, FloatElement, ops::numeric::empty_device, tensor::CubeTensor};
use cubecl::prelude::{CubeCount, CubeDim};

/// Create an empty tensor with the same client/device as the template.
pub fn empty_like<R: CubeRuntime, F: FloatElement>(
    template: &CubeTensor<R>,
    shape: impl Into<Shape>,
) -> CubeTensor<R> {
    empty_device::<R, F>(
        template.client.clone(),
        template.device.clone(),
        shape.into(),
    )
}

/// Wrap a float primitive as a tensor of known rank.
pub fn float<B: Backend, const D: usize>(primitive: FloatTensor<B>) -> Tensor<B, D> {
    Tensor::from_primitive(TensorPrimitive::Float(primitive))
}

/// Unwrap a float tensor into its primitive.
pub fn primitive<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> FloatTensor<B> {
    tensor.into_primitive().tensor()
}

/// Logistic sigmoid in the tensor's own float dtype.
///
/// `burn::tensor::activation::sigmoid` evaluates in f32 on backends without a
/// native override, which caps f64 gates at single precision.
pub fn sigmoid<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Tensor<B, D> {
    tensor.neg().exp().add_scalar(1.0).recip()
}

/// Number of cubes needed to cover `num_elements` units of `cube_dim`.
pub fn cube_count_1d(num_elements: usize, cube_dim: CubeDim) -> CubeCount {
    CubeCount::Static((num_elements as u32).div_ceil(cube_dim.num_elems()), 1, 1)
}
