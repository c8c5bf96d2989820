use burn::{backend::NdArray, tensor::ops::FloatTensor};

use crate::kernel::{FusedKernel, FusedKernelBackend};

macro_rules! impl_reference_backend {
    ($($backend:ty),+ $(,)?) => {
        $(
            impl<K: FusedKernel> FusedKernelBackend<K> for $backend {
                fn forward(
                    inputs: K::Inputs<FloatTensor<Self>>,
                    config: K::Config,
                ) -> K::Outputs<FloatTensor<Self>> {
                    K::forward_reference::<Self>(inputs, config)
                }

                fn backward(
                    saved: K::SavedState<FloatTensor<Self>>,
                    grad_outputs: K::GradOutputs<FloatTensor<Self>>,
                    config: K::Config,
                ) -> K::GradInputs<FloatTensor<Self>> {
                    K::backward_reference::<Self>(saved, grad_outputs, config)
                }
            }
        )+
    };
}

impl_reference_backend!(NdArray<f32>, NdArray<f64>);
