//! Layer normalization over the `4H` gate axis, with cached row statistics.

use burn::tensor::{Tensor, backend::Backend};
use lnlstm_kernels::{
    FusedKernelBackend, LayerNormConfig, LayerNormGradOutputs, LayerNormInputs, LayerNormKernel,
    LayerNormSaved,
    util::{float, primitive},
};

/// Scale/shift gradients for one normalization, accumulated across calls.
#[derive(Clone, Debug)]
pub struct NormGradients<B: Backend> {
    pub alpha: Tensor<B, 1>,
    pub beta: Tensor<B, 1>,
}

impl<B: Backend> NormGradients<B> {
    #[must_use]
    pub fn zeros(width: usize, device: &B::Device) -> Self {
        Self {
            alpha: Tensor::zeros([width], device),
            beta: Tensor::zeros([width], device),
        }
    }
}

/// One layer normalization with its own `alpha`/`beta` row.
///
/// `forward` returns the normalized rows and a `[rows, 2]` cache of
/// `(mean, inverse_stddev)`. `backward` must be given that same cache.
#[derive(Clone, Debug)]
pub struct LayerNormTransform<B: Backend> {
    alpha: Tensor<B, 1>,
    beta: Tensor<B, 1>,
    config: LayerNormConfig,
}

impl<B: FusedKernelBackend<LayerNormKernel>> LayerNormTransform<B> {
    #[must_use]
    pub fn new(alpha: Tensor<B, 1>, beta: Tensor<B, 1>, config: LayerNormConfig) -> Self {
        Self {
            alpha,
            beta,
            config,
        }
    }

    /// Use row `row` of `[2, 4H]` parameter matrices.
    #[must_use]
    pub fn from_params(
        alpha: &Tensor<B, 2>,
        beta: &Tensor<B, 2>,
        row: usize,
        config: LayerNormConfig,
    ) -> Self {
        let [_, width] = alpha.dims();
        Self::new(
            alpha.clone().narrow(0, row, 1).reshape([width]),
            beta.clone().narrow(0, row, 1).reshape([width]),
            config,
        )
    }

    pub fn forward(&self, input: Tensor<B, 2>) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let outputs = B::forward(
            LayerNormInputs {
                input: primitive(input),
                alpha: primitive(self.alpha.clone()),
                beta: primitive(self.beta.clone()),
            },
            self.config,
        );
        (float(outputs.output), float(outputs.stats))
    }

    /// Recover the normalized rows from the un-normalized input and its cached
    /// statistics.
    pub fn reapply(&self, input: Tensor<B, 2>, stats: Tensor<B, 2>) -> Tensor<B, 2> {
        let mean = stats.clone().narrow(1, 0, 1);
        let inv_std = stats.narrow(1, 1, 1);
        (input - mean) * inv_std * self.alpha.clone().unsqueeze::<2>()
            + self.beta.clone().unsqueeze::<2>()
    }

    /// Gradient w.r.t. `input`. Scale/shift gradients are added into `grads`.
    pub fn backward(
        &self,
        input: Tensor<B, 2>,
        stats: Tensor<B, 2>,
        grad_output: Tensor<B, 2>,
        grads: &mut NormGradients<B>,
    ) -> Tensor<B, 2> {
        let result = B::backward(
            LayerNormSaved {
                input: primitive(input),
                alpha: primitive(self.alpha.clone()),
                stats: primitive(stats),
            },
            LayerNormGradOutputs {
                output: primitive(grad_output),
            },
            self.config,
        );
        grads.alpha = grads.alpha.clone() + float::<B, 1>(result.alpha);
        grads.beta = grads.beta.clone() + float::<B, 1>(result.beta);
        float(result.input)
    }
}

#[cfg(test)]
mod tests {
    use burn::tensor::{Distribution, Tensor};

    use super::*;
    use crate::{
        ReferenceAutodiffBackend, ReferenceBackend,
        test_utils::{assert_data_close, reference_layer_norm, to_vec},
    };

    fn transform(width: usize) -> LayerNormTransform<ReferenceBackend> {
        let device = Default::default();
        LayerNormTransform::new(
            Tensor::random([width], Distribution::Normal(1.0, 0.2), &device),
            Tensor::random([width], Distribution::Normal(0.0, 0.2), &device),
            LayerNormConfig::new(1e-5),
        )
    }

    #[test]
    fn reapply_matches_forward() {
        let device = Default::default();
        let ln = transform(8);
        let input = Tensor::<ReferenceBackend, 2>::random([6, 8], Distribution::Default, &device);

        let (normalized, stats) = ln.forward(input.clone());
        let recovered = ln.reapply(input, stats);

        assert_data_close(&to_vec(recovered), &to_vec(normalized), 1e-12, 1e-12, "reapply");
    }

    #[test]
    fn backward_accumulates_parameter_gradients() {
        let device = Default::default();
        let ln = transform(4);
        let input = Tensor::<ReferenceBackend, 2>::random([3, 4], Distribution::Default, &device);
        let grad = Tensor::<ReferenceBackend, 2>::random([3, 4], Distribution::Default, &device);
        let (_, stats) = ln.forward(input.clone());

        let mut once = NormGradients::zeros(4, &device);
        ln.backward(input.clone(), stats.clone(), grad.clone(), &mut once);
        let mut twice = NormGradients::zeros(4, &device);
        ln.backward(input.clone(), stats.clone(), grad.clone(), &mut twice);
        ln.backward(input, stats, grad, &mut twice);

        assert_data_close(
            &to_vec(twice.alpha),
            &to_vec(once.alpha.mul_scalar(2.0)),
            1e-12,
            1e-12,
            "alpha",
        );
        assert_data_close(
            &to_vec(twice.beta),
            &to_vec(once.beta.mul_scalar(2.0)),
            1e-12,
            1e-12,
            "beta",
        );
    }

    #[test]
    fn backward_matches_autodiff() {
        let device = Default::default();
        let ln = transform(12);
        let input = Tensor::<ReferenceBackend, 2>::random([5, 12], Distribution::Default, &device);
        let grad = Tensor::<ReferenceBackend, 2>::random([5, 12], Distribution::Default, &device);

        let (_, stats) = ln.forward(input.clone());
        let mut grads = NormGradients::zeros(12, &device);
        let d_input = ln.backward(input.clone(), stats, grad.clone(), &mut grads);

        let ad_input =
            Tensor::<ReferenceAutodiffBackend, 2>::from_data(input.to_data(), &device).require_grad();
        let ad_alpha =
            Tensor::<ReferenceAutodiffBackend, 1>::from_data(ln.alpha.to_data(), &device)
                .require_grad();
        let ad_beta = Tensor::<ReferenceAutodiffBackend, 1>::from_data(ln.beta.to_data(), &device)
            .require_grad();
        let ad_grad = Tensor::<ReferenceAutodiffBackend, 2>::from_data(grad.to_data(), &device);

        let output = reference_layer_norm(ad_input.clone(), ad_alpha.clone(), ad_beta.clone(), 1e-5);
        let autodiff_grads = (output * ad_grad).sum().backward();

        let expected_input = ad_input.grad(&autodiff_grads).unwrap();
        let expected_alpha = ad_alpha.grad(&autodiff_grads).unwrap();
        let expected_beta = ad_beta.grad(&autodiff_grads).unwrap();

        // Autodiff reaches d_input through mean_dim, the squared deviations and
        // the x^-0.5 power; the closed form differs from it by up to ~6e-8.
        assert_data_close(&to_vec(d_input), &to_vec(expected_input), 1e-6, 2e-7, "d_input");
        assert_data_close(&to_vec(grads.alpha), &to_vec(expected_alpha), 1e-8, 1e-10, "d_alpha");
        assert_data_close(&to_vec(grads.beta), &to_vec(expected_beta), 1e-8, 1e-10, "d_beta");
    }
}
