use burn::tensor::{Tensor, backend::Backend, ops::FloatTensor};

use super::types::{
    LayerNormConfig, LayerNormGradInputs, LayerNormGradOutputs, LayerNormInputs, LayerNormOutputs,
    LayerNormSaved,
};
use crate::util::{float, primitive};

pub(crate) fn forward<B: Backend>(
    inputs: LayerNormInputs<FloatTensor<B>>,
    config: LayerNormConfig,
) -> LayerNormOutputs<FloatTensor<B>> {
    let input = float::<B, 2>(inputs.input);
    let alpha = float::<B, 1>(inputs.alpha).unsqueeze::<2>();
    let beta = float::<B, 1>(inputs.beta).unsqueeze::<2>();

    let (var, mean) = input.clone().var_mean_bias(1);
    let inv_std = var.add_scalar(config.epsilon()).sqrt().recip();
    let output = (input - mean.clone()) * inv_std.clone() * alpha + beta;
    let stats = Tensor::cat(vec![mean, inv_std], 1);

    LayerNormOutputs {
        output: primitive(output),
        stats: primitive(stats),
    }
}

pub(crate) fn backward<B: Backend>(
    saved: LayerNormSaved<FloatTensor<B>>,
    grad_outputs: LayerNormGradOutputs<FloatTensor<B>>,
) -> LayerNormGradInputs<FloatTensor<B>> {
    let input = float::<B, 2>(saved.input);
    let alpha = float::<B, 1>(saved.alpha).unsqueeze::<2>();
    let stats = float::<B, 2>(saved.stats);
    let grad_output = float::<B, 2>(grad_outputs.output);
    let [_rows, cols] = input.dims();
    let n = cols as f64;

    let mean = stats.clone().narrow(1, 0, 1);
    let inv_std = stats.narrow(1, 1, 1);
    let x_hat = (input - mean) * inv_std.clone();

    let dn = grad_output.clone() * alpha;
    let sum_dn = dn.clone().sum_dim(1);
    let sum_dn_xhat = (dn.clone() * x_hat.clone()).sum_dim(1);
    let grad_input = (dn.mul_scalar(n) - sum_dn - x_hat.clone() * sum_dn_xhat) * inv_std.div_scalar(n);

    let grad_alpha = (grad_output.clone() * x_hat).sum_dim(0).reshape([cols]);
    let grad_beta = grad_output.sum_dim(0).reshape([cols]);

    LayerNormGradInputs {
        input: primitive(grad_input),
        alpha: primitive(grad_alpha),
        beta: primitive(grad_beta),
    }
}
