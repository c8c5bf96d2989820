use cubecl::prelude::*;

use super::types::LayerNormConfig;

/// Normalizes one row per unit.
///
/// - input, output: [rows, cols], contiguous
/// - alpha, beta: [cols]
/// - stats: [rows, 2] as (mean, inverse_stddev)
#[cube(launch, launch_unchecked)]
pub fn layer_norm_forward_kernel<F: Float>(
    input: &Tensor<F>,
    alpha: &Tensor<F>,
    beta: &Tensor<F>,
    output: &mut Tensor<F>,
    stats: &mut Tensor<F>,
    #[comptime] config: LayerNormConfig,
) {
    let row = ABSOLUTE_POS;
    let rows = input.shape(0);
    let cols = input.shape(1);
    let epsilon = config.epsilon();

    if row < rows {
        let base = row * cols;

        let mut sum = F::new(0.0);
        for col in 0..cols {
            sum += input[base + col];
        }
        let mean = sum / F::cast_from(cols);

        let mut var_sum = F::new(0.0);
        for col in 0..cols {
            let diff = input[base + col] - mean;
            var_sum += diff * diff;
        }
        let variance = var_sum / F::cast_from(cols);
        let inv_std = F::new(1.0) / F::sqrt(variance + F::new(epsilon));

        for col in 0..cols {
            output[base + col] = (input[base + col] - mean) * inv_std * alpha[col] + beta[col];
        }

        stats[row * 2] = mean;
        stats[row * 2 + 1] = inv_std;
    }
}

/// Gradient w.r.t. the input rows, one row per unit.
///
/// dx = (n * dn - sum(dn) - x_hat * sum(dn * x_hat)) * inv_std / n, where dn = dy * alpha.
#[cube(launch, launch_unchecked)]
pub fn layer_norm_backward_input_kernel<F: Float>(
    input: &Tensor<F>,
    alpha: &Tensor<F>,
    stats: &Tensor<F>,
    grad_output: &Tensor<F>,
    grad_input: &mut Tensor<F>,
) {
    let row = ABSOLUTE_POS;
    let rows = input.shape(0);
    let cols = input.shape(1);

    if row < rows {
        let base = row * cols;
        let mean = stats[row * 2];
        let inv_std = stats[row * 2 + 1];

        let mut sum_dn = F::new(0.0);
        let mut sum_dn_xhat = F::new(0.0);
        for col in 0..cols {
            let x_hat = (input[base + col] - mean) * inv_std;
            let dn = grad_output[base + col] * alpha[col];
            sum_dn += dn;
            sum_dn_xhat += dn * x_hat;
        }

        let n = F::cast_from(cols);
        for col in 0..cols {
            let x_hat = (input[base + col] - mean) * inv_std;
            let dn = grad_output[base + col] * alpha[col];
            grad_input[base + col] = (dn * n - sum_dn - x_hat * sum_dn_xhat) * inv_std / n;
        }
    }
}

/// Scale/shift gradients, one column per unit. Rows are summed in order so
/// the result does not depend on scheduling.
#[cube(launch, launch_unchecked)]
pub fn layer_norm_backward_params_kernel<F: Float>(
    input: &Tensor<F>,
    stats: &Tensor<F>,
    grad_output: &Tensor<F>,
    grad_alpha: &mut Tensor<F>,
    grad_beta: &mut Tensor<F>,
) {
    let col = ABSOLUTE_POS;
    let rows = input.shape(0);
    let cols = input.shape(1);

    if col < cols {
        let mut d_alpha = F::new(0.0);
        let mut d_beta = F::new(0.0);
        for row in 0..rows {
            let idx = row * cols + col;
            let x_hat = (input[idx] - stats[row * 2]) * stats[row * 2 + 1];
            d_alpha += grad_output[idx] * x_hat;
            d_beta += grad_output[idx];
        }
        grad_alpha[col] = d_alpha;
        grad_beta[col] = d_beta;
    }
}
