use cubecl::prelude::*;

use super::types::CellConfig;
use crate::activation::{sigmoid, sigmoid_grad, tanh, tanh_grad};

/// LSTM cell forward for one `(batch, hidden)` element per unit.
///
/// - wx_norm, rh_norm: [N, 4H]
/// - bias: [4H]
/// - h_prev, c_prev, zoneout_mask, h_out, c_out: [N, H]
#[cube(launch, launch_unchecked)]
pub fn lstm_cell_forward_kernel<F: Float>(
    wx_norm: &Tensor<F>,
    rh_norm: &Tensor<F>,
    bias: &Tensor<F>,
    h_prev: &Tensor<F>,
    c_prev: &Tensor<F>,
    zoneout_mask: &Tensor<F>,
    h_out: &mut Tensor<F>,
    c_out: &mut Tensor<F>,
    #[comptime] config: CellConfig,
) {
    let idx = ABSOLUTE_POS;
    let hidden = config.hidden;

    if idx < h_out.len() {
        let row = idx / hidden;
        let col = idx % hidden;
        let base = row * hidden * 4;

        let i_col = config.input_offset + col;
        let f_col = config.forget_offset + col;
        let g_col = config.cell_offset + col;
        let o_col = config.output_offset + col;

        let i = sigmoid::<F>(wx_norm[base + i_col] + rh_norm[base + i_col] + bias[i_col]);
        let f = sigmoid::<F>(wx_norm[base + f_col] + rh_norm[base + f_col] + bias[f_col]);
        let g = tanh::<F>(wx_norm[base + g_col] + rh_norm[base + g_col] + bias[g_col]);
        let o = sigmoid::<F>(wx_norm[base + o_col] + rh_norm[base + o_col] + bias[o_col]);

        let c_old = c_prev[idx];
        let mut c_new = f * c_old + i * g;
        let mut h_new = o * tanh::<F>(c_new);

        if comptime!(config.zoneout) {
            let mut keep = zoneout_mask[idx];
            if comptime!(!config.retain_on_one) {
                keep = F::new(1.0) - keep;
            }
            h_new = keep * h_prev[idx] + (F::new(1.0) - keep) * h_new;
            c_new = keep * c_old + (F::new(1.0) - keep) * c_new;
        }

        h_out[idx] = h_new;
        c_out[idx] = c_new;
    }
}

/// LSTM cell backward for one `(batch, hidden)` element per unit.
///
/// Gates and the pre-blend cell state are recomputed from the saved
/// normalized projections. `grad_h`/`grad_c` are the totals reaching this
/// step; the zoneout-retained share is routed straight to `grad_h_prev` and
/// `grad_c_prev`.
#[cube(launch, launch_unchecked)]
pub fn lstm_cell_backward_kernel<F: Float>(
    wx_norm: &Tensor<F>,
    rh_norm: &Tensor<F>,
    bias: &Tensor<F>,
    c_prev: &Tensor<F>,
    zoneout_mask: &Tensor<F>,
    grad_h: &Tensor<F>,
    grad_c: &Tensor<F>,
    grad_pre: &mut Tensor<F>,
    grad_h_prev: &mut Tensor<F>,
    grad_c_prev: &mut Tensor<F>,
    #[comptime] config: CellConfig,
) {
    let idx = ABSOLUTE_POS;
    let hidden = config.hidden;

    if idx < grad_h.len() {
        let row = idx / hidden;
        let col = idx % hidden;
        let base = row * hidden * 4;

        let i_col = config.input_offset + col;
        let f_col = config.forget_offset + col;
        let g_col = config.cell_offset + col;
        let o_col = config.output_offset + col;

        let i = sigmoid::<F>(wx_norm[base + i_col] + rh_norm[base + i_col] + bias[i_col]);
        let f = sigmoid::<F>(wx_norm[base + f_col] + rh_norm[base + f_col] + bias[f_col]);
        let g = tanh::<F>(wx_norm[base + g_col] + rh_norm[base + g_col] + bias[g_col]);
        let o = sigmoid::<F>(wx_norm[base + o_col] + rh_norm[base + o_col] + bias[o_col]);

        let c_old = c_prev[idx];
        let tanh_c = tanh::<F>(f * c_old + i * g);

        let mut dh = grad_h[idx];
        let mut dc = grad_c[idx];
        let mut dh_prev = F::new(0.0);
        let mut dc_prev = F::new(0.0);

        if comptime!(config.zoneout) {
            let mut keep = zoneout_mask[idx];
            if comptime!(!config.retain_on_one) {
                keep = F::new(1.0) - keep;
            }
            dh_prev = keep * dh;
            dc_prev = keep * dc;
            dh = dh * (F::new(1.0) - keep);
            dc = dc * (F::new(1.0) - keep);
        }

        let dc_total = dc + dh * o * tanh_grad::<F>(tanh_c);
        dc_prev += dc_total * f;

        grad_pre[base + i_col] = dc_total * g * sigmoid_grad::<F>(i);
        grad_pre[base + f_col] = dc_total * c_old * sigmoid_grad::<F>(f);
        grad_pre[base + g_col] = dc_total * i * tanh_grad::<F>(g);
        grad_pre[base + o_col] = dh * tanh_c * sigmoid_grad::<F>(o);

        grad_h_prev[idx] = dh_prev;
        grad_c_prev[idx] = dc_prev;
    }
}
