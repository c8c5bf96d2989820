use burn::tensor::{Tensor, backend::Backend, ops::FloatTensor};

use super::types::{CellConfig, CellGradInputs, CellGradOutputs, CellInputs, CellOutputs, CellSaved};
use crate::{
    gate::Gate,
    util::{float, primitive, sigmoid},
};

struct Gates<B: Backend> {
    input: Tensor<B, 2>,
    forget: Tensor<B, 2>,
    cell: Tensor<B, 2>,
    output: Tensor<B, 2>,
}

impl<B: Backend> Gates<B> {
    fn activate(pre: &Tensor<B, 2>, config: &CellConfig) -> Self {
        let chunk = |offset: usize| pre.clone().narrow(1, offset, config.hidden);
        Self {
            input: sigmoid(chunk(config.input_offset)),
            forget: sigmoid(chunk(config.forget_offset)),
            cell: chunk(config.cell_offset).tanh(),
            output: sigmoid(chunk(config.output_offset)),
        }
    }
}

fn pre_activation<B: Backend>(
    wx_norm: FloatTensor<B>,
    rh_norm: FloatTensor<B>,
    bias: FloatTensor<B>,
) -> Tensor<B, 2> {
    float::<B, 2>(wx_norm) + float::<B, 2>(rh_norm) + float::<B, 1>(bias).unsqueeze::<2>()
}

/// Weight given to the previous state.
fn retention<B: Backend>(mask: FloatTensor<B>, config: &CellConfig) -> Tensor<B, 2> {
    let mask = float::<B, 2>(mask);
    if config.retain_on_one {
        mask
    } else {
        mask.neg().add_scalar(1.0)
    }
}

pub(crate) fn forward<B: Backend>(
    inputs: CellInputs<FloatTensor<B>>,
    config: CellConfig,
) -> CellOutputs<FloatTensor<B>> {
    let pre = pre_activation::<B>(inputs.wx_norm, inputs.rh_norm, inputs.bias);
    let gates = Gates::activate(&pre, &config);

    let c_prev = float::<B, 2>(inputs.c_prev);
    let c_new = gates.forget * c_prev.clone() + gates.input * gates.cell;
    let h_new = gates.output * c_new.clone().tanh();

    let (h, c) = if config.zoneout {
        let keep = retention::<B>(inputs.zoneout_mask, &config);
        let release = keep.clone().neg().add_scalar(1.0);
        let h_prev = float::<B, 2>(inputs.h_prev);
        (
            keep.clone() * h_prev + release.clone() * h_new,
            keep * c_prev + release * c_new,
        )
    } else {
        (h_new, c_new)
    };

    CellOutputs {
        h: primitive(h),
        c: primitive(c),
    }
}

pub(crate) fn backward<B: Backend>(
    saved: CellSaved<FloatTensor<B>>,
    grad_outputs: CellGradOutputs<FloatTensor<B>>,
    config: CellConfig,
) -> CellGradInputs<FloatTensor<B>> {
    let pre = pre_activation::<B>(saved.wx_norm, saved.rh_norm, saved.bias);
    let gates = Gates::activate(&pre, &config);

    let c_prev = float::<B, 2>(saved.c_prev);
    let tanh_c = (gates.forget.clone() * c_prev.clone() + gates.input.clone() * gates.cell.clone())
        .tanh();

    let mut dh = float::<B, 2>(grad_outputs.h);
    let mut dc = float::<B, 2>(grad_outputs.c);
    let (dh_prev, dc_direct) = if config.zoneout {
        let keep = retention::<B>(saved.zoneout_mask, &config);
        let release = keep.clone().neg().add_scalar(1.0);
        let direct = (keep.clone() * dh.clone(), keep * dc.clone());
        dh = dh * release.clone();
        dc = dc * release;
        direct
    } else {
        (dh.zeros_like(), dc.zeros_like())
    };

    let dc_total = dc + dh.clone() * gates.output.clone() * tanh_grad(tanh_c.clone());
    let dc_prev = dc_direct + dc_total.clone() * gates.forget.clone();

    let d_input = dc_total.clone() * gates.cell.clone() * sigmoid_grad(gates.input.clone());
    let d_forget = dc_total.clone() * c_prev * sigmoid_grad(gates.forget);
    let d_cell = dc_total * gates.input * tanh_grad(gates.cell);
    let d_output = dh * tanh_c * sigmoid_grad(gates.output);

    let grad_of = |gate: Gate| match gate {
        Gate::Input => d_input.clone(),
        Gate::Forget => d_forget.clone(),
        Gate::Cell => d_cell.clone(),
        Gate::Output => d_output.clone(),
    };
    let ordered = config.offsets().map(|(gate, _)| grad_of(gate)).to_vec();

    CellGradInputs {
        pre_activation: primitive(Tensor::cat(ordered, 1)),
        h_prev: primitive(dh_prev),
        c_prev: primitive(dc_prev),
    }
}

fn sigmoid_grad<B: Backend>(s: Tensor<B, 2>) -> Tensor<B, 2> {
    s.clone() * s.neg().add_scalar(1.0)
}

fn tanh_grad<B: Backend>(t: Tensor<B, 2>) -> Tensor<B, 2> {
    t.clone().mul(t).neg().add_scalar(1.0)
}
