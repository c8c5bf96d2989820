//! Shared test utilities for the recurrence engines.

use burn::tensor::{Distribution, Tensor, TensorData, backend::Backend};
use lnlstm_kernels::{Gate, ZoneoutBlend, util::sigmoid};

use crate::{api::LayerNormLstmInputs, config::LayerNormLstmConfig};

/// Dimensions for LSTM tests.
#[derive(Debug, Clone, Copy)]
pub struct TestDims {
    pub time_steps: usize,
    pub batch_size: usize,
    pub input_size: usize,
    pub hidden_size: usize,
}

impl TestDims {
    #[must_use]
    pub fn new(time_steps: usize, batch_size: usize, input_size: usize, hidden_size: usize) -> Self {
        Self {
            time_steps,
            batch_size,
            input_size,
            hidden_size,
        }
    }

    /// Width of the gate axis.
    #[must_use]
    pub fn width(&self) -> usize {
        self.hidden_size * 4
    }

    #[must_use]
    pub fn state_shape(&self) -> [usize; 3] {
        [self.time_steps, self.batch_size, self.hidden_size]
    }
}

#[must_use]
pub fn default_test_dims() -> TestDims {
    TestDims::new(5, 3, 6, 4)
}

#[must_use]
pub fn small_test_dims() -> TestDims {
    TestDims::new(2, 2, 3, 2)
}

/// Random inputs scaled so the gates stay out of saturation. No zoneout mask.
pub fn generate_test_inputs<B: Backend>(dims: TestDims, device: &B::Device) -> LayerNormLstmInputs<B> {
    let TestDims {
        time_steps,
        batch_size,
        input_size,
        hidden_size,
    } = dims;
    let width = dims.width();
    let kernel_std = 1.0 / (input_size as f64).sqrt();
    let recurrent_std = 1.0 / (hidden_size as f64).sqrt();

    LayerNormLstmInputs {
        x: Tensor::random(
            [time_steps, batch_size, input_size],
            Distribution::Normal(0.0, 1.0),
            device,
        ),
        kernel: Tensor::random(
            [input_size, width],
            Distribution::Normal(0.0, kernel_std),
            device,
        ),
        recurrent_kernel: Tensor::random(
            [hidden_size, width],
            Distribution::Normal(0.0, recurrent_std),
            device,
        ),
        bias: Tensor::random([width], Distribution::Normal(0.0, 0.1), device),
        alpha: Tensor::random([2, width], Distribution::Normal(1.0, 0.1), device),
        beta: Tensor::random([2, width], Distribution::Normal(0.0, 0.1), device),
        zoneout_mask: None,
    }
}

/// Binary mask with ones at rate `p`.
pub fn random_zoneout_mask<B: Backend>(dims: TestDims, p: f64, device: &B::Device) -> Tensor<B, 3> {
    Tensor::random(dims.state_shape(), Distribution::Bernoulli(p), device)
}

/// Copy a tensor onto another backend through host memory.
pub fn transfer<B: Backend, B2: Backend, const D: usize>(
    tensor: &Tensor<B, D>,
    device: &B2::Device,
) -> Tensor<B2, D> {
    Tensor::from_data(tensor.to_data(), device)
}

/// Move every input onto another backend.
pub fn transfer_inputs<B: Backend, B2: Backend>(
    inputs: &LayerNormLstmInputs<B>,
    device: &B2::Device,
) -> LayerNormLstmInputs<B2> {
    LayerNormLstmInputs {
        x: transfer(&inputs.x, device),
        kernel: transfer(&inputs.kernel, device),
        recurrent_kernel: transfer(&inputs.recurrent_kernel, device),
        bias: transfer(&inputs.bias, device),
        alpha: transfer(&inputs.alpha, device),
        beta: transfer(&inputs.beta, device),
        zoneout_mask: inputs.zoneout_mask.as_ref().map(|m| transfer(m, device)),
    }
}

/// Build a tensor from host `f64`s without an intermediate f32 rounding.
pub fn from_vec<B: Backend, const D: usize>(
    values: Vec<f64>,
    shape: [usize; D],
    device: &B::Device,
) -> Tensor<B, D> {
    Tensor::from_data(TensorData::new(values, shape), device)
}

/// Flatten a tensor to host `f64`s regardless of the backend element type.
pub fn to_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Vec<f64> {
    tensor
        .into_data()
        .convert::<f64>()
        .to_vec()
        .expect("tensor data converts to f64")
}

pub fn assert_data_close(a: &[f64], b: &[f64], rtol: f64, atol: f64, name: &str) {
    assert_eq!(
        a.len(),
        b.len(),
        "{name}: Data sizes don't match: {} vs {}",
        a.len(),
        b.len()
    );

    let mut max_excess = f64::NEG_INFINITY;
    let mut max_diff = 0.0f64;
    let mut max_idx = 0;
    let mut max_av = 0.0f64;
    let mut max_bv = 0.0f64;

    for (i, (&av, &bv)) in a.iter().zip(b.iter()).enumerate() {
        let diff = (av - bv).abs();
        let excess = diff - (atol + rtol * bv.abs());
        if excess > max_excess || diff.is_nan() {
            max_excess = if diff.is_nan() { f64::INFINITY } else { excess };
            max_diff = diff;
            max_idx = i;
            max_av = av;
            max_bv = bv;
        }
    }

    let tolerance = atol + rtol * max_bv.abs();
    eprintln!(
        "{name}: max_diff={max_diff:.3e} tol={tolerance:.3e} at idx {max_idx}: tested={max_av:.6} ref={max_bv:.6}",
    );
    assert!(
        max_excess <= 0.0,
        "{name}: max_diff={max_diff:.3e} exceeds tolerance={tolerance:.3e} at idx {max_idx}: tested={max_av:.6} ref={max_bv:.6}",
    );
}

/// Layer norm over the last axis in differentiable tensor ops.
pub fn reference_layer_norm<B: Backend>(
    input: Tensor<B, 2>,
    alpha: Tensor<B, 1>,
    beta: Tensor<B, 1>,
    epsilon: f32,
) -> Tensor<B, 2> {
    let (var, mean) = input.clone().var_mean_bias(1);
    let inv_std = var.add_scalar(epsilon).sqrt().recip();
    (input - mean) * inv_std * alpha.unsqueeze::<2>() + beta.unsqueeze::<2>()
}

/// `sum(h[1..] * dh_new) + sum(c[1..] * dc_new)`: the scalar whose gradient
/// a backward call with upstream `dh_new`, `dc_new` computes.
pub fn weighted_loss<B: Backend>(
    h: Tensor<B, 3>,
    c: Tensor<B, 3>,
    dh_new: Tensor<B, 3>,
    dc_new: Tensor<B, 3>,
) -> Tensor<B, 1> {
    let [steps, _, _] = dh_new.dims();
    (h.narrow(0, 1, steps) * dh_new).sum() + (c.narrow(0, 1, steps) * dc_new).sum()
}

/// The whole recurrence written step by step in differentiable tensor ops.
///
/// Returns `(h, c)`, each `[T+1, N, H]` with a zero first step.
pub fn reference_lstm<B: Backend>(
    inputs: &LayerNormLstmInputs<B>,
    config: &LayerNormLstmConfig,
) -> (Tensor<B, 3>, Tensor<B, 3>) {
    let [time_steps, batch_size, input_size] = inputs.x.dims();
    let [hidden, width] = inputs.recurrent_kernel.dims();
    let device = inputs.x.device();
    let row = |m: &Tensor<B, 2>, r: usize| m.clone().narrow(0, r, 1).reshape([width]);

    let wx = inputs
        .x
        .clone()
        .reshape([time_steps * batch_size, input_size])
        .matmul(inputs.kernel.clone());
    let wx_norm = reference_layer_norm(
        wx,
        row(&inputs.alpha, 0),
        row(&inputs.beta, 0),
        config.epsilon,
    );

    let order = config.gate_order;
    let chunk = |pre: &Tensor<B, 2>, gate: Gate| pre.clone().narrow(1, order.slot(gate) * hidden, hidden);

    // Weight given to the previous state at each step.
    let keep = |step: usize| -> Option<Tensor<B, 2>> {
        if !config.zoneout_enabled() {
            return None;
        }
        if !config.training {
            return Some(Tensor::full(
                [batch_size, hidden],
                f64::from(config.zoneout_prob),
                &device,
            ));
        }
        let mask = inputs
            .zoneout_mask
            .as_ref()?
            .clone()
            .narrow(0, step, 1)
            .reshape([batch_size, hidden]);
        Some(match config.zoneout_blend {
            ZoneoutBlend::RetainOnOne => mask,
            ZoneoutBlend::RetainOnZero => mask.neg().add_scalar(1.0),
        })
    };

    let mut h = Tensor::<B, 2>::zeros([batch_size, hidden], &device);
    let mut c = Tensor::<B, 2>::zeros([batch_size, hidden], &device);
    let mut hs = vec![h.clone()];
    let mut cs = vec![c.clone()];

    for step in 0..time_steps {
        let rh = h.clone().matmul(inputs.recurrent_kernel.clone());
        let rh_norm = reference_layer_norm(
            rh,
            row(&inputs.alpha, 1),
            row(&inputs.beta, 1),
            config.epsilon,
        );
        let pre = wx_norm.clone().narrow(0, step * batch_size, batch_size)
            + rh_norm
            + inputs.bias.clone().unsqueeze::<2>();

        let i = sigmoid(chunk(&pre, Gate::Input));
        let f = sigmoid(chunk(&pre, Gate::Forget));
        let g = chunk(&pre, Gate::Cell).tanh();
        let o = sigmoid(chunk(&pre, Gate::Output));

        let c_new = f * c.clone() + i * g;
        let h_new = o * c_new.clone().tanh();

        (h, c) = match keep(step) {
            Some(keep) => {
                let release = keep.clone().neg().add_scalar(1.0);
                (
                    keep.clone() * h + release.clone() * h_new,
                    keep * c + release * c_new,
                )
            }
            None => (h_new, c_new),
        };
        hs.push(h.clone());
        cs.push(c.clone());
    }

    (Tensor::stack(hs, 0), Tensor::stack(cs, 0))
}
