//! Central-difference check of every gradient the backward call returns,
//! run on the f64 reference backend.

use burn::tensor::{Distribution, Tensor, backend::Backend};
use clap::Args;
use lnlstm_core::{
    LayerNormLstmConfig, LayerNormLstmGradInputs, LayerNormLstmGrads, LayerNormLstmInputs,
    ReferenceBackend, Result, layer_norm_lstm, layer_norm_lstm_grad,
    test_utils::{
        TestDims, from_vec, generate_test_inputs, random_zoneout_mask, to_vec, weighted_loss,
    },
};
use serde::Serialize;
use tracing::debug;

type B = ReferenceBackend;

#[derive(Args, Debug, Clone)]
pub struct GradcheckArgs {
    #[arg(long, default_value = "3")]
    pub time_steps: usize,

    #[arg(long, default_value = "2")]
    pub batch: usize,

    #[arg(long, default_value = "3")]
    pub input: usize,

    #[arg(long, default_value = "2")]
    pub hidden: usize,

    /// Finite-difference step
    #[arg(long, default_value = "1e-6")]
    pub step: f64,

    /// Largest accepted error, relative to `max(|analytic|, |numeric|, 1)`
    #[arg(long, default_value = "1e-4")]
    pub tolerance: f64,

    #[arg(long, default_value = "0")]
    pub seed: u64,

    #[arg(long, default_value = "false")]
    pub json: bool,
}

/// The six differentiable operands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Param {
    X,
    Kernel,
    RecurrentKernel,
    Bias,
    Alpha,
    Beta,
}

impl Param {
    pub const ALL: [Param; 6] = [
        Param::X,
        Param::Kernel,
        Param::RecurrentKernel,
        Param::Bias,
        Param::Alpha,
        Param::Beta,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Param::X => "x",
            Param::Kernel => "kernel",
            Param::RecurrentKernel => "recurrent_kernel",
            Param::Bias => "bias",
            Param::Alpha => "alpha",
            Param::Beta => "beta",
        }
    }

    fn values<BK: Backend>(self, inputs: &LayerNormLstmInputs<BK>) -> Vec<f64> {
        match self {
            Param::X => to_vec(inputs.x.clone()),
            Param::Kernel => to_vec(inputs.kernel.clone()),
            Param::RecurrentKernel => to_vec(inputs.recurrent_kernel.clone()),
            Param::Bias => to_vec(inputs.bias.clone()),
            Param::Alpha => to_vec(inputs.alpha.clone()),
            Param::Beta => to_vec(inputs.beta.clone()),
        }
    }

    fn replace<BK: Backend>(self, inputs: &mut LayerNormLstmInputs<BK>, values: &[f64]) {
        let device = inputs.x.device();
        let values = values.to_vec();
        match self {
            Param::X => inputs.x = from_vec(values, inputs.x.dims(), &device),
            Param::Kernel => inputs.kernel = from_vec(values, inputs.kernel.dims(), &device),
            Param::RecurrentKernel => {
                inputs.recurrent_kernel = from_vec(values, inputs.recurrent_kernel.dims(), &device);
            }
            Param::Bias => inputs.bias = from_vec(values, inputs.bias.dims(), &device),
            Param::Alpha => inputs.alpha = from_vec(values, inputs.alpha.dims(), &device),
            Param::Beta => inputs.beta = from_vec(values, inputs.beta.dims(), &device),
        }
    }

    fn analytic<BK: Backend>(self, grads: &LayerNormLstmGrads<BK>) -> Vec<f64> {
        match self {
            Param::X => to_vec(grads.dx.clone()),
            Param::Kernel => to_vec(grads.dw.clone()),
            Param::RecurrentKernel => to_vec(grads.dr.clone()),
            Param::Bias => to_vec(grads.db.clone()),
            Param::Alpha => to_vec(grads.dalpha.clone()),
            Param::Beta => to_vec(grads.dbeta.clone()),
        }
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct ParamCheck {
    pub name: &'static str,
    pub elements: usize,
    pub max_abs_error: f64,
    pub max_rel_error: f64,
    pub passed: bool,
}

/// Check every gradient. Failures are reported per parameter, not as errors.
pub fn run(args: &GradcheckArgs, config: &LayerNormLstmConfig) -> Result<Vec<ParamCheck>> {
    let device = Default::default();
    B::seed(&device, args.seed);

    let dims = TestDims::new(args.time_steps, args.batch, args.input, args.hidden);
    let mut inputs = generate_test_inputs::<B>(dims, &device);
    if config.zoneout_enabled() {
        inputs.zoneout_mask = Some(random_zoneout_mask(
            dims,
            f64::from(config.zoneout_prob),
            &device,
        ));
    }
    let dh_new = Tensor::<B, 3>::random(dims.state_shape(), Distribution::Normal(0.0, 1.0), &device);
    let dc_new = Tensor::<B, 3>::random(dims.state_shape(), Distribution::Normal(0.0, 1.0), &device);

    let outputs = layer_norm_lstm(inputs.clone(), config)?;
    let grads = layer_norm_lstm_grad(
        LayerNormLstmGradInputs::from_forward(
            inputs.clone(),
            outputs,
            dh_new.clone(),
            dc_new.clone(),
        ),
        config,
    )?;

    let loss = |inputs: LayerNormLstmInputs<B>| -> Result<f64> {
        let outputs = layer_norm_lstm(inputs, config)?;
        Ok(to_vec(weighted_loss(outputs.h, outputs.c, dh_new.clone(), dc_new.clone()))[0])
    };

    Param::ALL
        .into_iter()
        .map(|param| -> Result<ParamCheck> {
            let values = param.values(&inputs);
            let analytic = param.analytic(&grads);
            let mut max_abs_error = 0.0f64;
            let mut max_rel_error = 0.0f64;

            for (i, &a) in analytic.iter().enumerate() {
                let mut shifted = values.clone();
                let mut perturbed = inputs.clone();

                shifted[i] = values[i] + args.step;
                param.replace(&mut perturbed, &shifted);
                let plus = loss(perturbed.clone())?;

                shifted[i] = values[i] - args.step;
                param.replace(&mut perturbed, &shifted);
                let minus = loss(perturbed)?;

                let numeric = (plus - minus) / (2.0 * args.step);
                let abs = (a - numeric).abs();
                max_abs_error = max_abs_error.max(abs);
                max_rel_error = max_rel_error.max(abs / a.abs().max(numeric.abs()).max(1.0));
            }

            debug!(param = param.name(), max_abs_error, max_rel_error, "checked");
            Ok(ParamCheck {
                name: param.name(),
                elements: analytic.len(),
                max_abs_error,
                max_rel_error,
                passed: max_rel_error <= args.tolerance,
            })
        })
        .collect()
}
