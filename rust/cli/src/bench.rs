//! Wall-clock timing of the forward and backward calls.
//!
//! Usage:
//!   lnlstm bench --time-steps 64 --batch 32 --input 256 --hidden 256
//!   lnlstm bench --backward --json
//!   lnlstm --config zoneout.json bench --dtype float64

use std::time::Instant;

use burn::tensor::{Distribution, Tensor};
use clap::Args;
use lnlstm_core::{
    LayerNormLstmConfig, LayerNormLstmGradInputs, LstmBackend, Result, layer_norm_lstm,
    layer_norm_lstm_grad,
    test_utils::{TestDims, generate_test_inputs, random_zoneout_mask},
};
use serde::Serialize;
use tracing::debug;

#[derive(Args, Debug, Clone)]
pub struct BenchArgs {
    #[arg(long, default_value = "64")]
    pub time_steps: usize,

    #[arg(long, default_value = "32")]
    pub batch: usize,

    #[arg(long, default_value = "256")]
    pub input: usize,

    #[arg(long, default_value = "256")]
    pub hidden: usize,

    /// Also time the backward call
    #[arg(long, default_value = "false")]
    pub backward: bool,

    #[arg(long, default_value = "3")]
    pub warmup: usize,

    #[arg(long, default_value = "5")]
    pub repeats: usize,

    #[arg(long, default_value = "float32")]
    pub dtype: String,

    #[arg(long, default_value = "false")]
    pub json: bool,
}

impl BenchArgs {
    #[must_use]
    pub fn dims(&self) -> TestDims {
        TestDims::new(self.time_steps, self.batch, self.input, self.hidden)
    }
}

#[derive(Serialize, Debug)]
pub struct BenchResult {
    pub backend: &'static str,
    pub dtype: &'static str,
    pub time_steps: usize,
    pub batch: usize,
    pub input: usize,
    pub hidden: usize,
    pub zoneout_prob: f32,
    pub forward_ms: f64,
    pub backward_ms: Option<f64>,
    /// Sequence elements (`T * N`) per second through the forward call.
    pub throughput: f64,
}

/// Mean milliseconds per call after `warmup` untimed calls. Each call blocks
/// on the device before returning, so no extra sync is needed.
fn time_ms(warmup: usize, repeats: usize, mut call: impl FnMut() -> Result<()>) -> Result<f64> {
    for _ in 0..warmup {
        call()?;
    }
    let mut total = 0.0;
    for _ in 0..repeats {
        let start = Instant::now();
        call()?;
        total += start.elapsed().as_secs_f64();
    }
    Ok((total / repeats.max(1) as f64) * 1000.0)
}

/// Returns `(forward_ms, backward_ms)`.
pub fn bench<B: LstmBackend>(
    args: &BenchArgs,
    config: &LayerNormLstmConfig,
    device: &B::Device,
) -> Result<(f64, Option<f64>)> {
    let dims = args.dims();
    let mut inputs = generate_test_inputs::<B>(dims, device);
    if config.zoneout_enabled() {
        inputs.zoneout_mask = Some(random_zoneout_mask(
            dims,
            f64::from(config.zoneout_prob),
            device,
        ));
    }
    debug!(?dims, warmup = args.warmup, repeats = args.repeats, "benchmarking");

    let forward_ms = time_ms(args.warmup, args.repeats, || {
        layer_norm_lstm(inputs.clone(), config).map(drop)
    })?;

    if !args.backward {
        return Ok((forward_ms, None));
    }

    let outputs = layer_norm_lstm(inputs.clone(), config)?;
    let dh_new = Tensor::random(dims.state_shape(), Distribution::Normal(0.0, 1.0), device);
    let dc_new = Tensor::random(dims.state_shape(), Distribution::Normal(0.0, 1.0), device);
    let grad_inputs = LayerNormLstmGradInputs::from_forward(inputs, outputs, dh_new, dc_new);

    let backward_ms = time_ms(args.warmup, args.repeats, || {
        layer_norm_lstm_grad(grad_inputs.clone(), config).map(drop)
    })?;

    Ok((forward_ms, Some(backward_ms)))
}

#[must_use]
pub fn result(
    args: &BenchArgs,
    config: &LayerNormLstmConfig,
    dtype: &'static str,
    (forward_ms, backward_ms): (f64, Option<f64>),
) -> BenchResult {
    BenchResult {
        backend: crate::backend_name(),
        dtype,
        time_steps: args.time_steps,
        batch: args.batch,
        input: args.input,
        hidden: args.hidden,
        zoneout_prob: config.zoneout_prob,
        forward_ms,
        backward_ms,
        throughput: (args.time_steps * args.batch) as f64 / (forward_ms / 1000.0),
    }
}
