//! The two operations exposed to callers.
//!
//! Both validate the configuration, shapes and dtypes before any device work
//! is issued, then run their engine under a [`StepOrchestrator`] and block
//! once at the end.
//! Ranks are carried by the tensor types, so only extents are checked here.

use burn::tensor::{DType, Tensor, backend::Backend};
use lnlstm_kernels::LayerNormConfig;
use tracing::debug;

use crate::{
    LstmBackend,
    backward::BackwardPass,
    config::LayerNormLstmConfig,
    error::{Result, ensure_arg},
    forward::ForwardPass,
    orchestrator::StepOrchestrator,
};

/// Forward operands.
///
/// - `x`: `[T, N, C]`
/// - `kernel`: `[C, 4H]`
/// - `recurrent_kernel`: `[H, 4H]`
/// - `bias`: `[4H]`
/// - `alpha`, `beta`: `[2, 4H]`, row 0 for the input projection, row 1 for
///   the recurrent projection
/// - `zoneout_mask`: `[T, N, H]`; `None` or an empty tensor disables zoneout
#[derive(Clone, Debug)]
pub struct LayerNormLstmInputs<B: Backend> {
    pub x: Tensor<B, 3>,
    pub kernel: Tensor<B, 2>,
    pub recurrent_kernel: Tensor<B, 2>,
    pub bias: Tensor<B, 1>,
    pub alpha: Tensor<B, 2>,
    pub beta: Tensor<B, 2>,
    pub zoneout_mask: Option<Tensor<B, 3>>,
}

/// `h` and `c` are `[T+1, N, H]` with a zero first step. `cache` is the flat
/// activation arena the backward call consumes.
#[derive(Clone, Debug)]
pub struct LayerNormLstmOutputs<B: Backend> {
    pub h: Tensor<B, 3>,
    pub c: Tensor<B, 3>,
    pub cache: Tensor<B, 1>,
}

/// Backward operands. The data and weights arrive transposed.
///
/// - `x_t`: `[C, T, N]`
/// - `kernel_t`: `[4H, C]`
/// - `recurrent_kernel_t`: `[4H, H]`
/// - `h`, `c`: forward outputs, `[T+1, N, H]`
/// - `cache`: the forward arena, unchanged
/// - `dh_new`, `dc_new`: upstream gradients for steps `1..=T`, `[T, N, H]`
#[derive(Clone, Debug)]
pub struct LayerNormLstmGradInputs<B: Backend> {
    pub x_t: Tensor<B, 3>,
    pub kernel_t: Tensor<B, 2>,
    pub recurrent_kernel_t: Tensor<B, 2>,
    pub bias: Tensor<B, 1>,
    pub alpha: Tensor<B, 2>,
    pub beta: Tensor<B, 2>,
    pub h: Tensor<B, 3>,
    pub c: Tensor<B, 3>,
    pub cache: Tensor<B, 1>,
    pub dh_new: Tensor<B, 3>,
    pub dc_new: Tensor<B, 3>,
    pub zoneout_mask: Option<Tensor<B, 3>>,
}

impl<B: Backend> LayerNormLstmGradInputs<B> {
    /// Backward operands for a finished forward call, transposing the data
    /// and weights as the backward call expects.
    #[must_use]
    pub fn from_forward(
        inputs: LayerNormLstmInputs<B>,
        outputs: LayerNormLstmOutputs<B>,
        dh_new: Tensor<B, 3>,
        dc_new: Tensor<B, 3>,
    ) -> Self {
        Self {
            x_t: inputs.x.permute([2, 0, 1]),
            kernel_t: inputs.kernel.transpose(),
            recurrent_kernel_t: inputs.recurrent_kernel.transpose(),
            bias: inputs.bias,
            alpha: inputs.alpha,
            beta: inputs.beta,
            h: outputs.h,
            c: outputs.c,
            cache: outputs.cache,
            dh_new,
            dc_new,
            zoneout_mask: inputs.zoneout_mask,
        }
    }
}

/// Gradients shaped like the corresponding forward operands.
#[derive(Clone, Debug)]
pub struct LayerNormLstmGrads<B: Backend> {
    pub dx: Tensor<B, 3>,
    pub dw: Tensor<B, 2>,
    pub dr: Tensor<B, 2>,
    pub db: Tensor<B, 1>,
    pub dalpha: Tensor<B, 2>,
    pub dbeta: Tensor<B, 2>,
}

/// Run the forward recurrence over a whole sequence.
pub fn layer_norm_lstm<B: LstmBackend>(
    inputs: LayerNormLstmInputs<B>,
    config: &LayerNormLstmConfig,
) -> Result<LayerNormLstmOutputs<B>> {
    ensure_config(config)?;
    let [time_steps, batch_size, input_size] = inputs.x.dims();
    let [kernel_rows, width] = inputs.kernel.dims();
    let [hidden_size, recurrent_width] = inputs.recurrent_kernel.dims();

    ensure_arg!(
        input_size == kernel_rows,
        "input[2] and kernel[0] dimensions must match. Found {input_size} and {kernel_rows}"
    );
    ensure_arg!(
        recurrent_width == 4 * hidden_size,
        "recurrent_kernel must be [H, 4H]. Found [{hidden_size}, {recurrent_width}]"
    );
    ensure_arg!(
        width == recurrent_width,
        "kernel[1] and recurrent_kernel[1] dimensions must match. Found {width} and {recurrent_width}"
    );
    ensure_positive(time_steps, batch_size, input_size, hidden_size)?;
    ensure_gate_params(&inputs.bias, &inputs.alpha, &inputs.beta, width)?;
    let zoneout_mask = present(inputs.zoneout_mask);
    if let Some(mask) = &zoneout_mask {
        ensure_shape("zoneout_mask", mask.dims(), [time_steps, batch_size, hidden_size])?;
    }
    ensure_dtypes(
        [
            inputs.x.dtype(),
            inputs.kernel.dtype(),
            inputs.recurrent_kernel.dtype(),
            inputs.bias.dtype(),
            inputs.alpha.dtype(),
            inputs.beta.dtype(),
        ]
        .into_iter()
        .chain(zoneout_mask.as_ref().map(Tensor::dtype)),
    )?;

    let device = inputs.x.device();
    let zoneout_mask =
        resolve_zoneout(config, zoneout_mask, [time_steps, batch_size, hidden_size], &device);
    debug!(
        time_steps,
        batch_size,
        input_size,
        hidden_size,
        zoneout = zoneout_mask.is_some(),
        training = config.training,
        "layer norm lstm forward"
    );

    let mut orchestrator = StepOrchestrator::<B>::new(&device);
    let outputs = ForwardPass::new(config, batch_size, input_size, hidden_size).run(
        &mut orchestrator,
        inputs.x,
        inputs.kernel,
        inputs.recurrent_kernel,
        inputs.bias,
        &inputs.alpha,
        &inputs.beta,
        zoneout_mask,
    );
    let barriers = orchestrator.finish()?;
    debug!(barriers, "layer norm lstm forward done");
    Ok(outputs)
}

/// Run the backward recurrence over the arena produced by [`layer_norm_lstm`].
///
/// # Panics
/// If `cache` was not produced by a forward call with the same `T`, `N`, `H`.
pub fn layer_norm_lstm_grad<B: LstmBackend>(
    inputs: LayerNormLstmGradInputs<B>,
    config: &LayerNormLstmConfig,
) -> Result<LayerNormLstmGrads<B>> {
    ensure_config(config)?;
    let [input_size, time_steps, batch_size] = inputs.x_t.dims();
    let [width, kernel_cols] = inputs.kernel_t.dims();
    let [recurrent_width, hidden_size] = inputs.recurrent_kernel_t.dims();

    ensure_arg!(
        input_size == kernel_cols,
        "input[0] and kernel[1] dimensions must match. Found {input_size} and {kernel_cols}"
    );
    ensure_arg!(
        recurrent_width == 4 * hidden_size,
        "recurrent_kernel must be [4H, H]. Found [{recurrent_width}, {hidden_size}]"
    );
    ensure_arg!(
        width == recurrent_width,
        "kernel[0] and recurrent_kernel[0] dimensions must match. Found {width} and {recurrent_width}"
    );
    ensure_positive(time_steps, batch_size, input_size, hidden_size)?;
    ensure_gate_params(&inputs.bias, &inputs.alpha, &inputs.beta, width)?;

    let states = [time_steps + 1, batch_size, hidden_size];
    let steps = [time_steps, batch_size, hidden_size];
    ensure_shape("h", inputs.h.dims(), states)?;
    ensure_shape("c", inputs.c.dims(), states)?;
    ensure_shape("dh_new", inputs.dh_new.dims(), steps)?;
    ensure_shape("dc_new", inputs.dc_new.dims(), steps)?;
    let zoneout_mask = present(inputs.zoneout_mask.clone());
    if let Some(mask) = &zoneout_mask {
        ensure_shape("zoneout_mask", mask.dims(), steps)?;
    }
    ensure_dtypes(
        [
            inputs.x_t.dtype(),
            inputs.kernel_t.dtype(),
            inputs.recurrent_kernel_t.dtype(),
            inputs.bias.dtype(),
            inputs.alpha.dtype(),
            inputs.beta.dtype(),
            inputs.h.dtype(),
            inputs.c.dtype(),
            inputs.cache.dtype(),
            inputs.dh_new.dtype(),
            inputs.dc_new.dtype(),
        ]
        .into_iter()
        .chain(zoneout_mask.as_ref().map(Tensor::dtype)),
    )?;

    let device = inputs.x_t.device();
    let zoneout_mask = resolve_zoneout(config, zoneout_mask, steps, &device);
    debug!(
        time_steps,
        batch_size,
        input_size,
        hidden_size,
        zoneout = zoneout_mask.is_some(),
        "layer norm lstm backward"
    );

    let mut orchestrator = StepOrchestrator::<B>::new(&device);
    let grads = BackwardPass::new(config, batch_size, input_size, hidden_size).run(
        &mut orchestrator,
        inputs,
        zoneout_mask,
    );
    let barriers = orchestrator.finish()?;
    debug!(barriers, "layer norm lstm backward done");
    Ok(grads)
}

/// An empty mask means no mask.
fn present<B: Backend>(mask: Option<Tensor<B, 3>>) -> Option<Tensor<B, 3>> {
    mask.filter(|m| m.shape().num_elements() > 0)
}

/// The per-element mask the cell kernel blends with, or `None` to skip the
/// blend. Inference mode blends every element by the expected retention.
fn resolve_zoneout<B: Backend>(
    config: &LayerNormLstmConfig,
    mask: Option<Tensor<B, 3>>,
    shape: [usize; 3],
    device: &B::Device,
) -> Option<Tensor<B, 3>> {
    if !config.zoneout_enabled() {
        return None;
    }
    if config.training {
        return mask;
    }
    let value = config
        .zoneout_blend
        .mask_value(f64::from(config.zoneout_prob));
    Some(Tensor::full(shape, value, device))
}

fn ensure_config(config: &LayerNormLstmConfig) -> Result<()> {
    let epsilon = config.epsilon;
    ensure_arg!(
        (LayerNormConfig::MIN_EPSILON..=LayerNormConfig::MAX_EPSILON).contains(&epsilon),
        "epsilon must be in [{:e}, {}]. Found {epsilon}",
        LayerNormConfig::MIN_EPSILON,
        LayerNormConfig::MAX_EPSILON
    );
    let zoneout_prob = config.zoneout_prob;
    ensure_arg!(
        (0.0..=1.0).contains(&zoneout_prob),
        "zoneout_prob must be in [0, 1]. Found {zoneout_prob}"
    );
    Ok(())
}

fn ensure_positive(
    time_steps: usize,
    batch_size: usize,
    input_size: usize,
    hidden_size: usize,
) -> Result<()> {
    ensure_arg!(
        time_steps > 0 && batch_size > 0 && input_size > 0 && hidden_size > 0,
        "dimensions must be positive. Found T={time_steps}, N={batch_size}, C={input_size}, H={hidden_size}"
    );
    Ok(())
}

fn ensure_gate_params<B: Backend>(
    bias: &Tensor<B, 1>,
    alpha: &Tensor<B, 2>,
    beta: &Tensor<B, 2>,
    width: usize,
) -> Result<()> {
    ensure_shape("bias", bias.dims(), [width])?;
    ensure_shape("alpha", alpha.dims(), [2, width])?;
    ensure_shape("beta", beta.dims(), [2, width])
}

fn ensure_shape<const D: usize>(name: &str, found: [usize; D], expected: [usize; D]) -> Result<()> {
    ensure_arg!(
        found == expected,
        "{name} must be {expected:?}. Found {found:?}"
    );
    Ok(())
}

fn ensure_dtypes(dtypes: impl IntoIterator<Item = DType>) -> Result<()> {
    let mut dtypes = dtypes.into_iter();
    let Some(first) = dtypes.next() else {
        return Ok(());
    };
    ensure_arg!(
        matches!(first, DType::F32 | DType::F64),
        "unsupported dtype {first:?}; expected F32 or F64"
    );
    for dtype in dtypes {
        ensure_arg!(
            dtype == first,
            "all operands must share one dtype. Found {first:?} and {dtype:?}"
        );
    }
    Ok(())
}
