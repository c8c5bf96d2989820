//! Backward recurrence engine.
//!
//! Walks the arena from the last step to the first. Per step it rebuilds the
//! normalized recurrent projection from the cached statistics, runs the cell
//! backward and the recurrent layer norm backward, and carries `dh`/`dc` to
//! the previous step. The input side is handled once for the whole sequence
//! after the loop.

use burn::tensor::Tensor;
use tracing::trace;

use crate::{
    LstmBackend,
    api::{LayerNormLstmGradInputs, LayerNormLstmGrads},
    arena::{ArenaLayout, Region},
    cell::LstmCell,
    config::LayerNormLstmConfig,
    layer_norm::{LayerNormTransform, NormGradients},
    orchestrator::StepOrchestrator,
    time_step,
};

#[derive(Clone, Debug)]
pub struct BackwardPass {
    config: LayerNormLstmConfig,
    batch_size: usize,
    input_size: usize,
    hidden_size: usize,
}

impl BackwardPass {
    #[must_use]
    pub fn new(
        config: &LayerNormLstmConfig,
        batch_size: usize,
        input_size: usize,
        hidden_size: usize,
    ) -> Self {
        Self {
            config: config.clone(),
            batch_size,
            input_size,
            hidden_size,
        }
    }

    /// Issue the whole backward sequence. Does not wait for the device.
    ///
    /// `zoneout_mask` is already resolved, the same way the forward call
    /// resolved it.
    ///
    /// # Panics
    /// If the arena does not match the `[T, N, H]` of this call.
    pub fn run<B: LstmBackend>(
        &self,
        orchestrator: &mut StepOrchestrator<'_, B>,
        inputs: LayerNormLstmGradInputs<B>,
        zoneout_mask: Option<Tensor<B, 3>>,
    ) -> LayerNormLstmGrads<B> {
        let LayerNormLstmGradInputs {
            x_t,
            kernel_t,
            recurrent_kernel_t,
            bias,
            alpha,
            beta,
            h,
            c,
            cache,
            dh_new,
            dc_new,
            ..
        } = inputs;
        let [input_size, time_steps, batch_size] = x_t.dims();
        debug_assert_eq!((batch_size, input_size), (self.batch_size, self.input_size));
        let hidden = self.hidden_size;
        let width = hidden * 4;
        let rows = time_steps * batch_size;
        let device = orchestrator.device();

        let layout = ArenaLayout::lstm(time_steps, batch_size, hidden);
        let [cache_len] = cache.dims();
        assert_eq!(
            cache_len,
            layout.num_elements(),
            "cache holds {cache_len} elements but T={time_steps}, N={batch_size}, H={hidden} needs {}",
            layout.num_elements()
        );
        let arena = layout.realize(cache);

        let norm_config = self.config.layer_norm();
        let input_norm = LayerNormTransform::from_params(&alpha, &beta, 0, norm_config);
        let recurrent_norm = LayerNormTransform::from_params(&alpha, &beta, 1, norm_config);
        let cell = LstmCell::new(bias, self.config.cell(hidden, zoneout_mask.is_some()));

        let act_wx_norm = arena.view(Region::WxNorm);
        let act_rh = arena.view(Region::Rh);
        let rh_stats = arena.view(Region::RhNormCache);

        let mut input_grads = NormGradients::zeros(width, device);
        let mut recurrent_grads = NormGradients::zeros(width, device);
        let mut dh = Tensor::<B, 2>::zeros([batch_size, hidden], device);
        let mut dc = Tensor::<B, 2>::zeros([batch_size, hidden], device);
        let mut dr = Tensor::<B, 2>::zeros([hidden, width], device);
        let mut db = Tensor::<B, 1>::zeros([width], device);
        let mut d_pre = Vec::with_capacity(time_steps);

        for step in (0..time_steps).rev() {
            let dh_total = dh + time_step(&dh_new, step);
            let dc_total = dc + time_step(&dc_new, step);

            let rh = time_step(&act_rh, step);
            let stats = time_step(&rh_stats, step);
            let rh_norm = recurrent_norm.reapply(rh.clone(), stats.clone());
            let mask = zoneout_mask.as_ref().map(|m| time_step(m, step));

            let grads = cell.backward(
                time_step(&act_wx_norm, step),
                rh_norm,
                time_step(&c, step),
                mask,
                dh_total,
                dc_total,
            );

            let d_rh = recurrent_norm.backward(
                rh,
                stats,
                grads.pre_activation.clone(),
                &mut recurrent_grads,
            );
            dr = dr + time_step(&h, step).transpose().matmul(d_rh.clone());
            db = db + grads.pre_activation.clone().sum_dim(0).reshape([width]);

            dh = grads.h_prev + orchestrator.recurrent(step, d_rh, recurrent_kernel_t.clone());
            dc = grads.c_prev;
            trace!(step, "backward step issued");

            d_pre.push(grads.pre_activation);
        }
        d_pre.reverse();

        // d(act_Wx_norm) is the pre-activation gradient of every step.
        let d_wx_norm = Tensor::cat(d_pre, 0);
        let act_wx = arena.view(Region::Wx).reshape([rows, width]);
        let wx_stats = arena.view(Region::WxNormCache).reshape([rows, 2]);
        let d_wx = input_norm.backward(act_wx, wx_stats, d_wx_norm, &mut input_grads);

        let dx = d_wx
            .clone()
            .matmul(kernel_t)
            .reshape([time_steps, batch_size, input_size]);
        let x = x_t.permute([1, 2, 0]).reshape([rows, input_size]);
        let dw = x.transpose().matmul(d_wx);

        LayerNormLstmGrads {
            dx,
            dw,
            dr,
            db,
            dalpha: Tensor::stack(vec![input_grads.alpha, recurrent_grads.alpha], 0),
            dbeta: Tensor::stack(vec![input_grads.beta, recurrent_grads.beta], 0),
        }
    }
}
