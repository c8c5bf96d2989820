//! Forward recurrence engine.
//!
//! The input projection and its layer norm cover the whole sequence at once.
//! Only the recurrent projection, its layer norm and the cell update run per
//! step. Every intermediate the backward engine needs lands in the arena.

use burn::tensor::Tensor;
use tracing::trace;

use crate::{
    LstmBackend,
    api::LayerNormLstmOutputs,
    arena::{ArenaLayout, Region},
    cell::LstmCell,
    config::LayerNormLstmConfig,
    layer_norm::LayerNormTransform,
    orchestrator::StepOrchestrator,
    time_step,
};

#[derive(Clone, Debug)]
pub struct ForwardPass {
    config: LayerNormLstmConfig,
    batch_size: usize,
    input_size: usize,
    hidden_size: usize,
}

impl ForwardPass {
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

    /// Issue the whole forward sequence. Does not wait for the device.
    ///
    /// `zoneout_mask` is already resolved: `None` skips the blend.
    pub fn run<B: LstmBackend>(
        &self,
        orchestrator: &mut StepOrchestrator<'_, B>,
        x: Tensor<B, 3>,
        kernel: Tensor<B, 2>,
        recurrent_kernel: Tensor<B, 2>,
        bias: Tensor<B, 1>,
        alpha: &Tensor<B, 2>,
        beta: &Tensor<B, 2>,
        zoneout_mask: Option<Tensor<B, 3>>,
    ) -> LayerNormLstmOutputs<B> {
        let [time_steps, batch_size, input_size] = x.dims();
        debug_assert_eq!((batch_size, input_size), (self.batch_size, self.input_size));
        let hidden = self.hidden_size;
        let width = hidden * 4;
        let device = orchestrator.device();

        let layout = ArenaLayout::lstm(time_steps, batch_size, hidden);
        let norm_config = self.config.layer_norm();
        let input_norm = LayerNormTransform::from_params(alpha, beta, 0, norm_config);
        let recurrent_norm = LayerNormTransform::from_params(alpha, beta, 1, norm_config);
        let cell = LstmCell::new(bias, self.config.cell(hidden, zoneout_mask.is_some()));

        let act_wx = orchestrator.project_sequence(x, kernel);
        let (act_wx_norm, wx_stats) = input_norm.forward(act_wx.clone());

        let mut h = Vec::with_capacity(time_steps + 1);
        let mut c = Vec::with_capacity(time_steps + 1);
        h.push(Tensor::<B, 2>::zeros([batch_size, hidden], device));
        c.push(Tensor::<B, 2>::zeros([batch_size, hidden], device));
        let mut act_rh = Vec::with_capacity(time_steps);
        let mut rh_stats = Vec::with_capacity(time_steps);

        for step in 0..time_steps {
            let h_prev = h[step].clone();
            let c_prev = c[step].clone();

            let rh = orchestrator.recurrent(step, h_prev.clone(), recurrent_kernel.clone());
            let (rh_norm, stats) = recurrent_norm.forward(rh.clone());
            let wx_norm = act_wx_norm.clone().narrow(0, step * batch_size, batch_size);
            let mask = zoneout_mask.as_ref().map(|m| time_step(m, step));

            let (h_new, c_new) = cell.forward(wx_norm, rh_norm, h_prev, c_prev, mask);
            trace!(step, "forward step issued");

            h.push(h_new);
            c.push(c_new);
            act_rh.push(rh);
            rh_stats.push(stats);
        }

        let cache = layout.pack(vec![
            (
                Region::Wx,
                act_wx.reshape([time_steps, batch_size, width]),
            ),
            (
                Region::WxNorm,
                act_wx_norm.reshape([time_steps, batch_size, width]),
            ),
            (
                Region::WxNormCache,
                wx_stats.reshape([time_steps, batch_size, 2]),
            ),
            (Region::Rh, Tensor::stack(act_rh, 0)),
            (Region::RhNormCache, Tensor::stack(rh_stats, 0)),
        ]);

        LayerNormLstmOutputs {
            h: Tensor::stack(h, 0),
            c: Tensor::stack(c, 0),
            cache,
        }
    }
}
