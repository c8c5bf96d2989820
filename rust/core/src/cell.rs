//! Per-step gate math: pre-activation sum, nonlinearities, state update and
//! zoneout blend, dispatched to the cell kernel.

use burn::tensor::{Tensor, backend::Backend};
use lnlstm_kernels::{
    CellConfig, CellGradOutputs, CellInputs, CellSaved, FusedKernelBackend, LstmCellKernel,
    util::{float, primitive},
};

/// Gradients produced by one backward cell step.
#[derive(Clone, Debug)]
pub struct CellStepGrads<B: Backend> {
    /// `[N, 4H]`, w.r.t. the pre-activation sum (and so w.r.t. each normalized
    /// projection and the bias).
    pub pre_activation: Tensor<B, 2>,
    /// `[N, H]`, the share of `dh` routed straight to the previous step.
    pub h_prev: Tensor<B, 2>,
    /// `[N, H]`, full gradient w.r.t. the previous cell state.
    pub c_prev: Tensor<B, 2>,
}

#[derive(Clone, Debug)]
pub struct LstmCell<B: Backend> {
    bias: Tensor<B, 1>,
    config: CellConfig,
}

impl<B: FusedKernelBackend<LstmCellKernel>> LstmCell<B> {
    #[must_use]
    pub fn new(bias: Tensor<B, 1>, config: CellConfig) -> Self {
        Self { bias, config }
    }

    /// The cell kernel always takes a mask tensor. With zoneout disabled it is
    /// never read, so any `[N, H]` tensor stands in.
    fn mask_or_placeholder(
        &self,
        zoneout_mask: Option<Tensor<B, 2>>,
        placeholder: &Tensor<B, 2>,
    ) -> Tensor<B, 2> {
        debug_assert_eq!(self.config.zoneout, zoneout_mask.is_some());
        zoneout_mask.unwrap_or_else(|| placeholder.clone())
    }

    /// Returns the new `(h, c)`.
    pub fn forward(
        &self,
        wx_norm: Tensor<B, 2>,
        rh_norm: Tensor<B, 2>,
        h_prev: Tensor<B, 2>,
        c_prev: Tensor<B, 2>,
        zoneout_mask: Option<Tensor<B, 2>>,
    ) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let zoneout_mask = self.mask_or_placeholder(zoneout_mask, &c_prev);
        let outputs = B::forward(
            CellInputs {
                wx_norm: primitive(wx_norm),
                rh_norm: primitive(rh_norm),
                bias: primitive(self.bias.clone()),
                h_prev: primitive(h_prev),
                c_prev: primitive(c_prev),
                zoneout_mask: primitive(zoneout_mask),
            },
            self.config,
        );
        (float(outputs.h), float(outputs.c))
    }

    /// `grad_h`/`grad_c` are the total gradients reaching this step's output state.
    pub fn backward(
        &self,
        wx_norm: Tensor<B, 2>,
        rh_norm: Tensor<B, 2>,
        c_prev: Tensor<B, 2>,
        zoneout_mask: Option<Tensor<B, 2>>,
        grad_h: Tensor<B, 2>,
        grad_c: Tensor<B, 2>,
    ) -> CellStepGrads<B> {
        let zoneout_mask = self.mask_or_placeholder(zoneout_mask, &c_prev);
        let grads = B::backward(
            CellSaved {
                wx_norm: primitive(wx_norm),
                rh_norm: primitive(rh_norm),
                bias: primitive(self.bias.clone()),
                c_prev: primitive(c_prev),
                zoneout_mask: primitive(zoneout_mask),
            },
            CellGradOutputs {
                h: primitive(grad_h),
                c: primitive(grad_c),
            },
            self.config,
        );
        CellStepGrads {
            pre_activation: float(grads.pre_activation),
            h_prev: float(grads.h_prev),
            c_prev: float(grads.c_prev),
        }
    }
}
