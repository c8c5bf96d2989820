#![warn(clippy::pedantic)]
#![allow(
    clippy::too_many_arguments,
    clippy::similar_names,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc,
    clippy::doc_markdown,
    clippy::default_trait_access,
    //
    clippy::cast_sign_loss,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_possible_wrap,
    //
    clippy::too_many_lines,
    clippy::type_complexity,
)]

//! Layer-normalized LSTM
//!
//! This crate provides:
//! - [`layer_norm_lstm`] / [`layer_norm_lstm_grad`] - fused forward and
//!   backward over a whole sequence
//! - [`LayerNormLstmConfig`] - attributes shared by both calls
//! - [`ArenaLayout`] - the activation cache contract between the two calls
//! - the per-step pieces: [`LayerNormTransform`], [`LstmCell`] and
//!   [`StepOrchestrator`]

use burn::tensor::{Tensor, backend::Backend};
use lnlstm_kernels::{FusedKernelBackend, LayerNormKernel, LstmCellKernel};

pub mod api;
pub mod arena;
pub mod backward;
pub mod cell;
pub mod config;
pub mod error;
pub mod forward;
pub mod layer_norm;
pub mod orchestrator;
pub mod test_utils;

#[cfg(test)]
mod tests;

pub use api::{
    LayerNormLstmGradInputs, LayerNormLstmGrads, LayerNormLstmInputs, LayerNormLstmOutputs,
    layer_norm_lstm, layer_norm_lstm_grad,
};
pub use arena::{Arena, ArenaLayout, Region};
pub use backward::BackwardPass;
pub use cell::{CellStepGrads, LstmCell};
#[cfg(any(feature = "cuda", feature = "rocm", feature = "wgpu", feature = "cpu"))]
pub use config::GpuBackend;
pub use config::{LayerNormLstmConfig, ReferenceAutodiffBackend, ReferenceBackend};
pub use error::{LstmError, Result};
pub use forward::ForwardPass;
pub use layer_norm::{LayerNormTransform, NormGradients};
pub use lnlstm_kernels::{GateOrder, ZoneoutBlend};
pub use orchestrator::StepOrchestrator;

/// Backends that can run both kernel families.
pub trait LstmBackend:
    FusedKernelBackend<LayerNormKernel> + FusedKernelBackend<LstmCellKernel>
{
}

impl<B> LstmBackend for B where
    B: FusedKernelBackend<LayerNormKernel> + FusedKernelBackend<LstmCellKernel>
{
}

/// Row block `step` of a `[T, N, W]` sequence, as `[N, W]`.
pub(crate) fn time_step<B: Backend>(sequence: &Tensor<B, 3>, step: usize) -> Tensor<B, 2> {
    let [_, rows, width] = sequence.dims();
    sequence.clone().narrow(0, step, 1).reshape([rows, width])
}
