#![warn(clippy::pedantic)]
#![allow(clippy::too_many_arguments)]
#![allow(
    clippy::trivially_copy_pass_by_ref,
    reason = "erroneous false positives on #[cube] functions"
)]
#![allow(
    clippy::similar_names,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc,
    clippy::doc_markdown,
    clippy::cast_sign_loss,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::many_single_char_names,
    clippy::type_complexity
)]
//! Layer-normalized LSTM kernels
//!
//! Device kernels for the two pieces of per-step math the recurrence engines
//! cannot express as a matmul:
//! - [`LayerNormKernel`] - row-wise layer norm forward, input backward and
//!   scale/shift backward
//! - [`LstmCellKernel`] - gate nonlinearities, state update and zoneout blend
//!
//! Both implement [`FusedKernel`]; backends opt in through
//! [`FusedKernelBackend`].

/// Launch a CubeCL kernel with bounds checking in debug builds,
/// unchecked in release builds for performance. Must be called inside `unsafe`.
macro_rules! cube_launch {
    ($kernel:ident :: < $($ty:ty),+ > ( $($args:expr),* $(,)? )) => {{
        #[cfg(debug_assertions)]
        { $kernel::launch::< $($ty),+ >( $($args),* ).unwrap() }
        #[cfg(not(debug_assertions))]
        { $kernel::launch_unchecked::< $($ty),+ >( $($args),* ).unwrap() }
    }};
}

mod activation;
pub mod bundle;
pub mod cell;
pub mod gate;
pub mod impls;
pub mod kernel;
pub mod layer_norm;
pub mod util;


pub use bundle::TensorBundle;
pub use cell::{
    CellConfig, CellGradInputs, CellGradOutputs, CellInputs, CellOutputs, CellSaved,
    LstmCellKernel,
};
pub use gate::{Gate, GateOrder, ZoneoutBlend};
pub use kernel::{FusedKernel, FusedKernelBackend};
pub use layer_norm::{
    LayerNormConfig, LayerNormGradInputs, LayerNormGradOutputs, LayerNormInputs, LayerNormKernel,
    LayerNormOutputs, LayerNormSaved,
};
