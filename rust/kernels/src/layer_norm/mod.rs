//! Row-wise layer normalization with cached statistics.
//!
//! Forward normalizes each row of a `[rows, cols]` matrix and writes a
//! `[rows, 2]` cache of `(mean, inverse_stddev)`. Backward reads that cache
//! instead of recomputing the moments.

mod kernel;
mod launch;
mod reference;
mod types;

pub use kernel::{
    layer_norm_backward_input_kernel, layer_norm_backward_params_kernel, layer_norm_forward_kernel,
};
pub use launch::{
    launch_layer_norm_backward_input, launch_layer_norm_backward_params, launch_layer_norm_forward,
};
pub use types::{
    LayerNormConfig, LayerNormGradInputs, LayerNormGradOutputs, LayerNormInputs, LayerNormKernel,
    LayerNormOutputs, LayerNormSaved,
};
