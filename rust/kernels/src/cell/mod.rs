//! Pointwise LSTM cell: gate nonlinearities, state update and zoneout blend.
//!
//! One unit handles one `(batch, hidden)` element and reads its four gate
//! pre-activations from the `4 * hidden` wide rows.

mod kernel;
mod launch;
mod reference;
mod types;

pub use kernel::{lstm_cell_backward_kernel, lstm_cell_forward_kernel};
pub use launch::{launch_lstm_cell_backward, launch_lstm_cell_forward};
pub use types::{
    CellConfig, CellGradInputs, CellGradOutputs, CellInputs, CellOutputs, CellSaved,
    LstmCellKernel,
};
