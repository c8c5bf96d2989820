//! Gate layout within the `4 * hidden` pre-activation axis and the zoneout
//! blend convention.

use serde::{Deserialize, Serialize};

/// One of the four LSTM gates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Gate {
    Input,
    Forget,
    Cell,
    Output,
}

/// Order of the gate chunks inside the pre-activation row.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GateOrder {
    /// input, forget, cell candidate, output.
    #[default]
    Ifgo,
    /// input, cell candidate, forget, output.
    Igfo,
}

impl GateOrder {
    /// Chunk index of `gate`.
    #[must_use]
    pub fn slot(self, gate: Gate) -> usize {
        match (self, gate) {
            (_, Gate::Input) => 0,
            (Self::Ifgo, Gate::Forget) | (Self::Igfo, Gate::Cell) => 1,
            (Self::Ifgo, Gate::Cell) | (Self::Igfo, Gate::Forget) => 2,
            (_, Gate::Output) => 3,
        }
    }
}

/// Which zoneout mask value keeps the previous state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ZoneoutBlend {
    /// `h = m * h_prev + (1 - m) * h_new`
    #[default]
    RetainOnOne,
    /// `h = (1 - m) * h_prev + m * h_new`
    RetainOnZero,
}

impl ZoneoutBlend {
    /// Mask value whose blend keeps the previous state with weight `retention`.
    #[must_use]
    pub fn mask_value(self, retention: f64) -> f64 {
        match self {
            Self::RetainOnOne => retention,
            Self::RetainOnZero => 1.0 - retention,
        }
    }
}
