use crate::{
    bundle::tensor_bundle,
    gate::{Gate, GateOrder, ZoneoutBlend},
};

tensor_bundle! {
    /// Normalized projections `[N, 4H]`, `bias: [4H]`, previous state and the
    /// step's zoneout mask `[N, H]`. The mask is not read unless zoneout is enabled.
    pub struct CellInputs { wx_norm, rh_norm, bias, h_prev, c_prev, zoneout_mask }
}

tensor_bundle! {
    /// New hidden and cell state, `[N, H]`.
    pub struct CellOutputs { h, c }
}

tensor_bundle! {
    /// Enough to recompute every gate and the pre-blend cell state.
    pub struct CellSaved { wx_norm, rh_norm, bias, c_prev, zoneout_mask }
}

tensor_bundle! {
    /// Total gradient reaching this step's `h` and `c`.
    pub struct CellGradOutputs { h, c }
}

tensor_bundle! {
    /// `pre_activation: [N, 4H]`, and the direct contributions to the
    /// previous step's state gradients, `[N, H]`.
    pub struct CellGradInputs { pre_activation, h_prev, c_prev }
}

/// Marker type for the LSTM cell kernel family.
#[derive(Debug, Clone, Copy)]
pub struct LstmCellKernel;

/// Compile-time configuration: gate offsets within a row and the zoneout mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CellConfig {
    pub hidden: usize,
    pub input_offset: usize,
    pub forget_offset: usize,
    pub cell_offset: usize,
    pub output_offset: usize,
    pub zoneout: bool,
    pub retain_on_one: bool,
}

impl CellConfig {
    /// `zoneout` is `None` when the blend step is skipped entirely.
    #[must_use]
    pub fn new(hidden: usize, order: GateOrder, zoneout: Option<ZoneoutBlend>) -> Self {
        Self {
            hidden,
            input_offset: order.slot(Gate::Input) * hidden,
            forget_offset: order.slot(Gate::Forget) * hidden,
            cell_offset: order.slot(Gate::Cell) * hidden,
            output_offset: order.slot(Gate::Output) * hidden,
            zoneout: zoneout.is_some(),
            retain_on_one: !matches!(zoneout, Some(ZoneoutBlend::RetainOnZero)),
        }
    }

    /// Gate offsets sorted by position along the `4 * hidden` axis.
    #[must_use]
    pub fn offsets(&self) -> [(Gate, usize); 4] {
        let mut offsets = [
            (Gate::Input, self.input_offset),
            (Gate::Forget, self.forget_offset),
            (Gate::Cell, self.cell_offset),
            (Gate::Output, self.output_offset),
        ];
        offsets.sort_by_key(|(_, offset)| *offset);
        offsets
    }
}
