use burn::config::Config;
use lnlstm_kernels::{CellConfig, GateOrder, LayerNormConfig, ZoneoutBlend};

/// Attributes shared by the forward and backward operations.
#[derive(Config, Debug)]
pub struct LayerNormLstmConfig {
    /// Training mode: zoneout reads the caller's mask. In inference mode a
    /// non-zero `zoneout_prob` blends by its expectation instead.
    #[config(default = true)]
    pub training: bool,
    /// Zoneout probability. Zero disables zoneout regardless of the mask.
    #[config(default = 0.0)]
    pub zoneout_prob: f32,
    /// Added to the variance before the inverse square root.
    #[config(default = 1e-5)]
    pub epsilon: f32,
    #[config(default = "GateOrder::Ifgo")]
    pub gate_order: GateOrder,
    #[config(default = "ZoneoutBlend::RetainOnOne")]
    pub zoneout_blend: ZoneoutBlend,
}

impl LayerNormLstmConfig {
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn zoneout_enabled(&self) -> bool {
        self.zoneout_prob != 0.0
    }

    #[must_use]
    pub fn layer_norm(&self) -> LayerNormConfig {
        LayerNormConfig::new(self.epsilon)
    }

    #[must_use]
    pub fn cell(&self, hidden_size: usize, zoneout: bool) -> CellConfig {
        CellConfig::new(
            hidden_size,
            self.gate_order,
            zoneout.then_some(self.zoneout_blend),
        )
    }
}

impl Default for LayerNormLstmConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "rocm")]
pub type GpuBackend<F = f32> = burn::backend::Rocm<F>;

#[cfg(feature = "cuda")]
pub type GpuBackend<F = f32> = burn::backend::Cuda<F>;

#[cfg(feature = "wgpu")]
pub type GpuBackend<F = f32> = burn::backend::Wgpu<F>;

#[cfg(feature = "cpu")]
pub type GpuBackend<F = f32> = burn::backend::Cpu<F>;

/// Tensor-op oracle used by tests and `gradcheck`.
pub type ReferenceBackend<F = f64> = burn::backend::NdArray<F>;

pub type ReferenceAutodiffBackend<F = f64> = burn::backend::Autodiff<ReferenceBackend<F>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = LayerNormLstmConfig::new();
        assert!(config.training);
        assert!(config.zoneout_prob.abs() < f32::EPSILON);
        assert_eq!(config.gate_order, GateOrder::Ifgo);
        assert_eq!(config.zoneout_blend, ZoneoutBlend::RetainOnOne);
    }

    #[test]
    fn json_round_trip() {
        let config = LayerNormLstmConfig::new()
            .with_zoneout_prob(0.1)
            .with_gate_order(GateOrder::Igfo);
        let json = serde_json::to_string(&config).unwrap();
        let loaded: LayerNormLstmConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded.gate_order, GateOrder::Igfo);
        assert!((loaded.zoneout_prob - 0.1).abs() < 1e-7);
    }
}
