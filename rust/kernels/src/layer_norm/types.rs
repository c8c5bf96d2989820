use crate::bundle::tensor_bundle;

tensor_bundle! {
    /// `input: [rows, cols]`, `alpha`/`beta`: `[cols]`.
    pub struct LayerNormInputs { input, alpha, beta }
}

tensor_bundle! {
    /// `output: [rows, cols]`, `stats: [rows, 2]` holding `(mean, inverse_stddev)`.
    pub struct LayerNormOutputs { output, stats }
}

tensor_bundle! {
    /// What backward needs from forward: the un-normalized input and its stats.
    pub struct LayerNormSaved { input, alpha, stats }
}

tensor_bundle! {
    /// Upstream gradient w.r.t. the normalized output.
    pub struct LayerNormGradOutputs { output }
}

tensor_bundle! {
    /// `input: [rows, cols]`, `alpha`/`beta`: `[cols]`, summed over rows.
    pub struct LayerNormGradInputs { input, alpha, beta }
}

/// Marker type for the layer norm kernel family.
#[derive(Debug, Clone, Copy)]
pub struct LayerNormKernel;

const EPSILON_SCALE_INV: f32 = 1e-9;

/// Compile-time configuration. Epsilon is stored scaled so the config stays
/// hashable for kernel caching.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LayerNormConfig {
    pub epsilon_scaled: u32,
}

impl LayerNormConfig {
    /// Smallest epsilon the scaled encoding keeps non-zero.
    pub const MIN_EPSILON: f32 = EPSILON_SCALE_INV;
    /// Largest epsilon accepted; `u32::MAX` scaled steps is about 4.29.
    pub const MAX_EPSILON: f32 = 4.0;

    #[must_use]
    pub fn new(epsilon: f32) -> Self {
        Self {
            epsilon_scaled: (epsilon / EPSILON_SCALE_INV).round() as u32,
        }
    }

    #[must_use]
    pub fn epsilon(&self) -> f32 {
        self.epsilon_scaled as f32 * EPSILON_SCALE_INV
    }
}
