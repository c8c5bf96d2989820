#![warn(clippy::pedantic)]
#![allow(
    clippy::missing_panics_doc,
    clippy::missing_errors_doc,
    clippy::cast_precision_loss
)]

//! Operator tooling for the layer-normalized LSTM: timing runs and a
//! finite-difference gradient check.

pub mod bench;
pub mod gradcheck;

/// Backend the benchmarks run on: the GPU backend when one is compiled in,
/// the reference backend otherwise.
#[cfg(any(feature = "cuda", feature = "rocm", feature = "wgpu", feature = "cpu"))]
pub type BenchBackend<F = f32> = lnlstm_core::GpuBackend<F>;

#[cfg(not(any(feature = "cuda", feature = "rocm", feature = "wgpu", feature = "cpu")))]
pub type BenchBackend<F = f32> = lnlstm_core::ReferenceBackend<F>;

#[must_use]
pub fn backend_name() -> &'static str {
    if cfg!(feature = "cuda") {
        "cuda"
    } else if cfg!(feature = "rocm") {
        "rocm"
    } else if cfg!(feature = "wgpu") {
        "wgpu"
    } else if cfg!(feature = "cpu") {
        "cpu"
    } else {
        "reference"
    }
}
