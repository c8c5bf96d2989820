//! Issue order and synchronization for one recurrence run.
//!
//! Device work is queued asynchronously by the backend. The only true
//! dependency edges are the recurrent matmuls: step `t` needs `h[t-1]`
//! forward and `dh[t]` backward. Everything else is issued without waiting,
//! and the host blocks exactly once, in [`StepOrchestrator::finish`].
//!
//! All work goes to the backend's single queue for the device, so issue order
//! is execution order. Nothing is split across streams.

use burn::tensor::{Tensor, backend::Backend};
use tracing::trace;

use crate::error::{LstmError, Result};

/// Borrowed handle to the device for the duration of one run.
#[derive(Debug)]
pub struct StepOrchestrator<'a, B: Backend> {
    device: &'a B::Device,
    barriers: usize,
}

impl<'a, B: Backend> StepOrchestrator<'a, B> {
    #[must_use]
    pub fn new(device: &'a B::Device) -> Self {
        Self {
            device,
            barriers: 0,
        }
    }

    #[must_use]
    pub fn device(&self) -> &'a B::Device {
        self.device
    }

    /// Hoisted projection of a whole `[T, N, C]` sequence, as one `[T*N, C] x [C, W]`
    /// matmul with no recurrent dependency.
    pub fn project_sequence(&self, sequence: Tensor<B, 3>, weights: Tensor<B, 2>) -> Tensor<B, 2> {
        let [time_steps, batch_size, width] = sequence.dims();
        trace!(time_steps, batch_size, width, "sequence projection");
        sequence
            .reshape([time_steps * batch_size, width])
            .matmul(weights)
    }

    /// One recurrent matmul. Its left operand is the output of the previous
    /// step, so this is where step `step` waits on step `step - 1`.
    pub fn recurrent(&mut self, step: usize, lhs: Tensor<B, 2>, rhs: Tensor<B, 2>) -> Tensor<B, 2> {
        self.barriers += 1;
        trace!(step, barrier = self.barriers, "recurrent dependency");
        lhs.matmul(rhs)
    }

    /// Wait for all issued work. Returns the number of recurrent dependency
    /// edges the run issued.
    pub fn finish(self) -> Result<usize> {
        trace!(barriers = self.barriers, "synchronizing");
        B::sync(self.device).map_err(|err| LstmError::Device(format!("{err:?}")))?;
        Ok(self.barriers)
    }
}
