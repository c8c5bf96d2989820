use std::fmt::Debug;

use burn::tensor::{backend::Backend, ops::FloatTensor};
use burn_cubecl::{CubeRuntime, FloatElement, kernel::into_contiguous, tensor::CubeTensor};
use cubecl::prelude::*;
use tracing::trace;

use super::{
    kernel::{lstm_cell_backward_kernel, lstm_cell_forward_kernel},
    reference,
    types::{
        CellConfig, CellGradInputs, CellGradOutputs, CellInputs, CellOutputs, CellSaved,
        LstmCellKernel,
    },
};
use crate::{
    TensorBundle,
    kernel::FusedKernel,
    util::{cube_count_1d, empty_like},
};

pub fn launch_lstm_cell_forward<R: Runtime, F: Float + CubeElement>(
    client: &ComputeClient<R>,
    wx_norm: TensorHandleRef<R>,
    rh_norm: TensorHandleRef<R>,
    bias: TensorHandleRef<R>,
    h_prev: TensorHandleRef<R>,
    c_prev: TensorHandleRef<R>,
    zoneout_mask: TensorHandleRef<R>,
    h_out: TensorHandleRef<R>,
    c_out: TensorHandleRef<R>,
    config: CellConfig,
) {
    let num_elements: usize = h_out.shape.iter().product();
    let cube_dim = CubeDim::new(client, num_elements);

    unsafe {
        cube_launch!(lstm_cell_forward_kernel::<F, R>(
            client,
            cube_count_1d(num_elements, cube_dim),
            cube_dim,
            TensorArg::from_raw_parts::<F>(wx_norm.handle, wx_norm.strides, wx_norm.shape, 1),
            TensorArg::from_raw_parts::<F>(rh_norm.handle, rh_norm.strides, rh_norm.shape, 1),
            TensorArg::from_raw_parts::<F>(bias.handle, bias.strides, bias.shape, 1),
            TensorArg::from_raw_parts::<F>(h_prev.handle, h_prev.strides, h_prev.shape, 1),
            TensorArg::from_raw_parts::<F>(c_prev.handle, c_prev.strides, c_prev.shape, 1),
            TensorArg::from_raw_parts::<F>(
                zoneout_mask.handle,
                zoneout_mask.strides,
                zoneout_mask.shape,
                1
            ),
            TensorArg::from_raw_parts::<F>(h_out.handle, h_out.strides, h_out.shape, 1),
            TensorArg::from_raw_parts::<F>(c_out.handle, c_out.strides, c_out.shape, 1),
            config,
        ));
    }
}

pub fn launch_lstm_cell_backward<R: Runtime, F: Float + CubeElement>(
    client: &ComputeClient<R>,
    wx_norm: TensorHandleRef<R>,
    rh_norm: TensorHandleRef<R>,
    bias: TensorHandleRef<R>,
    c_prev: TensorHandleRef<R>,
    zoneout_mask: TensorHandleRef<R>,
    grad_h: TensorHandleRef<R>,
    grad_c: TensorHandleRef<R>,
    grad_pre: TensorHandleRef<R>,
    grad_h_prev: TensorHandleRef<R>,
    grad_c_prev: TensorHandleRef<R>,
    config: CellConfig,
) {
    let num_elements: usize = grad_h.shape.iter().product();
    let cube_dim = CubeDim::new(client, num_elements);

    unsafe {
        cube_launch!(lstm_cell_backward_kernel::<F, R>(
            client,
            cube_count_1d(num_elements, cube_dim),
            cube_dim,
            TensorArg::from_raw_parts::<F>(wx_norm.handle, wx_norm.strides, wx_norm.shape, 1),
            TensorArg::from_raw_parts::<F>(rh_norm.handle, rh_norm.strides, rh_norm.shape, 1),
            TensorArg::from_raw_parts::<F>(bias.handle, bias.strides, bias.shape, 1),
            TensorArg::from_raw_parts::<F>(c_prev.handle, c_prev.strides, c_prev.shape, 1),
            TensorArg::from_raw_parts::<F>(
                zoneout_mask.handle,
                zoneout_mask.strides,
                zoneout_mask.shape,
                1
            ),
            TensorArg::from_raw_parts::<F>(grad_h.handle, grad_h.strides, grad_h.shape, 1),
            TensorArg::from_raw_parts::<F>(grad_c.handle, grad_c.strides, grad_c.shape, 1),
            TensorArg::from_raw_parts::<F>(grad_pre.handle, grad_pre.strides, grad_pre.shape, 1),
            TensorArg::from_raw_parts::<F>(
                grad_h_prev.handle,
                grad_h_prev.strides,
                grad_h_prev.shape,
                1
            ),
            TensorArg::from_raw_parts::<F>(
                grad_c_prev.handle,
                grad_c_prev.strides,
                grad_c_prev.shape,
                1
            ),
            config,
        ));
    }
}

impl FusedKernel for LstmCellKernel {
    type Inputs<T: Debug + Clone + Send> = CellInputs<T>;
    type Outputs<T: Debug + Clone + Send> = CellOutputs<T>;
    type SavedState<T: Debug + Clone + Send> = CellSaved<T>;
    type GradOutputs<T: Debug + Clone + Send> = CellGradOutputs<T>;
    type GradInputs<T: Debug + Clone + Send> = CellGradInputs<T>;
    type Config = CellConfig;

    fn forward_launch<R: CubeRuntime, F: FloatElement>(
        inputs: CellInputs<CubeTensor<R>>,
        config: CellConfig,
    ) -> CellOutputs<CubeTensor<R>> {
        let inputs = inputs.map(into_contiguous);
        let state_shape = inputs.h_prev.shape.clone();
        trace!(?state_shape, zoneout = config.zoneout, "lstm cell forward launch");

        let h = empty_like::<R, F>(&inputs.h_prev, state_shape.clone());
        let c = empty_like::<R, F>(&inputs.c_prev, state_shape);

        launch_lstm_cell_forward::<R, F>(
            &inputs.h_prev.client,
            inputs.wx_norm.as_handle_ref(),
            inputs.rh_norm.as_handle_ref(),
            inputs.bias.as_handle_ref(),
            inputs.h_prev.as_handle_ref(),
            inputs.c_prev.as_handle_ref(),
            inputs.zoneout_mask.as_handle_ref(),
            h.as_handle_ref(),
            c.as_handle_ref(),
            config,
        );

        CellOutputs { h, c }
    }

    fn backward_launch<R: CubeRuntime, F: FloatElement>(
        saved: CellSaved<CubeTensor<R>>,
        grad_outputs: CellGradOutputs<CubeTensor<R>>,
        config: CellConfig,
    ) -> CellGradInputs<CubeTensor<R>> {
        let saved = saved.map(into_contiguous);
        let grad_outputs = grad_outputs.map(into_contiguous);
        let state_shape = grad_outputs.h.shape.clone();
        trace!(?state_shape, zoneout = config.zoneout, "lstm cell backward launch");

        let grad_pre = empty_like::<R, F>(&saved.wx_norm, saved.wx_norm.shape.clone());
        let grad_h_prev = empty_like::<R, F>(&grad_outputs.h, state_shape.clone());
        let grad_c_prev = empty_like::<R, F>(&grad_outputs.c, state_shape);

        launch_lstm_cell_backward::<R, F>(
            &saved.wx_norm.client,
            saved.wx_norm.as_handle_ref(),
            saved.rh_norm.as_handle_ref(),
            saved.bias.as_handle_ref(),
            saved.c_prev.as_handle_ref(),
            saved.zoneout_mask.as_handle_ref(),
            grad_outputs.h.as_handle_ref(),
            grad_outputs.c.as_handle_ref(),
            grad_pre.as_handle_ref(),
            grad_h_prev.as_handle_ref(),
            grad_c_prev.as_handle_ref(),
            config,
        );

        CellGradInputs {
            pre_activation: grad_pre,
            h_prev: grad_h_prev,
            c_prev: grad_c_prev,
        }
    }

    fn forward_reference<B: Backend>(
        inputs: CellInputs<FloatTensor<B>>,
        config: CellConfig,
    ) -> CellOutputs<FloatTensor<B>> {
        reference::forward::<B>(inputs, config)
    }

    fn backward_reference<B: Backend>(
        saved: CellSaved<FloatTensor<B>>,
        grad_outputs: CellGradOutputs<FloatTensor<B>>,
        config: CellConfig,
    ) -> CellGradInputs<FloatTensor<B>> {
        reference::backward::<B>(saved, grad_outputs, config)
    }
}
