use std::fmt::Debug;

use burn::tensor::{backend::Backend, ops::FloatTensor};
use burn_cubecl::{CubeRuntime, FloatElement, kernel::into_contiguous, tensor::CubeTensor};
use cubecl::prelude::*;
use tracing::trace;

use super::{
    kernel::{
        layer_norm_backward_input_kernel, layer_norm_backward_params_kernel,
        layer_norm_forward_kernel,
    },
    reference,
    types::{
        LayerNormConfig, LayerNormGradInputs, LayerNormGradOutputs, LayerNormInputs,
        LayerNormKernel, LayerNormOutputs, LayerNormSaved,
    },
};
use crate::{
    TensorBundle,
    kernel::FusedKernel,
    util::{cube_count_1d, empty_like},
};

pub fn launch_layer_norm_forward<R: Runtime, F: Float + CubeElement>(
    client: &ComputeClient<R>,
    input: TensorHandleRef<R>,
    alpha: TensorHandleRef<R>,
    beta: TensorHandleRef<R>,
    output: TensorHandleRef<R>,
    stats: TensorHandleRef<R>,
    config: LayerNormConfig,
) {
    let rows = input.shape[0];
    let cube_dim = CubeDim::new(client, rows);

    unsafe {
        cube_launch!(layer_norm_forward_kernel::<F, R>(
            client,
            cube_count_1d(rows, cube_dim),
            cube_dim,
            TensorArg::from_raw_parts::<F>(input.handle, input.strides, input.shape, 1),
            TensorArg::from_raw_parts::<F>(alpha.handle, alpha.strides, alpha.shape, 1),
            TensorArg::from_raw_parts::<F>(beta.handle, beta.strides, beta.shape, 1),
            TensorArg::from_raw_parts::<F>(output.handle, output.strides, output.shape, 1),
            TensorArg::from_raw_parts::<F>(stats.handle, stats.strides, stats.shape, 1),
            config,
        ));
    }
}

pub fn launch_layer_norm_backward_input<R: Runtime, F: Float + CubeElement>(
    client: &ComputeClient<R>,
    input: TensorHandleRef<R>,
    alpha: TensorHandleRef<R>,
    stats: TensorHandleRef<R>,
    grad_output: TensorHandleRef<R>,
    grad_input: TensorHandleRef<R>,
) {
    let rows = input.shape[0];
    let cube_dim = CubeDim::new(client, rows);

    unsafe {
        cube_launch!(layer_norm_backward_input_kernel::<F, R>(
            client,
            cube_count_1d(rows, cube_dim),
            cube_dim,
            TensorArg::from_raw_parts::<F>(input.handle, input.strides, input.shape, 1),
            TensorArg::from_raw_parts::<F>(alpha.handle, alpha.strides, alpha.shape, 1),
            TensorArg::from_raw_parts::<F>(stats.handle, stats.strides, stats.shape, 1),
            TensorArg::from_raw_parts::<F>(
                grad_output.handle,
                grad_output.strides,
                grad_output.shape,
                1
            ),
            TensorArg::from_raw_parts::<F>(
                grad_input.handle,
                grad_input.strides,
                grad_input.shape,
                1
            ),
        ));
    }
}

pub fn launch_layer_norm_backward_params<R: Runtime, F: Float + CubeElement>(
    client: &ComputeClient<R>,
    input: TensorHandleRef<R>,
    stats: TensorHandleRef<R>,
    grad_output: TensorHandleRef<R>,
    grad_alpha: TensorHandleRef<R>,
    grad_beta: TensorHandleRef<R>,
) {
    let cols = input.shape[1];
    let cube_dim = CubeDim::new(client, cols);

    unsafe {
        cube_launch!(layer_norm_backward_params_kernel::<F, R>(
            client,
            cube_count_1d(cols, cube_dim),
            cube_dim,
            TensorArg::from_raw_parts::<F>(input.handle, input.strides, input.shape, 1),
            TensorArg::from_raw_parts::<F>(stats.handle, stats.strides, stats.shape, 1),
            TensorArg::from_raw_parts::<F>(
                grad_output.handle,
                grad_output.strides,
                grad_output.shape,
                1
            ),
            TensorArg::from_raw_parts::<F>(
                grad_alpha.handle,
                grad_alpha.strides,
                grad_alpha.shape,
                1
            ),
            TensorArg::from_raw_parts::<F>(grad_beta.handle, grad_beta.strides, grad_beta.shape, 1),
        ));
    }
}

impl FusedKernel for LayerNormKernel {
    type Inputs<T: Debug + Clone + Send> = LayerNormInputs<T>;
    type Outputs<T: Debug + Clone + Send> = LayerNormOutputs<T>;
    type SavedState<T: Debug + Clone + Send> = LayerNormSaved<T>;
    type GradOutputs<T: Debug + Clone + Send> = LayerNormGradOutputs<T>;
    type GradInputs<T: Debug + Clone + Send> = LayerNormGradInputs<T>;
    type Config = LayerNormConfig;

    fn forward_launch<R: CubeRuntime, F: FloatElement>(
        inputs: LayerNormInputs<CubeTensor<R>>,
        config: LayerNormConfig,
    ) -> LayerNormOutputs<CubeTensor<R>> {
        let inputs = inputs.map(into_contiguous);
        let [rows, cols] = inputs.input.shape.dims();
        trace!(rows, cols, "layer norm forward launch");

        let output = empty_like::<R, F>(&inputs.input, [rows, cols]);
        let stats = empty_like::<R, F>(&inputs.input, [rows, 2]);

        launch_layer_norm_forward::<R, F>(
            &inputs.input.client,
            inputs.input.as_handle_ref(),
            inputs.alpha.as_handle_ref(),
            inputs.beta.as_handle_ref(),
            output.as_handle_ref(),
            stats.as_handle_ref(),
            config,
        );

        LayerNormOutputs { output, stats }
    }

    fn backward_launch<R: CubeRuntime, F: FloatElement>(
        saved: LayerNormSaved<CubeTensor<R>>,
        grad_outputs: LayerNormGradOutputs<CubeTensor<R>>,
        _config: LayerNormConfig,
    ) -> LayerNormGradInputs<CubeTensor<R>> {
        let saved = saved.map(into_contiguous);
        let grad_output = into_contiguous(grad_outputs.output);
        let [rows, cols] = saved.input.shape.dims();
        trace!(rows, cols, "layer norm backward launch");

        let grad_input = empty_like::<R, F>(&saved.input, [rows, cols]);
        let grad_alpha = empty_like::<R, F>(&saved.input, [cols]);
        let grad_beta = empty_like::<R, F>(&saved.input, [cols]);

        let client = &saved.input.client;
        launch_layer_norm_backward_input::<R, F>(
            client,
            saved.input.as_handle_ref(),
            saved.alpha.as_handle_ref(),
            saved.stats.as_handle_ref(),
            grad_output.as_handle_ref(),
            grad_input.as_handle_ref(),
        );
        launch_layer_norm_backward_params::<R, F>(
            client,
            saved.input.as_handle_ref(),
            saved.stats.as_handle_ref(),
            grad_output.as_handle_ref(),
            grad_alpha.as_handle_ref(),
            grad_beta.as_handle_ref(),
        );

        LayerNormGradInputs {
            input: grad_input,
            alpha: grad_alpha,
            beta: grad_beta,
        }
    }

    fn forward_reference<B: Backend>(
        inputs: LayerNormInputs<FloatTensor<B>>,
        config: LayerNormConfig,
    ) -> LayerNormOutputs<FloatTensor<B>> {
        reference::forward::<B>(inputs, config)
    }

    fn backward_reference<B: Backend>(
        saved: LayerNormSaved<FloatTensor<B>>,
        grad_outputs: LayerNormGradOutputs<FloatTensor<B>>,
        _config: LayerNormConfig,
    ) -> LayerNormGradInputs<FloatTensor<B>> {
        reference::backward::<B>(saved, grad_outputs)
    }
}
