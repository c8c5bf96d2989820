use burn::tensor::{DType, Distribution, FloatDType, Tensor};
use test_case::test_case;

use crate::{
    ArenaLayout, GateOrder, LayerNormLstmConfig, LayerNormLstmGradInputs, LayerNormLstmGrads,
    LayerNormLstmInputs, LstmError, ReferenceAutodiffBackend, ReferenceBackend, ZoneoutBlend,
    layer_norm_lstm, layer_norm_lstm_grad,
    test_utils::{
        TestDims, assert_data_close, default_test_dims, from_vec, generate_test_inputs,
        random_zoneout_mask, reference_lstm, small_test_dims, to_vec, transfer, transfer_inputs, weighted_loss,
    },
};

type B = ReferenceBackend;
type AD = ReferenceAutodiffBackend;

const FD_STEP: f64 = 1e-6;

#[derive(Clone, Copy, Debug)]
enum Zoneout {
    Off,
    Training(ZoneoutBlend),
    Inference,
}

fn config_for(order: GateOrder, zoneout: Zoneout) -> LayerNormLstmConfig {
    let config = LayerNormLstmConfig::new().with_gate_order(order);
    match zoneout {
        Zoneout::Off => config,
        Zoneout::Training(blend) => config.with_zoneout_prob(0.3).with_zoneout_blend(blend),
        Zoneout::Inference => config.with_zoneout_prob(0.3).with_training(false),
    }
}

fn inputs_for(dims: TestDims, zoneout: Zoneout) -> LayerNormLstmInputs<B> {
    let device = Default::default();
    let mut inputs = generate_test_inputs::<B>(dims, &device);
    if matches!(zoneout, Zoneout::Training(_)) {
        inputs.zoneout_mask = Some(random_zoneout_mask(dims, 0.3, &device));
    }
    inputs
}

fn upstream(dims: TestDims) -> (Tensor<B, 3>, Tensor<B, 3>) {
    let device = Default::default();
    (
        Tensor::random(dims.state_shape(), Distribution::Normal(0.0, 1.0), &device),
        Tensor::random(dims.state_shape(), Distribution::Normal(0.0, 1.0), &device),
    )
}

fn grad_inputs(
    inputs: &LayerNormLstmInputs<B>,
    config: &LayerNormLstmConfig,
    dh_new: Tensor<B, 3>,
    dc_new: Tensor<B, 3>,
) -> LayerNormLstmGradInputs<B> {
    let outputs = layer_norm_lstm(inputs.clone(), config).unwrap();
    LayerNormLstmGradInputs::from_forward(inputs.clone(), outputs, dh_new, dc_new)
}

fn autodiff_grads(
    inputs: &LayerNormLstmInputs<B>,
    config: &LayerNormLstmConfig,
    dh_new: &Tensor<B, 3>,
    dc_new: &Tensor<B, 3>,
) -> LayerNormLstmGrads<B> {
    let device = Default::default();
    let ad = transfer_inputs::<B, AD>(inputs, &device);
    let ad = LayerNormLstmInputs {
        x: ad.x.require_grad(),
        kernel: ad.kernel.require_grad(),
        recurrent_kernel: ad.recurrent_kernel.require_grad(),
        bias: ad.bias.require_grad(),
        alpha: ad.alpha.require_grad(),
        beta: ad.beta.require_grad(),
        zoneout_mask: ad.zoneout_mask,
    };

    let (h, c) = reference_lstm(&ad, config);
    let grads = weighted_loss(
        h,
        c,
        transfer::<B, AD, 3>(dh_new, &device),
        transfer::<B, AD, 3>(dc_new, &device),
    )
    .backward();

    LayerNormLstmGrads {
        dx: ad.x.grad(&grads).unwrap(),
        dw: ad.kernel.grad(&grads).unwrap(),
        dr: ad.recurrent_kernel.grad(&grads).unwrap(),
        db: ad.bias.grad(&grads).unwrap(),
        dalpha: ad.alpha.grad(&grads).unwrap(),
        dbeta: ad.beta.grad(&grads).unwrap(),
    }
}

#[test_case(1, 1, 1, 1 ; "unit")]
#[test_case(5, 3, 6, 4 ; "default")]
#[test_case(7, 2, 3, 5 ; "odd")]
fn forward_shapes(t: usize, n: usize, c: usize, h: usize) {
    let dims = TestDims::new(t, n, c, h);
    let outputs = layer_norm_lstm(inputs_for(dims, Zoneout::Off), &LayerNormLstmConfig::new()).unwrap();

    assert_eq!(outputs.h.dims(), [t + 1, n, h]);
    assert_eq!(outputs.c.dims(), [t + 1, n, h]);
    assert_eq!(outputs.cache.dims(), [ArenaLayout::lstm(t, n, h).num_elements()]);
    assert!(to_vec(outputs.h.narrow(0, 0, 1)).iter().all(|v| *v == 0.0));
    assert!(to_vec(outputs.c.narrow(0, 0, 1)).iter().all(|v| *v == 0.0));
}

#[test_case(GateOrder::Ifgo, Zoneout::Off ; "ifgo")]
#[test_case(GateOrder::Igfo, Zoneout::Off ; "igfo")]
#[test_case(GateOrder::Ifgo, Zoneout::Training(ZoneoutBlend::RetainOnOne) ; "zoneout_retain_on_one")]
#[test_case(GateOrder::Igfo, Zoneout::Training(ZoneoutBlend::RetainOnZero) ; "zoneout_retain_on_zero")]
#[test_case(GateOrder::Ifgo, Zoneout::Inference ; "zoneout_inference")]
fn forward_matches_reference(order: GateOrder, zoneout: Zoneout) {
    let config = config_for(order, zoneout);
    let inputs = inputs_for(default_test_dims(), zoneout);

    let outputs = layer_norm_lstm(inputs.clone(), &config).unwrap();
    let (h, c) = reference_lstm(&inputs, &config);

    assert_data_close(&to_vec(outputs.h), &to_vec(h), 1e-10, 1e-12, "h");
    assert_data_close(&to_vec(outputs.c), &to_vec(c), 1e-10, 1e-12, "c");
}

#[test_case(GateOrder::Ifgo, Zoneout::Off ; "ifgo")]
#[test_case(GateOrder::Igfo, Zoneout::Off ; "igfo")]
#[test_case(GateOrder::Ifgo, Zoneout::Training(ZoneoutBlend::RetainOnOne) ; "zoneout_retain_on_one")]
#[test_case(GateOrder::Igfo, Zoneout::Training(ZoneoutBlend::RetainOnZero) ; "zoneout_retain_on_zero")]
#[test_case(GateOrder::Ifgo, Zoneout::Inference ; "zoneout_inference")]
fn backward_matches_autodiff(order: GateOrder, zoneout: Zoneout) {
    let dims = default_test_dims();
    let config = config_for(order, zoneout);
    let inputs = inputs_for(dims, zoneout);
    let (dh_new, dc_new) = upstream(dims);

    let expected = autodiff_grads(&inputs, &config, &dh_new, &dc_new);
    let grads =
        layer_norm_lstm_grad(grad_inputs(&inputs, &config, dh_new, dc_new), &config).unwrap();

    let (rtol, atol) = (1e-8, 1e-10);
    assert_data_close(&to_vec(grads.dx), &to_vec(expected.dx), rtol, atol, "dx");
    assert_data_close(&to_vec(grads.dw), &to_vec(expected.dw), rtol, atol, "dW");
    assert_data_close(&to_vec(grads.dr), &to_vec(expected.dr), rtol, atol, "dR");
    assert_data_close(&to_vec(grads.db), &to_vec(expected.db), rtol, atol, "db");
    assert_data_close(&to_vec(grads.dalpha), &to_vec(expected.dalpha), rtol, atol, "dalpha");
    assert_data_close(&to_vec(grads.dbeta), &to_vec(expected.dbeta), rtol, atol, "dbeta");
}

#[test]
fn kernel_gradient_matches_finite_difference() {
    let dims = small_test_dims();
    let config = LayerNormLstmConfig::new();
    let inputs = inputs_for(dims, Zoneout::Off);
    let (dh_new, dc_new) = upstream(dims);

    let grads = layer_norm_lstm_grad(
        grad_inputs(&inputs, &config, dh_new.clone(), dc_new.clone()),
        &config,
    )
    .unwrap();

    let loss = |kernel: Vec<f64>| {
        let mut perturbed = inputs.clone();
        perturbed.kernel = from_vec(kernel, [dims.input_size, dims.width()], &Default::default());
        let outputs = layer_norm_lstm(perturbed, &config).unwrap();
        to_vec(weighted_loss(outputs.h, outputs.c, dh_new.clone(), dc_new.clone()))[0]
    };

    let kernel = to_vec(inputs.kernel.clone());
    let numeric: Vec<f64> = (0..kernel.len())
        .map(|i| {
            let mut plus = kernel.clone();
            let mut minus = kernel.clone();
            plus[i] += FD_STEP;
            minus[i] -= FD_STEP;
            (loss(plus) - loss(minus)) / (2.0 * FD_STEP)
        })
        .collect();

    assert_data_close(&to_vec(grads.dw), &numeric, 1e-4, 1e-6, "dW");
}

#[test]
fn zero_probability_ignores_mask() {
    let dims = default_test_dims();
    let config = LayerNormLstmConfig::new();
    let without = inputs_for(dims, Zoneout::Off);
    let mut with = without.clone();
    with.zoneout_mask = Some(random_zoneout_mask(dims, 0.5, &Default::default()));

    let a = layer_norm_lstm(without.clone(), &config).unwrap();
    let b = layer_norm_lstm(with.clone(), &config).unwrap();
    assert_eq!(to_vec(a.h), to_vec(b.h));
    assert_eq!(to_vec(a.c), to_vec(b.c));
    assert_eq!(to_vec(a.cache), to_vec(b.cache));

    let (dh_new, dc_new) = upstream(dims);
    let ga = layer_norm_lstm_grad(
        grad_inputs(&without, &config, dh_new.clone(), dc_new.clone()),
        &config,
    )
    .unwrap();
    let gb = layer_norm_lstm_grad(grad_inputs(&with, &config, dh_new, dc_new), &config).unwrap();
    assert_eq!(to_vec(ga.dx), to_vec(gb.dx));
    assert_eq!(to_vec(ga.dr), to_vec(gb.dr));
}

#[test]
fn empty_mask_disables_zoneout() {
    let dims = default_test_dims();
    let config = LayerNormLstmConfig::new().with_zoneout_prob(0.5);
    let without = inputs_for(dims, Zoneout::Off);
    let mut with = without.clone();
    with.zoneout_mask = Some(Tensor::zeros([0, 0, 0], &Default::default()));

    let a = layer_norm_lstm(without, &config).unwrap();
    let b = layer_norm_lstm(with, &config).unwrap();
    assert_eq!(to_vec(a.h), to_vec(b.h));
}

#[test]
fn full_retention_keeps_initial_state() {
    let dims = default_test_dims();
    let config = LayerNormLstmConfig::new().with_zoneout_prob(0.5);
    let mut inputs = inputs_for(dims, Zoneout::Off);
    inputs.zoneout_mask = Some(Tensor::ones(dims.state_shape(), &Default::default()));

    let outputs = layer_norm_lstm(inputs, &config).unwrap();

    assert!(to_vec(outputs.h).iter().all(|v| *v == 0.0));
    assert!(to_vec(outputs.c).iter().all(|v| *v == 0.0));
}

/// T=2, N=C=H=1. Every layer-norm input row is constant, so both normalized
/// projections collapse to `beta = 0` and the gates depend on the bias only.
fn closed_form_inputs(bias: [f64; 4]) -> LayerNormLstmInputs<B> {
    let device = Default::default();
    LayerNormLstmInputs {
        x: Tensor::from_floats([[[0.7]], [[-1.3]]], &device),
        kernel: Tensor::from_floats([[1.0, 1.0, 1.0, 1.0]], &device),
        recurrent_kernel: Tensor::from_floats([[1.0, 1.0, 1.0, 1.0]], &device),
        bias: Tensor::from_floats(bias, &device),
        alpha: Tensor::ones([2, 4], &device),
        beta: Tensor::zeros([2, 4], &device),
        zoneout_mask: None,
    }
}

#[test]
fn closed_form_zero_state() {
    let outputs =
        layer_norm_lstm(closed_form_inputs([0.0; 4]), &LayerNormLstmConfig::new()).unwrap();

    assert!(to_vec(outputs.h).iter().all(|v| v.abs() < 1e-12));
    assert!(to_vec(outputs.c).iter().all(|v| v.abs() < 1e-12));
}

#[test]
fn closed_form_cell_bias() {
    // Gates i = f = o = sigmoid(0) = 0.5, candidate g = tanh(1).
    let g = 1.0f64.tanh();
    let c1 = 0.5 * g;
    let c2 = 0.5 * c1 + 0.5 * g;
    let expected_c = [0.0, c1, c2];
    let expected_h = [0.0, 0.5 * c1.tanh(), 0.5 * c2.tanh()];

    let config = LayerNormLstmConfig::new();
    let first = layer_norm_lstm(closed_form_inputs([0.0, 0.0, 1.0, 0.0]), &config).unwrap();
    assert_data_close(&to_vec(first.h.clone()), &expected_h, 1e-12, 1e-12, "h");
    assert_data_close(&to_vec(first.c.clone()), &expected_c, 1e-12, 1e-12, "c");

    for _ in 0..3 {
        let again = layer_norm_lstm(closed_form_inputs([0.0, 0.0, 1.0, 0.0]), &config).unwrap();
        assert_eq!(to_vec(again.h), to_vec(first.h.clone()));
        assert_eq!(to_vec(again.cache), to_vec(first.cache.clone()));
    }
}

#[test]
fn backward_is_deterministic() {
    let dims = default_test_dims();
    let config = config_for(GateOrder::Ifgo, Zoneout::Training(ZoneoutBlend::RetainOnOne));
    let inputs = inputs_for(dims, Zoneout::Training(ZoneoutBlend::RetainOnOne));
    let (dh_new, dc_new) = upstream(dims);
    let grad_inputs = grad_inputs(&inputs, &config, dh_new, dc_new);

    let a = layer_norm_lstm_grad(grad_inputs.clone(), &config).unwrap();
    let b = layer_norm_lstm_grad(grad_inputs, &config).unwrap();

    assert_eq!(to_vec(a.dw), to_vec(b.dw));
    assert_eq!(to_vec(a.dalpha), to_vec(b.dalpha));
    assert_eq!(to_vec(a.dbeta), to_vec(b.dbeta));
}

#[test]
fn rejects_input_width_mismatch() {
    let mut inputs = inputs_for(TestDims::new(2, 2, 3, 2), Zoneout::Off);
    inputs.kernel = Tensor::zeros([4, 8], &Default::default());

    let err = layer_norm_lstm(inputs, &LayerNormLstmConfig::new()).unwrap_err();

    assert!(
        matches!(&err, LstmError::InvalidArgument(msg) if msg == "input[2] and kernel[0] dimensions must match. Found 3 and 4"),
        "{err}"
    );
}

#[test]
fn rejects_mask_shape_mismatch() {
    let dims = small_test_dims();
    let mut inputs = inputs_for(dims, Zoneout::Off);
    inputs.zoneout_mask = Some(Tensor::ones([dims.time_steps, dims.batch_size, 1], &Default::default()));

    let err = layer_norm_lstm(inputs, &LayerNormLstmConfig::new().with_zoneout_prob(0.1)).unwrap_err();

    assert!(matches!(err, LstmError::InvalidArgument(_)), "{err}");
}

#[test]
fn rejects_upstream_gradient_shape() {
    let dims = small_test_dims();
    let config = LayerNormLstmConfig::new();
    let inputs = inputs_for(dims, Zoneout::Off);
    let (dh_new, dc_new) = upstream(dims);
    let mut grad_inputs = grad_inputs(&inputs, &config, dh_new, dc_new);
    grad_inputs.dh_new = grad_inputs.h.clone();

    let err = layer_norm_lstm_grad(grad_inputs, &config).unwrap_err();

    assert!(matches!(err, LstmError::InvalidArgument(ref msg) if msg.starts_with("dh_new")), "{err}");
}

#[test]
#[should_panic(expected = "cache holds")]
fn backward_rejects_foreign_cache() {
    let dims = small_test_dims();
    let config = LayerNormLstmConfig::new();
    let inputs = inputs_for(dims, Zoneout::Off);
    let (dh_new, dc_new) = upstream(dims);
    let mut grad_inputs = grad_inputs(&inputs, &config, dh_new, dc_new);

    let other = TestDims::new(dims.time_steps + 1, dims.batch_size, dims.input_size, dims.hidden_size);
    grad_inputs.cache = layer_norm_lstm(inputs_for(other, Zoneout::Off), &config)
        .unwrap()
        .cache;

    let _ = layer_norm_lstm_grad(grad_inputs, &config);
}

#[test_case(1e-10 ; "epsilon_below_encoding")]
#[test_case(-1.0 ; "negative_epsilon")]
#[test_case(10.0 ; "epsilon_above_encoding")]
#[test_case(f32::NAN ; "nan_epsilon")]
fn rejects_unrepresentable_epsilon(epsilon: f32) {
    let config = LayerNormLstmConfig::new().with_epsilon(epsilon);
    let inputs = inputs_for(small_test_dims(), Zoneout::Off);

    let err = layer_norm_lstm(inputs, &config).unwrap_err();

    assert!(matches!(err, LstmError::InvalidArgument(ref msg) if msg.starts_with("epsilon")), "{err}");
}

#[test_case(-0.1 ; "negative")]
#[test_case(1.5 ; "above_one")]
fn rejects_zoneout_probability_outside_unit_interval(zoneout_prob: f32) {
    let dims = small_test_dims();
    let config = LayerNormLstmConfig::new().with_zoneout_prob(zoneout_prob);
    let mut inputs = inputs_for(dims, Zoneout::Off);
    inputs.zoneout_mask = Some(random_zoneout_mask(dims, 0.5, &Default::default()));

    let err = layer_norm_lstm(inputs, &config).unwrap_err();

    assert!(
        matches!(err, LstmError::InvalidArgument(ref msg) if msg.starts_with("zoneout_prob")),
        "{err}"
    );
}

#[test]
fn backward_rejects_invalid_config() {
    let dims = small_test_dims();
    let config = LayerNormLstmConfig::new();
    let inputs = inputs_for(dims, Zoneout::Off);
    let (dh_new, dc_new) = upstream(dims);
    let grad_inputs = grad_inputs(&inputs, &config, dh_new, dc_new);

    let err = layer_norm_lstm_grad(grad_inputs, &config.with_epsilon(0.0)).unwrap_err();

    assert!(matches!(err, LstmError::InvalidArgument(_)), "{err}");
}

#[test]
fn smallest_epsilon_keeps_zero_rows_finite() {
    let config = LayerNormLstmConfig::new().with_epsilon(1e-9);

    let outputs = layer_norm_lstm(closed_form_inputs([0.0, 0.0, 1.0, 0.0]), &config).unwrap();

    assert!(to_vec(outputs.h).iter().all(|v| v.is_finite()));
    assert!(to_vec(outputs.c).iter().all(|v| v.is_finite()));
}

#[test]
fn rejects_mixed_precision_operands() {
    let mut inputs = inputs_for(small_test_dims(), Zoneout::Off);
    inputs.kernel = inputs.kernel.cast(FloatDType::F32);

    let err = layer_norm_lstm(inputs, &LayerNormLstmConfig::new()).unwrap_err();

    assert!(
        matches!(err, LstmError::InvalidArgument(ref msg) if msg.starts_with("all operands must share one dtype")),
        "{err}"
    );
}

#[test]
fn backward_rejects_mixed_precision_upstream() {
    let dims = small_test_dims();
    let config = LayerNormLstmConfig::new();
    let inputs = inputs_for(dims, Zoneout::Off);
    let (dh_new, dc_new) = upstream(dims);
    let mut grad_inputs = grad_inputs(&inputs, &config, dh_new, dc_new);
    grad_inputs.dc_new = grad_inputs.dc_new.cast(FloatDType::F32);

    let err = layer_norm_lstm_grad(grad_inputs, &config).unwrap_err();

    assert!(matches!(err, LstmError::InvalidArgument(_)), "{err}");
}

#[test_case(Zoneout::Off ; "plain")]
#[test_case(Zoneout::Training(ZoneoutBlend::RetainOnOne) ; "zoneout")]
fn single_precision_matches_double(zoneout: Zoneout) {
    type B32 = ReferenceBackend<f32>;

    let dims = default_test_dims();
    let config = config_for(GateOrder::Ifgo, zoneout);
    let inputs = inputs_for(dims, zoneout);
    let (dh_new, dc_new) = upstream(dims);

    let outputs = layer_norm_lstm(inputs.clone(), &config).unwrap();
    let grads = layer_norm_lstm_grad(
        LayerNormLstmGradInputs::from_forward(
            inputs.clone(),
            outputs.clone(),
            dh_new.clone(),
            dc_new.clone(),
        ),
        &config,
    )
    .unwrap();

    let device = Default::default();
    let inputs32 = transfer_inputs::<B, B32>(&inputs, &device);
    let outputs32 = layer_norm_lstm(inputs32.clone(), &config).unwrap();
    assert_eq!(outputs32.h.dtype(), DType::F32);
    assert_eq!(outputs32.cache.dtype(), DType::F32);
    let grads32 = layer_norm_lstm_grad(
        LayerNormLstmGradInputs::from_forward(
            inputs32,
            outputs32.clone(),
            transfer::<B, B32, 3>(&dh_new, &device),
            transfer::<B, B32, 3>(&dc_new, &device),
        ),
        &config,
    )
    .unwrap();

    let (rtol, atol) = (1e-3, 1e-4);
    assert_data_close(&to_vec(outputs32.h), &to_vec(outputs.h), rtol, atol, "h");
    assert_data_close(&to_vec(outputs32.c), &to_vec(outputs.c), rtol, atol, "c");
    assert_data_close(&to_vec(grads32.dx), &to_vec(grads.dx), rtol, atol, "dx");
    assert_data_close(&to_vec(grads32.dw), &to_vec(grads.dw), rtol, atol, "dW");
    assert_data_close(&to_vec(grads32.dr), &to_vec(grads.dr), rtol, atol, "dR");
    assert_data_close(&to_vec(grads32.dalpha), &to_vec(grads.dalpha), rtol, atol, "dalpha");
}
