use cubecl::prelude::*;

#[cube]
pub fn sigmoid<F: Float>(x: F) -> F {
    F::new(1.0) / (F::new(1.0) + F::exp(F::new(0.0) - x))
}

/// Derivative of sigmoid given its output `s`.
#[cube]
pub fn sigmoid_grad<F: Float>(s: F) -> F {
    s * (F::new(1.0) - s)
}

#[cube]
pub fn tanh<F: Float>(x: F) -> F {
    F::tanh(x)
}

/// Derivative of tanh given its output `t`.
#[cube]
pub fn tanh_grad<F: Float>(t: F) -> F {
    F::new(1.0) - t * t
}
