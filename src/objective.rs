//! Gaussian negative log-likelihood with a predicted log-variance.

use burn::prelude::*;

/// Added to the predicted variance before inverting it.
pub const VARIANCE_EPSILON: f64 = 1e-16;

/// Mean negative log-likelihood of `target` under `N(mean, exp(log_variance))`.
///
/// `output` is the network output of shape `[n, 2]` (mean in column 0, log-variance in
/// column 1) and `target` has shape `[n]`. The result is a single-element tensor averaged over
/// the batch; constant terms are dropped.
pub fn negative_log_likelihood<B: Backend>(output: Tensor<B, 2>, target: Tensor<B, 1>) -> Tensor<B, 1> {
    let [n, _] = output.dims();
    let prediction_mean = output.clone().slice([0..n, 0..1]);
    let log_prediction_variance = output.slice([0..n, 1..2]);
    let prediction_variance_inverse = log_prediction_variance
        .clone()
        .exp()
        .add_scalar(VARIANCE_EPSILON)
        .recip();

    let mean_squared_error = (target.reshape([n, 1]) - prediction_mean).powf_scalar(2.0);
    let log_likelihood = -(mean_squared_error * prediction_variance_inverse.mul_scalar(0.5))
        - log_prediction_variance.mul_scalar(0.5);

    -log_likelihood.mean()
}
