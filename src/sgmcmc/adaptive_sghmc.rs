//! SGHMC that adapts its own mass and noise estimates during burn-in.
//!
//! See J. T. Springenberg, A. Klein, S. Falkner, F. Hutter, *Bayesian Optimization with
//! Robust Bayesian Neural Networks*, NIPS 2016, Eqs. 8 and 9.

use burn::config::Config;
use burn::prelude::*;

use super::{
    check_learning_rate, check_non_negative, check_positive, standard_normal_like,
    GradientSampler, StateStore,
};
use crate::error::Result;

/// Lower bound of the injected noise variance.
const MIN_NOISE_VARIANCE: f64 = 1e-16;

/// Configuration for [`AdaptiveSghmc`].
#[derive(Config, Debug)]
pub struct AdaptiveSghmcConfig {
    /// Base step size. Enters the momentum update squared.
    #[config(default = 1e-2)]
    pub lr: f64,

    /// Number of per-slot iterations during which the estimates are adapted.
    /// Zero disables adaptation.
    #[config(default = 3000)]
    pub num_burn_in_steps: usize,

    /// Added to `v_hat` when updating the averaging window.
    #[config(default = 1e-16)]
    pub epsilon: f64,

    /// Momentum decay (friction) per step.
    #[config(default = 0.05)]
    pub mdecay: f64,

    /// Constant per-parameter estimate of the gradient noise.
    #[config(default = 0.0)]
    pub noise: f64,

    /// Gradient scale; usually the number of training points.
    #[config(default = 1.0)]
    pub scale_grad: f64,
}

impl Default for AdaptiveSghmcConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-slot adaptive SGHMC state.
#[derive(Debug, Clone)]
pub struct AdaptiveSghmcState<B: Backend> {
    pub iteration: usize,
    /// Length of the moving-average window.
    pub tau: Tensor<B, 2>,
    /// Moving average of the scaled gradient.
    pub g: Tensor<B, 2>,
    /// Moving average of the squared scaled gradient.
    pub v_hat: Tensor<B, 2>,
    /// Velocity.
    pub momentum: Tensor<B, 2>,
}

/// SGHMC whose inverse mass `1 / sqrt(v_hat)` and noise are estimated from squared
/// gradients while `iteration <= num_burn_in_steps`, then frozen.
#[derive(Debug)]
pub struct AdaptiveSghmc<B: Backend> {
    config: AdaptiveSghmcConfig,
    states: StateStore<AdaptiveSghmcState<B>>,
}

impl<B: Backend> AdaptiveSghmc<B> {
    pub fn new(config: AdaptiveSghmcConfig) -> Result<Self> {
        check_learning_rate(config.lr)?;
        check_non_negative("mdecay", config.mdecay)?;
        check_non_negative("noise", config.noise)?;
        check_non_negative("epsilon", config.epsilon)?;
        check_positive("scale_grad", config.scale_grad)?;
        Ok(Self {
            config,
            states: StateStore::new(),
        })
    }

    pub fn config(&self) -> &AdaptiveSghmcConfig {
        &self.config
    }

    /// Replaces the hyperparameters, keeping every slot's state.
    pub(crate) fn set_config(&mut self, config: AdaptiveSghmcConfig) {
        self.config = config;
    }

    pub fn state(&self, index: usize) -> Option<&AdaptiveSghmcState<B>> {
        self.states.get(index)
    }
}

impl<B: Backend> GradientSampler<B> for AdaptiveSghmc<B> {
    fn step(
        &mut self,
        index: usize,
        parameter: Tensor<B, 2>,
        gradient: Tensor<B, 2>,
    ) -> Tensor<B, 2> {
        let AdaptiveSghmcConfig {
            lr,
            num_burn_in_steps,
            epsilon,
            mdecay,
            noise,
            scale_grad,
        } = self.config.clone();

        let state = self.states.get_or_insert_with(index, || AdaptiveSghmcState {
            iteration: 0,
            tau: parameter.ones_like(),
            g: parameter.ones_like(),
            v_hat: parameter.ones_like(),
            momentum: parameter.zeros_like(),
        });
        state.iteration += 1;

        let gradient = gradient.mul_scalar(scale_grad);
        let r_t = state.tau.clone().add_scalar(1.0).recip();
        let minv_t = state.v_hat.clone().sqrt().recip();

        if state.iteration <= num_burn_in_steps {
            let (tau, g, v_hat) = (state.tau.clone(), state.g.clone(), state.v_hat.clone());
            state.tau = (tau.clone()
                - tau * g.clone().powf_scalar(2.0) / v_hat.clone().add_scalar(epsilon))
            .add_scalar(1.0);
            state.g = g.clone() - g * r_t.clone() + r_t.clone() * gradient.clone();
            state.v_hat =
                v_hat.clone() - v_hat * r_t.clone() + r_t * gradient.clone().powf_scalar(2.0);
        }

        let lr_scaled = lr / scale_grad.sqrt();
        let noise_variance = minv_t
            .clone()
            .mul_scalar(2.0 * lr_scaled.powi(2) * mdecay)
            - minv_t.clone().powf_scalar(2.0).mul_scalar(2.0 * lr_scaled.powi(3) * noise);
        let noise_variance = noise_variance.sub_scalar(lr_scaled.powi(4));
        let sigma = noise_variance.clamp_min(MIN_NOISE_VARIANCE).sqrt();
        let sample = standard_normal_like(&parameter) * sigma;

        let momentum = state.momentum.clone();
        state.momentum = momentum.clone() - (minv_t * gradient).mul_scalar(lr.powi(2))
            - momentum.mul_scalar(mdecay)
            + sample;
        parameter + state.momentum.clone()
    }

    fn iteration(&self, index: usize) -> Option<usize> {
        self.states.get(index).map(|state| state.iteration)
    }
}
