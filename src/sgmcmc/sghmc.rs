//! Stochastic Gradient Hamiltonian Monte Carlo.
//!
//! See T. Chen, E. B. Fox, C. Guestrin, *Stochastic Gradient Hamiltonian Monte Carlo*,
//! ICML 2014 (<https://arxiv.org/abs/1402.4102>).

use burn::config::Config;
use burn::prelude::*;

use super::{
    check_learning_rate, check_non_negative, check_positive, standard_normal_like,
    GradientSampler, StateStore,
};
use crate::error::Result;

/// Configuration for [`Sghmc`].
#[derive(Config, Debug)]
pub struct SghmcConfig {
    /// Base step size.
    #[config(default = 1e-2)]
    pub lr: f64,

    /// Momentum decay (friction) per step.
    #[config(default = 0.05)]
    pub mdecay: f64,

    /// Rescales the injected noise; usually the number of training points.
    #[config(default = 1.0)]
    pub scale_grad: f64,
}

impl Default for SghmcConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-slot SGHMC state.
#[derive(Debug, Clone)]
pub struct SghmcState<B: Backend> {
    pub iteration: usize,
    /// Velocity.
    pub momentum: Tensor<B, 2>,
}

/// SGHMC with constant friction and noise.
///
/// Per step, with `σ = sqrt(2 · lr · mdecay / scale_grad)`:
///
/// ```text
/// momentum  ← momentum − lr · gradient − mdecay · momentum + N(0, σ²)
/// parameter ← parameter + momentum
/// ```
#[derive(Debug)]
pub struct Sghmc<B: Backend> {
    config: SghmcConfig,
    states: StateStore<SghmcState<B>>,
}

impl<B: Backend> Sghmc<B> {
    pub fn new(config: SghmcConfig) -> Result<Self> {
        check_learning_rate(config.lr)?;
        check_non_negative("mdecay", config.mdecay)?;
        check_positive("scale_grad", config.scale_grad)?;
        Ok(Self {
            config,
            states: StateStore::new(),
        })
    }

    pub fn config(&self) -> &SghmcConfig {
        &self.config
    }

    /// Replaces the hyperparameters, keeping every slot's state.
    pub(crate) fn set_config(&mut self, config: SghmcConfig) {
        self.config = config;
    }

    pub fn state(&self, index: usize) -> Option<&SghmcState<B>> {
        self.states.get(index)
    }
}

/// One SGHMC update. Returns the new parameter and the new momentum.
pub(crate) fn sghmc_update<B: Backend>(
    parameter: Tensor<B, 2>,
    gradient: Tensor<B, 2>,
    momentum: Tensor<B, 2>,
    lr: f64,
    mdecay: f64,
    scale_grad: f64,
) -> (Tensor<B, 2>, Tensor<B, 2>) {
    let sigma = (2.0 * lr * mdecay / scale_grad).sqrt();
    let sample = standard_normal_like(&parameter).mul_scalar(sigma);
    let momentum = momentum.clone() - gradient.mul_scalar(lr) - momentum.mul_scalar(mdecay)
        + sample;
    (parameter + momentum.clone(), momentum)
}

impl<B: Backend> GradientSampler<B> for Sghmc<B> {
    fn step(
        &mut self,
        index: usize,
        parameter: Tensor<B, 2>,
        gradient: Tensor<B, 2>,
    ) -> Tensor<B, 2> {
        let state = self.states.get_or_insert_with(index, || SghmcState {
            iteration: 0,
            momentum: parameter.zeros_like(),
        });
        state.iteration += 1;

        let (parameter, momentum) = sghmc_update(
            parameter,
            gradient,
            state.momentum.clone(),
            self.config.lr,
            self.config.mdecay,
            self.config.scale_grad,
        );
        state.momentum = momentum;
        parameter
    }

    fn iteration(&self, index: usize) -> Option<usize> {
        self.states.get(index).map(|state| state.iteration)
    }
}
