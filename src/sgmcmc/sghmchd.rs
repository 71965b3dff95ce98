//! SGHMC with an online, hypergradient-adapted learning rate.
//!
//! The learning rate of every parameter slot is itself updated by gradient descent on the
//! loss (A. G. Baydin et al., *Online Learning Rate Adaptation with Hypergradient Descent*,
//! ICLR 2018). Since `∂θ_t/∂lr ≈ −g_{t−1}`, the hypergradient is `−⟨g_t, g_{t−1}⟩`.

use burn::config::Config;
use burn::prelude::*;
use burn::tensor::cast::ToElement;

use super::sghmc::sghmc_update;
use super::{check_learning_rate, check_non_negative, check_positive, GradientSampler, StateStore};
use crate::error::Result;

/// Configuration for [`Sghmchd`].
#[derive(Config, Debug)]
pub struct SghmchdConfig {
    /// Initial step size of every slot.
    #[config(default = 1e-2)]
    pub lr: f64,

    /// Step size of the learning-rate update.
    #[config(default = 1e-3)]
    pub hyper_lr: f64,

    /// Momentum decay (friction) per step.
    #[config(default = 0.05)]
    pub mdecay: f64,

    /// Rescales the injected noise; usually the number of training points.
    #[config(default = 1.0)]
    pub scale_grad: f64,
}

impl Default for SghmchdConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct SghmchdState<B: Backend> {
    pub iteration: usize,
    /// Velocity.
    pub momentum: Tensor<B, 2>,
    /// Adapted learning rate of this slot.
    pub lr: f64,
    pub previous_gradient: Option<Tensor<B, 2>>,
}

/// SGHMC where each slot's learning rate follows
/// `lr ← max(lr + hyper_lr · ⟨g_t, g_{t−1}⟩, 0)` before the usual SGHMC update.
#[derive(Debug)]
pub struct Sghmchd<B: Backend> {
    config: SghmchdConfig,
    states: StateStore<SghmchdState<B>>,
}

impl<B: Backend> Sghmchd<B> {
    pub fn new(config: SghmchdConfig) -> Result<Self> {
        check_learning_rate(config.lr)?;
        check_learning_rate(config.hyper_lr)?;
        check_non_negative("mdecay", config.mdecay)?;
        check_positive("scale_grad", config.scale_grad)?;
        Ok(Self {
            config,
            states: StateStore::new(),
        })
    }

    pub fn config(&self) -> &SghmchdConfig {
        &self.config
    }

    /// Replaces the hyperparameters, keeping every slot's state. A different base `lr`
    /// restarts the adaptation of every slot from the new value.
    pub(crate) fn set_config(&mut self, config: SghmchdConfig) {
        if config.lr != self.config.lr {
            for state in self.states.iter_mut() {
                state.lr = config.lr;
            }
        }
        self.config = config;
    }

    pub fn state(&self, index: usize) -> Option<&SghmchdState<B>> {
        self.states.get(index)
    }

    /// The current learning rate of slot `index`.
    pub fn learning_rate(&self, index: usize) -> Option<f64> {
        self.states.get(index).map(|state| state.lr)
    }
}

impl<B: Backend> GradientSampler<B> for Sghmchd<B> {
    fn step(
        &mut self,
        index: usize,
        parameter: Tensor<B, 2>,
        gradient: Tensor<B, 2>,
    ) -> Tensor<B, 2> {
        let SghmchdConfig {
            lr,
            hyper_lr,
            mdecay,
            scale_grad,
        } = self.config.clone();

        let state = self.states.get_or_insert_with(index, || SghmchdState {
            iteration: 0,
            momentum: parameter.zeros_like(),
            lr,
            previous_gradient: None,
        });
        state.iteration += 1;

        if let Some(previous) = state.previous_gradient.take() {
            let alignment = (gradient.clone() * previous).sum().into_scalar().to_f64();
            if alignment.is_finite() {
                state.lr = (state.lr + hyper_lr * alignment).max(0.0);
            }
        }
        state.previous_gradient = Some(gradient.clone());

        let (parameter, momentum) = sghmc_update(
            parameter,
            gradient,
            state.momentum.clone(),
            state.lr,
            mdecay,
            scale_grad,
        );
        state.momentum = momentum;
        parameter
    }

    fn iteration(&self, index: usize) -> Option<usize> {
        self.states.get(index).map(|state| state.iteration)
    }
}
