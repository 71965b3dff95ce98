//! Constant-step SGD as approximate posterior sampling.
//!
//! See S. Mandt, M. D. Hoffman, D. M. Blei, *Stochastic Gradient Descent as Approximate
//! Bayesian Inference*, JMLR 2017. With a constant step the iterates of SGD settle into a
//! stationary distribution whose width is set by the minibatch gradient noise; choosing the
//! step `2 · S / (N · tr(C))` (batch size `S`, dataset size `N`, gradient-noise covariance
//! `C`) matches it to the posterior.

use burn::config::Config;
use burn::prelude::*;
use burn::tensor::cast::ToElement;

use super::{check_learning_rate, check_positive, GradientSampler, StateStore};
use crate::error::{BnnError, Result};

/// Configuration for [`ConstantSgd`].
#[derive(Config, Debug)]
pub struct ConstantSgdConfig {
    /// Minibatch size.
    pub batch_size: usize,

    /// Number of training points.
    pub num_data_points: f64,

    /// Upper bound of the step size, also used before a noise estimate exists.
    #[config(default = 1e-2)]
    pub lr: f64,
}

#[derive(Debug, Clone)]
pub struct ConstantSgdState<B: Backend> {
    pub iteration: usize,
    /// Running mean of the gradient.
    pub momentum: Tensor<B, 2>,
    /// Running mean of the squared gradient.
    pub second_moment: Tensor<B, 2>,
    /// Step size used by the latest update.
    pub lr: f64,
}

/// Plain SGD with a step size derived from the estimated gradient-noise trace.
#[derive(Debug)]
pub struct ConstantSgd<B: Backend> {
    config: ConstantSgdConfig,
    states: StateStore<ConstantSgdState<B>>,
}

impl<B: Backend> ConstantSgd<B> {
    pub fn new(config: ConstantSgdConfig) -> Result<Self> {
        if config.batch_size < 1 {
            return Err(BnnError::InvalidBatchSize(config.batch_size));
        }
        check_learning_rate(config.lr)?;
        check_positive("num_data_points", config.num_data_points)?;
        Ok(Self {
            config,
            states: StateStore::new(),
        })
    }

    pub fn config(&self) -> &ConstantSgdConfig {
        &self.config
    }

    /// Replaces the hyperparameters, keeping every slot's state.
    pub(crate) fn set_config(&mut self, config: ConstantSgdConfig) {
        self.config = config;
    }

    pub fn state(&self, index: usize) -> Option<&ConstantSgdState<B>> {
        self.states.get(index)
    }
}

impl<B: Backend> GradientSampler<B> for ConstantSgd<B> {
    fn step(
        &mut self,
        index: usize,
        parameter: Tensor<B, 2>,
        gradient: Tensor<B, 2>,
    ) -> Tensor<B, 2> {
        let ConstantSgdConfig {
            batch_size,
            num_data_points,
            lr,
        } = self.config.clone();

        let state = self.states.get_or_insert_with(index, || ConstantSgdState {
            iteration: 0,
            momentum: parameter.zeros_like(),
            second_moment: parameter.zeros_like(),
            lr,
        });
        state.iteration += 1;

        let weight = 1.0 / state.iteration as f64;
        state.momentum = state.momentum.clone()
            + (gradient.clone() - state.momentum.clone()).mul_scalar(weight);
        state.second_moment = state.second_moment.clone()
            + (gradient.clone().powf_scalar(2.0) - state.second_moment.clone()).mul_scalar(weight);

        let trace = (state.second_moment.clone() - state.momentum.clone().powf_scalar(2.0))
            .clamp_min(0.0)
            .sum()
            .into_scalar()
            .to_f64();
        state.lr = if trace > 0.0 && trace.is_finite() {
            lr.min(2.0 * batch_size as f64 / (num_data_points * trace))
        } else {
            lr
        };

        parameter - gradient.mul_scalar(state.lr)
    }

    fn iteration(&self, index: usize) -> Option<usize> {
        self.states.get(index).map(|state| state.iteration)
    }
}
