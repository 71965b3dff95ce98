//! Stochastic Gradient Langevin Dynamics with an RMSProp preconditioner.
//!
//! See C. Li, C. Chen, D. Carlson, L. Carin, *Preconditioned Stochastic Gradient Langevin
//! Dynamics for Deep Neural Networks*, AAAI 2016.

use burn::config::Config;
use burn::prelude::*;

use super::{
    check_decay, check_learning_rate, check_positive, standard_normal_like, GradientSampler,
    StateStore,
};
use crate::error::Result;

/// Configuration for [`PreconditionedSgld`].
#[derive(Config, Debug)]
pub struct PreconditionedSgldConfig {
    /// Step size.
    #[config(default = 1e-2)]
    pub lr: f64,

    /// Number of training points the per-example mean gradient is scaled up by.
    #[config(default = 1.0)]
    pub num_train_points: f64,

    /// Exponential decay of the squared-gradient average. Should be close to one.
    #[config(default = 0.99)]
    pub precondition_decay_rate: f64,

    /// Added to the preconditioner denominator so it never degenerates.
    #[config(default = 1e-5)]
    pub diagonal_bias: f64,
}

impl Default for PreconditionedSgldConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct PreconditionedSgldState<B: Backend> {
    pub iteration: usize,
    /// Exponential moving average of the squared gradient.
    pub momentum: Tensor<B, 2>,
}

/// Langevin dynamics with diagonal preconditioner `G = 1 / (sqrt(V) + λ)` where `V` is an
/// exponential moving average of squared gradients:
///
/// ```text
/// V         ← γ · V + (1 − γ) · gradient²
/// parameter ← parameter − (0.5 · lr · G · gradient · num_train_points + N(0, lr · G))
/// ```
#[derive(Debug)]
pub struct PreconditionedSgld<B: Backend> {
    config: PreconditionedSgldConfig,
    states: StateStore<PreconditionedSgldState<B>>,
}

impl<B: Backend> PreconditionedSgld<B> {
    pub fn new(config: PreconditionedSgldConfig) -> Result<Self> {
        check_learning_rate(config.lr)?;
        check_positive("num_train_points", config.num_train_points)?;
        check_decay("precondition_decay_rate", config.precondition_decay_rate)?;
        check_positive("diagonal_bias", config.diagonal_bias)?;
        Ok(Self {
            config,
            states: StateStore::new(),
        })
    }

    pub fn config(&self) -> &PreconditionedSgldConfig {
        &self.config
    }

    /// Replaces the hyperparameters, keeping every slot's state.
    pub(crate) fn set_config(&mut self, config: PreconditionedSgldConfig) {
        self.config = config;
    }

    pub fn state(&self, index: usize) -> Option<&PreconditionedSgldState<B>> {
        self.states.get(index)
    }

    /// The current preconditioner of slot `index`.
    pub fn preconditioner(&self, index: usize) -> Option<Tensor<B, 2>> {
        self.states
            .get(index)
            .map(|state| self.preconditioner_from(state.momentum.clone()))
    }

    fn preconditioner_from(&self, momentum: Tensor<B, 2>) -> Tensor<B, 2> {
        momentum
            .sqrt()
            .add_scalar(self.config.diagonal_bias)
            .recip()
    }
}

impl<B: Backend> GradientSampler<B> for PreconditionedSgld<B> {
    fn step(
        &mut self,
        index: usize,
        parameter: Tensor<B, 2>,
        gradient: Tensor<B, 2>,
    ) -> Tensor<B, 2> {
        let decay = self.config.precondition_decay_rate;
        let state = self
            .states
            .get_or_insert_with(index, || PreconditionedSgldState {
                iteration: 0,
                momentum: parameter.ones_like(),
            });
        state.iteration += 1;

        state.momentum = state.momentum.clone().mul_scalar(decay)
            + gradient.clone().powf_scalar(2.0).mul_scalar(1.0 - decay);
        let momentum = state.momentum.clone();
        let preconditioner = self.preconditioner_from(momentum);

        let lr = self.config.lr;
        let sigma = preconditioner.clone().mul_scalar(lr).sqrt();
        let mean = (preconditioner * gradient).mul_scalar(0.5 * lr * self.config.num_train_points);
        let delta = mean + standard_normal_like(&parameter) * sigma;
        parameter - delta
    }

    fn iteration(&self, index: usize) -> Option<usize> {
        self.states.get(index).map(|state| state.iteration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BnnError;
    use crate::network::tensor_to_vec;
    use burn::backend::NdArray;

    type BackendType = NdArray<f64>;

    fn min_preconditioner(sampler: &PreconditionedSgld<BackendType>) -> f64 {
        tensor_to_vec(sampler.preconditioner(0).unwrap())
            .unwrap()
            .into_iter()
            .fold(f64::INFINITY, f64::min)
    }

    #[test]
    fn test_preconditioner_positive_for_zero_gradients() {
        let device = Default::default();
        let mut sampler =
            PreconditionedSgld::<BackendType>::new(PreconditionedSgldConfig::new()).unwrap();
        let mut parameter = Tensor::<BackendType, 2>::zeros([3, 3], &device);
        for _ in 0..5000 {
            parameter = sampler.step(0, parameter.clone(), parameter.zeros_like());
        }
        // The squared-gradient average has decayed to (almost) zero; the bias keeps G finite.
        let g = tensor_to_vec(sampler.preconditioner(0).unwrap()).unwrap();
        assert!(g.iter().all(|&v| v > 0.0 && v <= 1.0 / 1e-5 && v.is_finite()));
    }

    #[test]
    fn test_preconditioner_positive_for_huge_gradients() {
        let device = Default::default();
        let mut sampler =
            PreconditionedSgld::<BackendType>::new(PreconditionedSgldConfig::new()).unwrap();
        let parameter = Tensor::<BackendType, 2>::zeros([2, 2], &device);
        let gradient = parameter.ones_like().mul_scalar(1e100);
        let _ = sampler.step(0, parameter, gradient);
        assert!(min_preconditioner(&sampler) > 0.0);
    }

    #[test]
    fn test_first_step_uses_unit_initial_average() {
        let device = Default::default();
        let mut sampler =
            PreconditionedSgld::<BackendType>::new(PreconditionedSgldConfig::new()).unwrap();
        let parameter = Tensor::<BackendType, 2>::zeros([1, 1], &device);
        let _ = sampler.step(0, parameter, Tensor::ones([1, 1], &device).mul_scalar(2.0));
        // V = 0.99 * 1 + 0.01 * 4
        let v = tensor_to_vec(sampler.state(0).unwrap().momentum.clone()).unwrap();
        assert!((v[0] - 1.03).abs() < 1e-12);
        let g = tensor_to_vec(sampler.preconditioner(0).unwrap()).unwrap();
        assert!((g[0] - 1.0 / (1.03_f64.sqrt() + 1e-5)).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_decay_rate() {
        let err = PreconditionedSgld::<BackendType>::new(
            PreconditionedSgldConfig::new().with_precondition_decay_rate(1.0),
        )
        .unwrap_err();
        assert!(matches!(err, BnnError::InvalidHyperparameter { .. }));
    }
}
