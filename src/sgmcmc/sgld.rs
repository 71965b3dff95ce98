//! Stochastic Gradient Langevin Dynamics.
//!
//! See M. Welling, Y. W. Teh, *Bayesian Learning via Stochastic Gradient Langevin
//! Dynamics*, ICML 2011.

use burn::config::Config;
use burn::prelude::*;

use super::{check_learning_rate, check_positive, standard_normal_like, GradientSampler, StateStore};
use crate::error::Result;

/// Configuration for [`Sgld`].
#[derive(Config, Debug)]
pub struct SgldConfig {
    /// Step size.
    #[config(default = 1e-2)]
    pub lr: f64,

    /// Number of training points. The loss is a per-example mean, so the gradient is
    /// multiplied by this to obtain a full-dataset gradient.
    #[config(default = 1.0)]
    pub num_train_points: f64,
}

impl Default for SgldConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct SgldState {
    pub iteration: usize,
}

/// Overdamped Langevin dynamics:
///
/// ```text
/// parameter ← parameter − (0.5 · lr · num_train_points · gradient + N(0, lr))
/// ```
#[derive(Debug)]
pub struct Sgld<B: Backend> {
    config: SgldConfig,
    states: StateStore<SgldState>,
    _backend: std::marker::PhantomData<B>,
}

impl<B: Backend> Sgld<B> {
    pub fn new(config: SgldConfig) -> Result<Self> {
        check_learning_rate(config.lr)?;
        check_positive("num_train_points", config.num_train_points)?;
        Ok(Self {
            config,
            states: StateStore::new(),
            _backend: std::marker::PhantomData,
        })
    }

    pub fn config(&self) -> &SgldConfig {
        &self.config
    }

    /// Replaces the hyperparameters, keeping every slot's state.
    pub(crate) fn set_config(&mut self, config: SgldConfig) {
        self.config = config;
    }
}

impl<B: Backend> GradientSampler<B> for Sgld<B> {
    fn step(
        &mut self,
        index: usize,
        parameter: Tensor<B, 2>,
        gradient: Tensor<B, 2>,
    ) -> Tensor<B, 2> {
        let state = self
            .states
            .get_or_insert_with(index, || SgldState { iteration: 0 });
        state.iteration += 1;

        let lr = self.config.lr;
        let mean = gradient.mul_scalar(0.5 * lr * self.config.num_train_points);
        let delta = mean + standard_normal_like(&parameter).mul_scalar(lr.sqrt());
        parameter - delta
    }

    fn iteration(&self, index: usize) -> Option<usize> {
        self.states.get(index).map(|state| state.iteration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::tensor_to_vec;
    use burn::backend::NdArray;

    type BackendType = NdArray<f64>;

    #[test]
    fn test_drift_and_diffusion() {
        let device = Default::default();
        let (lr, n) = (1e-4, 100.0);
        let mut sampler = Sgld::<BackendType>::new(
            SgldConfig::new().with_lr(lr).with_num_train_points(n),
        )
        .unwrap();

        let parameter = Tensor::<BackendType, 2>::zeros([100, 100], &device);
        let gradient = Tensor::<BackendType, 2>::ones([100, 100], &device);
        let values = tensor_to_vec(sampler.step(0, parameter, gradient)).unwrap();

        let count = values.len() as f64;
        let mean = values.iter().sum::<f64>() / count;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1.0);

        // Drift -0.5 * lr * n, diffusion variance lr.
        assert!((mean + 0.5 * lr * n).abs() < 5.0 * (lr / count).sqrt(), "mean {mean}");
        assert!(((var - lr) / lr).abs() < 0.06, "variance {var}");
    }
}
