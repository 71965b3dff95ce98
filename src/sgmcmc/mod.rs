/*!
# Stochastic-Gradient MCMC Samplers

Per-parameter update rules that turn minibatch gradient descent into approximate posterior
sampling. Every sampler works on plain (non-autodiff) tensors: the caller computes the
gradient of the loss for every parameter slot, then hands `(slot, parameter, gradient)` to
[`GradientSampler::step`] and stores the returned parameter value.

State is created lazily, one record per slot, in a [`StateStore`] arena owned by the sampler.
A slot that never receives a gradient never gets a state record.

| Method | Struct | Dynamics |
|---|---|---|
| `sghmc` | [`Sghmc`] | Hamiltonian dynamics with friction and injected noise |
| `adaptive_sghmc` | [`AdaptiveSghmc`] | SGHMC with mass/noise estimates adapted during burn-in |
| `sgld` | [`Sgld`] | overdamped Langevin dynamics |
| `preconditioned_sgld` | [`PreconditionedSgld`] | Langevin dynamics with an RMSProp preconditioner |
| `constant_sgd` | [`ConstantSgd`] | constant-step SGD with a step chosen from the gradient noise |
| `sghmchd` | [`Sghmchd`] | SGHMC with a hypergradient-adapted learning rate |

## Example

```rust
use burn::backend::NdArray;
use burn::prelude::*;
use sgmcmc_bnn::sgmcmc::{GradientSampler, Sampler, SamplerSettings, SamplingMethod};

type B = NdArray<f64>;

let settings = SamplerSettings::new(1000.0);
let mut sampler = Sampler::<B>::from_method(SamplingMethod::Sghmc, &settings).unwrap();

let device = Default::default();
let parameter = Tensor::<B, 2>::zeros([3, 4], &device);
let gradient = Tensor::<B, 2>::ones([3, 4], &device);
let updated = sampler.step(0, parameter, gradient);
assert_eq!(updated.dims(), [3, 4]);
assert_eq!(sampler.iteration(0), Some(1));
```
*/

mod adaptive_sghmc;
mod constant_sgd;
mod preconditioned_sgld;
mod sghmc;
mod sghmchd;
mod sgld;

pub use adaptive_sghmc::{AdaptiveSghmc, AdaptiveSghmcConfig, AdaptiveSghmcState};
pub use constant_sgd::{ConstantSgd, ConstantSgdConfig, ConstantSgdState};
pub use preconditioned_sgld::{PreconditionedSgld, PreconditionedSgldConfig, PreconditionedSgldState};
pub use sghmc::{Sghmc, SghmcConfig, SghmcState};
pub use sghmchd::{Sghmchd, SghmchdConfig, SghmchdState};
pub use sgld::{Sgld, SgldConfig, SgldState};

use burn::prelude::*;
use burn::tensor::Distribution;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{BnnError, Result};

/// A per-parameter update rule.
pub trait GradientSampler<B: Backend> {
    /// Updates the parameter in slot `index` given its current value and gradient and
    /// returns the new value. Advances the slot's iteration counter.
    fn step(&mut self, index: usize, parameter: Tensor<B, 2>, gradient: Tensor<B, 2>)
        -> Tensor<B, 2>;

    /// Number of updates applied to slot `index`, or `None` if it was never updated.
    fn iteration(&self, index: usize) -> Option<usize>;
}

/// Arena of lazily created per-slot sampler state.
#[derive(Debug, Clone)]
pub struct StateStore<S> {
    slots: Vec<Option<S>>,
}

impl<S> Default for StateStore<S> {
    fn default() -> Self {
        Self { slots: Vec::new() }
    }
}

impl<S> StateStore<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the state of slot `index`, creating it with `init` on first use.
    pub fn get_or_insert_with(&mut self, index: usize, init: impl FnOnce() -> S) -> &mut S {
        if index >= self.slots.len() {
            self.slots.resize_with(index + 1, || None);
        }
        self.slots[index].get_or_insert_with(init)
    }

    pub fn get(&self, index: usize) -> Option<&S> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    /// Number of initialized slots.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Mutable access to every initialized slot.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut S> {
        self.slots.iter_mut().flatten()
    }
}

/// Identifier of a sampler in the family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingMethod {
    Sghmc,
    #[default]
    AdaptiveSghmc,
    Sgld,
    PreconditionedSgld,
    ConstantSgd,
    Sghmchd,
}

impl SamplingMethod {
    pub const ALL: [SamplingMethod; 6] = [
        SamplingMethod::Sghmc,
        SamplingMethod::AdaptiveSghmc,
        SamplingMethod::Sgld,
        SamplingMethod::PreconditionedSgld,
        SamplingMethod::ConstantSgd,
        SamplingMethod::Sghmchd,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SamplingMethod::Sghmc => "sghmc",
            SamplingMethod::AdaptiveSghmc => "adaptive_sghmc",
            SamplingMethod::Sgld => "sgld",
            SamplingMethod::PreconditionedSgld => "preconditioned_sgld",
            SamplingMethod::ConstantSgd => "constant_sgd",
            SamplingMethod::Sghmchd => "sghmchd",
        }
    }
}

impl fmt::Display for SamplingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SamplingMethod {
    type Err = BnnError;

    fn from_str(s: &str) -> Result<Self> {
        SamplingMethod::ALL
            .into_iter()
            .find(|method| method.name() == s)
            .ok_or_else(|| BnnError::UnknownSamplingMethod(s.to_string()))
    }
}

/// Hyperparameters shared by the whole family, as supplied by a training run.
///
/// Each sampler picks the subset it needs when built with [`Sampler::from_method`].
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerSettings {
    /// Base step size.
    pub lr: f64,
    /// Friction of the Hamiltonian samplers.
    pub mdecay: f64,
    /// Constant per-parameter noise estimate of adaptive SGHMC.
    pub noise: f64,
    /// Number of training points; rescales minibatch gradients and noise.
    pub num_train_points: f64,
    /// Number of iterations during which adaptive estimates are updated.
    pub num_burn_in_steps: usize,
    /// Minibatch size (constant SGD).
    pub batch_size: usize,
    /// Step size of the learning-rate hypergradient (SGHMCHD).
    pub hyper_lr: f64,
}

impl SamplerSettings {
    pub fn new(num_train_points: f64) -> Self {
        Self {
            lr: 1e-2,
            mdecay: 0.05,
            noise: 0.0,
            num_train_points,
            num_burn_in_steps: 3000,
            batch_size: 20,
            hyper_lr: 1e-3,
        }
    }
}

/// The closed set of samplers, resolved once from a [`SamplingMethod`].
#[derive(Debug)]
pub enum Sampler<B: Backend> {
    Sghmc(Sghmc<B>),
    AdaptiveSghmc(AdaptiveSghmc<B>),
    Sgld(Sgld<B>),
    PreconditionedSgld(PreconditionedSgld<B>),
    ConstantSgd(ConstantSgd<B>),
    Sghmchd(Sghmchd<B>),
}

impl<B: Backend> Sampler<B> {
    /// Builds the sampler for `method`, validating every hyperparameter it uses.
    pub fn from_method(method: SamplingMethod, settings: &SamplerSettings) -> Result<Self> {
        check_learning_rate(settings.lr)?;
        let sampler = match method {
            SamplingMethod::Sghmc => Sampler::Sghmc(Sghmc::new(
                SghmcConfig::new()
                    .with_lr(settings.lr)
                    .with_mdecay(settings.mdecay)
                    .with_scale_grad(settings.num_train_points),
            )?),
            SamplingMethod::AdaptiveSghmc => Sampler::AdaptiveSghmc(AdaptiveSghmc::new(
                AdaptiveSghmcConfig::new()
                    .with_lr(settings.lr.sqrt())
                    .with_mdecay(settings.mdecay)
                    .with_noise(settings.noise)
                    .with_num_burn_in_steps(settings.num_burn_in_steps)
                    .with_scale_grad(settings.num_train_points),
            )?),
            SamplingMethod::Sgld => Sampler::Sgld(Sgld::new(
                SgldConfig::new()
                    .with_lr(settings.lr)
                    .with_num_train_points(settings.num_train_points),
            )?),
            SamplingMethod::PreconditionedSgld => {
                Sampler::PreconditionedSgld(PreconditionedSgld::new(
                    PreconditionedSgldConfig::new()
                        .with_lr(settings.lr)
                        .with_num_train_points(settings.num_train_points),
                )?)
            }
            SamplingMethod::ConstantSgd => Sampler::ConstantSgd(ConstantSgd::new(
                ConstantSgdConfig::new(settings.batch_size, settings.num_train_points)
                    .with_lr(settings.lr),
            )?),
            SamplingMethod::Sghmchd => Sampler::Sghmchd(Sghmchd::new(
                SghmchdConfig::new()
                    .with_lr(settings.lr)
                    .with_hyper_lr(settings.hyper_lr)
                    .with_mdecay(settings.mdecay)
                    .with_scale_grad(settings.num_train_points),
            )?),
        };
        Ok(sampler)
    }

    /// Takes over the hyperparameters of `other` while keeping the per-slot state of `self`.
    /// When the two samplers implement different methods, `self` is replaced by `other`.
    pub fn adopt_hyperparameters(&mut self, other: Sampler<B>) {
        match (self, other) {
            (Sampler::Sghmc(s), Sampler::Sghmc(o)) => s.set_config(o.config().clone()),
            (Sampler::AdaptiveSghmc(s), Sampler::AdaptiveSghmc(o)) => {
                s.set_config(o.config().clone())
            }
            (Sampler::Sgld(s), Sampler::Sgld(o)) => s.set_config(o.config().clone()),
            (Sampler::PreconditionedSgld(s), Sampler::PreconditionedSgld(o)) => {
                s.set_config(o.config().clone())
            }
            (Sampler::ConstantSgd(s), Sampler::ConstantSgd(o)) => s.set_config(o.config().clone()),
            (Sampler::Sghmchd(s), Sampler::Sghmchd(o)) => s.set_config(o.config().clone()),
            (this, other) => *this = other,
        }
    }

    pub fn method(&self) -> SamplingMethod {
        match self {
            Sampler::Sghmc(_) => SamplingMethod::Sghmc,
            Sampler::AdaptiveSghmc(_) => SamplingMethod::AdaptiveSghmc,
            Sampler::Sgld(_) => SamplingMethod::Sgld,
            Sampler::PreconditionedSgld(_) => SamplingMethod::PreconditionedSgld,
            Sampler::ConstantSgd(_) => SamplingMethod::ConstantSgd,
            Sampler::Sghmchd(_) => SamplingMethod::Sghmchd,
        }
    }
}

impl<B: Backend> GradientSampler<B> for Sampler<B> {
    fn step(
        &mut self,
        index: usize,
        parameter: Tensor<B, 2>,
        gradient: Tensor<B, 2>,
    ) -> Tensor<B, 2> {
        match self {
            Sampler::Sghmc(s) => s.step(index, parameter, gradient),
            Sampler::AdaptiveSghmc(s) => s.step(index, parameter, gradient),
            Sampler::Sgld(s) => s.step(index, parameter, gradient),
            Sampler::PreconditionedSgld(s) => s.step(index, parameter, gradient),
            Sampler::ConstantSgd(s) => s.step(index, parameter, gradient),
            Sampler::Sghmchd(s) => s.step(index, parameter, gradient),
        }
    }

    fn iteration(&self, index: usize) -> Option<usize> {
        match self {
            Sampler::Sghmc(s) => s.iteration(index),
            Sampler::AdaptiveSghmc(s) => s.iteration(index),
            Sampler::Sgld(s) => s.iteration(index),
            Sampler::PreconditionedSgld(s) => s.iteration(index),
            Sampler::ConstantSgd(s) => s.iteration(index),
            Sampler::Sghmchd(s) => s.iteration(index),
        }
    }
}

/// Standard normal noise with the shape and device of `like`.
pub(crate) fn standard_normal_like<B: Backend>(like: &Tensor<B, 2>) -> Tensor<B, 2> {
    Tensor::random(like.shape(), Distribution::Normal(0.0, 1.0), &like.device())
}

pub(crate) fn check_learning_rate(lr: f64) -> Result<()> {
    if lr.is_nan() || lr < 0.0 {
        return Err(BnnError::InvalidLearningRate(lr));
    }
    Ok(())
}

pub(crate) fn check_positive(name: &'static str, value: f64) -> Result<()> {
    if value.is_nan() || value <= 0.0 {
        return Err(BnnError::InvalidHyperparameter { name, value });
    }
    Ok(())
}

pub(crate) fn check_non_negative(name: &'static str, value: f64) -> Result<()> {
    if value.is_nan() || value < 0.0 {
        return Err(BnnError::InvalidHyperparameter { name, value });
    }
    Ok(())
}

/// Decay rates must lie in `[0, 1)`.
pub(crate) fn check_decay(name: &'static str, value: f64) -> Result<()> {
    if !(0.0..1.0).contains(&value) {
        return Err(BnnError::InvalidHyperparameter { name, value });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type BackendType = NdArray<f64>;

    #[test]
    fn test_method_names_roundtrip() {
        for method in SamplingMethod::ALL {
            assert_eq!(method.name().parse::<SamplingMethod>().unwrap(), method);
            assert_eq!(method.to_string(), method.name());
        }
        assert_eq!(SamplingMethod::default(), SamplingMethod::AdaptiveSghmc);
    }

    #[test]
    fn test_unknown_method_is_rejected() {
        let err = "sghmc2".parse::<SamplingMethod>().unwrap_err();
        assert!(matches!(err, BnnError::UnknownSamplingMethod(ref name) if name == "sghmc2"));
        assert!(err.to_string().contains("sghmc2"));
        assert!("".parse::<SamplingMethod>().is_err());
        assert!("SGHMC".parse::<SamplingMethod>().is_err());
    }

    #[test]
    fn test_negative_learning_rate_rejected_for_every_method() {
        let mut settings = SamplerSettings::new(100.0);
        settings.lr = -1e-3;
        for method in SamplingMethod::ALL {
            let err = Sampler::<BackendType>::from_method(method, &settings).unwrap_err();
            assert!(
                matches!(err, BnnError::InvalidLearningRate(lr) if lr == -1e-3),
                "{method} accepted a negative learning rate"
            );
        }
    }

    #[test]
    fn test_from_method_resolves_variant() {
        let settings = SamplerSettings::new(100.0);
        for method in SamplingMethod::ALL {
            let sampler = Sampler::<BackendType>::from_method(method, &settings).unwrap();
            assert_eq!(sampler.method(), method);
        }
    }

    #[test]
    fn test_every_sampler_tracks_iterations_per_slot() {
        let device = Default::default();
        let settings = SamplerSettings::new(100.0);
        for method in SamplingMethod::ALL {
            let mut sampler = Sampler::<BackendType>::from_method(method, &settings).unwrap();
            let mut params = vec![
                Tensor::<BackendType, 2>::zeros([2, 3], &device),
                Tensor::<BackendType, 2>::zeros([1, 3], &device),
            ];
            for _ in 0..3 {
                let grad = Tensor::<BackendType, 2>::ones([2, 3], &device).mul_scalar(0.1);
                params[0] = sampler.step(0, params[0].clone(), grad);
            }
            // Slot 1 never had a gradient and keeps no state.
            assert_eq!(sampler.iteration(0), Some(3), "{method}");
            assert_eq!(sampler.iteration(1), None, "{method}");
            assert_eq!(params[0].dims(), [2, 3]);
        }
    }

    #[test]
    fn test_adopted_hyperparameters_keep_slot_state() {
        let device = Default::default();
        let mut settings = SamplerSettings::new(100.0);
        settings.lr = 1e-3;
        let mut sampler = Sampler::<BackendType>::from_method(SamplingMethod::Sgld, &settings).unwrap();
        let parameter = Tensor::<BackendType, 2>::zeros([2, 2], &device);
        let gradient = parameter.ones_like();
        let parameter = sampler.step(0, parameter, gradient.clone());

        settings.lr = 0.0;
        sampler.adopt_hyperparameters(Sampler::from_method(SamplingMethod::Sgld, &settings).unwrap());
        let before = parameter.clone().into_data().to_vec::<f64>().unwrap();
        let after = sampler.step(0, parameter, gradient).into_data().to_vec::<f64>().unwrap();
        // A zero step size freezes the parameter; the iteration count carries over.
        assert_eq!(before, after);
        assert_eq!(sampler.iteration(0), Some(2));

        // A different method replaces the sampler.
        sampler.adopt_hyperparameters(Sampler::from_method(SamplingMethod::Sghmc, &settings).unwrap());
        assert_eq!(sampler.method(), SamplingMethod::Sghmc);
        assert_eq!(sampler.iteration(0), None);
    }

    #[test]
    fn test_state_store_lazy_slots() {
        let mut store: StateStore<usize> = StateStore::new();
        assert!(store.is_empty());
        *store.get_or_insert_with(3, || 7) += 1;
        assert_eq!(store.get(3), Some(&8));
        assert_eq!(store.get(0), None);
        assert_eq!(store.get(10), None);
        assert_eq!(store.len(), 1);
        // Existing state is not re-initialized.
        assert_eq!(*store.get_or_insert_with(3, || 0), 8);
        store.clear();
        assert!(store.is_empty());
    }
}
