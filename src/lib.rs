//! Bayesian neural network regression with stochastic-gradient MCMC.
//!
//! The [`sgmcmc`] module holds the sampler family, [`bohamiann`] the model that trains a
//! network with one of them and aggregates the sampled networks into predictions.

pub mod bohamiann;
pub mod data;
pub mod error;
pub mod io;
pub mod network;
pub mod objective;
pub mod sgmcmc;
pub mod stats;

pub use bohamiann::{Bohamiann, BohamiannConfig, LearningCurve, Prediction, TrainingConfig};
pub use error::{BnnError, Result};
pub use network::{default_network, Mlp, Network};
pub use sgmcmc::SamplingMethod;
pub use stats::VarianceKind;
