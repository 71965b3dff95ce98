/*!
# Bayesian Neural Networks via SG-MCMC

[`Bohamiann`] trains a [`Network`] with one of the stochastic-gradient MCMC samplers from
[`crate::sgmcmc`] and keeps a thinned collection of weight snapshots. Predictions average
the snapshot networks: the ensemble mean is the predictive mean and the spread of the
snapshot means is the predictive (epistemic) variance.

A run of `num_steps` updates is split into a burn-in phase of `num_burn_in_steps` updates,
whose parameters are discarded, followed by a sampling phase that stores a snapshot after
every block of `keep_every` updates.

## Example

```rust,no_run
use burn::backend::{Autodiff, NdArray};
use ndarray::{Array1, Array2};
use sgmcmc_bnn::bohamiann::{Bohamiann, BohamiannConfig, TrainingConfig};

type B = Autodiff<NdArray<f64>>;

let x = Array2::from_shape_fn((50, 1), |(i, _)| i as f64 / 50.0);
let y: Array1<f64> = x.column(0).mapv(|v| (10.0 * v).sin());

let mut bnn = Bohamiann::<B, _>::with_default_network(BohamiannConfig::new()).unwrap();
bnn.train(&x, &y, &TrainingConfig::new().with_num_steps(2000).with_num_burn_in_steps(500))
    .unwrap();
let prediction = bnn.predict(&x).unwrap();
assert_eq!(prediction.mean.len(), 50);
```
*/

use burn::config::Config;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::cast::ToElement;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};
use ndarray::{Array1, Array2, Axis};
use rand::prelude::*;
use rand::rngs::SmallRng;

use crate::data::InfiniteBatches;
use crate::error::{BnnError, Result};
use crate::network::{array_to_tensor, default_network, tensor_to_array, tensor_to_vec, Mlp, Network};
use crate::objective::negative_log_likelihood;
use crate::sgmcmc::{GradientSampler, Sampler, SamplerSettings, SamplingMethod};
use crate::stats::{
    ensemble_moments, mean_log_likelihood, mean_squared_error, InputNormalizer, OutputNormalizer,
    VarianceKind,
};

/// Training diagnostics are refreshed every this many steps when running verbosely.
const PROGRESS_INTERVAL: usize = 512;

/// A copy of every parameter slot taken during the sampling phase.
pub type WeightSnapshot = Vec<Array2<f64>>;

type InnerBackend<B> = <B as AutodiffBackend>::InnerBackend;
type InnerDevice<B> = <InnerBackend<B> as Backend>::Device;

/// Model-level settings, fixed for the lifetime of a [`Bohamiann`].
#[derive(Config, Debug)]
pub struct BohamiannConfig {
    /// Number of training points per minibatch.
    #[config(default = 20)]
    pub batch_size: usize,

    /// Normalize inputs to zero mean and unit variance per column.
    #[config(default = true)]
    pub normalize_input: bool,

    /// Normalize targets to zero mean and unit variance.
    #[config(default = true)]
    pub normalize_output: bool,

    #[config(default = "SamplingMethod::AdaptiveSghmc")]
    pub sampling_method: SamplingMethod,

    /// Which variance [`Bohamiann::predict`] reports.
    #[config(default = "VarianceKind::Epistemic")]
    pub variance: VarianceKind,

    /// Step size of the learning-rate hypergradient; only used by SGHMCHD.
    #[config(default = 1e-3)]
    pub hyper_lr: f64,

    /// Seeds the backend and the minibatch order. `None` draws a random seed.
    #[config(default = "None")]
    pub seed: Option<u64>,
}

impl Default for BohamiannConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Settings of a single [`Bohamiann::train`] call.
#[derive(Config, Debug)]
pub struct TrainingConfig {
    /// Total number of updates, burn-in included.
    #[config(default = 13000)]
    pub num_steps: usize,

    /// Number of sampling-phase updates between two snapshots.
    #[config(default = 100)]
    pub keep_every: usize,

    #[config(default = 3000)]
    pub num_burn_in_steps: usize,

    #[config(default = 1e-2)]
    pub lr: f64,

    /// Constant gradient-noise estimate (adaptive SGHMC).
    #[config(default = 0.0)]
    pub noise: f64,

    /// Momentum decay of the Hamiltonian samplers.
    #[config(default = 0.05)]
    pub mdecay: f64,

    /// Resume from the current parameters, normalizers, samples and sampler state.
    #[config(default = false)]
    pub continue_training: bool,

    /// Show a progress bar with training-set diagnostics.
    #[config(default = false)]
    pub verbose: bool,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Output of [`Bohamiann::predict`].
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// Predictive mean, shape `(n,)`.
    pub mean: Array1<f64>,
    /// Predictive variance, shape `(n,)`.
    pub variance: Array1<f64>,
    /// Mean prediction of every snapshot network, shape `(K, n)`.
    pub individual: Array2<f64>,
}

/// Validation metrics recorded by [`Bohamiann::train_and_evaluate`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LearningCurve {
    /// Total number of updates performed when each entry was recorded.
    pub steps: Vec<usize>,
    /// Mean Gaussian log-likelihood of the validation targets.
    pub log_likelihoods: Vec<f64>,
    /// Mean squared error of the predictive mean on the validation set.
    pub mse: Vec<f64>,
}

/// Bayesian neural network regression with stochastic-gradient MCMC.
///
/// `B` is the autodiff backend used for gradients; parameters and sampler state live on
/// `B::InnerBackend`. `N` is the network architecture, built lazily for the input
/// dimensionality of the first training set.
pub struct Bohamiann<B: AutodiffBackend, N: Network> {
    config: BohamiannConfig,
    get_network: Box<dyn Fn(usize) -> N>,
    network: Option<N>,
    parameters: Vec<Tensor<InnerBackend<B>, 2>>,
    sampler: Option<Sampler<InnerBackend<B>>>,
    sampled_weights: Vec<WeightSnapshot>,
    input_normalizer: Option<InputNormalizer>,
    output_normalizer: Option<OutputNormalizer>,
    is_trained: bool,
    rng: SmallRng,
    device: InnerDevice<B>,
}

impl<B: AutodiffBackend> Bohamiann<B, Mlp> {
    /// Creates a model using [`default_network`].
    pub fn with_default_network(config: BohamiannConfig) -> Result<Self> {
        Self::new(config, default_network)
    }
}

impl<B: AutodiffBackend, N: Network> Bohamiann<B, N> {
    /// Creates an untrained model. `get_network` builds the network for a given input
    /// dimensionality.
    pub fn new<F>(config: BohamiannConfig, get_network: F) -> Result<Self>
    where
        F: Fn(usize) -> N + 'static,
    {
        if config.batch_size < 1 {
            return Err(BnnError::InvalidBatchSize(config.batch_size));
        }
        let rng = match config.seed {
            Some(seed) => {
                B::seed(seed);
                SmallRng::seed_from_u64(seed)
            }
            None => SmallRng::seed_from_u64(thread_rng().gen::<u64>()),
        };
        Ok(Self {
            config,
            get_network: Box::new(get_network),
            network: None,
            parameters: Vec::new(),
            sampler: None,
            sampled_weights: Vec::new(),
            input_normalizer: None,
            output_normalizer: None,
            is_trained: false,
            rng,
            device: Default::default(),
        })
    }

    pub fn config(&self) -> &BohamiannConfig {
        &self.config
    }

    pub fn sampling_method(&self) -> SamplingMethod {
        self.config.sampling_method
    }

    /// The snapshots collected so far, in capture order.
    pub fn sampled_weights(&self) -> &[WeightSnapshot] {
        &self.sampled_weights
    }

    pub fn is_trained(&self) -> bool {
        self.is_trained
    }

    pub fn network(&self) -> Option<&N> {
        self.network.as_ref()
    }

    /// Builds a fresh network with newly initialized parameters for `input_dimensionality`
    /// features and discards everything learned so far.
    pub fn initialize_network(&mut self, input_dimensionality: usize) {
        let network = (self.get_network)(input_dimensionality);
        self.parameters = self.initial_parameters(&network);
        self.network = Some(network);
        self.sampler = None;
        self.sampled_weights.clear();
        self.input_normalizer = None;
        self.output_normalizer = None;
        self.is_trained = false;
    }

    fn initial_parameters(&mut self, network: &N) -> Vec<Tensor<InnerBackend<B>, 2>> {
        network
            .initial_parameters(&mut self.rng)
            .iter()
            .map(|array| array_to_tensor(array, &self.device))
            .collect()
    }

    /// Runs `config.num_steps` sampler updates on `(x_train, y_train)`.
    ///
    /// A fresh run (the default) refits the normalizers, drops earlier snapshots,
    /// reinitializes the parameters and installs a new sampler. With
    /// `continue_training` everything is kept and the run appends to the snapshots.
    /// Nothing is modified when validation fails.
    pub fn train(
        &mut self,
        x_train: &Array2<f64>,
        y_train: &Array1<f64>,
        config: &TrainingConfig,
    ) -> Result<()> {
        let (n, input_dimensionality) = x_train.dim();
        if n == 0 || n != y_train.len() {
            return Err(BnnError::ShapeMismatch {
                expected: vec![n.max(1)],
                got: vec![y_train.len()],
            });
        }
        if config.keep_every < 1 {
            return Err(BnnError::InvalidHyperparameter {
                name: "keep_every",
                value: config.keep_every as f64,
            });
        }
        let continuing = config.continue_training && self.network.is_some();
        if let Some(network) = self.network.as_ref().filter(|_| continuing) {
            if network.input_dimensionality() != input_dimensionality {
                return Err(BnnError::DimensionMismatch {
                    expected: network.input_dimensionality(),
                    got: input_dimensionality,
                });
            }
        }
        let settings = SamplerSettings {
            lr: config.lr,
            mdecay: config.mdecay,
            noise: config.noise,
            num_train_points: n as f64,
            num_burn_in_steps: config.num_burn_in_steps,
            batch_size: self.config.batch_size,
            hyper_lr: self.config.hyper_lr,
        };
        let sampler = Sampler::from_method(self.config.sampling_method, &settings)?;
        let style = ProgressStyle::default_bar()
            .template("{prefix:8} {bar:40.white} ETA {eta:3} | {msg}")?
            .progress_chars("=>-");

        if continuing {
            match self.sampler.as_mut() {
                Some(existing) => existing.adopt_hyperparameters(sampler),
                None => self.sampler = Some(sampler),
            }
            self.fit_missing_normalizers(x_train, y_train)?;
        } else {
            self.input_normalizer = None;
            self.output_normalizer = None;
            self.fit_missing_normalizers(x_train, y_train)?;
            if !self.sampled_weights.is_empty() {
                debug!("Discarding {} samples of the previous run", self.sampled_weights.len());
            }
            self.sampled_weights.clear();
            let network = (self.get_network)(input_dimensionality);
            self.parameters = self.initial_parameters(&network);
            self.network = Some(network);
            self.sampler = Some(sampler);
        }

        let x = self.normalize_inputs(x_train)?;
        let y = self.normalize_outputs(y_train);
        info!(
            "Training with {} on {} points: {} steps, {} burn-in, keeping every {}",
            self.config.sampling_method,
            n,
            config.num_steps,
            config.num_burn_in_steps,
            config.keep_every
        );

        let pb = if config.verbose {
            ProgressBar::new(config.num_steps as u64)
        } else {
            ProgressBar::hidden()
        };
        pb.set_style(style);
        pb.set_prefix(self.config.sampling_method.name());

        let (Some(network), Some(sampler)) = (self.network.as_ref(), self.sampler.as_mut()) else {
            return Err(BnnError::NotTrained);
        };
        let mut batches = InfiniteBatches::new(n, self.config.batch_size, self.rng.gen());
        let burn_in = config.num_burn_in_steps;

        for step in 0..config.num_steps {
            let Some(batch) = batches.next() else {
                break;
            };
            let inputs: Tensor<B, 2> =
                Tensor::from_inner(array_to_tensor(&x.select(Axis(0), &batch), &self.device));
            let targets: Tensor<B, 1> =
                Tensor::from_inner(vector_to_tensor(&y.select(Axis(0), &batch), &self.device));

            let parameters: Vec<Tensor<B, 2>> = self
                .parameters
                .iter()
                .map(|p| Tensor::from_inner(p.clone()).require_grad())
                .collect();
            let loss = negative_log_likelihood(network.forward(&parameters, inputs), targets);
            let grads = loss.backward();

            for (index, parameter) in parameters.iter().enumerate() {
                if let Some(gradient) = parameter.grad(&grads) {
                    self.parameters[index] =
                        sampler.step(index, self.parameters[index].clone(), gradient);
                }
            }

            if step >= burn_in && (step - burn_in + 1) % config.keep_every == 0 {
                self.sampled_weights.push(snapshot(&self.parameters)?);
                debug!(
                    "Step {}: captured sample {}",
                    step,
                    self.sampled_weights.len()
                );
            }

            if config.verbose && step % PROGRESS_INTERVAL == 0 {
                let (nll, mse) = training_diagnostics(network, &self.parameters, &x, &y, &self.device)?;
                let mut message = format!("NLL={nll:.4} MSE={mse:.4}");
                if step >= burn_in {
                    message.push_str(&format!(" Samples={}", self.sampled_weights.len()));
                }
                pb.set_message(message);
            }
            pb.inc(1);
        }
        pb.finish_with_message("Done!");

        self.is_trained = true;
        info!(
            "Finished training, {} samples collected",
            self.sampled_weights.len()
        );
        Ok(())
    }

    /// Trains in increments and evaluates the ensemble on a validation set after each.
    ///
    /// The first call runs the burn-in phase only. It is followed by
    /// `num_steps / validate_every_n_steps` continued calls of `validate_every_n_steps`
    /// sampling updates each, after which the validation log-likelihood and mean squared
    /// error are recorded.
    pub fn train_and_evaluate(
        &mut self,
        x_train: &Array2<f64>,
        y_train: &Array1<f64>,
        x_valid: &Array2<f64>,
        y_valid: &Array1<f64>,
        config: &TrainingConfig,
        validate_every_n_steps: usize,
    ) -> Result<LearningCurve> {
        // Every increment must add at least one snapshot.
        if validate_every_n_steps == 0 || validate_every_n_steps < config.keep_every {
            return Err(BnnError::InvalidHyperparameter {
                name: "validate_every_n_steps",
                value: validate_every_n_steps as f64,
            });
        }
        if x_valid.nrows() != y_valid.len() {
            return Err(BnnError::ShapeMismatch {
                expected: vec![x_valid.nrows()],
                got: vec![y_valid.len()],
            });
        }

        let burn_in = config.num_burn_in_steps;
        let burn_in_config = config.clone().with_num_steps(burn_in);
        self.train(x_train, y_train, &burn_in_config)?;

        let increment = config
            .clone()
            .with_num_steps(validate_every_n_steps)
            .with_num_burn_in_steps(0)
            .with_continue_training(true);
        let mut curve = LearningCurve::default();
        for i in 0..config.num_steps / validate_every_n_steps {
            self.train(x_train, y_train, &increment)?;
            let prediction = self.predict(x_valid)?;
            let ll = mean_log_likelihood(y_valid, &prediction.mean, &prediction.variance);
            let mse = mean_squared_error(y_valid, &prediction.mean);
            let step = burn_in + (i + 1) * validate_every_n_steps;
            debug!("Step {step}: validation log-likelihood {ll:.4}, MSE {mse:.4}");
            curve.steps.push(step);
            curve.log_likelihoods.push(ll);
            curve.mse.push(mse);
        }
        Ok(curve)
    }

    /// Predictive mean and variance over all snapshots.
    ///
    /// Each snapshot is evaluated with its own temporary parameter set; the live parameters
    /// are not touched.
    pub fn predict(&self, x_test: &Array2<f64>) -> Result<Prediction> {
        let network = self.trained_network(x_test.ncols())?;
        let x = self.normalize_inputs(x_test)?;
        let inputs: Tensor<InnerBackend<B>, 2> = array_to_tensor(&x, &self.device);

        let (k, n) = (self.sampled_weights.len(), x.nrows());
        let mut means = Array2::zeros((k, n));
        let mut log_variances = Array2::zeros((k, n));
        for (i, weights) in self.sampled_weights.iter().enumerate() {
            let parameters: Vec<Tensor<InnerBackend<B>, 2>> = weights
                .iter()
                .map(|array| array_to_tensor(array, &self.device))
                .collect();
            let output = tensor_to_array(network.forward(&parameters, inputs.clone()))?;
            means.row_mut(i).assign(&output.column(0));
            log_variances.row_mut(i).assign(&output.column(1));
        }

        let (mean, variance) = ensemble_moments(&means, &log_variances, self.config.variance)?;
        Ok(match self.output_normalizer {
            Some(normalizer) => Prediction {
                mean: normalizer.unnormalize(&mean),
                variance: variance * normalizer.std.powi(2),
                individual: normalizer.unnormalize(&means),
            },
            None => Prediction {
                mean,
                variance,
                individual: means,
            },
        })
    }

    /// Gradient of the predictive mean with respect to a single input point.
    pub fn predictive_mean_gradient(&self, x: &Array1<f64>) -> Result<Array1<f64>> {
        let (_, gradients) = self.snapshot_sensitivities(x)?;
        let k = gradients.len() as f64;
        Ok(gradients
            .iter()
            .fold(Array1::<f64>::zeros(x.len()), |acc, g| acc + g)
            / k)
    }

    /// Gradient of the (epistemic) predictive variance with respect to a single input point:
    /// `mean_i 2 (f_i(x) - m(x)) (∇f_i(x) - ∇m(x))`.
    pub fn predictive_variance_gradient(&self, x: &Array1<f64>) -> Result<Array1<f64>> {
        let (values, gradients) = self.snapshot_sensitivities(x)?;
        let k = values.len() as f64;
        let mean = values.iter().sum::<f64>() / k;
        let mean_gradient = gradients
            .iter()
            .fold(Array1::<f64>::zeros(x.len()), |acc, g| acc + g)
            / k;
        let total = values
            .iter()
            .zip(&gradients)
            .fold(Array1::<f64>::zeros(x.len()), |acc, (&f, g)| {
                acc + (g - &mean_gradient) * (2.0 * (f - mean))
            });
        Ok(total / k)
    }

    /// Every snapshot's mean prediction at `x` and its input gradient, both in the raw
    /// (un-normalized) input and output space.
    fn snapshot_sensitivities(&self, x: &Array1<f64>) -> Result<(Vec<f64>, Vec<Array1<f64>>)> {
        let network = self.trained_network(x.len())?;
        let d = x.len();
        let row = x.view().insert_axis(Axis(0)).to_owned();

        let mut values = Vec::with_capacity(self.sampled_weights.len());
        let mut gradients = Vec::with_capacity(self.sampled_weights.len());
        for weights in &self.sampled_weights {
            let input: Tensor<B, 2> =
                Tensor::from_inner(array_to_tensor(&row, &self.device)).require_grad();
            let mut normalized = input.clone();
            if let Some(normalizer) = &self.input_normalizer {
                let mean = normalizer.mean.view().insert_axis(Axis(0)).to_owned();
                let std = normalizer.std.view().insert_axis(Axis(0)).to_owned();
                normalized = (normalized - Tensor::from_inner(array_to_tensor(&mean, &self.device)))
                    / Tensor::from_inner(array_to_tensor(&std, &self.device));
            }
            let parameters: Vec<Tensor<B, 2>> = weights
                .iter()
                .map(|array| Tensor::from_inner(array_to_tensor(array, &self.device)))
                .collect();

            let mut prediction = network.forward(&parameters, normalized).slice([0..1, 0..1]);
            if let Some(normalizer) = self.output_normalizer {
                prediction = prediction
                    .mul_scalar(normalizer.std)
                    .add_scalar(normalizer.mean);
            }
            values.push(prediction.clone().into_scalar().to_f64());

            let grads = prediction.sum().backward();
            let gradient = match input.grad(&grads) {
                Some(gradient) => Array1::from(tensor_to_vec(gradient)?),
                None => Array1::zeros(d),
            };
            gradients.push(gradient);
        }
        Ok((values, gradients))
    }

    /// Current values of every parameter slot.
    pub fn get_weights(&self) -> Result<Vec<Array2<f64>>> {
        if self.network.is_none() {
            return Err(BnnError::NotTrained);
        }
        snapshot(&self.parameters)
    }

    /// Replaces the value of every parameter slot. The number of arrays and each shape must
    /// match the current parameters; on mismatch nothing is assigned.
    pub fn set_weights(&mut self, weights: &[Array2<f64>]) -> Result<()> {
        if self.network.is_none() {
            return Err(BnnError::NotTrained);
        }
        if weights.len() != self.parameters.len() {
            return Err(BnnError::ShapeMismatch {
                expected: vec![self.parameters.len()],
                got: vec![weights.len()],
            });
        }
        for (parameter, weight) in self.parameters.iter().zip(weights) {
            let [rows, cols] = parameter.dims();
            if weight.dim() != (rows, cols) {
                return Err(BnnError::ShapeMismatch {
                    expected: vec![rows, cols],
                    got: weight.shape().to_vec(),
                });
            }
        }
        self.parameters = weights
            .iter()
            .map(|array| array_to_tensor(array, &self.device))
            .collect();
        Ok(())
    }

    fn trained_network(&self, input_dimensionality: usize) -> Result<&N> {
        let network = self.network.as_ref().ok_or(BnnError::NotTrained)?;
        if network.input_dimensionality() != input_dimensionality {
            return Err(BnnError::DimensionMismatch {
                expected: network.input_dimensionality(),
                got: input_dimensionality,
            });
        }
        if self.sampled_weights.is_empty() {
            return Err(BnnError::EmptyEnsemble);
        }
        Ok(network)
    }

    fn fit_missing_normalizers(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        if self.config.normalize_input && self.input_normalizer.is_none() {
            self.input_normalizer = Some(InputNormalizer::fit(x)?);
        }
        if self.config.normalize_output && self.output_normalizer.is_none() {
            self.output_normalizer = Some(OutputNormalizer::fit(y)?);
        }
        Ok(())
    }

    fn normalize_inputs(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        match &self.input_normalizer {
            Some(normalizer) => normalizer.normalize(x),
            None => Ok(x.clone()),
        }
    }

    fn normalize_outputs(&self, y: &Array1<f64>) -> Array1<f64> {
        match &self.output_normalizer {
            Some(normalizer) => normalizer.normalize(y),
            None => y.clone(),
        }
    }
}

/// Deep copy of a parameter arena.
fn snapshot<B: Backend>(parameters: &[Tensor<B, 2>]) -> Result<WeightSnapshot> {
    parameters
        .iter()
        .map(|parameter| tensor_to_array(parameter.clone()))
        .collect()
}

fn vector_to_tensor<B: Backend>(vector: &Array1<f64>, device: &B::Device) -> Tensor<B, 1> {
    Tensor::from_data(
        TensorData::new(vector.to_vec(), [vector.len()]).convert::<B::FloatElem>(),
        device,
    )
}

/// NLL and mean squared error of the current parameters on the full (normalized) training set.
fn training_diagnostics<B: Backend, N: Network>(
    network: &N,
    parameters: &[Tensor<B, 2>],
    x: &Array2<f64>,
    y: &Array1<f64>,
    device: &B::Device,
) -> Result<(f64, f64)> {
    let output = network.forward(parameters, array_to_tensor(x, device));
    let targets = vector_to_tensor::<B>(y, device);
    let nll = negative_log_likelihood(output.clone(), targets)
        .into_scalar()
        .to_f64();
    let mean = Array1::from(tensor_to_vec(output.slice([0..x.nrows(), 0..1]))?);
    Ok((nll, mean_squared_error(y, &mean)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use ndarray::array;

    type BackendType = Autodiff<NdArray<f64>>;

    fn small_model(method: SamplingMethod) -> Bohamiann<BackendType, Mlp> {
        Bohamiann::new(
            BohamiannConfig::new()
                .with_sampling_method(method)
                .with_batch_size(5)
                .with_seed(Some(42)),
            |d| Mlp::new(d, vec![8]).with_initial_log_variance(0.0),
        )
        .unwrap()
    }

    fn toy_data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((12, 2), |(i, j)| (i as f64 * 0.37 + j as f64).sin());
        let y = x.map_axis(Axis(1), |row| row[0] - 0.5 * row[1]);
        (x, y)
    }

    #[test]
    fn test_default_configs() {
        let config = BohamiannConfig::new();
        assert_eq!(config.batch_size, 20);
        assert!(config.normalize_input && config.normalize_output);
        assert_eq!(config.sampling_method, SamplingMethod::AdaptiveSghmc);
        assert_eq!(config.variance, VarianceKind::Epistemic);
        assert_eq!(config.seed, None);

        let training = TrainingConfig::new();
        assert_eq!(
            (training.num_steps, training.keep_every, training.num_burn_in_steps),
            (13000, 100, 3000)
        );
        assert_eq!((training.lr, training.noise, training.mdecay), (1e-2, 0.0, 0.05));
        assert!(!training.continue_training && !training.verbose);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let result = Bohamiann::<BackendType, _>::with_default_network(
            BohamiannConfig::new().with_batch_size(0),
        );
        assert!(matches!(result, Err(BnnError::InvalidBatchSize(0))));
    }

    #[test]
    fn test_invalid_training_config_leaves_model_untouched() {
        let (x, y) = toy_data();
        let mut bnn = small_model(SamplingMethod::Sghmc);
        let config = TrainingConfig::new()
            .with_num_steps(30)
            .with_num_burn_in_steps(10)
            .with_keep_every(5);
        bnn.train(&x, &y, &config).unwrap();
        let weights = bnn.get_weights().unwrap();
        assert_eq!(bnn.sampled_weights().len(), 4);

        let err = bnn.train(&x, &y, &config.clone().with_lr(-0.1)).unwrap_err();
        assert!(matches!(err, BnnError::InvalidLearningRate(_)));
        let err = bnn.train(&x, &y, &config.clone().with_keep_every(0)).unwrap_err();
        assert!(matches!(err, BnnError::InvalidHyperparameter { name: "keep_every", .. }));
        let err = bnn
            .train(&x, &y.slice(ndarray::s![..5]).to_owned(), &config)
            .unwrap_err();
        assert!(matches!(err, BnnError::ShapeMismatch { .. }));
        let err = bnn
            .train(
                &Array2::zeros((12, 3)),
                &y,
                &config.clone().with_continue_training(true),
            )
            .unwrap_err();
        assert!(matches!(err, BnnError::DimensionMismatch { expected: 2, got: 3 }));

        assert_eq!(bnn.sampled_weights().len(), 4);
        assert_eq!(bnn.get_weights().unwrap(), weights);
    }

    #[test]
    fn test_snapshot_count_per_run() {
        let (x, y) = toy_data();
        let mut bnn = small_model(SamplingMethod::Sgld);
        for (steps, burn_in, keep, expected) in [(50, 10, 10, 4), (10, 10, 1, 0), (25, 0, 7, 3)] {
            let config = TrainingConfig::new()
                .with_num_steps(steps)
                .with_num_burn_in_steps(burn_in)
                .with_keep_every(keep)
                .with_lr(1e-4);
            bnn.train(&x, &y, &config).unwrap();
            assert_eq!(bnn.sampled_weights().len(), expected, "{steps}/{burn_in}/{keep}");
        }
    }

    #[test]
    fn test_snapshots_are_independent_copies() {
        let (x, y) = toy_data();
        let mut bnn = small_model(SamplingMethod::Sghmc);
        let config = TrainingConfig::new()
            .with_num_steps(10)
            .with_num_burn_in_steps(0)
            .with_keep_every(10);
        bnn.train(&x, &y, &config).unwrap();
        let first = bnn.sampled_weights()[0].clone();

        let zeros: Vec<Array2<f64>> = first.iter().map(|w| Array2::zeros(w.dim())).collect();
        bnn.set_weights(&zeros).unwrap();
        assert_eq!(bnn.sampled_weights()[0], first);

        bnn.train(&x, &y, &config.with_continue_training(true)).unwrap();
        assert_eq!(bnn.sampled_weights().len(), 2);
        assert_eq!(bnn.sampled_weights()[0], first);
    }

    #[test]
    fn test_set_weights_shape_mismatch() {
        let mut bnn = small_model(SamplingMethod::Sghmc);
        assert!(matches!(
            bnn.set_weights(&[array![[1.0]]]),
            Err(BnnError::NotTrained)
        ));

        bnn.initialize_network(2);
        let mut weights = bnn.get_weights().unwrap();
        assert_eq!(weights.len(), 5);
        let before = weights.clone();

        let err = bnn.set_weights(&weights[..4]).unwrap_err();
        assert!(matches!(err, BnnError::ShapeMismatch { .. }));

        weights[0] = Array2::ones((2, 8));
        weights[2] = Array2::ones((3, 3));
        let err = bnn.set_weights(&weights).unwrap_err();
        assert!(matches!(err, BnnError::ShapeMismatch { ref expected, .. } if expected == &vec![8, 1]));
        assert_eq!(bnn.get_weights().unwrap(), before);
    }

    #[test]
    fn test_predict_requires_samples() {
        let (x, _) = toy_data();
        let mut bnn = small_model(SamplingMethod::Sghmc);
        assert!(matches!(bnn.predict(&x), Err(BnnError::NotTrained)));
        bnn.initialize_network(2);
        assert!(matches!(bnn.predict(&x), Err(BnnError::EmptyEnsemble)));
        assert!(!bnn.is_trained());
    }

    #[test]
    fn test_predict_does_not_touch_live_parameters() {
        let (x, y) = toy_data();
        let mut bnn = small_model(SamplingMethod::PreconditionedSgld);
        bnn.train(
            &x,
            &y,
            &TrainingConfig::new()
                .with_num_steps(20)
                .with_num_burn_in_steps(5)
                .with_keep_every(5)
                .with_lr(1e-4),
        )
        .unwrap();
        let weights = bnn.get_weights().unwrap();
        let prediction = bnn.predict(&x).unwrap();
        assert_eq!(prediction.individual.dim(), (3, 12));
        assert_eq!(bnn.get_weights().unwrap(), weights);
    }

    #[test]
    fn test_train_and_evaluate_rejects_zero_interval() {
        let (x, y) = toy_data();
        let mut bnn = small_model(SamplingMethod::Sghmc);
        let err = bnn
            .train_and_evaluate(&x, &y, &x, &y, &TrainingConfig::new(), 0)
            .unwrap_err();
        assert!(matches!(
            err,
            BnnError::InvalidHyperparameter { name: "validate_every_n_steps", .. }
        ));
        assert!(!bnn.is_trained());
    }

    #[test]
    fn test_train_and_evaluate_rejects_interval_shorter_than_thinning() {
        let (x, y) = toy_data();
        let mut bnn = small_model(SamplingMethod::Sghmc);
        let config = TrainingConfig::new()
            .with_num_steps(20)
            .with_num_burn_in_steps(5)
            .with_keep_every(10);
        let err = bnn.train_and_evaluate(&x, &y, &x, &y, &config, 5).unwrap_err();
        assert!(matches!(
            err,
            BnnError::InvalidHyperparameter { name: "validate_every_n_steps", value } if value == 5.0
        ));
        assert!(!bnn.is_trained());
        assert!(bnn.sampled_weights().is_empty());
    }
}
