//! Fits a Bayesian neural network to noisy samples of a sinc function and reports the
//! predictive fit on a dense grid.

use burn::backend::{Autodiff, NdArray};
use ndarray::{Array1, Array2};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use std::error::Error;

use sgmcmc_bnn::stats::{mean_log_likelihood, mean_squared_error};
use sgmcmc_bnn::{Bohamiann, BohamiannConfig, SamplingMethod, TrainingConfig};

type BackendType = Autodiff<NdArray<f64>>;

fn sinc(x: f64) -> f64 {
    (x * 10.0 * std::f64::consts::PI).sin() / (x * 10.0 * std::f64::consts::PI)
}

fn main() -> Result<(), Box<dyn Error>> {
    const N_TRAIN: usize = 20;
    const N_TEST: usize = 200;
    const SEED: u64 = 42;

    let method: SamplingMethod = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "adaptive_sghmc".to_string())
        .parse()?;

    let mut rng = SmallRng::seed_from_u64(SEED);
    let x_train = Array2::from_shape_fn((N_TRAIN, 1), |_| rng.gen::<f64>());
    let y_train: Array1<f64> = x_train
        .column(0)
        .mapv(|x| sinc(x) + 0.05 * rng.sample::<f64, _>(StandardNormal));

    let x_test = Array2::from_shape_fn((N_TEST, 1), |(i, _)| (i as f64 + 0.5) / N_TEST as f64);
    let y_test: Array1<f64> = x_test.column(0).mapv(sinc);

    let mut bnn = Bohamiann::<BackendType, _>::with_default_network(
        BohamiannConfig::new()
            .with_sampling_method(method)
            .with_seed(Some(SEED)),
    )?;
    let config = TrainingConfig::new()
        .with_num_steps(6000)
        .with_num_burn_in_steps(2000)
        .with_keep_every(50)
        .with_verbose(true);
    bnn.train(&x_train, &y_train, &config)?;
    println!(
        "Trained with {} and collected {} samples",
        bnn.sampling_method(),
        bnn.sampled_weights().len()
    );

    let prediction = bnn.predict(&x_test)?;
    let variance = prediction.variance.mapv(|v| v.max(1e-10));
    println!(
        "Test MSE: {:.4}",
        mean_squared_error(&y_test, &prediction.mean)
    );
    println!(
        "Test log-likelihood: {:.4}",
        mean_log_likelihood(&y_test, &prediction.mean, &variance)
    );
    println!(
        "Mean predictive std: {:.4}",
        variance.mapv(f64::sqrt).mean().unwrap_or(f64::NAN)
    );

    let probe = Array1::from(vec![0.5]);
    println!(
        "d mean / dx at 0.5: {:.4}, d var / dx at 0.5: {:.4}",
        bnn.predictive_mean_gradient(&probe)?[0],
        bnn.predictive_variance_gradient(&probe)?[0]
    );

    #[cfg(feature = "csv")]
    {
        sgmcmc_bnn::io::csv::save_snapshots_csv(bnn.sampled_weights(), "/tmp/sinc_samples.csv")?;
        println!("Saved samples to /tmp/sinc_samples.csv");
    }
    Ok(())
}
