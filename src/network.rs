//! The differentiable network capability used by the samplers, and the default
//! fully connected regression network.
//!
//! A [`Network`] is a pure function of an explicit, ordered parameter arena: every learnable
//! weight and bias is a rank-2 tensor and the slot index is the parameter's identity. The
//! network itself owns no tensors, which lets the same description run on the autodiff
//! backend during training and on the inner backend during prediction.
//!
//! Gradients with respect to parameters and inputs are obtained through `burn`'s autodiff:
//! lift the arena with `require_grad`, run [`Network::forward`], call `backward` on the
//! scalar of interest and read the gradient of each leaf.

use burn::prelude::*;
use rand::rngs::SmallRng;
use rand::Rng;
use rand_distr::StandardNormal;

use crate::error::{BnnError, Result};

/// A differentiable map from a batch of inputs `[n, D]` to `[n, 2]`, where column 0 is the
/// predicted mean and column 1 the predicted log-variance.
pub trait Network {
    /// Number of input features the network was built for.
    fn input_dimensionality(&self) -> usize;

    /// Shapes of the parameter tensors, in slot order.
    fn parameter_shapes(&self) -> Vec<[usize; 2]>;

    /// Draws a fresh set of initial parameter values, in slot order.
    fn initial_parameters(&self, rng: &mut SmallRng) -> Vec<ndarray::Array2<f64>>;

    /// Evaluates the network on `inputs` using the given parameter arena.
    fn forward<B: Backend>(&self, parameters: &[Tensor<B, 2>], inputs: Tensor<B, 2>)
        -> Tensor<B, 2>;
}

/// Fully connected tanh network with a learned, input-independent log-variance output.
///
/// Parameters are laid out as `[w_0, b_0, w_1, b_1, ..., w_L, b_L, log_var]` where every
/// weight has shape `[fan_in, fan_out]` and every bias `[1, fan_out]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Mlp {
    input_dimensionality: usize,
    hidden: Vec<usize>,
    initial_log_variance: f64,
}

impl Mlp {
    /// Creates a network with the given hidden layer widths and a scalar mean output.
    pub fn new(input_dimensionality: usize, hidden: Vec<usize>) -> Self {
        Self {
            input_dimensionality,
            hidden,
            initial_log_variance: 1e-3_f64.ln(),
        }
    }

    /// Sets the initial value of the appended log-variance parameter.
    pub fn with_initial_log_variance(mut self, log_variance: f64) -> Self {
        self.initial_log_variance = log_variance;
        self
    }

    fn layer_sizes(&self) -> Vec<(usize, usize)> {
        let mut widths = Vec::with_capacity(self.hidden.len() + 2);
        widths.push(self.input_dimensionality);
        widths.extend(self.hidden.iter().copied());
        widths.push(1);
        widths.windows(2).map(|w| (w[0], w[1])).collect()
    }
}

/// The default architecture: three hidden layers of 50 tanh units.
pub fn default_network(input_dimensionality: usize) -> Mlp {
    Mlp::new(input_dimensionality, vec![50, 50, 50])
}

impl Network for Mlp {
    fn input_dimensionality(&self) -> usize {
        self.input_dimensionality
    }

    fn parameter_shapes(&self) -> Vec<[usize; 2]> {
        let mut shapes: Vec<[usize; 2]> = self
            .layer_sizes()
            .into_iter()
            .flat_map(|(fan_in, fan_out)| [[fan_in, fan_out], [1, fan_out]])
            .collect();
        shapes.push([1, 1]);
        shapes
    }

    fn initial_parameters(&self, rng: &mut SmallRng) -> Vec<ndarray::Array2<f64>> {
        let mut parameters = Vec::new();
        for (fan_in, fan_out) in self.layer_sizes() {
            // Kaiming normal, fan-in mode, linear gain.
            let std = 1.0 / (fan_in.max(1) as f64).sqrt();
            parameters.push(ndarray::Array2::from_shape_fn((fan_in, fan_out), |_| {
                std * rng.sample::<f64, _>(StandardNormal)
            }));
            parameters.push(ndarray::Array2::zeros((1, fan_out)));
        }
        parameters.push(ndarray::Array2::from_elem(
            (1, 1),
            self.initial_log_variance,
        ));
        parameters
    }

    fn forward<B: Backend>(
        &self,
        parameters: &[Tensor<B, 2>],
        inputs: Tensor<B, 2>,
    ) -> Tensor<B, 2> {
        let n_layers = self.layer_sizes().len();
        let mut hidden = inputs;
        for layer in 0..n_layers {
            let weight = parameters[2 * layer].clone();
            let bias = parameters[2 * layer + 1].clone();
            hidden = hidden.matmul(weight) + bias;
            if layer + 1 < n_layers {
                hidden = hidden.tanh();
            }
        }
        let log_variance = hidden.ones_like() * parameters[2 * n_layers].clone();
        Tensor::cat(vec![hidden, log_variance], 1)
    }
}

/// Converts a plain array into a tensor on `device`.
pub fn array_to_tensor<B: Backend>(
    array: &ndarray::Array2<f64>,
    device: &B::Device,
) -> Tensor<B, 2> {
    let (rows, cols) = array.dim();
    let values: Vec<f64> = array.iter().copied().collect();
    Tensor::<B, 2>::from_data(
        TensorData::new(values, [rows, cols]).convert::<B::FloatElem>(),
        device,
    )
}

/// Copies a tensor out into a plain array.
pub fn tensor_to_array<B: Backend>(tensor: Tensor<B, 2>) -> Result<ndarray::Array2<f64>> {
    let [rows, cols] = tensor.dims();
    let values = tensor
        .into_data()
        .convert::<f64>()
        .to_vec::<f64>()
        .map_err(|e| BnnError::Data(format!("{e:?}")))?;
    ndarray::Array2::from_shape_vec((rows, cols), values)
        .map_err(|e| BnnError::Data(e.to_string()))
}

/// Copies a rank-1 tensor out into a plain vector.
pub fn tensor_to_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f64>> {
    tensor
        .into_data()
        .convert::<f64>()
        .to_vec::<f64>()
        .map_err(|e| BnnError::Data(format!("{e:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use rand::SeedableRng;

    type BackendType = NdArray<f64>;

    #[test]
    fn test_default_network_shapes() {
        let net = default_network(3);
        let shapes = net.parameter_shapes();
        assert_eq!(
            shapes,
            vec![
                [3, 50],
                [1, 50],
                [50, 50],
                [1, 50],
                [50, 50],
                [1, 50],
                [50, 1],
                [1, 1],
                [1, 1]
            ]
        );

        let mut rng = SmallRng::seed_from_u64(42);
        let init = net.initial_parameters(&mut rng);
        let init_shapes: Vec<[usize; 2]> = init.iter().map(|a| [a.nrows(), a.ncols()]).collect();
        assert_eq!(init_shapes, shapes);
        assert!((init[8][[0, 0]] - 1e-3_f64.ln()).abs() < 1e-12);
        assert!(init[1].iter().all(|&b| b == 0.0));
    }

    #[test]
    fn test_forward_output_columns() {
        let device = Default::default();
        let net = Mlp::new(2, vec![4]).with_initial_log_variance(-2.0);
        let mut rng = SmallRng::seed_from_u64(0);
        let params: Vec<Tensor<BackendType, 2>> = net
            .initial_parameters(&mut rng)
            .iter()
            .map(|a| array_to_tensor(a, &device))
            .collect();
        let x: Tensor<BackendType, 2> =
            array_to_tensor(&ndarray::array![[0.1, 0.2], [0.3, 0.4], [0.5, 0.6]], &device);

        let out = tensor_to_array(net.forward(&params, x)).unwrap();
        assert_eq!(out.dim(), (3, 2));
        assert!(out.column(1).iter().all(|&v| (v + 2.0).abs() < 1e-12));
    }

    #[test]
    fn test_array_tensor_roundtrip() {
        let device = Default::default();
        let a = ndarray::array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let t: Tensor<BackendType, 2> = array_to_tensor(&a, &device);
        assert_eq!(t.dims(), [2, 3]);
        assert_eq!(tensor_to_array(t).unwrap(), a);
    }
}
