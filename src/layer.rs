use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Serialize, Deserialize};

use crate::autograd::Variable;
use crate::tensor::Tensor;
use crate::scalar::Real;


fn next_layer_index() -> usize {
  static COUNT: AtomicUsize = AtomicUsize::new(0);
  COUNT.fetch_add(1, Ordering::Relaxed)
}


/// Nonlinearity applied after a layer's affine transform.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
  Linear,
  Relu,
  Sigmoid,
  Tanh,
}

impl Activation {
  pub fn apply<T: Real>(&self, x: &Variable<T>) -> Variable<T> {
    match self {
      Self::Linear => x.clone(),
      Self::Relu => x.relu(),
      Self::Sigmoid => x.sigmoid(),
      Self::Tanh => x.tanh(),
    }
  }

  pub fn name(&self) -> &'static str {
    match self {
      Self::Linear => "linear",
      Self::Relu => "relu",
      Self::Sigmoid => "sigmoid",
      Self::Tanh => "tanh",
    }
  }
}


/// Fully connected layer: `x · W + b`, then the activation.
///
/// Weights start Glorot-uniform, biases at zero. Both are trainable
/// [Variables](Variable), so any graph built through
/// [forward](Dense::forward) exposes them via `parameters()`.

pub struct Dense<T: Real> {
  name: String,
  weights: Variable<T>,
  bias: Variable<T>,
  activation: Activation,
}

impl<T: Real> Dense<T> {
  pub fn new(input_dim: usize, units: usize, activation: Activation) -> Self {
    assert!(input_dim > 0 && units > 0, "Dense dimensions must be positive");
    Self::from_parts(
      format!("dense_{}", next_layer_index()),
      Tensor::glorot(input_dim, units),
      Tensor::zeros(&[units]),
      activation,
    )
  }

  pub(crate) fn from_parts(name: String, weights: Tensor<T>, bias: Tensor<T>, activation: Activation) -> Self {
    assert_eq!(weights.rank(), 2, "Dense weights must be a matrix, got {}", weights.shape());
    assert_eq!(bias.dims(), &[weights.dims()[1]],
      "Bias {} doesn't fit weights {}", bias.shape(), weights.shape());
    Self {
      name,
      weights: weights.trained(),
      bias: bias.trained(),
      activation,
    }
  }

  /// Run a `[batch, input_dim]` activation through the layer.

  pub fn forward(&self, input: &Variable<T>) -> Variable<T> {
    self.activation.apply(&(input.matmul(&self.weights) + &self.bias))
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn activation(&self) -> Activation {
    self.activation
  }

  pub fn input_dim(&self) -> usize {
    self.weights.data().dims()[0]
  }

  pub fn units(&self) -> usize {
    self.weights.data().dims()[1]
  }

  pub fn param_count(&self) -> usize {
    self.weights.data().size() + self.bias.data().size()
  }

  pub fn weights(&self) -> &Variable<T> {
    &self.weights
  }

  pub fn bias(&self) -> &Variable<T> {
    &self.bias
  }

  pub fn params(&self) -> Vec<Variable<T>> {
    vec![self.weights.clone(), self.bias.clone()]
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn forward_shape() {
    let layer = Dense::new(4, 16, Activation::Relu);
    let out = layer.forward(&Tensor::<f32>::randn(&[8, 4]).tracked());
    assert_eq!(out.data().dims(), &[8, 16]);
    assert_eq!(layer.param_count(), 4 * 16 + 16);
  }

  #[test]
  fn linear_passthrough() {
    let layer = Dense::from_parts(
      "probe".into(),
      Tensor::new(&[2, 2], vec![1.0, 0.0, 0.0, 1.0]),
      Tensor::zeros(&[2]),
      Activation::Linear,
    );
    let x = Tensor::new(&[1, 2], vec![3.0, -4.0]);
    assert_eq!(layer.forward(&x.tracked()).data(), &x);
  }

  #[test]
  fn relu_clamps() {
    let layer = Dense::from_parts(
      "probe".into(),
      Tensor::new(&[1, 2], vec![1.0, -1.0]),
      Tensor::zeros(&[2]),
      Activation::Relu,
    );
    let out = layer.forward(&Tensor::new(&[1, 1], vec![2.0]).tracked());
    assert_eq!(out.data(), &Tensor::new(&[1, 2], vec![2.0, 0.0]));
  }

  #[test]
  fn trainable_params() {
    let layer = Dense::<f32>::new(3, 2, Activation::Tanh);
    let out = layer.forward(&Tensor::randn(&[1, 3]).tracked());
    assert_eq!(out.parameters().len(), 2);
  }

  #[test]
  #[should_panic]
  fn bias_mismatch() {
    Dense::from_parts("bad".into(), Tensor::<f32>::zeros(&[2, 3]), Tensor::zeros(&[2]), Activation::Linear);
  }
}
