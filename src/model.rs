use itertools::Itertools;

use crate::autograd::Variable;
use crate::layer::{Dense, Activation};
use crate::tensor::Tensor;
use crate::scalar::Real;


/// Anything that can be trained: a forward pass plus the trainable
/// parameters behind it. Implemented by both model styles, so the
/// [Trainer](crate::Trainer) doesn't care which one it is handed.

pub trait Model<T: Real> {
  fn forward(&self, input: &Variable<T>) -> Variable<T>;

  fn parameters(&self) -> Vec<Variable<T>>;

  /// Run inputs through the model and detach the result from the graph.

  fn predict(&self, input: &Tensor<T>) -> Tensor<T> {
    self.forward(&input.tracked()).data().detach()
  }
}


/// Ordered stack of [Dense] layers.
///
/// ```
/// use ferroflow::{Activation::*, Sequential};
///
/// let model = Sequential::<f32>::new()
///   .dense(4, 16, Relu)
///   .dense(16, 8, Relu)
///   .dense(8, 1, Linear);
///
/// println!("{}", model.summary());
/// ```

pub struct Sequential<T: Real> {
  name: String,
  layers: Vec<Dense<T>>,
}

impl<T: Real> Sequential<T> {
  pub fn new() -> Self {
    Self::named("sequential")
  }

  pub fn named(name: impl Into<String>) -> Self {
    Self { name: name.into(), layers: vec![] }
  }

  /// Append a fresh [Dense] layer.

  pub fn dense(mut self, input_dim: usize, units: usize, activation: Activation) -> Self {
    self.add(Dense::new(input_dim, units, activation));
    self
  }

  pub fn add(&mut self, layer: Dense<T>) {
    if let Some(prev) = self.layers.last() {
      assert_eq!(layer.input_dim(), prev.units(),
        "Layer {} expects {} inputs, but {} produces {}",
        layer.name(), layer.input_dim(), prev.name(), prev.units());
    }
    self.layers.push(layer);
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn layers(&self) -> &[Dense<T>] {
    &self.layers
  }

  pub fn input_dim(&self) -> Option<usize> {
    self.layers.first().map(|layer| layer.input_dim() )
  }

  pub fn output_dim(&self) -> Option<usize> {
    self.layers.last().map(|layer| layer.units() )
  }

  pub fn param_count(&self) -> usize {
    self.layers.iter().map(|layer| layer.param_count() ).sum()
  }

  /// Keras-style layer table.

  pub fn summary(&self) -> String {
    let rows = self.layers.iter()
      .map(|layer| format!("{:<20} {:<16} {}",
        layer.name(),
        format!("(batch, {})", layer.units()),
        layer.param_count()))
      .join("\n");
    let rule = "-".repeat(44);
    format!(
      "Model: {}\n{rule}\n{:<20} {:<16} {}\n{rows}\n{rule}\nTotal params: {}",
      self.name, "layer", "output", "params", self.param_count(),
    )
  }
}

impl<T: Real> Default for Sequential<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T: Real> Model<T> for Sequential<T> {
  fn forward(&self, input: &Variable<T>) -> Variable<T> {
    self.layers.iter()
      .fold(input.clone(), |x, layer| layer.forward(&x) )
  }

  fn parameters(&self) -> Vec<Variable<T>> {
    self.layers.iter()
      .flat_map(|layer| layer.params() )
      .collect()
  }
}


/// Model defined by freely composing layers in a closure, for
/// architectures a plain stack can't express.
///
/// The composition is traced once against a probe input to discover its
/// trainable parameters and graph statistics; afterwards every
/// [forward](Model::forward) re-executes the closure against real data.
///
/// ```
/// use ferroflow::{Activation::*, Dense, GraphModel, Model, Tensor};
///
/// let hidden = Dense::new(4, 16, Relu);
/// let out = Dense::new(16, 1, Linear);
/// let model = GraphModel::trace(4, move |x| out.forward(&hidden.forward(x)) );
///
/// let pred = model.predict(&Tensor::<f32>::randn(&[2, 4]));
/// assert_eq!(pred.dims(), &[2, 1]);
/// ```

pub struct GraphModel<T: Real> {
  name: String,
  build: Box<dyn Fn(&Variable<T>) -> Variable<T>>,
  input_dim: usize,
  params: Vec<Variable<T>>,
  stats: (usize, usize, usize, usize),
}

impl<T: Real> GraphModel<T> {
  pub fn trace(input_dim: usize, build: impl Fn(&Variable<T>) -> Variable<T> + 'static) -> Self {
    Self::trace_named("graph", input_dim, build)
  }

  pub fn trace_named(name: impl Into<String>, input_dim: usize, build: impl Fn(&Variable<T>) -> Variable<T> + 'static) -> Self {
    let probe = Tensor::zeros(&[1, input_dim]).tracked();
    let output = build(&probe);
    Self {
      name: name.into(),
      params: output.parameters(),
      stats: output.statistics(),
      input_dim,
      build: Box::new(build),
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn input_dim(&self) -> usize {
    self.input_dim
  }

  pub fn param_count(&self) -> usize {
    self.stats.3
  }

  /// Statistics of the traced graph.

  pub fn summary(&self) -> String {
    let (nodes, ops, tensors, weights) = self.stats;
    format!(
      "Model: {} (functional)\ngraph nodes: {nodes} ({ops} ops)\ntrainable tensors: {tensors}\nTotal params: {weights}",
      self.name,
    )
  }
}

impl<T: Real> Model<T> for GraphModel<T> {
  fn forward(&self, input: &Variable<T>) -> Variable<T> {
    (self.build)(input)
  }

  fn parameters(&self) -> Vec<Variable<T>> {
    self.params.clone()
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::layer::Activation::*;

  fn stack() -> Sequential<f32> {
    Sequential::new()
      .dense(4, 16, Relu)
      .dense(16, 8, Relu)
      .dense(8, 1, Linear)
  }

  #[test]
  fn sequential_forward() {
    let model = stack();
    let out = model.predict(&Tensor::randn(&[5, 4]));
    assert_eq!(out.dims(), &[5, 1]);
    assert_eq!(model.parameters().len(), 6);
    assert_eq!(model.param_count(), 225);
  }

  #[test]
  fn summary_totals() {
    let summary = stack().summary();
    assert!(summary.contains("Total params: 225"));
    assert!(summary.contains("(batch, 16)"));
  }

  #[test]
  #[should_panic]
  fn dimension_mismatch() {
    Sequential::<f32>::new().dense(4, 16, Relu).dense(8, 1, Linear);
  }

  #[test]
  fn graph_matches_stack() {
    let hidden = Dense::<f32>::new(4, 16, Relu);
    let out = Dense::new(16, 1, Linear);
    let model = GraphModel::trace(4, move |x| out.forward(&hidden.forward(x)) );

    assert_eq!(model.parameters().len(), 4);
    assert_eq!(model.param_count(), 4 * 16 + 16 + 16 + 1);
    assert_eq!(model.predict(&Tensor::randn(&[3, 4])).dims(), &[3, 1]);
    assert!(model.summary().contains("functional"));
  }

  #[test]
  fn graph_params_persist_across_runs() {
    let layer = Dense::<f32>::new(2, 2, Linear);
    let model = GraphModel::trace(2, move |x| layer.forward(x) );
    let x = Tensor::randn(&[1, 2]);
    assert_eq!(model.predict(&x), model.predict(&x));
  }
}
