use std::time::Instant;

use crate::autograd::Variable;
use crate::callback::{Callback, Context, Signal};
use crate::data::Dataset;
use crate::model::Model;
use crate::optim::Optimizer;
use crate::tensor::Tensor;
use crate::scalar::Real;


/// Training objective, computed on graph [Variables](Variable) so it can
/// be back-propagated.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Loss {
  MeanSquaredError,
}

impl Loss {
  pub fn compute<T: Real>(&self, pred: &Variable<T>, target: &Variable<T>) -> Variable<T> {
    match self {
      Self::MeanSquaredError => pred.sub(target).sqr().mean(),
    }
  }

  /// Non-differentiable value of the loss on detached tensors.

  pub fn measure<T: Real>(&self, pred: &Tensor<T>, target: &Tensor<T>) -> f64 {
    match self {
      Self::MeanSquaredError => {
        let diff = pred.sub(target);
        diff.mul(&diff).mean().to_f64().unwrap()
      },
    }
  }

  pub fn name(&self) -> &'static str {
    match self {
      Self::MeanSquaredError => "mse",
    }
  }
}


/// Evaluation measure, computed on detached predictions.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
  MeanAbsoluteError,
  MeanSquaredError,
}

impl Metric {
  pub fn compute<T: Real>(&self, pred: &Tensor<T>, target: &Tensor<T>) -> f64 {
    match self {
      Self::MeanAbsoluteError => pred.sub(target).abs().mean().to_f64().unwrap(),
      Self::MeanSquaredError => Loss::MeanSquaredError.measure(pred, target),
    }
  }

  pub fn name(&self) -> &'static str {
    match self {
      Self::MeanAbsoluteError => "mae",
      Self::MeanSquaredError => "mse",
    }
  }
}


/// One finished epoch in a [History].

#[derive(Debug, Clone)]
pub struct EpochRecord {
  pub epoch: usize,
  pub loss: f64,
  pub metrics: Vec<(&'static str, f64)>,
  /// Seconds since the fit call started.
  pub elapsed_secs: f64,
}


/// What one [fit](Trainer::fit) call produced.

#[derive(Debug, Clone, Default)]
pub struct History {
  pub epochs: Vec<EpochRecord>,
  pub stopped_early: bool,
}

impl History {
  pub fn final_loss(&self) -> Option<f64> {
    self.epochs.last().map(|record| record.loss )
  }

  pub fn best_loss(&self) -> Option<f64> {
    self.epochs.iter()
      .map(|record| record.loss )
      .min_by(|a, b| a.partial_cmp(b).unwrap() )
  }

  pub fn len(&self) -> usize {
    self.epochs.len()
  }

  pub fn is_empty(&self) -> bool {
    self.epochs.is_empty()
  }
}


/// Result of [evaluate](Trainer::evaluate).

#[derive(Debug, Clone)]
pub struct Evaluation {
  pub loss: f64,
  pub metrics: Vec<(&'static str, f64)>,
}


/// Drives gradient descent over a [Model] and a [Dataset].
///
/// Bundles the optimizer, the loss, the metrics to report and any
/// registered callbacks. A trainer may be reused: calling
/// [fit](Trainer::fit) again continues from the current weights and
/// optimizer state, with a fresh [History].
///
/// ```no_run
/// use ferroflow::{Activation::*, Adam, Dataset, Loss, Metric, Sequential, Tensor, Trainer};
///
/// let model = Sequential::new()
///   .dense(4, 16, Relu)
///   .dense(16, 1, Linear);
///
/// let data = Dataset::from_tensors(Tensor::<f32>::rand(&[100, 4]), Tensor::rand(&[100, 1])).batch(8);
///
/// let mut trainer = Trainer::new(Adam::new(0.001), Loss::MeanSquaredError)
///   .with_metric(Metric::MeanAbsoluteError);
///
/// let history = trainer.fit(&model, &data, 5);
/// println!("final loss: {:.4}", history.final_loss().unwrap());
/// ```

pub struct Trainer<T: Real> {
  optimizer: Box<dyn Optimizer<T>>,
  loss: Loss,
  metrics: Vec<Metric>,
  callbacks: Vec<Box<dyn Callback>>,
}

impl<T: Real> Trainer<T> {
  pub fn new(optimizer: impl Optimizer<T> + 'static, loss: Loss) -> Self {
    Self {
      optimizer: Box::new(optimizer),
      loss,
      metrics: vec![],
      callbacks: vec![],
    }
  }

  pub fn with_metric(mut self, metric: Metric) -> Self {
    self.metrics.push(metric);
    self
  }

  pub fn with_callback(mut self, callback: impl Callback + 'static) -> Self {
    self.add_callback(callback);
    self
  }

  pub fn add_callback(&mut self, callback: impl Callback + 'static) {
    self.callbacks.push(Box::new(callback));
  }

  /// Run the full training loop: for every batch of every epoch,
  /// forward, loss, backward, optimizer step, reset gradients. Epoch
  /// hooks fire on all callbacks; any [Signal::Stop] ends the run after
  /// the current epoch.

  pub fn fit(&mut self, model: &impl Model<T>, data: &Dataset<T>, epochs: usize) -> History {
    assert!(!data.is_empty(), "Cannot fit on an empty dataset");
    let params = model.parameters();
    assert!(!params.is_empty(), "Model has no trainable parameters");

    let start = Instant::now();
    let mut history = History::default();
    let mut best: Option<f64> = None;

    let ctx = self.context(0, epochs, 0.0, vec![], best, &start);
    for callback in &mut self.callbacks {
      callback.on_train_begin(&ctx);
    }

    for epoch in 0..epochs {
      let mut loss_sum = 0.0;
      let mut metric_sums = vec![0.0; self.metrics.len()];
      let mut seen = 0.0;

      for batch in data.batches() {
        let targets = batch.targets.as_ref()
          .expect("Training requires a labeled dataset");

        let output = model.forward(&batch.inputs.tracked());
        let loss = self.loss.compute(&output, &targets.tracked());
        loss.backward();
        self.optimizer.step(&params);
        loss.zero_grad();

        let weight = batch.len() as f64;
        loss_sum += loss.data().item().to_f64().unwrap() * weight;
        for (sum, metric) in metric_sums.iter_mut().zip(&self.metrics) {
          *sum += metric.compute(output.data(), targets) * weight;
        }
        seen += weight;
      }

      let loss = loss_sum / seen;
      let metrics: Vec<_> = self.metrics.iter()
        .zip(metric_sums)
        .map(|(metric, sum)| (metric.name(), sum / seen) )
        .collect();

      let ctx = self.context(epoch, epochs, loss, metrics.clone(), best, &start);
      best = Some(best.map_or(loss, |b: f64| b.min(loss) ));
      history.epochs.push(EpochRecord {
        epoch,
        loss,
        metrics,
        elapsed_secs: ctx.elapsed_secs,
      });

      let mut signal = Signal::Continue;
      for callback in &mut self.callbacks {
        if callback.on_epoch_end(&ctx) == Signal::Stop {
          signal = Signal::Stop;
        }
      }
      if signal == Signal::Stop {
        history.stopped_early = true;
        break
      }
    }

    let ctx = self.context(
      history.len().saturating_sub(1),
      epochs,
      history.final_loss().unwrap_or(0.0),
      history.epochs.last().map_or(vec![], |record| record.metrics.clone() ),
      best,
      &start,
    );
    for callback in &mut self.callbacks {
      callback.on_train_end(&ctx);
    }

    history
  }

  /// Mean loss and metrics over a dataset, without touching any weights.

  pub fn evaluate(&self, model: &impl Model<T>, data: &Dataset<T>) -> Evaluation {
    assert!(!data.is_empty(), "Cannot evaluate on an empty dataset");
    let mut loss_sum = 0.0;
    let mut metric_sums = vec![0.0; self.metrics.len()];
    let mut seen = 0.0;

    for batch in data.batches() {
      let targets = batch.targets.as_ref()
        .expect("Evaluation requires a labeled dataset");
      let pred = model.predict(&batch.inputs);

      let weight = batch.len() as f64;
      loss_sum += self.loss.measure(&pred, targets) * weight;
      for (sum, metric) in metric_sums.iter_mut().zip(&self.metrics) {
        *sum += metric.compute(&pred, targets) * weight;
      }
      seen += weight;
    }

    Evaluation {
      loss: loss_sum / seen,
      metrics: self.metrics.iter()
        .zip(metric_sums)
        .map(|(metric, sum)| (metric.name(), sum / seen) )
        .collect(),
    }
  }

  fn context(&self, epoch: usize, max_epochs: usize, loss: f64, metrics: Vec<(&'static str, f64)>, best_loss: Option<f64>, start: &Instant) -> Context {
    Context {
      epoch,
      max_epochs,
      loss,
      metrics,
      best_loss,
      elapsed_secs: start.elapsed().as_secs_f64(),
    }
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::layer::Activation::Linear;
  use crate::model::Sequential;
  use crate::optim::Sgd;
  use crate::callback::EarlyStopping;

  fn line_data() -> Dataset<f32> {
    // y = 2x
    let x = Tensor::new(&[4, 1], vec![1.0, 2.0, 3.0, 4.0]);
    let y = Tensor::new(&[4, 1], vec![2.0, 4.0, 6.0, 8.0]);
    Dataset::from_tensors(x, y).batch(2)
  }

  #[test]
  fn fit_converges_on_linear_task() {
    let model = Sequential::new().dense(1, 1, Linear);
    let mut trainer = Trainer::new(Sgd::new(0.02), Loss::MeanSquaredError)
      .with_metric(Metric::MeanAbsoluteError);

    let history = trainer.fit(&model, &line_data(), 500);
    assert_eq!(history.len(), 500);
    assert!(history.final_loss().unwrap() < 1e-3,
      "loss stayed at {}", history.final_loss().unwrap());
    assert!(!history.stopped_early);

    let evaluation = trainer.evaluate(&model, &line_data());
    assert!(evaluation.loss < 1e-3);
    assert_eq!(evaluation.metrics[0].0, "mae");
  }

  #[test]
  fn history_tracks_best_loss() {
    let model = Sequential::new().dense(1, 1, Linear);
    let mut trainer = Trainer::new(Sgd::new(0.02), Loss::MeanSquaredError);
    let history = trainer.fit(&model, &line_data(), 50);
    assert!(history.best_loss().unwrap() <= history.epochs[0].loss);
  }

  #[test]
  fn early_stopping_halts_stalled_run() {
    let model = Sequential::new().dense(1, 1, Linear);
    // Zero learning rate: the loss cannot improve
    let mut trainer = Trainer::new(Sgd::new(0.0), Loss::MeanSquaredError)
      .with_callback(EarlyStopping::new(1));

    let history = trainer.fit(&model, &line_data(), 10);
    assert!(history.stopped_early);
    assert_eq!(history.len(), 2);
  }

  #[test]
  fn refitting_continues_from_current_weights(){
    let model = Sequential::new().dense(1, 1, Linear);
    let mut trainer = Trainer::new(Sgd::new(0.02), Loss::MeanSquaredError);
    let first = trainer.fit(&model, &line_data(), 100);
    let second = trainer.fit(&model, &line_data(), 100);
    assert!(second.final_loss().unwrap() <= first.final_loss().unwrap());
  }

  #[test]
  #[should_panic]
  fn unlabeled_dataset() {
    let model = Sequential::new().dense(1, 1, Linear);
    let data = Dataset::from_slice(&[1.0, 2.0]).batch(1);
    Trainer::new(Sgd::new(0.1), Loss::MeanSquaredError).fit(&model, &data, 1);
  }
}
