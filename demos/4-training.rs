// This demo runs the whole training workflow: compile, fit, evaluate,
// refit with callbacks attached, then save the model and load it back.

use ferroflow::{
  Activation::*, Adam, Dataset, EarlyStopping, Loss, Metric, MetricsLogger,
  Model, Progress, Sequential, Tensor, Trainer,
};

fn main() -> ferroflow::Result<()> {
  // Random stand-in data; swap in a real workload
  let x = Tensor::<f32>::rand(&[100, 4]);
  let y = Tensor::rand(&[100, 1]);
  let data = Dataset::from_tensors(x.clone(), y).shuffle(7).batch(8);

  let model = Sequential::new()
    .dense(4, 16, Relu)
    .dense(16, 8, Relu)
    .dense(8, 1, Linear);

  // Optimizer, loss and metrics in one place
  let mut trainer = Trainer::new(Adam::new(0.001), Loss::MeanSquaredError)
    .with_metric(Metric::MeanAbsoluteError);

  // Plain fit
  trainer.fit(&model, &data, 5);

  let evaluation = trainer.evaluate(&model, &data);
  println!("Loss: {:.4}  MAE: {:.4}", evaluation.loss, evaluation.metrics[0].1);

  // Refit with callbacks: early stopping, a progress line per epoch and
  // a JSONL metrics log under ./logs for external plotting
  trainer.add_callback(EarlyStopping::new(3));
  trainer.add_callback(Progress::default());
  trainer.add_callback(MetricsLogger::new("logs")?);

  let history = trainer.fit(&model, &data, 10);
  println!("Trained {} epochs (stopped early: {})", history.len(), history.stopped_early);

  // Save the trained model, then load it elsewhere
  model.save("my_model.ffw")?;
  let loaded = Sequential::<f32>::load("my_model.ffw")?;

  let preds = loaded.predict(&x.slice_rows(0, 5));
  println!("Predictions from loaded model:\n{preds}");
  Ok(())
}
