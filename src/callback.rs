use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::persist::Result;


/// What the training loop should do after an epoch hook.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
  Continue,
  Stop,
}


/// Training state handed to every callback hook.

#[derive(Debug, Clone)]
pub struct Context {
  /// Current epoch, 0-indexed.
  pub epoch: usize,
  pub max_epochs: usize,
  /// Mean training loss of the epoch.
  pub loss: f64,
  /// Metric values of the epoch, by metric name.
  pub metrics: Vec<(&'static str, f64)>,
  /// Best epoch loss seen this run, if any epoch finished yet.
  pub best_loss: Option<f64>,
  pub elapsed_secs: f64,
}


/// Hook into training-loop events. All methods default to doing
/// nothing, so implementations only write out the events they care
/// about.

pub trait Callback {
  fn on_train_begin(&mut self, _ctx: &Context) {}

  fn on_epoch_end(&mut self, _ctx: &Context) -> Signal {
    Signal::Continue
  }

  fn on_train_end(&mut self, _ctx: &Context) {}

  fn name(&self) -> &'static str {
    "callback"
  }
}


/// Stop training once the loss stops improving.
///
/// An epoch counts as an improvement when its loss undercuts the best
/// loss so far by more than `min_delta`. After `patience` epochs without
/// one, training stops.

pub struct EarlyStopping {
  patience: usize,
  min_delta: f64,
  best: f64,
  stale: usize,
}

impl EarlyStopping {
  pub fn new(patience: usize) -> Self {
    Self {
      patience,
      min_delta: 0.0,
      best: f64::INFINITY,
      stale: 0,
    }
  }

  pub fn with_min_delta(mut self, min_delta: f64) -> Self {
    self.min_delta = min_delta;
    self
  }
}

impl Callback for EarlyStopping {
  fn on_train_begin(&mut self, _ctx: &Context) {
    self.best = f64::INFINITY;
    self.stale = 0;
  }

  fn on_epoch_end(&mut self, ctx: &Context) -> Signal {
    if ctx.loss < self.best - self.min_delta {
      self.best = ctx.loss;
      self.stale = 0;
      return Signal::Continue
    }
    self.stale += 1;
    if self.stale >= self.patience {
      eprintln!("Early stopping after epoch {}: no improvement for {} epochs (best loss {:.4})",
        ctx.epoch + 1, self.patience, self.best);
      Signal::Stop
    } else {
      Signal::Continue
    }
  }

  fn name(&self) -> &'static str {
    "early_stopping"
  }
}


/// Append one JSON line per epoch to `<dir>/metrics.jsonl`, for plotting
/// training curves with external tooling.
///
/// The file is truncated when the logger is created, so one logger
/// equals one run. Write failures during training are reported on
/// stderr instead of aborting the run.

pub struct MetricsLogger {
  path: PathBuf,
}

impl MetricsLogger {
  pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;
    let path = dir.join("metrics.jsonl");
    fs::File::create(&path)?;
    Ok(Self { path })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn append(&self, ctx: &Context) -> std::io::Result<()> {
    let mut record = serde_json::Map::new();
    record.insert("epoch".into(), (ctx.epoch + 1).into());
    record.insert("loss".into(), ctx.loss.into());
    for &(name, value) in &ctx.metrics {
      record.insert(name.into(), value.into());
    }
    record.insert("elapsed_secs".into(), ctx.elapsed_secs.into());
    let mut file = fs::OpenOptions::new().append(true).open(&self.path)?;
    writeln!(file, "{}", serde_json::Value::Object(record))
  }
}

impl Callback for MetricsLogger {
  fn on_epoch_end(&mut self, ctx: &Context) -> Signal {
    if let Err(error) = self.append(ctx) {
      eprintln!("Could not write metrics to {}: {error}", self.path.display());
    }
    Signal::Continue
  }

  fn name(&self) -> &'static str {
    "metrics_logger"
  }
}


/// Print one progress line every `every` epochs.

pub struct Progress {
  every: usize,
}

impl Progress {
  pub fn new(every: usize) -> Self {
    assert!(every > 0, "Progress interval must be positive");
    Self { every }
  }
}

impl Default for Progress {
  fn default() -> Self {
    Self::new(1)
  }
}

impl Callback for Progress {
  fn on_epoch_end(&mut self, ctx: &Context) -> Signal {
    if (ctx.epoch + 1) % self.every == 0 || ctx.epoch + 1 == ctx.max_epochs {
      let metrics = ctx.metrics.iter()
        .map(|(name, value)| format!(" - {name}: {value:.4}") )
        .collect::<String>();
      println!("epoch {}/{} - loss: {:.4}{metrics} ({:.1}s)",
        ctx.epoch + 1, ctx.max_epochs, ctx.loss, ctx.elapsed_secs);
    }
    Signal::Continue
  }

  fn name(&self) -> &'static str {
    "progress"
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  fn context(epoch: usize, loss: f64) -> Context {
    Context {
      epoch,
      max_epochs: 10,
      loss,
      metrics: vec![("mae", loss / 2.0)],
      best_loss: None,
      elapsed_secs: 0.0,
    }
  }

  #[test]
  fn early_stopping_patience() {
    let mut stopper = EarlyStopping::new(2);
    assert_eq!(stopper.on_epoch_end(&context(0, 1.0)), Signal::Continue);
    assert_eq!(stopper.on_epoch_end(&context(1, 0.9)), Signal::Continue);
    assert_eq!(stopper.on_epoch_end(&context(2, 0.9)), Signal::Continue);
    assert_eq!(stopper.on_epoch_end(&context(3, 0.9)), Signal::Stop);
  }

  #[test]
  fn early_stopping_improvement_resets() {
    let mut stopper = EarlyStopping::new(2);
    stopper.on_epoch_end(&context(0, 1.0));
    stopper.on_epoch_end(&context(1, 1.0));
    assert_eq!(stopper.on_epoch_end(&context(2, 0.5)), Signal::Continue);
    assert_eq!(stopper.on_epoch_end(&context(3, 0.5)), Signal::Continue);
    assert_eq!(stopper.on_epoch_end(&context(4, 0.5)), Signal::Stop);
  }

  #[test]
  fn early_stopping_min_delta() {
    let mut stopper = EarlyStopping::new(1).with_min_delta(0.05);
    stopper.on_epoch_end(&context(0, 1.0));
    // Improvement below min_delta doesn't count
    assert_eq!(stopper.on_epoch_end(&context(1, 0.97)), Signal::Stop);
  }

  #[test]
  fn logger_writes_json_lines() {
    let dir = tempfile::tempdir().unwrap();
    let mut logger = MetricsLogger::new(dir.path().join("logs")).unwrap();
    logger.on_epoch_end(&context(0, 0.5));
    logger.on_epoch_end(&context(1, 0.25));

    let content = fs::read_to_string(logger.path()).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 2);

    let record: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
    assert_eq!(record["epoch"], 2);
    assert_eq!(record["loss"], 0.25);
    assert_eq!(record["mae"], 0.125);
  }
}
