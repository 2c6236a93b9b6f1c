//! Tensors, reverse-mode autograd and a small Keras-style training API.
//! Tiny. Few dependencies. CPU only.
//!
//! # Features
//!
//! - **Tensors**: Multidimensional arrays over any [scalar::Real] type,
//! with broadcasting, zero-copy views and shared storage.
//!
//! - **Autograd**: Eager computation graphs recorded on the fly.
//! Calling [tracked](Tensor::tracked) or [trained](Tensor::trained) on a
//! tensor makes every downstream operation differentiable.
//!
//! - **Data pipeline**: In-memory [datasets](Dataset) with map, batch
//! and seeded shuffle.
//!
//! - **Two model styles**: A [Sequential] layer stack, or free
//! composition of layers as a [GraphModel]. Both train the same way.
//!
//! - **Training loop**: A [Trainer] bundling optimizer, loss, metrics
//! and [callbacks](Callback) such as early stopping and a JSONL metrics
//! log for external plotting.
//!
//! - **Persistence**: Save a trained model to a single file and load it
//! elsewhere, without access to the code that built it.
//!
//! # Example
//!
//! Fitting a feed-forward network to random stand-in data:
//!
//! ```
//! use ferroflow::{ Activation::*, Adam, Dataset, EarlyStopping, Loss, Metric, Sequential, Tensor, Trainer };
//!
//! // Random stand-in data; swap in a real workload
//! let x = Tensor::<f32>::rand(&[32, 4]);
//! let y = Tensor::rand(&[32, 1]);
//! let data = Dataset::from_tensors(x, y).shuffle(42).batch(8);
//!
//! let model = Sequential::new()
//!   .dense(4, 16, Relu)
//!   .dense(16, 8, Relu)
//!   .dense(8, 1, Linear);
//!
//! let mut trainer = Trainer::new(Adam::new(0.001), Loss::MeanSquaredError)
//!   .with_metric(Metric::MeanAbsoluteError)
//!   .with_callback(EarlyStopping::new(3));
//!
//! let history = trainer.fit(&model, &data, 5);
//! println!("final loss: {:.4}", history.final_loss().unwrap());
//! ```
//!
//! ## More examples
//! The `/demos` folder walks through every part of the API in order.

mod shape;
mod tensor;
mod autograd;

pub mod scalar;
pub mod data;
pub mod layer;
pub mod model;
pub mod optim;
pub mod train;
pub mod callback;
pub mod persist;

pub use shape::Shape;
pub use tensor::Tensor;
pub use autograd::Variable;
pub use data::{Dataset, Batch};
pub use layer::{Activation, Dense};
pub use model::{Model, Sequential, GraphModel};
pub use optim::{Optimizer, Sgd, Adam};
pub use train::{Trainer, Loss, Metric, History, EpochRecord, Evaluation};
pub use callback::{Callback, Signal, Context, EarlyStopping, MetricsLogger, Progress};
pub use persist::{Error, Result, Metadata, read_metadata};
