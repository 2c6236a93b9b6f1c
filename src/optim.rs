use std::collections::HashMap;

use crate::autograd::Variable;
use crate::tensor::Tensor;
use crate::scalar::Real;


/// Gradient descent update rule. [step](Optimizer::step) is called once
/// per batch, after back-propagation, and mutates every parameter that
/// carries a gradient in place.

pub trait Optimizer<T: Real> {
  fn step(&mut self, params: &[Variable<T>]);

  fn learning_rate(&self) -> T;

  fn set_learning_rate(&mut self, rate: T);
}


/// Stochastic gradient descent, with optional momentum.
///
/// Per-parameter velocity is kept between steps, keyed by the
/// parameter's node id, so the same optimizer can drive repeated
/// [fit](crate::Trainer::fit) calls.

pub struct Sgd<T: Real> {
  rate: T,
  momentum: T,
  velocity: HashMap<usize, Tensor<T>>,
}

impl<T: Real> Sgd<T> {
  pub fn new(rate: T) -> Self {
    Self::with_momentum(rate, T::zero())
  }

  pub fn with_momentum(rate: T, momentum: T) -> Self {
    Self { rate, momentum, velocity: HashMap::new() }
  }
}

impl<T: Real> Optimizer<T> for Sgd<T> {
  fn step(&mut self, params: &[Variable<T>]) {
    for param in params {
      let grad = param.grad().expect("Non-trainable parameters cannot be optimized");
      let weights = param.data();
      if self.momentum == T::zero() {
        weights.assign(&(weights - grad * self.rate));
      } else {
        let v = self.velocity.entry(param.id())
          .or_insert_with(|| Tensor::zeros(weights.dims()) )
          .clone();
        v.assign(&(&v * self.momentum - grad * self.rate));
        weights.assign(&(weights + v));
      }
    }
  }

  fn learning_rate(&self) -> T {
    self.rate
  }

  fn set_learning_rate(&mut self, rate: T) {
    self.rate = rate;
  }
}


/// Adaptive moment estimation.

pub struct Adam<T: Real> {
  rate: T,
  beta1: T,
  beta2: T,
  epsilon: T,
  step: i32,
  m: HashMap<usize, Tensor<T>>,
  v: HashMap<usize, Tensor<T>>,
}

impl<T: Real> Adam<T> {
  pub fn new(rate: T) -> Self {
    Self::with_betas(rate, T::from(0.9).unwrap(), T::from(0.999).unwrap())
  }

  pub fn with_betas(rate: T, beta1: T, beta2: T) -> Self {
    Self {
      rate,
      beta1,
      beta2,
      epsilon: T::from(1e-8).unwrap(),
      step: 1,
      m: HashMap::new(),
      v: HashMap::new(),
    }
  }
}

impl<T: Real> Optimizer<T> for Adam<T> {
  fn step(&mut self, params: &[Variable<T>]) {
    let one = T::one();
    for param in params {
      let grad = param.grad().expect("Non-trainable parameters cannot be optimized");
      let weights = param.data();
      let m = self.m.entry(param.id())
        .or_insert_with(|| Tensor::zeros(weights.dims()) )
        .clone();
      let v = self.v.entry(param.id())
        .or_insert_with(|| Tensor::zeros(weights.dims()) )
        .clone();
      m.assign(&(&m * self.beta1 + grad * (one - self.beta1)));
      v.assign(&(&v * self.beta2 + grad.mul(grad) * (one - self.beta2)));
      // Bias-corrected moments
      let m_hat = &m / (one - self.beta1.powi(self.step));
      let v_hat = &v / (one - self.beta2.powi(self.step));
      weights.assign(&(weights - m_hat * self.rate / (v_hat.sqrt() + self.epsilon)));
    }
    self.step += 1;
  }

  fn learning_rate(&self) -> T {
    self.rate
  }

  fn set_learning_rate(&mut self, rate: T) {
    self.rate = rate;
  }
}
