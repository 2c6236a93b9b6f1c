use std::rc::Rc;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::tensor::Tensor;
use crate::scalar::Real;


fn next_id() -> usize {
  static LAST_ID: AtomicUsize = AtomicUsize::new(0);
  LAST_ID.fetch_add(1, Ordering::Relaxed)
}


type BackwardFn<T> = Box<dyn Fn(&Tensor<T>)>;

/// Node in a computation graph: the value of a [Variable], its gradient,
/// its input nodes and the closure that distributes an incoming gradient
/// to those inputs.

struct Node<T: Real> {
  id: usize,
  data: Tensor<T>,
  grad: Option<Tensor<T>>,
  parents: Vec<Rc<Node<T>>>,
  backward: Option<BackwardFn<T>>,
  trainable: bool,
}


/// Tensor that records the operations used to create it, so gradients
/// with respect to all trainable inputs can be computed.
///
/// Created by calling [tracked](Tensor::tracked) or
/// [trained](Tensor::trained) on a [Real] tensor. Variables dereference
/// to their underlying [Tensor] for non-differentiable inspection;
/// differentiable operations return another Variable.
///
/// A node carries a gradient exactly when one of its ancestors is
/// trainable. Gradient contributions accumulate, so values used twice in
/// one graph back-propagate correctly.

#[derive(Clone)]
pub struct Variable<T: Real> {
  node: Rc<Node<T>>,
}

impl<T: Real> std::ops::Deref for Variable<T> {
  type Target = Tensor<T>;

  fn deref(&self) -> &Self::Target {
    &self.node.data
  }
}

impl<T: Real> PartialEq for Variable<T> {
  fn eq(&self, rhs: &Self) -> bool {
    self.node.data == rhs.node.data
  }
}

impl<T: Real> Variable<T> {
  pub(crate) fn leaf(data: Tensor<T>, trainable: bool) -> Self {
    Self {
      node: Rc::new(Node {
        id: next_id(),
        grad: trainable.then(|| Tensor::zeros(data.dims()) ),
        data,
        parents: vec![],
        backward: None,
        trainable,
      }),
    }
  }

  fn from_op(data: Tensor<T>, parents: Vec<Rc<Node<T>>>, backward: BackwardFn<T>) -> Self {
    let tracked = parents.iter().any(|p| p.grad.is_some() );
    Self {
      node: Rc::new(Node {
        id: next_id(),
        grad: tracked.then(|| Tensor::zeros(data.dims()) ),
        data,
        parents,
        backward: if tracked { Some(backward) } else { None },
        trainable: false,
      }),
    }
  }

  pub fn id(&self) -> usize {
    self.node.id
  }

  pub fn data(&self) -> &Tensor<T> {
    &self.node.data
  }

  pub fn grad(&self) -> Option<&Tensor<T>> {
    self.node.grad.as_ref()
  }

  pub fn add(&self, rhs: &Self) -> Self {
    let (l, r) = (self.node.clone(), rhs.node.clone());
    Self::from_op(
      self.data().add(rhs.data()),
      vec![self.node.clone(), rhs.node.clone()],
      Box::new(move |grad| {
        if let Some(g) = &l.grad { g.accumulate(&grad.reduce_to(l.data.dims())) }
        if let Some(g) = &r.grad { g.accumulate(&grad.reduce_to(r.data.dims())) }
      }),
    )
  }

  pub fn sub(&self, rhs: &Self) -> Self {
    let (l, r) = (self.node.clone(), rhs.node.clone());
    Self::from_op(
      self.data().sub(rhs.data()),
      vec![self.node.clone(), rhs.node.clone()],
      Box::new(move |grad| {
        if let Some(g) = &l.grad { g.accumulate(&grad.reduce_to(l.data.dims())) }
        if let Some(g) = &r.grad { g.accumulate(&grad.map(|v| -v ).reduce_to(r.data.dims())) }
      }),
    )
  }

  pub fn mul(&self, rhs: &Self) -> Self {
    let (l, r) = (self.node.clone(), rhs.node.clone());
    Self::from_op(
      self.data().mul(rhs.data()),
      vec![self.node.clone(), rhs.node.clone()],
      Box::new(move |grad| {
        if let Some(g) = &l.grad { g.accumulate(&grad.mul(&r.data).reduce_to(l.data.dims())) }
        if let Some(g) = &r.grad { g.accumulate(&grad.mul(&l.data).reduce_to(r.data.dims())) }
      }),
    )
  }

  pub fn matmul(&self, rhs: &Self) -> Self {
    let (l, r) = (self.node.clone(), rhs.node.clone());
    Self::from_op(
      self.data().matmul(rhs.data()),
      vec![self.node.clone(), rhs.node.clone()],
      Box::new(move |grad| {
        if let Some(g) = &l.grad { g.accumulate(&grad.matmul(&r.data.transpose(0, 1))) }
        if let Some(g) = &r.grad { g.accumulate(&l.data.transpose(0, 1).matmul(grad)) }
      }),
    )
  }

  pub fn neg(&self) -> Self {
    self.mul_scalar(-T::one())
  }

  pub fn add_scalar(&self, value: T) -> Self {
    let p = self.node.clone();
    Self::from_op(
      self.data() + value,
      vec![self.node.clone()],
      Box::new(move |grad| {
        if let Some(g) = &p.grad { g.accumulate(grad) }
      }),
    )
  }

  pub fn sub_scalar(&self, value: T) -> Self {
    self.add_scalar(-value)
  }

  pub fn mul_scalar(&self, value: T) -> Self {
    let p = self.node.clone();
    Self::from_op(
      self.data() * value,
      vec![self.node.clone()],
      Box::new(move |grad| {
        if let Some(g) = &p.grad { g.accumulate(&(grad * value)) }
      }),
    )
  }

  pub fn relu(&self) -> Self {
    let p = self.node.clone();
    Self::from_op(
      self.data().map(|v| if v > T::zero() { v } else { T::zero() } ),
      vec![self.node.clone()],
      Box::new(move |grad| {
        if let Some(g) = &p.grad {
          g.accumulate(&grad.zip(&p.data, |gv, v| if v > T::zero() { gv } else { T::zero() } ));
        }
      }),
    )
  }

  pub fn sigmoid(&self) -> Self {
    let out = self.data().map(|v| T::one() / (T::one() + (-v).exp()) );
    let p = self.node.clone();
    let saved = out.clone();
    Self::from_op(
      out,
      vec![self.node.clone()],
      Box::new(move |grad| {
        if let Some(g) = &p.grad {
          g.accumulate(&grad.zip(&saved, |gv, s| gv * s * (T::one() - s) ));
        }
      }),
    )
  }

  pub fn tanh(&self) -> Self {
    let out = self.data().map(|v| v.tanh() );
    let p = self.node.clone();
    let saved = out.clone();
    Self::from_op(
      out,
      vec![self.node.clone()],
      Box::new(move |grad| {
        if let Some(g) = &p.grad {
          g.accumulate(&grad.zip(&saved, |gv, t| gv * (T::one() - t * t) ));
        }
      }),
    )
  }

  pub fn sqr(&self) -> Self {
    let p = self.node.clone();
    Self::from_op(
      self.data().map(|v| v * v ),
      vec![self.node.clone()],
      Box::new(move |grad| {
        if let Some(g) = &p.grad {
          g.accumulate(&grad.zip(&p.data, |gv, v| gv * (v + v) ));
        }
      }),
    )
  }

  /// Sum all elements into a scalar.

  pub fn sum(&self) -> Self {
    let p = self.node.clone();
    Self::from_op(
      Tensor::scalar(self.data().sum()),
      vec![self.node.clone()],
      Box::new(move |grad| {
        if let Some(g) = &p.grad {
          g.accumulate(&Tensor::fill(p.data.dims(), grad.item()));
        }
      }),
    )
  }

  /// Average all elements into a scalar.

  pub fn mean(&self) -> Self {
    let p = self.node.clone();
    let n = T::from(self.data().size()).unwrap();
    Self::from_op(
      Tensor::scalar(self.data().mean()),
      vec![self.node.clone()],
      Box::new(move |grad| {
        if let Some(g) = &p.grad {
          g.accumulate(&Tensor::fill(p.data.dims(), grad.item() / n));
        }
      }),
    )
  }

  /// Compute gradients for the entire graph below this Variable.

  pub fn backward(&self) {
    let grad = self.node.grad.as_ref()
      .unwrap_or_else(|| panic!("Cannot backpropagate a constant {}", self.data().shape()) );
    grad.refill(T::one());
    for node in self.history().iter().rev() {
      if let (Some(backward), Some(grad)) = (&node.backward, &node.grad) {
        backward(grad);
      }
    }
  }

  /// All trainable leaves reachable from this Variable.

  pub fn parameters(&self) -> Vec<Self> {
    self.history()
      .into_iter()
      .filter(|node| node.trainable )
      .map(|node| Self { node } )
      .collect()
  }

  /// Set all gradients in the graph back to zero.

  pub fn zero_grad(&self) {
    for node in self.history() {
      if let Some(grad) = &node.grad {
        grad.refill(T::zero());
      }
    }
  }

  /// Node count, op count, trainable tensor count and total trainable
  /// weight count of the graph below this Variable.

  pub fn statistics(&self) -> (usize, usize, usize, usize) {
    let history = self.history();
    let nodes = history.len();
    let ops = history.iter().filter(|node| node.backward.is_some() ).count();
    let params = self.parameters();
    let weights = params.iter().map(|p| p.data().size() ).sum();
    (nodes, ops, params.len(), weights)
  }

  /// Topological order, inputs first.

  fn history(&self) -> Vec<Rc<Node<T>>> {
    let mut history = vec![];
    Self::visit(&self.node, &mut history, &mut HashSet::new());
    history
  }

  fn visit(node: &Rc<Node<T>>, history: &mut Vec<Rc<Node<T>>>, seen: &mut HashSet<usize>) {
    if !seen.insert(node.id) { return }
    for parent in &node.parents {
      Self::visit(parent, history, seen);
    }
    history.push(node.clone());
  }
}

macro_rules! variable_operator {
  ($trait:ident, $method:ident, $scalar_method:ident) => {
    impl<T: Real> std::ops::$trait for &Variable<T> {
      type Output = Variable<T>;
      fn $method(self, rhs: Self) -> Variable<T> { Variable::$method(self, rhs) }
    }

    impl<T: Real> std::ops::$trait for Variable<T> {
      type Output = Variable<T>;
      fn $method(self, rhs: Self) -> Variable<T> { Variable::$method(&self, &rhs) }
    }

    impl<T: Real> std::ops::$trait<&Variable<T>> for Variable<T> {
      type Output = Variable<T>;
      fn $method(self, rhs: &Variable<T>) -> Variable<T> { Variable::$method(&self, rhs) }
    }

    impl<T: Real> std::ops::$trait<Variable<T>> for &Variable<T> {
      type Output = Variable<T>;
      fn $method(self, rhs: Variable<T>) -> Variable<T> { Variable::$method(self, &rhs) }
    }

    impl<T: Real> std::ops::$trait<T> for &Variable<T> {
      type Output = Variable<T>;
      fn $method(self, rhs: T) -> Variable<T> { Variable::$scalar_method(self, rhs) }
    }

    impl<T: Real> std::ops::$trait<T> for Variable<T> {
      type Output = Variable<T>;
      fn $method(self, rhs: T) -> Variable<T> { Variable::$scalar_method(&self, rhs) }
    }
  };
}

variable_operator!(Add, add, add_scalar);
variable_operator!(Sub, sub, sub_scalar);
variable_operator!(Mul, mul, mul_scalar);

impl<T: Real> std::ops::Neg for &Variable<T> {
  type Output = Variable<T>;

  fn neg(self) -> Variable<T> {
    Variable::neg(self)
  }
}

impl<T: Real> std::fmt::Debug for Variable<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
    f.debug_struct("Variable")
      .field("id", &self.node.id)
      .field("data", &self.node.data)
      .field("trainable", &self.node.trainable)
      .finish()
  }
}

impl<T: Real> std::fmt::Display for Variable<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
    let title = if self.node.trainable {
      "Trainable"
    } else if self.node.grad.is_some() {
      "Computed"
    } else {
      "Tracked"
    };
    write!(f, "{title} {}", self.data())
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn x_squared() {
    let x = Tensor::vec(&[3.0, 5.0]).trained();
    let z = &x * &x + 2.0;
    z.backward();
    assert_eq!(z.data(), &Tensor::vec(&[11.0, 27.0]));
    assert_eq!(x.grad(), Some(&Tensor::vec(&[6.0, 10.0])));
  }

  #[test]
  fn value_used_twice() {
    let x = Tensor::vec(&[2.0]).trained();
    let z = (&x * &x) + &x;
    z.backward();
    assert_eq!(x.grad(), Some(&Tensor::vec(&[5.0])));
  }

  #[test]
  fn dense_gradients() {
    let x = Tensor::new(&[2,2], vec![1.0, 2.0, 3.0, 4.0]).tracked();
    let w = Tensor::new(&[2,1], vec![1.0, 1.0]).trained();
    let b = Tensor::vec(&[0.5]).trained();
    let out = x.matmul(&w) + &b;
    let loss = out.sum();
    loss.backward();
    // d/dw = column sums of x, d/db = batch size
    assert_eq!(w.grad(), Some(&Tensor::new(&[2,1], vec![4.0, 6.0])));
    assert_eq!(b.grad(), Some(&Tensor::vec(&[2.0])));
  }

  #[test]
  fn relu_mask() {
    let x = Tensor::vec(&[-1.0, 2.0]).trained();
    let z = x.relu().sum();
    z.backward();
    assert_eq!(x.grad(), Some(&Tensor::vec(&[0.0, 1.0])));
  }

  #[test]
  fn sigmoid_gradient() {
    let x = Tensor::vec(&[0.0]).trained();
    let z = x.sigmoid();
    z.backward();
    assert_eq!(z.data(), &Tensor::vec(&[0.5]));
    assert_eq!(x.grad(), Some(&Tensor::vec(&[0.25])));
  }

  #[test]
  fn mean_gradient() {
    let x = Tensor::vec(&[1.0, 3.0, 5.0, 7.0]).trained();
    let z = x.mean();
    z.backward();
    assert_eq!(z.data().item(), 4.0);
    assert_eq!(x.grad(), Some(&Tensor::fill(&[4], 0.25)));
  }

  #[test]
  fn parameters_and_reset() {
    let w = Tensor::<f64>::randn(&[2, 4]).trained();
    let b = Tensor::zeros(&[4]).trained();
    let x = Tensor::randn(&[3, 2]).tracked();
    let loss = (x.matmul(&w) + &b).sqr().mean();
    loss.backward();
    assert_eq!(loss.parameters().len(), 2);
    assert!(w.grad().unwrap().to_vec().iter().any(|&g| g != 0.0 ));
    loss.zero_grad();
    assert!(w.grad().unwrap().to_vec().iter().all(|&g| g == 0.0 ));
  }

  #[test]
  #[should_panic]
  fn constant_backward() {
    let x = Tensor::vec(&[1.0, 2.0]).tracked();
    let z = x.sum();
    z.backward();
  }
}
