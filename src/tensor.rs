use std::rc::Rc;
use std::cell::{Ref, RefCell};

use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::shape::Shape;
use crate::scalar::{Inner, Numeric, Real};
use crate::autograd::Variable;


/// Multidimensional array with shared storage.
///
/// Cloning a tensor is cheap; clones view the same data. Shape-changing
/// operations like [transpose](Tensor::transpose) produce views as well,
/// while math operations allocate fresh storage.
///
/// [Real] tensors can enter a computation graph by calling
/// [tracked](Tensor::tracked) or [trained](Tensor::trained).

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tensor<T: Inner> {
  shape: Shape,
  data: Rc<RefCell<Vec<T>>>,
}

impl<T: Inner> Tensor<T> {
  pub fn from_shape(shape: Shape, data: Vec<T>) -> Self {
    assert_eq!(shape.size(), data.len(),
      "{} doesn't match data length {}", shape, data.len());
    Self { shape, data: Rc::new(RefCell::new(data)) }
  }

  pub fn new(dims: &[usize], data: Vec<T>) -> Self {
    Self::from_shape(Shape::new(dims), data)
  }

  pub fn vec(values: &[T]) -> Self {
    Self::new(&[values.len()], values.to_vec())
  }

  pub fn from_vec(values: Vec<T>) -> Self {
    Self::new(&[values.len()], values)
  }

  pub fn scalar(value: T) -> Self {
    Self::new(&[], vec![value])
  }

  pub fn fill(dims: &[usize], value: T) -> Self {
    Self::new(dims, vec![value; dims.iter().product()])
  }

  fn from_fn(dims: &[usize], mut f: impl FnMut() -> T) -> Self {
    let shape = Shape::new(dims);
    let data = (0..shape.size()).map(|_| f() ).collect();
    Self::from_shape(shape, data)
  }

  /// Stack row tensors into a new leading dimension.

  pub fn rows(rows: &[Self]) -> Self {
    assert!(!rows.is_empty(), "Cannot stack zero rows");
    let mut dims = vec![rows.len()];
    dims.extend(rows[0].shape.dims());
    let data = rows.iter()
      .flat_map(|row| row.to_vec() )
      .collect();
    Self::new(&dims, data)
  }

  pub fn shape(&self) -> &Shape {
    &self.shape
  }

  pub fn dims(&self) -> &[usize] {
    self.shape.dims()
  }

  pub fn size(&self) -> usize {
    self.shape.size()
  }

  pub fn rank(&self) -> usize {
    self.shape.rank()
  }

  /// Name of the element type, e.g. `"f32"`.

  pub fn dtype(&self) -> &'static str {
    std::any::type_name::<T>()
  }

  pub fn raw(&self) -> Ref<Vec<T>> {
    self.data.borrow()
  }

  /// Elements in logical row-major order, resolving any view strides.

  pub fn to_vec(&self) -> Vec<T> {
    let data = self.data.borrow();
    self.shape.iter().map(|i| data[i] ).collect()
  }

  pub fn item(&self) -> T {
    assert_eq!(self.shape.squeeze().rank(), 0,
      "Can't extract item from non-scalar {}", self.shape);
    self.to_vec()[0]
  }

  /// Owned contiguous copy, detached from shared storage.

  pub fn detach(&self) -> Self {
    Self::new(self.shape.dims(), self.to_vec())
  }

  pub fn map<O: Inner>(&self, f: impl Fn(T) -> O) -> Tensor<O> {
    Tensor::new(self.shape.dims(), self.to_vec().into_iter().map(f).collect())
  }

  /// Combine two tensors elementwise, broadcasting shapes first.

  pub fn zip<O: Inner>(&self, rhs: &Self, f: impl Fn(T, T) -> O) -> Tensor<O> {
    let (sl, sr) = self.shape.broadcast_with(rhs.shape());
    let data_l = self.data.borrow();
    let data_r = rhs.data.borrow();
    let data = sl.iter()
      .zip(sr.iter())
      .map(|(i, j)| f(data_l[i], data_r[j]) )
      .collect();
    Tensor::new(sl.dims(), data)
  }

  /// Copy values from another tensor of equal shape into this one's
  /// storage. All views of this storage observe the change.

  pub fn assign(&self, rhs: &Self) {
    assert_eq!(self.dims(), rhs.dims(),
      "Could not assign {} to {}", rhs.shape, self.shape);
    // Materializing first keeps the mutable borrow exclusive when both
    // tensors view the same storage
    let values = rhs.to_vec();
    let mut data = self.data.borrow_mut();
    for (i, v) in self.shape.iter().zip(values) {
      data[i] = v;
    }
  }

  pub fn transpose(&self, d1: usize, d2: usize) -> Self {
    Self { shape: self.shape.transpose(d1, d2), data: self.data.clone() }
  }

  pub fn reshape(&self, dims: &[usize]) -> Self {
    Self { shape: self.shape.reshape(dims), data: self.data.clone() }
  }

  pub fn unsqueeze(&self, dim: usize) -> Self {
    Self { shape: self.shape.unsqueeze(dim), data: self.data.clone() }
  }

  /// View of `len` consecutive rows along the first dimension.

  pub fn slice_rows(&self, start: usize, len: usize) -> Self {
    Self { shape: self.shape.slice(start, len), data: self.data.clone() }
  }

  /// View of row `i` with the leading dimension removed.

  pub fn row(&self, i: usize) -> Self {
    Self { shape: self.shape.row(i), data: self.data.clone() }
  }
}

impl<T: Inner> PartialEq for Tensor<T> {
  fn eq(&self, rhs: &Self) -> bool {
    self.shape.squeeze().dims() == rhs.shape.squeeze().dims() &&
    self.to_vec() == rhs.to_vec()
  }
}

impl<T: Numeric> Tensor<T> {
  pub fn zeros(dims: &[usize]) -> Self {
    Self::fill(dims, T::zero())
  }

  pub fn ones(dims: &[usize]) -> Self {
    Self::fill(dims, T::one())
  }

  pub fn arrange(dims: &[usize], start: T, step: T) -> Self {
    let mut next = start;
    Self::from_fn(dims, || {
      let out = next;
      next = next + step;
      out
    })
  }

  pub fn add(&self, rhs: &Self) -> Self {
    self.zip(rhs, |a, b| a + b )
  }

  pub fn sub(&self, rhs: &Self) -> Self {
    self.zip(rhs, |a, b| a - b )
  }

  pub fn mul(&self, rhs: &Self) -> Self {
    self.zip(rhs, |a, b| a * b )
  }

  pub fn div(&self, rhs: &Self) -> Self {
    self.zip(rhs, |a, b| a / b )
  }

  /// Elementwise `+=` into this tensor's storage.

  pub fn accumulate(&self, rhs: &Self) {
    assert_eq!(self.dims(), rhs.dims(),
      "Could not accumulate {} into {}", rhs.shape, self.shape);
    let values = rhs.to_vec();
    let mut data = self.data.borrow_mut();
    for (i, v) in self.shape.iter().zip(values) {
      data[i] += v;
    }
  }

  pub fn refill(&self, value: T) {
    let mut data = self.data.borrow_mut();
    for i in self.shape.iter() {
      data[i] = value;
    }
  }

  pub fn sum(&self) -> T {
    self.to_vec().into_iter().sum()
  }

  pub fn mean(&self) -> T {
    assert!(self.size() > 0, "Mean of empty tensor");
    self.sum() / T::from(self.size()).unwrap()
  }

  pub fn max(&self) -> T {
    assert!(self.size() > 0, "Max of empty tensor");
    self.to_vec().into_iter()
      .reduce(|a, b| if b > a { b } else { a } )
      .unwrap()
  }

  /// Sum along one dimension, removing it from the shape.

  pub fn sum_axis(&self, dim: usize) -> Self {
    assert!(dim < self.rank());
    let dims = self.shape.dims();
    let out_dims: Vec<usize> = dims.iter()
      .enumerate()
      .filter(|&(d, _)| d != dim )
      .map(|(_, &n)| n )
      .collect();
    let inner: usize = dims[dim + 1..].iter().product();
    let mut out = vec![T::zero(); out_dims.iter().product()];
    for (i, v) in self.to_vec().into_iter().enumerate() {
      let rest = i % inner;
      let outer = i / (inner * dims[dim]);
      out[outer * inner + rest] += v;
    }
    Self::new(&out_dims, out)
  }

  /// Sum a broadcasted gradient back down to the given dimensions.

  pub(crate) fn reduce_to(&self, dims: &[usize]) -> Self {
    let mut out = self.clone();
    while out.rank() > dims.len() {
      out = out.sum_axis(0);
    }
    for (d, &n) in dims.iter().enumerate() {
      if n == 1 && out.dims()[d] != 1 {
        out = out.sum_axis(d).unsqueeze(d);
      }
    }
    debug_assert_eq!(out.dims(), dims);
    out
  }

  /// Matrix product of two rank-2 tensors.

  pub fn matmul(&self, rhs: &Self) -> Self {
    assert!(self.rank() == 2 && rhs.rank() == 2,
      "Matmul expects matrices, got {} and {}", self.shape, rhs.shape);
    let (m, k) = (self.dims()[0], self.dims()[1]);
    let (k2, n) = (rhs.dims()[0], rhs.dims()[1]);
    assert_eq!(k, k2, "Could not multiply {} with {}", self.shape, rhs.shape);
    let a = self.to_vec();
    let b = rhs.to_vec();
    let mut out = vec![T::zero(); m * n];
    for i in 0..m {
      for l in 0..k {
        let f = a[i * k + l];
        for j in 0..n {
          out[i * n + j] += f * b[l * n + j];
        }
      }
    }
    Self::new(&[m, n], out)
  }

  pub fn cast<O: Numeric>(&self) -> Tensor<O> {
    self.map(|v| O::from(v).unwrap() )
  }
}

impl<T: Real> Tensor<T> {
  /// Uniform samples from `[0, 1)`.

  pub fn rand(dims: &[usize]) -> Self {
    let mut rng = rand::thread_rng();
    Self::from_fn(dims, || rng.gen_range(T::zero()..T::one()) )
  }

  /// Standard normal samples via the polar Box-Muller transform.

  pub fn randn(dims: &[usize]) -> Self {
    let mut rng = rand::thread_rng();
    let mut spare = None;
    Self::from_fn(dims, || {
      spare.take().unwrap_or_else(|| {
        let (a, b) = normal_pair(&mut rng);
        spare = Some(b);
        a
      })
    })
  }

  /// Glorot uniform initialization for a `[fan_in, fan_out]` weight matrix.

  pub fn glorot(fan_in: usize, fan_out: usize) -> Self {
    let limit = T::from((6.0 / (fan_in + fan_out) as f64).sqrt()).unwrap();
    let mut rng = rand::thread_rng();
    Self::from_fn(&[fan_in, fan_out], || rng.gen_range(-limit..limit) )
  }

  pub fn abs(&self) -> Self {
    self.map(|v| v.abs() )
  }

  pub fn sqrt(&self) -> Self {
    self.map(|v| v.sqrt() )
  }

  pub fn allclose(&self, rhs: &Self, tolerance: T) -> bool {
    self.dims() == rhs.dims() &&
    self.to_vec().into_iter()
      .zip(rhs.to_vec())
      .all(|(a, b)| (a - b).abs() <= tolerance )
  }

  /// Wrap in a [Variable] as a graph input. Not trainable.

  pub fn tracked(&self) -> Variable<T> {
    Variable::leaf(self.clone(), false)
  }

  /// Wrap in a [Variable] as a trainable parameter.

  pub fn trained(&self) -> Variable<T> {
    Variable::leaf(self.clone(), true)
  }
}

macro_rules! binary_operator {
  ($trait:ident, $method:ident) => {
    impl<T: Numeric> std::ops::$trait for &Tensor<T> {
      type Output = Tensor<T>;
      fn $method(self, rhs: Self) -> Tensor<T> { Tensor::$method(self, rhs) }
    }

    impl<T: Numeric> std::ops::$trait for Tensor<T> {
      type Output = Tensor<T>;
      fn $method(self, rhs: Self) -> Tensor<T> { Tensor::$method(&self, &rhs) }
    }

    impl<T: Numeric> std::ops::$trait<&Tensor<T>> for Tensor<T> {
      type Output = Tensor<T>;
      fn $method(self, rhs: &Tensor<T>) -> Tensor<T> { Tensor::$method(&self, rhs) }
    }

    impl<T: Numeric> std::ops::$trait<Tensor<T>> for &Tensor<T> {
      type Output = Tensor<T>;
      fn $method(self, rhs: Tensor<T>) -> Tensor<T> { Tensor::$method(self, &rhs) }
    }

    impl<T: Numeric> std::ops::$trait<T> for &Tensor<T> {
      type Output = Tensor<T>;
      fn $method(self, rhs: T) -> Tensor<T> { Tensor::$method(self, &Tensor::scalar(rhs)) }
    }

    impl<T: Numeric> std::ops::$trait<T> for Tensor<T> {
      type Output = Tensor<T>;
      fn $method(self, rhs: T) -> Tensor<T> { Tensor::$method(&self, &Tensor::scalar(rhs)) }
    }
  };
}

binary_operator!(Add, add);
binary_operator!(Sub, sub);
binary_operator!(Mul, mul);
binary_operator!(Div, div);

impl<T: Inner> std::fmt::Display for Tensor<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
    write!(f, "Tensor{:?} ", self.dims())?;
    fmt_chunk(f, &self.to_vec(), self.dims(), 0)
  }
}

fn fmt_chunk<T: std::fmt::Debug>(f: &mut std::fmt::Formatter, data: &[T], dims: &[usize], depth: usize) -> std::fmt::Result {
  let indent = "  ".repeat(depth);
  if data.is_empty() {
    write!(f, "{indent}[]")
  } else if dims.len() <= 1 {
    write!(f, "{indent}{:?}", data)
  } else {
    writeln!(f, "{indent}[")?;
    for chunk in data.chunks(data.len() / dims[0]) {
      fmt_chunk(f, chunk, &dims[1..], depth + 1)?;
      writeln!(f)?;
    }
    write!(f, "{indent}]")
  }
}


// Polar Box-Muller transformation

fn normal_pair<T: Real>(rng: &mut impl Rng) -> (T, T) {
  loop {
    let u = rng.gen_range(-T::one()..T::one());
    let v = rng.gen_range(-T::one()..T::one());
    let r = u * u + v * v;
    if r > T::zero() && r < T::one() {
      let c = (T::from(-2.0).unwrap() * r.ln() / r).sqrt();
      return (u * c, v * c)
    }
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn creation() {
    let t = Tensor::new(&[2,2], vec![1, 2, 3, 4]);
    assert_eq!(t.dims(), &[2,2]);
    assert_eq!(t.size(), 4);
    assert_eq!(t.dtype(), "i32");
  }

  #[test]
  fn broadcast_add() {
    let x = Tensor::new(&[2,3], vec![1, 2, 3, 4, 5, 6]);

    let y = Tensor::vec(&[1, 2, 3]);
    assert_eq!(x.add(&y), Tensor::new(&[2,3], vec![2, 4, 6, 5, 7, 9]));

    let z = &x + 1;
    assert_eq!(z, Tensor::new(&[2,3], vec![2, 3, 4, 5, 6, 7]));
  }

  #[test]
  fn elementwise_mul() {
    let a = Tensor::new(&[2,2], vec![1, 2, 3, 4]);
    let b = Tensor::new(&[2,2], vec![5, 6, 7, 8]);
    assert_eq!(a.mul(&b), Tensor::new(&[2,2], vec![5, 12, 21, 32]));
  }

  #[test]
  fn matmul() {
    let a = Tensor::new(&[2,3], vec![1., 2., 3., 4., 5., 6.]);
    let b = Tensor::new(&[3,2], vec![7., 8., 9., 10., 11., 12.]);
    assert_eq!(a.matmul(&b), Tensor::new(&[2,2], vec![58., 64., 139., 154.]));
  }

  #[test]
  fn matmul_transposed_view() {
    let a = Tensor::new(&[2,2], vec![1., 2., 3., 4.]);
    let at = a.transpose(0, 1);
    assert_eq!(at.to_vec(), vec![1., 3., 2., 4.]);
    assert_eq!(at.matmul(&Tensor::new(&[2,1], vec![1., 1.])), Tensor::new(&[2,1], vec![4., 6.]));
  }

  #[test]
  fn sum_axis() {
    let t = Tensor::new(&[2,3], vec![1, 2, 3, 4, 5, 6]);
    assert_eq!(t.sum_axis(0), Tensor::vec(&[5, 7, 9]));
    assert_eq!(t.sum_axis(1), Tensor::vec(&[6, 15]));
  }

  #[test]
  fn reduce_to() {
    let g = Tensor::ones(&[4, 3]);
    assert_eq!(g.reduce_to(&[3]), Tensor::vec(&[4, 4, 4]));
    assert_eq!(g.reduce_to(&[1, 3]), Tensor::new(&[1,3], vec![4, 4, 4]));
  }

  #[test]
  fn rows_and_slices() {
    let t = Tensor::new(&[3,2], vec![1, 2, 3, 4, 5, 6]);
    assert_eq!(t.row(1), Tensor::vec(&[3, 4]));
    assert_eq!(t.slice_rows(1, 2), Tensor::new(&[2,2], vec![3, 4, 5, 6]));

    let stacked = Tensor::rows(&[t.row(2), t.row(0)]);
    assert_eq!(stacked, Tensor::new(&[2,2], vec![5, 6, 1, 2]));
  }

  #[test]
  fn shared_storage_assign() {
    let t = Tensor::new(&[2,2], vec![1., 2., 3., 4.]);
    let view = t.transpose(0, 1);
    t.assign(&Tensor::zeros(&[2,2]));
    assert_eq!(view.to_vec(), vec![0., 0., 0., 0.]);
  }

  #[test]
  fn accumulate() {
    let t = Tensor::zeros(&[3]);
    t.accumulate(&Tensor::vec(&[1., 2., 3.]));
    t.accumulate(&Tensor::vec(&[1., 1., 1.]));
    assert_eq!(t, Tensor::vec(&[2., 3., 4.]));
  }

  #[test]
  fn statistics() {
    let t = Tensor::arrange(&[4], 1.0, 1.0);
    assert_eq!(t.sum(), 10.0);
    assert_eq!(t.mean(), 2.5);
    assert_eq!(t.max(), 4.0);
  }

  #[test]
  fn random_ranges() {
    let t = Tensor::<f32>::rand(&[64]);
    assert!(t.to_vec().into_iter().all(|v| (0.0..1.0).contains(&v) ));

    let g = Tensor::<f32>::glorot(8, 8);
    let limit = (6.0f32 / 16.0).sqrt();
    assert!(g.to_vec().into_iter().all(|v| v.abs() <= limit ));
  }
}
