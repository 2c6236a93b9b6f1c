use serde::{Serialize, Deserialize};


/// The shape of a [Tensor](crate::Tensor).
///
/// Stores dimension sizes together with the strides used to walk the
/// underlying storage, so transposed and broadcasted tensors can share
/// data without copying it.

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shape {
  dims: Vec<usize>,
  strides: Vec<usize>,
  offset: usize,
}

impl Shape {
  pub fn new(dims: &[usize]) -> Self {
    Self {
      strides: Self::row_major(dims),
      dims: dims.to_vec(),
      offset: 0,
    }
  }

  fn row_major(dims: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; dims.len()];
    for d in (1..dims.len()).rev() {
      strides[d - 1] = strides[d] * dims[d];
    }
    strides
  }

  pub fn dims(&self) -> &[usize] {
    &self.dims
  }

  pub fn size(&self) -> usize {
    self.dims.iter().product()
  }

  pub fn rank(&self) -> usize {
    self.dims.len()
  }

  pub fn contiguous(&self) -> bool {
    self.offset == 0 && self.strides == Self::row_major(&self.dims)
  }

  /// Flat storage index of a full coordinate.

  pub(crate) fn index(&self, coords: &[usize]) -> usize {
    debug_assert_eq!(coords.len(), self.rank());
    self.offset + coords.iter()
      .zip(&self.strides)
      .map(|(&c, &s)| c * s)
      .sum::<usize>()
  }

  /// Walk all storage indices in logical row-major order.

  pub(crate) fn iter(&self) -> ShapeIter {
    ShapeIter::new(self)
  }

  /// Pair of stride views over `self` and `other` with a common
  /// broadcasted dimension list. Dimensions align from the right; a
  /// dimension may be stretched when one side holds 1, in which case its
  /// stride drops to zero.

  pub(crate) fn broadcast_with(&self, other: &Self) -> (Self, Self) {
    let rank = self.rank().max(other.rank());
    let mut dims = vec![0; rank];
    let mut strides_l = vec![0; rank];
    let mut strides_r = vec![0; rank];
    for i in 0..rank {
      let dl = if i < self.rank() { self.dims[self.rank() - 1 - i] } else { 1 };
      let dr = if i < other.rank() { other.dims[other.rank() - 1 - i] } else { 1 };
      assert!(dl == dr || dl == 1 || dr == 1,
        "Could not broadcast {} with {}", self, other);
      let d = rank - 1 - i;
      dims[d] = dl.max(dr);
      strides_l[d] = if i < self.rank() && dl == dims[d] { self.strides[self.rank() - 1 - i] } else { 0 };
      strides_r[d] = if i < other.rank() && dr == dims[d] { other.strides[other.rank() - 1 - i] } else { 0 };
    }
    (
      Self { dims: dims.clone(), strides: strides_l, offset: self.offset },
      Self { dims, strides: strides_r, offset: other.offset },
    )
  }

  pub fn transpose(&self, d1: usize, d2: usize) -> Self {
    let mut out = self.clone();
    out.dims.swap(d1, d2);
    out.strides.swap(d1, d2);
    out
  }

  /// View with a dimension of size 1 inserted at `dim`.

  pub fn unsqueeze(&self, dim: usize) -> Self {
    assert!(dim <= self.rank());
    let mut out = self.clone();
    out.dims.insert(dim, 1);
    let stride = if dim < self.rank() { self.strides[dim] * self.dims[dim] } else { 1 };
    out.strides.insert(dim, stride);
    out
  }

  /// View with all dimensions of size 1 removed.

  pub fn squeeze(&self) -> Self {
    let mut dims = vec![];
    let mut strides = vec![];
    for (d, &n) in self.dims.iter().enumerate() {
      if n != 1 {
        dims.push(n);
        strides.push(self.strides[d]);
      }
    }
    Self { dims, strides, offset: self.offset }
  }

  /// Reinterpret a contiguous shape with new dimensions of equal size.

  pub fn reshape(&self, dims: &[usize]) -> Self {
    assert!(self.contiguous(), "Cannot reshape non-contiguous {}", self);
    let out = Self::new(dims);
    assert_eq!(self.size(), out.size(),
      "Cannot reshape {} into {}", self, out);
    out
  }

  /// View of `len` consecutive entries along the first dimension.

  pub(crate) fn slice(&self, start: usize, len: usize) -> Self {
    assert!(self.rank() > 0 && start + len <= self.dims[0],
      "Slice {}..{} out of bounds for {}", start, start + len, self);
    let mut out = self.clone();
    out.dims[0] = len;
    out.offset += start * self.strides[0];
    out
  }

  /// View of a single entry along the first dimension, with that
  /// dimension removed.

  pub(crate) fn row(&self, i: usize) -> Self {
    let sliced = self.slice(i, 1);
    Self {
      dims: sliced.dims[1..].to_vec(),
      strides: sliced.strides[1..].to_vec(),
      offset: sliced.offset,
    }
  }
}

impl std::fmt::Display for Shape {
  fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
    write!(f, "Shape{:?}", self.dims)
  }
}


/// Odometer over a [Shape]'s coordinates, yielding flat storage indices.

pub(crate) struct ShapeIter<'a> {
  shape: &'a Shape,
  coords: Vec<usize>,
  remaining: usize,
}

impl<'a> ShapeIter<'a> {
  fn new(shape: &'a Shape) -> Self {
    Self {
      coords: vec![0; shape.rank()],
      remaining: shape.size(),
      shape,
    }
  }
}

impl Iterator for ShapeIter<'_> {
  type Item = usize;

  fn next(&mut self) -> Option<Self::Item> {
    if self.remaining == 0 { return None }
    self.remaining -= 1;
    let out = self.shape.index(&self.coords);
    for d in (0..self.coords.len()).rev() {
      self.coords[d] += 1;
      if self.coords[d] < self.shape.dims[d] { break }
      self.coords[d] = 0;
    }
    Some(out)
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn strides() {
    let shape = Shape::new(&[3,2,2]);
    assert_eq!(shape.strides, vec![4,2,1]);
    assert_eq!(shape.index(&[1,1,0]), 6);
  }

  #[test]
  fn iterate() {
    let shape = Shape::new(&[2,2]);
    assert_eq!(shape.iter().collect::<Vec<_>>(), vec![0,1,2,3]);

    let t = shape.transpose(0, 1);
    assert_eq!(t.iter().collect::<Vec<_>>(), vec![0,2,1,3]);
  }

  #[test]
  fn broadcast() {
    let (l, r) = Shape::new(&[2,3]).broadcast_with(&Shape::new(&[3]));
    assert_eq!(l.dims, vec![2,3]);
    assert_eq!(r.dims, vec![2,3]);
    assert_eq!(r.strides, vec![0,1]);
  }

  #[test]
  fn broadcast_scalar() {
    let (_, r) = Shape::new(&[2,2]).broadcast_with(&Shape::new(&[]));
    assert_eq!(r.dims, vec![2,2]);
    assert_eq!(r.strides, vec![0,0]);
    assert_eq!(r.iter().collect::<Vec<_>>(), vec![0,0,0,0]);
  }

  #[test]
  #[should_panic]
  fn broadcast_mismatch() {
    Shape::new(&[2,3]).broadcast_with(&Shape::new(&[2]));
  }

  #[test]
  fn slice_and_row() {
    let shape = Shape::new(&[4,3]);
    let s = shape.slice(1, 2);
    assert_eq!(s.dims, vec![2,3]);
    assert_eq!(s.iter().next(), Some(3));

    let r = shape.row(2);
    assert_eq!(r.dims, vec![3]);
    assert_eq!(r.iter().collect::<Vec<_>>(), vec![6,7,8]);
  }

  #[test]
  fn unsqueeze() {
    let shape = Shape::new(&[2,3]).unsqueeze(0);
    assert_eq!(shape.dims(), &[1,2,3]);
    assert_eq!(shape.iter().collect::<Vec<_>>(), (0..6).collect::<Vec<_>>());
  }
}
