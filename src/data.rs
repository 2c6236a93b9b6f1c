use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::tensor::Tensor;
use crate::scalar::Real;


/// One batch of examples. The first dimension of each tensor is the
/// batch dimension.

#[derive(Debug, Clone)]
pub struct Batch<T: Real> {
  pub inputs: Tensor<T>,
  pub targets: Option<Tensor<T>>,
}

impl<T: Real> Batch<T> {
  pub fn len(&self) -> usize {
    self.inputs.dims().first().copied().unwrap_or(1)
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}


/// In-memory example pipeline.
///
/// Wraps one tensor of inputs (and optionally one of targets), split
/// along the first dimension into examples. Transformations consume the
/// dataset and hand back a new one, so pipelines read front to back:
///
/// ```
/// use ferroflow::Dataset;
///
/// let data = Dataset::from_slice(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0])
///   .map(|x| x * 2.0 )
///   .batch(2);
///
/// for batch in data.batches() {
///   println!("Batch: {}", batch.inputs);
/// }
/// ```

#[derive(Debug, Clone)]
pub struct Dataset<T: Real> {
  inputs: Tensor<T>,
  targets: Option<Tensor<T>>,
  order: Vec<usize>,
  batch_size: usize,
}

impl<T: Real> Dataset<T> {
  /// Unlabeled dataset from a flat slice, one example per element.

  pub fn from_slice(values: &[T]) -> Self {
    Self {
      order: (0..values.len()).collect(),
      inputs: Tensor::vec(values),
      targets: None,
      batch_size: 1,
    }
  }

  /// Labeled dataset pairing rows of `inputs` with rows of `targets`.

  pub fn from_tensors(inputs: Tensor<T>, targets: Tensor<T>) -> Self {
    assert!(inputs.rank() >= 1 && targets.rank() >= 1,
      "Datasets need at least one dimension to split examples along");
    assert_eq!(inputs.dims()[0], targets.dims()[0],
      "Example counts differ: {} inputs vs {} targets",
      inputs.dims()[0], targets.dims()[0]);
    Self {
      order: (0..inputs.dims()[0]).collect(),
      inputs,
      targets: Some(targets),
      batch_size: 1,
    }
  }

  /// Transform every input element. Applied eagerly.

  pub fn map(self, f: impl Fn(T) -> T) -> Self {
    Self { inputs: self.inputs.map(f), ..self }
  }

  /// Group examples into batches of `size`. A smaller trailing batch is
  /// kept.

  pub fn batch(self, size: usize) -> Self {
    assert!(size > 0, "Batch size must be positive");
    Self { batch_size: size, ..self }
  }

  /// Reorder examples with a seeded generator.

  pub fn shuffle(mut self, seed: u64) -> Self {
    self.order.shuffle(&mut StdRng::seed_from_u64(seed));
    self
  }

  pub fn len(&self) -> usize {
    self.order.len()
  }

  pub fn is_empty(&self) -> bool {
    self.order.is_empty()
  }

  pub fn batch_size(&self) -> usize {
    self.batch_size
  }

  pub fn num_batches(&self) -> usize {
    (self.len() + self.batch_size - 1) / self.batch_size
  }

  /// Walk the dataset once in batch increments. Can be called again for
  /// every epoch.

  pub fn batches(&self) -> Batches<T> {
    Batches { dataset: self, cursor: 0 }
  }

  fn gather(&self, tensor: &Tensor<T>, indices: &[usize]) -> Tensor<T> {
    let rows: Vec<Tensor<T>> = indices.iter()
      .map(|&i| tensor.row(i) )
      .collect();
    Tensor::rows(&rows)
  }
}


/// Batch iterator over a [Dataset].

pub struct Batches<'a, T: Real> {
  dataset: &'a Dataset<T>,
  cursor: usize,
}

impl<T: Real> Iterator for Batches<'_, T> {
  type Item = Batch<T>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.cursor >= self.dataset.len() { return None }
    let end = (self.cursor + self.dataset.batch_size).min(self.dataset.len());
    let indices = &self.dataset.order[self.cursor..end];
    self.cursor = end;
    Some(Batch {
      inputs: self.dataset.gather(&self.dataset.inputs, indices),
      targets: self.dataset.targets.as_ref()
        .map(|targets| self.dataset.gather(targets, indices) ),
    })
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn map_and_batch() {
    let data = Dataset::from_slice(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0])
      .map(|x| x * 2.0 )
      .batch(2);

    let batches: Vec<_> = data.batches().collect();
    assert_eq!(batches.len(), 3);
    assert_eq!(batches[0].inputs, Tensor::vec(&[2.0, 4.0]));
    assert_eq!(batches[1].inputs, Tensor::vec(&[6.0, 8.0]));
    assert_eq!(batches[2].inputs, Tensor::vec(&[10.0, 12.0]));
  }

  #[test]
  fn trailing_partial_batch() {
    let data = Dataset::from_slice(&[1.0, 2.0, 3.0, 4.0, 5.0]).batch(2);
    let sizes: Vec<_> = data.batches().map(|b| b.len() ).collect();
    assert_eq!(sizes, vec![2, 2, 1]);
    assert_eq!(data.num_batches(), 3);
  }

  #[test]
  fn labeled_batches() {
    let x = Tensor::new(&[4, 2], vec![1., 1., 2., 2., 3., 3., 4., 4.]);
    let y = Tensor::new(&[4, 1], vec![10., 20., 30., 40.]);
    let data = Dataset::from_tensors(x, y).batch(2);

    let first = data.batches().next().unwrap();
    assert_eq!(first.inputs, Tensor::new(&[2,2], vec![1., 1., 2., 2.]));
    assert_eq!(first.targets.unwrap(), Tensor::new(&[2,1], vec![10., 20.]));
  }

  #[test]
  fn shuffle_is_seeded_permutation() {
    let data = Dataset::from_slice(&[1.0, 2.0, 3.0, 4.0]).shuffle(7).batch(4);
    let again = Dataset::from_slice(&[1.0, 2.0, 3.0, 4.0]).shuffle(7).batch(4);

    let all = data.batches().next().unwrap().inputs.to_vec();
    assert_eq!(all, again.batches().next().unwrap().inputs.to_vec());

    let mut sorted = all.clone();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap() );
    assert_eq!(sorted, vec![1.0, 2.0, 3.0, 4.0]);
  }

  #[test]
  #[should_panic]
  fn zero_batch_size() {
    Dataset::from_slice(&[1.0]).batch(0);
  }

  #[test]
  #[should_panic]
  fn mismatched_example_counts() {
    Dataset::from_tensors(Tensor::<f64>::zeros(&[4, 2]), Tensor::zeros(&[3, 1]));
  }

  #[test]
  fn epochs_rewalk() {
    let data = Dataset::from_slice(&[1.0, 2.0]).batch(1);
    assert_eq!(data.batches().count(), 2);
    assert_eq!(data.batches().count(), 2);
  }
}
