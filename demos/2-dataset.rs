// This demo builds a small data pipeline: load values, transform them,
// and walk the result in batches.

use ferroflow::Dataset;

fn main() {
  let data = Dataset::from_slice(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0])
    .map(|x| x * 2.0 )
    .batch(2);

  for batch in data.batches() {
    println!("Batch: {}", batch.inputs);
  }

  // Shuffling is seeded, so runs are reproducible
  let shuffled = Dataset::from_slice(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0])
    .shuffle(42)
    .batch(3);

  for batch in shuffled.batches() {
    println!("Shuffled batch: {}", batch.inputs);
  }
}
