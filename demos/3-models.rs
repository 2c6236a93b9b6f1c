// This demo defines the same feed-forward network twice: as a
// Sequential layer stack, and functionally by composing layers in a
// closure. Both styles train and predict identically.

use ferroflow::{ Activation::*, Dense, GraphModel, Model, Sequential, Tensor };

fn main() {
  // Layer-stack style
  let model = Sequential::<f32>::new()
    .dense(4, 16, Relu)
    .dense(16, 8, Relu)
    .dense(8, 1, Linear);

  println!("{}\n", model.summary());

  // Functional style: compose freely, then trace once
  let hidden1 = Dense::new(4, 16, Relu);
  let hidden2 = Dense::new(16, 8, Relu);
  let output = Dense::new(8, 1, Linear);
  let functional = GraphModel::trace(4, move |x| {
    output.forward(&hidden2.forward(&hidden1.forward(x)))
  });

  println!("{}\n", functional.summary());

  // Either one predicts on a batch of inputs
  let x = Tensor::randn(&[3, 4]);
  println!("Stack prediction:      {}", model.predict(&x));
  println!("Functional prediction: {}", functional.predict(&x));
}
