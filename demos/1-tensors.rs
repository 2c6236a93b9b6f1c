// This demo covers tensor basics: creating constants and trainable
// variables, elementwise math, and inspecting shape and dtype.

use ferroflow::Tensor;

fn main() {
  // Constant tensors
  let t1 = Tensor::new(&[2, 2], vec![1.0, 2.0, 3.0, 4.0]);

  // Trainable variables carry a gradient
  let t2 = Tensor::new(&[2, 2], vec![5.0, 6.0, 7.0, 8.0]).trained();

  // Basic operations broadcast automatically
  let add = t1.add(t2.data());
  let mul = t1.mul(t2.data());
  println!("Addition result:\n{add}");
  println!("Multiplication result:\n{mul}");

  // Tensor introspection
  println!("Shape: {}", t1.shape());
  println!("Data type: {}", t1.dtype());

  // Plain vectors convert straight into tensors
  let from_vec = Tensor::from_vec(vec![9.0, 10.0, 11.0, 12.0]).reshape(&[2, 2]);
  println!("From vec:\n{from_vec}");
}
