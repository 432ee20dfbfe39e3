//! Concrete collaborators for the synthetic demo run: a softmax-regression
//! classifier trained with SGD on Gaussian blobs.

pub mod data;
pub mod loss;
pub mod matrix;
pub mod model;
pub mod optim;

pub use loss::CrossEntropy;
pub use model::SoftmaxRegression;
pub use optim::{LearningRate, Sgd, StepDecay};
