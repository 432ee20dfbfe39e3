//! Multinomial logistic regression.

use super::matrix::Matrix;
use fitloop_core::{Classifier, CollabError, CoordinateClassifier, ExecutionContext, Mode};
use serde::{Deserialize, Serialize};

const PARAMETERS_VERSION: u32 = 1;

/// Serialized form of the learnable state, stored inside checkpoints.
#[derive(Debug, Serialize, Deserialize)]
struct Parameters {
    version: u32,
    features: usize,
    classes: usize,
    /// `classes x features`, row-major.
    weights: Vec<f64>,
    bias: Vec<f64>,
}

/// Linear classifier producing one logit per class. Gradients accumulate
/// across `backward` calls until [`SoftmaxRegression::apply_gradients`].
#[derive(Debug, Clone)]
pub struct SoftmaxRegression {
    features: usize,
    classes: usize,
    /// `classes x features`, row-major.
    weights: Vec<f64>,
    bias: Vec<f64>,
    grad_weights: Vec<f64>,
    grad_bias: Vec<f64>,
    grad_samples: usize,
}

impl SoftmaxRegression {
    /// Zero-initialised model.
    pub fn new(features: usize, classes: usize) -> Self {
        Self {
            features,
            classes,
            weights: vec![0.0; classes * features],
            bias: vec![0.0; classes],
            grad_weights: vec![0.0; classes * features],
            grad_bias: vec![0.0; classes],
            grad_samples: 0,
        }
    }

    pub fn zero_grad(&mut self) {
        self.grad_weights.fill(0.0);
        self.grad_bias.fill(0.0);
        self.grad_samples = 0;
    }

    /// Descend along the per-sample mean of the accumulated gradient.
    pub fn apply_gradients(&mut self, learning_rate: f64) {
        if self.grad_samples == 0 {
            return;
        }
        let scale = learning_rate / self.grad_samples as f64;
        for (w, g) in self.weights.iter_mut().zip(&self.grad_weights) {
            *w -= scale * g;
        }
        for (b, g) in self.bias.iter_mut().zip(&self.grad_bias) {
            *b -= scale * g;
        }
    }

    fn check_input(&self, input: &Matrix) -> Result<(), CollabError> {
        if input.cols() != self.features {
            return Err(format!(
                "input has {} features, model expects {}",
                input.cols(),
                self.features
            )
            .into());
        }
        Ok(())
    }

    fn logits(&self, input: &Matrix) -> Result<Matrix, CollabError> {
        self.check_input(input)?;
        let mut out = Matrix::zeros(input.rows(), self.classes);
        for r in 0..input.rows() {
            let x = input.row(r);
            for (c, logit) in out.row_mut(r).iter_mut().enumerate() {
                let w = &self.weights[c * self.features..(c + 1) * self.features];
                *logit = self.bias[c] + w.iter().zip(x).map(|(w, x)| w * x).sum::<f64>();
            }
        }
        Ok(out)
    }

    fn accumulate(&mut self, input: &Matrix, output_grad: &Matrix) -> Result<(), CollabError> {
        self.check_input(input)?;
        if output_grad.rows() != input.rows() || output_grad.cols() != self.classes {
            return Err(format!(
                "gradient is {}x{}, expected {}x{}",
                output_grad.rows(),
                output_grad.cols(),
                input.rows(),
                self.classes
            )
            .into());
        }
        for r in 0..input.rows() {
            let x = input.row(r);
            for c in 0..self.classes {
                let g = output_grad.get(r, c);
                self.grad_bias[c] += g;
                let row = &mut self.grad_weights[c * self.features..(c + 1) * self.features];
                for (gw, xv) in row.iter_mut().zip(x) {
                    *gw += g * xv;
                }
            }
        }
        self.grad_samples += input.rows();
        Ok(())
    }

    /// Input re-centred on each sample's coordinates; masked-out rows become zero.
    fn shifted(
        &self,
        input: &Matrix,
        coords: &Matrix,
        mask: &[bool],
    ) -> Result<Matrix, CollabError> {
        self.check_input(input)?;
        if coords.rows() != input.rows() || coords.cols() != input.cols() {
            return Err(format!(
                "coords are {}x{}, input is {}x{}",
                coords.rows(),
                coords.cols(),
                input.rows(),
                input.cols()
            )
            .into());
        }
        if mask.len() != input.rows() {
            return Err(
                format!("mask has {} entries for {} rows", mask.len(), input.rows()).into(),
            );
        }
        let mut out = Matrix::zeros(input.rows(), input.cols());
        for (r, &visible) in mask.iter().enumerate() {
            if !visible {
                continue;
            }
            for (c, v) in out.row_mut(r).iter_mut().enumerate() {
                *v = input.get(r, c) - coords.get(r, c);
            }
        }
        Ok(out)
    }
}

impl Classifier for SoftmaxRegression {
    type Input = Matrix;
    type Output = Matrix;

    // No dropout or normalisation layers, so both modes behave the same.
    fn set_mode(&mut self, _mode: Mode) {}

    fn forward(&self, _ctx: &ExecutionContext, input: &Matrix) -> Result<Matrix, CollabError> {
        self.logits(input)
    }

    fn backward(
        &mut self,
        _ctx: &ExecutionContext,
        input: &Matrix,
        output_grad: &Matrix,
    ) -> Result<(), CollabError> {
        self.accumulate(input, output_grad)
    }

    fn save_parameters(&self) -> Result<Vec<u8>, CollabError> {
        let params = Parameters {
            version: PARAMETERS_VERSION,
            features: self.features,
            classes: self.classes,
            weights: self.weights.clone(),
            bias: self.bias.clone(),
        };
        Ok(serde_json::to_vec(&params)?)
    }

    fn load_parameters(&mut self, blob: &[u8]) -> Result<(), CollabError> {
        let params: Parameters = serde_json::from_slice(blob)?;
        if params.version != PARAMETERS_VERSION {
            return Err(format!(
                "parameter blob is version {}, expected {PARAMETERS_VERSION}",
                params.version
            )
            .into());
        }
        if params.features != self.features || params.classes != self.classes {
            return Err(format!(
                "blob holds a {}-feature, {}-class model; this one is {}x{}",
                params.features, params.classes, self.features, self.classes
            )
            .into());
        }
        if params.weights.len() != self.weights.len() || params.bias.len() != self.bias.len() {
            return Err(format!(
                "blob has {} weights and {} biases, expected {} and {}",
                params.weights.len(),
                params.bias.len(),
                self.weights.len(),
                self.bias.len()
            )
            .into());
        }
        self.weights = params.weights;
        self.bias = params.bias;
        Ok(())
    }
}

impl CoordinateClassifier for SoftmaxRegression {
    type Coords = Matrix;
    type Mask = Vec<bool>;

    fn forward_with_coords(
        &self,
        _ctx: &ExecutionContext,
        input: &Matrix,
        coords: &Matrix,
        mask: &Vec<bool>,
    ) -> Result<Matrix, CollabError> {
        self.logits(&self.shifted(input, coords, mask)?)
    }

    fn backward_with_coords(
        &mut self,
        _ctx: &ExecutionContext,
        input: &Matrix,
        coords: &Matrix,
        mask: &Vec<bool>,
        output_grad: &Matrix,
    ) -> Result<(), CollabError> {
        let shifted = self.shifted(input, coords, mask)?;
        self.accumulate(&shifted, output_grad)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fitloop_core::Scores;

    fn ctx() -> ExecutionContext {
        ExecutionContext::default()
    }

    #[test]
    fn test_forward_shape_and_bias() {
        let mut model = SoftmaxRegression::new(2, 3);
        model.bias = vec![0.0, 1.0, 0.5];
        let input = Matrix::from_rows(&[vec![1.0, 2.0], vec![0.0, 0.0]], 2).unwrap();
        let out = model.forward(&ctx(), &input).unwrap();
        assert_eq!((out.rows(), out.cols()), (2, 3));
        assert_eq!(out.argmax(), vec![1, 1]);
    }

    #[test]
    fn test_rejects_wrong_feature_count() {
        let model = SoftmaxRegression::new(3, 2);
        let input = Matrix::zeros(1, 2);
        assert!(model.forward(&ctx(), &input).is_err());
    }

    #[test]
    fn test_gradient_step_moves_towards_target() {
        let mut model = SoftmaxRegression::new(1, 2);
        let input = Matrix::from_rows(&[vec![1.0]], 1).unwrap();
        // d(loss)/d(logit) pushing class 1 up.
        let grad = Matrix::from_rows(&[vec![0.5, -0.5]], 2).unwrap();
        model.zero_grad();
        model.backward(&ctx(), &input, &grad).unwrap();
        model.apply_gradients(1.0);
        let out = model.forward(&ctx(), &input).unwrap();
        assert_eq!(out.argmax(), vec![1]);
        assert_eq!(out.get(0, 1), 1.0);
    }

    #[test]
    fn test_parameters_round_trip() {
        let mut model = SoftmaxRegression::new(2, 2);
        model.weights = vec![0.1, -0.2, 1.0 / 3.0, 4.0];
        model.bias = vec![0.5, -0.5];
        let blob = model.save_parameters().unwrap();

        let mut restored = SoftmaxRegression::new(2, 2);
        restored.load_parameters(&blob).unwrap();
        assert_eq!(restored.weights, model.weights);
        assert_eq!(restored.bias, model.bias);

        let mut other_shape = SoftmaxRegression::new(1, 4);
        assert!(other_shape.load_parameters(&blob).is_err());
        assert!(restored.load_parameters(&blob[..blob.len() - 1]).is_err());
    }

    #[test]
    fn test_parameters_reject_other_versions() {
        let model = SoftmaxRegression::new(2, 2);
        let future = Parameters {
            version: PARAMETERS_VERSION + 1,
            features: 2,
            classes: 2,
            weights: vec![1.0; 4],
            bias: vec![1.0; 2],
        };
        let blob = serde_json::to_vec(&future).unwrap();
        let mut restored = model.clone();
        let err = restored.load_parameters(&blob).unwrap_err();
        assert!(err.to_string().contains("version"));
        assert_eq!(restored.weights, model.weights);

        let short = Parameters {
            version: PARAMETERS_VERSION,
            features: 2,
            classes: 2,
            weights: vec![1.0; 3],
            bias: vec![1.0; 2],
        };
        let blob = serde_json::to_vec(&short).unwrap();
        assert!(restored.load_parameters(&blob).is_err());
        assert_eq!(restored.weights, model.weights);
    }

    #[test]
    fn test_coordinates_shift_and_mask_input() {
        let mut model = SoftmaxRegression::new(1, 2);
        model.weights = vec![-1.0, 1.0];
        let input = Matrix::from_rows(&[vec![3.0], vec![3.0]], 1).unwrap();
        let coords = Matrix::from_rows(&[vec![4.0], vec![4.0]], 1).unwrap();
        let out = model
            .forward_with_coords(&ctx(), &input, &coords, &vec![true, false])
            .unwrap();
        // Row 0 sees 3 - 4 = -1; row 1 is masked to 0.
        assert_eq!(out.row(0), &[1.0, -1.0]);
        assert_eq!(out.row(1), &[0.0, 0.0]);
        assert!(model
            .forward_with_coords(&ctx(), &input, &coords, &vec![true])
            .is_err());
    }
}
