//! Softmax cross-entropy over logits.

use super::matrix::Matrix;
use fitloop_core::{CollabError, ExecutionContext, LossFn};

/// Cross-entropy summed over the batch.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrossEntropy;

impl CrossEntropy {
    /// Numerically stable softmax of one row.
    fn softmax(row: &[f64]) -> Vec<f64> {
        let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let exps: Vec<f64> = row.iter().map(|v| (v - max).exp()).collect();
        let total: f64 = exps.iter().sum();
        exps.into_iter().map(|e| e / total).collect()
    }

    fn check(logits: &Matrix, labels: &[usize]) -> Result<(), CollabError> {
        if logits.rows() != labels.len() {
            return Err(format!("{} logit rows for {} labels", logits.rows(), labels.len()).into());
        }
        if let Some(bad) = labels.iter().find(|&&l| l >= logits.cols()) {
            return Err(format!("label {bad} out of range for {} classes", logits.cols()).into());
        }
        Ok(())
    }
}

impl LossFn<Matrix> for CrossEntropy {
    fn value(
        &self,
        _ctx: &ExecutionContext,
        logits: &Matrix,
        labels: &[usize],
    ) -> Result<f64, CollabError> {
        Self::check(logits, labels)?;
        Ok(labels
            .iter()
            .enumerate()
            .map(|(r, &label)| -Self::softmax(logits.row(r))[label].max(f64::MIN_POSITIVE).ln())
            .sum())
    }

    /// The gradient w.r.t. the logits is `softmax - one_hot(label)` per row.
    fn value_and_grad(
        &self,
        _ctx: &ExecutionContext,
        logits: &Matrix,
        labels: &[usize],
    ) -> Result<(f64, Matrix), CollabError> {
        Self::check(logits, labels)?;
        let mut grad = Matrix::zeros(logits.rows(), logits.cols());
        let mut loss = 0.0;
        for (r, &label) in labels.iter().enumerate() {
            let probs = Self::softmax(logits.row(r));
            loss -= probs[label].max(f64::MIN_POSITIVE).ln();
            let row = grad.row_mut(r);
            row.copy_from_slice(&probs);
            row[label] -= 1.0;
        }
        Ok((loss, grad))
    }
}
