//! Dense row-major matrix used as the demo model's input and output.

use fitloop_core::{BatchDim, Scores};

#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Build from equal-length rows. `cols` is used when `rows` is empty.
    pub fn from_rows(rows: &[Vec<f64>], cols: usize) -> anyhow::Result<Self> {
        let mut data = Vec::with_capacity(rows.len() * cols);
        for (i, row) in rows.iter().enumerate() {
            anyhow::ensure!(
                row.len() == cols,
                "row {i} has {} columns, expected {cols}",
                row.len()
            );
            data.extend_from_slice(row);
        }
        Ok(Self {
            rows: rows.len(),
            cols,
            data,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn row(&self, r: usize) -> &[f64] {
        &self.data[r * self.cols..(r + 1) * self.cols]
    }

    pub fn row_mut(&mut self, r: usize) -> &mut [f64] {
        &mut self.data[r * self.cols..(r + 1) * self.cols]
    }

    pub fn get(&self, r: usize, c: usize) -> f64 {
        self.data[r * self.cols + c]
    }
}

impl BatchDim for Matrix {
    fn batch_dim(&self) -> usize {
        self.rows
    }
}

impl Scores for Matrix {
    fn rows(&self) -> usize {
        self.rows
    }

    fn argmax(&self) -> Vec<usize> {
        (0..self.rows)
            .map(|r| {
                self.row(r)
                    .iter()
                    .enumerate()
                    .fold((0, f64::NEG_INFINITY), |(best, max), (c, &v)| {
                        if v > max { (c, v) } else { (best, max) }
                    })
                    .0
            })
            .collect()
    }
}
