//! Seeded Gaussian-blob classification data.

use super::matrix::Matrix;
use fitloop_core::{CoordinateBatch, InMemoryLoader, StandardBatch};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;

pub type StandardLoader = InMemoryLoader<StandardBatch<Matrix>>;
pub type CoordinateLoader = InMemoryLoader<CoordinateBatch<Matrix, Matrix, Vec<bool>>>;

/// Shape of a generated dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct BlobSpec {
    pub samples: usize,
    pub features: usize,
    pub classes: usize,
    /// Standard deviation of each blob around its centre.
    pub spread: f64,
    /// Per-sample offsets are drawn from `[-max_offset, max_offset)`.
    pub max_offset: f64,
    pub seed: u64,
}

impl Default for BlobSpec {
    fn default() -> Self {
        Self {
            samples: 600,
            features: 2,
            classes: 3,
            spread: 0.6,
            max_offset: 3.0,
            seed: 7,
        }
    }
}

/// One observation. `observed = point + offset`; the coordinate-aware model
/// is handed `offset` as the sample's coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub point: Vec<f64>,
    pub offset: Vec<f64>,
    pub label: usize,
}

impl Sample {
    pub fn observed(&self) -> Vec<f64> {
        self.point.iter().zip(&self.offset).map(|(p, o)| p + o).collect()
    }
}

/// Train/validation/test partition, 70/15/15.
#[derive(Debug, Clone, Default)]
pub struct Splits {
    pub train: Vec<Sample>,
    pub validation: Vec<Sample>,
    pub test: Vec<Sample>,
}

/// Standard normal via Box-Muller.
fn gaussian(rng: &mut impl Rng) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen_range(0.0..1.0);
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

/// Class centres evenly spaced on a circle of radius 3 in the first two
/// features; remaining features are centred at zero.
fn centre(class: usize, classes: usize, features: usize) -> Vec<f64> {
    let angle = 2.0 * PI * class as f64 / classes.max(1) as f64;
    (0..features)
        .map(|f| match f {
            0 => 3.0 * angle.cos(),
            1 => 3.0 * angle.sin(),
            _ => 0.0,
        })
        .collect()
}

/// Generate `spec.samples` samples, labels cycling through the classes,
/// shuffled deterministically by the seed.
pub fn generate(spec: &BlobSpec) -> Vec<Sample> {
    let mut rng = StdRng::seed_from_u64(spec.seed);
    let classes = spec.classes.max(1);
    let mut samples: Vec<Sample> = (0..spec.samples)
        .map(|i| {
            let label = i % classes;
            let point = centre(label, classes, spec.features)
                .into_iter()
                .map(|c| c + spec.spread * gaussian(&mut rng))
                .collect();
            let offset = (0..spec.features)
                .map(|_| {
                    if spec.max_offset > 0.0 {
                        rng.gen_range(-spec.max_offset..spec.max_offset)
                    } else {
                        0.0
                    }
                })
                .collect();
            Sample {
                point,
                offset,
                label,
            }
        })
        .collect();

    // Same generator, so the order is seed-determined too.
    samples.shuffle(&mut rng);
    samples
}

pub fn split(samples: Vec<Sample>) -> Splits {
    let n = samples.len();
    let train_end = n * 70 / 100;
    let val_end = train_end + n * 15 / 100;
    let mut rest = samples;
    let test = rest.split_off(val_end);
    let validation = rest.split_off(train_end);
    Splits {
        train: rest,
        validation,
        test,
    }
}

/// Batches of observed features; the model must cope with the offsets.
pub fn standard_loader(
    samples: &[Sample],
    features: usize,
    batch_size: usize,
) -> anyhow::Result<StandardLoader> {
    anyhow::ensure!(batch_size > 0, "batch size must be positive");
    samples
        .chunks(batch_size)
        .map(|chunk| -> anyhow::Result<_> {
            let rows: Vec<Vec<f64>> = chunk.iter().map(Sample::observed).collect();
            let labels = chunk.iter().map(|s| s.label).collect();
            Ok(StandardBatch::new(Matrix::from_rows(&rows, features)?, labels))
        })
        .collect::<anyhow::Result<Vec<_>>>()
        .map(InMemoryLoader::new)
}

/// Batches of observed features plus the offsets as coordinates, all visible.
pub fn coordinate_loader(
    samples: &[Sample],
    features: usize,
    batch_size: usize,
) -> anyhow::Result<CoordinateLoader> {
    anyhow::ensure!(batch_size > 0, "batch size must be positive");
    samples
        .chunks(batch_size)
        .map(|chunk| -> anyhow::Result<_> {
            let rows: Vec<Vec<f64>> = chunk.iter().map(Sample::observed).collect();
            let offsets: Vec<Vec<f64>> = chunk.iter().map(|s| s.offset.clone()).collect();
            let labels = chunk.iter().map(|s| s.label).collect();
            Ok(CoordinateBatch::new(
                Matrix::from_rows(&rows, features)?,
                Matrix::from_rows(&offsets, features)?,
                vec![true; chunk.len()],
                labels,
            ))
        })
        .collect::<anyhow::Result<Vec<_>>>()
        .map(InMemoryLoader::new)
}
