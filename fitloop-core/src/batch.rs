//! Batch shapes consumed by the step strategies.

/// `(input, labels)` batch for standard classifiers.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardBatch<X> {
    pub input: X,
    pub labels: Vec<usize>,
}

impl<X> StandardBatch<X> {
    pub fn new(input: X, labels: Vec<usize>) -> Self {
        Self { input, labels }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// `(input, coords, mask, labels)` batch for models that need auxiliary
/// positional and mask tensors.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinateBatch<X, C, K> {
    pub input: X,
    pub coords: C,
    pub mask: K,
    pub labels: Vec<usize>,
}

impl<X, C, K> CoordinateBatch<X, C, K> {
    pub fn new(input: X, coords: C, mask: K, labels: Vec<usize>) -> Self {
        Self {
            input,
            coords,
            mask,
            labels,
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
