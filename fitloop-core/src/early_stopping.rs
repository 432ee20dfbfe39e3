//! Early stopping on a validation metric that should increase.

/// Tracks the best validation value seen and how many epochs have passed
/// without a strict improvement.
///
/// ```rust
/// use fitloop_core::EarlyStopping;
///
/// let mut es = EarlyStopping::new(Some(2));
/// assert!(es.update(0.5));
/// assert!(es.update(0.6));
/// assert!(!es.update(0.6));
/// assert!(!es.should_stop());
/// assert!(!es.update(0.6));
/// assert!(es.should_stop());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct EarlyStopping {
    /// `None` disables stopping.
    patience: Option<usize>,
    best_value: f64,
    stall_count: usize,
}

impl Default for EarlyStopping {
    fn default() -> Self {
        Self::disabled()
    }
}

impl EarlyStopping {
    pub fn new(patience: Option<usize>) -> Self {
        Self {
            patience,
            best_value: f64::NEG_INFINITY,
            stall_count: 0,
        }
    }

    /// Never stops.
    pub fn disabled() -> Self {
        Self::new(None)
    }

    /// Record one epoch's value. Returns `true` when it strictly beats the
    /// best so far; ties and NaN count as a stall.
    pub fn update(&mut self, candidate: f64) -> bool {
        if candidate > self.best_value {
            self.best_value = candidate;
            self.stall_count = 0;
            true
        } else {
            self.stall_count += 1;
            false
        }
    }

    pub fn should_stop(&self) -> bool {
        self.patience
            .is_some_and(|patience| self.stall_count >= patience)
    }

    pub fn patience(&self) -> Option<usize> {
        self.patience
    }

    pub fn best_value(&self) -> f64 {
        self.best_value
    }

    pub fn stall_count(&self) -> usize {
        self.stall_count
    }
}
