/// Write-behind accumulator: deltas collect locally and are released as one
/// batch once they reach `threshold`, or on an explicit `flush`.
#[derive(Debug, Clone)]
pub struct WriteBehind {
    pending: f64,
    threshold: f64,
}

impl WriteBehind {
    pub fn new(threshold: f64) -> Self {
        Self {
            pending: 0.0,
            threshold,
        }
    }

    pub fn pending(&self) -> f64 {
        self.pending
    }

    /// Adds `delta`; returns the batch to commit when the threshold is reached.
    /// Non-finite and non-positive deltas are ignored.
    pub fn accrue(&mut self, delta: f64) -> Option<f64> {
        if !delta.is_finite() || delta <= 0.0 {
            return None;
        }
        self.pending += delta;
        if self.pending >= self.threshold {
            self.flush()
        } else {
            None
        }
    }

    /// Releases whatever is pending, regardless of threshold.
    pub fn flush(&mut self) -> Option<f64> {
        let batch = std::mem::take(&mut self.pending);
        (batch > 0.0).then_some(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn releases_batch_at_threshold() {
        let mut batch = WriteBehind::new(30.0);
        assert_eq!(batch.accrue(10.0), None);
        assert_eq!(batch.accrue(10.0), None);
        assert_eq!(batch.accrue(10.0), Some(30.0));
        assert_eq!(batch.pending(), 0.0);
    }

    #[test]
    fn flush_returns_remainder_once() {
        let mut batch = WriteBehind::new(30.0);
        batch.accrue(4.5);
        assert_eq!(batch.flush(), Some(4.5));
        assert_eq!(batch.flush(), None);
    }

    #[test]
    fn ignores_bogus_deltas() {
        let mut batch = WriteBehind::new(1.0);
        assert_eq!(batch.accrue(-3.0), None);
        assert_eq!(batch.accrue(f64::INFINITY), None);
        assert_eq!(batch.accrue(0.0), None);
        assert_eq!(batch.pending(), 0.0);
    }
}
