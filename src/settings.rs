use crate::error::{Result, TransportError};
use crate::source::IndependentSource;

#[derive(Debug, Clone)]
pub struct Settings {
    /// Source histories per batch.
    pub particles: usize,
    pub batches: usize,
    /// Criticality batches run before k is accumulated.
    pub inactive_batches: usize,
    pub source: IndependentSource,
    pub seed: Option<u64>,
    /// Ascending interval edges of a time-dependent run (seconds). Empty means
    /// a single interval spanning the configured time window.
    pub time_intervals: Vec<f64>,
}

impl Settings {
    pub fn new(particles: usize, batches: usize, source: IndependentSource) -> Self {
        Settings {
            particles,
            batches,
            inactive_batches: 0,
            source,
            seed: None,
            time_intervals: Vec::new(),
        }
    }

    pub fn seed_or_default(&self) -> u64 {
        self.seed.unwrap_or(1)
    }

    pub fn validate(&self) -> Result<()> {
        if self.particles == 0 || self.batches == 0 {
            return Err(TransportError::OutOfRange {
                name: "particles and batches",
                value: self.particles.min(self.batches) as f64,
                reason: "must both be positive".to_string(),
            });
        }
        if self.inactive_batches >= self.batches {
            return Err(TransportError::OutOfRange {
                name: "inactive batches",
                value: self.inactive_batches as f64,
                reason: format!("must be fewer than the {} batches", self.batches),
            });
        }
        if self.time_intervals.len() == 1 || self.time_intervals.windows(2).any(|w| !(w[0] < w[1])) {
            return Err(TransportError::OutOfRange {
                name: "time intervals",
                value: self.time_intervals.len() as f64,
                reason: "edges must ascend, at least two when given".to_string(),
            });
        }
        if let Some(&first) = self.time_intervals.first() {
            if self.source.time < first {
                return Err(TransportError::OutOfRange {
                    name: "source time",
                    value: self.source.time,
                    reason: format!("precedes the first time interval edge {first:e}"),
                });
            }
        }
        Ok(())
    }

    /// `(start, end)` pairs of the time-dependent intervals.
    pub fn intervals(&self, time_min: f64, time_max: f64) -> Vec<(f64, f64)> {
        if self.time_intervals.is_empty() {
            return vec![(time_min, time_max)];
        }
        self.time_intervals.windows(2).map(|w| (w[0], w[1])).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_construction() {
        let settings = Settings::new(100, 10, IndependentSource::new());
        assert_eq!(settings.particles, 100);
        assert_eq!(settings.batches, 10);
        assert_eq!(settings.seed_or_default(), 1);
        assert!(settings.validate().is_ok());
        assert_eq!(settings.intervals(0.0, 1.0), vec![(0.0, 1.0)]);
    }

    #[test]
    fn test_settings_validation() {
        let mut settings = Settings::new(100, 2, IndependentSource::new());
        settings.inactive_batches = 2;
        assert!(settings.validate().is_err());
        settings.inactive_batches = 1;
        settings.time_intervals = vec![0.0, 1e-6, 1e-6];
        assert!(settings.validate().is_err());
        settings.time_intervals = vec![0.0, 1e-6, 2e-6];
        assert!(settings.validate().is_ok());
        assert_eq!(settings.intervals(0.0, 1.0), vec![(0.0, 1e-6), (1e-6, 2e-6)]);
        assert!(Settings::new(0, 1, IndependentSource::new()).validate().is_err());
    }

    #[test]
    fn test_source_before_first_interval_is_rejected() {
        let mut settings = Settings::new(10, 1, IndependentSource::new());
        settings.time_intervals = vec![1e-9, 5e-9];
        assert!(matches!(
            settings.validate(),
            Err(TransportError::OutOfRange { name: "source time", .. })
        ));
        settings.source.time = 1e-9;
        assert!(settings.validate().is_ok());
    }
}
