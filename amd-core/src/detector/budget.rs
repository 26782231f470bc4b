//! Hard ceiling on analysed audio, counted in samples.

/// Remaining-sample counter seeded from `total_analysis_time`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisBudget {
    /// `None` when the seed is 0 samples (no ceiling).
    remaining: Option<i64>,
}

impl AnalysisBudget {
    /// Seed with `(sample_rate / 1000) * total_analysis_time` samples.
    ///
    /// A seed of 0 samples (no total, or a rate below 1 kHz) means no ceiling.
    pub fn new(total_analysis_time_ms: u32, sample_rate: u32) -> Self {
        let seed = i64::from(sample_rate / 1000) * i64::from(total_analysis_time_ms);
        if seed == 0 {
            return Self::unlimited();
        }
        Self {
            remaining: Some(seed),
        }
    }

    pub fn unlimited() -> Self {
        Self { remaining: None }
    }

    /// Charge a frame of `samples` against the budget.
    ///
    /// Returns `true` when the counter reaches zero or below, in which case
    /// the frame must not be analysed.
    pub fn consume(&mut self, samples: usize) -> bool {
        let Some(remaining) = self.remaining.as_mut() else {
            return false;
        };
        *remaining -= i64::try_from(samples).unwrap_or(i64::MAX);
        *remaining <= 0
    }

    pub fn remaining(&self) -> Option<i64> {
        self.remaining
    }

    pub fn is_unlimited(&self) -> bool {
        self.remaining.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_total_never_exhausts() {
        let mut budget = AnalysisBudget::new(0, 8_000);
        assert!(budget.is_unlimited());
        for _ in 0..10_000 {
            assert!(!budget.consume(160));
        }
    }

    #[test]
    fn exhausts_on_frame_that_reaches_zero() {
        // 1000 ms at 8 kHz = 8000 samples = 50 frames of 160
        let mut budget = AnalysisBudget::new(1_000, 8_000);
        assert_eq!(budget.remaining(), Some(8_000));
        for _ in 0..49 {
            assert!(!budget.consume(160));
        }
        assert!(budget.consume(160));
        assert_eq!(budget.remaining(), Some(0));
    }

    #[test]
    fn seed_truncates_samples_per_ms() {
        // 44100 / 1000 = 44 samples per ms
        let budget = AnalysisBudget::new(100, 44_100);
        assert_eq!(budget.remaining(), Some(4_400));
    }

    #[test]
    fn sub_khz_rate_seeds_no_ceiling() {
        // 800 / 1000 truncates to 0 samples per ms
        let mut budget = AnalysisBudget::new(5_000, 800);
        assert!(budget.is_unlimited());
        assert_eq!(budget, AnalysisBudget::unlimited());
        assert!(!budget.consume(16));
    }

    #[test]
    fn stays_exhausted() {
        let mut budget = AnalysisBudget::new(1, 8_000);
        assert!(budget.consume(160));
        assert!(budget.consume(0));
    }
}
