//! Percentage deviation from a baseline value

/// `|current - baseline| / baseline * 100`, defined as 0 for a zero baseline
pub fn deviation_percent(current: f64, baseline: f64) -> f64 {
    if baseline == 0.0 || !baseline.is_finite() || !current.is_finite() {
        return 0.0;
    }
    ((current - baseline).abs() / baseline.abs()) * 100.0
}

/// Result of comparing one metric against its baseline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviationCheck {
    pub current: f64,
    pub baseline: f64,
    pub deviation_percent: f64,
    pub threshold_percent: f64,
}

impl DeviationCheck {
    pub fn evaluate(current: f64, baseline: f64, threshold_percent: f64) -> Self {
        Self {
            current,
            baseline,
            deviation_percent: deviation_percent(current, baseline),
            threshold_percent,
        }
    }

    pub fn exceeded(&self) -> bool {
        self.deviation_percent > self.threshold_percent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_baseline_is_zero() {
        for current in [0.0, 1.0, 1e12, f64::MAX] {
            let dev = deviation_percent(current, 0.0);
            assert_eq!(dev, 0.0);
            assert!(dev.is_finite());
        }
    }

    #[test]
    fn test_deviation_is_symmetric_in_direction() {
        assert!((deviation_percent(150.0, 100.0) - 50.0).abs() < 1e-9);
        assert!((deviation_percent(50.0, 100.0) - 50.0).abs() < 1e-9);
        assert!((deviation_percent(50.0, 5.0) - 900.0).abs() < 1e-9);
    }

    #[test]
    fn test_threshold_is_strict() {
        assert!(!DeviationCheck::evaluate(150.0, 100.0, 50.0).exceeded());
        assert!(DeviationCheck::evaluate(150.1, 100.0, 50.0).exceeded());
    }

    #[test]
    fn test_non_finite_input_is_zero() {
        assert_eq!(deviation_percent(f64::NAN, 10.0), 0.0);
        assert_eq!(deviation_percent(10.0, f64::INFINITY), 0.0);
    }
}
