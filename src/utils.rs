//! Utility functions for the rating engine

use chrono::{DateTime, Utc};

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Relative change between two positive quantities, guarded against zero
pub fn relative_change(old: f64, new: f64) -> f64 {
    let scale = old.abs().max(f64::MIN_POSITIVE);
    (new - old).abs() / scale
}

/// Clamp a score into the unit interval, mapping NaN to 0
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_change() {
        assert_eq!(relative_change(2.0, 3.0), 0.5);
        assert_eq!(relative_change(2.0, 1.0), 0.5);
        assert_eq!(relative_change(1.0, 1.0), 0.0);
        assert!(relative_change(0.0, 1.0).is_finite());
    }

    #[test]
    fn test_clamp_unit() {
        assert_eq!(clamp_unit(-0.5), 0.0);
        assert_eq!(clamp_unit(1.5), 1.0);
        assert_eq!(clamp_unit(0.25), 0.25);
        assert_eq!(clamp_unit(f64::NAN), 0.0);
    }
}
