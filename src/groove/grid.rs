// Musical Grid - Time signatures and measure boundaries
// Provides bar structure for section analysis

use serde::{Deserialize, Serialize};

/// Tolerance used when matching a measure start to a time signature change (1ms)
pub const SIGNATURE_TOLERANCE: f64 = 0.001;

/// A time signature taking effect at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeSignature {
    /// When the signature takes effect, in seconds
    pub time: f64,

    /// Beats per bar (top number)
    pub numerator: u8,

    /// Note value that gets one beat (bottom number, 4 = quarter note)
    pub denominator: u8,
}

impl TimeSignature {
    pub fn new(time: f64, numerator: u8, denominator: u8) -> Self {
        TimeSignature {
            time,
            numerator,
            denominator,
        }
    }

    /// Implicit 4/4 at time zero
    pub fn common_time() -> Self {
        TimeSignature::new(0.0, 4, 4)
    }

    /// Length of one bar in quarter-note beats
    pub fn beats_per_measure(&self) -> f64 {
        self.numerator as f64 * (4.0 / self.denominator as f64)
    }

    /// Whether this is the 4/4-at-zero placeholder most files carry
    pub fn is_default(&self) -> bool {
        self.time == 0.0 && self.numerator == 4 && self.denominator == 4
    }
}

/// One bar of the piece in wall-clock time
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measure {
    /// Bar start in seconds
    pub start_time: f64,

    /// Bar end in seconds (start of the next bar)
    pub end_time: f64,
}

impl Measure {
    pub fn new(start_time: f64, end_time: f64) -> Self {
        Measure {
            start_time,
            end_time,
        }
    }

    /// Whether an onset falls inside this bar (start inclusive, end exclusive)
    pub fn contains(&self, time: f64) -> bool {
        time >= self.start_time && time < self.end_time
    }
}

/// Most recent signature at or before `time` (within [`SIGNATURE_TOLERANCE`]).
///
/// `signatures` must be sorted by time and non-empty; the first entry is used
/// when `time` precedes all of them.
pub fn active_signature(signatures: &[TimeSignature], time: f64) -> TimeSignature {
    let mut active = signatures
        .first()
        .copied()
        .unwrap_or_else(TimeSignature::common_time);

    for signature in signatures {
        if signature.time <= time + SIGNATURE_TOLERANCE {
            active = *signature;
        } else {
            break;
        }
    }

    active
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_beats_per_measure() {
        assert_eq!(TimeSignature::new(0.0, 4, 4).beats_per_measure(), 4.0);
        assert_eq!(TimeSignature::new(0.0, 3, 4).beats_per_measure(), 3.0);
        assert_eq!(TimeSignature::new(0.0, 6, 8).beats_per_measure(), 3.0);
        assert_eq!(TimeSignature::new(0.0, 2, 2).beats_per_measure(), 4.0);
    }

    #[test]
    fn test_default_signature() {
        assert!(TimeSignature::common_time().is_default());
        assert!(!TimeSignature::new(0.0, 3, 4).is_default());
        assert!(!TimeSignature::new(2.0, 4, 4).is_default());
    }

    #[test]
    fn test_active_signature_tolerance() {
        let signatures = vec![
            TimeSignature::new(0.0, 4, 4),
            TimeSignature::new(8.0, 3, 4),
        ];

        assert_eq!(active_signature(&signatures, 4.0).numerator, 4);
        // Rounding just short of the change still picks it up
        assert_eq!(active_signature(&signatures, 7.9995).numerator, 3);
        assert_eq!(active_signature(&signatures, 7.99).numerator, 4);
        assert_eq!(active_signature(&signatures, 9.0).numerator, 3);
    }

    #[test]
    fn test_measure_contains() {
        let measure = Measure::new(2.0, 4.0);

        assert!(!measure.contains(1.999));
        assert!(measure.contains(2.0));
        assert!(measure.contains(3.5));
        assert!(!measure.contains(4.0));
    }
}
