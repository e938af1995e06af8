//! Trust scoring: performance score and its display banding.

use serde::{Deserialize, Serialize};

use procureflow_core::{DomainError, ValueObject};

/// Supplier performance score, always within `0..=100`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct PerformanceScore(u8);

impl PerformanceScore {
    pub const MAX: u8 = 100;

    pub fn new(score: u8) -> Result<Self, DomainError> {
        if score > Self::MAX {
            return Err(DomainError::validation(format!(
                "performance score must be within 0..=100 (got {score})"
            )));
        }
        Ok(Self(score))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn band(self) -> TrustBand {
        TrustBand::for_score(self)
    }

    /// Risk flag used by cart review; independent of the display band.
    pub fn is_risky(self, threshold: u8) -> bool {
        self.0 < threshold
    }
}

impl Default for PerformanceScore {
    /// New partners start with a neutral "good" score.
    fn default() -> Self {
        Self(80)
    }
}

impl TryFrom<u8> for PerformanceScore {
    type Error = DomainError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PerformanceScore> for u8 {
    fn from(value: PerformanceScore) -> Self {
        value.0
    }
}

impl ValueObject for PerformanceScore {}

/// Display banding for partner filters.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustBand {
    /// `score >= 90`
    Excellent,
    /// `70 <= score < 90`
    Good,
    /// `score < 70`
    Poor,
}

impl TrustBand {
    pub fn for_score(score: PerformanceScore) -> Self {
        match score.value() {
            90.. => TrustBand::Excellent,
            70..=89 => TrustBand::Good,
            _ => TrustBand::Poor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn band_boundaries() {
        let band = |s| PerformanceScore::new(s).unwrap().band();
        assert_eq!(band(100), TrustBand::Excellent);
        assert_eq!(band(90), TrustBand::Excellent);
        assert_eq!(band(89), TrustBand::Good);
        assert_eq!(band(70), TrustBand::Good);
        assert_eq!(band(69), TrustBand::Poor);
        assert_eq!(band(0), TrustBand::Poor);
    }

    #[test]
    fn risk_is_independent_of_band() {
        // 65 is "poor" for display but not risky at the default threshold of 60.
        let score = PerformanceScore::new(65).unwrap();
        assert_eq!(score.band(), TrustBand::Poor);
        assert!(!score.is_risky(60));
        assert!(PerformanceScore::new(59).unwrap().is_risky(60));
    }

    #[test]
    fn out_of_range_score_is_rejected() {
        assert!(matches!(
            PerformanceScore::new(101),
            Err(DomainError::Validation(_))
        ));
        assert!(serde_json::from_str::<PerformanceScore>("150").is_err());
    }

    proptest! {
        #[test]
        fn every_valid_score_has_exactly_one_band(score in 0u8..=100) {
            let score = PerformanceScore::new(score).unwrap();
            let band = score.band();
            let expected = if score.value() >= 90 {
                TrustBand::Excellent
            } else if score.value() >= 70 {
                TrustBand::Good
            } else {
                TrustBand::Poor
            };
            prop_assert_eq!(band, expected);
        }
    }
}
