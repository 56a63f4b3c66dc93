//! Relationship weights for community consensus.

use serde::{Deserialize, Serialize};

/// Support weight needed before a community intervention proceeds.
pub const INTERVENTION_THRESHOLD: f64 = 10.0;

/// The threshold in tenths, the unit weights are summed in.
pub const INTERVENTION_THRESHOLD_TENTHS: u32 = 100;

/// How close a supporter is to the subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipLevel {
    Intimate,
    Trusted,
    Familiar,
    Acquainted,
    Public,
}

const WEIGHT_TENTHS: [(RelationshipLevel, u32); 5] = [
    (RelationshipLevel::Intimate, 30),
    (RelationshipLevel::Trusted, 20),
    (RelationshipLevel::Familiar, 10),
    (RelationshipLevel::Acquainted, 5),
    (RelationshipLevel::Public, 1),
];

impl RelationshipLevel {
    /// Weight in tenths; sums of these are exact.
    pub fn weight_tenths(self) -> u32 {
        WEIGHT_TENTHS
            .iter()
            .find(|(level, _)| *level == self)
            .map(|(_, w)| *w)
            .unwrap_or(0)
    }

    pub fn weight(self) -> f64 {
        tenths_to_weight(self.weight_tenths())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RelationshipLevel::Intimate => "intimate",
            RelationshipLevel::Trusted => "trusted",
            RelationshipLevel::Familiar => "familiar",
            RelationshipLevel::Acquainted => "acquainted",
            RelationshipLevel::Public => "public",
        }
    }
}

impl std::fmt::Display for RelationshipLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RelationshipLevel {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        WEIGHT_TENTHS
            .iter()
            .map(|(level, _)| *level)
            .find(|level| level.as_str() == s)
            .ok_or_else(|| crate::Error::Invalid(format!("unknown relationship level '{s}'")))
    }
}

pub fn tenths_to_weight(tenths: u32) -> f64 {
    f64::from(tenths) / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_values() {
        assert_eq!(RelationshipLevel::Intimate.weight(), 3.0);
        assert_eq!(RelationshipLevel::Trusted.weight(), 2.0);
        assert_eq!(RelationshipLevel::Familiar.weight(), 1.0);
        assert_eq!(RelationshipLevel::Acquainted.weight(), 0.5);
        assert_eq!(RelationshipLevel::Public.weight(), 0.1);
    }

    #[test]
    fn hundred_public_supporters_reach_threshold_exactly() {
        let total: u32 = (0..100).map(|_| RelationshipLevel::Public.weight_tenths()).sum();
        assert_eq!(total, INTERVENTION_THRESHOLD_TENTHS);
        assert_eq!(tenths_to_weight(total), INTERVENTION_THRESHOLD);
    }
}
