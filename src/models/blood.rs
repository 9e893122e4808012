// src/models/blood.rs - ABO/Rh blood types and the donor compatibility rule

use serde::{Deserialize, Serialize};

/// The eight ABO/Rh blood types. Stored and serialized in their clinical
/// notation ("A+", "O-", ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BloodType {
    #[serde(rename = "A+")]
    APositive,
    #[serde(rename = "A-")]
    ANegative,
    #[serde(rename = "B+")]
    BPositive,
    #[serde(rename = "B-")]
    BNegative,
    #[serde(rename = "AB+")]
    AbPositive,
    #[serde(rename = "AB-")]
    AbNegative,
    #[serde(rename = "O+")]
    OPositive,
    #[serde(rename = "O-")]
    ONegative,
}

impl BloodType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "A+" => Some(BloodType::APositive),
            "A-" => Some(BloodType::ANegative),
            "B+" => Some(BloodType::BPositive),
            "B-" => Some(BloodType::BNegative),
            "AB+" => Some(BloodType::AbPositive),
            "AB-" => Some(BloodType::AbNegative),
            "O+" => Some(BloodType::OPositive),
            "O-" => Some(BloodType::ONegative),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BloodType::APositive => "A+",
            BloodType::ANegative => "A-",
            BloodType::BPositive => "B+",
            BloodType::BNegative => "B-",
            BloodType::AbPositive => "AB+",
            BloodType::AbNegative => "AB-",
            BloodType::OPositive => "O+",
            BloodType::ONegative => "O-",
        }
    }

    pub fn is_rh_positive(&self) -> bool {
        matches!(
            self,
            BloodType::APositive
                | BloodType::BPositive
                | BloodType::AbPositive
                | BloodType::OPositive
        )
    }

    pub fn all() -> [BloodType; 8] {
        [
            BloodType::APositive,
            BloodType::ANegative,
            BloodType::BPositive,
            BloodType::BNegative,
            BloodType::AbPositive,
            BloodType::AbNegative,
            BloodType::OPositive,
            BloodType::ONegative,
        ]
    }
}

impl std::fmt::Display for BloodType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Donor-side matching rule used to route emergencies to donors.
///
/// O- donors match every need, identical types always match, O+ matches any
/// Rh-positive need, A-group donors match A-group needs and B-group donors
/// match B-group needs. AB donors match nothing but their identical type —
/// this mirrors the platform's established rule and is intentionally NOT the
/// clinical receiver-compatibility table.
pub fn donor_matches(donor: BloodType, need: BloodType) -> bool {
    if donor == need {
        return true;
    }
    match donor {
        BloodType::ONegative => true,
        BloodType::OPositive => need.is_rh_positive(),
        BloodType::APositive | BloodType::ANegative => {
            matches!(need, BloodType::APositive | BloodType::ANegative)
        }
        BloodType::BPositive | BloodType::BNegative => {
            matches!(need, BloodType::BPositive | BloodType::BNegative)
        }
        BloodType::AbPositive | BloodType::AbNegative => false,
    }
}
