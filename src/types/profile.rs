//! Consumer survey profile and its closed answer enumerations

use crate::error::{PricingError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Inclusive age range accepted by the survey form.
pub const MIN_AGE: i32 = 18;
pub const MAX_AGE: i32 = 100;

/// Declares a closed survey answer enumeration whose wire form is the exact
/// label shown to respondents.
macro_rules! survey_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $what:literal {
            $($variant:ident => $label:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "&'static str")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            /// Every declared answer, in form order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl $name {
            fn from_label(s: &str) -> std::result::Result<Self, String> {
                match s {
                    $($label => Ok($name::$variant),)+
                    other => Err(format!("unknown {} `{}`", $what, other)),
                }
            }
        }

        impl FromStr for $name {
            type Err = PricingError;

            fn from_str(s: &str) -> Result<Self> {
                Self::from_label(s).map_err(PricingError::Validation)
            }
        }

        impl TryFrom<String> for $name {
            type Error = String;

            fn try_from(s: String) -> std::result::Result<Self, String> {
                Self::from_label(&s)
            }
        }

        impl From<$name> for &'static str {
            fn from(value: $name) -> Self {
                value.as_str()
            }
        }
    };
}

survey_enum!(Gender, "gender" {
    Male => "Male",
    Female => "Female",
    Other => "Other",
});

survey_enum!(
    /// Geographic zone of the respondent
    Zone, "zone" {
        Urban => "Urban",
        Metro => "Metro",
        Rural => "Rural",
        SemiUrban => "Semi-Urban",
    }
);

survey_enum!(
    /// Annual household income bracket
    IncomeLevel, "income bracket" {
        Below10L => "<10L",
        From10LTo15L => "10L-15L",
        From16LTo25L => "16L-25L",
        From26LTo35L => "26L-35L",
        Above35L => ">35L",
        NotReported => "Not Reported",
    }
);

survey_enum!(Occupation, "occupation" {
    Student => "Student",
    Employed => "Employed",
    Entrepreneur => "Entrepreneur",
    Unemployed => "Unemployed",
});

survey_enum!(
    /// Shared Low/Medium/High scale (wellness focus, brand awareness)
    Level, "level" {
        Low => "Low",
        Medium => "Medium",
        High => "High",
    }
);

survey_enum!(
    /// Weekly consumption frequency
    ConsumeFrequency, "consumption frequency" {
        ZeroToTwo => "0-2 times",
        ThreeToFour => "3-4 times",
        FiveToSeven => "5-7 times",
    }
);

survey_enum!(ConsumptionSituation, "consumption situation" {
    Home => "Home",
    Work => "Work",
    Outdoors => "Outdoors",
    Other => "Other",
});

survey_enum!(PackagingPreference, "packaging preference" {
    Bottle => "Bottle",
    Can => "Can",
    TetraPack => "Tetra Pack",
    Other => "Other",
});

survey_enum!(ConsumptionSize, "consumption size" {
    Small => "Small",
    Medium => "Medium",
    Large => "Large",
});

survey_enum!(PurchaseChannel, "purchase channel" {
    Online => "Online",
    Retail => "Retail",
    Supermarket => "Supermarket",
    Other => "Other",
});

survey_enum!(FlavorPreference, "flavor preference" {
    Sweet => "Sweet",
    Sour => "Sour",
    Bitter => "Bitter",
    Mixed => "Mixed",
    Other => "Other",
});

survey_enum!(
    /// Market position of the brand the respondent currently buys
    BrandCategory, "brand category" {
        Established => "Established",
        Newcomer => "Newcomer",
    }
);

survey_enum!(
    /// Primary purchase decision driver
    SelectionFactor, "selection factor" {
        Price => "Price",
        Quality => "Quality",
        Other => "Other",
    }
);

/// A single respondent's survey answers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerProfile {
    /// Age in years
    pub age: i32,

    pub gender: Gender,

    pub zone: Zone,

    pub income_levels: IncomeLevel,

    pub occupation: Occupation,

    /// Wellness focus
    pub health_concerns: Level,

    /// Weekly consumption frequency
    #[serde(alias = "consume_frequency(weekly)")]
    pub consume_frequency: ConsumeFrequency,

    pub typical_consumption_situations: ConsumptionSituation,

    pub packaging_preference: PackagingPreference,

    pub preferable_consumption_size: ConsumptionSize,

    pub purchase_channel: PurchaseChannel,

    pub flavor_preference: FlavorPreference,

    /// Brand category (established or newcomer)
    pub current_brand: BrandCategory,

    pub brand_awareness: Level,

    /// Primary purchase decision driver
    #[serde(alias = "reasons_for_choosing_brands")]
    pub primary_selection_factor: SelectionFactor,
}

impl ConsumerProfile {
    /// Create a profile with the form's default answers for everything but age
    pub fn new(age: i32) -> Self {
        Self {
            age,
            gender: Gender::Male,
            zone: Zone::Urban,
            income_levels: IncomeLevel::Below10L,
            occupation: Occupation::Student,
            health_concerns: Level::Low,
            consume_frequency: ConsumeFrequency::ZeroToTwo,
            typical_consumption_situations: ConsumptionSituation::Home,
            packaging_preference: PackagingPreference::Bottle,
            preferable_consumption_size: ConsumptionSize::Small,
            purchase_channel: PurchaseChannel::Online,
            flavor_preference: FlavorPreference::Sweet,
            current_brand: BrandCategory::Established,
            brand_awareness: Level::Low,
            primary_selection_factor: SelectionFactor::Price,
        }
    }

    /// Parse a profile from JSON. Any decode failure, including an answer
    /// outside its enumeration, is a validation error.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let profile: Self = serde_json::from_slice(bytes)
            .map_err(|e| PricingError::validation(e.to_string()))?;
        profile.validate()?;
        Ok(profile)
    }

    /// Check the invariants the type system cannot express.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_AGE..=MAX_AGE).contains(&self.age) {
            return Err(PricingError::validation(format!(
                "age {} outside [{}, {}]",
                self.age, MIN_AGE, MAX_AGE
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_profile_serialization() {
        let mut profile = ConsumerProfile::new(30);
        profile.zone = Zone::SemiUrban;
        profile.income_levels = IncomeLevel::NotReported;

        let json = serde_json::to_string(&profile).unwrap();
        assert!(json.contains("\"zone\":\"Semi-Urban\""));
        assert!(json.contains("\"income_levels\":\"Not Reported\""));

        let deserialized = ConsumerProfile::from_json(json.as_bytes()).unwrap();
        assert_eq!(profile, deserialized);
    }

    #[test]
    fn test_unknown_answer_is_validation_error() {
        let mut value = serde_json::to_value(ConsumerProfile::new(30)).unwrap();
        value["income_levels"] = serde_json::json!("50L+");

        let err = ConsumerProfile::from_json(value.to_string().as_bytes()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("50L+"));
    }

    #[test]
    fn test_age_bounds() {
        assert!(ConsumerProfile::new(18).validate().is_ok());
        assert!(ConsumerProfile::new(100).validate().is_ok());

        for age in [17, 101, -5] {
            let err = ConsumerProfile::new(age).validate().unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation);
        }
    }

    #[test]
    fn test_out_of_range_age_rejected_when_parsing() {
        let json = serde_json::to_string(&ConsumerProfile::new(12)).unwrap();
        assert!(ConsumerProfile::from_json(json.as_bytes()).is_err());
    }

    #[test]
    fn test_training_column_aliases() {
        let mut value = serde_json::to_value(ConsumerProfile::new(40)).unwrap();
        let object = value.as_object_mut().unwrap();
        object.remove("consume_frequency");
        object.remove("primary_selection_factor");
        object.insert("consume_frequency(weekly)".into(), "5-7 times".into());
        object.insert("reasons_for_choosing_brands".into(), "Quality".into());

        let profile = ConsumerProfile::from_json(value.to_string().as_bytes()).unwrap();
        assert_eq!(profile.consume_frequency, ConsumeFrequency::FiveToSeven);
        assert_eq!(profile.primary_selection_factor, SelectionFactor::Quality);
    }

    #[test]
    fn test_labels_round_trip_through_from_str() {
        for zone in Zone::ALL {
            assert_eq!(zone.as_str().parse::<Zone>().unwrap(), *zone);
        }
        for income in IncomeLevel::ALL {
            assert_eq!(income.as_str().parse::<IncomeLevel>().unwrap(), *income);
        }
        assert_eq!(IncomeLevel::ALL.len(), 6);
        assert_eq!(FlavorPreference::ALL.len(), 5);
    }
}
