//! Feature derivation for price bracket model inference.
//!
//! This module turns a survey profile into the column set the trained
//! pipeline was fit on, including the engineered interaction features.

use crate::models::schema::RawRecord;
use crate::types::profile::{
    BrandCategory, ConsumeFrequency, ConsumerProfile, IncomeLevel, Level, SelectionFactor, Zone,
};

/// Column names, matching the training table.
pub mod columns {
    pub const AGE: &str = "age";
    pub const AGE_GROUP: &str = "age_group";
    pub const ZONE: &str = "zone";
    pub const INCOME_LEVELS: &str = "income_levels";
    pub const GENDER: &str = "gender";
    pub const OCCUPATION: &str = "occupation";
    pub const HEALTH_CONCERNS: &str = "health_concerns";
    pub const CONSUME_FREQUENCY: &str = "consume_frequency(weekly)";
    pub const CONSUMPTION_SITUATIONS: &str = "typical_consumption_situations";
    pub const PACKAGING_PREFERENCE: &str = "packaging_preference";
    pub const CONSUMPTION_SIZE: &str = "preferable_consumption_size";
    pub const PURCHASE_CHANNEL: &str = "purchase_channel";
    pub const FLAVOR_PREFERENCE: &str = "flavor_preference";
    pub const CURRENT_BRAND: &str = "current_brand";
    pub const BRAND_AWARENESS: &str = "brand_awareness";
    pub const AWARENESS_OF_OTHER_BRANDS: &str = "awareness_of_other_brands";
    pub const REASONS_FOR_CHOOSING_BRANDS: &str = "reasons_for_choosing_brands";
    pub const CF_AB_SCORE: &str = "cf_ab_score";
    pub const ZAS_SCORE: &str = "zas_score";
    pub const BSI: &str = "bsi";
}

/// Age band used as a categorical feature.
///
/// Total over all integers: values outside every band map to `"Unknown"`.
/// Range checking belongs to profile validation, not here.
pub fn age_group(age: i64) -> &'static str {
    match age {
        18..=25 => "18-25",
        26..=35 => "26-35",
        36..=45 => "36-45",
        46..=55 => "46-55",
        56..=70 => "56-70",
        71.. => "70+",
        _ => "Unknown",
    }
}

// Ordinal codes for derived-feature arithmetic. Matches are exhaustive, so a
// new answer cannot be added without assigning it a code.

pub fn frequency_code(frequency: ConsumeFrequency) -> u8 {
    match frequency {
        ConsumeFrequency::ZeroToTwo => 1,
        ConsumeFrequency::ThreeToFour => 2,
        ConsumeFrequency::FiveToSeven => 3,
    }
}

pub fn awareness_code(awareness: Level) -> u8 {
    match awareness {
        Level::Low => 1,
        Level::Medium => 2,
        Level::High => 3,
    }
}

pub fn zone_code(zone: Zone) -> u8 {
    match zone {
        Zone::Rural => 1,
        Zone::SemiUrban => 2,
        Zone::Urban => 3,
        Zone::Metro => 4,
    }
}

/// `Not Reported` encodes to 0, which zeroes the zone/income score.
pub fn income_code(income: IncomeLevel) -> u8 {
    match income {
        IncomeLevel::NotReported => 0,
        IncomeLevel::Below10L => 1,
        IncomeLevel::From10LTo15L => 2,
        IncomeLevel::From16LTo25L => 3,
        IncomeLevel::From26LTo35L => 4,
        IncomeLevel::Above35L => 5,
    }
}

/// Consumption-frequency / brand-awareness affinity, rounded to 2 decimals.
///
/// Both codes are at least 1, so the result lies in (0, 1].
pub fn cf_ab_score(frequency: ConsumeFrequency, awareness: Level) -> f64 {
    let cf = f64::from(frequency_code(frequency));
    let ab = f64::from(awareness_code(awareness));
    round2(cf / (cf + ab))
}

/// Zone-by-income composite score.
pub fn zas_score(zone: Zone, income: IncomeLevel) -> u8 {
    zone_code(zone) * income_code(income)
}

/// Brand-switch incentive: 1 for non-established brands chosen on price or quality.
pub fn bsi(brand: BrandCategory, driver: SelectionFactor) -> u8 {
    let switchable = brand != BrandCategory::Established;
    let price_or_quality = matches!(driver, SelectionFactor::Price | SelectionFactor::Quality);
    u8::from(switchable && price_or_quality)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Features computed from the profile rather than supplied by the respondent
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedFeatures {
    pub age_group: &'static str,
    pub cf_ab_score: f64,
    pub zas_score: u8,
    pub bsi: u8,
}

/// Feature extractor that transforms profiles into model input records.
///
/// Matches the feature engineering done when the pipeline was trained.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureExtractor;

impl FeatureExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Compute the derived features for a profile.
    pub fn derive(&self, profile: &ConsumerProfile) -> DerivedFeatures {
        DerivedFeatures {
            age_group: age_group(i64::from(profile.age)),
            cf_ab_score: cf_ab_score(profile.consume_frequency, profile.brand_awareness),
            zas_score: zas_score(profile.zone, profile.income_levels),
            bsi: bsi(profile.current_brand, profile.primary_selection_factor),
        }
    }

    /// Assemble the raw record: profile answers plus derived features,
    /// keyed by training column name.
    pub fn assemble(&self, profile: &ConsumerProfile) -> RawRecord {
        let derived = self.derive(profile);
        let mut record = RawRecord::new();

        record.insert(columns::AGE, i64::from(profile.age));
        record.insert(columns::AGE_GROUP, derived.age_group);
        record.insert(columns::ZONE, profile.zone.as_str());
        record.insert(columns::INCOME_LEVELS, profile.income_levels.as_str());
        record.insert(columns::GENDER, profile.gender.as_str());
        record.insert(columns::OCCUPATION, profile.occupation.as_str());
        record.insert(columns::HEALTH_CONCERNS, profile.health_concerns.as_str());
        record.insert(columns::CONSUME_FREQUENCY, profile.consume_frequency.as_str());
        record.insert(
            columns::CONSUMPTION_SITUATIONS,
            profile.typical_consumption_situations.as_str(),
        );
        record.insert(
            columns::PACKAGING_PREFERENCE,
            profile.packaging_preference.as_str(),
        );
        record.insert(
            columns::CONSUMPTION_SIZE,
            profile.preferable_consumption_size.as_str(),
        );
        record.insert(columns::PURCHASE_CHANNEL, profile.purchase_channel.as_str());
        record.insert(columns::FLAVOR_PREFERENCE, profile.flavor_preference.as_str());
        record.insert(columns::CURRENT_BRAND, profile.current_brand.as_str());
        record.insert(columns::BRAND_AWARENESS, profile.brand_awareness.as_str());
        // The form asks once; training data had both columns.
        record.insert(
            columns::AWARENESS_OF_OTHER_BRANDS,
            profile.brand_awareness.as_str(),
        );
        record.insert(
            columns::REASONS_FOR_CHOOSING_BRANDS,
            profile.primary_selection_factor.as_str(),
        );
        record.insert(columns::CF_AB_SCORE, derived.cf_ab_score);
        record.insert(columns::ZAS_SCORE, i64::from(derived.zas_score));
        record.insert(columns::BSI, i64::from(derived.bsi));

        record
    }

    /// Number of columns produced by [`assemble`](Self::assemble).
    pub fn feature_count(&self) -> usize {
        self.feature_names().len()
    }

    /// Column names in training table order.
    pub fn feature_names(&self) -> Vec<&'static str> {
        vec![
            columns::AGE,
            columns::AGE_GROUP,
            columns::ZONE,
            columns::INCOME_LEVELS,
            columns::GENDER,
            columns::OCCUPATION,
            columns::HEALTH_CONCERNS,
            columns::CONSUME_FREQUENCY,
            columns::CONSUMPTION_SITUATIONS,
            columns::PACKAGING_PREFERENCE,
            columns::CONSUMPTION_SIZE,
            columns::PURCHASE_CHANNEL,
            columns::FLAVOR_PREFERENCE,
            columns::CURRENT_BRAND,
            columns::BRAND_AWARENESS,
            columns::AWARENESS_OF_OTHER_BRANDS,
            columns::REASONS_FOR_CHOOSING_BRANDS,
            // Engineered
            columns::CF_AB_SCORE,
            columns::ZAS_SCORE,
            columns::BSI,
        ]
    }
}
