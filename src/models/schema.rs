//! Column schema of the trained preprocessing step and record coercion.
//!
//! The trained pipeline was fit on a table whose columns were partitioned
//! into numeric and categorical groups. At inference time every record has to
//! present exactly those columns with exactly those types, so coercion is
//! driven by the [`Schema`] recorded in the loaded artifacts rather than by a
//! list kept in code.

use crate::error::{PricingError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Stand-in for a categorical value that was never supplied.
pub const UNKNOWN_CATEGORY: &str = "Unknown";

/// Numeric/categorical column partition declared by the preprocessing step
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Schema {
    numeric_columns: BTreeSet<String>,
    categorical_columns: BTreeSet<String>,
}

impl Schema {
    /// Build a schema, rejecting a column declared as both numeric and categorical.
    pub fn new<N, C>(numeric: N, categorical: C) -> std::result::Result<Self, String>
    where
        N: IntoIterator,
        N::Item: Into<String>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        let numeric_columns: BTreeSet<String> = numeric.into_iter().map(Into::into).collect();
        let categorical_columns: BTreeSet<String> =
            categorical.into_iter().map(Into::into).collect();

        if let Some(column) = numeric_columns.intersection(&categorical_columns).next() {
            return Err(format!(
                "column `{}` is declared both numeric and categorical",
                column
            ));
        }

        Ok(Self {
            numeric_columns,
            categorical_columns,
        })
    }

    pub fn numeric_columns(&self) -> &BTreeSet<String> {
        &self.numeric_columns
    }

    pub fn categorical_columns(&self) -> &BTreeSet<String> {
        &self.categorical_columns
    }

    /// Total number of columns the step consumes
    pub fn len(&self) -> usize {
        self.numeric_columns.len() + self.categorical_columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Coerce a record to this schema.
    ///
    /// Numeric columns become `f64`, with unparseable, non-finite or missing
    /// values replaced by `0`. Categorical columns become strings, with missing
    /// values replaced by [`UNKNOWN_CATEGORY`]. Columns the schema does not
    /// declare are left out of the result.
    pub fn coerce(&self, record: &RawRecord) -> Result<EncodedRecord> {
        let mut values = BTreeMap::new();

        for column in &self.numeric_columns {
            let value = record.require(column)?;
            values.insert(column.clone(), EncodedValue::Numeric(to_numeric(value)));
        }

        for column in &self.categorical_columns {
            let value = record.require(column)?;
            values.insert(column.clone(), EncodedValue::Categorical(to_category(value)));
        }

        Ok(EncodedRecord { values })
    }
}

fn to_numeric(value: &FieldValue) -> f64 {
    let parsed = match value {
        FieldValue::Number(n) => Some(*n),
        FieldValue::Text(s) => s.trim().parse::<f64>().ok(),
        FieldValue::Missing => None,
    };
    parsed.filter(|n| n.is_finite()).unwrap_or(0.0)
}

fn to_category(value: &FieldValue) -> String {
    match value {
        FieldValue::Text(s) => s.clone(),
        FieldValue::Number(n) => n.to_string(),
        FieldValue::Missing => UNKNOWN_CATEGORY.to_string(),
    }
}

/// A value as assembled from the profile, before coercion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
    Missing,
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Number(value as f64)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

/// Assembled column map, keyed by the column names used during training
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord {
    fields: BTreeMap<String, FieldValue>,
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(column.into(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.fields.get(column)
    }

    pub fn remove(&mut self, column: &str) -> Option<FieldValue> {
        self.fields.remove(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn require(&self, column: &str) -> Result<&FieldValue> {
        self.fields
            .get(column)
            .ok_or_else(|| PricingError::SchemaMismatch {
                column: column.to_string(),
            })
    }
}

/// A coerced value, typed the way the preprocessing step expects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EncodedValue {
    Numeric(f64),
    Categorical(String),
}

impl fmt::Display for EncodedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodedValue::Numeric(n) => write!(f, "{}", n),
            EncodedValue::Categorical(s) => f.write_str(s),
        }
    }
}

/// The record handed to the trained pipeline: exactly the schema's columns
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncodedRecord {
    values: BTreeMap<String, EncodedValue>,
}

impl EncodedRecord {
    pub fn get(&self, column: &str) -> Option<&EncodedValue> {
        self.values.get(column)
    }

    pub fn numeric(&self, column: &str) -> Option<f64> {
        match self.values.get(column)? {
            EncodedValue::Numeric(n) => Some(*n),
            EncodedValue::Categorical(_) => None,
        }
    }

    pub fn categorical(&self, column: &str) -> Option<&str> {
        match self.values.get(column)? {
            EncodedValue::Categorical(s) => Some(s),
            EncodedValue::Numeric(_) => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &EncodedValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn age_zone_schema() -> Schema {
        Schema::new(["age"], ["zone"]).unwrap()
    }

    #[test]
    fn test_numeric_text_is_parsed() {
        let mut record = RawRecord::new();
        record.insert("age", "37");
        record.insert("zone", "Metro");

        let encoded = age_zone_schema().coerce(&record).unwrap();
        assert_eq!(encoded.numeric("age"), Some(37.0));
        assert_eq!(encoded.categorical("zone"), Some("Metro"));
    }

    #[test]
    fn test_invalid_numeric_becomes_zero() {
        let mut record = RawRecord::new();
        record.insert("age", "not-a-number");
        record.insert("zone", "Metro");

        let encoded = age_zone_schema().coerce(&record).unwrap();
        assert_eq!(encoded.numeric("age"), Some(0.0));
    }

    #[test]
    fn test_missing_and_non_finite_values() {
        let schema = Schema::new(["age", "cf_ab_score"], ["zone"]).unwrap();
        let mut record = RawRecord::new();
        record.insert("age", FieldValue::Missing);
        record.insert("cf_ab_score", f64::NAN);
        record.insert("zone", FieldValue::Missing);

        let encoded = schema.coerce(&record).unwrap();
        assert_eq!(encoded.numeric("age"), Some(0.0));
        assert_eq!(encoded.numeric("cf_ab_score"), Some(0.0));
        assert_eq!(encoded.categorical("zone"), Some(UNKNOWN_CATEGORY));
    }

    #[test]
    fn test_numbers_rendered_for_categorical_columns() {
        let schema = Schema::new(Vec::<String>::new(), ["bsi", "cf_ab_score"]).unwrap();
        let mut record = RawRecord::new();
        record.insert("bsi", 1_i64);
        record.insert("cf_ab_score", 0.75);

        let encoded = schema.coerce(&record).unwrap();
        assert_eq!(encoded.categorical("bsi"), Some("1"));
        assert_eq!(encoded.categorical("cf_ab_score"), Some("0.75"));
    }

    #[test]
    fn test_missing_column_is_schema_mismatch() {
        let mut record = RawRecord::new();
        record.insert("age", 30_i64);

        let err = age_zone_schema().coerce(&record).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaMismatch);
        assert!(err.to_string().contains("`zone`"));
    }

    #[test]
    fn test_undeclared_columns_are_dropped() {
        let mut record = RawRecord::new();
        record.insert("age", 30_i64);
        record.insert("zone", "Rural");
        record.insert("favourite_colour", "green");

        let encoded = age_zone_schema().coerce(&record).unwrap();
        assert_eq!(encoded.len(), 2);
        assert!(encoded.get("favourite_colour").is_none());
    }

    #[test]
    fn test_overlapping_partition_rejected() {
        let err = Schema::new(["age", "zone"], ["zone"]).unwrap_err();
        assert!(err.contains("zone"));
    }

    #[test]
    fn test_encoded_record_serialization() {
        let mut record = RawRecord::new();
        record.insert("age", 41_i64);
        record.insert("zone", "Urban");

        let encoded = age_zone_schema().coerce(&record).unwrap();
        let json = serde_json::to_string(&encoded).unwrap();
        assert_eq!(json, r#"{"age":41.0,"zone":"Urban"}"#);
    }

    #[test]
    fn test_raw_record_serialization() {
        let mut record = RawRecord::new();
        record.insert("age", 41_i64);
        record.insert("zone", "Urban");
        record.insert("income_levels", FieldValue::Missing);

        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"age":41.0,"income_levels":null,"zone":"Urban"}"#);

        let back: RawRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
