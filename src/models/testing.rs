//! Deterministic in-memory pipeline for tests

use crate::feature_extractor::{columns, FeatureExtractor};
use crate::models::loader::ModelArtifacts;
use crate::models::pipeline::{LabelDecoder, PricePipeline};
use crate::models::schema::{EncodedRecord, Schema};
use anyhow::Result;

const NUMERIC: [&str; 4] = [
    columns::AGE,
    columns::CF_AB_SCORE,
    columns::ZAS_SCORE,
    columns::BSI,
];

/// Class list in the order a label encoder fit on these brackets would store it.
pub const CLASSES: [&str; 3] = ["High", "Low", "Medium"];

/// Buckets records by zone/income score, the way a fitted tree might.
pub struct RuleBasedPipeline {
    schema: Schema,
    fixed_class: Option<i64>,
}

impl RuleBasedPipeline {
    /// Schema covering every assembled column
    pub fn new() -> Self {
        let categorical: Vec<&str> = FeatureExtractor::new()
            .feature_names()
            .into_iter()
            .filter(|name| !NUMERIC.contains(name))
            .collect();
        Self::with_schema(Schema::new(NUMERIC, categorical).unwrap())
    }

    pub fn with_schema(schema: Schema) -> Self {
        Self {
            schema,
            fixed_class: None,
        }
    }

    /// Always answer with `class`, whatever the record
    pub fn with_fixed_class(mut self, class: i64) -> Self {
        self.fixed_class = Some(class);
        self
    }

    pub fn decoder() -> LabelDecoder {
        LabelDecoder::new(CLASSES.iter().map(|c| c.to_string()).collect()).unwrap()
    }

    pub fn artifacts() -> ModelArtifacts {
        ModelArtifacts::new(Box::new(Self::new()), Self::decoder())
    }

    pub fn into_artifacts(self) -> ModelArtifacts {
        ModelArtifacts::new(Box::new(self), Self::decoder())
    }
}

impl PricePipeline for RuleBasedPipeline {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn predict_class(&self, record: &EncodedRecord) -> Result<i64> {
        if let Some(class) = self.fixed_class {
            return Ok(class);
        }
        let zas = record
            .numeric(columns::ZAS_SCORE)
            .ok_or_else(|| anyhow::anyhow!("zas_score is not numeric"))?;
        let bsi = record.numeric(columns::BSI).unwrap_or(0.0);

        Ok(if zas >= 10.0 {
            0
        } else if zas >= 4.0 || bsi > 0.0 {
            2
        } else {
            1
        })
    }
}
