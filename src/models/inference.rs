//! Price bracket inference service

use crate::error::{PricingError, Result};
use crate::feature_extractor::FeatureExtractor;
use crate::models::loader::{ArtifactCache, ArtifactStore, ModelArtifacts};
use crate::models::schema::{EncodedRecord, RawRecord};
use crate::types::profile::ConsumerProfile;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Human-readable price bracket predicted for a profile
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriceLabel(String);

impl PriceLabel {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for PriceLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Both views of the record built for one profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataProfile {
    /// Every assembled column, before coercion
    pub assembled: RawRecord,
    /// The schema's columns, as the pipeline receives them
    pub encoded: EncodedRecord,
}

/// Single-record price bracket prediction over loaded artifacts.
///
/// Stateless between calls and cheap to clone; all clones share the same
/// read-only artifacts.
#[derive(Debug, Clone)]
pub struct InferenceService {
    artifacts: Arc<ModelArtifacts>,
    extractor: FeatureExtractor,
}

impl InferenceService {
    pub fn new(artifacts: Arc<ModelArtifacts>) -> Self {
        Self {
            artifacts,
            extractor: FeatureExtractor::new(),
        }
    }

    /// Build a service over the cache's artifacts, loading them if needed
    pub fn from_cache<S: ArtifactStore>(cache: &ArtifactCache<S>) -> Result<Self> {
        Ok(Self::new(cache.load()?))
    }

    pub fn artifacts(&self) -> &ModelArtifacts {
        &self.artifacts
    }

    /// The coerced record the pipeline would receive for this profile
    pub fn encode(&self, profile: &ConsumerProfile) -> Result<EncodedRecord> {
        profile.validate()?;
        let record = self.extractor.assemble(profile);
        self.artifacts.schema().coerce(&record)
    }

    /// Assembled and coerced records for this profile
    pub fn data_profile(&self, profile: &ConsumerProfile) -> Result<DataProfile> {
        profile.validate()?;
        let assembled = self.extractor.assemble(profile);
        let encoded = self.artifacts.schema().coerce(&assembled)?;
        Ok(DataProfile { assembled, encoded })
    }

    /// Predict the price bracket for one profile.
    ///
    /// Validation and schema failures keep their own kinds; anything going
    /// wrong inside the pipeline or the decoder is a prediction error.
    pub fn predict(&self, profile: &ConsumerProfile) -> Result<PriceLabel> {
        let record = self.encode(profile)?;
        self.classify(&record)
    }

    /// Run the pipeline and decoder on an already coerced record.
    ///
    /// A panic inside either is reported as a prediction error.
    pub fn classify(&self, record: &EncodedRecord) -> Result<PriceLabel> {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| -> anyhow::Result<PriceLabel> {
            let class = self.artifacts.pipeline().predict_class(record)?;
            let label = self.artifacts.decoder().decode(class)?;
            Ok(PriceLabel(label.to_string()))
        }));

        match outcome {
            Ok(result) => result.map_err(PricingError::prediction),
            Err(payload) => Err(PricingError::prediction(anyhow::anyhow!(
                "pipeline panicked: {}",
                panic_message(payload.as_ref())
            ))),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}
