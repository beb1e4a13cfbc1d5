//! Price quote request and response envelopes

use crate::error::{ErrorKind, PricingError};
use crate::models::inference::{DataProfile, PriceLabel};
use crate::types::profile::ConsumerProfile;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Request for a price bracket prediction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteRequest {
    /// Caller-supplied identifier, echoed in the response
    #[serde(default)]
    pub request_id: Option<String>,

    pub profile: ConsumerProfile,

    /// Also return the assembled and encoded records
    #[serde(default)]
    pub include_record: bool,
}

impl QuoteRequest {
    pub fn new(profile: ConsumerProfile) -> Self {
        Self {
            request_id: None,
            profile,
            include_record: false,
        }
    }
}

/// Either a label or a structured failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PredictionOutcome {
    Success { label: PriceLabel },
    Failure { kind: ErrorKind, message: String },
}

impl PredictionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PredictionOutcome::Success { .. })
    }
}

impl From<std::result::Result<PriceLabel, PricingError>> for PredictionOutcome {
    fn from(result: std::result::Result<PriceLabel, PricingError>) -> Self {
        match result {
            Ok(label) => PredictionOutcome::Success { label },
            Err(e) => PredictionOutcome::from(&e),
        }
    }
}

impl From<&PricingError> for PredictionOutcome {
    fn from(error: &PricingError) -> Self {
        PredictionOutcome::Failure {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// Reply to a quote request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteResponse {
    /// Echoed or generated request identifier
    pub request_id: String,

    pub outcome: PredictionOutcome,

    /// Assembled and encoded records, when requested and available
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_profile: Option<DataProfile>,

    /// Response generation timestamp
    pub timestamp: DateTime<Utc>,
}

impl QuoteResponse {
    /// Create a response, generating an identifier when the request had none
    pub fn new(request_id: Option<String>, outcome: PredictionOutcome) -> Self {
        Self {
            request_id: request_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            outcome,
            data_profile: None,
            timestamp: Utc::now(),
        }
    }

    /// Attach the data profile view
    pub fn with_data_profile(mut self, data_profile: DataProfile) -> Self {
        self.data_profile = Some(data_profile);
        self
    }
}
