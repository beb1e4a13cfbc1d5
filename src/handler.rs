//! Turns raw request payloads into quote responses

use crate::error::PricingError;
use crate::models::inference::InferenceService;
use crate::types::quote::{PredictionOutcome, QuoteRequest, QuoteResponse};
use std::fmt;

/// Decode a request payload, run the prediction and build the response.
///
/// Never fails: decode and prediction errors become failure outcomes.
pub fn handle_payload(service: &InferenceService, payload: &[u8]) -> QuoteResponse {
    let request: QuoteRequest = match serde_json::from_slice(payload) {
        Ok(request) => request,
        Err(e) => {
            let err = PricingError::validation(e.to_string());
            return QuoteResponse::new(None, PredictionOutcome::from(&err));
        }
    };

    handle_request(service, request)
}

pub fn handle_request(service: &InferenceService, request: QuoteRequest) -> QuoteResponse {
    if !request.include_record {
        let outcome = PredictionOutcome::from(service.predict(&request.profile));
        return QuoteResponse::new(request.request_id, outcome);
    }

    // Build the records once and classify the encoded one
    match service.data_profile(&request.profile) {
        Ok(data_profile) => {
            let outcome = PredictionOutcome::from(service.classify(&data_profile.encoded));
            QuoteResponse::new(request.request_id, outcome).with_data_profile(data_profile)
        }
        Err(e) => QuoteResponse::new(request.request_id, PredictionOutcome::from(&e)),
    }
}

/// Response for a request whose prediction task died before answering
pub fn task_failure(reason: impl fmt::Display) -> QuoteResponse {
    let err = PricingError::prediction(anyhow::anyhow!("prediction task failed: {}", reason));
    QuoteResponse::new(None, PredictionOutcome::from(&err))
}
