//! Type definitions for the price prediction pipeline

pub mod profile;
pub mod quote;

pub use profile::ConsumerProfile;
pub use quote::{PredictionOutcome, QuoteRequest, QuoteResponse};
