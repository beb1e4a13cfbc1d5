//! Beverage Price Pipeline Library
//!
//! Derives model features from consumer survey profiles and predicts a
//! retail price bracket with a trained classification pipeline.

pub mod config;
pub mod consumer;
pub mod error;
pub mod feature_extractor;
pub mod handler;
pub mod metrics;
pub mod models;
pub mod producer;
pub mod types;

pub use config::AppConfig;
pub use consumer::RequestConsumer;
pub use error::{ErrorKind, PricingError};
pub use feature_extractor::FeatureExtractor;
pub use models::inference::{InferenceService, PriceLabel};
pub use models::loader::{ArtifactCache, FsArtifactStore};
pub use producer::ResponseProducer;
pub use types::{profile::ConsumerProfile, quote::QuoteResponse};
