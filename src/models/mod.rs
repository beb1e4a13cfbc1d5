//! Model artifacts, schema coercion and inference

pub mod inference;
pub mod loader;
pub mod pipeline;
pub mod schema;

#[cfg(test)]
pub(crate) mod testing;

pub use inference::{DataProfile, InferenceService, PriceLabel};
pub use loader::{ArtifactCache, ArtifactStore, FsArtifactStore, ModelArtifacts};
pub use pipeline::{LabelDecoder, OnnxPipeline, PricePipeline};
pub use schema::{EncodedRecord, EncodedValue, FieldValue, RawRecord, Schema};
