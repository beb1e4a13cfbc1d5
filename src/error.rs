//! Error taxonomy for price bracket prediction

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Boxed underlying cause carried by artifact and prediction failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for pricing operations
pub type Result<T> = std::result::Result<T, PricingError>;

/// Which persisted artifact a load failure refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Pipeline,
    LabelDecoder,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::Pipeline => f.write_str("pipeline"),
            ArtifactKind::LabelDecoder => f.write_str("label decoder"),
        }
    }
}

/// Main error type for the pricing core
#[derive(Debug, thiserror::Error)]
pub enum PricingError {
    /// A profile field is outside its enumeration or range.
    #[error("Invalid consumer profile: {0}")]
    Validation(String),

    /// The record lacks a column the preprocessing step was fit on.
    #[error("Record is missing column `{column}` required by the preprocessing step")]
    SchemaMismatch { column: String },

    /// Startup-fatal: an artifact is missing or cannot be deserialized.
    #[error("Failed to load {artifact} artifact from {}: {source}", .path.display())]
    ArtifactLoad {
        artifact: ArtifactKind,
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    /// Transform, classify or decode failed.
    #[error("Prediction failed: {source}")]
    Prediction {
        #[source]
        source: BoxError,
    },
}

impl PricingError {
    pub fn validation(message: impl Into<String>) -> Self {
        PricingError::Validation(message.into())
    }

    pub fn artifact_load(
        artifact: ArtifactKind,
        path: impl Into<PathBuf>,
        source: impl Into<BoxError>,
    ) -> Self {
        PricingError::ArtifactLoad {
            artifact,
            path: path.into(),
            source: source.into(),
        }
    }

    pub fn prediction(source: impl Into<BoxError>) -> Self {
        PricingError::Prediction {
            source: source.into(),
        }
    }

    /// Structured kind for the caller to render.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PricingError::Validation(_) => ErrorKind::Validation,
            PricingError::SchemaMismatch { .. } => ErrorKind::SchemaMismatch,
            PricingError::ArtifactLoad { .. } => ErrorKind::ArtifactLoad,
            PricingError::Prediction { .. } => ErrorKind::Prediction,
        }
    }
}

/// Serializable error kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    SchemaMismatch,
    ArtifactLoad,
    Prediction,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::SchemaMismatch => "schema_mismatch",
            ErrorKind::ArtifactLoad => "artifact_load",
            ErrorKind::Prediction => "prediction",
        }
    }
}
