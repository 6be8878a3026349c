//! Error types for the model core

use thiserror::Error;

use crate::shape_id::{ShapeId, ShapeIdError};

/// Result type for model operations
pub type Result<T> = std::result::Result<T, ModelError>;

/// Model core errors
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("shape not found in model: {0}")]
    ShapeNotFound(ShapeId),

    #[error(transparent)]
    ShapeId(#[from] ShapeIdError),

    #[error("invalid model document {path}: {reason}")]
    InvalidDocument { path: String, reason: String },

    #[error(transparent)]
    Selector(#[from] crate::selector::SelectorSyntaxError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
