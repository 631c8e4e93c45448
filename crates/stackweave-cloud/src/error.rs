//! Error types for graph construction, resolution and engine hand-off

use crate::resource::{ResourceKey, ResourceKind};
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the resource graph and its engine boundary
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Invalid reference: {referenced_by} refers to {resource}, which is not declared")]
    InvalidReference {
        resource: ResourceKey,
        referenced_by: String,
    },

    #[error("Duplicate resource name: {0}")]
    DuplicateName(ResourceKey),

    #[error("Duplicate output name: {0}")]
    DuplicateOutput(String),

    #[error("Missing required field '{field}' for {kind}")]
    MissingField { kind: ResourceKind, field: String },

    #[error("Unknown field '{field}' for {kind}")]
    UnknownField { kind: ResourceKind, field: String },

    #[error("{kind} does not publish output '{field}'")]
    UnknownOutput { kind: ResourceKind, field: String },

    #[error("{0} has no secret listing query")]
    NoSecretQuery(ResourceKind),

    #[error("Invalid template '{template}': {reason}")]
    InvalidTemplate { template: String, reason: String },

    #[error("Circular dependency detected: {0}")]
    CircularDependency(String),

    #[error("Asset error: {path}\nReason: {message}")]
    Asset { path: PathBuf, message: String },

    #[error("Resolution failed: {0}")]
    Resolve(String),

    #[error("Engine '{engine}' failed: {message}")]
    Engine { engine: String, message: String },

    #[error("State file error: {0}")]
    StateError(String),

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CloudError>;
