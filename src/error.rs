//! Error types for the ivfflat library.
//!
//! Every fallible operation returns [`IvfError`], which carries a
//! human-readable message and an [`ErrorKind`] that callers can match on
//! without inspecting strings.
//!
//! # Examples
//!
//! ```
//! use ivfflat::error::{ErrorKind, IvfError, Result};
//!
//! fn example_operation() -> Result<()> {
//!     Err(IvfError::not_trained("index not initialized or trained"))
//! }
//!
//! let err = example_operation().unwrap_err();
//! assert_eq!(err.kind(), ErrorKind::NotTrained);
//! ```

use std::io;

use thiserror::Error;

/// The main error type for index operations.
#[derive(Error, Debug)]
pub enum IvfError {
    /// The operation requires a trained index.
    #[error("Not trained: {0}")]
    NotTrained(String),

    /// Training was requested with insufficient vectors or an invalid `nlist`.
    #[error("Training precondition failed: {0}")]
    TrainingPrecondition(String),

    /// No device handle could be obtained from the resource pool.
    #[error("Resource unavailable: {0}")]
    ResourceUnavailable(String),

    /// Serialized state is corrupt or has an incompatible version.
    #[error("Format error: {0}")]
    Format(String),

    /// A result buffer or device allocation could not be satisfied.
    #[error("Allocation error: {0}")]
    Allocation(String),

    /// Malformed input: bad shape, bad ids, bad configuration values.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse classification of an [`IvfError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotTrained,
    TrainingPrecondition,
    ResourceUnavailable,
    Format,
    Allocation,
    InvalidInput,
    Io,
    Json,
}

/// Result type alias for operations that may fail with IvfError.
pub type Result<T> = std::result::Result<T, IvfError>;

impl IvfError {
    /// Create a new not-trained error.
    pub fn not_trained<S: Into<String>>(msg: S) -> Self {
        IvfError::NotTrained(msg.into())
    }

    /// Create a new training precondition error.
    pub fn training_precondition<S: Into<String>>(msg: S) -> Self {
        IvfError::TrainingPrecondition(msg.into())
    }

    /// Create a new resource unavailable error.
    pub fn resource_unavailable<S: Into<String>>(msg: S) -> Self {
        IvfError::ResourceUnavailable(msg.into())
    }

    /// Create a new format error.
    pub fn format<S: Into<String>>(msg: S) -> Self {
        IvfError::Format(msg.into())
    }

    /// Create a new allocation error.
    pub fn allocation<S: Into<String>>(msg: S) -> Self {
        IvfError::Allocation(msg.into())
    }

    /// Create a new invalid input error.
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        IvfError::InvalidInput(msg.into())
    }

    /// Create a new invalid config error.
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        IvfError::InvalidInput(format!("Invalid configuration: {}", msg.into()))
    }

    /// The kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            IvfError::NotTrained(_) => ErrorKind::NotTrained,
            IvfError::TrainingPrecondition(_) => ErrorKind::TrainingPrecondition,
            IvfError::ResourceUnavailable(_) => ErrorKind::ResourceUnavailable,
            IvfError::Format(_) => ErrorKind::Format,
            IvfError::Allocation(_) => ErrorKind::Allocation,
            IvfError::InvalidInput(_) => ErrorKind::InvalidInput,
            IvfError::Io(_) => ErrorKind::Io,
            IvfError::Json(_) => ErrorKind::Json,
        }
    }
}
