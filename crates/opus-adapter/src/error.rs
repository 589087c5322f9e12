//! Error handling for the Opus adapter
//!
//! This module defines the adapter's error taxonomy and the single place where
//! numeric codec-engine failures are translated into it.

#![allow(missing_docs)]

use crate::engine::EngineError;
use std::fmt;
use thiserror::Error;

/// Result type alias for adapter operations
pub type Result<T> = std::result::Result<T, AdapterError>;

/// Why a codec descriptor was refused by the capability query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnsupportedReason {
    /// Media type is not audio
    NotAudio,
    /// Encoding name does not match
    EncodingName(String),
    /// Clock rate outside the supported set
    ClockRate(u32),
}

impl fmt::Display for UnsupportedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAudio => write!(f, "media type is not audio"),
            Self::EncodingName(name) => write!(f, "encoding name '{}' not handled", name),
            Self::ClockRate(rate) => write!(f, "clock rate {}Hz not supported", rate),
        }
    }
}

/// Error type for adapter operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdapterError {
    /// Bad parameters, or the engine rejected its configuration
    #[error("Invalid argument: {details}")]
    InvalidArgument { details: String },

    /// Destination buffer too small for the engine output
    #[error("Output buffer too small: {details}")]
    OutputTooSmall { details: String },

    /// Engine-internal fault
    #[error("Codec engine failure: {details}")]
    InternalFailure { details: String },

    /// Corrupted compressed input
    #[error("Bad bitstream: {details}")]
    BadBitstream { details: String },

    /// Engine operation not implemented
    #[error("Operation not supported: {details}")]
    Unsupported { details: String },

    /// Engine state reused or freed incorrectly, or an operation issued in the wrong state
    #[error("Invalid state: {details}")]
    InvalidState { details: String },

    /// Arena exhausted or released
    #[error("Out of memory: pool '{pool}' cannot provide {requested} bytes")]
    OutOfMemory { pool: String, requested: usize },

    /// Capability mismatch for the requested descriptor
    #[error("Unsupported codec {descriptor}: {reason}")]
    UnsupportedDescriptor {
        descriptor: String,
        reason: UnsupportedReason,
    },

    /// Factory used before `initialize` or after `deinitialize`
    #[error("Codec factory is not initialized")]
    NotInitialized,

    /// Host codec manager refused the factory
    #[error("Factory registration failed: {reason}")]
    RegistrationFailed { reason: String },

    /// Configuration could not be loaded or is out of range
    #[error("Invalid configuration: {details}")]
    Config { details: String },

    /// Unrecognized engine error code
    #[error("Codec engine returned unknown error code {code}")]
    Failed { code: i32 },
}

impl AdapterError {
    /// Create a new invalid argument error
    pub fn invalid_argument(details: impl Into<String>) -> Self {
        Self::InvalidArgument {
            details: details.into(),
        }
    }

    /// Create a new invalid state error
    pub fn invalid_state(details: impl Into<String>) -> Self {
        Self::InvalidState {
            details: details.into(),
        }
    }

    /// Create a new registration failure
    pub fn registration_failed(reason: impl Into<String>) -> Self {
        Self::RegistrationFailed {
            reason: reason.into(),
        }
    }

    /// Create a new configuration error
    pub fn config(details: impl Into<String>) -> Self {
        Self::Config {
            details: details.into(),
        }
    }

    /// Check if the media pipeline can carry on after this error
    pub fn is_recoverable(&self) -> bool {
        match self {
            // A single frame went wrong; the next one may be fine
            Self::OutputTooSmall { .. }
            | Self::BadBitstream { .. }
            | Self::InternalFailure { .. }
            | Self::Failed { .. } => true,

            Self::InvalidArgument { .. }
            | Self::Unsupported { .. }
            | Self::InvalidState { .. }
            | Self::OutOfMemory { .. }
            | Self::UnsupportedDescriptor { .. }
            | Self::NotInitialized
            | Self::RegistrationFailed { .. }
            | Self::Config { .. } => false,
        }
    }

    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidArgument { .. } | Self::Config { .. } => ErrorCategory::Configuration,

            Self::UnsupportedDescriptor { .. } | Self::Unsupported { .. } => {
                ErrorCategory::Capability
            }

            Self::OutputTooSmall { .. } | Self::BadBitstream { .. } => ErrorCategory::Processing,

            Self::OutOfMemory { .. } => ErrorCategory::Memory,

            Self::InvalidState { .. } | Self::NotInitialized | Self::RegistrationFailed { .. } => {
                ErrorCategory::Lifecycle
            }

            Self::InternalFailure { .. } | Self::Failed { .. } => ErrorCategory::Engine,
        }
    }
}

/// Error category for grouping related errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Configuration and parameter errors
    Configuration,
    /// Descriptor or operation not supported
    Capability,
    /// Per-frame processing errors
    Processing,
    /// Arena exhaustion
    Memory,
    /// Factory/instance lifecycle errors
    Lifecycle,
    /// Codec engine faults
    Engine,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "Configuration"),
            Self::Capability => write!(f, "Capability"),
            Self::Processing => write!(f, "Processing"),
            Self::Memory => write!(f, "Memory"),
            Self::Lifecycle => write!(f, "Lifecycle"),
            Self::Engine => write!(f, "Engine"),
        }
    }
}

/// Map codec-engine error codes onto the adapter taxonomy
impl From<EngineError> for AdapterError {
    fn from(error: EngineError) -> Self {
        match error {
            EngineError::BadArg => Self::InvalidArgument {
                details: "engine rejected one or more arguments".to_string(),
            },
            EngineError::BufferTooSmall => Self::OutputTooSmall {
                details: "engine output does not fit the destination buffer".to_string(),
            },
            EngineError::InternalError => Self::InternalFailure {
                details: "engine detected an internal error".to_string(),
            },
            EngineError::InvalidPacket => Self::BadBitstream {
                details: "compressed data is corrupted".to_string(),
            },
            EngineError::Unimplemented => Self::Unsupported {
                details: "engine request is not implemented".to_string(),
            },
            EngineError::InvalidState => Self::InvalidState {
                details: "engine state is invalid or already freed".to_string(),
            },
            EngineError::AllocFail => Self::InternalFailure {
                details: "engine memory allocation failed".to_string(),
            },
            EngineError::Unknown(code) => Self::Failed { code },
        }
    }
}

/// Convert from I/O errors (configuration files)
impl From<std::io::Error> for AdapterError {
    fn from(error: std::io::Error) -> Self {
        Self::Config {
            details: error.to_string(),
        }
    }
}

/// Convert from TOML parsing errors
impl From<toml::de::Error> for AdapterError {
    fn from(error: toml::de::Error) -> Self {
        Self::Config {
            details: error.to_string(),
        }
    }
}
