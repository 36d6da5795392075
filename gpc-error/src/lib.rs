//! Unified error handling for gpucool
//!
//! This crate provides a single error type used across all gpucool components.
//! It uses thiserror for ergonomic error definitions with proper Display and Error trait impls.

use std::io;
use std::path::PathBuf;

/// Result type alias using GpucoolError
pub type Result<T> = std::result::Result<T, GpucoolError>;

/// Unified error type for all gpucool operations
#[derive(thiserror::Error, Debug)]
pub enum GpucoolError {
    // ============================================================================
    // I/O and File System Errors
    // ============================================================================
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: io::Error,
    },

    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: io::Error,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    // ============================================================================
    // Hardware Access Errors
    // ============================================================================
    #[error("Failed to read temperature from {path}: {reason}")]
    TemperatureRead {
        path: PathBuf,
        reason: String,
    },

    #[error("Failed to read PWM from {path}: {reason}")]
    PwmRead {
        path: PathBuf,
        reason: String,
    },

    #[error("Failed to write PWM to {path}: {reason}")]
    PwmWrite {
        path: PathBuf,
        reason: String,
    },

    #[error("Failed to parse value from {path}: {reason}")]
    ValueParse {
        path: PathBuf,
        reason: String,
    },

    #[error("Hardware not found: {0}")]
    HardwareNotFound(String),

    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidConfig {
        field: String,
        reason: String,
    },

    #[error("Invalid option '{option}' in section '{section}': {reason}")]
    InvalidOption {
        section: String,
        option: String,
        reason: String,
    },

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Generic(String),
}

impl GpucoolError {
    /// Create a generic error from a string
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic(msg.into())
    }

    /// Create a config error from a string
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid-config error for a named field
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// Allow converting from String to GpucoolError
impl From<String> for GpucoolError {
    fn from(s: String) -> Self {
        Self::Generic(s)
    }
}

// Allow converting from &str to GpucoolError
impl From<&str> for GpucoolError {
    fn from(s: &str) -> Self {
        Self::Generic(s.to_string())
    }
}
