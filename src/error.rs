//! Error types for the chaos controller.
//!
//! This module provides a unified error type [`ChaosError`] for all controller
//! operations, along with a convenient [`Result`] type alias.
//!
//! # Error Categories
//!
//! - **Specification**: Malformed disruption documents or invalid fields
//! - **Selection**: Cluster unreachable or selector cannot be resolved
//! - **Target health**: A target is absent or not eligible for a fault
//! - **Injection / Cleanup**: The injector failed to apply or remove a fault
//! - **Metrics**: The sink could not record a sample
//! - **Configuration**: Invalid settings or unreadable config files
//!
//! Only selection errors are fatal to a disruption. Everything else is absorbed
//! into per-target records by the lifecycle engine.
//!
//! # Example
//!
//! ```rust
//! use chaos_controller::error::ChaosError;
//!
//! let err = ChaosError::TargetNotFound("default/web-0".into());
//! assert!(err.is_absent());
//! assert!(!err.is_retryable());
//! ```

use std::io;
use thiserror::Error;

/// Main error type for chaos controller operations.
#[derive(Error, Debug)]
pub enum ChaosError {
    // Specification errors
    #[error("Invalid disruption spec: {field}: {reason}")]
    InvalidSpec { field: String, reason: String },

    // Selection errors
    #[error("Target selection failed: {0}")]
    Selection(String),

    #[error("No matching targets for selector {0}")]
    NoMatchingTargets(String),

    #[error("Cluster unreachable: {0}")]
    ClusterUnavailable(String),

    // Target health errors
    #[error("Target not found: {0}")]
    TargetNotFound(String),

    #[error("Target {target} is not healthy: {reason}")]
    TargetUnhealthy { target: String, reason: String },

    // Injector errors
    #[error("Injection failed on {target}: {reason}")]
    Injection { target: String, reason: String },

    #[error("Cleanup failed on {target}: {reason}")]
    Cleanup { target: String, reason: String },

    // Metrics errors
    #[error("Metrics sink error: {0}")]
    Metrics(String),

    // Registry errors
    #[error("Disruption not found: {0}")]
    DisruptionNotFound(String),

    #[error("Disruption already exists: {0}")]
    DisruptionExists(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    // I/O and serialization
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ChaosError {
    /// Whether the target named in the error no longer exists.
    pub fn is_absent(&self) -> bool {
        matches!(self, ChaosError::TargetNotFound(_))
    }

    /// Whether the target exists but is not eligible right now.
    pub fn is_unhealthy(&self) -> bool {
        matches!(self, ChaosError::TargetUnhealthy { .. })
    }

    /// Check if a later reconcile tick may succeed where this one failed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ChaosError::ClusterUnavailable(_)
                | ChaosError::TargetUnhealthy { .. }
                | ChaosError::Injection { .. }
                | ChaosError::Cleanup { .. }
                | ChaosError::Metrics(_)
                | ChaosError::Io(_)
        )
    }

    /// Short machine-readable label, used as a metric tag.
    pub fn kind(&self) -> &'static str {
        match self {
            ChaosError::InvalidSpec { .. } => "invalid_spec",
            ChaosError::Selection(_) => "selection",
            ChaosError::NoMatchingTargets(_) => "no_matching_targets",
            ChaosError::ClusterUnavailable(_) => "cluster_unavailable",
            ChaosError::TargetNotFound(_) => "target_not_found",
            ChaosError::TargetUnhealthy { .. } => "target_unhealthy",
            ChaosError::Injection { .. } => "injection",
            ChaosError::Cleanup { .. } => "cleanup",
            ChaosError::Metrics(_) => "metrics",
            ChaosError::DisruptionNotFound(_) => "disruption_not_found",
            ChaosError::DisruptionExists(_) => "disruption_exists",
            ChaosError::Config(_) | ChaosError::InvalidConfig { .. } => "config",
            ChaosError::Io(_) => "io",
            ChaosError::Yaml(_) | ChaosError::Json(_) => "serialization",
            ChaosError::Internal(_) => "internal",
        }
    }

    pub(crate) fn invalid_spec(field: &str, reason: impl Into<String>) -> Self {
        ChaosError::InvalidSpec {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_config(field: &str, reason: impl Into<String>) -> Self {
        ChaosError::InvalidConfig {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for chaos controller operations.
pub type Result<T> = std::result::Result<T, ChaosError>;
