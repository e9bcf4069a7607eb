//! Error types for the chaos operator

use chaos_controller::ChaosError;
use thiserror::Error;

/// Main error type for the operator
#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("CRD not installed. Please install the Disruption CRD first.")]
    CrdNotInstalled,

    #[error(transparent)]
    Chaos(#[from] ChaosError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Short label used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Kube(_) => "kube",
            Error::CrdNotInstalled => "crd_not_installed",
            Error::Chaos(e) => e.kind(),
            Error::Serialization(_) => "serialization",
        }
    }
}
