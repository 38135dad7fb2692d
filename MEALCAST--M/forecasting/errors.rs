use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by dataset preparation, training, artifact handling and inference.
#[derive(Debug, Error)]
pub enum ForecastError {
    /// Dataset missing, unreadable or holding malformed cells.
    #[error("cannot load dataset {path:?}: {reason}")]
    DataLoad {
        /// Dataset location.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },
    /// Required columns absent after header normalization.
    #[error("dataset is missing required columns: {}", missing.join(", "))]
    Schema {
        /// Canonical names of the absent columns, in schema order.
        missing: Vec<String>,
    },
    /// Model or feature-schema file absent at service start.
    #[error("artifact {path:?} not found; run `trn train` first")]
    ArtifactMissing {
        /// Expected artifact location.
        path: PathBuf,
    },
    /// Artifact present but unreadable or inconsistent with its siblings.
    #[error("artifact {path:?} is unusable: {reason}")]
    ArtifactCorrupt {
        /// Offending artifact.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },
    /// Request field missing or out of domain.
    #[error("invalid field `{field}`: {reason}")]
    InvalidInput {
        /// Request field name.
        field: &'static str,
        /// What went wrong.
        reason: String,
    },
    /// Failure inside a regressor call or the schema projection.
    #[error("inference failed: {0}")]
    Inference(String),
    /// Training failed to fit or evaluate a model.
    #[error("training failed for {meal}: {reason}")]
    Training {
        /// Meal target being trained.
        meal: String,
        /// What went wrong.
        reason: String,
    },
    /// Writing or publishing artifacts failed.
    #[error("cannot persist artifacts to {path:?}: {source}")]
    Persist {
        /// Directory or file being written.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: std::io::Error,
    },
}

impl ForecastError {
    pub(crate) fn data_load(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::DataLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::ArtifactCorrupt {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field,
            reason: reason.into(),
        }
    }

    pub(crate) fn persist(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Persist { path, source }
    }

    /// True for errors caused by the caller's request rather than the service.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidInput { .. } | Self::Inference(_))
    }
}

/// Result alias used across the crate.
pub type ForecastResult<T> = Result<T, ForecastError>;
