//! Unified error handling for the site and climb core.
//!
//! Validation failures are raised before any store call, so an `InvalidInput`
//! never leaves a partial mutation behind. Store failures carry the step that
//! failed and the ids involved so the caller can decide whether to retry.

use std::fmt;

use thiserror::Error;

use crate::{FlightId, SiteId};

/// Error reported by an external collaborator (store or remote directory).
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct StoreError {
    pub message: String,
}

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for StoreError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for StoreError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Step of a multi-call site operation, used to report where it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStep {
    QueryLocal,
    LoadSite,
    LoadLaunches,
    LoadTrack,
    Insert,
    Update,
    Reassign,
    Verify,
    Delete,
}

impl fmt::Display for MergeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MergeStep::QueryLocal => "query local sites",
            MergeStep::LoadSite => "load site",
            MergeStep::LoadLaunches => "load launches",
            MergeStep::LoadTrack => "load track",
            MergeStep::Insert => "insert site",
            MergeStep::Update => "update site",
            MergeStep::Reassign => "reassign launches",
            MergeStep::Verify => "verify reassignment",
            MergeStep::Delete => "delete site",
        };
        f.write_str(name)
    }
}

/// Unified error type for core operations.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    /// Bad coordinates, empty name, identical merge source/target.
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    /// A collaborator call failed part-way through an operation.
    #[error("Store failure during {step} (sites {site_ids:?}, launches {launch_ids:?}): {source}")]
    StoreFailure {
        step: MergeStep,
        site_ids: Vec<SiteId>,
        launch_ids: Vec<FlightId>,
        #[source]
        source: StoreError,
    },

    /// Launch/site references disagree with what the store reports.
    #[error("Inconsistent state (sites {site_ids:?}): {message}")]
    InconsistentState {
        message: String,
        site_ids: Vec<SiteId>,
    },

    /// Configuration failed to parse or validate.
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl CoreError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        CoreError::InvalidInput {
            message: message.into(),
        }
    }

    pub fn store(step: MergeStep, site_ids: Vec<SiteId>, source: StoreError) -> Self {
        CoreError::StoreFailure {
            step,
            site_ids,
            launch_ids: Vec::new(),
            source,
        }
    }

    /// True when the error was raised before anything was written.
    pub fn is_validation(&self) -> bool {
        matches!(self, CoreError::InvalidInput { .. } | CoreError::Config { .. })
    }
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Extension trait for converting Option to CoreError.
pub trait OptionExt<T> {
    /// Convert Option to Result with an invalid input error.
    fn ok_or_invalid(self, message: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_invalid(self, message: &str) -> Result<T> {
        self.ok_or_else(|| CoreError::invalid_input(message))
    }
}

/// Extension trait for attaching step and ids to a collaborator error.
pub trait StoreResultExt<T> {
    fn at_step(self, step: MergeStep, site_ids: &[SiteId]) -> Result<T>;
}

impl<T> StoreResultExt<T> for std::result::Result<T, StoreError> {
    fn at_step(self, step: MergeStep, site_ids: &[SiteId]) -> Result<T> {
        self.map_err(|e| CoreError::store(step, site_ids.to_vec(), e))
    }
}
