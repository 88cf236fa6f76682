//! Error taxonomy shared by the registry adapters, metric functions,
//! coordinator and entry manager.

/// Errors raised while producing or configuring statistics.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StatsError {
    /// The registry source has not finished starting; the cycle is skipped.
    #[error("registry source not ready")]
    NotReady,
    /// One metric function failed; only that metric is omitted.
    #[error("metric {metric} failed: {reason}")]
    MetricFailure { metric: String, reason: String },
    /// The registry source itself failed; the whole cycle is aborted.
    #[error("registry source failure: {0}")]
    SourceFailure(String),
    /// A configuration change was rejected; the previous options stay active.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),
    /// The expensive pass failed outside per-metric isolation.
    #[error("worker failure: {0}")]
    Worker(String),
    #[error("coordinator is shut down")]
    Shutdown,
}

impl StatsError {
    pub fn source_failure(err: impl std::fmt::Display) -> Self {
        StatsError::SourceFailure(err.to_string())
    }

    pub fn config_invalid(msg: impl Into<String>) -> Self {
        StatsError::ConfigInvalid(msg.into())
    }
}

/// Errors from the configured-entry registry.
#[derive(Debug, thiserror::Error)]
pub enum EntryError {
    #[error("entry not found: {0}")]
    NotFound(String),
    #[error("an entry with unique id {0} is already configured")]
    AlreadyConfigured(String),
    #[error("entry setup failed: {0}")]
    SetupFailed(String),
    #[error(transparent)]
    Stats(#[from] StatsError),
}
