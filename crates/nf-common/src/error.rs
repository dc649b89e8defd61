//! Error taxonomy shared across the worker.
//!
//! Every fallible operation in the pipeline ultimately reports one of these
//! variants so the supervisor can apply a single disposition table
//! without re-deriving it from string matching on error messages.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("failed to parse envelope: {0}")]
    ParseError(String),

    #[error("envelope failed validation: {0}")]
    ValidationError(String),

    #[error("no processor registered for type '{0}', known types: {1:?}")]
    UnknownProcessor(String, Vec<String>),

    #[error("processor rejected envelope: {0}")]
    ProcessorValidation(String),

    #[error("processor execution failed (trace={trace_id}): {source}")]
    ProcessorExecution {
        trace_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("database connection error: {0}")]
    DbConnection(String),

    #[error("database query error: {0}")]
    DbQuery(String),

    #[error("database transaction error: {0}")]
    DbTransaction(String),

    #[error("database permission denied (RLS): {0}")]
    DbPermission(String),

    #[error("pub/sub connection error: {0}")]
    PubSubConnection(String),

    #[error("pub/sub publish error: {0}")]
    PubSubPublish(String),

    #[error("operation timed out: {0}")]
    Timeout(String),
}

impl NotifyError {
    /// Whether this error represents a transient condition worth an in-task
    /// retry before falling back to DLQ.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            NotifyError::DbConnection(_)
                | NotifyError::PubSubConnection(_)
                | NotifyError::Timeout(_)
        )
    }

    /// Whether this error is terminal and non-replayable: DLQ + ack, no
    /// broker redelivery.
    pub fn is_non_replayable(&self) -> bool {
        matches!(
            self,
            NotifyError::ParseError(_)
                | NotifyError::ValidationError(_)
                | NotifyError::UnknownProcessor(_, _)
                | NotifyError::ProcessorValidation(_)
        )
    }

    /// A short, stable name for logging and DLQ error records.
    pub fn name(&self) -> &'static str {
        match self {
            NotifyError::ParseError(_) => "ParseError",
            NotifyError::ValidationError(_) => "ValidationError",
            NotifyError::UnknownProcessor(_, _) => "UnknownProcessor",
            NotifyError::ProcessorValidation(_) => "ProcessorValidation",
            NotifyError::ProcessorExecution { .. } => "ProcessorExecution",
            NotifyError::DbConnection(_) => "DbConnection",
            NotifyError::DbQuery(_) => "DbQuery",
            NotifyError::DbTransaction(_) => "DbTransaction",
            NotifyError::DbPermission(_) => "DbPermission",
            NotifyError::PubSubConnection(_) => "PubSubConnection",
            NotifyError::PubSubPublish(_) => "PubSubPublish",
            NotifyError::Timeout(_) => "Timeout",
        }
    }
}

pub type Result<T> = std::result::Result<T, NotifyError>;
