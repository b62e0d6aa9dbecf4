use thiserror::Error;

pub const MALICIOUS_COMMAND_ERROR: &str = "Invalid or malicious command detected";

/// Why `execute` returned without a new execution record.
#[derive(Error, Debug)]
pub enum ExecuteError {
    #[error("Task not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    ValidationRejected(String),

    #[error("Persistence error: {0:#}")]
    Persistence(#[source] anyhow::Error),
}

/// Errors from the task CRUD layer.
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Task not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    ValidationRejected(String),

    #[error("Persistence error: {0:#}")]
    Persistence(#[from] anyhow::Error),
}
