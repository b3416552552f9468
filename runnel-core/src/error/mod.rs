use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Every failure a runnable can surface.
///
/// Cancellation and timeout share the `is_cancellation` predicate: a timeout
/// is a cancellation triggered by a deadline.
#[derive(Debug, Clone, Error)]
pub enum RunError {
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error("run was cancelled")]
    Cancelled,
    #[error("run timed out after {}ms", .after.as_millis())]
    Timeout { after: Duration },
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Merge(#[from] MergeError),
    #[error("worker task failed: {0}")]
    TaskJoin(String),
}

impl RunError {
    pub fn execution(cause: impl Into<BoxError>) -> Self {
        RunError::Execution(ExecutionError::new(cause))
    }

    /// Recovers a `RunError` that travelled through user code as a boxed error,
    /// wrapping anything else as an execution failure.
    pub fn from_boxed(err: BoxError) -> Self {
        match err.downcast::<RunError>() {
            Ok(run_error) => *run_error,
            Err(other) => RunError::Execution(ExecutionError::from_boxed(other)),
        }
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self, RunError::Cancelled | RunError::Timeout { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, RunError::Timeout { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RunError::Execution(_) => "execution",
            RunError::Cancelled => "cancelled",
            RunError::Timeout { .. } => "timeout",
            RunError::Aggregate(_) => "aggregate",
            RunError::Configuration(_) => "configuration",
            RunError::Merge(_) => "merge",
            RunError::TaskJoin(_) => "task_join",
        }
    }

    /// The user error behind an execution failure, unmodified.
    pub fn root_cause(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            RunError::Execution(e) => Some(e.cause()),
            _ => None,
        }
    }
}

/// Wraps an error raised by user code inside a runnable.
#[derive(Debug, Clone)]
pub struct ExecutionError {
    cause: Arc<dyn std::error::Error + Send + Sync + 'static>,
}

impl ExecutionError {
    pub fn new(cause: impl Into<BoxError>) -> Self {
        Self::from_boxed(cause.into())
    }

    pub fn from_boxed(cause: BoxError) -> Self {
        Self {
            cause: Arc::from(cause),
        }
    }

    pub fn cause(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self.cause.as_ref()
    }

    pub fn downcast_ref<T: std::error::Error + 'static>(&self) -> Option<&T> {
        self.cause.downcast_ref::<T>()
    }
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.cause)
    }
}

impl std::error::Error for ExecutionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.cause.as_ref())
    }
}

/// Raised when every alternative of a fallback chain failed. Errors are kept
/// in attempt order.
#[derive(Debug, Clone)]
pub struct AggregateError {
    errors: Vec<RunError>,
}

impl AggregateError {
    pub fn new(errors: Vec<RunError>) -> Self {
        Self { errors }
    }

    pub fn errors(&self) -> &[RunError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<RunError> {
        self.errors
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "all {} alternatives failed", self.errors.len())?;
        for (i, e) in self.errors.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{sep}{e}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("recursion limit reached")]
    RecursionLimit,
    #[error("a sequence needs at least one step")]
    EmptySequence,
    #[error("invalid input for {runnable}: {message}")]
    InvalidInput { runnable: String, message: String },
    #[error("invalid option `{field}`: {message}")]
    InvalidOption { field: String, message: String },
    #[error("batch got {inputs} inputs but {configs} configs")]
    BatchConfigMismatch { inputs: usize, configs: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot merge {left} chunk with {right} chunk")]
pub struct MergeError {
    pub left: &'static str,
    pub right: &'static str,
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to parse as JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to parse as YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("unable to auto-detect config format (neither valid JSON nor valid YAML)")]
    UnknownFormat,
    #[error(transparent)]
    Invalid(#[from] ConfigurationError),
}
