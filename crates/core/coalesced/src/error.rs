use std::fmt;

#[derive(Clone, PartialEq, Eq, Debug, Hash)]
/// Failure while producing a caller's own copy of a successful value.
pub struct ReplicateError {
    reason: String,
}

impl ReplicateError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl fmt::Display for ReplicateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Failed to replicate value: {}", self.reason)
    }
}

impl std::error::Error for ReplicateError {}

#[derive(Clone, PartialEq, Eq, Debug)]
/// Coalescion service error.
pub enum Error<E> {
    /// The operation itself failed, every subscriber of the epoch receives a copy of this
    Operation(E),
    /// The operation succeeded but this caller's copy of the value could not be made
    Replicate(ReplicateError),
    /// The task driving the operation went away without publishing an outcome
    RecvError,
    /// The operation panicked
    Panicked,
    /// Reached the `max_concurrent` amount of operations running at once
    MaxConcurrent,
    /// No tokio runtime was available to drive a new operation
    NoRuntime,
}

impl<E> Error<E> {
    /// The operation's own error, if that is what this is
    pub fn operation(&self) -> Option<&E> {
        match self {
            Error::Operation(err) => Some(err),
            _ => None,
        }
    }

    pub fn into_operation(self) -> Option<E> {
        match self {
            Error::Operation(err) => Some(err),
            _ => None,
        }
    }
}

impl<E: fmt::Display> fmt::Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Operation(err) => write!(f, "Operation failed: {err}"),
            Error::Replicate(err) => err.fmt(f),
            Error::RecvError => write!(f, "Unable to receive data from the channel"),
            Error::Panicked => write!(f, "Operation panicked before producing a value"),
            Error::MaxConcurrent => write!(f, "Max number of tasks running at once"),
            Error::NoRuntime => write!(f, "No tokio runtime to drive the operation"),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for Error<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Operation(err) => Some(err),
            Error::Replicate(err) => Some(err),
            _ => None,
        }
    }
}
