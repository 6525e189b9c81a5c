use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Failure of a loader, action or lazy module, as stored in a
/// [`Snapshot`](crate::Snapshot). Cheap to clone, so the same error can be
/// handed to every subscriber.
#[derive(Debug, Clone)]
pub struct TaskError(pub(crate) Arc<anyhow::Error>);

impl TaskError {
    pub fn new(err: impl Into<anyhow::Error>) -> Self {
        Self(Arc::new(err.into()))
    }

    pub fn inner(&self) -> &anyhow::Error {
        &self.0
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            write!(f, "{:#}", self.0)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl std::error::Error for TaskError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

impl From<anyhow::Error> for TaskError {
    fn from(e: anyhow::Error) -> Self {
        TaskError(Arc::new(e))
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PatternError {
    #[error("Pattern '{0}': catch-all segment must be the last segment")]
    CatchAllNotLast(String),

    #[error("Pattern '{0}': parameter segment has no name")]
    EmptyName(String),

    #[error("Pattern '{0}': invalid parameter name '{1}'")]
    InvalidName(String, String),

    #[error("Pattern '{0}': parameter '{1}' appears more than once")]
    DuplicateName(String, String),

    #[error("Pattern '{0}': {1}")]
    Regex(String, String),
}

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("Couldn't compile route pattern.\n{0}")]
    Pattern(#[from] PatternError),

    #[error("Couldn't parse navigation target '{0}'.\n{1}")]
    Url(String, url::ParseError),

    #[error("Invalid base url '{0}'.\n{1}")]
    BaseUrl(String, url::ParseError),
}
