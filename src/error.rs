use thiserror::Error;

/// Unified error type for the whole engine.
///
/// The first five variants are the business taxonomy: handlers return them
/// for expected conditions (missing fields, blocked actors, callers without
/// the required role) and the dispatcher folds them into the dispatch result
/// instead of propagating. Everything else is an infrastructure failure and
/// bubbles up to the caller.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid activity: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("not authorized: {0}")]
    Authorization(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unsupported verb: {0}")]
    UnsupportedVerb(String),

    #[error(transparent)]
    Storage(#[from] fjall::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Expected business conditions are reported in the dispatch result, not
    /// propagated. See the dispatcher.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            Error::Validation(_)
                | Error::NotFound(_)
                | Error::Authorization(_)
                | Error::Conflict(_)
                | Error::UnsupportedVerb(_)
        )
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
