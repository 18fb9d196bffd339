use finman_ai::ExtractError;
use finman_store::StoreError;
use thiserror::Error;

use crate::reply::Reply;

/// Turn-level failures. None of them advance the conversation's state.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractError),

    #[error("could not persist entry: {0}")]
    Persistence(#[from] StoreError),

    #[error("conversation has no authenticated identity")]
    Precondition,

    #[error("session store failure: {0}")]
    Session(String),
}

impl ResolveError {
    /// The message the user sees for this failure.
    pub fn reply(&self) -> Reply {
        match self {
            Self::Extraction(_) => Reply::ExtractionFailed,
            Self::Persistence(_) => Reply::SaveFailed,
            Self::Precondition => Reply::NotAuthenticated,
            Self::Session(_) => Reply::Internal,
        }
    }
}
