//! The establishment lookup seam.
//!
//! Implemented over HTTP by `ratelink-client`; tests plug in fakes.

use async_trait::async_trait;
use thiserror::Error;

use crate::candidate::Candidate;

/// What one lookup produced.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupResponse {
    Establishments(Vec<Candidate>),
    /// The service answered but the body could not be read as an establishment list.
    Unparsable(String),
}

impl LookupResponse {
    /// Candidates carried by the response; an unparsable body counts as none.
    pub fn into_candidates(self) -> Vec<Candidate> {
        match self {
            Self::Establishments(candidates) => candidates,
            Self::Unparsable(_) => Vec::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum LookupError {
    /// The request itself failed (network, auth, rate limiting, server error).
    #[error("lookup transport failed: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl LookupError {
    pub fn transport(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Transport(Box::new(err))
    }
}

/// Search the ratings service for establishments by name and postcode.
#[async_trait]
pub trait Lookup: Send + Sync {
    async fn lookup(&self, name: &str, postcode: &str) -> Result<LookupResponse, LookupError>;
}
