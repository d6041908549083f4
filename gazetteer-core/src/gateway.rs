//! Contracts for the external services the pipeline consumes.
//!
//! The search index and the key-value store are collaborators, not part of
//! the pipeline. Adapters live in `gazetteer-data`; in-memory doubles live
//! in [`crate::test_support`].

use thiserror::Error;

use crate::{CanonicalDocument, Identifier};

/// Index field holding the accumulated identifiers.
pub const IDENTIFIERS_FIELD: &str = "identifiers";

/// Documents returned by an identifier search.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SearchResult {
    /// Matching documents.
    pub results: Vec<CanonicalDocument>,
    /// Total number of matches reported by the backend.
    pub size: usize,
}

/// Failure talking to the index backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The request did not finish within the configured timeout.
    #[error("request to {url} timed out after {timeout_secs}s")]
    Timeout {
        /// Requested URL.
        url: String,
        /// Configured timeout.
        timeout_secs: u64,
    },
    /// The backend answered with an error status.
    #[error("request to {url} failed with HTTP {status}: {message}")]
    Http {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Error detail.
        message: String,
    },
    /// The backend could not be reached.
    #[error("request to {url} failed: {message}")]
    Network {
        /// Requested URL.
        url: String,
        /// Error detail.
        message: String,
    },
    /// The response body could not be decoded.
    #[error("failed to decode response from {url}: {message}")]
    Decode {
        /// Requested URL.
        url: String,
        /// Error detail.
        message: String,
    },
    /// The backend is unavailable for another reason.
    #[error("index backend unavailable: {message}")]
    Unavailable {
        /// Error detail.
        message: String,
    },
}

/// The search index as seen by the reconciliation driver.
pub trait IndexGateway {
    /// Find documents whose `field` contains any of `ids`.
    fn search_by_identifiers(
        &self,
        field: &str,
        ids: &[Identifier],
    ) -> Result<SearchResult, GatewayError>;

    /// Fetch documents by key, including those indexed but not committed.
    fn get_by_ids(&self, ids: &[String]) -> Result<Vec<CanonicalDocument>, GatewayError>;

    /// Submit one page of documents.
    fn index(&self, documents: &[CanonicalDocument]) -> Result<(), GatewayError>;

    /// Make submitted documents visible to readers.
    fn commit(&self) -> Result<(), GatewayError>;
}

/// Failure reading or writing the key-value store.
#[derive(Debug, Error)]
#[error("key-value store operation on {key:?} failed")]
pub struct KvError {
    /// Key being read or written.
    pub key: String,
    /// Backend failure.
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

/// String-keyed store of JSON blobs.
pub trait KeyValueStore {
    /// Store `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> Result<(), KvError>;

    /// Read the value stored under `key`.
    fn get(&self, key: &str) -> Result<Option<String>, KvError>;
}
