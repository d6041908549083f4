//! Core domain types for the gazetteer import pipeline.
//!
//! Sources emit [`CandidateRecord`]s. The [`ReconciliationDriver`] looks
//! each one up through an [`IndexGateway`], folds it into the canonical
//! store with the [`DocumentMerger`] and submits the result in pages.
//! Nothing in this crate performs I/O of its own; adapters for real
//! services live in `gazetteer-data`.

pub mod document;
pub mod gateway;
pub mod identifier;
pub mod merge;
pub mod reconcile;
pub mod record;
pub mod taxonomy;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use document::{CanonicalDocument, Precedence, format_lat_lon, parse_lat_lon};
pub use gateway::{
    GatewayError, IDENTIFIERS_FIELD, IndexGateway, KeyValueStore, KvError, SearchResult,
};
pub use identifier::{Identifier, IdentifierError};
pub use merge::{ConflictError, DocumentMerger, MergeAction, MergeOutcome};
pub use reconcile::{
    DEFAULT_PAGE_SIZE, ImportReport, ImportSettings, LookupFailurePolicy, ReconcileError,
    ReconciliationDriver, RecordOutcome, RetryPolicy,
};
pub use record::{Attribute, CandidateRecord};
pub use taxonomy::{Taxonomy, TaxonomyError, TaxonomyNode};
