//! Facade crate for the gazetteer import pipeline.
//!
//! This crate re-exports the core domain types and, behind the `data`
//! feature, the source parsers and service adapters.

#![forbid(unsafe_code)]

pub use gazetteer_core::{
    Attribute, CandidateRecord, CanonicalDocument, ConflictError, DocumentMerger, GatewayError,
    Identifier, IdentifierError, ImportReport, ImportSettings, IndexGateway, KeyValueStore,
    KvError, LookupFailurePolicy, MergeAction, MergeOutcome, Precedence, ReconcileError,
    ReconciliationDriver, RecordOutcome, RetryPolicy, SearchResult, Taxonomy, TaxonomyError,
};

#[cfg(feature = "data")]
pub use gazetteer_data::{
    DescendantsImporter, GraphResolver, LibraryParser, NaptanParser, OsmParser, OxPointsImporter,
    RdfFormat, RecordSink, SolrConfig, SolrIndexGateway, SqliteKeyValueStore, TripleGraph,
};

#[cfg(feature = "test-support")]
pub use gazetteer_core::test_support;
