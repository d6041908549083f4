//! Source parsers and service adapters for the gazetteer import pipeline.
//!
//! Responsibilities:
//! - Stream the transit register (NaPTAN), OpenStreetMap extracts, the
//!   OxPoints graph and the library feed into [`CandidateRecord`]s.
//! - Resolve derived locations and shapes over the OxPoints graph.
//! - Provide the Solr [`IndexGateway`] and SQLite [`KeyValueStore`].
//!
//! Boundaries:
//! - Merge and reconciliation rules live in `gazetteer-core`.
//! - Parsers read from `Read` values; opening files is the caller's job.
//!
//! Invariants:
//! - Every parser reads in bounded chunks and honours a [`CancelToken`].
//! - No global mutable state.
//!
//! [`CandidateRecord`]: gazetteer_core::CandidateRecord
//! [`IndexGateway`]: gazetteer_core::IndexGateway
//! [`KeyValueStore`]: gazetteer_core::KeyValueStore

pub mod descendants;
pub mod kv;
pub mod library;
pub mod naptan;
pub mod osm;
pub mod oxpoints;
pub mod rdf;
pub mod sink;
pub mod solr;
pub mod source;
mod xml;

pub use descendants::{DescendantsError, DescendantsImporter, DescendantsSummary};
pub use kv::{KvOpenError, SqliteKeyValueStore};
pub use library::{LibraryParseError, LibraryParser, LibrarySummary};
pub use naptan::{NaptanDataset, NaptanParseError, NaptanParser, NaptanSummary};
pub use osm::{OsmParseError, OsmParser, OsmSummary};
pub use oxpoints::{OxPointsError, OxPointsImporter, OxPointsSummary};
pub use rdf::{GraphLoadError, GraphResolver, RdfFormat, TripleGraph};
pub use sink::{RecordSink, SinkError};
pub use solr::{SolrBuildError, SolrConfig, SolrIndexGateway};
pub use source::{CancelToken, ChunkSize, Compression, SourceError, SourceReader, with_decoded};
