//! Error types emitted by the gazetteer CLI.
//!
//! Keep this error type reasonably small, as every command helper returns
//! `Result<_, CliError>`.

use std::sync::Arc;

use camino::Utf8PathBuf;
use gazetteer_core::{ReconcileError, TaxonomyError};
use gazetteer_data::{
    DescendantsError, GraphLoadError, KvOpenError, LibraryParseError, NaptanParseError,
    OsmParseError, OxPointsError, SolrBuildError, SourceError,
};
use thiserror::Error;

/// Errors emitted by the gazetteer CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// Provided arguments failed Clap validation.
    #[error(transparent)]
    ArgumentParsing(#[from] clap::Error),
    /// Configuration layering failed (files, env, CLI).
    #[error("failed to load configuration: {0}")]
    Configuration(#[from] Arc<ortho_config::OrthoError>),
    /// A required option is missing after configuration merging.
    #[error("missing {field} (set --{field} or {env})")]
    MissingArgument {
        field: &'static str,
        env: &'static str,
    },
    /// A referenced input path does not exist on disk.
    #[error("{field} path {path:?} does not exist")]
    MissingSourceFile {
        field: &'static str,
        path: Utf8PathBuf,
    },
    /// A referenced input path exists but is not a file.
    #[error("{field} path {path:?} exists but is not a file")]
    SourcePathNotFile {
        field: &'static str,
        path: Utf8PathBuf,
    },
    /// A referenced input path could not be inspected.
    #[error("failed to inspect {field} path {path:?}: {source}")]
    InspectSourcePath {
        field: &'static str,
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The directory meant to hold the key-value store does not exist.
    #[error("{field} directory for {path:?} does not exist")]
    MissingStoreDirectory {
        field: &'static str,
        path: Utf8PathBuf,
    },
    /// Opening a source file failed.
    #[error("failed to open {path:?}: {source}")]
    OpenSource {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Decompressing or unpacking a source failed.
    #[error(transparent)]
    Source(#[from] SourceError),
    /// The taxonomy override could not be read.
    #[error("failed to read taxonomy {path:?}: {source}")]
    ReadTaxonomy {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The taxonomy could not be decoded.
    #[error(transparent)]
    Taxonomy(#[from] TaxonomyError),
    /// An RDF graph could not be loaded.
    #[error("failed to load graph {path:?}: {source}")]
    LoadGraph {
        path: Utf8PathBuf,
        #[source]
        source: GraphLoadError,
    },
    /// The Solr gateway could not be built.
    #[error("failed to build Solr gateway for {url:?}: {source}")]
    BuildGateway {
        url: String,
        #[source]
        source: SolrBuildError,
    },
    /// NaPTAN parsing failed.
    #[error("failed to import NaPTAN data: {0}")]
    Naptan(#[from] NaptanParseError),
    /// OSM parsing failed.
    #[error("failed to import OSM data: {0}")]
    Osm(#[from] OsmParseError),
    /// The OxPoints import failed.
    #[error("failed to import OxPoints data: {0}")]
    OxPoints(#[from] OxPointsError),
    /// The library feed import failed.
    #[error("failed to import library data: {0}")]
    Library(#[from] LibraryParseError),
    /// The run could not be completed against the index.
    #[error("import run failed: {0}")]
    Reconcile(#[from] ReconcileError),
    /// The key-value store could not be opened.
    #[error(transparent)]
    OpenStore(#[from] KvOpenError),
    /// Precomputing descendants failed.
    #[error("failed to store descendants: {0}")]
    Descendants(#[from] DescendantsError),
    /// Installing the log subscriber failed.
    #[error("failed to initialise logging: {0}")]
    Logging(#[source] Box<dyn std::error::Error + Send + Sync>),
    /// Serialising the run report failed.
    #[error("failed to serialise report: {0}")]
    SerialiseReport(#[source] serde_json::Error),
    /// Writing the run report failed.
    #[error("failed to write report: {0}")]
    WriteReport(#[source] std::io::Error),
}
