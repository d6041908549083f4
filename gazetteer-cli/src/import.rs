//! Import commands: stream one source through the reconciliation driver.

use std::io::Write;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use gazetteer_core::{
    DEFAULT_PAGE_SIZE, DocumentMerger, ImportReport, ImportSettings, IndexGateway, Precedence,
    ReconciliationDriver, Taxonomy,
};
use gazetteer_data::{
    LibraryParser, NaptanParser, OsmParser, OxPointsImporter, SolrConfig, SolrIndexGateway,
};
use log::info;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};

use crate::inputs::{decode_source, is_pbf, load_graph, open_source, require_existing, source_name};
use crate::{
    ARG_AREAS, ARG_FILE, ARG_GRAPH, ARG_PAGE_SIZE, ARG_PRECEDENCE, ARG_SHAPES, ARG_SOLR_CORE,
    ARG_SOLR_URL, ARG_TAXONOMY, CliError, ENV_LIBRARY_FILE, ENV_NAPTAN_AREAS, ENV_NAPTAN_FILE,
    ENV_OSM_FILE, ENV_OXPOINTS_FILE, fs, write_report,
};

/// CLI arguments for the `naptan` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    name = "naptan",
    long_about = "Stream a NaPTAN register, as plain XML or the zip bundle, \
                 into the index. Only stop areas and stop points whose codes \
                 start with one of the configured area prefixes are kept.",
    about = "Import NaPTAN stop areas and stop points"
)]
#[ortho_config(prefix = "GAZETTEER")]
pub(crate) struct NaptanArgs {
    /// Path to the NaPTAN XML file or zip archive.
    #[arg(long = ARG_FILE, value_name = "path")]
    #[serde(default)]
    pub(crate) file: Option<Utf8PathBuf>,
    /// Three-character area prefixes to keep, comma separated.
    #[arg(long = ARG_AREAS, value_name = "codes", value_delimiter = ',')]
    #[serde(default)]
    pub(crate) areas: Option<Vec<String>>,
    /// Solr root URL.
    #[arg(long = ARG_SOLR_URL, value_name = "url")]
    #[serde(default)]
    pub(crate) solr_url: Option<String>,
    /// Solr core holding the places documents.
    #[arg(long = ARG_SOLR_CORE, value_name = "name")]
    #[serde(default)]
    pub(crate) solr_core: Option<String>,
    /// Precedence of this source against others.
    #[arg(long = ARG_PRECEDENCE, value_name = "n")]
    #[serde(default)]
    pub(crate) precedence: Option<i32>,
    /// Documents per index submission.
    #[arg(long = ARG_PAGE_SIZE, value_name = "n")]
    #[serde(default)]
    pub(crate) page_size: Option<usize>,
    /// JSON taxonomy replacing the built-in one.
    #[arg(long = ARG_TAXONOMY, value_name = "path")]
    #[serde(default)]
    pub(crate) taxonomy: Option<Utf8PathBuf>,
}

/// CLI arguments for the `osm` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    name = "osm",
    long_about = "Stream an OpenStreetMap extract into the index. Files \
                 ending in .pbf are decoded as PBF; anything else is read \
                 as XML, decompressing .bz2 on the fly.",
    about = "Import amenities, shops and stops from OpenStreetMap"
)]
#[ortho_config(prefix = "GAZETTEER")]
pub(crate) struct OsmArgs {
    /// Path to the .osm, .osm.bz2 or .osm.pbf extract.
    #[arg(long = ARG_FILE, value_name = "path")]
    #[serde(default)]
    pub(crate) file: Option<Utf8PathBuf>,
    /// Solr root URL.
    #[arg(long = ARG_SOLR_URL, value_name = "url")]
    #[serde(default)]
    pub(crate) solr_url: Option<String>,
    /// Solr core holding the places documents.
    #[arg(long = ARG_SOLR_CORE, value_name = "name")]
    #[serde(default)]
    pub(crate) solr_core: Option<String>,
    /// Precedence of this source against others.
    #[arg(long = ARG_PRECEDENCE, value_name = "n")]
    #[serde(default)]
    pub(crate) precedence: Option<i32>,
    /// Documents per index submission.
    #[arg(long = ARG_PAGE_SIZE, value_name = "n")]
    #[serde(default)]
    pub(crate) page_size: Option<usize>,
    /// JSON taxonomy replacing the built-in one.
    #[arg(long = ARG_TAXONOMY, value_name = "path")]
    #[serde(default)]
    pub(crate) taxonomy: Option<Utf8PathBuf>,
}

/// CLI arguments for the `oxpoints` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    name = "oxpoints",
    long_about = "Load an OxPoints RDF graph (N-Triples, Turtle or RDF/XML, \
                 optionally bzip2 compressed) and import every typed \
                 resource. A separate shapes graph can be merged in first.",
    about = "Import OxPoints resources from RDF"
)]
#[ortho_config(prefix = "GAZETTEER")]
pub(crate) struct OxPointsArgs {
    /// Path to the OxPoints graph.
    #[arg(long = ARG_FILE, value_name = "path")]
    #[serde(default)]
    pub(crate) file: Option<Utf8PathBuf>,
    /// Path to a graph of shapes merged into the main graph.
    #[arg(long = ARG_SHAPES, value_name = "path")]
    #[serde(default)]
    pub(crate) shapes: Option<Utf8PathBuf>,
    /// Solr root URL.
    #[arg(long = ARG_SOLR_URL, value_name = "url")]
    #[serde(default)]
    pub(crate) solr_url: Option<String>,
    /// Solr core holding the places documents.
    #[arg(long = ARG_SOLR_CORE, value_name = "name")]
    #[serde(default)]
    pub(crate) solr_core: Option<String>,
    /// Precedence of this source against others.
    #[arg(long = ARG_PRECEDENCE, value_name = "n")]
    #[serde(default)]
    pub(crate) precedence: Option<i32>,
    /// Documents per index submission.
    #[arg(long = ARG_PAGE_SIZE, value_name = "n")]
    #[serde(default)]
    pub(crate) page_size: Option<usize>,
    /// JSON taxonomy replacing the built-in one.
    #[arg(long = ARG_TAXONOMY, value_name = "path")]
    #[serde(default)]
    pub(crate) taxonomy: Option<Utf8PathBuf>,
}

/// CLI arguments for the `library` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    name = "library",
    long_about = "Stream the library data feed into the index. With an \
                 OxPoints graph, each library is located through the \
                 resource carrying its library data id.",
    about = "Import library opening hours"
)]
#[ortho_config(prefix = "GAZETTEER")]
pub(crate) struct LibraryArgs {
    /// Path to the library XML feed.
    #[arg(long = ARG_FILE, value_name = "path")]
    #[serde(default)]
    pub(crate) file: Option<Utf8PathBuf>,
    /// OxPoints graph used to locate libraries.
    #[arg(long = ARG_GRAPH, value_name = "path")]
    #[serde(default)]
    pub(crate) graph: Option<Utf8PathBuf>,
    /// Solr root URL.
    #[arg(long = ARG_SOLR_URL, value_name = "url")]
    #[serde(default)]
    pub(crate) solr_url: Option<String>,
    /// Solr core holding the places documents.
    #[arg(long = ARG_SOLR_CORE, value_name = "name")]
    #[serde(default)]
    pub(crate) solr_core: Option<String>,
    /// Precedence of this source against others.
    #[arg(long = ARG_PRECEDENCE, value_name = "n")]
    #[serde(default)]
    pub(crate) precedence: Option<i32>,
    /// Documents per index submission.
    #[arg(long = ARG_PAGE_SIZE, value_name = "n")]
    #[serde(default)]
    pub(crate) page_size: Option<usize>,
    /// JSON taxonomy replacing the built-in one.
    #[arg(long = ARG_TAXONOMY, value_name = "path")]
    #[serde(default)]
    pub(crate) taxonomy: Option<Utf8PathBuf>,
}

macro_rules! impl_into_config {
    ($($args:ty),+ $(,)?) => {
        $(
            impl $args {
                pub(crate) fn into_config(self) -> Result<ImportConfig, CliError> {
                    let merged = self.load_and_merge().map_err(CliError::Configuration)?;
                    ImportConfig::try_from(merged)
                }
            }
        )+
    };
}

impl_into_config!(NaptanArgs, OsmArgs, OxPointsArgs, LibraryArgs);

/// Which source an import reads and the files it needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SourceConfig {
    Naptan {
        file: Utf8PathBuf,
        areas: Vec<String>,
    },
    Osm {
        file: Utf8PathBuf,
    },
    OxPoints {
        file: Utf8PathBuf,
        shapes: Option<Utf8PathBuf>,
    },
    Library {
        file: Utf8PathBuf,
        graph: Option<Utf8PathBuf>,
    },
}

impl SourceConfig {
    pub(crate) fn file(&self) -> &Utf8Path {
        match self {
            Self::Naptan { file, .. }
            | Self::Osm { file }
            | Self::OxPoints { file, .. }
            | Self::Library { file, .. } => file,
        }
    }
}

/// Index connection and run settings shared by every import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct IndexOptions {
    pub(crate) solr: SolrConfig,
    pub(crate) precedence: Precedence,
    pub(crate) page_size: usize,
    pub(crate) taxonomy: Option<Utf8PathBuf>,
}

impl IndexOptions {
    fn resolve(
        default_precedence: Precedence,
        solr_url: Option<String>,
        solr_core: Option<String>,
        precedence: Option<i32>,
        page_size: Option<usize>,
        taxonomy: Option<Utf8PathBuf>,
    ) -> Self {
        let defaults = SolrConfig::default();
        let solr = SolrConfig {
            base_url: solr_url.unwrap_or(defaults.base_url),
            core: solr_core.unwrap_or(defaults.core),
            ..SolrConfig::default()
        };
        Self {
            solr,
            precedence: precedence.map_or(default_precedence, Precedence),
            page_size: page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            taxonomy,
        }
    }

    pub(crate) fn settings(&self) -> ImportSettings {
        ImportSettings::new(self.precedence).with_page_size(self.page_size)
    }

    pub(crate) fn taxonomy(&self) -> Result<Taxonomy, CliError> {
        let Some(path) = &self.taxonomy else {
            return Ok(Taxonomy::builtin()?);
        };
        let json = fs::read_to_string(path).map_err(|source| CliError::ReadTaxonomy {
            path: path.clone(),
            source,
        })?;
        Ok(Taxonomy::from_json(&json)?)
    }

    fn gateway(&self) -> Result<SolrIndexGateway, CliError> {
        SolrIndexGateway::with_config(self.solr.clone()).map_err(|source| {
            CliError::BuildGateway {
                url: self.solr.base_url.clone(),
                source,
            }
        })
    }
}

/// Resolved import command configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ImportConfig {
    pub(crate) source: SourceConfig,
    pub(crate) index: IndexOptions,
}

impl ImportConfig {
    pub(crate) fn validate_sources(&self) -> Result<(), CliError> {
        require_existing(self.source.file(), ARG_FILE)?;
        match &self.source {
            SourceConfig::OxPoints {
                shapes: Some(shapes),
                ..
            } => require_existing(shapes, ARG_SHAPES)?,
            SourceConfig::Library {
                graph: Some(graph), ..
            } => require_existing(graph, ARG_GRAPH)?,
            _ => {}
        }
        if let Some(taxonomy) = &self.index.taxonomy {
            require_existing(taxonomy, ARG_TAXONOMY)?;
        }
        Ok(())
    }
}

impl TryFrom<NaptanArgs> for ImportConfig {
    type Error = CliError;

    fn try_from(args: NaptanArgs) -> Result<Self, Self::Error> {
        let file = args.file.ok_or(CliError::MissingArgument {
            field: ARG_FILE,
            env: ENV_NAPTAN_FILE,
        })?;
        let areas = args
            .areas
            .filter(|areas| !areas.is_empty())
            .ok_or(CliError::MissingArgument {
                field: ARG_AREAS,
                env: ENV_NAPTAN_AREAS,
            })?;
        Ok(Self {
            source: SourceConfig::Naptan { file, areas },
            index: IndexOptions::resolve(
                Precedence::NAPTAN,
                args.solr_url,
                args.solr_core,
                args.precedence,
                args.page_size,
                args.taxonomy,
            ),
        })
    }
}

impl TryFrom<OsmArgs> for ImportConfig {
    type Error = CliError;

    fn try_from(args: OsmArgs) -> Result<Self, Self::Error> {
        let file = args.file.ok_or(CliError::MissingArgument {
            field: ARG_FILE,
            env: ENV_OSM_FILE,
        })?;
        Ok(Self {
            source: SourceConfig::Osm { file },
            index: IndexOptions::resolve(
                Precedence::OSM,
                args.solr_url,
                args.solr_core,
                args.precedence,
                args.page_size,
                args.taxonomy,
            ),
        })
    }
}

impl TryFrom<OxPointsArgs> for ImportConfig {
    type Error = CliError;

    fn try_from(args: OxPointsArgs) -> Result<Self, Self::Error> {
        let file = args.file.ok_or(CliError::MissingArgument {
            field: ARG_FILE,
            env: ENV_OXPOINTS_FILE,
        })?;
        Ok(Self {
            source: SourceConfig::OxPoints {
                file,
                shapes: args.shapes,
            },
            index: IndexOptions::resolve(
                Precedence::OXPOINTS,
                args.solr_url,
                args.solr_core,
                args.precedence,
                args.page_size,
                args.taxonomy,
            ),
        })
    }
}

impl TryFrom<LibraryArgs> for ImportConfig {
    type Error = CliError;

    fn try_from(args: LibraryArgs) -> Result<Self, Self::Error> {
        let file = args.file.ok_or(CliError::MissingArgument {
            field: ARG_FILE,
            env: ENV_LIBRARY_FILE,
        })?;
        Ok(Self {
            source: SourceConfig::Library {
                file,
                graph: args.graph,
            },
            index: IndexOptions::resolve(
                Precedence::LIBRARY,
                args.solr_url,
                args.solr_core,
                args.precedence,
                args.page_size,
                args.taxonomy,
            ),
        })
    }
}

/// Validate the inputs, connect to Solr and run the import.
pub(crate) fn run_import(
    config: ImportConfig,
    writer: &mut dyn Write,
) -> Result<ImportReport, CliError> {
    config.validate_sources()?;
    let gateway = config.index.gateway()?;
    run_import_with(&config, &gateway, writer)
}

/// Run the import against `gateway` and write the report to `writer`.
pub(crate) fn run_import_with<G: IndexGateway + ?Sized>(
    config: &ImportConfig,
    gateway: &G,
    writer: &mut dyn Write,
) -> Result<ImportReport, CliError> {
    let merger = DocumentMerger::new(Arc::new(config.index.taxonomy()?));
    let mut driver = ReconciliationDriver::new(gateway, merger, config.index.settings());
    feed(&config.source, &mut driver)?;
    let report = driver.finish()?;
    info!(
        "Imported {}: {} created, {} merged, {} conflicts, {} lookup failures",
        source_name(config.source.file()),
        report.created,
        report.merged,
        report.conflicts,
        report.lookup_failures
    );
    write_report(writer, &report)?;
    Ok(report)
}

fn feed<G: IndexGateway + ?Sized>(
    source: &SourceConfig,
    driver: &mut ReconciliationDriver<'_, G>,
) -> Result<(), CliError> {
    match source {
        SourceConfig::Naptan { file, areas } => {
            let parser = NaptanParser::new(areas.iter().cloned());
            decode_source(file, |reader, name| {
                parser.import(reader, name, driver)?;
                Ok(())
            })
        }
        SourceConfig::Osm { file } if is_pbf(file) => {
            OsmParser::new().import_pbf(open_source(file)?, source_name(file), driver)?;
            Ok(())
        }
        SourceConfig::Osm { file } => {
            let parser = OsmParser::new();
            decode_source(file, |reader, name| {
                parser.import_xml(reader, name, driver)?;
                Ok(())
            })
        }
        SourceConfig::OxPoints { file, shapes } => {
            let mut graph = load_graph(file)?;
            if let Some(shapes) = shapes {
                graph.merge(load_graph(shapes)?);
            }
            OxPointsImporter::new(&graph).import(driver)?;
            Ok(())
        }
        SourceConfig::Library { file, graph } => {
            let graph = graph.as_deref().map(load_graph).transpose()?;
            let parser = match &graph {
                Some(graph) => LibraryParser::new().with_graph(graph),
                None => LibraryParser::new(),
            };
            decode_source(file, |reader, name| {
                parser.import(reader, name, driver)?;
                Ok(())
            })
        }
    }
}
