//! The `descendants` command: precompute descendant lists into SQLite.

use std::io::Write;

use camino::Utf8PathBuf;
use clap::Parser;
use gazetteer_data::rdf::Node;
use gazetteer_data::{DescendantsImporter, DescendantsSummary, SqliteKeyValueStore};
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};

use crate::inputs::{load_graph, require_existing};
use crate::{
    ARG_FILE, ARG_MAX_DEPTH, ARG_RELATION, ARG_ROOT, ARG_STORE, CliError, ENV_DESCENDANTS_FILE,
    ENV_DESCENDANTS_STORE, fs, write_report,
};

/// CLI arguments for the `descendants` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    name = "descendants",
    long_about = "Walk the organisational hierarchy of an OxPoints graph \
                 and store, for every resource, the list of resources below \
                 it. Entries are keyed by OxPoints identifier in a SQLite \
                 key-value store.",
    about = "Precompute descendant lists"
)]
#[ortho_config(prefix = "GAZETTEER")]
pub(crate) struct DescendantsArgs {
    /// Path to the OxPoints graph.
    #[arg(long = ARG_FILE, value_name = "path")]
    #[serde(default)]
    pub(crate) file: Option<Utf8PathBuf>,
    /// SQLite database receiving the lists; created when absent.
    #[arg(long = ARG_STORE, value_name = "path")]
    #[serde(default)]
    pub(crate) store: Option<Utf8PathBuf>,
    /// Predicate linking a child to its parent.
    #[arg(long = ARG_RELATION, value_name = "iri")]
    #[serde(default)]
    pub(crate) relation: Option<String>,
    /// Resource the walk starts from.
    #[arg(long = ARG_ROOT, value_name = "iri")]
    #[serde(default)]
    pub(crate) root: Option<String>,
    /// Deepest level expanded below the root.
    #[arg(long = ARG_MAX_DEPTH, value_name = "n")]
    #[serde(default)]
    pub(crate) max_depth: Option<usize>,
}

impl DescendantsArgs {
    pub(crate) fn into_config(self) -> Result<DescendantsConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        DescendantsConfig::try_from(merged)
    }
}

/// Resolved `descendants` command configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DescendantsConfig {
    pub(crate) graph: Utf8PathBuf,
    pub(crate) store: Utf8PathBuf,
    pub(crate) relation: Option<String>,
    pub(crate) root: Option<String>,
    pub(crate) max_depth: Option<usize>,
}

impl DescendantsConfig {
    pub(crate) fn validate_sources(&self) -> Result<(), CliError> {
        require_existing(&self.graph, ARG_FILE)?;
        if fs::parent_dir_exists(&self.store) {
            Ok(())
        } else {
            Err(CliError::MissingStoreDirectory {
                field: ARG_STORE,
                path: self.store.clone(),
            })
        }
    }
}

impl TryFrom<DescendantsArgs> for DescendantsConfig {
    type Error = CliError;

    fn try_from(args: DescendantsArgs) -> Result<Self, Self::Error> {
        let graph = args.file.ok_or(CliError::MissingArgument {
            field: ARG_FILE,
            env: ENV_DESCENDANTS_FILE,
        })?;
        let store = args.store.ok_or(CliError::MissingArgument {
            field: ARG_STORE,
            env: ENV_DESCENDANTS_STORE,
        })?;
        Ok(Self {
            graph,
            store,
            relation: args.relation,
            root: args.root,
            max_depth: args.max_depth,
        })
    }
}

pub(crate) fn run_descendants(
    args: DescendantsArgs,
    writer: &mut dyn Write,
) -> Result<DescendantsSummary, CliError> {
    let config = args.into_config()?;
    config.validate_sources()?;
    run_descendants_with(&config, writer)
}

pub(crate) fn run_descendants_with(
    config: &DescendantsConfig,
    writer: &mut dyn Write,
) -> Result<DescendantsSummary, CliError> {
    let graph = load_graph(&config.graph)?;
    let store = SqliteKeyValueStore::open(config.store.as_std_path())?;
    let mut importer = DescendantsImporter::new(&graph, &store);
    if let Some(relation) = &config.relation {
        importer = importer.with_relation(relation.as_str());
    }
    if let Some(max_depth) = config.max_depth {
        importer = importer.with_max_depth(max_depth);
    }
    let summary = match &config.root {
        Some(root) => importer.import_from(&Node::iri(root.as_str()))?,
        None => importer.import()?,
    };
    write_report(writer, &summary)?;
    Ok(summary)
}
