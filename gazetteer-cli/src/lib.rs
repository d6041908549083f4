//! Command-line interface for the gazetteer import pipeline.
#![forbid(unsafe_code)]

use std::io::Write;

use clap::{ArgAction, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::filter::LevelFilter;

mod descendants;
mod error;
mod fs;
mod import;
mod inputs;

pub use error::CliError;

use descendants::{DescendantsArgs, run_descendants};
use import::{LibraryArgs, NaptanArgs, OsmArgs, OxPointsArgs, run_import};

const ARG_FILE: &str = "file";
const ARG_AREAS: &str = "areas";
const ARG_SHAPES: &str = "shapes";
const ARG_GRAPH: &str = "graph";
const ARG_TAXONOMY: &str = "taxonomy";
const ARG_SOLR_URL: &str = "solr-url";
const ARG_SOLR_CORE: &str = "solr-core";
const ARG_PRECEDENCE: &str = "precedence";
const ARG_PAGE_SIZE: &str = "page-size";
const ARG_STORE: &str = "store";
const ARG_RELATION: &str = "relation";
const ARG_ROOT: &str = "root";
const ARG_MAX_DEPTH: &str = "max-depth";
const ENV_NAPTAN_FILE: &str = "GAZETTEER_CMDS_NAPTAN_FILE";
const ENV_NAPTAN_AREAS: &str = "GAZETTEER_CMDS_NAPTAN_AREAS";
const ENV_OSM_FILE: &str = "GAZETTEER_CMDS_OSM_FILE";
const ENV_OXPOINTS_FILE: &str = "GAZETTEER_CMDS_OXPOINTS_FILE";
const ENV_LIBRARY_FILE: &str = "GAZETTEER_CMDS_LIBRARY_FILE";
const ENV_DESCENDANTS_FILE: &str = "GAZETTEER_CMDS_DESCENDANTS_FILE";
const ENV_DESCENDANTS_STORE: &str = "GAZETTEER_CMDS_DESCENDANTS_STORE";

/// Run the gazetteer CLI with the current process arguments and environment.
pub fn run() -> Result<(), CliError> {
    let cli = Cli::try_parse().map_err(CliError::ArgumentParsing)?;
    init_logging(cli.verbose)?;
    let mut stdout = std::io::stdout().lock();
    match cli.command {
        Command::Naptan(args) => run_import(args.into_config()?, &mut stdout).map(|_| ()),
        Command::Osm(args) => run_import(args.into_config()?, &mut stdout).map(|_| ()),
        Command::Oxpoints(args) => run_import(args.into_config()?, &mut stdout).map(|_| ()),
        Command::Library(args) => run_import(args.into_config()?, &mut stdout).map(|_| ()),
        Command::Descendants(args) => run_descendants(args, &mut stdout).map(|_| ()),
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "gazetteer",
    about = "Import places data into the gazetteer index",
    version
)]
struct Cli {
    /// Increase log verbosity (warn, info, debug, trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Import stop areas and stop points from a NaPTAN register.
    Naptan(NaptanArgs),
    /// Import amenities, shops and stops from an OpenStreetMap extract.
    Osm(OsmArgs),
    /// Import OxPoints resources from an RDF graph.
    Oxpoints(OxPointsArgs),
    /// Import opening hours from the library data feed.
    Library(LibraryArgs),
    /// Precompute descendant lists into the key-value store.
    Descendants(DescendantsArgs),
}

const fn level_filter(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

fn init_logging(verbose: u8) -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_max_level(level_filter(verbose))
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(CliError::Logging)
}

/// Write `report` as pretty JSON followed by a newline.
fn write_report<T: Serialize>(writer: &mut dyn Write, report: &T) -> Result<(), CliError> {
    let payload = serde_json::to_string_pretty(report).map_err(CliError::SerialiseReport)?;
    writer
        .write_all(payload.as_bytes())
        .map_err(CliError::WriteReport)?;
    writer.write_all(b"\n").map_err(CliError::WriteReport)?;
    Ok(())
}

#[cfg(test)]
mod tests;
