//! Opening and decoding the source files named on the command line.

use std::io::{ErrorKind, Read};

use camino::Utf8Path;
use cap_std::fs_utf8;
use gazetteer_data::{Compression, GraphLoadError, RdfFormat, TripleGraph, with_decoded};
use log::debug;

use crate::{CliError, fs};

/// Fail unless `path` names an existing regular file.
pub(crate) fn require_existing(path: &Utf8Path, field: &'static str) -> Result<(), CliError> {
    match fs::file_is_file(path) {
        Ok(true) => Ok(()),
        Ok(false) => Err(CliError::SourcePathNotFile {
            field,
            path: path.to_path_buf(),
        }),
        Err(source) if source.kind() == ErrorKind::NotFound => Err(CliError::MissingSourceFile {
            field,
            path: path.to_path_buf(),
        }),
        Err(source) => Err(CliError::InspectSourcePath {
            field,
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Label used in logs and errors: the file name, or the whole path.
pub(crate) fn source_name(path: &Utf8Path) -> &str {
    path.file_name().unwrap_or_else(|| path.as_str())
}

/// Whether `path` holds OSM PBF rather than XML.
pub(crate) fn is_pbf(path: &Utf8Path) -> bool {
    source_name(path).to_ascii_lowercase().ends_with(".pbf")
}

pub(crate) fn open_source(path: &Utf8Path) -> Result<fs_utf8::File, CliError> {
    fs::open_utf8_file(path).map_err(|source| CliError::OpenSource {
        path: path.to_path_buf(),
        source,
    })
}

/// Open `path`, undo any bzip2 or zip packaging and pass the stream on.
pub(crate) fn decode_source<T, F>(path: &Utf8Path, consume: F) -> Result<T, CliError>
where
    F: FnOnce(&mut dyn Read, &str) -> Result<T, CliError>,
{
    let name = source_name(path);
    let compression = Compression::detect(name);
    debug!("Reading {name} as {compression:?}");
    let file = open_source(path)?;
    with_decoded(file, name, &compression, |reader| consume(reader, name))
}

/// Load a whole RDF graph, choosing the parser from the file name.
pub(crate) fn load_graph(path: &Utf8Path) -> Result<TripleGraph, CliError> {
    let name = source_name(path);
    let load_error = |source| CliError::LoadGraph {
        path: path.to_path_buf(),
        source,
    };
    let format = RdfFormat::detect(name).ok_or_else(|| {
        load_error(GraphLoadError::UnknownFormat {
            name: name.to_owned(),
        })
    })?;
    decode_source(path, |reader, label| {
        TripleGraph::load(reader, format, label).map_err(load_error)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use rstest::rstest;
    use tempfile::TempDir;

    #[rstest]
    #[case("planet.osm.pbf", true)]
    #[case("Oxfordshire.OSM.PBF", true)]
    #[case("oxfordshire.osm.bz2", false)]
    #[case("extract.osm", false)]
    fn pbf_inputs_are_told_apart(#[case] name: &str, #[case] expected: bool) {
        assert_eq!(is_pbf(Utf8Path::new(name)), expected);
    }

    #[rstest]
    fn graphs_with_unknown_extensions_are_rejected() {
        let tmp = TempDir::new().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).expect("utf-8 workspace");
        let path = root.join("oxpoints.json");
        std::fs::write(&path, b"{}").expect("write graph");
        match load_graph(&path).expect_err("format is unknown") {
            CliError::LoadGraph {
                source: GraphLoadError::UnknownFormat { name },
                ..
            } => assert_eq!(name, "oxpoints.json"),
            other => panic!("expected LoadGraph, found {other:?}"),
        }
    }

    #[rstest]
    fn turtle_graphs_load() {
        let tmp = TempDir::new().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).expect("utf-8 workspace");
        let path = root.join("oxpoints.ttl");
        std::fs::write(
            &path,
            br#"<http://oxpoints.oucs.ox.ac.uk/id/23233500> <http://purl.org/dc/elements/1.1/title> "Clarendon Laboratory" ."#,
        )
        .expect("write graph");
        let graph = load_graph(&path).expect("graph loads");
        assert!(!graph.is_empty());
    }
}
