//! OpenStreetMap extract import.
//!
//! Extracts arrive as `.osm` XML (optionally bzip2-compressed) or as
//! `.osm.pbf`. Both readers stream elements in file order and share one
//! [`accumulator`], which keeps a node-id → coordinate table so that ways
//! can be located at the centre of their nodes' bounding box. Nodes must
//! precede the ways that reference them, as they do in published extracts.
//! Relations are counted and otherwise ignored.

use std::io::Read;

use log::info;
use osmpbf::{Element, ElementReader};
use thiserror::Error;

use crate::sink::{RecordSink, SinkError, emit};
use crate::source::{CancelToken, ChunkSize, SourceError, SourceReader, read_error};

mod accumulator;
pub mod tags;
mod xml_reader;

use accumulator::OsmAccumulator;
pub use tags::{OsmElement, OsmElementKind};

/// Counts reported after an OSM import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OsmSummary {
    /// Nodes read, including dense nodes.
    pub nodes: u64,
    /// Ways read.
    pub ways: u64,
    /// Relations read.
    pub relations: u64,
    /// Candidate records emitted.
    pub emitted: u64,
    /// Tagged ways dropped because none of their nodes were known.
    pub unresolved_ways: u64,
    /// Bytes read from the source.
    pub bytes_read: u64,
}

/// Errors that abort an OSM import.
#[derive(Debug, Error)]
pub enum OsmParseError {
    /// The source could not be read or was cancelled.
    #[error(transparent)]
    Source(#[from] SourceError),
    /// The XML is not well-formed.
    #[error("malformed OSM XML in {name} at byte {position}")]
    Xml {
        /// Source label.
        name: String,
        /// Byte offset reported by the XML reader.
        position: u64,
        /// Underlying XML failure.
        #[source]
        source: quick_xml::Error,
    },
    /// The document ended inside an element.
    #[error("OSM source {name} ended inside a {element} element")]
    Truncated {
        /// Source label.
        name: String,
        /// Innermost element left open.
        element: String,
    },
    /// A required attribute is missing or unparsable.
    #[error("OSM {element} in {name} has invalid {attribute} {value:?}")]
    Attribute {
        /// Source label.
        name: String,
        /// Element name.
        element: String,
        /// Attribute name.
        attribute: String,
        /// Raw value; empty when missing.
        value: String,
    },
    /// The PBF data could not be decoded.
    #[error("failed to decode OSM PBF data in {name}")]
    Pbf {
        /// Source label.
        name: String,
        /// Underlying decoder failure.
        #[source]
        source: osmpbf::Error,
    },
    /// The record sink refused a record.
    #[error("failed to hand OSM record to its sink")]
    Sink {
        /// Sink failure.
        #[source]
        source: SinkError,
    },
}

/// Streaming OSM reader.
#[derive(Debug, Clone, Default)]
pub struct OsmParser {
    chunk: ChunkSize,
    cancel: CancelToken,
}

impl OsmParser {
    /// Create a parser with the default chunk size.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the read chunk size.
    #[must_use]
    pub const fn with_chunk_size(mut self, chunk: ChunkSize) -> Self {
        self.chunk = chunk;
        self
    }

    /// Stop between chunks once `cancel` fires.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Stream an OSM XML document into `sink`.
    ///
    /// # Errors
    /// Returns [`OsmParseError`] for unreadable or malformed input, a bad
    /// node coordinate, cancellation or a refused record.
    pub fn import_xml<R, S>(
        &self,
        source: R,
        name: &str,
        sink: &mut S,
    ) -> Result<OsmSummary, OsmParseError>
    where
        R: Read,
        S: RecordSink + ?Sized,
    {
        let reader = SourceReader::new(source, self.chunk).with_cancel(self.cancel.clone());
        let summary = xml_reader::read(reader, name, &self.cancel, sink)?;
        log_summary(name, &summary);
        Ok(summary)
    }

    /// Stream an OSM PBF file into `sink`.
    ///
    /// Blocks are decoded one after another so that nodes are seen before
    /// the ways that use them.
    ///
    /// # Errors
    /// Returns [`OsmParseError`] for undecodable input, cancellation or a
    /// refused record.
    ///
    /// # Examples
    /// ```no_run
    /// use std::fs::File;
    /// use gazetteer_core::CandidateRecord;
    /// use gazetteer_data::osm::OsmParser;
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let mut records: Vec<CandidateRecord> = Vec::new();
    /// let summary = OsmParser::new().import_pbf(File::open("oxfordshire.osm.pbf")?, "oxfordshire", &mut records)?;
    /// println!("Emitted {} records", summary.emitted);
    /// # Ok(())
    /// # }
    /// ```
    pub fn import_pbf<R, S>(
        &self,
        source: R,
        name: &str,
        sink: &mut S,
    ) -> Result<OsmSummary, OsmParseError>
    where
        R: Read + Send,
        S: RecordSink + ?Sized,
    {
        let reader = SourceReader::new(source, self.chunk).with_cancel(self.cancel.clone());
        let elements = ElementReader::new(reader);
        let mut accumulator = OsmAccumulator::default();
        let mut refused: Option<SinkError> = None;

        let decoded = elements.for_each(|element| {
            if refused.is_some() {
                return;
            }
            let record = match element {
                Element::Node(node) => {
                    let version = node.info().version().map(|v| v.to_string());
                    accumulator.node(node.id(), node.lon(), node.lat(), version, owned_tags(node.tags()))
                }
                Element::DenseNode(node) => {
                    let version = node.info().map(|info| info.version().to_string());
                    accumulator.node(node.id(), node.lon(), node.lat(), version, owned_tags(node.tags()))
                }
                Element::Way(way) => {
                    let refs: Vec<i64> = way.refs().collect();
                    let version = way.info().version().map(|v| v.to_string());
                    accumulator.way(way.id(), &refs, version, owned_tags(way.tags()))
                }
                Element::Relation(_) => {
                    accumulator.relation();
                    None
                }
            };
            if let Some(record) = record {
                if let Err(err) = emit(sink, record) {
                    refused = Some(err);
                }
            }
        });

        if let Err(source) = decoded {
            if self.cancel.is_cancelled() {
                return Err(SourceError::Cancelled {
                    name: name.to_owned(),
                }
                .into());
            }
            return Err(OsmParseError::Pbf {
                name: name.to_owned(),
                source,
            });
        }
        if let Some(source) = refused {
            return Err(OsmParseError::Sink { source });
        }
        let summary = accumulator.into_summary();
        log_summary(name, &summary);
        Ok(summary)
    }
}

fn owned_tags<'a, I>(tags: I) -> std::collections::BTreeMap<String, String>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    tags.into_iter()
        .map(|(key, value)| (key.to_owned(), value.to_owned()))
        .collect()
}

fn log_summary(name: &str, summary: &OsmSummary) {
    info!(
        "OSM import of {name}: {} nodes, {} ways, {} relations, {} records emitted",
        summary.nodes, summary.ways, summary.relations, summary.emitted
    );
}

fn xml_error(
    name: &str,
    position: u64,
    cancel: &CancelToken,
    source: quick_xml::Error,
) -> OsmParseError {
    if let quick_xml::Error::Io(io) = &source {
        let io = std::io::Error::new(io.kind(), io.to_string());
        return OsmParseError::Source(read_error(name, cancel, io));
    }
    OsmParseError::Xml {
        name: name.to_owned(),
        position,
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gazetteer_core::CandidateRecord;
    use rstest::rstest;

    #[rstest]
    fn rejects_invalid_pbf_payload() {
        let mut records: Vec<CandidateRecord> = Vec::new();
        let garbage: &[u8] = b"\x00\x00\x00\x0cnot a blob header";
        let err = OsmParser::new()
            .import_pbf(garbage, "broken.osm.pbf", &mut records)
            .expect_err("expected failure when decoding invalid data");
        match err {
            OsmParseError::Pbf { name, .. } => assert_eq!(name, "broken.osm.pbf"),
            other => panic!("expected decode error, got {other:?}"),
        }
    }

    #[rstest]
    fn cancelled_pbf_import_reports_cancellation() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut records: Vec<CandidateRecord> = Vec::new();
        let err = OsmParser::new()
            .with_cancel(cancel)
            .import_pbf(&b"\x00\x00\x00\x0c"[..], "planet.osm.pbf", &mut records)
            .expect_err("cancelled");
        assert!(matches!(err, OsmParseError::Source(SourceError::Cancelled { .. })));
    }

    #[rstest]
    fn cancelled_xml_import_reports_cancellation() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut records: Vec<CandidateRecord> = Vec::new();
        let err = OsmParser::new()
            .with_cancel(cancel)
            .import_xml(&b"<osm/>"[..], "tiny.osm", &mut records)
            .expect_err("cancelled");
        assert!(matches!(err, OsmParseError::Source(SourceError::Cancelled { .. })));
    }
}
