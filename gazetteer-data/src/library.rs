//! Library opening-hours feed.
//!
//! The feed is a flat XML list of `<library>` elements:
//!
//! ```xml
//! <library>
//!   <id>BOD</id>
//!   <name>Bodleian Library</name>
//!   <hours><termtime>Mon-Fri 9am-10pm</termtime></hours>
//! </library>
//! ```
//!
//! Each element becomes a `librarydata:<id>` record. OxPoints resources
//! carry the same identifier, so reconciliation merges the hours into the
//! OxPoints document. When a graph is supplied the record is also located
//! through it.

use std::collections::HashMap;
use std::io::{BufRead, Read};

use gazetteer_core::{CandidateRecord, Identifier};
use log::{info, warn};
use quick_xml::Reader;
use quick_xml::events::Event;
use thiserror::Error;

use crate::rdf::vocab::oxp;
use crate::rdf::{GraphResolver, Node, TripleGraph};
use crate::sink::{RecordSink, SinkError, emit};
use crate::source::{CancelToken, ChunkSize, SourceError, SourceReader, read_error};
use crate::xml::{element_name, normalise_whitespace, push_reference};

/// Taxonomy path of library records.
pub const LIBRARY_TYPE: &str = "/university/library";

const FIELDS: &[(&str, &str)] = &[
    ("hours_termtime", "opening_hours_term_time"),
    ("hours_vacation", "opening_hours_vacation"),
    ("hours_closed", "opening_hours_closed"),
];

/// Errors that abort a library feed import.
#[derive(Debug, Error)]
pub enum LibraryParseError {
    /// The source could not be read or was cancelled.
    #[error(transparent)]
    Source(#[from] SourceError),
    /// The XML is not well-formed.
    #[error("malformed library XML in {name} at byte {position}")]
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
    #[error("library source {name} ended inside a {element} element")]
    Truncated {
        /// Source label.
        name: String,
        /// Innermost element left open.
        element: String,
    },
    /// The record sink refused a record.
    #[error("failed to hand library record to its sink")]
    Sink {
        /// Sink failure.
        #[source]
        source: SinkError,
    },
}

/// Counts reported after an import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LibrarySummary {
    /// Records emitted.
    pub emitted: usize,
    /// Records located through the graph.
    pub located: usize,
    /// Elements skipped for lacking an id or a name.
    pub skipped: usize,
}

#[derive(Debug, Default)]
struct Capture {
    path: Vec<String>,
    fields: HashMap<String, String>,
}

impl Capture {
    fn field(&self, key: &str) -> Option<String> {
        self.fields
            .get(key)
            .map(|value| normalise_whitespace(value))
            .filter(|value| !value.is_empty())
    }
}

/// Streaming reader for the library feed.
#[derive(Debug, Clone, Default)]
pub struct LibraryParser<'g> {
    chunk: ChunkSize,
    cancel: CancelToken,
    resolver: Option<GraphResolver<'g>>,
    subjects: HashMap<String, Node>,
}

impl<'g> LibraryParser<'g> {
    /// Parser without a graph; records carry no location.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locate libraries through the OxPoints resource whose
    /// `hasLibraryDataId` matches the feed id.
    #[must_use]
    pub fn with_graph(mut self, graph: &'g TripleGraph) -> Self {
        let predicate = oxp("hasLibraryDataId");
        self.subjects = graph
            .pairs(&predicate)
            .filter_map(|(subject, object)| {
                Some((object.as_literal()?.trim().to_owned(), subject.clone()))
            })
            .collect();
        self.resolver = Some(GraphResolver::new(graph));
        self
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

    /// Stream the feed into `sink`.
    ///
    /// # Errors
    /// Returns [`LibraryParseError`] for unreadable or malformed input,
    /// cancellation or a refused record.
    pub fn import<R, S>(
        &self,
        source: R,
        name: &str,
        sink: &mut S,
    ) -> Result<LibrarySummary, LibraryParseError>
    where
        R: Read,
        S: RecordSink + ?Sized,
    {
        let reader = SourceReader::new(source, self.chunk).with_cancel(self.cancel.clone());
        let mut xml = Reader::from_reader(reader.buffered());
        let summary = self.read_libraries(&mut xml, name, sink)?;
        info!(
            "Library import of {name} emitted {} records, {} located",
            summary.emitted, summary.located
        );
        Ok(summary)
    }

    fn read_libraries<B, S>(
        &self,
        xml: &mut Reader<B>,
        name: &str,
        sink: &mut S,
    ) -> Result<LibrarySummary, LibraryParseError>
    where
        B: BufRead,
        S: RecordSink + ?Sized,
    {
        let mut summary = LibrarySummary::default();
        let mut capture: Option<Capture> = None;
        let mut open_tags: Vec<String> = Vec::new();
        let mut buf = Vec::new();
        loop {
            let event = match xml.read_event_into(&mut buf) {
                Ok(event) => event,
                Err(source) => return Err(self.xml_error(name, xml.buffer_position(), source)),
            };
            match event {
                Event::Start(start) => {
                    let tag = element_name(&start);
                    match capture.as_mut() {
                        Some(current) => current.path.push(tag.clone()),
                        None if tag == "library" => capture = Some(Capture::default()),
                        None => {}
                    }
                    open_tags.push(tag);
                }
                Event::End(_) => {
                    open_tags.pop();
                    let closes_library = capture
                        .as_mut()
                        .is_some_and(|current| current.path.pop().is_none());
                    if closes_library {
                        if let Some(finished) = capture.take() {
                            self.finish(&finished, sink, &mut summary)?;
                        }
                    }
                }
                Event::Text(text) => {
                    if let Some(current) = capture.as_mut() {
                        push_field(current, &String::from_utf8_lossy(text.as_ref()));
                    }
                }
                Event::CData(data) => {
                    if let Some(current) = capture.as_mut() {
                        push_field(current, &String::from_utf8_lossy(data.as_ref()));
                    }
                }
                Event::GeneralRef(reference) => {
                    if let Some(current) = capture.as_mut() {
                        let mut text = String::new();
                        push_reference(&mut text, &reference);
                        push_field(current, &text);
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }
        if let Some(element) = open_tags.pop() {
            return Err(LibraryParseError::Truncated {
                name: name.to_owned(),
                element,
            });
        }
        Ok(summary)
    }

    fn finish<S: RecordSink + ?Sized>(
        &self,
        capture: &Capture,
        sink: &mut S,
        summary: &mut LibrarySummary,
    ) -> Result<(), LibraryParseError> {
        let Some(record) = self.record(capture) else {
            summary.skipped += 1;
            return Ok(());
        };
        if record.location.is_some() {
            summary.located += 1;
        }
        emit(sink, record).map_err(|source| LibraryParseError::Sink { source })?;
        summary.emitted += 1;
        Ok(())
    }

    fn record(&self, capture: &Capture) -> Option<CandidateRecord> {
        let Some(code) = capture.field("id") else {
            warn!("Skipping library without an id");
            return None;
        };
        let Some(title) = capture.field("name") else {
            warn!("Skipping library {code} without a name");
            return None;
        };
        let id = Identifier::new("librarydata", &code)
            .inspect_err(|err| warn!("Skipping library with bad identifier: {err}"))
            .ok()?;
        let mut record = CandidateRecord::new(id, title, LIBRARY_TYPE);
        for (path, attribute) in FIELDS {
            if let Some(value) = capture.field(path) {
                record.set_extra(*attribute, value);
            }
        }
        if let (Some(resolver), Some(subject)) = (&self.resolver, self.subjects.get(&code)) {
            record.location = resolver.location(subject);
        }
        Some(record)
    }

    fn xml_error(&self, name: &str, position: u64, source: quick_xml::Error) -> LibraryParseError {
        if let quick_xml::Error::Io(io) = &source {
            let io = std::io::Error::new(io.kind(), io.to_string());
            return LibraryParseError::Source(read_error(name, &self.cancel, io));
        }
        LibraryParseError::Xml {
            name: name.to_owned(),
            position,
            source,
        }
    }
}

fn push_field(capture: &mut Capture, text: &str) {
    if capture.path.is_empty() {
        return;
    }
    let key = capture.path.join("_");
    capture.fields.entry(key).or_default().push_str(text);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdf::Term;
    use crate::rdf::vocab::{GEO_LAT, GEO_LONG};
    use geo::Coord;
    use rstest::rstest;

    const FEED: &str = r"<libraries>
  <library>
    <id>BOD</id>
    <name>Bodleian   Library</name>
    <hours>
      <termtime>Mon-Fri 9am-10pm;
        Sat 10am-4pm</termtime>
      <vacation>Mon-Fri 9am-7pm</vacation>
      <closed>Christmas &amp; Easter</closed>
    </hours>
  </library>
  <library>
    <name>No identifier</name>
  </library>
</libraries>";

    fn import(parser: &LibraryParser<'_>) -> (LibrarySummary, Vec<CandidateRecord>) {
        let mut records: Vec<CandidateRecord> = Vec::new();
        let summary = parser
            .import(FEED.as_bytes(), "libraries.xml", &mut records)
            .expect("feed parses");
        (summary, records)
    }

    #[rstest]
    fn reads_libraries_and_hours() {
        let (summary, records) = import(&LibraryParser::new());
        assert_eq!(summary.emitted, 1);
        assert_eq!(summary.skipped, 1);

        let record = records.first().expect("one record");
        assert_eq!(record.id().to_string(), "librarydata:BOD");
        assert_eq!(record.name, "Bodleian Library");
        assert_eq!(record.type_path, LIBRARY_TYPE);
        assert_eq!(
            record.extra_text("opening_hours_term_time"),
            Some("Mon-Fri 9am-10pm; Sat 10am-4pm")
        );
        assert_eq!(record.extra_text("opening_hours_vacation"), Some("Mon-Fri 9am-7pm"));
        assert_eq!(record.extra_text("opening_hours_closed"), Some("Christmas & Easter"));
        assert_eq!(record.location, None);
    }

    #[rstest]
    fn locates_libraries_through_the_graph() {
        let mut graph = TripleGraph::new();
        let library = Node::iri("http://oxpoints.oucs.ox.ac.uk/id/23232603");
        let building = Node::iri("http://oxpoints.oucs.ox.ac.uk/id/23232604");
        graph.insert(
            library.clone(),
            oxp("hasLibraryDataId"),
            Term::Literal("BOD".to_owned()),
        );
        graph.insert(library, oxp("primaryPlace"), Term::Node(building.clone()));
        graph.insert(building.clone(), GEO_LAT, Term::Literal("51.7540".to_owned()));
        graph.insert(building, GEO_LONG, Term::Literal("-1.2540".to_owned()));

        let (summary, records) = import(&LibraryParser::new().with_graph(&graph));
        assert_eq!(summary.located, 1);
        let record = records.first().expect("one record");
        assert_eq!(record.location, Some(Coord { x: -1.2540, y: 51.7540 }));
    }

    #[rstest]
    fn malformed_feed_is_reported() {
        let mut records: Vec<CandidateRecord> = Vec::new();
        let err = LibraryParser::new()
            .import(&b"<libraries><library><id>X</name>"[..], "broken.xml", &mut records)
            .expect_err("mismatched tags");
        assert!(matches!(err, LibraryParseError::Xml { .. }));
    }

    #[rstest]
    fn cut_off_feed_is_reported() {
        let mut records: Vec<CandidateRecord> = Vec::new();
        let err = LibraryParser::new()
            .import(
                &b"<libraries><library><id>BOD</id><name>Bodleian Library</name></library>"[..],
                "cut.xml",
                &mut records,
            )
            .expect_err("root left open");
        match err {
            LibraryParseError::Truncated { name, element } => {
                assert_eq!(name, "cut.xml");
                assert_eq!(element, "libraries");
            }
            other => panic!("expected Truncated, got {other:?}"),
        }
    }
}
