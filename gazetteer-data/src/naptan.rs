//! Streaming reader for the NaPTAN transit-stop register.
//!
//! The register is a single large XML document of `StopArea` and
//! `StopPoint` elements. [`NaptanParser`] walks it event by event and keeps
//! only the text of the element currently being captured, so memory is
//! bounded by the largest element plus the records that pass the area
//! filter. Ancestry is annotated in one pass once the document has been
//! read, because parents may appear after their children.
//!
//! Elements whose `Status` attribute is anything but `active` are skipped
//! together with everything nested inside them. This applies to reference
//! elements too: an inactive `ParentStopAreaRef` yields no edge.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::{BufRead, Read};

use gazetteer_core::{CandidateRecord, Identifier};
use geo::Coord;
use log::{debug, info, warn};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use thiserror::Error;

use crate::sink::{RecordSink, SinkError, emit};
use crate::source::{CancelToken, ChunkSize, SourceError, SourceReader, read_error};
use crate::xml::{attribute, element_name, push_reference};

/// Type path assigned to every stop area.
pub const STOP_AREA_TYPE: &str = "/transport/bus-stop-area";

/// Prefix of the raw attributes copied from captured fields.
pub const RAW_PREFIX: &str = "raw_naptan_";

const STOP_TYPES: &[(&str, &str)] = &[
    ("BCT", "/transport/bus-stop"),
    ("TXR", "/transport/taxi-rank"),
    ("AIR", "/transport/airport"),
];

const INDICATORS: &[(&str, &str)] = &[
    ("op", "Opposite"),
    ("opp", "Opposite"),
    ("opposite", "Opposite"),
    ("adj", "Adjacent"),
    ("outside", "Outside"),
    ("o/s", "Outside"),
    ("nr", "Near"),
    ("inside", "Inside"),
    ("stp", "Stop"),
];

/// Errors that abort a NaPTAN import.
#[derive(Debug, Error)]
pub enum NaptanParseError {
    /// The source could not be read or was cancelled.
    #[error(transparent)]
    Source(#[from] SourceError),
    /// The document is not well-formed XML.
    #[error("malformed NaPTAN XML in {name} at byte {position}")]
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
    #[error("NaPTAN source {name} ended inside a {element} element")]
    Truncated {
        /// Source label.
        name: String,
        /// Element left open.
        element: String,
    },
    /// The record sink refused a record.
    #[error("failed to hand NaPTAN record to its sink")]
    Sink {
        /// Sink failure.
        #[source]
        source: SinkError,
    },
}

/// Kinds of top-level elements the parser captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ElementKind {
    StopArea,
    StopPoint,
}

/// Text fields of one captured element, keyed by tag path below it.
///
/// Paths join the nested tag names with `_`, for example
/// `Place_Location_Translation_Longitude`.
#[derive(Debug)]
struct Capture {
    kind: ElementKind,
    path: Vec<String>,
    fields: HashMap<String, String>,
}

impl Capture {
    fn new(kind: ElementKind) -> Self {
        Self {
            kind,
            path: Vec::new(),
            fields: HashMap::new(),
        }
    }

    fn push_text(&mut self, text: &str) {
        if self.path.is_empty() {
            return;
        }
        let key = self.path.join("_");
        self.fields.entry(key).or_default().push_str(text);
    }

    fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    fn coordinate(&self, prefix: &str) -> Option<Coord<f64>> {
        let lon = self.field(&format!("{prefix}_Longitude"))?;
        let lat = self.field(&format!("{prefix}_Latitude"))?;
        match (lon.parse::<f64>(), lat.parse::<f64>()) {
            (Ok(x), Ok(y)) if x.is_finite() && y.is_finite() => Some(Coord { x, y }),
            _ => {
                warn!("Ignoring malformed NaPTAN coordinate ({lon}, {lat})");
                None
            }
        }
    }

    fn raw_fields(&self) -> impl Iterator<Item = (String, String)> + '_ {
        self.fields.iter().filter_map(|(key, value)| {
            let value = value.trim();
            (!value.is_empty()).then(|| (format!("{RAW_PREFIX}{key}"), value.to_owned()))
        })
    }
}

/// A captured record plus the code of the area it points at.
#[derive(Debug, Clone)]
struct Captured {
    record: CandidateRecord,
    reference: Option<String>,
}

type ElementHandler = fn(&NaptanParser, &Capture) -> Option<(String, Captured)>;

/// Stop areas and stop points read from one register.
#[derive(Debug, Clone, Default)]
pub struct NaptanDataset {
    stop_areas: BTreeMap<String, Captured>,
    stop_points: BTreeMap<String, Captured>,
}

impl NaptanDataset {
    /// Stop area by `StopAreaCode`.
    #[must_use]
    pub fn stop_area(&self, code: &str) -> Option<&CandidateRecord> {
        self.stop_areas.get(code).map(|captured| &captured.record)
    }

    /// Stop point by `AtcoCode`.
    #[must_use]
    pub fn stop_point(&self, atco_code: &str) -> Option<&CandidateRecord> {
        self.stop_points.get(atco_code).map(|captured| &captured.record)
    }

    /// Number of stop areas kept.
    #[must_use]
    pub fn stop_area_count(&self) -> usize {
        self.stop_areas.len()
    }

    /// Number of stop points kept.
    #[must_use]
    pub fn stop_point_count(&self) -> usize {
        self.stop_points.len()
    }

    /// Stop areas first, then stop points, each ordered by code.
    pub fn into_records(self) -> impl Iterator<Item = CandidateRecord> {
        self.stop_areas
            .into_values()
            .chain(self.stop_points.into_values())
            .map(|captured| captured.record)
    }

    /// Link parent and child records both ways.
    ///
    /// References to codes outside the dataset are ignored.
    fn annotate_ancestry(&mut self) {
        let area_edges: Vec<(String, String)> = self
            .stop_areas
            .iter()
            .filter_map(|(code, captured)| {
                let parent = captured.reference.as_ref()?;
                (parent != code && self.stop_areas.contains_key(parent))
                    .then(|| (code.clone(), parent.clone()))
            })
            .collect();
        for (child, parent) in area_edges {
            link(&mut self.stop_areas, &child, &parent);
        }

        let point_edges: Vec<(String, String)> = self
            .stop_points
            .iter()
            .filter_map(|(code, captured)| {
                let area = captured.reference.as_ref()?;
                self.stop_areas
                    .contains_key(area)
                    .then(|| (code.clone(), area.clone()))
            })
            .collect();
        for (point_code, area_code) in point_edges {
            let (Some(point), Some(area)) = (
                self.stop_points.get_mut(&point_code),
                self.stop_areas.get_mut(&area_code),
            ) else {
                continue;
            };
            point.record.child_of.insert(area.record.id().clone());
            area.record.parent_of.insert(point.record.id().clone());
        }
    }
}

fn link(areas: &mut BTreeMap<String, Captured>, child: &str, parent: &str) {
    let Some(parent_id) = areas.get(parent).map(|captured| captured.record.id().clone()) else {
        return;
    };
    let Some(child_id) = areas.get(child).map(|captured| captured.record.id().clone()) else {
        return;
    };
    if let Some(captured) = areas.get_mut(child) {
        captured.record.child_of.insert(parent_id);
    }
    if let Some(captured) = areas.get_mut(parent) {
        captured.record.parent_of.insert(child_id);
    }
}

/// Counts reported after an import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NaptanSummary {
    /// Stop areas emitted.
    pub stop_areas: usize,
    /// Stop points emitted.
    pub stop_points: usize,
    /// Bytes read from the source.
    pub bytes_read: u64,
}

/// Event-driven NaPTAN reader filtered by area code.
#[derive(Debug, Clone)]
pub struct NaptanParser {
    areas: BTreeSet<String>,
    chunk: ChunkSize,
    cancel: CancelToken,
    handlers: HashMap<&'static str, (ElementKind, ElementHandler)>,
}

impl NaptanParser {
    /// Create a parser keeping records whose code starts with one of
    /// `areas` (three-character registry area codes such as `"340"`).
    pub fn new<I, S>(areas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let handlers: HashMap<&'static str, (ElementKind, ElementHandler)> = HashMap::from([
            (
                "StopArea",
                (ElementKind::StopArea, Self::stop_area as ElementHandler),
            ),
            (
                "StopPoint",
                (ElementKind::StopPoint, Self::stop_point as ElementHandler),
            ),
        ]);
        Self {
            areas: areas.into_iter().map(Into::into).collect(),
            chunk: ChunkSize::default(),
            cancel: CancelToken::default(),
            handlers,
        }
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

    /// Read the whole register and annotate ancestry.
    ///
    /// # Errors
    /// Returns [`NaptanParseError`] when the source cannot be read, is not
    /// well-formed, ends mid-element or the run is cancelled.
    pub fn parse<R: Read>(&self, source: R, name: &str) -> Result<NaptanDataset, NaptanParseError> {
        let reader = SourceReader::new(source, self.chunk).with_cancel(self.cancel.clone());
        let mut xml = Reader::from_reader(reader.buffered());
        let mut dataset = self.read_elements(&mut xml, name)?;
        let bytes = xml.get_ref().get_ref().bytes_read();
        debug!("Read {bytes} bytes of NaPTAN data from {name}");
        dataset.annotate_ancestry();
        Ok(dataset)
    }

    /// Parse the register and hand every record to `sink`.
    ///
    /// # Errors
    /// Returns [`NaptanParseError`] for parse failures and for the first
    /// record the sink refuses.
    pub fn import<R, S>(
        &self,
        source: R,
        name: &str,
        sink: &mut S,
    ) -> Result<NaptanSummary, NaptanParseError>
    where
        R: Read,
        S: RecordSink + ?Sized,
    {
        let reader = SourceReader::new(source, self.chunk).with_cancel(self.cancel.clone());
        let mut xml = Reader::from_reader(reader.buffered());
        let mut dataset = self.read_elements(&mut xml, name)?;
        dataset.annotate_ancestry();
        let summary = NaptanSummary {
            stop_areas: dataset.stop_area_count(),
            stop_points: dataset.stop_point_count(),
            bytes_read: xml.get_ref().get_ref().bytes_read(),
        };
        for record in dataset.into_records() {
            emit(sink, record).map_err(|source| NaptanParseError::Sink { source })?;
        }
        info!(
            "NaPTAN import of {name} emitted {} stop areas and {} stop points",
            summary.stop_areas, summary.stop_points
        );
        Ok(summary)
    }

    fn read_elements<B: BufRead>(
        &self,
        xml: &mut Reader<B>,
        name: &str,
    ) -> Result<NaptanDataset, NaptanParseError> {
        let mut dataset = NaptanDataset::default();
        let mut capture: Option<Capture> = None;
        let mut skip_depth = 0_usize;
        let mut open_tags: Vec<String> = Vec::new();
        let mut buf = Vec::new();

        loop {
            let event = match xml.read_event_into(&mut buf) {
                Ok(event) => event,
                Err(source) => return Err(self.xml_error(name, xml.buffer_position(), source)),
            };
            match event {
                Event::Start(start) => {
                    open_tags.push(element_name(&start));
                    if skip_depth > 0 {
                        skip_depth += 1;
                    } else if !is_active(&start) {
                        skip_depth = 1;
                    } else {
                        self.open_element(&start, &mut capture);
                    }
                }
                Event::Empty(start) => {
                    if skip_depth == 0 && is_active(&start) {
                        // Self-closing elements contribute no text.
                        self.open_element(&start, &mut capture);
                        self.close_element(&element_name(&start), &mut capture, &mut dataset);
                    }
                }
                Event::End(end) => {
                    open_tags.pop();
                    if skip_depth > 0 {
                        skip_depth -= 1;
                    } else {
                        let tag = String::from_utf8_lossy(end.name().as_ref()).into_owned();
                        self.close_element(&tag, &mut capture, &mut dataset);
                    }
                }
                Event::Text(text) => {
                    if skip_depth == 0 {
                        if let Some(current) = capture.as_mut() {
                            current.push_text(&String::from_utf8_lossy(text.as_ref()));
                        }
                    }
                }
                Event::CData(data) => {
                    if skip_depth == 0 {
                        if let Some(current) = capture.as_mut() {
                            current.push_text(&String::from_utf8_lossy(data.as_ref()));
                        }
                    }
                }
                Event::GeneralRef(reference) => {
                    if skip_depth == 0 {
                        if let Some(current) = capture.as_mut() {
                            let mut text = String::new();
                            push_reference(&mut text, &reference);
                            current.push_text(&text);
                        }
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        // Skipped subtrees and the root count too; any unclosed tag is a cut-off file.
        if let Some(element) = open_tags.pop() {
            return Err(NaptanParseError::Truncated {
                name: name.to_owned(),
                element,
            });
        }
        Ok(dataset)
    }

    fn open_element(&self, start: &BytesStart<'_>, capture: &mut Option<Capture>) {
        let tag = element_name(start);
        match capture {
            Some(current) => current.path.push(tag),
            None => {
                if let Some((kind, _)) = self.handlers.get(tag.as_str()) {
                    *capture = Some(Capture::new(*kind));
                }
            }
        }
    }

    fn close_element(&self, tag: &str, capture: &mut Option<Capture>, dataset: &mut NaptanDataset) {
        let Some(current) = capture.as_mut() else {
            return;
        };
        if current.path.pop().is_some() {
            return;
        }
        let Some(finished) = capture.take() else {
            return;
        };
        let Some((_, handler)) = self.handlers.get(tag) else {
            return;
        };
        if let Some((code, captured)) = handler(self, &finished) {
            match finished.kind {
                ElementKind::StopArea => dataset.stop_areas.insert(code, captured),
                ElementKind::StopPoint => dataset.stop_points.insert(code, captured),
            };
        }
    }

    fn xml_error(&self, name: &str, position: u64, source: quick_xml::Error) -> NaptanParseError {
        if let quick_xml::Error::Io(io) = &source {
            let io = std::io::Error::new(io.kind(), io.to_string());
            return NaptanParseError::Source(read_error(name, &self.cancel, io));
        }
        NaptanParseError::Xml {
            name: name.to_owned(),
            position,
            source,
        }
    }

    fn in_area(&self, code: &str) -> bool {
        code.get(..3).is_some_and(|area| self.areas.contains(area))
    }

    fn stop_area(&self, capture: &Capture) -> Option<(String, Captured)> {
        let code = capture.field("StopAreaCode")?.to_owned();
        if !self.in_area(&code) {
            debug!("Skipping stop area {code} outside the configured areas");
            return None;
        }
        let id = identifier("stoparea", &code)?;
        let name = capture.field("Name").unwrap_or(&code).to_owned();
        let mut record = CandidateRecord::new(id, name, STOP_AREA_TYPE);
        record.location = capture.coordinate("Location_Translation");
        copy_raw_fields(&mut record, capture);
        let reference = capture.field("ParentStopAreaRef").map(str::to_owned);
        Some((code, Captured { record, reference }))
    }

    fn stop_point(&self, capture: &Capture) -> Option<(String, Captured)> {
        let code = capture.field("AtcoCode")?.to_owned();
        if !self.in_area(&code) {
            debug!("Skipping stop point {code} outside the configured areas");
            return None;
        }
        let Some(type_path) = capture
            .field("StopClassification_StopType")
            .and_then(stop_type_path)
        else {
            debug!("Skipping stop point {code} with an unmapped stop type");
            return None;
        };
        let id = identifier("atco", &code)?;
        let common_name = capture.field("Descriptor_CommonName").unwrap_or(&code);
        let name = match capture.field("Descriptor_Indicator") {
            Some(indicator) => format!("{} {common_name}", indicator_name(indicator)),
            None => common_name.to_owned(),
        };
        let mut record = CandidateRecord::new(id, name, type_path);
        if let Some(naptan) = capture
            .field("NaptanCode")
            .and_then(|value| identifier("naptan", &naptan_dial(value)))
        {
            record.add_identifier(naptan);
        }
        record.location = capture.coordinate("Place_Location_Translation");
        copy_raw_fields(&mut record, capture);
        let reference = capture.field("StopAreas_StopAreaRef").map(str::to_owned);
        Some((code, Captured { record, reference }))
    }
}

fn is_active(start: &BytesStart<'_>) -> bool {
    attribute(start, b"Status").is_none_or(|status| status == "active")
}

fn identifier(namespace: &str, value: &str) -> Option<Identifier> {
    Identifier::new(namespace, value)
        .inspect_err(|err| warn!("Skipping NaPTAN element with bad identifier: {err}"))
        .ok()
}

fn copy_raw_fields(record: &mut CandidateRecord, capture: &Capture) {
    for (key, value) in capture.raw_fields() {
        record.set_extra(key, value);
    }
}

fn stop_type_path(stop_type: &str) -> Option<&'static str> {
    STOP_TYPES
        .iter()
        .find(|(code, _)| *code == stop_type)
        .map(|(_, path)| *path)
}

/// Expand NaPTAN indicator abbreviations word by word.
///
/// Unknown words are kept as written.
#[must_use]
pub fn indicator_name(indicator: &str) -> String {
    indicator
        .split_whitespace()
        .map(|part| {
            let lower = part.to_lowercase();
            INDICATORS
                .iter()
                .find(|(short, _)| *short == lower)
                .map_or(part, |(_, friendly)| *friendly)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Map a NaPTAN SMS code to the digits printed on the stop sign.
///
/// Letters follow the phone keypad; digits are kept.
#[must_use]
pub fn naptan_dial(code: &str) -> String {
    code.chars()
        .map(|ch| {
            if ch.is_ascii_digit() {
                return ch;
            }
            let lower = ch.to_ascii_lowercase();
            if !lower.is_ascii_lowercase() {
                return ch;
            }
            let digit = ((u32::from(lower) - 91) / 3).min(9);
            char::from_digit(digit, 10).unwrap_or(ch)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const SAMPLE: &str = r#"<NaPTAN>
        <StopPoint Status="active">
            <AtcoCode>340000004H5</AtcoCode>
            <NaptanCode>oxfajmjt</NaptanCode>
            <Descriptor>
                <CommonName>Magdalen Street</CommonName>
                <Indicator>opp</Indicator>
            </Descriptor>
            <StopClassification><StopType>BCT</StopType></StopClassification>
            <Place><Location><Translation>
                <Longitude>-1.2585</Longitude>
                <Latitude>51.7546</Latitude>
            </Translation></Location></Place>
        </StopPoint>
        <StopPoint Status="inactive">
            <AtcoCode>340000099</AtcoCode>
            <StopClassification><StopType>BCT</StopType></StopClassification>
        </StopPoint>
        <StopPoint>
            <AtcoCode>340000100</AtcoCode>
            <Descriptor><CommonName>Ferry</CommonName></Descriptor>
            <StopClassification><StopType>FER</StopType></StopClassification>
        </StopPoint>
        <StopPoint>
            <AtcoCode>999000001</AtcoCode>
            <StopClassification><StopType>BCT</StopType></StopClassification>
        </StopPoint>
    </NaPTAN>"#;

    fn parse(xml: &str) -> NaptanDataset {
        NaptanParser::new(["340"])
            .with_chunk_size(ChunkSize::new(7))
            .parse(xml.as_bytes(), "sample.xml")
            .expect("sample parses")
    }

    #[rstest]
    fn keeps_active_mapped_stop_points_in_area() {
        let dataset = parse(SAMPLE);
        assert_eq!(dataset.stop_point_count(), 1);
        let stop = dataset.stop_point("340000004H5").expect("stop kept");
        assert_eq!(stop.name, "Opposite Magdalen Street");
        assert_eq!(stop.type_path, "/transport/bus-stop");
        let ids: Vec<&str> = stop.identifiers().iter().map(Identifier::as_str).collect();
        assert_eq!(ids, vec!["atco:340000004H5", "naptan:69325658"]);
        let location = stop.location.expect("location parsed");
        assert!((location.x - -1.2585).abs() < 1e-9);
        assert!((location.y - 51.7546).abs() < 1e-9);
        assert_eq!(
            stop.extra_text("raw_naptan_Descriptor_CommonName"),
            Some("Magdalen Street")
        );
    }

    #[rstest]
    fn malformed_coordinates_leave_location_empty() {
        let xml = r#"<NaPTAN><StopArea>
            <StopAreaCode>340GOXF</StopAreaCode>
            <Name>Gloucester Green</Name>
            <Location><Translation>
                <Longitude>west</Longitude>
                <Latitude>51.75</Latitude>
            </Translation></Location>
        </StopArea></NaPTAN>"#;
        let dataset = parse(xml);
        let area = dataset.stop_area("340GOXF").expect("area kept");
        assert_eq!(area.location, None);
        assert_eq!(area.type_path, STOP_AREA_TYPE);
    }

    #[rstest]
    #[case::inside_a_capture("<NaPTAN><StopArea><StopAreaCode>340X</StopAreaCode>", "StopArea")]
    #[case::root_left_open(
        "<NaPTAN><StopAreas><StopArea><StopAreaCode>340A</StopAreaCode>\
         <Name>Alpha</Name></StopArea>",
        "StopAreas"
    )]
    #[case::inside_a_skipped_subtree(
        "<NaPTAN><StopArea Status=\"inactive\"><StopAreaCode>340B",
        "StopAreaCode"
    )]
    fn truncated_documents_are_fatal(#[case] xml: &str, #[case] expected: &str) {
        let err = NaptanParser::new(["340"])
            .with_chunk_size(ChunkSize::new(7))
            .parse(xml.as_bytes(), "cut.xml")
            .expect_err("truncated");
        match err {
            NaptanParseError::Truncated { name, element } => {
                assert_eq!(name, "cut.xml");
                assert_eq!(element, expected);
            }
            other => panic!("expected Truncated, got {other:?}"),
        }
    }

    #[rstest]
    fn cancellation_stops_the_parse() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = NaptanParser::new(["340"])
            .with_cancel(cancel)
            .parse(SAMPLE.as_bytes(), "sample.xml")
            .expect_err("cancelled");
        assert!(matches!(
            err,
            NaptanParseError::Source(SourceError::Cancelled { .. })
        ));
    }

    #[rstest]
    fn import_hands_records_to_the_sink() {
        let mut records: Vec<CandidateRecord> = Vec::new();
        let summary = NaptanParser::new(["340"])
            .import(SAMPLE.as_bytes(), "sample.xml", &mut records)
            .expect("import succeeds");
        assert_eq!(summary.stop_points, 1);
        assert_eq!(records.len(), 1);
    }

    #[rstest]
    #[case("23234369", "23234369")]
    #[case("oxfajmjt", "69325658")]
    #[case("OXFA", "6932")]
    fn dials_naptan_codes(#[case] code: &str, #[case] expected: &str) {
        assert_eq!(naptan_dial(code), expected);
    }

    #[rstest]
    #[case("opp", "Opposite")]
    #[case("O/S stand 3", "Outside stand 3")]
    #[case("Stop K", "Stop K")]
    #[case("nr STP", "Near Stop")]
    fn expands_indicators(#[case] indicator: &str, #[case] expected: &str) {
        assert_eq!(indicator_name(indicator), expected);
    }
}
