//! Event loop for `.osm` XML extracts.

use std::collections::BTreeMap;
use std::io::Read;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use super::accumulator::OsmAccumulator;
use super::{OsmParseError, OsmSummary, xml_error};
use crate::sink::{RecordSink, emit};
use crate::source::{CancelToken, SourceReader};
use crate::xml::{attribute, element_name};

/// Element currently open at the top level.
#[derive(Debug)]
enum Open {
    Node {
        id: i64,
        lon: f64,
        lat: f64,
        version: Option<String>,
        tags: BTreeMap<String, String>,
    },
    Way {
        id: i64,
        version: Option<String>,
        refs: Vec<i64>,
        tags: BTreeMap<String, String>,
    },
    Relation,
}

pub(super) fn read<R, S>(
    reader: SourceReader<R>,
    name: &str,
    cancel: &CancelToken,
    sink: &mut S,
) -> Result<OsmSummary, OsmParseError>
where
    R: Read,
    S: RecordSink + ?Sized,
{
    let mut xml = Reader::from_reader(reader.buffered());
    let mut accumulator = OsmAccumulator::default();
    let mut open: Option<Open> = None;
    let mut open_tags: Vec<String> = Vec::new();
    let mut buf = Vec::new();

    loop {
        let event = match xml.read_event_into(&mut buf) {
            Ok(event) => event,
            Err(source) => return Err(xml_error(name, xml.buffer_position(), cancel, source)),
        };
        match event {
            Event::Start(start) => {
                let tag = element_name(&start);
                if let Some(element) = open_element(&tag, &start, name)? {
                    open = Some(element);
                } else {
                    child(&tag, &start, open.as_mut(), name)?;
                }
                open_tags.push(tag);
            }
            Event::Empty(start) => {
                let tag = element_name(&start);
                if let Some(element) = open_element(&tag, &start, name)? {
                    finish(element, &mut accumulator, sink)?;
                } else {
                    child(&tag, &start, open.as_mut(), name)?;
                }
            }
            Event::End(end) => {
                open_tags.pop();
                if matches!(end.name().as_ref(), b"node" | b"way" | b"relation") {
                    if let Some(element) = open.take() {
                        finish(element, &mut accumulator, sink)?;
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if let Some(element) = open_tags.pop() {
        return Err(OsmParseError::Truncated {
            name: name.to_owned(),
            element,
        });
    }
    accumulator.record_bytes(xml.get_ref().get_ref().bytes_read());
    Ok(accumulator.into_summary())
}

fn open_element(
    tag: &str,
    start: &BytesStart<'_>,
    name: &str,
) -> Result<Option<Open>, OsmParseError> {
    let element = match tag {
        "node" => Open::Node {
            id: parsed(start, tag, "id", name)?,
            lon: parsed(start, tag, "lon", name)?,
            lat: parsed(start, tag, "lat", name)?,
            version: attribute(start, b"version"),
            tags: BTreeMap::new(),
        },
        "way" => Open::Way {
            id: parsed(start, tag, "id", name)?,
            version: attribute(start, b"version"),
            refs: Vec::new(),
            tags: BTreeMap::new(),
        },
        "relation" => Open::Relation,
        _ => return Ok(None),
    };
    Ok(Some(element))
}

fn child(
    tag: &str,
    start: &BytesStart<'_>,
    open: Option<&mut Open>,
    name: &str,
) -> Result<(), OsmParseError> {
    match (tag, open) {
        ("tag", Some(Open::Node { tags, .. } | Open::Way { tags, .. })) => {
            if let (Some(key), Some(value)) = (attribute(start, b"k"), attribute(start, b"v")) {
                tags.insert(key, value);
            }
        }
        ("nd", Some(Open::Way { refs, .. })) => refs.push(parsed(start, tag, "ref", name)?),
        _ => {}
    }
    Ok(())
}

fn finish<S: RecordSink + ?Sized>(
    element: Open,
    accumulator: &mut OsmAccumulator,
    sink: &mut S,
) -> Result<(), OsmParseError> {
    let record = match element {
        Open::Node {
            id,
            lon,
            lat,
            version,
            tags,
        } => accumulator.node(id, lon, lat, version, tags),
        Open::Way {
            id,
            version,
            refs,
            tags,
        } => accumulator.way(id, &refs, version, tags),
        Open::Relation => {
            accumulator.relation();
            None
        }
    };
    match record {
        Some(record) => emit(sink, record).map_err(|source| OsmParseError::Sink { source }),
        None => Ok(()),
    }
}

fn parsed<T: std::str::FromStr>(
    start: &BytesStart<'_>,
    element: &str,
    key: &str,
    name: &str,
) -> Result<T, OsmParseError> {
    let raw = attribute(start, key.as_bytes());
    raw.as_deref()
        .and_then(|value| value.trim().parse().ok())
        .ok_or_else(|| OsmParseError::Attribute {
            name: name.to_owned(),
            element: element.to_owned(),
            attribute: key.to_owned(),
            value: raw.unwrap_or_default(),
        })
}
