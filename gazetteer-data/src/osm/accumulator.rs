//! Internal accumulator shared by the OSM XML and PBF readers.
//!
//! Keeps the node-id → coordinate table ways are resolved against and
//! counts what the reader saw.
use std::collections::{BTreeMap, HashMap};

use gazetteer_core::CandidateRecord;
use geo::{Coord, Rect};
use log::warn;

use super::OsmSummary;
use super::tags::{OsmElement, OsmElementKind};

#[derive(Debug, Default)]
pub(super) struct OsmAccumulator {
    summary: OsmSummary,
    nodes: HashMap<i64, Coord<f64>>,
}

impl OsmAccumulator {
    /// Record a node and return its candidate, if it qualifies.
    pub(super) fn node(
        &mut self,
        id: i64,
        lon: f64,
        lat: f64,
        version: Option<String>,
        tags: BTreeMap<String, String>,
    ) -> Option<CandidateRecord> {
        self.summary.nodes += 1;
        let Some(location) = validated_coord(lon, lat) else {
            warn!("Skipping OSM node {id} with out-of-range coordinate ({lon}, {lat})");
            return None;
        };
        self.nodes.insert(id, location);
        if tags.is_empty() {
            return None;
        }
        self.emit(OsmElement {
            kind: OsmElementKind::Node,
            id,
            version,
            location,
            tags,
        })
    }

    /// Record a way and return its candidate, if it qualifies.
    ///
    /// References to nodes not seen earlier in the stream are skipped.
    pub(super) fn way(
        &mut self,
        id: i64,
        refs: &[i64],
        version: Option<String>,
        tags: BTreeMap<String, String>,
    ) -> Option<CandidateRecord> {
        self.summary.ways += 1;
        if !super::tags::has_required_tag(tags.keys().map(String::as_str)) {
            return None;
        }
        let Some(location) = self.centroid(refs) else {
            warn!("Dropping OSM way {id}: none of its {} nodes were found", refs.len());
            self.summary.unresolved_ways += 1;
            return None;
        };
        self.emit(OsmElement {
            kind: OsmElementKind::Way,
            id,
            version,
            location,
            tags,
        })
    }

    pub(super) fn relation(&mut self) {
        self.summary.relations += 1;
    }

    pub(super) fn record_bytes(&mut self, bytes: u64) {
        self.summary.bytes_read = bytes;
    }

    pub(super) fn into_summary(self) -> OsmSummary {
        self.summary
    }

    fn emit(&mut self, element: OsmElement) -> Option<CandidateRecord> {
        let record = element.to_candidate();
        if record.is_some() {
            self.summary.emitted += 1;
        }
        record
    }

    /// Centre of the bounding box of the resolvable nodes in `refs`.
    fn centroid(&self, refs: &[i64]) -> Option<Coord<f64>> {
        let mut coords = refs.iter().filter_map(|node| self.nodes.get(node)).copied();
        let first = coords.next()?;
        let bounds = coords.fold(Rect::new(first, first), |bounds, coord| {
            Rect::new(
                Coord {
                    x: bounds.min().x.min(coord.x),
                    y: bounds.min().y.min(coord.y),
                },
                Coord {
                    x: bounds.max().x.max(coord.x),
                    y: bounds.max().y.max(coord.y),
                },
            )
        });
        Some(bounds.center())
    }
}

pub(super) fn validated_coord(lon: f64, lat: f64) -> Option<Coord<f64>> {
    (lon.is_finite()
        && lat.is_finite()
        && (-180.0..=180.0).contains(&lon)
        && (-90.0..=90.0).contains(&lat))
    .then_some(Coord { x: lon, y: lat })
}
