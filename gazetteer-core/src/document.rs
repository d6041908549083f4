//! Canonical documents as persisted in the search index.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use geo::Coord;
use serde::{Deserialize, Serialize};

use crate::{CandidateRecord, Identifier};

/// Reliability rank of a source feed.
///
/// Higher values win when two sources disagree on a managed field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Precedence(pub i32);

impl Precedence {
    /// Default rank of the NaPTAN transit register.
    pub const NAPTAN: Self = Self(10);
    /// Default rank of OpenStreetMap extracts.
    pub const OSM: Self = Self(5);
    /// Default rank of the OxPoints graph.
    pub const OXPOINTS: Self = Self(10);
    /// Default rank of the library data feed.
    pub const LIBRARY: Self = Self(10);
}

impl fmt::Display for Precedence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Merged record of one entity.
///
/// Serialises to the index's JSON shape. Empty sets and absent values are
/// omitted; unknown index fields are kept in [`CanonicalDocument::extras`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CanonicalDocument {
    /// Document key in the index.
    pub id: String,
    /// Union of every identifier seen for this entity.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub identifiers: BTreeSet<Identifier>,
    /// Managed display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Taxonomy path.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_path: Option<String>,
    /// Human-readable singular name for [`Self::type_path`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    /// Managed position, persisted as `"lat,lon"`.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "lat_lon")]
    pub location: Option<Coord<f64>>,
    /// Well-known-text geometry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<String>,
    /// Contained entities.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub parent_of: BTreeSet<Identifier>,
    /// Containing entities.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub child_of: BTreeSet<Identifier>,
    /// Accumulated labels.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
    /// Precedence of the last write that changed a managed field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_precedence: Option<Precedence>,
    /// Every other field, last writer wins.
    #[serde(flatten)]
    pub extras: BTreeMap<String, serde_json::Value>,
}

impl CanonicalDocument {
    /// Build a fresh document from a first sighting.
    #[must_use]
    pub fn from_candidate(candidate: CandidateRecord, precedence: Precedence) -> Self {
        let mut document = Self {
            id: candidate.id().to_string(),
            identifiers: candidate.identifiers().clone(),
            name: Some(candidate.name),
            type_path: Some(candidate.type_path),
            type_name: None,
            location: candidate.location,
            shape: candidate.shape,
            parent_of: candidate.parent_of,
            child_of: candidate.child_of,
            tags: candidate.tags,
            meta_precedence: Some(precedence),
            extras: BTreeMap::new(),
        };
        document.extras.extend(
            candidate
                .extras
                .into_iter()
                .map(|(key, value)| (key, serde_json::Value::from(value))),
        );
        document
    }

    /// Whether any of `identifiers` is already recorded on this document.
    pub fn shares_identifier<'a, I>(&self, identifiers: I) -> bool
    where
        I: IntoIterator<Item = &'a Identifier>,
    {
        identifiers
            .into_iter()
            .any(|identifier| self.identifiers.contains(identifier))
    }
}

/// Parse a `"lat,lon"` pair into a WGS84 coordinate.
///
/// # Examples
/// ```
/// use gazetteer_core::parse_lat_lon;
///
/// let coord = parse_lat_lon("51.75,-1.25").expect("valid pair");
/// assert_eq!(coord.x, -1.25);
/// assert_eq!(coord.y, 51.75);
/// ```
#[must_use]
pub fn parse_lat_lon(raw: &str) -> Option<Coord<f64>> {
    let (lat, lon) = raw.split_once(',')?;
    let lat: f64 = lat.trim().parse().ok()?;
    let lon: f64 = lon.trim().parse().ok()?;
    (lat.is_finite() && lon.is_finite()).then_some(Coord { x: lon, y: lat })
}

/// Render a coordinate as `"lat,lon"`.
#[must_use]
pub fn format_lat_lon(coord: Coord<f64>) -> String {
    format!("{},{}", coord.y, coord.x)
}

mod lat_lon {
    use geo::Coord;
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    pub(super) fn serialize<S: Serializer>(
        value: &Option<Coord<f64>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(coord) => serializer.serialize_str(&super::format_lat_lon(*coord)),
            None => serializer.serialize_none(),
        }
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Coord<f64>>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        raw.map(|text| {
            super::parse_lat_lon(&text)
                .ok_or_else(|| D::Error::custom(format!("invalid lat,lon pair {text:?}")))
        })
        .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn id(raw: &str) -> Identifier {
        raw.parse().expect("valid identifier")
    }

    #[rstest]
    fn serialises_index_shape() {
        let mut candidate = CandidateRecord::new(id("atco:639000022"), "Albyn Grove", "/transport/bus-stop")
            .with_location(Coord { x: -2.5, y: 57.25 });
        candidate.set_extra("raw_naptan_AtcoCode", "639000022");
        let document = CanonicalDocument::from_candidate(candidate, Precedence::NAPTAN);

        let value = serde_json::to_value(&document).expect("serialise");

        assert_eq!(
            value,
            json!({
                "id": "atco:639000022",
                "identifiers": ["atco:639000022"],
                "name": "Albyn Grove",
                "type": "/transport/bus-stop",
                "location": "57.25,-2.5",
                "meta_precedence": 10,
                "raw_naptan_AtcoCode": "639000022",
            })
        );
    }

    #[rstest]
    fn empty_ancestry_is_omitted() {
        let candidate = CandidateRecord::new(id("stoparea:X"), "X", "/transport/bus-stop-area");
        let document = CanonicalDocument::from_candidate(candidate, Precedence(1));
        let value = serde_json::to_value(&document).expect("serialise");
        assert!(value.get("child_of").is_none());
        assert!(value.get("parent_of").is_none());
        assert!(value.get("tags").is_none());
    }

    #[rstest]
    fn reads_documents_without_precedence() {
        let document: CanonicalDocument = serde_json::from_value(json!({
            "id": "osm:1",
            "identifiers": ["osm:1"],
            "location": "51.5,-0.1",
            "_version_": 1_234_567,
        }))
        .expect("deserialise");

        assert_eq!(document.meta_precedence, None);
        assert_eq!(document.location, Some(Coord { x: -0.1, y: 51.5 }));
        assert_eq!(document.extras.get("_version_"), Some(&json!(1_234_567)));
    }

    #[rstest]
    #[case("51.5")]
    #[case("north,south")]
    #[case("NaN,1")]
    fn rejects_malformed_lat_lon(#[case] raw: &str) {
        assert_eq!(parse_lat_lon(raw), None);
    }
}
