//! Tag rules that turn OSM elements into candidate records.
//!
//! Provides helpers to:
//! - detect whether an element carries one of the required tags;
//! - drop elements that are disused or not in use; and
//! - map `amenity`/`shop` values onto taxonomy paths.

use std::collections::BTreeMap;

use gazetteer_core::{CandidateRecord, Identifier};
use geo::Coord;
use log::{debug, warn};

/// Tag holding the NaPTAN cross-reference.
pub const ATCO_TAG: &str = "naptan:AtcoCode";

/// Tags that make an element worth importing.
pub const REQUIRED_TAGS: &[&str] = &["amenity", "shop", ATCO_TAG];

/// Tags whose `;`-separated values become record tags.
pub const INDEXED_TAGS: &[&str] = &["cuisine", "brand", "brewery", "operator"];

/// `amenity` values and the taxonomy paths they map to.
pub const AMENITIES: &[(&str, &str)] = &[
    ("atm", "/amenities/atm"),
    ("bank", "/amenities/bank"),
    ("bar", "/amenities/food-drink/bar"),
    ("bicycle_parking", "/transport/bicycle-parking"),
    ("cafe", "/amenities/food-drink/cafe"),
    ("cinema", "/leisure/cinema"),
    ("dentist", "/amenities/health/dentist"),
    ("doctors", "/amenities/health/doctor"),
    ("fast_food", "/amenities/food-drink/fast-food"),
    ("hospital", "/amenities/health/hospital"),
    ("library", "/amenities/public-library"),
    ("parking", "/transport/car-park"),
    ("pharmacy", "/amenities/health/pharmacy"),
    ("post_box", "/amenities/post-box"),
    ("post_office", "/amenities/post-office"),
    ("pub", "/amenities/food-drink/pub"),
    ("recycling", "/amenities/recycling-facility"),
    ("restaurant", "/amenities/food-drink/restaurant"),
    ("swimming_pool", "/leisure/swimming-pool"),
    ("taxi", "/transport/taxi-rank"),
    ("theatre", "/leisure/theatre"),
    ("waste_basket", "/amenities/recycling-facility"),
];

/// `shop` values and the taxonomy paths they map to.
pub const SHOPS: &[(&str, &str)] = &[
    ("bicycle", "/amenities/shop/bicycle"),
    ("book", "/amenities/shop/book"),
    ("convenience", "/amenities/shop/convenience"),
    ("hairdresser", "/amenities/shop/hairdresser"),
    ("supermarket", "/amenities/shop/supermarket"),
];

const BUS_STOP_TYPE: &str = "/transport/bus-stop";

/// OSM element kinds that can become records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsmElementKind {
    /// A single tagged node.
    Node,
    /// A way, located at the centre of its nodes' bounding box.
    Way,
}

impl OsmElementKind {
    /// Name used in `raw_osm_type`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::Way => "way",
        }
    }
}

/// A fully read OSM node or way.
#[derive(Debug, Clone, PartialEq)]
pub struct OsmElement {
    /// Node or way.
    pub kind: OsmElementKind,
    /// OSM element id.
    pub id: i64,
    /// Element version, when the extract carries it.
    pub version: Option<String>,
    /// Position with `x = longitude`, `y = latitude`.
    pub location: Coord<f64>,
    /// Element tags.
    pub tags: BTreeMap<String, String>,
}

impl OsmElement {
    /// Whether the element carries at least one required tag.
    #[must_use]
    pub fn has_required_tag(&self) -> bool {
        has_required_tag(self.tags.keys().map(String::as_str))
    }

    /// Build a candidate record, or `None` when the element is filtered out.
    #[must_use]
    pub fn to_candidate(&self) -> Option<CandidateRecord> {
        if !self.has_required_tag() || !self.is_in_use() {
            return None;
        }
        let Some(type_path) = self.type_path() else {
            debug!("Dropping OSM {} {} with an unmapped type", self.kind.as_str(), self.id);
            return None;
        };
        let id = Identifier::new("osm", &self.id.to_string())
            .inspect_err(|err| warn!("Dropping OSM element: {err}"))
            .ok()?;

        let mut record = CandidateRecord::new(id, self.name(), type_path).with_location(self.location);
        if let Some(atco) = self.tag(ATCO_TAG) {
            match Identifier::new("atco", atco) {
                Ok(identifier) => {
                    record.add_identifier(identifier);
                }
                Err(err) => warn!("Ignoring NaPTAN reference on OSM {}: {err}", self.id),
            }
        }
        record.tags.extend(self.indexed_tags());

        for (key, value) in &self.tags {
            record.set_extra(format!("raw_osm_{key}"), value.as_str());
        }
        record.set_extra("raw_osm_type", self.kind.as_str());
        if let Some(version) = &self.version {
            record.set_extra("raw_osm_version", version.as_str());
        }

        let address = self.address();
        if !address.is_empty() {
            record.set_extra("address", address);
        }
        if let Some(website) = self.tag("website").or_else(|| self.tag("url")) {
            record.set_extra("website", website);
        }
        for key in ["phone", "opening_hours", "collection_times"] {
            if let Some(value) = self.tag(key) {
                record.set_extra(key, value);
            }
        }
        Some(record)
    }

    fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    fn is_in_use(&self) -> bool {
        let in_use = self.tag("life_cycle").is_none_or(|value| value == "in_use");
        let disused = self
            .tag("disused")
            .is_some_and(|value| matches!(value, "1" | "yes" | "true"));
        in_use && !disused
    }

    fn type_path(&self) -> Option<&'static str> {
        if let Some(amenity) = self.tag("amenity") {
            return lookup(AMENITIES, amenity);
        }
        if let Some(shop) = self.tag("shop") {
            return lookup(SHOPS, shop);
        }
        (self.tag("highway") == Some("bus_stop")).then_some(BUS_STOP_TYPE)
    }

    fn name(&self) -> String {
        self.tag("name")
            .or_else(|| self.tag("operator"))
            .map_or_else(
                || format!("\u{219d} {:.6}, {:.6}", self.location.x, self.location.y),
                str::to_owned,
            )
    }

    fn indexed_tags(&self) -> impl Iterator<Item = String> + '_ {
        INDEXED_TAGS
            .iter()
            .filter_map(|key| self.tag(key))
            .flat_map(|value| value.split(';'))
            .map(|part| part.replace('_', " ").trim().to_owned())
            .filter(|part| !part.is_empty())
    }

    fn address(&self) -> String {
        ["addr:housename", "addr:housenumber", "addr:street", "addr:postcode"]
            .iter()
            .filter_map(|key| self.tag(key))
            .flat_map(str::split_whitespace)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Whether any of `keys` is a required tag.
pub fn has_required_tag<'a, I>(keys: I) -> bool
where
    I: IntoIterator<Item = &'a str>,
{
    keys.into_iter().any(|key| REQUIRED_TAGS.contains(&key))
}

fn lookup(table: &[(&str, &'static str)], value: &str) -> Option<&'static str> {
    table
        .iter()
        .find(|(key, _)| *key == value)
        .map(|(_, path)| *path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn pub_node() -> OsmElement {
        OsmElement {
            kind: OsmElementKind::Node,
            id: 4_333_225,
            version: Some("7".to_owned()),
            location: Coord { x: -1.2606, y: 51.7572 },
            tags: BTreeMap::from([
                ("amenity".to_owned(), "pub".to_owned()),
                ("name".to_owned(), "The Eagle and Child".to_owned()),
                ("brewery".to_owned(), "Greene_King;Hook Norton".to_owned()),
                ("addr:housenumber".to_owned(), "49".to_owned()),
                ("addr:street".to_owned(), " St Giles' ".to_owned()),
                ("url".to_owned(), "http://old.example".to_owned()),
                ("website".to_owned(), "https://eagle.example".to_owned()),
            ]),
        }
    }

    #[rstest]
    fn builds_a_record_from_a_pub(pub_node: OsmElement) {
        let record = pub_node.to_candidate().expect("pub is imported");
        assert_eq!(record.id().as_str(), "osm:4333225");
        assert_eq!(record.type_path, "/amenities/food-drink/pub");
        assert_eq!(record.name, "The Eagle and Child");
        assert!(record.tags.contains("Greene King"));
        assert!(record.tags.contains("Hook Norton"));
        assert_eq!(record.extra_text("address"), Some("49 St Giles'"));
        assert_eq!(record.extra_text("website"), Some("https://eagle.example"));
        assert_eq!(record.extra_text("raw_osm_type"), Some("node"));
        assert_eq!(record.extra_text("raw_osm_version"), Some("7"));
        assert_eq!(record.extra_text("raw_osm_amenity"), Some("pub"));
    }

    #[rstest]
    #[case("life_cycle", "disused")]
    #[case("disused", "yes")]
    #[case("amenity", "bench")]
    fn drops_filtered_elements(mut pub_node: OsmElement, #[case] key: &str, #[case] value: &str) {
        pub_node.tags.insert(key.to_owned(), value.to_owned());
        assert_eq!(pub_node.to_candidate(), None);
    }

    #[rstest]
    fn bus_stops_carry_their_atco_code() {
        let element = OsmElement {
            kind: OsmElementKind::Node,
            id: 12,
            version: None,
            location: Coord { x: 0.5, y: 1.5 },
            tags: BTreeMap::from([
                (ATCO_TAG.to_owned(), "340000004H5".to_owned()),
                ("highway".to_owned(), "bus_stop".to_owned()),
            ]),
        };
        let record = element.to_candidate().expect("bus stop is imported");
        assert_eq!(record.type_path, "/transport/bus-stop");
        let ids: Vec<&str> = record.identifiers().iter().map(Identifier::as_str).collect();
        assert_eq!(ids, vec!["atco:340000004H5", "osm:12"]);
        assert_eq!(record.name, "\u{219d} 0.500000, 1.500000");
    }

    #[rstest]
    fn elements_without_required_tags_are_ignored() {
        let element = OsmElement {
            kind: OsmElementKind::Way,
            id: 3,
            version: None,
            location: Coord { x: 0.0, y: 0.0 },
            tags: BTreeMap::from([("highway".to_owned(), "bus_stop".to_owned())]),
        };
        assert!(!element.has_required_tag());
        assert_eq!(element.to_candidate(), None);
    }
}
