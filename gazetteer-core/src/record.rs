//! Source-origin candidate records.
//!
//! A [`CandidateRecord`] is what a source parser hands to the
//! reconciliation driver: one real-world entity as seen by one feed,
//! before it has been matched against the canonical store.

use std::collections::{BTreeMap, BTreeSet};

use geo::Coord;
use serde::{Deserialize, Serialize};

use crate::Identifier;

/// Value of a source-specific extra attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Attribute {
    /// Single text value.
    Text(String),
    /// Multi-valued text, e.g. alternative names.
    List(Vec<String>),
}

impl From<&str> for Attribute {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for Attribute {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<String>> for Attribute {
    fn from(values: Vec<String>) -> Self {
        Self::List(values)
    }
}

impl From<Attribute> for serde_json::Value {
    fn from(attribute: Attribute) -> Self {
        match attribute {
            Attribute::Text(text) => Self::String(text),
            Attribute::List(values) => Self::Array(values.into_iter().map(Self::String).collect()),
        }
    }
}

/// One entity extracted from a single source.
///
/// The identifier set is private: it always contains [`CandidateRecord::id`]
/// and can only grow.
///
/// # Examples
/// ```
/// use gazetteer_core::{CandidateRecord, Identifier};
///
/// let id: Identifier = "osm:4333225".parse()?;
/// let mut record = CandidateRecord::new(id.clone(), "The Eagle and Child", "/amenities/food-drink/pub");
/// record.add_identifier("atco:340000001".parse()?);
/// assert!(record.identifiers().contains(&id));
/// assert_eq!(record.identifiers().len(), 2);
/// # Ok::<(), gazetteer_core::IdentifierError>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateRecord {
    id: Identifier,
    identifiers: BTreeSet<Identifier>,
    /// Display name.
    pub name: String,
    /// Slash-delimited taxonomy path, e.g. `/transport/bus-stop`.
    pub type_path: String,
    /// WGS84 position with `x = longitude`, `y = latitude`.
    pub location: Option<Coord<f64>>,
    /// Well-known-text geometry.
    pub shape: Option<String>,
    /// Identifiers of contained entities.
    pub parent_of: BTreeSet<Identifier>,
    /// Identifiers of containing entities.
    pub child_of: BTreeSet<Identifier>,
    /// Free-text labels accumulated across sources.
    pub tags: BTreeSet<String>,
    /// Source-specific payload such as `raw_osm_amenity` or `website`.
    pub extras: BTreeMap<String, Attribute>,
}

impl CandidateRecord {
    /// Create a record whose identifier set holds only `id`.
    #[must_use]
    pub fn new(id: Identifier, name: impl Into<String>, type_path: impl Into<String>) -> Self {
        let identifiers = BTreeSet::from([id.clone()]);
        Self {
            id,
            identifiers,
            name: name.into(),
            type_path: type_path.into(),
            location: None,
            shape: None,
            parent_of: BTreeSet::new(),
            child_of: BTreeSet::new(),
            tags: BTreeSet::new(),
            extras: BTreeMap::new(),
        }
    }

    /// The record's own identifier; becomes the document id on creation.
    #[must_use]
    pub const fn id(&self) -> &Identifier {
        &self.id
    }

    /// All identifiers known for this entity, including [`Self::id`].
    #[must_use]
    pub const fn identifiers(&self) -> &BTreeSet<Identifier> {
        &self.identifiers
    }

    /// Add an alternative identifier. Returns `false` when already present.
    pub fn add_identifier(&mut self, identifier: Identifier) -> bool {
        self.identifiers.insert(identifier)
    }

    /// Set the location.
    #[must_use]
    pub const fn with_location(mut self, location: Coord<f64>) -> Self {
        self.location = Some(location);
        self
    }

    /// Store an extra attribute, replacing any previous value.
    pub fn set_extra(&mut self, key: impl Into<String>, value: impl Into<Attribute>) {
        self.extras.insert(key.into(), value.into());
    }

    /// Look up a text extra attribute.
    #[must_use]
    pub fn extra_text(&self, key: &str) -> Option<&str> {
        match self.extras.get(key) {
            Some(Attribute::Text(text)) => Some(text),
            _ => None,
        }
    }
}
