//! Candidate records from the OxPoints linked-data graph.
//!
//! Every subject typed with one of [`OXPOINTS_TYPES`] becomes one record.
//! Identifiers are read from the subject and from its primary place, so a
//! department picks up the OSM way of the building it occupies. Locations
//! and shapes come from [`GraphResolver`].

use std::collections::BTreeSet;

use gazetteer_core::{Attribute, CandidateRecord, Identifier};
use log::{debug, info, warn};
use thiserror::Error;

use crate::rdf::vocab::{
    DC_TITLE, DCT_IS_PART_OF, FOAF_HOMEPAGE, IDENTIFIER_PREDICATES, ORG_SUB_ORGANIZATION_OF,
    OXPOINTS_ID_BASE, SKOS_ALT_LABEL, SKOS_HIDDEN_LABEL, SPATIALLY_WITHIN, VCARD_ADR,
    VCARD_POSTAL_CODE, VCARD_STREET_ADDRESS, oxp,
};
use crate::rdf::{GraphResolver, Node, Term, TripleGraph};
use crate::sink::{RecordSink, SinkError, emit};

/// OxPoints classes that are imported, with their taxonomy paths.
///
/// A subject carrying several of these types is imported once, under the
/// first listed.
pub const OXPOINTS_TYPES: &[(&str, &str)] = &[
    ("College", "/university/college"),
    ("Department", "/university/department"),
    ("Carpark", "/transport/car-park/university"),
    ("Room", "/university/room"),
    ("Library", "/university/library"),
    ("SubLibrary", "/university/library/sub-library"),
    ("Museum", "/leisure/museum"),
    ("Building", "/university/building"),
    ("Unit", "/university/department"),
    ("Faculty", "/university/department"),
    ("Division", "/university/division"),
    ("University", "/university"),
    ("Space", "/university/space"),
    ("Site", "/university/site"),
    ("Hall", "/university/hall"),
];

/// Identifier namespace of OxPoints resources.
pub const OXPOINTS_NAMESPACE: &str = "oxpoints";

/// Errors that abort an OxPoints import.
#[derive(Debug, Error)]
pub enum OxPointsError {
    /// The record sink refused a record.
    #[error("failed to hand OxPoints record for {id} to its sink")]
    Sink {
        /// Identifier of the refused record.
        id: String,
        /// Sink failure.
        #[source]
        source: SinkError,
    },
}

/// Counts reported after an import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OxPointsSummary {
    /// Records emitted.
    pub emitted: usize,
    /// Typed subjects skipped for lacking a title or a usable IRI.
    pub skipped: usize,
}

/// Builds candidate records from a loaded graph.
#[derive(Debug, Clone)]
pub struct OxPointsImporter<'g> {
    graph: &'g TripleGraph,
    resolver: GraphResolver<'g>,
    ancestry: [String; 4],
    primary_place: String,
}

impl<'g> OxPointsImporter<'g> {
    /// Importer over `graph` with the default traversal bound.
    #[must_use]
    pub fn new(graph: &'g TripleGraph) -> Self {
        Self::with_resolver(GraphResolver::new(graph))
    }

    /// Importer using a preconfigured resolver.
    #[must_use]
    pub fn with_resolver(resolver: GraphResolver<'g>) -> Self {
        Self {
            graph: resolver.graph(),
            resolver,
            ancestry: [
                ORG_SUB_ORGANIZATION_OF.to_owned(),
                DCT_IS_PART_OF.to_owned(),
                SPATIALLY_WITHIN.to_owned(),
                oxp("occupies"),
            ],
            primary_place: oxp("primaryPlace"),
        }
    }

    /// Records for every imported subject, ordered by type table then IRI.
    #[must_use]
    pub fn records(&self) -> Vec<CandidateRecord> {
        self.typed_subjects()
            .into_iter()
            .filter_map(|(subject, type_path)| self.record(subject, type_path))
            .collect()
    }

    /// Hand every record to `sink`.
    ///
    /// # Errors
    /// Returns [`OxPointsError::Sink`] for the first record the sink refuses.
    pub fn import<S: RecordSink + ?Sized>(
        &self,
        sink: &mut S,
    ) -> Result<OxPointsSummary, OxPointsError> {
        let mut summary = OxPointsSummary::default();
        for (subject, type_path) in self.typed_subjects() {
            let Some(record) = self.record(subject, type_path) else {
                summary.skipped += 1;
                continue;
            };
            let id = record.id().to_string();
            emit(sink, record).map_err(|source| OxPointsError::Sink { id, source })?;
            summary.emitted += 1;
        }
        info!(
            "OxPoints import emitted {} records ({} skipped)",
            summary.emitted, summary.skipped
        );
        Ok(summary)
    }

    fn typed_subjects(&self) -> Vec<(&'g Node, &'static str)> {
        let mut seen = BTreeSet::new();
        let mut subjects = Vec::new();
        for (class, type_path) in OXPOINTS_TYPES {
            for subject in self.graph.subjects_of_type(&oxp(class)) {
                if seen.insert(subject) {
                    subjects.push((subject, *type_path));
                }
            }
        }
        subjects
    }

    /// Record for one subject, or `None` when it cannot be identified or
    /// has no title.
    #[must_use]
    pub fn record(&self, subject: &Node, type_path: &str) -> Option<CandidateRecord> {
        let id = resource_identifier(subject)?;
        let Some(title) = self.graph.literal(subject, DC_TITLE) else {
            warn!("Skipping OxPoints resource {subject} without a dc:title");
            return None;
        };
        let mut record = CandidateRecord::new(id, title.trim(), type_path);

        for identifier in self.identifiers(subject) {
            record.add_identifier(identifier);
        }
        record.location = self.resolver.location(subject);
        record.shape = self.resolver.shape(subject);

        let alternative_names: BTreeSet<String> = self
            .graph
            .literals(subject, SKOS_ALT_LABEL)
            .chain(self.graph.literals(subject, SKOS_HIDDEN_LABEL))
            .map(|label| label.trim().to_owned())
            .filter(|label| !label.is_empty())
            .collect();
        if !alternative_names.is_empty() {
            record.set_extra(
                "alternative_names",
                Attribute::List(alternative_names.into_iter().collect()),
            );
        }
        if let Some(address) = self.address(subject) {
            record.set_extra("address", address);
        }
        if let Some(website) = self.graph.object(subject, FOAF_HOMEPAGE).and_then(term_text) {
            record.set_extra("website", website);
        }

        for relation in &self.ancestry {
            record.child_of.extend(
                self.graph
                    .objects(subject, relation)
                    .filter_map(Term::as_node)
                    .filter_map(resource_identifier),
            );
            record.parent_of.extend(
                self.graph
                    .subjects(relation, subject)
                    .filter_map(resource_identifier),
            );
        }
        debug!("Built OxPoints record {}", record.id());
        Some(record)
    }

    fn identifiers(&self, subject: &Node) -> Vec<Identifier> {
        let place = self.graph.node(subject, &self.primary_place);
        let mut identifiers = Vec::new();
        for (term, namespace) in IDENTIFIER_PREDICATES {
            let iri = oxp(term);
            let predicate = iri.as_str();
            let graph = self.graph;
            let values = graph
                .literals(subject, predicate)
                .chain(place.into_iter().flat_map(move |place| graph.literals(place, predicate)));
            for raw in values {
                let Some(value) = identifier_value(namespace, raw) else {
                    warn!("Ignoring malformed {namespace} identifier {raw:?} on {subject}");
                    continue;
                };
                match Identifier::new(namespace, &value) {
                    Ok(identifier) => identifiers.push(identifier),
                    Err(err) => warn!("Ignoring identifier on {subject}: {err}"),
                }
            }
        }
        identifiers
    }

    fn address(&self, subject: &Node) -> Option<String> {
        let adr = self.graph.node(subject, VCARD_ADR)?;
        let parts: Vec<&str> = [VCARD_STREET_ADDRESS, VCARD_POSTAL_CODE]
            .into_iter()
            .filter_map(|predicate| self.graph.literal(adr, predicate))
            .collect();
        let address = parts.join(" ").split_whitespace().collect::<Vec<_>>().join(" ");
        (!address.is_empty()).then_some(address)
    }
}

/// `oxpoints:<id>` for resources under the OxPoints id base.
#[must_use]
pub fn resource_identifier(node: &Node) -> Option<Identifier> {
    let local = node.as_iri()?.strip_prefix(OXPOINTS_ID_BASE)?;
    Identifier::new(OXPOINTS_NAMESPACE, local).ok()
}

/// Normalise an identifier literal. OSM values carry their element kind
/// (`way/4333225`), which is dropped.
fn identifier_value(namespace: &str, raw: &str) -> Option<String> {
    let raw = raw.trim();
    let value = if namespace == "osm" {
        raw.split('/').nth(1)?
    } else {
        raw
    };
    let value = value.replace([' ', '/'], "-");
    (!value.is_empty()).then_some(value)
}

fn term_text(term: &Term) -> Option<String> {
    match term {
        Term::Node(node) => node.as_iri().map(str::to_owned),
        Term::Literal(text) => Some(text.trim().to_owned()),
    }
}
