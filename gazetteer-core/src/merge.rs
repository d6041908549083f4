//! Precedence-aware merging of candidate records into canonical documents.

use std::sync::Arc;

use log::{debug, warn};
use thiserror::Error;

use crate::{CandidateRecord, CanonicalDocument, Identifier, Precedence, Taxonomy};

/// Several canonical documents claim the candidate's identifiers.
///
/// The merger cannot pick a target safely; the record must be skipped.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{candidate} matches {} canonical documents ({})", .document_ids.len(), .document_ids.join(", "))]
pub struct ConflictError {
    /// Identifier of the rejected candidate.
    pub candidate: Identifier,
    /// Every identifier carried by the candidate.
    pub identifiers: Vec<Identifier>,
    /// Ids of the colliding documents.
    pub document_ids: Vec<String>,
}

/// What the merger did with a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeAction {
    /// No document matched; a new one was built.
    Created,
    /// The candidate was folded into its single match.
    Merged {
        /// Whether the managed fields were overwritten.
        managed_updated: bool,
    },
}

/// A merged document together with the action taken.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    /// Document ready for indexing.
    pub document: CanonicalDocument,
    /// Branch taken by the merger.
    pub action: MergeAction,
}

/// Decides between create, merge and conflict for each candidate.
///
/// Rules for a single match:
/// - `identifiers`, `tags` and the ancestry sets are unions; nothing is
///   ever removed.
/// - `name` and `location` are managed: replaced only when the candidate's
///   precedence is strictly greater than the document's, which also raises
///   `meta_precedence`.
/// - Every other field the candidate carries replaces the stored value.
///
/// # Examples
/// ```
/// use std::sync::Arc;
/// use gazetteer_core::{CandidateRecord, DocumentMerger, MergeAction, Precedence, Taxonomy};
///
/// let merger = DocumentMerger::new(Arc::new(Taxonomy::builtin()?));
/// let candidate = CandidateRecord::new("atco:1".parse()?, "Stop", "/transport/bus-stop");
/// let outcome = merger.merge(candidate, &[], Precedence(10))?;
/// assert_eq!(outcome.action, MergeAction::Created);
/// assert_eq!(outcome.document.meta_precedence, Some(Precedence(10)));
/// assert_eq!(outcome.document.type_name.as_deref(), Some("Bus stop"));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone)]
pub struct DocumentMerger {
    taxonomy: Arc<Taxonomy>,
}

impl DocumentMerger {
    /// Create a merger that enriches type names from `taxonomy`.
    #[must_use]
    pub const fn new(taxonomy: Arc<Taxonomy>) -> Self {
        Self { taxonomy }
    }

    /// The taxonomy used for type-name enrichment.
    #[must_use]
    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    /// Merge `candidate` into the documents matching its identifiers.
    ///
    /// `existing` is never modified; the single-match branch works on a
    /// copy.
    pub fn merge(
        &self,
        candidate: CandidateRecord,
        existing: &[CanonicalDocument],
        precedence: Precedence,
    ) -> Result<MergeOutcome, ConflictError> {
        match existing {
            [] => {
                let mut document = CanonicalDocument::from_candidate(candidate, precedence);
                document.type_name = self.type_name(document.type_path.as_deref());
                Ok(MergeOutcome {
                    document,
                    action: MergeAction::Created,
                })
            }
            [current] => Ok(self.merge_into(candidate, current.clone(), precedence)),
            several => Err(ConflictError {
                candidate: candidate.id().clone(),
                identifiers: candidate.identifiers().iter().cloned().collect(),
                document_ids: several.iter().map(|doc| doc.id.clone()).collect(),
            }),
        }
    }

    fn merge_into(
        &self,
        candidate: CandidateRecord,
        mut document: CanonicalDocument,
        precedence: Precedence,
    ) -> MergeOutcome {
        document
            .identifiers
            .extend(candidate.identifiers().iter().cloned());

        let CandidateRecord {
            name,
            type_path,
            location,
            shape,
            parent_of,
            child_of,
            tags,
            extras,
            ..
        } = candidate;

        document.tags.extend(tags);
        document.parent_of.extend(parent_of);
        document.child_of.extend(child_of);

        let managed_updated = Some(precedence) > document.meta_precedence;
        if managed_updated {
            document.meta_precedence = Some(precedence);
            document.name = Some(name);
            if location.is_some() {
                document.location = location;
            }
        } else {
            debug!(
                "kept managed fields of {} (precedence {precedence} does not beat {:?})",
                document.id, document.meta_precedence
            );
        }

        document.type_name = self.type_name(Some(&type_path));
        document.type_path = Some(type_path);
        if shape.is_some() {
            document.shape = shape;
        }
        document.extras.extend(
            extras
                .into_iter()
                .map(|(key, value)| (key, serde_json::Value::from(value))),
        );

        MergeOutcome {
            document,
            action: MergeAction::Merged { managed_updated },
        }
    }

    fn type_name(&self, path: Option<&str>) -> Option<String> {
        let path = path?;
        let name = self.taxonomy.type_name(path).map(str::to_owned);
        if name.is_none() {
            warn!("no taxonomy entry for type {path}; omitting type_name");
        }
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Coord;
    use rstest::{fixture, rstest};

    fn id(raw: &str) -> Identifier {
        raw.parse().expect("valid identifier")
    }

    #[fixture]
    fn merger() -> DocumentMerger {
        DocumentMerger::new(Arc::new(Taxonomy::builtin().expect("bundled taxonomy")))
    }

    fn stored(name: &str, precedence: i32) -> CanonicalDocument {
        let candidate = CandidateRecord::new(id("atco:X"), name, "/transport/bus-stop")
            .with_location(Coord { x: 1.0, y: 2.0 });
        let mut document = CanonicalDocument::from_candidate(candidate, Precedence(precedence));
        document.tags.insert("old".to_owned());
        document.child_of.insert(id("stoparea:A"));
        document
    }

    #[rstest]
    fn higher_precedence_overwrites_managed_fields(merger: DocumentMerger) {
        let existing = stored("Old name", 5);
        let mut candidate = CandidateRecord::new(id("atco:X"), "New name", "/transport/bus-stop")
            .with_location(Coord { x: 3.0, y: 4.0 });
        candidate.add_identifier(id("naptan:99"));

        let outcome = merger
            .merge(candidate, &[existing], Precedence(10))
            .expect("single match merges");

        assert_eq!(
            outcome.action,
            MergeAction::Merged {
                managed_updated: true
            }
        );
        let doc = outcome.document;
        assert_eq!(doc.name.as_deref(), Some("New name"));
        assert_eq!(doc.location, Some(Coord { x: 3.0, y: 4.0 }));
        assert_eq!(doc.meta_precedence, Some(Precedence(10)));
        assert!(doc.identifiers.contains(&id("naptan:99")));
        assert!(doc.identifiers.contains(&id("atco:X")));
    }

    #[rstest]
    #[case(5)]
    #[case(3)]
    fn equal_or_lower_precedence_keeps_managed_fields(merger: DocumentMerger, #[case] incoming: i32) {
        let existing = stored("Old name", 5);
        let mut candidate = CandidateRecord::new(id("osm:7"), "Other", "/amenities/food-drink/pub")
            .with_location(Coord { x: 9.0, y: 9.0 });
        candidate.set_extra("phone", "01865");
        candidate.tags.insert("real ale".to_owned());

        let outcome = merger
            .merge(candidate, &[existing], Precedence(incoming))
            .expect("single match merges");

        let doc = outcome.document;
        assert_eq!(doc.name.as_deref(), Some("Old name"));
        assert_eq!(doc.location, Some(Coord { x: 1.0, y: 2.0 }));
        assert_eq!(doc.meta_precedence, Some(Precedence(5)));
        assert_eq!(doc.type_path.as_deref(), Some("/amenities/food-drink/pub"));
        assert_eq!(doc.type_name.as_deref(), Some("Pub"));
        assert_eq!(doc.extras.get("phone"), Some(&serde_json::json!("01865")));
        assert!(doc.tags.contains("old") && doc.tags.contains("real ale"));
    }

    #[rstest]
    fn unset_precedence_loses_to_any_source(merger: DocumentMerger) {
        let mut existing = stored("Old", 0);
        existing.meta_precedence = None;
        let candidate = CandidateRecord::new(id("atco:X"), "New", "/transport/bus-stop");

        let outcome = merger
            .merge(candidate, &[existing], Precedence(-5))
            .expect("single match merges");

        assert_eq!(outcome.document.name.as_deref(), Some("New"));
        assert_eq!(outcome.document.meta_precedence, Some(Precedence(-5)));
    }

    #[rstest]
    fn ancestry_survives_sources_that_omit_it(merger: DocumentMerger) {
        let existing = stored("Stop", 10);
        let candidate = CandidateRecord::new(id("atco:X"), "Stop", "/transport/bus-stop");

        let outcome = merger
            .merge(candidate, &[existing], Precedence(10))
            .expect("single match merges");

        assert!(outcome.document.child_of.contains(&id("stoparea:A")));
    }

    #[rstest]
    fn several_matches_conflict(merger: DocumentMerger) {
        let mut first = stored("A", 5);
        first.id = "atco:X".to_owned();
        let mut second = stored("B", 5);
        second.id = "osm:1".to_owned();
        let documents = vec![first, second];
        let before = documents.clone();
        let candidate = CandidateRecord::new(id("atco:X"), "C", "/transport/bus-stop");

        let err = merger
            .merge(candidate, &documents, Precedence(10))
            .expect_err("ambiguous match");

        assert_eq!(err.document_ids, vec!["atco:X".to_owned(), "osm:1".to_owned()]);
        assert_eq!(documents, before);
    }

    #[rstest]
    fn unknown_type_omits_type_name(merger: DocumentMerger) {
        let candidate = CandidateRecord::new(id("osm:1"), "Folly", "/leisure/folly");
        let outcome = merger
            .merge(candidate, &[], Precedence(5))
            .expect("no match creates");
        assert_eq!(outcome.document.type_name, None);
        let value = serde_json::to_value(&outcome.document).expect("serialise");
        assert!(value.get("type_name").is_none());
    }
}
