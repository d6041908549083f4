//! Property-based tests for the document merger.
//!
//! # Invariants tested
//!
//! - **Creation:** with no match, the document mirrors the candidate and
//!   carries the supplied precedence.
//! - **Precedence:** managed fields follow the candidate only on a strictly
//!   greater precedence.
//! - **Accumulation:** identifiers always union, in any merge order.
//! - **Conflict:** several matches never produce a document and never touch
//!   the inputs.
//! - **Non-commutativity:** equal precedences keep the first writer's
//!   managed values, so merge order matters for them.

use std::collections::BTreeSet;
use std::sync::Arc;

use geo::Coord;
use proptest::prelude::*;
use gazetteer_core::{
    CandidateRecord, CanonicalDocument, DocumentMerger, Identifier, Precedence, Taxonomy,
};

fn merger() -> DocumentMerger {
    DocumentMerger::new(Arc::new(Taxonomy::builtin().expect("bundled taxonomy")))
}

fn identifier_strategy() -> impl Strategy<Value = Identifier> {
    (
        prop_oneof![Just("atco"), Just("osm"), Just("oxpoints"), Just("naptan")],
        "[0-9A-Z]{1,8}",
    )
        .prop_map(|(namespace, value)| {
            Identifier::new(namespace, &value).expect("generated identifier is valid")
        })
}

prop_compose! {
    fn candidate_strategy()(
        own in identifier_strategy(),
        others in prop::collection::btree_set(identifier_strategy(), 0..4),
        name in "[A-Za-z ]{1,16}",
        lon in -180.0_f64..180.0,
        lat in -90.0_f64..90.0,
    ) -> CandidateRecord {
        let mut record = CandidateRecord::new(own, name, "/transport/bus-stop")
            .with_location(Coord { x: lon, y: lat });
        for identifier in others {
            record.add_identifier(identifier);
        }
        record
    }
}

fn stored(candidate: &CandidateRecord, precedence: i32) -> CanonicalDocument {
    CanonicalDocument::from_candidate(candidate.clone(), Precedence(precedence))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn creation_keeps_candidate_fields(candidate in candidate_strategy(), p in -20_i32..20) {
        let outcome = merger().merge(candidate.clone(), &[], Precedence(p)).expect("creates");
        let doc = outcome.document;
        prop_assert_eq!(doc.meta_precedence, Some(Precedence(p)));
        prop_assert_eq!(doc.id.as_str(), candidate.id().as_str());
        prop_assert_eq!(&doc.identifiers, candidate.identifiers());
        prop_assert_eq!(doc.name.as_deref(), Some(candidate.name.as_str()));
        prop_assert_eq!(doc.location, candidate.location);
        prop_assert_eq!(doc.type_path.as_deref(), Some(candidate.type_path.as_str()));
    }

    #[test]
    fn higher_precedence_takes_managed_fields(
        existing in candidate_strategy(),
        candidate in candidate_strategy(),
        base in -20_i32..20,
        lead in 1_i32..10,
    ) {
        let document = stored(&existing, base);
        let outcome = merger()
            .merge(candidate.clone(), &[document], Precedence(base + lead))
            .expect("single match merges");
        let doc = outcome.document;
        prop_assert_eq!(doc.name.as_deref(), Some(candidate.name.as_str()));
        prop_assert_eq!(doc.location, candidate.location);
        prop_assert_eq!(doc.meta_precedence, Some(Precedence(base + lead)));
        let expected: BTreeSet<Identifier> = existing
            .identifiers()
            .union(candidate.identifiers())
            .cloned()
            .collect();
        prop_assert_eq!(doc.identifiers, expected);
    }

    #[test]
    fn lower_or_equal_precedence_keeps_managed_fields(
        existing in candidate_strategy(),
        candidate in candidate_strategy(),
        base in -20_i32..20,
        lag in 0_i32..10,
    ) {
        let document = stored(&existing, base);
        let outcome = merger()
            .merge(candidate.clone(), &[document], Precedence(base - lag))
            .expect("single match merges");
        let doc = outcome.document;
        prop_assert_eq!(doc.name.as_deref(), Some(existing.name.as_str()));
        prop_assert_eq!(doc.location, existing.location);
        prop_assert_eq!(doc.meta_precedence, Some(Precedence(base)));
        prop_assert!(doc.identifiers.is_superset(existing.identifiers()));
        prop_assert!(doc.identifiers.is_superset(candidate.identifiers()));
    }

    #[test]
    fn identifier_union_is_order_independent(
        seed in candidate_strategy(),
        first in candidate_strategy(),
        second in candidate_strategy(),
        p1 in -5_i32..5,
        p2 in -5_i32..5,
    ) {
        let merger = merger();
        let base = stored(&seed, 0);

        let one = merger.merge(first.clone(), &[base.clone()], Precedence(p1)).expect("merge");
        let one = merger.merge(second.clone(), &[one.document], Precedence(p2)).expect("merge");

        let two = merger.merge(second, &[base], Precedence(p2)).expect("merge");
        let two = merger.merge(first, &[two.document], Precedence(p1)).expect("merge");

        prop_assert_eq!(one.document.identifiers, two.document.identifiers);
    }

    #[test]
    fn several_matches_always_conflict(
        a in candidate_strategy(),
        b in candidate_strategy(),
        candidate in candidate_strategy(),
        p in -5_i32..5,
    ) {
        let mut first = stored(&a, 1);
        first.id = "doc:a".to_owned();
        let mut second = stored(&b, 1);
        second.id = "doc:b".to_owned();
        let documents = vec![first, second];
        let snapshot = documents.clone();

        let result = merger().merge(candidate, &documents, Precedence(p));

        prop_assert!(result.is_err());
        prop_assert_eq!(documents, snapshot);
    }
}

#[test]
fn equal_precedence_merges_do_not_commute_on_managed_fields() {
    let merger = merger();
    let id: Identifier = "atco:X".parse().expect("valid identifier");
    let base = CanonicalDocument {
        id: id.to_string(),
        identifiers: BTreeSet::from([id.clone()]),
        ..CanonicalDocument::default()
    };
    let first = CandidateRecord::new(id.clone(), "First", "/transport/bus-stop");
    let second = CandidateRecord::new(id, "Second", "/transport/bus-stop");

    let forward = merger
        .merge(first.clone(), &[base.clone()], Precedence(7))
        .expect("merge");
    let forward = merger
        .merge(second.clone(), &[forward.document], Precedence(7))
        .expect("merge");

    let backward = merger.merge(second, &[base], Precedence(7)).expect("merge");
    let backward = merger
        .merge(first, &[backward.document], Precedence(7))
        .expect("merge");

    assert_eq!(forward.document.name.as_deref(), Some("First"));
    assert_eq!(backward.document.name.as_deref(), Some("Second"));
    assert_eq!(forward.document.identifiers, backward.document.identifiers);
}
