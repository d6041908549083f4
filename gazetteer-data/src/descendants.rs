//! Precomputed descendant lists for the organisational tree.
//!
//! Starting from a root resource, children are the subjects that point at
//! their parent through one relation (usually `org:subOrganizationOf`).
//! Every node reached gets a key-value entry
//! `{"descendants": [{"id": "oxpoints:…", "title": "…"}]}` listing its
//! direct children first, then each child's own descendants.

use std::collections::{HashMap, HashSet};

use gazetteer_core::{KeyValueStore, KvError};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rdf::vocab::{DC_TITLE, ORG_SUB_ORGANIZATION_OF, UNIVERSITY_OF_OXFORD};
use crate::rdf::{DEFAULT_MAX_DEPTH, Node, TripleGraph};

/// One entry of a descendant list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Descendant {
    /// `oxpoints:<id>` of the descendant.
    pub id: String,
    /// `dc:title`, when the resource has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Value stored per node.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Descendants {
    /// Children first, then grandchildren by child.
    pub descendants: Vec<Descendant>,
}

/// Errors that abort the precomputation.
#[derive(Debug, Error)]
pub enum DescendantsError {
    /// Writing an entry failed.
    #[error(transparent)]
    Kv(#[from] KvError),
    /// An entry could not be encoded.
    #[error("failed to encode descendants of {key}")]
    Encode {
        /// Key being written.
        key: String,
        /// Encoder failure.
        #[source]
        source: serde_json::Error,
    },
}

/// Counts reported after a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DescendantsSummary {
    /// Entries written.
    pub written: usize,
    /// Edges not followed because they closed a cycle.
    pub cycles: usize,
    /// Nodes not expanded because the depth bound was reached.
    pub truncated: usize,
}

/// Walks a relation backwards and stores each node's descendants.
pub struct DescendantsImporter<'a, K: KeyValueStore + ?Sized> {
    graph: &'a TripleGraph,
    kv: &'a K,
    relation: String,
    max_depth: usize,
}

impl<'a, K: KeyValueStore + ?Sized> DescendantsImporter<'a, K> {
    /// Importer following `org:subOrganizationOf`.
    pub fn new(graph: &'a TripleGraph, kv: &'a K) -> Self {
        Self {
            graph,
            kv,
            relation: ORG_SUB_ORGANIZATION_OF.to_owned(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Follow `relation` instead.
    #[must_use]
    pub fn with_relation(mut self, relation: impl Into<String>) -> Self {
        self.relation = relation.into();
        self
    }

    /// Override the depth bound.
    #[must_use]
    pub const fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Precompute the whole university tree.
    ///
    /// # Errors
    /// See [`Self::import_from`].
    pub fn import(&self) -> Result<DescendantsSummary, DescendantsError> {
        self.import_from(&Node::iri(UNIVERSITY_OF_OXFORD))
    }

    /// Precompute the tree below `root`.
    ///
    /// # Errors
    /// Returns [`DescendantsError`] when an entry cannot be encoded or
    /// stored; entries written before the failure stay in the store.
    pub fn import_from(&self, root: &Node) -> Result<DescendantsSummary, DescendantsError> {
        let mut walk = Walk::default();
        self.import_subject(root, 0, &mut walk)?;
        info!(
            "Stored descendants for {} resources below {root}",
            walk.summary.written
        );
        Ok(walk.summary)
    }

    fn import_subject(
        &self,
        subject: &Node,
        depth: usize,
        walk: &mut Walk,
    ) -> Result<Vec<Descendant>, DescendantsError> {
        if let Some(done) = walk.done.get(subject) {
            return Ok(done.clone());
        }
        if depth > self.max_depth {
            warn!("Not expanding {subject}: depth bound {} reached", self.max_depth);
            walk.summary.truncated += 1;
            return Ok(Vec::new());
        }
        walk.in_progress.insert(subject.clone());

        let children: Vec<&Node> = self
            .graph
            .subjects(&self.relation, subject)
            .filter(|child| {
                let cyclic = walk.in_progress.contains(*child);
                if cyclic {
                    warn!("Ignoring cyclic edge {child} -> {subject}");
                }
                !cyclic
            })
            .collect();
        walk.summary.cycles += self.graph.subjects(&self.relation, subject).count() - children.len();

        let mut descendants: Vec<Descendant> =
            children.iter().map(|child| self.describe(child)).collect();
        for child in &children {
            descendants.extend(self.import_subject(child, depth + 1, walk)?);
        }

        let key = oxpoints_key(subject);
        let value = serde_json::to_string(&Descendants {
            descendants: descendants.clone(),
        })
        .map_err(|source| DescendantsError::Encode {
            key: key.clone(),
            source,
        })?;
        self.kv.set(&key, &value)?;
        walk.summary.written += 1;

        walk.in_progress.remove(subject);
        walk.done.insert(subject.clone(), descendants.clone());
        Ok(descendants)
    }

    fn describe(&self, node: &Node) -> Descendant {
        Descendant {
            id: oxpoints_key(node),
            title: self.graph.literal(node, DC_TITLE).map(str::to_owned),
        }
    }
}

#[derive(Debug, Default)]
struct Walk {
    in_progress: HashSet<Node>,
    done: HashMap<Node, Vec<Descendant>>,
    summary: DescendantsSummary,
}

fn oxpoints_key(node: &Node) -> String {
    match node {
        Node::Iri(iri) => format!("oxpoints:{}", iri.rsplit('/').next().unwrap_or(iri)),
        Node::Blank(label) => format!("oxpoints:_{label}"),
    }
}
