//! In-memory triple graph for the OxPoints and shapes dumps.
//!
//! The dumps are small enough to load whole. [`TripleGraph`] indexes
//! triples by subject and by object node so the resolver and importers can
//! walk relations in either direction. Every lookup returns an `Option` or
//! an iterator; an absent attribute is never an error.

use std::collections::HashMap;
use std::fmt;
use std::io::Read;

use log::info;
use oxrdf::{Subject, Term as RdfTerm, Triple};
use oxrdfxml::RdfXmlParser;
use oxttl::{NTriplesParser, TurtleParser};
use thiserror::Error;

use super::vocab::RDF_TYPE;

/// Subject or object resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Node {
    /// Named resource.
    Iri(String),
    /// Blank node label, scoped to the file it came from.
    Blank(String),
}

impl Node {
    /// Named resource from an IRI.
    pub fn iri(iri: impl Into<String>) -> Self {
        Self::Iri(iri.into())
    }

    /// The IRI, if the node is named.
    #[must_use]
    pub fn as_iri(&self) -> Option<&str> {
        match self {
            Self::Iri(iri) => Some(iri),
            Self::Blank(_) => None,
        }
    }

    /// Last `/`-separated segment of a named node's IRI.
    #[must_use]
    pub fn local_id(&self) -> Option<&str> {
        self.as_iri()
            .and_then(|iri| iri.rsplit('/').next())
            .filter(|segment| !segment.is_empty())
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Iri(iri) => write!(f, "<{iri}>"),
            Self::Blank(label) => write!(f, "_:{label}"),
        }
    }
}

/// Object of a triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Term {
    /// A resource.
    Node(Node),
    /// A literal's lexical value.
    Literal(String),
}

impl Term {
    /// The literal value, if the term is a literal.
    #[must_use]
    pub fn as_literal(&self) -> Option<&str> {
        match self {
            Self::Literal(value) => Some(value),
            Self::Node(_) => None,
        }
    }

    /// The node, if the term is a resource.
    #[must_use]
    pub const fn as_node(&self) -> Option<&Node> {
        match self {
            Self::Node(node) => Some(node),
            Self::Literal(_) => None,
        }
    }
}

/// Serialisations the loader understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RdfFormat {
    /// N-Triples.
    NTriples,
    /// Turtle.
    Turtle,
    /// RDF/XML.
    RdfXml,
}

impl RdfFormat {
    /// Guess the format from a file name, ignoring a trailing `.bz2`.
    #[must_use]
    pub fn detect(file_name: &str) -> Option<Self> {
        let lower = file_name.to_ascii_lowercase();
        let stem = lower.strip_suffix(".bz2").unwrap_or(&lower);
        let extension = stem.rsplit('.').next()?;
        match extension {
            "nt" => Some(Self::NTriples),
            "ttl" => Some(Self::Turtle),
            "rdf" | "xml" | "owl" => Some(Self::RdfXml),
            _ => None,
        }
    }
}

impl fmt::Display for RdfFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NTriples => "N-Triples",
            Self::Turtle => "Turtle",
            Self::RdfXml => "RDF/XML",
        };
        f.write_str(name)
    }
}

/// Errors raised while loading a graph.
#[derive(Debug, Error)]
pub enum GraphLoadError {
    /// The file name does not indicate a known serialisation.
    #[error("cannot tell the RDF format of {name}")]
    UnknownFormat {
        /// Source label.
        name: String,
    },
    /// The serialisation is invalid or unreadable.
    #[error("failed to parse {format} graph {name}: {message}")]
    Parse {
        /// Source label.
        name: String,
        /// Format being parsed.
        format: RdfFormat,
        /// Parser message.
        message: String,
    },
}

/// Triples indexed by subject and by object node.
#[derive(Debug, Clone, Default)]
pub struct TripleGraph {
    outgoing: HashMap<Node, Vec<(String, Term)>>,
    incoming: HashMap<Node, Vec<(String, Node)>>,
    len: usize,
}

impl TripleGraph {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a whole serialisation into a new graph.
    ///
    /// # Errors
    /// Returns [`GraphLoadError::Parse`] on the first invalid triple.
    pub fn load<R: Read>(source: R, format: RdfFormat, name: &str) -> Result<Self, GraphLoadError> {
        let mut graph = Self::new();
        graph.extend_from(source, format, name)?;
        Ok(graph)
    }

    /// Parse a serialisation and add its triples to this graph.
    ///
    /// # Errors
    /// Returns [`GraphLoadError::Parse`] on the first invalid triple.
    pub fn extend_from<R: Read>(
        &mut self,
        source: R,
        format: RdfFormat,
        name: &str,
    ) -> Result<(), GraphLoadError> {
        let before = self.len;
        let parse_error = |message: String| GraphLoadError::Parse {
            name: name.to_owned(),
            format,
            message,
        };
        match format {
            RdfFormat::NTriples => {
                for triple in NTriplesParser::new().for_reader(source) {
                    self.insert_triple(triple.map_err(|err| parse_error(err.to_string()))?);
                }
            }
            RdfFormat::Turtle => {
                for triple in TurtleParser::new().for_reader(source) {
                    self.insert_triple(triple.map_err(|err| parse_error(err.to_string()))?);
                }
            }
            RdfFormat::RdfXml => {
                for triple in RdfXmlParser::new().for_reader(source) {
                    self.insert_triple(triple.map_err(|err| parse_error(err.to_string()))?);
                }
            }
        }
        info!("Loaded {} triples from {name}", self.len - before);
        Ok(())
    }

    /// Add every triple of `other`.
    pub fn merge(&mut self, other: Self) {
        for (subject, edges) in other.outgoing {
            for (predicate, object) in edges {
                self.insert(subject.clone(), predicate, object);
            }
        }
    }

    /// Add one triple; duplicates are ignored.
    pub fn insert(&mut self, subject: Node, predicate: impl Into<String>, object: Term) {
        let predicate = predicate.into();
        let edges = self.outgoing.entry(subject.clone()).or_default();
        if edges
            .iter()
            .any(|(p, o)| *p == predicate && *o == object)
        {
            return;
        }
        if let Term::Node(target) = &object {
            self.incoming
                .entry(target.clone())
                .or_default()
                .push((predicate.clone(), subject));
        }
        edges.push((predicate, object));
        self.len += 1;
    }

    /// Number of distinct triples.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether the graph holds no triples.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Objects of `(subject, predicate, ?)` in load order.
    ///
    /// The iterator borrows `predicate` only while it runs; yielded terms
    /// borrow the graph alone.
    pub fn objects<'a, 'p>(
        &'a self,
        subject: &Node,
        predicate: &'p str,
    ) -> impl Iterator<Item = &'a Term> + use<'a, 'p> {
        self.outgoing
            .get(subject)
            .into_iter()
            .flatten()
            .filter(move |(p, _)| p == predicate)
            .map(|(_, object)| object)
    }

    /// First object of `(subject, predicate, ?)`.
    #[must_use]
    pub fn object(&self, subject: &Node, predicate: &str) -> Option<&Term> {
        self.objects(subject, predicate).next()
    }

    /// First literal object of `(subject, predicate, ?)`.
    #[must_use]
    pub fn literal(&self, subject: &Node, predicate: &str) -> Option<&str> {
        self.objects(subject, predicate).find_map(Term::as_literal)
    }

    /// All literal objects of `(subject, predicate, ?)`.
    pub fn literals<'a, 'p>(
        &'a self,
        subject: &Node,
        predicate: &'p str,
    ) -> impl Iterator<Item = &'a str> + use<'a, 'p> {
        self.objects(subject, predicate).filter_map(Term::as_literal)
    }

    /// First resource object of `(subject, predicate, ?)`.
    #[must_use]
    pub fn node(&self, subject: &Node, predicate: &str) -> Option<&Node> {
        self.objects(subject, predicate).find_map(Term::as_node)
    }

    /// Subjects of `(?, predicate, object)` in load order.
    pub fn subjects<'a, 'p>(
        &'a self,
        predicate: &'p str,
        object: &Node,
    ) -> impl Iterator<Item = &'a Node> + use<'a, 'p> {
        self.incoming
            .get(object)
            .into_iter()
            .flatten()
            .filter(move |(p, _)| p == predicate)
            .map(|(_, subject)| subject)
    }

    /// Every `(subject, object)` pair linked by `predicate`.
    pub fn pairs<'a, 'p>(
        &'a self,
        predicate: &'p str,
    ) -> impl Iterator<Item = (&'a Node, &'a Term)> + use<'a, 'p> {
        self.outgoing.iter().flat_map(move |(subject, edges)| {
            edges
                .iter()
                .filter(move |(p, _)| p == predicate)
                .map(move |(_, object)| (subject, object))
        })
    }

    /// Whether `subject` is declared with `rdf:type type_iri`.
    #[must_use]
    pub fn has_type(&self, subject: &Node, type_iri: &str) -> bool {
        self.objects(subject, RDF_TYPE)
            .filter_map(Term::as_node)
            .any(|node| node.as_iri() == Some(type_iri))
    }

    /// Subjects declared with `rdf:type type_iri`, sorted.
    #[must_use]
    pub fn subjects_of_type(&self, type_iri: &str) -> Vec<&Node> {
        let mut subjects: Vec<&Node> = self
            .subjects(RDF_TYPE, &Node::iri(type_iri))
            .collect();
        subjects.sort();
        subjects.dedup();
        subjects
    }

    fn insert_triple(&mut self, triple: Triple) {
        let subject = match triple.subject {
            Subject::NamedNode(node) => Node::Iri(node.into_string()),
            Subject::BlankNode(node) => Node::Blank(node.into_string()),
            #[expect(
                unreachable_patterns,
                reason = "triple terms exist only with oxrdf's rdf-star feature"
            )]
            _ => return,
        };
        let object = match triple.object {
            RdfTerm::NamedNode(node) => Term::Node(Node::Iri(node.into_string())),
            RdfTerm::BlankNode(node) => Term::Node(Node::Blank(node.into_string())),
            RdfTerm::Literal(literal) => Term::Literal(literal.value().to_owned()),
            #[expect(
                unreachable_patterns,
                reason = "triple terms exist only with oxrdf's rdf-star feature"
            )]
            _ => return,
        };
        self.insert(subject, triple.predicate.into_string(), object);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdf::vocab::{DC_TITLE, SPATIALLY_WITHIN, oxp};
    use rstest::rstest;

    const TURTLE: &str = r#"
        @prefix oxp: <http://ns.ox.ac.uk/namespace/oxpoints/2009/02/owl#> .
        @prefix dc: <http://purl.org/dc/elements/1.1/> .
        <http://oxpoints.oucs.ox.ac.uk/id/23232639> a oxp:College ;
            dc:title "St Anne's College" ;
            dc:title "St Anne's College" .
    "#;

    #[rstest]
    fn loads_turtle_and_collapses_duplicates() {
        let graph = TripleGraph::load(TURTLE.as_bytes(), RdfFormat::Turtle, "colleges.ttl")
            .expect("valid turtle");
        assert_eq!(graph.len(), 2);
        let college = Node::iri("http://oxpoints.oucs.ox.ac.uk/id/23232639");
        assert_eq!(
            graph.literal(&college, DC_TITLE),
            Some("St Anne's College")
        );
        assert_eq!(college.local_id(), Some("23232639"));
        let type_iri = oxp("College");
        assert!(graph.has_type(&college, &type_iri));
        assert_eq!(graph.subjects_of_type(&type_iri), vec![&college]);
    }

    #[rstest]
    fn reports_parse_errors_with_the_source_name() {
        let err = TripleGraph::load("<a> <b> .".as_bytes(), RdfFormat::NTriples, "broken.nt")
            .expect_err("invalid n-triples");
        match err {
            GraphLoadError::Parse { name, format, .. } => {
                assert_eq!(name, "broken.nt");
                assert_eq!(format, RdfFormat::NTriples);
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[rstest]
    fn merges_graphs_and_walks_backwards() {
        let parent = Node::iri("http://example.org/parent");
        let child = Node::iri("http://example.org/child");
        let mut graph = TripleGraph::new();
        let mut other = TripleGraph::new();
        other.insert(child.clone(), "http://example.org/within", Term::Node(parent.clone()));
        graph.merge(other);

        let subjects: Vec<&Node> = graph.subjects("http://example.org/within", &parent).collect();
        assert_eq!(subjects, vec![&child]);
        assert_eq!(graph.node(&child, "http://example.org/within"), Some(&parent));
    }

    #[rstest]
    fn lookups_outlive_the_predicate_buffer() {
        let site = Node::iri("http://example.org/site");
        let building = Node::iri("http://example.org/building");
        let mut graph = TripleGraph::new();
        graph.insert(building.clone(), DC_TITLE, Term::Literal("Radcliffe Camera".to_owned()));
        graph.insert(building.clone(), SPATIALLY_WITHIN, Term::Node(site.clone()));

        let within = String::from(SPATIALLY_WITHIN);
        let title = String::from(DC_TITLE);
        let object = graph.object(&building, &within);
        let parent = graph.node(&building, &within);
        let name = graph.literal(&building, &title);
        let names: Vec<&str> = graph.literals(&building, &title).collect();
        let children: Vec<&Node> = graph.subjects(&within, &site).collect();
        let pairs = graph.pairs(&within).count();
        drop(within);
        drop(title);

        assert_eq!(object, Some(&Term::Node(site.clone())));
        assert_eq!(parent, Some(&site));
        assert_eq!(name, Some("Radcliffe Camera"));
        assert_eq!(names, vec!["Radcliffe Camera"]);
        assert_eq!(children, vec![&building]);
        assert_eq!(pairs, 1);
        assert_eq!(graph.node(&building, DC_TITLE), None);
        assert_eq!(graph.literal(&building, SPATIALLY_WITHIN), None);
    }

    #[rstest]
    #[case("oxpoints.rdf", Some(RdfFormat::RdfXml))]
    #[case("shapes.ttl", Some(RdfFormat::Turtle))]
    #[case("dump.NT.bz2", Some(RdfFormat::NTriples))]
    #[case("notes.txt", None)]
    fn detects_formats(#[case] name: &str, #[case] expected: Option<RdfFormat>) {
        assert_eq!(RdfFormat::detect(name), expected);
    }
}
