//! Linked-data support: an in-memory triple graph, the vocabularies the
//! OxPoints dumps use, and the [`GraphResolver`] that derives locations and
//! shapes by walking container relations.

pub mod graph;
pub mod resolver;
pub mod vocab;

pub use graph::{GraphLoadError, Node, RdfFormat, Term, TripleGraph};
pub use resolver::{DEFAULT_MAX_DEPTH, GraphResolver, Traversal};
