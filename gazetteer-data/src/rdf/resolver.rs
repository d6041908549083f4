//! Derived attributes by depth-bounded graph traversal.
//!
//! When a resource lacks a location or a shape, [`GraphResolver`] follows
//! the first container relation the resource has, in the order
//! `oxp:primaryPlace`, `spatialrelations:within`, `org:subOrganizationOf`,
//! and asks again. A walk gives up after [`DEFAULT_MAX_DEPTH`] hops, so a
//! cyclic graph ends in "not found" rather than a loop. Shape resolution
//! stops at buildings: a building without a shape does not borrow its
//! site's outline.

use std::str::FromStr;

use geo::Coord;
use log::warn;
use wkt::Wkt;

use super::graph::{Node, TripleGraph};
use super::vocab::{
    GEO_LAT, GEO_LONG, GEOMETRY_AS_WKT, GEOMETRY_EXTENT, ORG_SUB_ORGANIZATION_OF,
    SPATIALLY_WITHIN, oxp,
};

/// Hops a walk may take before it reports "not found".
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Outcome of one walk: the value found, if any, and how many nodes were
/// inspected on the way.
#[derive(Debug, Clone, PartialEq)]
pub struct Traversal<T> {
    /// Resolved value.
    pub value: Option<T>,
    /// Nodes inspected, including the start node.
    pub visited: usize,
}

/// Resolves locations and shapes over an immutable graph.
#[derive(Debug, Clone)]
pub struct GraphResolver<'g> {
    graph: &'g TripleGraph,
    max_depth: usize,
    containers: [String; 3],
    building: String,
}

impl<'g> GraphResolver<'g> {
    /// Resolver with the default depth bound.
    #[must_use]
    pub fn new(graph: &'g TripleGraph) -> Self {
        Self {
            graph,
            max_depth: DEFAULT_MAX_DEPTH,
            containers: [
                oxp("primaryPlace"),
                SPATIALLY_WITHIN.to_owned(),
                ORG_SUB_ORGANIZATION_OF.to_owned(),
            ],
            building: oxp("Building"),
        }
    }

    /// Override the depth bound.
    #[must_use]
    pub const fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Graph the resolver walks.
    #[must_use]
    pub const fn graph(&self) -> &'g TripleGraph {
        self.graph
    }

    /// Location of `node` or of its nearest container with one.
    #[must_use]
    pub fn location(&self, node: &Node) -> Option<Coord<f64>> {
        self.location_trace(node).value
    }

    /// [`Self::location`] with the number of nodes inspected.
    #[must_use]
    pub fn location_trace(&self, node: &Node) -> Traversal<Coord<f64>> {
        self.walk(node, 0, 0, &|current: &Node| self.direct_location(current), &|_: &Node| false)
    }

    /// WKT shape of `node` or of its nearest container with one.
    ///
    /// Malformed WKT is logged and treated as absent.
    #[must_use]
    pub fn shape(&self, node: &Node) -> Option<String> {
        self.shape_trace(node).value
    }

    /// [`Self::shape`] with the number of nodes inspected.
    #[must_use]
    pub fn shape_trace(&self, node: &Node) -> Traversal<String> {
        self.walk(
            node,
            0,
            0,
            &|current: &Node| self.direct_shape(current),
            &|current: &Node| self.graph.has_type(current, &self.building),
        )
    }

    fn walk<T>(
        &self,
        node: &Node,
        depth: usize,
        visited: usize,
        attribute: &dyn Fn(&Node) -> Option<T>,
        stop: &dyn Fn(&Node) -> bool,
    ) -> Traversal<T> {
        let visited = visited + 1;
        if let Some(value) = attribute(node) {
            return Traversal {
                value: Some(value),
                visited,
            };
        }
        if stop(node) || depth >= self.max_depth {
            return Traversal {
                value: None,
                visited,
            };
        }
        let next = self
            .containers
            .iter()
            .find_map(|relation| self.graph.node(node, relation));
        match next {
            Some(container) => self.walk(container, depth + 1, visited, attribute, stop),
            None => Traversal {
                value: None,
                visited,
            },
        }
    }

    fn direct_location(&self, node: &Node) -> Option<Coord<f64>> {
        let lat = self.graph.literal(node, GEO_LAT)?;
        let lon = self.graph.literal(node, GEO_LONG)?;
        match (lat.trim().parse::<f64>(), lon.trim().parse::<f64>()) {
            (Ok(y), Ok(x)) if x.is_finite() && y.is_finite() => Some(Coord { x, y }),
            _ => {
                warn!("Ignoring malformed coordinate ({lat}, {lon}) on {node}");
                None
            }
        }
    }

    fn direct_shape(&self, node: &Node) -> Option<String> {
        let extent = self.graph.node(node, GEOMETRY_EXTENT)?;
        let wkt = self.graph.literal(extent, GEOMETRY_AS_WKT)?;
        match Wkt::<f64>::from_str(wkt) {
            Ok(_) => Some(wkt.to_owned()),
            Err(err) => {
                warn!("Ignoring malformed WKT on {node}: {err}");
                None
            }
        }
    }
}
