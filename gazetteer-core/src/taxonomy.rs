//! Static type taxonomy.
//!
//! Type paths such as `/amenities/food-drink/pub` are resolved one segment
//! per tree level. The tree is built once at start-up and shared
//! read-only, typically behind an `Arc`.

use serde::Deserialize;
use thiserror::Error;

const BUILTIN_TAXONOMY: &str = include_str!("../data/taxonomy.json");

/// One level of the type tree.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TaxonomyNode {
    /// Path segment matched against the type path.
    pub slug: String,
    /// Name for a single entity, e.g. "Bus stop".
    pub name_singular: String,
    /// Name for several entities, e.g. "Bus stops".
    pub name_plural: String,
    /// Nested, more specific types.
    #[serde(default)]
    pub children: Vec<TaxonomyNode>,
}

/// Errors raised while loading a taxonomy.
#[derive(Debug, Error)]
pub enum TaxonomyError {
    /// The taxonomy document was not valid JSON.
    #[error("failed to parse taxonomy: {source}")]
    Parse {
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
    /// A node had an empty or slash-containing slug.
    #[error("invalid taxonomy slug {slug:?}")]
    InvalidSlug {
        /// Offending slug.
        slug: String,
    },
}

/// The immutable type tree.
///
/// # Examples
/// ```
/// use gazetteer_core::Taxonomy;
///
/// let taxonomy = Taxonomy::builtin()?;
/// assert_eq!(taxonomy.type_name("/transport/bus-stop"), Some("Bus stop"));
/// assert_eq!(taxonomy.type_name("/transport/monorail"), None);
/// # Ok::<(), gazetteer_core::TaxonomyError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Taxonomy {
    roots: Vec<TaxonomyNode>,
}

impl Taxonomy {
    /// Load the taxonomy bundled with this crate.
    pub fn builtin() -> Result<Self, TaxonomyError> {
        Self::from_json(BUILTIN_TAXONOMY)
    }

    /// Parse a taxonomy from its JSON form: an array of root nodes.
    pub fn from_json(json: &str) -> Result<Self, TaxonomyError> {
        let roots: Vec<TaxonomyNode> =
            serde_json::from_str(json).map_err(|source| TaxonomyError::Parse { source })?;
        validate(&roots)?;
        Ok(Self { roots })
    }

    /// Find the node for an exact type path.
    #[must_use]
    pub fn lookup(&self, path: &str) -> Option<&TaxonomyNode> {
        let mut level = self.roots.as_slice();
        let mut found = None;
        for segment in path.split('/').filter(|segment| !segment.is_empty()) {
            let node = level.iter().find(|node| node.slug == segment)?;
            level = node.children.as_slice();
            found = Some(node);
        }
        found
    }

    /// Singular display name for a type path.
    #[must_use]
    pub fn type_name(&self, path: &str) -> Option<&str> {
        self.lookup(path).map(|node| node.name_singular.as_str())
    }

    /// Every type path in the tree, depth first.
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        let mut stack: Vec<(String, &TaxonomyNode)> = self
            .roots
            .iter()
            .rev()
            .map(|node| (format!("/{}", node.slug), node))
            .collect();
        while let Some((path, node)) = stack.pop() {
            stack.extend(
                node.children
                    .iter()
                    .rev()
                    .map(|child| (format!("{path}/{}", child.slug), child)),
            );
            paths.push(path);
        }
        paths
    }
}

fn validate(nodes: &[TaxonomyNode]) -> Result<(), TaxonomyError> {
    for node in nodes {
        if node.slug.is_empty() || node.slug.contains('/') {
            return Err(TaxonomyError::InvalidSlug {
                slug: node.slug.clone(),
            });
        }
        validate(&node.children)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn taxonomy() -> Taxonomy {
        Taxonomy::builtin().expect("bundled taxonomy parses")
    }

    #[rstest]
    #[case("/transport/bus-stop-area", "Bus stop area")]
    #[case("/amenities/food-drink/pub", "Pub")]
    #[case("/university/library/sub-library", "Sub-library")]
    #[case("/university", "University")]
    fn resolves_exact_paths(taxonomy: Taxonomy, #[case] path: &str, #[case] expected: &str) {
        assert_eq!(taxonomy.type_name(path), Some(expected));
    }

    #[rstest]
    #[case("")]
    #[case("/")]
    #[case("/transport/bus")]
    #[case("/bus-stop")]
    #[case("/transport/bus-stop/extra")]
    fn misses_unknown_paths(taxonomy: Taxonomy, #[case] path: &str) {
        assert_eq!(taxonomy.type_name(path), None);
    }

    #[rstest]
    fn exposes_plural_names(taxonomy: Taxonomy) {
        let node = taxonomy.lookup("/amenities/health/pharmacy").expect("known path");
        assert_eq!(node.name_plural, "Pharmacies");
    }

    #[rstest]
    fn lists_paths_depth_first(taxonomy: Taxonomy) {
        let paths = taxonomy.paths();
        let transport = paths.iter().position(|p| p == "/transport").expect("root listed");
        let car_park = paths
            .iter()
            .position(|p| p == "/transport/car-park/university")
            .expect("leaf listed");
        assert!(transport < car_park);
    }

    #[rstest]
    fn rejects_slashes_in_slugs() {
        let json = r#"[{"slug": "a/b", "name_singular": "A", "name_plural": "As"}]"#;
        assert!(matches!(
            Taxonomy::from_json(json),
            Err(TaxonomyError::InvalidSlug { .. })
        ));
    }

    #[rstest]
    fn rejects_malformed_json() {
        assert!(matches!(
            Taxonomy::from_json("{"),
            Err(TaxonomyError::Parse { .. })
        ));
    }
}
