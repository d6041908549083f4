//! Namespaced external identifiers.
//!
//! Every source names entities with its own keys. Identifiers carry the
//! source namespace so keys from different registers can share one
//! accumulative field in the canonical store: `atco:639000022`,
//! `osm:4333225`, `oxpoints:23232673`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// A `namespace:value` key naming an entity in one source.
///
/// # Examples
/// ```
/// use gazetteer_core::Identifier;
///
/// let id: Identifier = "atco:639000022".parse()?;
/// assert_eq!(id.namespace(), "atco");
/// assert_eq!(id.value(), "639000022");
/// assert_eq!(id.to_string(), "atco:639000022");
/// # Ok::<(), gazetteer_core::IdentifierError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Identifier {
    raw: String,
    split: usize,
}

/// Errors returned when constructing an [`Identifier`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IdentifierError {
    /// The input contained no `:` separator.
    #[error("identifier {input:?} is missing a namespace separator")]
    MissingSeparator {
        /// Rejected input.
        input: String,
    },
    /// The namespace part was empty.
    #[error("identifier {input:?} has an empty namespace")]
    EmptyNamespace {
        /// Rejected input.
        input: String,
    },
    /// The value part was empty.
    #[error("identifier {input:?} has an empty value")]
    EmptyValue {
        /// Rejected input.
        input: String,
    },
}

impl Identifier {
    /// Build an identifier from its two parts.
    ///
    /// The namespace must not contain `:`; the value may.
    pub fn new(namespace: &str, value: &str) -> Result<Self, IdentifierError> {
        let namespace = namespace.trim();
        let value = value.trim();
        let input = format!("{namespace}:{value}");
        if namespace.is_empty() {
            return Err(IdentifierError::EmptyNamespace { input });
        }
        if namespace.contains(':') {
            return Err(IdentifierError::MissingSeparator { input });
        }
        if value.is_empty() {
            return Err(IdentifierError::EmptyValue { input });
        }
        Ok(Self {
            split: namespace.len(),
            raw: input,
        })
    }

    /// Namespace naming the source register, e.g. `atco`.
    #[must_use]
    pub fn namespace(&self) -> &str {
        self.raw.get(..self.split).unwrap_or_default()
    }

    /// Source-local key.
    #[must_use]
    pub fn value(&self) -> &str {
        self.raw.get(self.split + 1..).unwrap_or_default()
    }

    /// The full `namespace:value` form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for Identifier {
    type Err = IdentifierError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let Some((namespace, value)) = input.split_once(':') else {
            return Err(IdentifierError::MissingSeparator {
                input: input.to_owned(),
            });
        };
        Self::new(namespace, value)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.raw
    }
}

impl Serialize for Identifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for Identifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("osm:4333225", "osm", "4333225")]
    #[case("stoparea:639GSHI20121", "stoparea", "639GSHI20121")]
    #[case("oxpoints:http://x/y", "oxpoints", "http://x/y")]
    fn parses_namespaced_identifiers(
        #[case] input: &str,
        #[case] namespace: &str,
        #[case] value: &str,
    ) {
        let id: Identifier = input.parse().expect("valid identifier");
        assert_eq!(id.namespace(), namespace);
        assert_eq!(id.value(), value);
        assert_eq!(id.as_str(), input);
    }

    #[rstest]
    #[case("4333225")]
    #[case(":4333225")]
    #[case("osm:")]
    #[case("osm:   ")]
    fn rejects_malformed_identifiers(#[case] input: &str) {
        assert!(input.parse::<Identifier>().is_err(), "{input} should fail");
    }

    #[rstest]
    fn serialises_as_plain_string() {
        let id = Identifier::new("atco", "639000022").expect("valid identifier");
        let json = serde_json::to_string(&id).expect("serialise");
        assert_eq!(json, "\"atco:639000022\"");
        let back: Identifier = serde_json::from_str(&json).expect("deserialise");
        assert_eq!(back, id);
    }
}
