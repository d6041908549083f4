//! IRIs of the vocabularies used by the OxPoints graph.

/// OxPoints ontology namespace.
pub const OXPOINTS: &str = "http://ns.ox.ac.uk/namespace/oxpoints/2009/02/owl#";

/// `rdf:type`.
pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
/// `dc:title`.
pub const DC_TITLE: &str = "http://purl.org/dc/elements/1.1/title";
/// `dct:isPartOf`.
pub const DCT_IS_PART_OF: &str = "http://purl.org/dc/terms/isPartOf";
/// `skos:altLabel`.
pub const SKOS_ALT_LABEL: &str = "http://www.w3.org/2004/02/skos/core#altLabel";
/// `skos:hiddenLabel`.
pub const SKOS_HIDDEN_LABEL: &str = "http://www.w3.org/2004/02/skos/core#hiddenLabel";
/// `foaf:homepage`.
pub const FOAF_HOMEPAGE: &str = "http://xmlns.com/foaf/0.1/homepage";
/// `org:subOrganizationOf`.
pub const ORG_SUB_ORGANIZATION_OF: &str = "http://www.w3.org/ns/org#subOrganizationOf";
/// `geo:lat`.
pub const GEO_LAT: &str = "http://www.w3.org/2003/01/geo/wgs84_pos#lat";
/// `geo:long`.
pub const GEO_LONG: &str = "http://www.w3.org/2003/01/geo/wgs84_pos#long";
/// `geometry:extent`.
pub const GEOMETRY_EXTENT: &str = "http://data.ordnancesurvey.co.uk/ontology/geometry/extent";
/// `geometry:asWKT`.
pub const GEOMETRY_AS_WKT: &str = "http://data.ordnancesurvey.co.uk/ontology/geometry/asWKT";
/// `spatialrelations:within`.
pub const SPATIALLY_WITHIN: &str = "http://data.ordnancesurvey.co.uk/ontology/spatialrelations/within";
/// `vcard:adr`.
pub const VCARD_ADR: &str = "http://www.w3.org/2006/vcard/ns#adr";
/// `vcard:street-address`.
pub const VCARD_STREET_ADDRESS: &str = "http://www.w3.org/2006/vcard/ns#street-address";
/// `vcard:postal-code`.
pub const VCARD_POSTAL_CODE: &str = "http://www.w3.org/2006/vcard/ns#postal-code";

/// Base IRI of OxPoints resources.
pub const OXPOINTS_ID_BASE: &str = "http://oxpoints.oucs.ox.ac.uk/id/";

/// Root of the university's organisational tree.
pub const UNIVERSITY_OF_OXFORD: &str = "http://oxpoints.oucs.ox.ac.uk/id/00000000";

/// Full IRI of an OxPoints term such as `primaryPlace`.
#[must_use]
pub fn oxp(term: &str) -> String {
    format!("{OXPOINTS}{term}")
}

/// Identifier predicates and the namespaces their values are filed under.
pub const IDENTIFIER_PREDICATES: &[(&str, &str)] = &[
    ("hasOUCSCode", "oucs"),
    ("hasOLISCode", "olis"),
    ("hasFinanceCode", "finance"),
    ("hasOBNCode", "obn"),
    ("hasOSMIdentifier", "osm"),
    ("hasLibraryDataId", "librarydata"),
];
