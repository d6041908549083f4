//! Test helpers for writing source files and resolving layered config.

use super::*;
use camino::{Utf8Path, Utf8PathBuf};
use crate::import::{ImportConfig, NaptanArgs};
use tempfile::TempDir;

pub(super) const REGISTER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<NaPTAN>
    <StopArea Status="active">
        <StopAreaCode>639GSHI21581</StopAreaCode>
        <Name>Market Street</Name>
        <Location>
            <Translation>
                <Longitude>-2.4932405666</Longitude>
                <Latitude>57.6708309449</Latitude>
            </Translation>
        </Location>
    </StopArea>
    <StopPoint Status="active">
        <AtcoCode>639000022</AtcoCode>
        <NaptanCode>23234369</NaptanCode>
        <Descriptor>
            <CommonName>Albyn Grove</CommonName>
        </Descriptor>
        <StopClassification>
            <StopType>BCT</StopType>
        </StopClassification>
        <Place>
            <Location>
                <Translation>
                    <Longitude>-2.1189893199</Longitude>
                    <Latitude>57.1409815049</Latitude>
                </Translation>
            </Location>
        </Place>
        <StopAreas>
            <StopAreaRef Status="active">639GSHI21581</StopAreaRef>
        </StopAreas>
    </StopPoint>
</NaPTAN>
"#;

pub(super) const OSM_EXTRACT: &str = r#"<osm>
    <node id="1" lat="51.7520" lon="-1.2577" version="2">
        <tag k="amenity" v="cafe"/>
        <tag k="name" v="Vaults and Garden"/>
        <tag k="cuisine" v="coffee_shop;sandwich"/>
    </node>
    <node id="2" lat="51.7530" lon="-1.2580">
        <tag k="building" v="yes"/>
    </node>
</osm>
"#;

pub(super) const OXPOINTS: &str = r#"
@prefix oxp: <http://ns.ox.ac.uk/namespace/oxpoints/2009/02/owl#> .
@prefix dc: <http://purl.org/dc/elements/1.1/> .
@prefix org: <http://www.w3.org/ns/org#> .
@prefix geo: <http://www.w3.org/2003/01/geo/wgs84_pos#> .
@prefix id: <http://oxpoints.oucs.ox.ac.uk/id/> .

id:00000000 a oxp:University ;
    dc:title "University of Oxford" .
id:23232639 a oxp:Division ;
    dc:title "Mathematical, Physical and Life Sciences" ;
    org:subOrganizationOf id:00000000 .
id:23233500 a oxp:Building ;
    dc:title "Clarendon Laboratory" ;
    geo:lat "51.7596" ;
    geo:long "-1.2573" .
id:23232603 a oxp:Library ;
    dc:title "Radcliffe Science Library" ;
    oxp:hasLibraryDataId "RSL" ;
    oxp:primaryPlace id:23233500 .
"#;

pub(super) const LIBRARY_FEED: &str = r"<libraries>
  <library>
    <id>RSL</id>
    <name>Radcliffe Science Library</name>
    <hours><vacation>Mon-Fri 9am-7pm</vacation></hours>
  </library>
</libraries>
";

/// Temporary directory with UTF-8 paths for source fixtures.
pub(super) struct Workspace {
    _dir: TempDir,
    root: Utf8PathBuf,
}

impl Workspace {
    pub(super) fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 workspace");
        Self { _dir: dir, root }
    }

    pub(super) fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub(super) fn write(&self, name: &str, contents: &[u8]) -> Utf8PathBuf {
        let path = self.root.join(name);
        write_utf8(&path, contents);
        path
    }
}

pub(super) fn write_utf8(path: &Utf8Path, contents: &[u8]) {
    std::fs::write(path.as_std_path(), contents)
        .unwrap_or_else(|err| panic!("failed to write {path}: {err}"));
}

/// Resolve `naptan` arguments from explicit layers, bypassing the process
/// environment.
pub(super) fn naptan_config_from_layers(
    layers: Vec<ortho_config::MergeLayer<'static>>,
) -> Result<ImportConfig, CliError> {
    let merged = NaptanArgs::merge_from_layers(layers).map_err(CliError::from)?;
    ImportConfig::try_from(merged)
}
