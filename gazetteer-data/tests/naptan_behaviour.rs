//! Behavioural tests for NaPTAN ancestry annotation.

use std::cell::RefCell;
use std::path::PathBuf;

use gazetteer_core::Identifier;
use gazetteer_data::{NaptanDataset, NaptanParseError, NaptanParser};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

struct NaptanWorld {
    register: RefCell<String>,
    dataset: RefCell<Option<NaptanDataset>>,
    error: RefCell<Option<NaptanParseError>>,
}

impl NaptanWorld {
    fn parse(&self, area: &str) {
        let register = self.register.borrow();
        match NaptanParser::new([area]).parse(register.as_bytes(), "stop_areas.xml") {
            Ok(dataset) => {
                self.dataset.replace(Some(dataset));
            }
            Err(err) => {
                self.error.replace(Some(err));
            }
        }
    }

    fn with_dataset<T>(&self, check: impl FnOnce(&NaptanDataset) -> T) -> T {
        let borrowed = self.dataset.borrow();
        check(borrowed.as_ref().expect("register parsed"))
    }
}

fn stop_area_id(code: &str) -> Identifier {
    Identifier::new("stoparea", code).expect("valid identifier")
}

#[fixture]
fn world() -> NaptanWorld {
    NaptanWorld {
        register: RefCell::new(String::new()),
        dataset: RefCell::new(None),
        error: RefCell::new(None),
    }
}

#[given("the sample stop-area register")]
fn sample_register(#[from(world)] world: &NaptanWorld) {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/stop_areas.xml");
    let xml = std::fs::read_to_string(&path)
        .unwrap_or_else(|err| panic!("failed to read fixture {path:?}: {err}"));
    world.register.replace(xml);
}

#[given("the register is cut off after its first stop area")]
fn cut_register(#[from(world)] world: &NaptanWorld) {
    let mut register = world.register.borrow_mut();
    let end = register
        .find("</StopArea>")
        .map(|at| at + "</StopArea>".len())
        .expect("fixture has a stop area");
    register.truncate(end);
}

#[when("the register is parsed for area \"639\"")]
fn parse_aberdeenshire(#[from(world)] world: &NaptanWorld) {
    world.parse("639");
}

#[when("the register is parsed for area \"123\"")]
fn parse_elsewhere(#[from(world)] world: &NaptanWorld) {
    world.parse("123");
}

#[then("stop area \"639GSHI20121\" is the parent of \"639GSHI21581\"")]
fn parent_edge(#[from(world)] world: &NaptanWorld) {
    world.with_dataset(|dataset| {
        let parent = dataset.stop_area("639GSHI20121").expect("parent kept");
        let child = dataset.stop_area("639GSHI21581").expect("child kept");
        assert!(parent.parent_of.contains(&stop_area_id("639GSHI21581")));
        assert!(child.child_of.contains(&stop_area_id("639GSHI20121")));
    });
}

#[then("stop area \"639GSHI21580\" has no parent")]
fn no_parent_edge(#[from(world)] world: &NaptanWorld) {
    world.with_dataset(|dataset| {
        let orphan = dataset.stop_area("639GSHI21580").expect("area kept");
        assert!(orphan.child_of.is_empty());
        let former_parent = dataset.stop_area("639GSHI20121").expect("parent kept");
        assert!(!former_parent.parent_of.contains(&stop_area_id("639GSHI21580")));
    });
}

#[then("stop point \"639000022\" is a child of stop area \"639GSHI21581\"")]
fn point_edge(#[from(world)] world: &NaptanWorld) {
    world.with_dataset(|dataset| {
        let point = dataset.stop_point("639000022").expect("stop point kept");
        let area = dataset.stop_area("639GSHI21581").expect("area kept");
        assert!(point.child_of.contains(area.id()));
        assert!(area.parent_of.contains(point.id()));
    });
}

#[then("no records are kept")]
fn nothing_kept(#[from(world)] world: &NaptanWorld) {
    world.with_dataset(|dataset| {
        assert_eq!(dataset.stop_area_count(), 0);
        assert_eq!(dataset.stop_point_count(), 0);
    });
}

#[then("the import fails because the register is truncated")]
fn truncated(#[from(world)] world: &NaptanWorld) {
    assert!(world.dataset.borrow().is_none());
    match world.error.borrow().as_ref().expect("parse failed") {
        NaptanParseError::Truncated { name, element } => {
            assert_eq!(name, "stop_areas.xml");
            assert_eq!(element, "NaPTAN");
        }
        other => panic!("expected Truncated, got {other:?}"),
    }
}

macro_rules! register_naptan_scenario {
    ($fn_name:ident, $scenario_title:literal) => {
        #[scenario(path = "tests/features/naptan.feature", name = $scenario_title)]
        fn $fn_name(#[from(world)] world: NaptanWorld) {
            let _ = world;
        }
    };
}

register_naptan_scenario!(active_parent, "an active parent reference links two stop areas");
register_naptan_scenario!(inactive_parent, "an inactive parent reference creates no edge");
register_naptan_scenario!(stop_point_parent, "stop points are linked to their stop area");
register_naptan_scenario!(other_areas, "registers outside the configured areas yield nothing");
register_naptan_scenario!(cut_off_register, "a register cut off mid-file is rejected");
