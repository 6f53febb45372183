//! Test fixtures for reify runtime testing
//!
//! Class specs in the JSON form the rewriting front end hands over, plus a
//! temporary-directory setup for tests that load them from disk.

use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};

/// Fixture classes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixtureType {
    /// `Box<T>`: one class anchor, a `describe` method reading it
    Box,
    /// `Pair<A, B>`: a two-slot parameter vector
    Pair,
    /// `StringBox<U> extends Box<U>` with an explicit supertype mapping
    StringBox,
    /// Maps onto a supertype it does not extend
    MismatchedBox,
    /// A method anchor nested under a class anchor
    NestedMethod,
    /// `Box$Inner`: reads the `T` anchor of its enclosing `Box`
    CrossClass,
    /// One constant depends on two unrelated anchors
    Divergent,
}

impl FixtureType {
    pub const ALL: [FixtureType; 7] = [
        FixtureType::Box,
        FixtureType::Pair,
        FixtureType::StringBox,
        FixtureType::MismatchedBox,
        FixtureType::NestedMethod,
        FixtureType::CrossClass,
        FixtureType::Divergent,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            FixtureType::Box => "box.json",
            FixtureType::Pair => "pair.json",
            FixtureType::StringBox => "string_box.json",
            FixtureType::MismatchedBox => "mismatched_box.json",
            FixtureType::NestedMethod => "nested_method.json",
            FixtureType::CrossClass => "cross_class.json",
            FixtureType::Divergent => "divergent.json",
        }
    }

    /// The class spec document.
    pub fn spec(self) -> Value {
        match self {
            FixtureType::Box => box_class(),
            FixtureType::Pair => pair_class(),
            FixtureType::StringBox => string_box_class(),
            FixtureType::MismatchedBox => mismatched_box_class(),
            FixtureType::NestedMethod => nested_method_class(),
            FixtureType::CrossClass => cross_class(),
            FixtureType::Divergent => divergent_class(),
        }
    }
}

/// Writes fixtures into a temporary directory that lives as long as `self`.
pub struct TestFixtures {
    temp_dir: Option<tempfile::TempDir>,
}

impl Default for TestFixtures {
    fn default() -> Self {
        Self::new()
    }
}

impl TestFixtures {
    pub fn new() -> Self {
        Self { temp_dir: None }
    }

    /// Write every fixture class plus `runtime_toml` as `runtime.toml`.
    pub fn setup(&mut self, runtime_toml: &str) -> PathBuf {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_path_buf();

        for fixture in FixtureType::ALL {
            write_json(&path.join(fixture.file_name()), &fixture.spec());
        }
        fs::write(path.join("runtime.toml"), runtime_toml).unwrap();

        self.temp_dir = Some(dir);
        path
    }
}

fn write_json(path: &Path, value: &Value) {
    fs::write(path, serde_json::to_string_pretty(value).unwrap()).unwrap();
}

fn r(name: &str) -> Value {
    json!({ "kind": "ref", "value": name })
}

fn ty(descriptor: &str) -> Value {
    json!({ "kind": "type", "value": descriptor })
}

fn func(name: &str) -> Value {
    json!({ "kind": "function", "value": name })
}

fn int(value: i32) -> Value {
    json!({ "kind": "int", "value": value })
}

fn text(value: &str) -> Value {
    json!({ "kind": "str", "value": value })
}

fn constant(name: &str, action: &str, args: Vec<Value>) -> Value {
    json!({ "name": name, "action": action, "args": args })
}

pub fn box_class() -> Value {
    json!({
        "descriptor": "Box",
        "defaults": ["Object"],
        "anchors": [{ "name": "T", "scope": "class" }],
        "constants": [
            constant("T", "anchor", vec![]),
            constant("raw", "type", vec![ty("Box")]),
            constant("self", "species", vec![r("raw"), r("T")]),
            constant("describe", "function", vec![func("type.descriptor"), r("T")]),
            constant("element", "restriction", vec![r("T")]),
            constant("label", "literal", vec![text("box")]),
            constant("name_of", "function", vec![func("type.descriptor")]),
        ],
        "methods": [{ "name": "describe", "implementation": "describe" }]
    })
}

pub fn pair_class() -> Value {
    json!({
        "descriptor": "Pair",
        "defaults": ["Object", "Object"],
        "anchors": [{ "name": "P", "scope": "class" }],
        "constants": [
            constant("P", "anchor", vec![]),
            constant("left", "list_get", vec![r("P"), int(0)]),
            constant("right", "list_get", vec![r("P"), int(1)]),
            constant("swapped", "list", vec![r("right"), r("left")]),
            constant("append_swapped", "function", vec![func("list.concat"), r("swapped")]),
        ],
        "methods": [{ "name": "append_swapped", "implementation": "append_swapped" }]
    })
}

pub fn string_box_class() -> Value {
    json!({
        "descriptor": "StringBox",
        "superclass": "Box",
        "defaults": ["Object"],
        "anchors": [{ "name": "U", "scope": "class" }],
        "constants": [
            constant("U", "anchor", vec![]),
            constant("super_raw", "type", vec![ty("Box")]),
            constant("super_species", "species", vec![r("super_raw"), r("U")]),
            constant("mapping", "super", vec![r("super_species")]),
        ]
    })
}

pub fn mismatched_box_class() -> Value {
    json!({
        "descriptor": "MismatchedBox",
        "superclass": "Box",
        "defaults": ["Object"],
        "constants": [
            constant("other", "type", vec![ty("Other")]),
            constant("other_species", "species", vec![r("other"), ty("String")]),
            constant("mapping", "super", vec![r("other_species")]),
        ]
    })
}

pub fn nested_method_class() -> Value {
    json!({
        "descriptor": "Util",
        "defaults": ["Object"],
        "anchors": [
            { "name": "T", "scope": "class" },
            { "name": "M", "scope": "method", "parent": "T" }
        ],
        "constants": [
            constant("T", "anchor", vec![]),
            constant("M", "anchor", vec![r("T")]),
            constant("both", "list", vec![r("T"), r("M")]),
            constant("append_both", "function", vec![func("list.concat"), r("both")]),
            constant("name_of", "function", vec![func("type.descriptor")]),
        ],
        "methods": [{
            "name": "append_both",
            "signature": "append_both(List)List",
            "implementation": "append_both",
            "defaults": ["Object"]
        }]
    })
}

pub fn cross_class() -> Value {
    json!({
        "descriptor": "Box$Inner",
        "imported_anchors": [{ "owner": "Box", "name": "Box#T", "scope": "class" }],
        "constants": [
            constant("boxT", "anchor", vec![text("Box#T")]),
            constant("wrapped", "list", vec![r("boxT")]),
        ]
    })
}

pub fn divergent_class() -> Value {
    json!({
        "descriptor": "Broken",
        "defaults": ["Object"],
        "anchors": [
            { "name": "A", "scope": "class" },
            { "name": "B", "scope": "method" }
        ],
        "constants": [
            constant("A", "anchor", vec![]),
            constant("B", "anchor", vec![]),
            constant("mix", "list", vec![r("A"), r("B")]),
        ]
    })
}
