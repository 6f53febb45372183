//! Classification and topology checks for the dependency analyzer

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use reify_core::{
    analyze, Anchor, AnchorTable, ClassDecls, ConstantDecl, CoreError, RootClassification,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn decl(name: &str, action: &str, tokens: &[&str]) -> ConstantDecl {
    ConstantDecl::parse(name, action, tokens).expect("valid tokens")
}

fn anchored(name: &str, parent: Option<&str>) -> RootClassification {
    RootClassification::Anchor {
        name: name.to_string(),
        parent: parent.map(str::to_string),
    }
}

/// Outer (class scope) with Inner (method scope) nested inside it.
fn nested_decls() -> ClassDecls {
    ClassDecls::new("Outer")
        .with_anchor(Anchor::class("Outer"))
        .with_anchor(Anchor::method("Inner", Some("Outer")))
        .with_constant(decl("Outer", "anchor", &[]))
        .with_constant(decl("Inner", "anchor", &["&Outer"]))
        .with_constant(decl("raw", "type", &["T:Outer"]))
}

#[test]
fn test_single_anchor_propagates() {
    init_tracing();
    let decls = ClassDecls::new("Box")
        .with_anchor(Anchor::class("T"))
        .with_constant(decl("T", "anchor", &[]))
        .with_constant(decl("raw", "type", &["T:Box"]))
        .with_constant(decl("self", "species", &["&raw", "&T"]))
        .with_constant(decl("wrapped", "linkage", &["&self"]))
        .with_constant(decl("unrelated", "list", &["&raw", "1"]));

    let analysis = analyze(&decls, &AnchorTable::default()).unwrap();

    assert_eq!(analysis.root("T"), Some(&anchored("T", None)));
    assert_eq!(analysis.root("self"), Some(&anchored("T", None)));
    assert_eq!(analysis.root("wrapped"), Some(&anchored("T", None)));
    assert_eq!(analysis.root("raw"), Some(&RootClassification::Constant));
    assert_eq!(analysis.root("unrelated"), Some(&RootClassification::Constant));

    let accessors: Vec<&str> = analysis.accessors().collect();
    assert_eq!(accessors, vec!["T", "self", "wrapped"]);
}

#[test]
fn test_nested_anchor_nearest_enclosing_wins() {
    init_tracing();
    let decls = nested_decls()
        .with_constant(decl("both", "list", &["&Outer", "&Inner"]))
        .with_constant(decl("both_reversed", "list", &["&Inner", "&raw", "&Outer"]));

    let analysis = analyze(&decls, &AnchorTable::default()).unwrap();

    assert_eq!(analysis.root("Inner"), Some(&anchored("Inner", Some("Outer"))));
    assert_eq!(analysis.root("both"), Some(&anchored("Inner", Some("Outer"))));
    assert_eq!(
        analysis.root("both_reversed"),
        Some(&anchored("Inner", Some("Outer")))
    );
}

#[test]
fn test_grandparent_chain_is_linear() {
    init_tracing();
    let decls = nested_decls()
        .with_anchor(Anchor::method("Deepest", Some("Inner")))
        .with_constant(decl("Deepest", "anchor", &["&Inner"]))
        .with_constant(decl("mix", "list", &["&Outer", "&Deepest"]));

    let analysis = analyze(&decls, &AnchorTable::default()).unwrap();
    assert_eq!(analysis.root("mix").and_then(|r| r.anchor_name()), Some("Deepest"));
}

#[test]
fn test_unrelated_anchors_diverge() {
    let decls = ClassDecls::new("Pair")
        .with_anchor(Anchor::class("A"))
        .with_anchor(Anchor::method("B", None))
        .with_constant(decl("A", "anchor", &[]))
        .with_constant(decl("B", "anchor", &[]))
        .with_constant(decl("mix", "list", &["&A", "&B"]));

    let err = analyze(&decls, &AnchorTable::default()).unwrap_err();
    assert_eq!(
        err,
        CoreError::DivergentAnchor {
            constant: "mix".into(),
            first: "A".into(),
            second: "B".into(),
        }
    );
}

#[test]
fn test_siblings_under_one_parent_diverge() {
    let decls = nested_decls()
        .with_anchor(Anchor::method("Sibling", Some("Outer")))
        .with_constant(decl("Sibling", "anchor", &["&Outer"]))
        .with_constant(decl("diamond", "list", &["&Inner", "&Sibling"]));

    let err = analyze(&decls, &AnchorTable::default()).unwrap_err();
    assert!(matches!(err, CoreError::DivergentAnchor { .. }));
}

#[test]
fn test_parent_must_be_anchor() {
    let decls = ClassDecls::new("Bad")
        .with_anchor(Anchor::class("T"))
        .with_anchor(Anchor::method("M", Some("T")))
        .with_constant(decl("T", "type", &["T:String"]))
        .with_constant(decl("M", "anchor", &["&T"]));

    let err = analyze(&decls, &AnchorTable::default()).unwrap_err();
    assert!(matches!(err, CoreError::Topology { ref constant, .. } if constant == "M"));
}

#[test]
fn test_nesting_must_match_declaration() {
    let decls = ClassDecls::new("Bad")
        .with_anchor(Anchor::class("T"))
        .with_anchor(Anchor::method("M", None))
        .with_constant(decl("T", "anchor", &[]))
        .with_constant(decl("M", "anchor", &["&T"]));

    let err = analyze(&decls, &AnchorTable::default()).unwrap_err();
    assert!(matches!(err, CoreError::Topology { .. }));
}

#[test]
fn test_undeclared_anchor() {
    let decls = ClassDecls::new("Plain").with_constant(decl("T", "anchor", &[]));

    let err = analyze(&decls, &AnchorTable::default()).unwrap_err();
    assert_eq!(
        err,
        CoreError::UndeclaredAnchor {
            constant: "T".into(),
            anchor: "T".into(),
        }
    );
}

#[test]
fn test_unresolved_reference() {
    let decls = ClassDecls::new("Plain").with_constant(decl("xs", "list", &["&missing"]));

    let err = analyze(&decls, &AnchorTable::default()).unwrap_err();
    assert_eq!(
        err,
        CoreError::UnresolvedReference {
            constant: "xs".into(),
            reference: "missing".into(),
        }
    );
}

#[test]
fn test_reference_cycle_is_topology_error() {
    let decls = ClassDecls::new("Loop")
        .with_constant(decl("a", "list", &["&b"]))
        .with_constant(decl("b", "list", &["&a"]));

    let err = analyze(&decls, &AnchorTable::default()).unwrap_err();
    assert!(matches!(err, CoreError::Topology { .. }));
}

#[test]
fn test_cross_class_anchor_needs_accessor() {
    let imported = AnchorTable::new([Anchor::class("Outer#T")]).unwrap();
    let decls = ClassDecls::new("Outer$Inner")
        .with_constant(decl("outerT", "anchor", &["\"Outer#T\""]))
        .with_constant(decl("n", "literal", &["1"]));

    let analysis = analyze(&decls, &imported).unwrap();
    assert!(analysis.needs_accessor("outerT"));
    assert!(!analysis.needs_accessor("n"));
    assert_eq!(analysis.anchor("Outer#T").map(|a| a.name.as_str()), Some("Outer#T"));
}

#[test]
fn test_second_super_mapping_rejected() {
    let decls = ClassDecls::new("Sub")
        .with_constant(decl("raw", "type", &["T:Base"]))
        .with_constant(decl("s", "species", &["&raw", "T:String"]))
        .with_constant(decl("super1", "super", &["&s"]))
        .with_constant(decl("super2", "super", &["&s"]));

    let err = analyze(&decls, &AnchorTable::default()).unwrap_err();
    assert!(matches!(err, CoreError::MalformedDeclaration { .. }));
}

#[test]
fn test_order_lists_dependencies_first() {
    let decls = ClassDecls::new("Chain")
        .with_constant(decl("c", "list", &["&b"]))
        .with_constant(decl("b", "list", &["&a"]))
        .with_constant(decl("a", "literal", &["1"]));

    let analysis = analyze(&decls, &AnchorTable::default()).unwrap();
    let order: Vec<&str> = analysis.order().collect();
    let pos = |n: &str| order.iter().position(|o| *o == n).unwrap();
    assert!(pos("a") < pos("b"));
    assert!(pos("b") < pos("c"));
}

#[test]
fn test_deep_chain_does_not_overflow() {
    let mut decls = ClassDecls::new("Deep").with_constant(decl("c0", "literal", &["0"]));
    for i in 1..20_000 {
        let prev = format!("&c{}", i - 1);
        decls = decls.with_constant(decl(&format!("c{}", i), "list", &[prev.as_str()]));
    }

    let analysis = analyze(&decls, &AnchorTable::default()).unwrap();
    assert_eq!(analysis.len(), 20_000);
    assert_eq!(analysis.root("c19999"), Some(&RootClassification::Constant));
}

proptest! {
    #[test]
    fn prop_anchor_free_graphs_are_constant(
        edges in prop::collection::vec(
            prop::collection::vec(any::<prop::sample::Index>(), 0..4),
            1..40,
        )
    ) {
        let mut decls = ClassDecls::new("Random");
        for (i, refs) in edges.iter().enumerate() {
            let name = format!("c{}", i);
            let decl = if i == 0 || refs.is_empty() {
                ConstantDecl::parse(&name, "literal", &[i.to_string().as_str()]).unwrap()
            } else {
                let tokens: Vec<String> = refs.iter().map(|r| format!("&c{}", r.index(i))).collect();
                let tokens: Vec<&str> = tokens.iter().map(String::as_str).collect();
                ConstantDecl::parse(&name, "list", &tokens).unwrap()
            };
            decls = decls.with_constant(decl);
        }

        let analysis = analyze(&decls, &AnchorTable::default()).unwrap();
        for i in 0..edges.len() {
            let name = format!("c{}", i);
            prop_assert_eq!(analysis.root(&name), Some(&RootClassification::Constant));
        }
        prop_assert_eq!(analysis.accessors().count(), 0);
    }
}
