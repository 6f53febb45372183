//! Host class model
//!
//! Classes are loaded from a `ClassSpec` and shared as `ClassRef`, whose
//! equality and hash are pointer identity. Two loads of the same descriptor
//! are two distinct classes.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

use reify_core::{
    analyze, AmbientScope, Anchor, AnchorTable, ClassAnalysis, ClassDecls, ConstantDecl,
    ConstantExpr, FunctionRegistry, TypeDescriptor, Value,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::carrier::Carrier;
use crate::constants::ClassConstants;
use crate::error::{Result, RuntimeError};
use crate::store::erase;

/// A class as handed over by the rewriting front end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassSpec {
    pub descriptor: String,
    #[serde(default)]
    pub superclass: Option<String>,
    /// Descriptors of the default parameter vector. One entry is a scalar
    /// slot; empty means the class is not specializable.
    #[serde(default)]
    pub defaults: Vec<String>,
    #[serde(default)]
    pub methods: Vec<MethodSpec>,
    #[serde(default)]
    pub constants: Vec<ConstantDecl>,
    #[serde(default)]
    pub anchors: Vec<Anchor>,
    /// Anchors of enclosing classes that constants here may refer to.
    #[serde(default)]
    pub imported_anchors: Vec<ImportedAnchor>,
}

/// An anchor declared by another class, tagged with that class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportedAnchor {
    pub owner: String,
    #[serde(flatten)]
    pub anchor: Anchor,
}

impl ImportedAnchor {
    pub fn new(owner: impl Into<String>, anchor: Anchor) -> Self {
        Self {
            owner: owner.into(),
            anchor,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodSpec {
    pub name: String,
    #[serde(default)]
    pub signature: Option<String>,
    /// Constant whose value is the method's implementing function.
    pub implementation: String,
    #[serde(default)]
    pub defaults: Vec<String>,
}

impl ClassSpec {
    pub fn new(descriptor: impl Into<String>) -> Self {
        Self {
            descriptor: descriptor.into(),
            superclass: None,
            defaults: Vec::new(),
            methods: Vec::new(),
            constants: Vec::new(),
            anchors: Vec::new(),
            imported_anchors: Vec::new(),
        }
    }

    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_json_value(value: serde_json::Value) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    pub fn decls(&self) -> ClassDecls {
        ClassDecls {
            class: self.descriptor.clone(),
            constants: self.constants.clone(),
            anchors: self.anchors.clone(),
        }
    }
}

fn default_vector(descriptors: &[String]) -> Option<Value> {
    match descriptors {
        [] => None,
        [single] => Some(Value::ty(single)),
        many => Some(Value::list(many.iter().map(Value::ty))),
    }
}

#[derive(Debug, Clone)]
pub struct MethodDef {
    pub name: String,
    pub signature: Arc<str>,
    pub implementation: String,
    pub defaults: Option<Value>,
}

impl From<&MethodSpec> for MethodDef {
    fn from(spec: &MethodSpec) -> Self {
        Self {
            name: spec.name.clone(),
            signature: Arc::from(spec.signature.as_deref().unwrap_or(spec.name.as_str())),
            implementation: spec.implementation.clone(),
            defaults: default_vector(&spec.defaults),
        }
    }
}

pub struct ClassDef {
    descriptor: TypeDescriptor,
    superclass: Option<ClassRef>,
    defaults: Option<Value>,
    methods: Vec<MethodDef>,
    analysis: ClassAnalysis,
    /// Imported anchor id -> descriptor of the declaring class.
    imported_owners: HashMap<String, TypeDescriptor>,
    constants: ClassConstants,
}

impl ClassDef {
    /// Analyze `spec` and build the class. Analysis errors abort the class.
    pub fn load(spec: &ClassSpec, superclass: Option<ClassRef>) -> Result<ClassRef> {
        let imported = AnchorTable::new(
            spec.imported_anchors
                .iter()
                .map(|imported| imported.anchor.clone()),
        )?;
        let analysis = analyze(&spec.decls(), &imported)?;

        for method in &spec.methods {
            if !analysis.contains(&method.implementation) {
                return Err(reify_core::CoreError::UnresolvedReference {
                    constant: method.name.clone(),
                    reference: method.implementation.clone(),
                }
                .into());
            }
        }

        debug!(
            class = %spec.descriptor,
            constants = analysis.len(),
            methods = spec.methods.len(),
            "loaded class"
        );

        Ok(ClassRef(Arc::new(ClassDef {
            descriptor: TypeDescriptor::new(&spec.descriptor),
            superclass,
            defaults: default_vector(&spec.defaults),
            methods: spec.methods.iter().map(MethodDef::from).collect(),
            analysis,
            imported_owners: spec
                .imported_anchors
                .iter()
                .map(|imported| {
                    (
                        imported.anchor.name.clone(),
                        TypeDescriptor::new(&imported.owner),
                    )
                })
                .collect(),
            constants: ClassConstants::default(),
        })))
    }

    pub fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    pub fn superclass(&self) -> Option<&ClassRef> {
        self.superclass.as_ref()
    }

    pub fn defaults(&self) -> Option<&Value> {
        self.defaults.as_ref()
    }

    pub fn is_specializable(&self) -> bool {
        self.defaults.is_some()
    }

    pub fn analysis(&self) -> &ClassAnalysis {
        &self.analysis
    }

    pub fn methods(&self) -> &[MethodDef] {
        &self.methods
    }

    /// A method declared on this class itself.
    pub fn method(&self, name: &str) -> Option<&MethodDef> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn method_by_signature(&self, signature: &str) -> Option<&MethodDef> {
        self.methods.iter().find(|m| &*m.signature == signature)
    }

    /// Evaluate `constant` under `scope`, reusing this class's link-time
    /// values.
    pub fn evaluate(
        &self,
        constant: &str,
        scope: &dyn AmbientScope,
        functions: &FunctionRegistry,
    ) -> reify_core::Result<Value> {
        self.constants
            .evaluate(&self.analysis, functions, scope, constant)
    }

    /// The class whose carrier `constant` is read under: the declaring
    /// class of its root anchor. `None` for link-time constants.
    pub fn carrier_class(&self, constant: &str) -> Option<&TypeDescriptor> {
        let anchor = self.analysis.root(constant)?.anchor_name()?;
        match self.analysis.expr(anchor) {
            Some(ConstantExpr::AnchorRef { anchor: id, .. })
                if !self.analysis.anchors().contains(id) =>
            {
                self.imported_owners.get(id).or(Some(&self.descriptor))
            }
            _ => Some(&self.descriptor),
        }
    }

    /// Value of `constant` for `carrier`, evaluated at most once per carrier
    /// that wins the cache insert. The carrier must belong to
    /// [`carrier_class`](Self::carrier_class).
    pub fn accessor_value(
        &self,
        constant: &str,
        carrier: &Carrier,
        functions: &FunctionRegistry,
    ) -> Result<Value> {
        if let Some(expected) = self.carrier_class(constant) {
            let found = carrier.class().descriptor();
            if found != expected {
                return Err(RuntimeError::CarrierMismatch {
                    constant: constant.to_string(),
                    expected: expected.to_string(),
                    found: found.to_string(),
                });
            }
        }

        Ok(self
            .constants
            .accessor(&self.analysis, functions, carrier, constant)?)
    }
}

/// Shared handle to a loaded class, compared by identity.
#[derive(Clone)]
pub struct ClassRef(Arc<ClassDef>);

impl ClassRef {
    /// The class declaring `name`, searching this class then its supertypes.
    pub fn find_method(&self, name: &str) -> Option<(ClassRef, &MethodDef)> {
        let mut cursor = Some(self);
        while let Some(class) = cursor {
            if let Some(method) = class.method(name) {
                return Some((class.clone(), method));
            }
            cursor = class.superclass();
        }
        None
    }

    /// Number of superclass steps from this class up to `ancestor`.
    pub fn distance_to(&self, ancestor: &ClassRef) -> Option<usize> {
        let mut cursor = Some(self);
        let mut steps = 0;
        while let Some(class) = cursor {
            if class == ancestor {
                return Some(steps);
            }
            steps += 1;
            cursor = class.superclass();
        }
        None
    }
}

impl Deref for ClassRef {
    type Target = ClassDef;

    fn deref(&self) -> &ClassDef {
        &self.0
    }
}

impl PartialEq for ClassRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for ClassRef {}

impl Hash for ClassRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(Arc::as_ptr(&self.0), state);
    }
}

impl fmt::Debug for ClassRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClassRef({})", self.descriptor)
    }
}

impl fmt::Display for ClassRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.descriptor)
    }
}

/// Identity of a parametric class or method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Location {
    Class(ClassRef),
    Method {
        owner: ClassRef,
        class_parameters: Option<Value>,
        signature: Arc<str>,
    },
}

impl Location {
    pub fn class(class: &ClassRef) -> Self {
        Location::Class(class.clone())
    }

    /// A method location. `class_parameters` are erased against the owner's
    /// defaults and dropped when the owner is not specializable.
    pub fn method(
        owner: &ClassRef,
        class_parameters: Option<Value>,
        signature: impl AsRef<str>,
    ) -> Self {
        Location::Method {
            owner: owner.clone(),
            class_parameters: owner
                .defaults()
                .map(|defaults| erase(class_parameters.as_ref(), defaults)),
            signature: Arc::from(signature.as_ref()),
        }
    }

    pub fn owner(&self) -> &ClassRef {
        match self {
            Location::Class(class) => class,
            Location::Method { owner, .. } => owner,
        }
    }

    pub fn is_class_level(&self) -> bool {
        matches!(self, Location::Class(_))
    }

    /// The declared default parameter vector, if the location is
    /// specializable.
    pub fn defaults(&self) -> Option<&Value> {
        match self {
            Location::Class(class) => class.defaults(),
            Location::Method {
                owner, signature, ..
            } => owner
                .method_by_signature(signature)
                .and_then(|m| m.defaults.as_ref()),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Class(class) => write!(f, "{}", class),
            Location::Method {
                owner,
                class_parameters: Some(parameters),
                signature,
            } => write!(f, "{}<{}>::{}", owner, parameters, signature),
            Location::Method {
                owner, signature, ..
            } => write!(f, "{}::{}", owner, signature),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(descriptor: &str, defaults: &[&str]) -> ClassSpec {
        ClassSpec {
            defaults: defaults.iter().map(|d| d.to_string()).collect(),
            ..ClassSpec::new(descriptor)
        }
    }

    #[test]
    fn test_class_identity_is_by_pointer() {
        let a = ClassDef::load(&spec("Box", &["Object"]), None).unwrap();
        let b = ClassDef::load(&spec("Box", &["Object"]), None).unwrap();
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert_ne!(Location::class(&a), Location::class(&b));
    }

    #[test]
    fn test_default_vector_shapes() {
        let scalar = ClassDef::load(&spec("Box", &["Object"]), None).unwrap();
        let pair = ClassDef::load(&spec("Pair", &["Object", "Object"]), None).unwrap();
        let plain = ClassDef::load(&spec("Plain", &[]), None).unwrap();

        assert_eq!(scalar.defaults(), Some(&Value::ty("Object")));
        assert_eq!(
            pair.defaults(),
            Some(&Value::list([Value::ty("Object"), Value::ty("Object")]))
        );
        assert!(!plain.is_specializable());
    }

    #[test]
    fn test_superclass_walk() {
        let base = ClassDef::load(&spec("Base", &[]), None).unwrap();
        let mid = ClassDef::load(&spec("Mid", &[]), Some(base.clone())).unwrap();
        let leaf = ClassDef::load(&spec("Leaf", &[]), Some(mid.clone())).unwrap();
        let other = ClassDef::load(&spec("Other", &[]), None).unwrap();

        assert_eq!(leaf.distance_to(&leaf), Some(0));
        assert_eq!(leaf.distance_to(&base), Some(2));
        assert_eq!(leaf.distance_to(&other), None);
    }

    #[test]
    fn test_method_location_erases_class_parameters() {
        let owner = ClassDef::load(&spec("Util", &["Object"]), None).unwrap();
        let plain = ClassDef::load(&spec("Plain", &[]), None).unwrap();

        let erased = Location::method(&owner, Some(Value::Int(3)), "run()");
        assert_eq!(erased, Location::method(&owner, None, "run()"));
        assert_eq!(erased, Location::method(&owner, Some(Value::ty("Object")), "run()"));
        assert_ne!(erased, Location::method(&owner, Some(Value::ty("String")), "run()"));

        match Location::method(&plain, Some(Value::ty("String")), "run()") {
            Location::Method {
                class_parameters, ..
            } => assert_eq!(class_parameters, None),
            other => panic!("Expected a method location, got {:?}", other),
        }
    }

    #[test]
    fn test_carrier_class_follows_root_anchor() {
        let class = ClassDef::load(
            &ClassSpec {
                defaults: vec!["Object".into()],
                anchors: vec![Anchor::class("T")],
                imported_anchors: vec![ImportedAnchor::new("Outer", Anchor::class("Outer#T"))],
                constants: vec![
                    ConstantDecl::parse("T", "anchor", &[]).unwrap(),
                    ConstantDecl::parse("outer", "anchor", &["\"Outer#T\""]).unwrap(),
                    ConstantDecl::parse("wrapped", "list", &["&outer"]).unwrap(),
                    ConstantDecl::parse("own", "list", &["&T"]).unwrap(),
                    ConstantDecl::parse("raw", "type", &["T:Inner"]).unwrap(),
                ],
                ..ClassSpec::new("Inner")
            },
            None,
        )
        .unwrap();

        assert_eq!(class.carrier_class("own").map(|d| d.as_str()), Some("Inner"));
        assert_eq!(class.carrier_class("wrapped").map(|d| d.as_str()), Some("Outer"));
        assert_eq!(class.carrier_class("raw"), None);
    }

    #[test]
    fn test_accessor_rejects_carrier_of_another_class() {
        let boxed = ClassDef::load(
            &ClassSpec {
                defaults: vec!["Object".into()],
                anchors: vec![Anchor::class("T")],
                constants: vec![ConstantDecl::parse("T", "anchor", &[]).unwrap()],
                ..ClassSpec::new("Box")
            },
            None,
        )
        .unwrap();
        let pair = ClassDef::load(&spec("Pair", &["Object", "Object"]), None).unwrap();
        let functions = FunctionRegistry::new();
        let carrier = Carrier::synthesize(
            Location::class(&pair),
            Value::list([Value::ty("A"), Value::ty("B")]),
            None,
        );

        assert_eq!(
            boxed.accessor_value("T", &carrier, &functions).unwrap_err(),
            RuntimeError::CarrierMismatch {
                constant: "T".into(),
                expected: "Box".into(),
                found: "Pair".into(),
            }
        );
    }

    #[test]
    fn test_method_must_name_a_constant() {
        let mut bad = spec("Bad", &[]);
        bad.methods.push(MethodSpec {
            name: "run".into(),
            signature: None,
            implementation: "missing".into(),
            defaults: Vec::new(),
        });
        assert!(ClassDef::load(&bad, None).is_err());
    }
}
