//! Evaluated constant values
//!
//! `Value` is what the evaluator produces and what the specialization store
//! keys on. Equality and hashing are structural; doubles compare by bit
//! pattern so a value can always serve as a cache key component.

use std::borrow::Borrow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::functions::BoundFunction;

/// A reified type, named by its descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeDescriptor(Arc<str>);

impl TypeDescriptor {
    pub fn new(descriptor: impl AsRef<str>) -> Self {
        Self(Arc::from(descriptor.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for TypeDescriptor {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TypeDescriptor {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// One concrete instantiation: a raw type plus its parameter payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Species {
    pub raw: TypeDescriptor,
    pub parameters: Value,
}

impl Species {
    pub fn new(raw: TypeDescriptor, parameters: Value) -> Self {
        Self { raw, parameters }
    }
}

#[derive(Debug, Clone)]
pub enum Value {
    Unit,
    Bool(bool),
    Int(i32),
    Double(f64),
    Str(Arc<str>),
    Type(TypeDescriptor),
    List(Arc<[Value]>),
    Species(Arc<Species>),
    /// Marks the wrapped value as an instantiation or call request.
    Linkage(Arc<Value>),
    Restriction(Arc<[TypeDescriptor]>),
    Function(BoundFunction),
}

impl Value {
    pub fn string(text: impl AsRef<str>) -> Self {
        Value::Str(Arc::from(text.as_ref()))
    }

    pub fn ty(descriptor: impl AsRef<str>) -> Self {
        Value::Type(TypeDescriptor::new(descriptor))
    }

    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Value::List(items.into_iter().collect())
    }

    pub fn species(raw: TypeDescriptor, parameters: Value) -> Self {
        Value::Species(Arc::new(Species::new(raw, parameters)))
    }

    pub fn linkage(inner: Value) -> Self {
        Value::Linkage(Arc::new(inner))
    }

    pub fn restriction(types: impl IntoIterator<Item = TypeDescriptor>) -> Self {
        Value::Restriction(types.into_iter().collect())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::Unit => "unit",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Double(_) => "double",
            Value::Str(_) => "string",
            Value::Type(_) => "type",
            Value::List(_) => "list",
            Value::Species(_) => "species",
            Value::Linkage(_) => "linkage",
            Value::Restriction(_) => "restriction",
            Value::Function(_) => "function",
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_type(&self) -> Option<&TypeDescriptor> {
        match self {
            Value::Type(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_species(&self) -> Option<&Species> {
        match self {
            Value::Species(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&BoundFunction> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Whether this value may stand in a specialization slot as-is.
    ///
    /// Only reified types and full instantiations qualify; everything else is
    /// erased to the declared default.
    pub fn is_specialization_argument(&self) -> bool {
        matches!(self, Value::Type(_) | Value::Species(_))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Unit, Value::Unit) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Type(a), Value::Type(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Species(a), Value::Species(b)) => a == b,
            (Value::Linkage(a), Value::Linkage(b)) => a == b,
            (Value::Restriction(a), Value::Restriction(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Unit => {}
            Value::Bool(v) => v.hash(state),
            Value::Int(v) => v.hash(state),
            Value::Double(v) => v.to_bits().hash(state),
            Value::Str(v) => v.hash(state),
            Value::Type(v) => v.hash(state),
            Value::List(items) => items.hash(state),
            Value::Species(s) => s.hash(state),
            Value::Linkage(inner) => inner.hash(state),
            Value::Restriction(types) => types.hash(state),
            Value::Function(f) => f.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => write!(f, "()"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{:?}", v),
            Value::Str(v) => write!(f, "{:?}", v),
            Value::Type(t) => write!(f, "T:{}", t),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Species(s) => write!(f, "{}<{}>", s.raw, s.parameters),
            Value::Linkage(inner) => write!(f, "linkage({})", inner),
            Value::Restriction(types) => {
                let names: Vec<&str> = types.iter().map(TypeDescriptor::as_str).collect();
                write!(f, "restriction[{}]", names.join(", "))
            }
            Value::Function(func) => write!(f, "{}", func),
        }
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<TypeDescriptor> for Value {
    fn from(value: TypeDescriptor) -> Self {
        Value::Type(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_structural_equality_and_hash() {
        let a = Value::list([Value::ty("String"), Value::Int(3)]);
        let b = Value::list([Value::ty("String"), Value::Int(3)]);
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn test_doubles_compare_by_bits() {
        assert_eq!(Value::Double(f64::NAN), Value::Double(f64::NAN));
        assert_ne!(Value::Double(0.0), Value::Double(-0.0));
        assert_ne!(Value::Int(1), Value::Double(1.0));
    }

    #[test]
    fn test_specialization_argument_eligibility() {
        assert!(Value::ty("String").is_specialization_argument());
        assert!(Value::species(TypeDescriptor::new("Box"), Value::ty("Integer"))
            .is_specialization_argument());
        assert!(!Value::Int(1).is_specialization_argument());
        assert!(!Value::string("String").is_specialization_argument());
    }

    #[test]
    fn test_display() {
        let v = Value::species(
            TypeDescriptor::new("Pair"),
            Value::list([Value::ty("String"), Value::Double(1.5)]),
        );
        assert_eq!(v.to_string(), "Pair<[T:String, 1.5]>");
    }
}
