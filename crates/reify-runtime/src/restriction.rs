//! Dynamic checks against declared restrictions

use reify_core::{TypeDescriptor, Value};

use crate::error::{Result, RuntimeError};

/// The runtime type a value reports when checked against a restriction.
pub fn runtime_type(value: &Value) -> TypeDescriptor {
    let name = match value {
        Value::Unit => "void",
        Value::Bool(_) => "boolean",
        Value::Int(_) => "int",
        Value::Double(_) => "double",
        Value::Str(_) => "String",
        Value::Type(_) => "Class",
        Value::List(_) => "List",
        Value::Species(species) => return species.raw.clone(),
        Value::Linkage(_) => "Linkage",
        Value::Restriction(_) => "Restriction",
        Value::Function(_) => "Function",
    };
    TypeDescriptor::new(name)
}

/// Check `value` in argument `slot` against `restriction`, a
/// `Value::Restriction` listing the permitted runtime types.
pub fn check(restriction: &Value, slot: usize, value: &Value) -> Result<()> {
    let Value::Restriction(allowed) = restriction else {
        return Err(reify_core::CoreError::linkage(
            "restriction",
            &[restriction],
            format!("expected a restriction, got {}", restriction.kind()),
        )
        .into());
    };

    let actual = runtime_type(value);
    if allowed.iter().any(|t| *t == actual) {
        return Ok(());
    }

    Err(RuntimeError::RestrictionViolation {
        slot,
        expected: allowed.iter().map(ToString::to_string).collect(),
        actual: actual.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings_or_ints() -> Value {
        Value::restriction([TypeDescriptor::new("String"), TypeDescriptor::new("int")])
    }

    #[test]
    fn test_permitted_types_pass() {
        assert!(check(&strings_or_ints(), 0, &Value::string("x")).is_ok());
        assert!(check(&strings_or_ints(), 0, &Value::Int(3)).is_ok());
    }

    #[test]
    fn test_violation_reports_slot_and_types() {
        let err = check(&strings_or_ints(), 2, &Value::Double(1.0)).unwrap_err();
        assert_eq!(
            err,
            RuntimeError::RestrictionViolation {
                slot: 2,
                expected: vec!["String".into(), "int".into()],
                actual: "double".into(),
            }
        );
    }

    #[test]
    fn test_species_checks_by_raw_type() {
        let restriction = Value::restriction([TypeDescriptor::new("Box")]);
        let boxed = Value::species(TypeDescriptor::new("Box"), Value::ty("String"));
        assert!(check(&restriction, 0, &boxed).is_ok());
    }

    #[test]
    fn test_non_restriction_is_linkage_error() {
        assert!(matches!(
            check(&Value::Int(1), 0, &Value::Int(1)),
            Err(RuntimeError::Core(_))
        ));
    }
}
