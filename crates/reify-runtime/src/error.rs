use reify_core::CoreError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RuntimeError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Restriction violation at slot {slot}: expected one of [{}], got '{actual}'", expected.join(", "))]
    RestrictionViolation {
        slot: usize,
        expected: Vec<String>,
        actual: String,
    },

    #[error("Class '{class}' declares no default parameters and cannot be specialized")]
    NotSpecializable { class: String },

    #[error("'{ancestor}' is not a supertype of '{class}'")]
    NotASupertype { class: String, ancestor: String },

    #[error("Supertype mapping of '{class}' names '{found}' but its direct supertype is '{expected}'")]
    SupertypeMismatch {
        class: String,
        expected: String,
        found: String,
    },

    #[error("Supertype chain of '{class}' is deeper than {limit}")]
    SupertypeDepthExceeded { class: String, limit: usize },

    #[error("Unknown class '{class}'")]
    UnknownClass { class: String },

    #[error("Class '{class}' is already defined")]
    DuplicateClass { class: String },

    #[error("Unknown method '{method}' on '{class}'")]
    UnknownMethod { class: String, method: String },

    #[error("No constant is in flight on this thread")]
    NoConstantInFlight,

    #[error("Constant '{constant}' depends on an anchor but no carrier is ambient")]
    NoAmbientCarrier { constant: String },

    #[error("Constant '{constant}' reads the carrier of '{expected}' but the carrier belongs to '{found}'")]
    CarrierMismatch {
        constant: String,
        expected: String,
        found: String,
    },

    #[error("Restricted argument slot {slot} was not supplied")]
    MissingArgument { slot: usize },

    #[error("Call target adaptation {adaptation} needs carrier parameters but none are bound")]
    MissingCarrierParameters { adaptation: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl RuntimeError {
    pub fn unknown_class(class: impl Into<String>) -> Self {
        RuntimeError::UnknownClass {
            class: class.into(),
        }
    }

    /// Whether this failure is a type mismatch the caller can observe, as
    /// opposed to a malformed class or broken linkage.
    pub fn is_type_mismatch(&self) -> bool {
        matches!(self, RuntimeError::RestrictionViolation { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_errors_convert() {
        let core = CoreError::malformed("x", "bad operand");
        let err: RuntimeError = core.clone().into();
        assert_eq!(err, RuntimeError::Core(core));
        assert!(err.to_string().contains("bad operand"));
    }

    #[test]
    fn test_restriction_violation_display() {
        let err = RuntimeError::RestrictionViolation {
            slot: 1,
            expected: vec!["String".into(), "Integer".into()],
            actual: "int".into(),
        };
        assert_eq!(
            err.to_string(),
            "Restriction violation at slot 1: expected one of [String, Integer], got 'int'"
        );
        assert!(err.is_type_mismatch());
    }
}
