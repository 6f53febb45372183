use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("Topology error in constant '{constant}': {message}")]
    Topology { constant: String, message: String },

    #[error("Divergent anchors in constant '{constant}': '{first}' and '{second}' are not on one parent chain")]
    DivergentAnchor {
        constant: String,
        first: String,
        second: String,
    },

    #[error("Unresolved reference in constant '{constant}': '{reference}' is not declared")]
    UnresolvedReference { constant: String, reference: String },

    #[error("Undeclared anchor in constant '{constant}': '{anchor}' is not a specialization point")]
    UndeclaredAnchor { constant: String, anchor: String },

    #[error("Malformed declaration '{constant}': {reason}")]
    MalformedDeclaration { constant: String, reason: String },

    #[error("Evaluation linkage error in '{action}' with arguments [{}]: {reason}", arguments.join(", "))]
    EvaluationLinkage {
        action: String,
        arguments: Vec<String>,
        reason: String,
    },
}

impl CoreError {
    pub fn topology(constant: impl Into<String>, message: impl Into<String>) -> Self {
        CoreError::Topology {
            constant: constant.into(),
            message: message.into(),
        }
    }

    pub fn malformed(constant: impl Into<String>, reason: impl Into<String>) -> Self {
        CoreError::MalformedDeclaration {
            constant: constant.into(),
            reason: reason.into(),
        }
    }

    /// Build a linkage error, rendering each argument with its `Display` form.
    pub fn linkage<A: ToString>(
        action: impl Into<String>,
        arguments: &[A],
        reason: impl Into<String>,
    ) -> Self {
        CoreError::EvaluationLinkage {
            action: action.into(),
            arguments: arguments.iter().map(ToString::to_string).collect(),
            reason: reason.into(),
        }
    }

    /// Errors raised while analyzing a class's declarations. These abort the
    /// whole class rather than a single call.
    pub fn is_analysis_error(&self) -> bool {
        !matches!(self, CoreError::EvaluationLinkage { .. })
    }
}
