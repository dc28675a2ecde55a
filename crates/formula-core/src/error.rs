use thiserror::Error;

pub type Result<T> = std::result::Result<T, FormulaError>;

/// Configuration and lookup failures surfaced to callers.
///
/// These indicate a programming error in form configuration and are never
/// retried. Runtime data errors (validation failures) are not represented
/// here; they become entries in a field's error map.
#[derive(Debug, Error)]
pub enum FormulaError {
    #[error("unknown decision operator `{name}`, register it first")]
    UnknownOperator { name: String },

    #[error("operator `{name}` is built in and cannot be registered")]
    ReservedOperator { name: String },

    #[error("operator `{operator}` expects {expected} operand(s), got {actual}")]
    InvalidArity {
        operator: String,
        expected: String,
        actual: usize,
    },

    #[error("malformed decision expression: {reason}")]
    InvalidExpression { reason: String },

    #[error("decision references unknown flag `{name}`")]
    UnresolvedFlag { name: String },

    #[error("cannot resolve path `{path}`: segment `{segment}` is absent")]
    PathResolution { path: String, segment: String },

    #[error("no field at path `{path}`")]
    FieldNotFound { path: String },

    #[error("duplicate field path `{path}`")]
    DuplicateField { path: String },

    #[error("invalid field id `{id}`: ids are non-empty and contain no `.`, `[` or `]`")]
    InvalidFieldId { id: String },

    #[error("field `{path}` is not attached to a live form")]
    Detached { path: String },

    #[error("a form with id `{id}` already exists")]
    DuplicateForm { id: String },

    #[error("validator engine `{engine}` is not registered")]
    UnknownValidatorEngine { engine: String },

    #[error("invalid field descriptor: {0}")]
    Descriptor(#[from] serde_json::Error),
}

impl FormulaError {
    #[must_use]
    pub fn unknown_operator(name: impl Into<String>) -> Self {
        Self::UnknownOperator { name: name.into() }
    }

    #[must_use]
    pub fn unresolved_flag(name: impl Into<String>) -> Self {
        Self::UnresolvedFlag { name: name.into() }
    }

    #[must_use]
    pub fn field_not_found(path: impl Into<String>) -> Self {
        Self::FieldNotFound { path: path.into() }
    }

    #[must_use]
    pub fn path(path: impl Into<String>, segment: impl Into<String>) -> Self {
        Self::PathResolution {
            path: path.into(),
            segment: segment.into(),
        }
    }

    /// Whether the error stems from form configuration rather than a lookup.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::UnknownOperator { .. }
                | Self::ReservedOperator { .. }
                | Self::InvalidArity { .. }
                | Self::InvalidExpression { .. }
                | Self::UnresolvedFlag { .. }
                | Self::DuplicateField { .. }
                | Self::InvalidFieldId { .. }
                | Self::UnknownValidatorEngine { .. }
                | Self::Descriptor(_)
        )
    }
}

/// Failure reported by a validator-engine adapter.
///
/// Always recovered locally into a synthetic error entry on the field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("validator engine `{engine}` failed: {message}")]
pub struct ValidationEngineError {
    pub engine: String,
    pub message: String,
}

impl ValidationEngineError {
    #[must_use]
    pub fn new(engine: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            engine: engine.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = FormulaError::unknown_operator("xor");
        assert!(err.to_string().contains("xor"));
        assert!(err.to_string().contains("register"));

        let err = FormulaError::path("userinfo.phone", "userinfo");
        assert_eq!(
            err.to_string(),
            "cannot resolve path `userinfo.phone`: segment `userinfo` is absent"
        );
    }

    #[test]
    fn configuration_classification() {
        assert!(FormulaError::unresolved_flag("isAdult").is_configuration());
        assert!(!FormulaError::field_not_found("a.b").is_configuration());
        assert!(
            !FormulaError::DuplicateForm {
                id: "login".into()
            }
            .is_configuration()
        );
    }

    #[test]
    fn engine_error_display() {
        let err = ValidationEngineError::new("zod", "schema exploded");
        assert_eq!(err.to_string(), "validator engine `zod` failed: schema exploded");
    }
}
