use std::sync::Arc;

/// Result type used throughout the crate.
///
/// This `Result` type is a standard Rust `Result` type where the error variant is defined by the
/// crate-specific [`Error`] enum.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error for experiment loading and evaluation.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// Experiment configuration failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Error evaluating an experiment.
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    /// Experiment configuration is not valid JSON.
    #[error(transparent)]
    // serde_json::Error is not clonable, so we're wrapping it in an Arc.
    Json(Arc<serde_json::Error>),
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::Json(Arc::new(value))
    }
}

/// Enum representing configuration-time validation failures.
///
/// Each variant names the violated invariant. Validation runs once, when experiments are
/// constructed by a source; a malformed experiment fails loading instead of degrading silently.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum ValidationError {
    /// Experiment name contains characters outside `[A-Za-z0-9_]`.
    #[error("experiment name {name:?} must contain only [A-Za-z0-9_]")]
    InvalidName {
        /// The offending name.
        name: String,
    },

    /// Identity is neither `"random"` nor a valid keypath.
    #[error("invalid identity keypath {identity:?}")]
    InvalidIdentity {
        /// The offending identity keypath.
        identity: String,
    },

    /// Variant name contains characters outside `[A-Za-z0-9_]`.
    #[error("variant {variant:?} must contain only [A-Za-z0-9_]")]
    InvalidVariantName {
        /// The offending variant name.
        variant: String,
    },

    /// Allocation percent is greater than 100.
    #[error("allocation percent {percent} must not be greater than 100")]
    PercentOutOfRange {
        /// The offending percent value.
        percent: u8,
    },

    /// An audience's allocation percents do not sum to exactly 100.
    #[error("audience allocations sum to {sum} percent, expected 100")]
    AllocationSum {
        /// Actual sum of the allocation percents.
        sum: u32,
    },

    /// Experiment declares no variants.
    #[error("experiment must declare at least one variant")]
    NoVariants,

    /// Experiment declares no audiences.
    #[error("experiment must declare at least one audience")]
    NoAudiences,

    /// A catch-all audience (no rule) appears before the end of the audience list.
    #[error("an audience without a rule is allowed only in the last position")]
    MisplacedDefaultAudience,

    /// An allocation references a variant that the experiment does not declare.
    #[error("allocation references undeclared variant {variant:?}")]
    UndeclaredVariant {
        /// The undeclared variant name.
        variant: String,
    },

    /// A switch shorthand entry is not of the form `name:variant`.
    #[error("switch shorthand {value:?} must be of the form \"name:variant\"")]
    InvalidSwitch {
        /// The offending entry.
        value: String,
    },

    /// An audience rule failed to parse.
    #[error(transparent)]
    RuleSyntax(#[from] RuleSyntaxError),
}

/// An audience rule failed to parse.
///
/// Raised when an [`Audience`](crate::Audience) is constructed, not at evaluation time, so a
/// malformed rule is caught while loading configuration.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("rule syntax error at offset {position}: {message}")]
pub struct RuleSyntaxError {
    /// Byte offset into the rule source where parsing failed.
    pub position: usize,
    /// Description of the failure.
    pub message: String,
}

/// Enum representing errors that can occur while resolving a variant.
///
/// These surface configuration bugs during use and are not recoverable locally; they propagate to
/// the caller, which decides default behavior.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum EvaluationError {
    /// The configured identity keypath resolved to nothing usable for the current entity.
    ///
    /// Silently bucketing an entity without an identity would break the deterministic-assignment
    /// guarantee, so this propagates instead.
    #[error("identity keypath {keypath:?} not found in the context, or the value is null")]
    MissingIdentity {
        /// The identity keypath that failed to resolve.
        keypath: String,
    },

    /// A rule did not reduce to a boolean, or an operator was applied to incompatible operands.
    #[error("rule type error: {detail}")]
    RuleType {
        /// Description of the type mismatch.
        detail: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_messages_name_the_invariant() {
        let err = ValidationError::AllocationSum { sum: 90 };
        assert_eq!(
            err.to_string(),
            "audience allocations sum to 90 percent, expected 100"
        );

        let err = ValidationError::UndeclaredVariant {
            variant: "mystery".to_owned(),
        };
        assert!(err.to_string().contains("mystery"));
    }

    #[test]
    fn rule_syntax_error_converts_into_validation_error() {
        let syntax = RuleSyntaxError {
            position: 3,
            message: "unexpected token".to_owned(),
        };
        let err: ValidationError = syntax.clone().into();
        assert_eq!(err, ValidationError::RuleSyntax(syntax));
    }

    #[test]
    fn evaluation_error_is_cloneable_through_top_level_error() {
        let err: Error = EvaluationError::MissingIdentity {
            keypath: "user.id".to_owned(),
        }
        .into();
        let _ = err.clone();
        assert!(err.to_string().contains("user.id"));
    }
}
