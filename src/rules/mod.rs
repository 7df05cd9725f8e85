//! The audience rule language.
//!
//! Audience rules are boolean expressions over context fields, e.g.
//! `locale == "en-US" and region in ["US", "CA"]`. Rule text usually comes from configuration, so
//! the language is deliberately closed: literals (including lists and dicts), context field
//! references, comparison and membership operators, and `and`/`or`/`not`. Rules are compiled once
//! when an audience is constructed and evaluated many times; a malformed rule fails configuration
//! loading instead of surfacing mid-request.
use crate::{Context, EvaluationError, RuleSyntaxError};

mod eval;
mod parser;

use parser::Expr;

/// A parsed, ready-to-evaluate audience rule.
///
/// Obtained from [`CompiledRule::parse`]. Compilation fails fast with [`RuleSyntaxError`];
/// evaluation returns [`EvaluationError::RuleType`] if the rule does not reduce to a boolean.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    source: String,
    root: Expr,
}

impl CompiledRule {
    /// Compile rule source text.
    pub fn parse(source: &str) -> Result<CompiledRule, RuleSyntaxError> {
        let root = parser::parse(source)?;
        Ok(CompiledRule {
            source: source.to_owned(),
            root,
        })
    }

    /// Evaluate the rule against a context.
    ///
    /// Evaluation is pure: it never mutates the context and has no side effects.
    pub fn evaluate(&self, context: &Context) -> Result<bool, EvaluationError> {
        match eval::evaluate(&self.root, context)? {
            crate::ContextValue::Boolean(value) => Ok(value),
            other => Err(EvaluationError::RuleType {
                detail: format!(
                    "rule {:?} must evaluate to a boolean, got {}",
                    self.source,
                    other.type_name(),
                ),
            }),
        }
    }

    /// The original rule source text.
    pub fn source(&self) -> &str {
        &self.source
    }
}

impl std::fmt::Display for CompiledRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

// Two rules are the same rule iff they were compiled from the same source.
impl PartialEq for CompiledRule {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}
