//! Batch orchestration.
use std::collections::HashMap;

use crate::context::ContextSource;
use crate::source::ExperimentSource;
use crate::{ContextValue, Result};

use super::Snapshot;

/// Configuration for [`Evaluator`].
pub struct EvaluatorConfig {
    /// Where experiment definitions come from.
    pub source: Box<dyn ExperimentSource>,
    /// How entity contexts are built from environment data.
    pub context_source: Box<dyn ContextSource>,
}

/// Evaluator ties an experiment source and a context source together and produces a [`Snapshot`]
/// per evaluation batch.
///
/// Construct one at startup and pass it by reference; the providers are explicit values, not
/// process-global state. Experiments are re-loaded for every snapshot, so a batch always sees the
/// source's current configuration, and one snapshot never changes mid-batch.
pub struct Evaluator {
    config: EvaluatorConfig,
}

impl Evaluator {
    /// Create an evaluator from explicit providers.
    pub fn new(config: EvaluatorConfig) -> Evaluator {
        Evaluator { config }
    }

    /// Resolve experiment state for one entity.
    ///
    /// `override_spec` is the raw override text from caller-side state (e.g., a cookie value);
    /// see [`parse_overrides`].
    pub fn snapshot(
        &self,
        environment: HashMap<String, ContextValue>,
        override_spec: Option<&str>,
    ) -> Result<Snapshot> {
        let experiments = self.config.source.load()?;
        let overrides = override_spec.map(parse_overrides).unwrap_or_default();
        let context = self.config.context_source.context(environment);
        Ok(Snapshot::new(experiments, overrides, context))
    }
}

/// Extract experiment overrides from caller-side state and return them as a mapping of
/// experiment name to overridden variant.
///
/// The format is space-delimited `name:variant` tokens (split on the last `:`), e.g.
/// `"exp1:variantA exp2:variantB"`. Override sources are often user-controllable and
/// non-critical, so malformed tokens are skipped, not fatal.
pub fn parse_overrides(spec: &str) -> HashMap<String, String> {
    let mut overrides = HashMap::new();
    for token in spec.split_whitespace() {
        match token.rsplit_once(':') {
            Some((name, variant)) if !name.is_empty() && !variant.is_empty() => {
                overrides.insert(name.to_owned(), variant.to_owned());
            }
            _ => {
                log::debug!(target: "cravensworth",
                    token = token;
                    "skipping malformed override token");
            }
        }
    }
    overrides
}

/// Render overrides as override-spec text, the inverse of [`parse_overrides`].
///
/// Useful in tests to force experiment variants through the same path real overrides take,
/// making experiment behavior deterministic:
///
/// ```
/// # use cravensworth_core::eval::format_overrides;
/// let spec = format_overrides([("switch1", "on"), ("switch2", "off")]);
/// assert_eq!(spec, "switch1:on switch2:off");
/// ```
pub fn format_overrides<'a>(overrides: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    overrides
        .into_iter()
        .map(|(name, variant)| format!("{name}:{variant}"))
        .collect::<Vec<_>>()
        .join(" ")
}
