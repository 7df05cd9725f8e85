//! Resolved experiment state for one entity.
use std::collections::HashMap;

use crate::{Context, EvaluationError, Experiment};

/// A container holding the experiment state for a particular entity within a given lifetime
/// (e.g., a single request).
///
/// A snapshot owns the experiment set, the entity's overrides, and the entity's [`Context`] for
/// one evaluation batch. Because none of those change mid-batch (and identities are cached),
/// every query within the batch is mutually consistent.
pub struct Snapshot {
    experiments: HashMap<String, Experiment>,
    overrides: HashMap<String, String>,
    context: Context,
}

impl Snapshot {
    /// Create a snapshot from loaded experiments, extracted overrides, and the entity's context.
    pub fn new(
        experiments: Vec<Experiment>,
        overrides: HashMap<String, String>,
        context: Context,
    ) -> Snapshot {
        Snapshot {
            experiments: experiments
                .into_iter()
                .map(|experiment| (experiment.name.clone(), experiment))
                .collect(),
            overrides,
            context,
        }
    }

    /// The context this snapshot evaluates against.
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Resolve the variant for a known experiment.
    ///
    /// Returns `Ok(None)` if the experiment is not known to this snapshot or resolves to no
    /// assignment.
    pub fn determine_variant(&self, name: &str) -> Result<Option<&str>, EvaluationError> {
        let Some(experiment) = self.experiments.get(name) else {
            return Ok(None);
        };
        let override_variant = self.overrides.get(name).map(String::as_str);
        experiment.determine_variant(&self.context, override_variant)
    }

    /// Returns true if the determined variant for the current entity matches `variant`.
    ///
    /// Querying an experiment that was never declared is not an error: it logs a warning and
    /// returns false, so flag checks against experiments not yet deployed to this environment
    /// don't crash calling code.
    pub fn is_variant(&self, name: &str, variant: &str) -> Result<bool, EvaluationError> {
        self.is_variant_in(name, &[variant])
    }

    /// Returns true if the determined variant for the current entity matches one of `variants`.
    pub fn is_variant_in(&self, name: &str, variants: &[&str]) -> Result<bool, EvaluationError> {
        if !self.experiments.contains_key(name) {
            log::warn!(target: "cravensworth",
                experiment = name;
                "is_variant was called for an undeclared experiment. If this is a valid \
                 experiment, ensure that it exists in your experiment source and is correctly \
                 configured. Returning non-match.");
            return Ok(false);
        }

        let active = self.determine_variant(name)?;
        Ok(active.is_some_and(|active| variants.contains(&active)))
    }

    /// Returns true if the named switch is on.
    pub fn is_on(&self, name: &str) -> Result<bool, EvaluationError> {
        self.is_variant(name, "on")
    }

    /// Returns true if the named switch is off.
    pub fn is_off(&self, name: &str) -> Result<bool, EvaluationError> {
        self.is_variant(name, "off")
    }

    /// Resolve every known experiment once, e.g. for logging or analytics.
    ///
    /// `None` records "no assignment". Overrides are honored the same way they are in
    /// [`determine_variant`](Snapshot::determine_variant).
    pub fn export(&self) -> Result<HashMap<String, Option<String>>, EvaluationError> {
        let mut state = HashMap::with_capacity(self.experiments.len());
        for (name, experiment) in &self.experiments {
            let override_variant = self.overrides.get(name).map(String::as_str);
            let variant = experiment.determine_variant(&self.context, override_variant)?;
            state.insert(name.clone(), variant.map(str::to_owned));
        }
        Ok(state)
    }
}
