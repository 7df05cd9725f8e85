//! Experiment sources.
//!
//! A source loads experiment definitions from some backend (static configuration, a file, a
//! database) and hands the core fully-validated [`Experiment`] values. Loading happens once per
//! evaluation batch, before any evaluation starts; a malformed experiment fails the load instead
//! of activating in a degraded form.
use serde::Deserialize;

use crate::{Allocation, Audience, Error, Experiment, Result, ValidationError};

/// Protocol for experiment sources.
///
/// Implementations must provide a `load` method returning the experiments the project should be
/// aware of. This allows flexible sourcing of experiments from different backends (e.g.,
/// embedded configuration, files, an API).
pub trait ExperimentSource {
    /// Loads all experiments that the project should be aware of.
    ///
    /// Callers that evaluate per request will call `load()` for every request.
    fn load(&self) -> Result<Vec<Experiment>>;
}

/// A source that loads experiments from a JSON document.
///
/// The document is a list where each entry is either an experiment object:
///
/// ```json
/// {
///     "name": "super_cool_experiment",
///     "identity": "user.id",
///     "variants": ["active", "inactive", "control"],
///     "audiences": [
///         {
///             "rule": "language == \"en\"",
///             "allocations": [
///                 {"variant": "active", "percent": 50},
///                 {"variant": "inactive", "percent": 0},
///                 {"variant": "control", "percent": 50}
///             ]
///         },
///         {
///             "rule": null,
///             "allocations": [{"variant": "inactive", "percent": 100}]
///         }
///     ]
/// }
/// ```
///
/// or, for experiments used as a simple switch (always one variant for all entities), the
/// shorthand string `"cool_switch:on"`, which is equivalent to:
///
/// ```json
/// {
///     "name": "cool_switch",
///     "identity": "random",
///     "variants": ["on", "off"],
///     "audiences": [
///         {"rule": null, "allocations": [{"variant": "on", "percent": 100}]}
///     ]
/// }
/// ```
///
/// An optional `"seed"` field overrides the hash seed (which defaults to the experiment name).
pub struct JsonSource {
    entries: Vec<ExperimentEntry>,
}

impl JsonSource {
    /// Parse a JSON experiment list.
    ///
    /// Syntax errors fail here; semantic validation happens in
    /// [`load`](JsonSource::load).
    pub fn from_json(json: &str) -> Result<JsonSource> {
        let entries = serde_json::from_str(json)?;
        Ok(JsonSource { entries })
    }

    fn read_object(spec: &ExperimentSpec) -> Result<Experiment> {
        let mut audiences = Vec::with_capacity(spec.audiences.len());
        for audience in &spec.audiences {
            let allocations = audience
                .allocations
                .iter()
                .map(|allocation| Allocation::new(&*allocation.variant, allocation.percent))
                .collect();
            audiences.push(Audience::new(audience.rule.as_deref(), allocations)?);
        }

        let experiment = Experiment::new(
            &*spec.name,
            &*spec.identity,
            spec.variants.clone(),
            audiences,
            spec.seed.clone(),
        );
        experiment.validate()?;
        Ok(experiment)
    }

    fn read_switch(value: &str) -> Result<Experiment> {
        let (name, variant) = value.rsplit_once(':').ok_or_else(|| {
            Error::Validation(ValidationError::InvalidSwitch {
                value: value.to_owned(),
            })
        })?;

        let experiment = Experiment::new(
            name,
            "random",
            vec!["on".to_owned(), "off".to_owned()],
            vec![Audience::new(None, vec![Allocation::new(variant, 100)])?],
            None,
        );
        experiment.validate()?;
        Ok(experiment)
    }
}

impl ExperimentSource for JsonSource {
    fn load(&self) -> Result<Vec<Experiment>> {
        self.entries
            .iter()
            .map(|entry| match entry {
                ExperimentEntry::Switch(value) => Self::read_switch(value),
                ExperimentEntry::Spec(spec) => Self::read_object(spec),
            })
            .collect()
    }
}

/// An in-memory experiment source, for embedders that build experiments programmatically and for
/// tests.
pub struct StaticSource {
    experiments: Vec<Experiment>,
}

impl StaticSource {
    /// Create a source from already-constructed experiments, validating them up front.
    pub fn new(experiments: Vec<Experiment>) -> Result<StaticSource> {
        for experiment in &experiments {
            experiment.validate()?;
        }
        Ok(StaticSource { experiments })
    }
}

impl ExperimentSource for StaticSource {
    fn load(&self) -> Result<Vec<Experiment>> {
        Ok(self.experiments.clone())
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ExperimentEntry {
    Switch(String),
    Spec(ExperimentSpec),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExperimentSpec {
    name: String,
    identity: String,
    variants: Vec<String>,
    audiences: Vec<AudienceSpec>,
    #[serde(default)]
    seed: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AudienceSpec {
    #[serde(default)]
    rule: Option<String>,
    allocations: Vec<AllocationSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AllocationSpec {
    variant: String,
    percent: u8,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Allocation, Audience, Error, Experiment, ValidationError};

    #[test]
    fn switch_shorthand_expands_to_a_full_experiment() {
        let source = JsonSource::from_json(r#"["beta:on"]"#).unwrap();
        let experiments = source.load().unwrap();

        let expected = Experiment::new(
            "beta",
            "random",
            vec!["on".to_owned(), "off".to_owned()],
            vec![Audience::new(None, vec![Allocation::new("on", 100)]).unwrap()],
            None,
        );
        assert_eq!(experiments, vec![expected]);
    }

    #[test]
    fn loads_experiment_objects() {
        let source = JsonSource::from_json(
            r#"
            [
                "switch_syntax:on",
                {
                    "name": "experimentitious",
                    "identity": "user.id",
                    "seed": "maseed",
                    "variants": ["active", "inactive", "control"],
                    "audiences": [
                        {
                            "rule": "locale == \"en-US\"",
                            "allocations": [
                                {"variant": "active", "percent": 10},
                                {"variant": "inactive", "percent": 80},
                                {"variant": "control", "percent": 10}
                            ]
                        },
                        {
                            "allocations": [
                                {"variant": "inactive", "percent": 100}
                            ]
                        }
                    ]
                }
            ]
            "#,
        )
        .unwrap();
        let experiments = source.load().unwrap();
        assert_eq!(experiments.len(), 2);

        let experiment = &experiments[1];
        assert_eq!(experiment.name, "experimentitious");
        assert_eq!(experiment.identity, "user.id");
        assert_eq!(experiment.seed, "maseed");
        assert_eq!(experiment.variants, ["active", "inactive", "control"]);
        assert_eq!(experiment.audiences.len(), 2);
        assert_eq!(
            experiment.audiences[0].rule.as_ref().map(|r| r.source()),
            Some(r#"locale == "en-US""#),
        );
        assert!(experiment.audiences[1].is_default());
        assert_eq!(
            experiment.audiences[0].allocations,
            vec![
                Allocation::new("active", 10),
                Allocation::new("inactive", 80),
                Allocation::new("control", 10),
            ],
        );
    }

    #[test]
    fn invalid_json_fails_to_parse() {
        assert!(matches!(
            JsonSource::from_json("[{"),
            Err(Error::Json(_)),
        ));
    }

    #[test]
    fn semantic_validation_fails_the_load() {
        let source = JsonSource::from_json(
            r#"
            [{
                "name": "broken",
                "identity": "random",
                "variants": ["active"],
                "audiences": [
                    {"allocations": [{"variant": "active", "percent": 90}]}
                ]
            }]
            "#,
        )
        .unwrap();
        assert!(matches!(
            source.load(),
            Err(Error::Validation(ValidationError::AllocationSum { sum: 90 })),
        ));
    }

    #[test]
    fn malformed_rules_fail_the_load() {
        let source = JsonSource::from_json(
            r#"
            [{
                "name": "broken",
                "identity": "random",
                "variants": ["active"],
                "audiences": [
                    {
                        "rule": "locale ==",
                        "allocations": [{"variant": "active", "percent": 100}]
                    },
                    {"allocations": [{"variant": "active", "percent": 100}]}
                ]
            }]
            "#,
        )
        .unwrap();
        assert!(matches!(
            source.load(),
            Err(Error::Validation(ValidationError::RuleSyntax(_))),
        ));
    }

    #[test]
    fn switch_without_variant_fails() {
        let source = JsonSource::from_json(r#"["not_a_switch"]"#).unwrap();
        assert!(matches!(
            source.load(),
            Err(Error::Validation(ValidationError::InvalidSwitch { .. })),
        ));
    }

    #[test]
    fn switch_with_undeclared_variant_fails() {
        let source = JsonSource::from_json(r#"["beta:blue"]"#).unwrap();
        assert!(matches!(
            source.load(),
            Err(Error::Validation(ValidationError::UndeclaredVariant { .. })),
        ));
    }

    #[test]
    fn static_source_validates_up_front() {
        let invalid = Experiment::new(
            "broken",
            "random",
            vec![],
            vec![Audience::new(None, vec![]).unwrap()],
            None,
        );
        assert!(matches!(
            StaticSource::new(vec![invalid]),
            Err(Error::Validation(ValidationError::NoVariants)),
        ));
    }
}
