//! Experiment definitions.
//!
//! [`Experiment`], [`Audience`], and [`Allocation`] are immutable value objects constructed by an
//! [`ExperimentSource`](crate::source::ExperimentSource) once per evaluation batch and discarded
//! after it. Validation runs once, at construction/load time, never per evaluation; a loaded
//! experiment is guaranteed well-formed.
use std::sync::OnceLock;

use regex::Regex;

use crate::rules::CompiledRule;
use crate::ValidationError;

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("pattern is valid"))
}

fn keypath_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_.]+$").expect("pattern is valid"))
}

/// Allocation represents the portion of an audience that is allocated to a particular variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    /// Variant receiving this share of the audience.
    pub variant: String,
    /// Percentage of the audience, `0..=100`.
    pub percent: u8,
}

impl Allocation {
    /// Create an allocation. Call [`validate`](Allocation::validate) before use.
    pub fn new(variant: impl Into<String>, percent: u8) -> Allocation {
        Allocation {
            variant: variant.into(),
            percent,
        }
    }

    /// Check field invariants.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !name_pattern().is_match(&self.variant) {
            return Err(ValidationError::InvalidVariantName {
                variant: self.variant.clone(),
            });
        }
        if self.percent > 100 {
            return Err(ValidationError::PercentOutOfRange {
                percent: self.percent,
            });
        }
        Ok(())
    }
}

/// An audience is a population of entities that all share a matching set of characteristics or,
/// in the case of a default (ruleless) audience, no particular characteristics.
///
/// Entities within an audience are assigned to an allocation based on their identities.
#[derive(Debug, Clone, PartialEq)]
pub struct Audience {
    /// Membership rule. `None` makes this a catch-all/default audience.
    pub rule: Option<CompiledRule>,
    /// Variant allocations, in declaration order. Order is semantically significant: buckets are
    /// assigned by cumulative sum over this list.
    pub allocations: Vec<Allocation>,
}

impl Audience {
    /// Create an audience, compiling the rule.
    ///
    /// A malformed rule fails here, at construction, with
    /// [`ValidationError::RuleSyntax`], not at evaluation time.
    pub fn new(rule: Option<&str>, allocations: Vec<Allocation>) -> Result<Audience, ValidationError> {
        let rule = rule.map(CompiledRule::parse).transpose()?;
        Ok(Audience { rule, allocations })
    }

    /// `true` if this is a catch-all/default audience.
    pub fn is_default(&self) -> bool {
        self.rule.is_none()
    }

    /// Check field invariants: every allocation is valid and percents sum to exactly 100.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut percent_total: u32 = 0;
        for allocation in &self.allocations {
            allocation.validate()?;
            percent_total += u32::from(allocation.percent);
        }

        if percent_total != 100 {
            return Err(ValidationError::AllocationSum { sum: percent_total });
        }
        Ok(())
    }
}

/// Experiment represents a test that can be used to verify a hypothesis by bucketing entities
/// into multiple variants.
#[derive(Debug, Clone, PartialEq)]
pub struct Experiment {
    /// Unique experiment name, `[A-Za-z0-9_]+`.
    pub name: String,
    /// Context keypath whose value identifies the entity, or `"random"`.
    pub identity: String,
    /// Declared variant vocabulary, in declaration order.
    pub variants: Vec<String>,
    /// Audiences, in match order.
    pub audiences: Vec<Audience>,
    /// Hash seed. Defaults to the experiment name; setting it explicitly decouples bucketing
    /// from the name (or aligns it across experiments).
    pub seed: String,
}

impl Experiment {
    /// Create an experiment. A missing seed defaults to the experiment name. Call
    /// [`validate`](Experiment::validate) before use.
    pub fn new(
        name: impl Into<String>,
        identity: impl Into<String>,
        variants: Vec<String>,
        audiences: Vec<Audience>,
        seed: Option<String>,
    ) -> Experiment {
        let name = name.into();
        let seed = seed.unwrap_or_else(|| name.clone());
        Experiment {
            name,
            identity: identity.into(),
            variants,
            audiences,
            seed,
        }
    }

    /// Check the experiment's invariants, including those of its audiences and allocations.
    ///
    /// - `name` matches `[A-Za-z0-9_]+`;
    /// - `identity` is `"random"` or a keypath;
    /// - at least one variant and at least one audience are declared;
    /// - a ruleless (default) audience appears only in the last position; the last audience may
    ///   carry a rule, in which case no entity may match and the experiment resolves to no
    ///   assignment for entities outside all audiences;
    /// - every allocation references a declared variant.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !name_pattern().is_match(&self.name) {
            return Err(ValidationError::InvalidName {
                name: self.name.clone(),
            });
        }

        if self.identity != crate::context::RANDOM_IDENTITY
            && !keypath_pattern().is_match(&self.identity)
        {
            return Err(ValidationError::InvalidIdentity {
                identity: self.identity.clone(),
            });
        }

        if self.variants.is_empty() {
            return Err(ValidationError::NoVariants);
        }

        if self.audiences.is_empty() {
            return Err(ValidationError::NoAudiences);
        }
        let before_last = &self.audiences[..self.audiences.len() - 1];
        if before_last.iter().any(Audience::is_default) {
            return Err(ValidationError::MisplacedDefaultAudience);
        }

        for audience in &self.audiences {
            audience.validate()?;
            for allocation in &audience.allocations {
                if !self.variants.contains(&allocation.variant) {
                    return Err(ValidationError::UndeclaredVariant {
                        variant: allocation.variant.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}
