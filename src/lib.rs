//! `cravensworth_core` is the assignment core of the Cravensworth experimentation toolkit: given
//! a named experiment definition and an entity's contextual attributes, it deterministically
//! decides which variant of the experiment that entity sees.
//!
//! # Overview
//!
//! `cravensworth_core` is organized as a set of building blocks around one pure computation.
//!
//! [`Experiment`], [`Audience`], and [`Allocation`] form the immutable data model: a named,
//! versionable experiment definition with an identity keypath, a seed, a variant vocabulary, and
//! an ordered list of rule-gated audiences. Definitions are validated once, when they are loaded;
//! a well-formed experiment always produces a defined outcome at evaluation time.
//!
//! [`Context`] carries the evaluating entity's attributes for one evaluation batch (typically a
//! single request) and memoizes computed identities, so repeated lookups stay stable for the
//! batch, including the special `random` identity.
//!
//! [`CompiledRule`](rules::CompiledRule) is the audience rule language: a closed boolean
//! expression grammar over context fields, compiled at configuration load and safe to run on
//! configuration-supplied text.
//!
//! [`ExperimentSource`](source::ExperimentSource) and [`ContextSource`] are the capabilities the
//! core consumes: the former loads validated experiment definitions (see
//! [`JsonSource`](source::JsonSource) for the reference format), the latter adapts the
//! application's environment into a [`Context`].
//!
//! [`Snapshot`](eval::Snapshot) is the evaluation surface: the resolved experiment state for one
//! entity, answering `is_variant`-style queries and exporting all outcomes for analytics,
//! consistently for the whole batch. [`Evaluator`](eval::Evaluator) wires the sources together
//! and produces snapshots.
//!
//! Because evaluation functions are pure (no I/O, no global state), experiments can be shared
//! read-only across threads, and independent contexts evaluate fully in parallel.
//!
//! # Example
//!
//! ```
//! use std::collections::HashMap;
//!
//! use cravensworth_core::eval::Snapshot;
//! use cravensworth_core::source::{ExperimentSource, JsonSource};
//! use cravensworth_core::Context;
//!
//! # fn main() -> cravensworth_core::Result<()> {
//! let source = JsonSource::from_json(
//!     r#"
//!     [
//!         "new_logo:on",
//!         {
//!             "name": "greeting",
//!             "identity": "user.id",
//!             "variants": ["casual", "formal"],
//!             "audiences": [
//!                 {"rule": "locale == \"en-US\"",
//!                  "allocations": [{"variant": "casual", "percent": 100}]},
//!                 {"allocations": [{"variant": "formal", "percent": 100}]}
//!             ]
//!         }
//!     ]
//!     "#,
//! )?;
//!
//! let context = Context::new(HashMap::from([
//!     ("locale".to_owned(), "en-US".into()),
//!     ("user".to_owned(), HashMap::from([("id".to_owned(), "1234".into())]).into()),
//! ]));
//!
//! let snapshot = Snapshot::new(source.load()?, HashMap::new(), context);
//! assert!(snapshot.is_on("new_logo")?);
//! assert!(snapshot.is_variant("greeting", "casual")?);
//! # Ok(())
//! # }
//! ```

#![warn(rustdoc::missing_crate_level_docs)]

pub mod eval;
pub mod rules;
pub mod sharder;
pub mod source;

mod attributes;
mod context;
mod error;
mod models;

pub use attributes::ContextValue;
pub use context::{Context, ContextSource, DirectContextSource};
pub use error::{Error, EvaluationError, Result, RuleSyntaxError, ValidationError};
pub use models::{Allocation, Audience, Experiment};
