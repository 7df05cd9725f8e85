//! Assignment resolution.
//!
//! Variant resolution for a single experiment is implemented on the model types. [`Snapshot`]
//! holds the resolved state for one entity for one batch; [`Evaluator`] wires an experiment
//! source and a context source together.
mod eval_assignment;
mod evaluator;
mod snapshot;

pub use evaluator::{format_overrides, parse_overrides, Evaluator, EvaluatorConfig};
pub use snapshot::Snapshot;
