//! Contextual data about the entity being evaluated.
use std::collections::HashMap;
use std::sync::Mutex;

use rand::Rng;

use crate::sharder::{Md5Sharder, Sharder};
use crate::{ContextValue, EvaluationError};

/// Identity keypath that buckets the entity randomly instead of by a context value.
pub(crate) const RANDOM_IDENTITY: &str = "random";

/// Number of identity buckets. Identities are a closed range over `{0, ..., IDENTITY_BUCKETS-1}`.
const IDENTITY_BUCKETS: u64 = 100;

/// Context contains contextual data about one entity for use by experiments in determining
/// matching variants.
///
/// A context lives for one evaluation batch (e.g., a single incoming request) and is discarded
/// with it. Its only mutable state is an internal identity cache, which makes repeated
/// [`identity`](Context::identity) calls for the same `(keypath, seed)` pair stable for the
/// lifetime of the context, even for the `random` identity.
///
/// The cache is guarded, so a single `Context` may be shared across threads without recomputing
/// or racing identities. Independent contexts share nothing and evaluate fully in parallel.
#[derive(Debug, Default)]
pub struct Context {
    data: HashMap<String, ContextValue>,
    identities: Mutex<HashMap<(String, String), u64>>,
}

impl Context {
    /// Create a context from entity attributes.
    pub fn new(data: HashMap<String, ContextValue>) -> Context {
        Context {
            data,
            identities: Mutex::new(HashMap::new()),
        }
    }

    /// Look up a value by dot-delimited keypath, walking nested objects.
    ///
    /// A missing key or intermediate segment yields `None`, never an error.
    pub fn get(&self, keypath: &str) -> Option<&ContextValue> {
        let mut segments = keypath.split('.');
        let mut current = self.data.get(segments.next()?)?;
        for key in segments {
            match current {
                ContextValue::Object(map) => current = map.get(key)?,
                _ => return None,
            }
        }
        Some(current)
    }

    /// Calculate an identity in `[0, 100)` for the given keypath and seed.
    ///
    /// The keypath has a special value, `random`, that draws the identity uniformly instead of
    /// resolving context data. For any other keypath, the resolved value is combined with the
    /// seed and hashed.
    ///
    /// Identity values are cached, so the same keypath/seed pair is not re-calculated if
    /// `identity()` is called again on this context.
    ///
    /// Returns [`EvaluationError::MissingIdentity`] if the keypath does not resolve to a usable
    /// scalar value.
    pub fn identity(&self, keypath: &str, seed: &str) -> Result<u64, EvaluationError> {
        // self.identities.lock() should always return Ok(). Err() is possible only if the lock is
        // poisoned (a thread panicked while holding it), which should never happen.
        let mut identities = self
            .identities
            .lock()
            .expect("thread holding identity cache lock should not panic");

        if let Some(identity) = identities.get(&(keypath.to_owned(), seed.to_owned())) {
            return Ok(*identity);
        }

        let identity = self.calculate_identity(keypath, seed)?;
        identities.insert((keypath.to_owned(), seed.to_owned()), identity);
        Ok(identity)
    }

    fn calculate_identity(&self, keypath: &str, seed: &str) -> Result<u64, EvaluationError> {
        if keypath == RANDOM_IDENTITY {
            return Ok(rand::thread_rng().gen_range(0..IDENTITY_BUCKETS));
        }

        let value = self
            .get(keypath)
            .filter(|value| !value.is_null())
            .and_then(ContextValue::identity_string)
            .ok_or_else(|| EvaluationError::MissingIdentity {
                keypath: keypath.to_owned(),
            })?;

        Ok(Md5Sharder.shard(format!("{value}{seed}"), IDENTITY_BUCKETS))
    }
}

impl FromIterator<(String, ContextValue)> for Context {
    fn from_iter<I: IntoIterator<Item = (String, ContextValue)>>(iter: I) -> Context {
        Context::new(iter.into_iter().collect())
    }
}

/// A capability producing a [`Context`] from caller-supplied environment data.
///
/// Implementations adapt whatever environment the embedding application has (request attributes,
/// session data, job metadata) into entity attributes. They are constructed explicitly at startup
/// and passed by reference; the core never discovers them reflectively.
pub trait ContextSource {
    /// Construct a context for one entity from environment data.
    fn context(&self, environment: HashMap<String, ContextValue>) -> Context;
}

/// A context source that uses the environment data as the context, unchanged.
pub struct DirectContextSource;

impl ContextSource for DirectContextSource {
    fn context(&self, environment: HashMap<String, ContextValue>) -> Context {
        Context::new(environment)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::ContextValue;

    fn nested_context() -> Context {
        [
            (
                "user".to_owned(),
                ContextValue::Object(HashMap::from([
                    ("id".to_owned(), ContextValue::from("1234")),
                    ("age".to_owned(), ContextValue::from(42.0)),
                    ("email".to_owned(), ContextValue::Null),
                ])),
            ),
            ("locale".to_owned(), ContextValue::from("en-US")),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn get_walks_nested_objects() {
        let context = nested_context();
        assert_eq!(context.get("locale"), Some(&ContextValue::from("en-US")));
        assert_eq!(context.get("user.id"), Some(&ContextValue::from("1234")));
        assert_eq!(context.get("user.age"), Some(&ContextValue::Number(42.0)));
    }

    #[test]
    fn get_returns_none_for_missing_segments() {
        let context = nested_context();
        assert_eq!(context.get("user.name"), None);
        assert_eq!(context.get("account.id"), None);
        assert_eq!(context.get("locale.region"), None);
        assert_eq!(context.get("user.id.digits"), None);
    }

    #[test]
    fn identity_hashes_value_and_seed() {
        let context = nested_context();
        // md5("1234checkout_flow")[0..8] % 100
        assert_eq!(context.identity("user.id", "checkout_flow"), Ok(20));
        // A different seed re-buckets the same entity.
        assert_eq!(context.identity("user.id", "altseed"), Ok(3));
    }

    #[test]
    fn identity_fails_for_missing_or_null_values() {
        let context = nested_context();
        assert_eq!(
            context.identity("user.name", "seed"),
            Err(EvaluationError::MissingIdentity {
                keypath: "user.name".to_owned(),
            }),
        );
        assert_eq!(
            context.identity("user.email", "seed"),
            Err(EvaluationError::MissingIdentity {
                keypath: "user.email".to_owned(),
            }),
        );
    }

    #[test]
    fn identity_fails_for_compound_values() {
        let context = nested_context();
        assert_eq!(
            context.identity("user", "seed"),
            Err(EvaluationError::MissingIdentity {
                keypath: "user".to_owned(),
            }),
        );
    }

    #[test]
    fn random_identity_is_stable_within_a_context() {
        let context = Context::default();
        let first = context.identity("random", "seed").unwrap();
        assert!(first < 100);
        for _ in 0..10 {
            assert_eq!(context.identity("random", "seed"), Ok(first));
        }
    }

    #[test]
    fn identity_is_idempotent() {
        let context = nested_context();
        let first = context.identity("user.id", "seed").unwrap();
        assert_eq!(context.identity("user.id", "seed"), Ok(first));
    }

    #[test]
    fn context_source_produces_context_from_environment() {
        let source = DirectContextSource;
        let context = source.context(HashMap::from([(
            "region".to_owned(),
            ContextValue::from("eu"),
        )]));
        assert_eq!(context.get("region"), Some(&ContextValue::from("eu")));
    }
}
