//! Variant resolution for a single experiment.
use crate::{Audience, Context, EvaluationError, Experiment};

impl Audience {
    /// Tests an entity to see if it matches the rule for inclusion in the audience.
    ///
    /// A default (ruleless) audience matches unconditionally.
    pub fn matches(&self, context: &Context) -> Result<bool, EvaluationError> {
        match &self.rule {
            None => Ok(true),
            Some(rule) => rule.evaluate(context),
        }
    }

    /// Determines the variant for an entity based on the position of its identity within the
    /// range of allocations within this audience.
    ///
    /// Ranges are built by cumulative sum of `percent` in declaration order, starting from a `-1`
    /// sentinel: an allocation covers `(range_start, range_start + percent]`, so rangekey 0 falls
    /// to the first allocation with a non-zero percent. Rangekey is a closed range over
    /// `{0, ..., 99}`.
    ///
    /// Returns `None` if no allocation covers the rangekey, which cannot happen when percents sum
    /// to 100 and `rangekey < 100`.
    pub fn determine_variant(&self, rangekey: u64) -> Option<&str> {
        let rangekey = i64::try_from(rangekey).ok()?;
        let mut range_start: i64 = -1;
        for allocation in &self.allocations {
            let range_end = range_start + i64::from(allocation.percent);
            if range_start < rangekey && rangekey <= range_end {
                return Some(&allocation.variant);
            }
            range_start = range_end;
        }
        None
    }
}

impl Experiment {
    /// Determines which variant an entity should use by matching it against audience rules.
    ///
    /// An override naming a declared variant wins immediately, bypassing audience matching and
    /// identity computation entirely (the identity cache is untouched). An override naming an
    /// undeclared variant is ignored.
    ///
    /// Audiences are matched in the order in which they are defined; the first match buckets the
    /// entity by its identity. If no audience matches, there is no assignment and `Ok(None)` is
    /// returned.
    pub fn determine_variant<'a>(
        &'a self,
        context: &Context,
        override_variant: Option<&str>,
    ) -> Result<Option<&'a str>, EvaluationError> {
        if let Some(forced) = override_variant {
            if let Some(variant) = self.variants.iter().find(|v| *v == forced) {
                log::trace!(target: "cravensworth",
                    experiment:display = self.name,
                    variant = forced;
                    "assignment forced by override");
                return Ok(Some(variant));
            }
            log::debug!(target: "cravensworth",
                experiment:display = self.name,
                variant = forced;
                "override names an undeclared variant; falling through to audience evaluation");
        }

        for audience in &self.audiences {
            if audience.matches(context)? {
                let identity = context.identity(&self.identity, &self.seed)?;
                let variant = audience.determine_variant(identity);
                log::trace!(target: "cravensworth",
                    experiment:display = self.name,
                    identity = identity,
                    variant = variant.unwrap_or("<none>");
                    "assignment determined");
                return Ok(variant);
            }
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use crate::{Allocation, Audience, Context, ContextValue, EvaluationError, Experiment};

    fn context_with(entries: &[(&str, ContextValue)]) -> Context {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect()
    }

    fn abc_audience() -> Audience {
        Audience::new(
            None,
            vec![
                Allocation::new("A", 10),
                Allocation::new("B", 30),
                Allocation::new("C", 60),
            ],
        )
        .unwrap()
    }

    #[test]
    fn bucketing_is_positional() {
        // Ranges: A (-1, 9], B (9, 39], C (39, 99].
        let audience = abc_audience();
        assert_eq!(audience.determine_variant(0), Some("A"));
        assert_eq!(audience.determine_variant(9), Some("A"));
        assert_eq!(audience.determine_variant(10), Some("B"));
        assert_eq!(audience.determine_variant(37), Some("B"));
        assert_eq!(audience.determine_variant(39), Some("B"));
        assert_eq!(audience.determine_variant(40), Some("C"));
        assert_eq!(audience.determine_variant(99), Some("C"));
        assert_eq!(audience.determine_variant(100), None);
    }

    #[test]
    fn zero_percent_allocations_cover_nothing() {
        let audience = Audience::new(
            None,
            vec![
                Allocation::new("inactive", 0),
                Allocation::new("active", 100),
            ],
        )
        .unwrap();
        assert_eq!(audience.determine_variant(0), Some("active"));
        assert_eq!(audience.determine_variant(99), Some("active"));
    }

    #[test]
    fn override_bypasses_audiences_and_identity() {
        // The context has no identity key at all; only the override can produce a variant.
        let experiment = Experiment::new(
            "checkout_flow",
            "user.id",
            vec!["active".to_owned(), "control".to_owned()],
            vec![abc_audience_with_declared_variants()],
            None,
        );
        let context = Context::default();

        assert_eq!(
            experiment.determine_variant(&context, Some("control")),
            Ok(Some("control")),
        );

        // Without the override, the missing identity propagates.
        assert_eq!(
            experiment.determine_variant(&context, None),
            Err(EvaluationError::MissingIdentity {
                keypath: "user.id".to_owned(),
            }),
        );
    }

    fn abc_audience_with_declared_variants() -> Audience {
        Audience::new(
            None,
            vec![
                Allocation::new("active", 50),
                Allocation::new("control", 50),
            ],
        )
        .unwrap()
    }

    #[test]
    fn undeclared_override_falls_through() {
        let experiment = Experiment::new(
            "checkout_flow",
            "user.id",
            vec!["active".to_owned()],
            vec![Audience::new(None, vec![Allocation::new("active", 100)]).unwrap()],
            None,
        );
        let context = context_with(&[(
            "user",
            ContextValue::Object(HashMap::from([(
                "id".to_owned(),
                ContextValue::from("1234"),
            )])),
        )]);

        assert_eq!(
            experiment.determine_variant(&context, Some("mystery")),
            Ok(Some("active")),
        );
    }

    #[test]
    fn first_matching_audience_wins() {
        let experiment = Experiment::new(
            "greeting",
            "name",
            vec!["formal".to_owned(), "casual".to_owned()],
            vec![
                Audience::new(
                    Some(r#"locale == "en-US""#),
                    vec![Allocation::new("casual", 100)],
                )
                .unwrap(),
                Audience::new(None, vec![Allocation::new("formal", 100)]).unwrap(),
            ],
            None,
        );

        let us = context_with(&[
            ("locale", ContextValue::from("en-US")),
            ("name", ContextValue::from("alice")),
        ]);
        assert_eq!(experiment.determine_variant(&us, None), Ok(Some("casual")));

        let elsewhere = context_with(&[
            ("locale", ContextValue::from("de-DE")),
            ("name", ContextValue::from("alice")),
        ]);
        assert_eq!(
            experiment.determine_variant(&elsewhere, None),
            Ok(Some("formal")),
        );
    }

    #[test]
    fn no_matching_audience_is_no_assignment() {
        let experiment = Experiment::new(
            "gated",
            "name",
            vec!["active".to_owned()],
            vec![Audience::new(
                Some("beta == true"),
                vec![Allocation::new("active", 100)],
            )
            .unwrap()],
            None,
        );
        let context = context_with(&[
            ("beta", ContextValue::from(false)),
            ("name", ContextValue::from("alice")),
        ]);
        assert_eq!(experiment.determine_variant(&context, None), Ok(None));
    }

    #[test]
    fn rule_type_errors_propagate() {
        let experiment = Experiment::new(
            "gated",
            "name",
            vec!["active".to_owned()],
            vec![
                Audience::new(Some("age"), vec![Allocation::new("active", 100)]).unwrap(),
            ],
            None,
        );
        let context = context_with(&[
            ("age", ContextValue::from(34.0)),
            ("name", ContextValue::from("alice")),
        ]);
        assert!(matches!(
            experiment.determine_variant(&context, None),
            Err(EvaluationError::RuleType { .. }),
        ));
    }

    #[test]
    fn assignment_is_deterministic_for_an_identity() {
        // md5("1234checkout_flow") buckets to 20 → (9, 39] → "B".
        let experiment = Experiment::new(
            "checkout_flow",
            "user.id",
            vec!["A".to_owned(), "B".to_owned(), "C".to_owned()],
            vec![abc_audience()],
            None,
        );
        let context = context_with(&[(
            "user",
            ContextValue::Object(HashMap::from([(
                "id".to_owned(),
                ContextValue::from("1234"),
            )])),
        )]);

        for _ in 0..5 {
            assert_eq!(experiment.determine_variant(&context, None), Ok(Some("B")));
        }
    }

    #[test]
    fn concurrent_evaluation_matches_sequential() {
        let experiment = Arc::new(Experiment::new(
            "greeting",
            "name",
            vec!["A".to_owned(), "B".to_owned(), "C".to_owned()],
            vec![abc_audience()],
            None,
        ));

        let names: Vec<String> = (0..32).map(|i| format!("user{i}")).collect();

        let sequential: Vec<Option<String>> = names
            .iter()
            .map(|name| {
                let context = context_with(&[("name", ContextValue::from(name.as_str()))]);
                experiment
                    .determine_variant(&context, None)
                    .unwrap()
                    .map(str::to_owned)
            })
            .collect();

        let handles: Vec<_> = names
            .iter()
            .map(|name| {
                let experiment = Arc::clone(&experiment);
                let name = name.clone();
                std::thread::spawn(move || {
                    let context = context_with(&[("name", ContextValue::from(name.as_str()))]);
                    experiment
                        .determine_variant(&context, None)
                        .unwrap()
                        .map(str::to_owned)
                })
            })
            .collect();
        let concurrent: Vec<Option<String>> = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect();

        assert_eq!(sequential, concurrent);
    }
}
