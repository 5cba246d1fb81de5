use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use super::error::{Error, Result};
use super::step::LoadStep;
use super::vu::UserBehavior;

/// A user-authored rate profile.
///
/// `define` appends steps through the [`ScenarioBuilder`]; it is called exactly once, before the
/// run starts.
pub trait Scenario: Send + Sync {
    fn name(&self) -> &str;

    /// Behavior spawned by steps that don't override it.
    fn default_user(&self) -> Arc<dyn UserBehavior>;

    fn define(&self, plan: &mut ScenarioBuilder);
}

/// Collects the steps of a [`Scenario`] in definition order.
pub struct ScenarioBuilder {
    default_user: Arc<dyn UserBehavior>,
    steps: Vec<LoadStep>,
}

impl ScenarioBuilder {
    pub fn new(default_user: Arc<dyn UserBehavior>) -> Self {
        Self {
            default_user,
            steps: Vec::new(),
        }
    }

    /// Linearly ramps from the current rate to `rate` over `duration`.
    pub fn ramp_up(&mut self, rate: u64, duration: Duration) -> &mut LoadStep {
        self.push(rate, duration)
    }

    /// Switches to `rate` immediately.
    pub fn jump_to(&mut self, rate: u64) -> &mut LoadStep {
        self.push(rate, Duration::ZERO)
    }

    /// Keeps the current rate for `duration`.
    pub fn hold_for(&mut self, duration: Duration) -> &mut LoadStep {
        self.push(0, duration)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    fn push(&mut self, rate: u64, duration: Duration) -> &mut LoadStep {
        let idx = self.steps.len();
        self.steps
            .push(LoadStep::new(rate, duration, self.default_user.clone()));
        &mut self.steps[idx]
    }
}

/// Forward-only, single-pass sequence of the steps of one run.
#[derive(Debug)]
pub struct StepSequence {
    steps: std::vec::IntoIter<LoadStep>,
    total_duration: Duration,
}

impl StepSequence {
    /// Sum of all step durations (jumps count as zero).
    pub fn total_duration(&self) -> Duration {
        self.total_duration
    }

    /// Remaining steps, without consuming them.
    pub fn as_slice(&self) -> &[LoadStep] {
        self.steps.as_slice()
    }
}

impl Iterator for StepSequence {
    type Item = LoadStep;

    fn next(&mut self) -> Option<Self::Item> {
        self.steps.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.steps.size_hint()
    }
}

impl ExactSizeIterator for StepSequence {}

/// Runs `define` once and returns the resulting steps.
///
/// A scenario without steps is rejected here, before any run resources are allocated.
pub fn steps(scenario: &dyn Scenario) -> Result<StepSequence> {
    let mut plan = ScenarioBuilder::new(scenario.default_user());
    scenario.define(&mut plan);

    if plan.is_empty() {
        return Err(Error::EmptyScenario(scenario.name().to_string()));
    }

    let total_duration = plan
        .steps
        .iter()
        .fold(Duration::ZERO, |acc, s| acc.saturating_add(s.duration()));

    Ok(StepSequence {
        steps: plan.steps.into_iter(),
        total_duration,
    })
}

/// Explicitly registered user behaviors, looked up by name.
#[derive(Default, Clone)]
pub struct UserRegistry {
    users: BTreeMap<String, Arc<dyn UserBehavior>>,
}

impl UserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, user: Arc<dyn UserBehavior>) -> Result<()> {
        let name = user.name().to_string();
        if self.users.contains_key(&name) {
            return Err(Error::DuplicateUser(name));
        }
        self.users.insert(name, user);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn UserBehavior>> {
        self.users
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownUser(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.users.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::runner::vu::user_fn;

    fn behavior(name: &str) -> Arc<dyn UserBehavior> {
        Arc::new(user_fn(name, |_vu| async { Ok(()) }))
    }

    struct Checkout {
        browser: Arc<dyn UserBehavior>,
        buyer: Arc<dyn UserBehavior>,
    }

    impl Scenario for Checkout {
        fn name(&self) -> &str {
            "checkout"
        }

        fn default_user(&self) -> Arc<dyn UserBehavior> {
            self.browser.clone()
        }

        fn define(&self, plan: &mut ScenarioBuilder) {
            plan.ramp_up(10, Duration::from_secs(5));
            plan.hold_for(Duration::from_secs(30));
            plan.jump_to(50).with_user(self.buyer.clone());
        }
    }

    struct Nothing;

    impl Scenario for Nothing {
        fn name(&self) -> &str {
            "nothing"
        }

        fn default_user(&self) -> Arc<dyn UserBehavior> {
            behavior("idle")
        }

        fn define(&self, _plan: &mut ScenarioBuilder) {}
    }

    #[test]
    fn steps_come_out_in_definition_order() {
        let scenario = Checkout {
            browser: behavior("browser"),
            buyer: behavior("buyer"),
        };
        let seq = steps(&scenario).unwrap();
        assert_eq!(seq.len(), 3);
        assert_eq!(seq.total_duration(), Duration::from_secs(35));

        let all: Vec<LoadStep> = seq.collect();
        assert_eq!((all[0].rate(), all[0].duration()), (10, Duration::from_secs(5)));
        assert_eq!((all[1].rate(), all[1].duration()), (0, Duration::from_secs(30)));
        assert_eq!((all[2].rate(), all[2].duration()), (50, Duration::ZERO));

        assert_eq!(all[0].user().name(), "browser");
        assert_eq!(all[1].user().name(), "browser");
        assert_eq!(all[2].user().name(), "buyer");
    }

    #[test]
    fn sequence_is_single_pass() {
        let scenario = Checkout {
            browser: behavior("browser"),
            buyer: behavior("buyer"),
        };
        let mut seq = steps(&scenario).unwrap();
        assert!(seq.next().is_some());
        assert_eq!(seq.as_slice().len(), 2);
        assert_eq!(seq.by_ref().count(), 2);
        assert!(seq.next().is_none());
    }

    #[test]
    fn empty_scenario_is_rejected() {
        let err = steps(&Nothing).unwrap_err();
        assert!(matches!(err, Error::EmptyScenario(ref name) if name == "nothing"));
    }

    #[test]
    fn registry_resolves_by_name() {
        let mut registry = UserRegistry::new();
        registry.register(behavior("browser")).unwrap();
        registry.register(behavior("buyer")).unwrap();

        assert_eq!(registry.get("buyer").unwrap().name(), "buyer");
        assert!(matches!(
            registry.get("admin"),
            Err(Error::UnknownUser(ref n)) if n == "admin"
        ));
        assert!(matches!(
            registry.register(behavior("browser")),
            Err(Error::DuplicateUser(_))
        ));
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["browser", "buyer"]);
    }
}
