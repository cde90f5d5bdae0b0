// Seam deciding how simulated tasks settle - separates the scaffold's
// always-success behaviour from the transition rules so failures can be injected.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, VecDeque};

use super::types::{TaskKind, TaskOutcome};

/// Source of outcomes for fallible timed tasks
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait TaskOutcomeSource: Send {
    /// Decide how `kind` settles. `subjects` names the items involved,
    /// e.g. the pre-flight checks being run.
    fn resolve(&mut self, kind: TaskKind, subjects: &[String]) -> TaskOutcome;
}

/// Every task succeeds, matching the simulated scaffold
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysSucceed;

impl TaskOutcomeSource for AlwaysSucceed {
    fn resolve(&mut self, _kind: TaskKind, _subjects: &[String]) -> TaskOutcome {
        TaskOutcome::Success
    }
}

/// Pre-programmed outcomes per task kind; falls back to success once a script runs dry
#[derive(Debug, Default)]
pub struct ScriptedOutcomes {
    scripts: HashMap<TaskKind, VecDeque<TaskOutcome>>,
}

impl ScriptedOutcomes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, kind: TaskKind, outcome: TaskOutcome) -> Self {
        self.scripts.entry(kind).or_default().push_back(outcome);
        self
    }

    pub fn remaining(&self, kind: TaskKind) -> usize {
        self.scripts.get(&kind).map_or(0, VecDeque::len)
    }
}

impl TaskOutcomeSource for ScriptedOutcomes {
    fn resolve(&mut self, kind: TaskKind, _subjects: &[String]) -> TaskOutcome {
        self.scripts
            .get_mut(&kind)
            .and_then(VecDeque::pop_front)
            .unwrap_or(TaskOutcome::Success)
    }
}

/// Fails fallible tasks with a fixed probability
#[derive(Debug)]
pub struct RandomOutcomes {
    rng: StdRng,
    failure_rate: f64,
}

impl RandomOutcomes {
    pub fn new(failure_rate: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        // NaN or infinite rates disable failure injection
        let failure_rate = if failure_rate.is_finite() {
            failure_rate.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self { rng, failure_rate }
    }
}

impl TaskOutcomeSource for RandomOutcomes {
    fn resolve(&mut self, kind: TaskKind, subjects: &[String]) -> TaskOutcome {
        if !kind.is_fallible() || !self.rng.random_bool(self.failure_rate) {
            return TaskOutcome::Success;
        }
        match kind {
            TaskKind::Connection => TaskOutcome::failure("no heartbeat from aircraft"),
            TaskKind::PreflightChecks if !subjects.is_empty() => {
                let index = self.rng.random_range(0..subjects.len());
                TaskOutcome::check_failed(subjects[index].clone(), "reading out of tolerance")
            }
            TaskKind::PreflightChecks => TaskOutcome::failure("no checks reported"),
            _ => TaskOutcome::failure("transfer interrupted"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_outcomes_run_dry_to_success() {
        let mut source = ScriptedOutcomes::new()
            .then(TaskKind::Connection, TaskOutcome::failure("timeout"));

        assert_eq!(
            source.resolve(TaskKind::Connection, &[]),
            TaskOutcome::failure("timeout")
        );
        assert_eq!(source.remaining(TaskKind::Connection), 0);
        assert!(source.resolve(TaskKind::Connection, &[]).is_success());
        assert!(source.resolve(TaskKind::MissionUpload, &[]).is_success());
    }

    #[test]
    fn test_random_outcomes_bounds() {
        let checks = vec!["Motor Checks".to_string(), "Battery Check".to_string()];

        let mut never = RandomOutcomes::new(0.0, Some(7));
        assert!((0..50).all(|_| never.resolve(TaskKind::PreflightChecks, &checks).is_success()));

        let mut always = RandomOutcomes::new(1.0, Some(7));
        match always.resolve(TaskKind::PreflightChecks, &checks) {
            TaskOutcome::Failure { subject: Some(name), .. } => assert!(checks.contains(&name)),
            other => panic!("expected a check failure, got {other:?}"),
        }
        // Timers that only pace the workflow never fail
        assert!(always.resolve(TaskKind::CountdownTick, &[]).is_success());
    }

    #[test]
    fn test_non_finite_rate_never_fails() {
        for rate in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let mut source = RandomOutcomes::new(rate, Some(1));
            assert!(source.resolve(TaskKind::Connection, &[]).is_success());
            assert!(source.resolve(TaskKind::MissionUpload, &[]).is_success());
        }
        assert!(RandomOutcomes::new(-3.0, Some(1))
            .resolve(TaskKind::Connection, &[])
            .is_success());
    }

    #[test]
    fn test_seeded_outcomes_are_reproducible() {
        let mut a = RandomOutcomes::new(0.5, Some(42));
        let mut b = RandomOutcomes::new(0.5, Some(42));
        for _ in 0..20 {
            assert_eq!(
                a.resolve(TaskKind::MissionUpload, &[]),
                b.resolve(TaskKind::MissionUpload, &[])
            );
        }
    }
}
