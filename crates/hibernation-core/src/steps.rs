//! Step execution with an explicit failure policy
//!
//! Enabling hibernation stops at the first failed step, disabling it keeps
//! going and reports every failure. Both are the same runner with a different
//! [`StepPolicy`].

use crate::batch::PrivilegedBatch;
use crate::error::{FailureKind, Result};
use crate::host::CommandOutput;
use crate::types::{ActionResult, StepOutcome, StepStatus};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPolicy {
    /// Run until the first failure, skip everything after it
    AbortOnFirstFailure,
    /// Run every step, collect failures
    BestEffort,
}

struct Failure {
    step: String,
    kind: FailureKind,
    message: String,
    exit_code: Option<i32>,
}

/// Runs named steps and records their outcomes
pub struct StepRunner {
    policy: StepPolicy,
    outcomes: Vec<StepOutcome>,
    failures: Vec<Failure>,
}

impl StepRunner {
    pub fn new(policy: StepPolicy) -> Self {
        Self {
            policy,
            outcomes: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// True once a failure has stopped an abort-on-first-failure run
    pub fn is_aborted(&self) -> bool {
        self.policy == StepPolicy::AbortOnFirstFailure && !self.failures.is_empty()
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Run one step.
    ///
    /// Returns the step's value, or None when it failed or was skipped
    /// because an earlier step aborted the run.
    pub fn step<T>(&mut self, name: &str, action: impl FnOnce() -> Result<T>) -> Option<T> {
        if self.is_aborted() {
            self.outcomes.push(StepOutcome {
                name: name.to_string(),
                status: StepStatus::Skipped {
                    reason: "an earlier step failed".to_string(),
                },
            });
            return None;
        }

        match action() {
            Ok(value) => {
                info!("Step succeeded: {}", name);
                self.outcomes.push(StepOutcome {
                    name: name.to_string(),
                    status: StepStatus::Succeeded,
                });
                Some(value)
            }
            Err(e) => {
                warn!("Step failed: {}: {}", name, e);
                self.outcomes.push(StepOutcome {
                    name: name.to_string(),
                    status: StepStatus::Failed {
                        kind: e.kind(),
                        message: e.to_string(),
                    },
                });
                self.failures.push(Failure {
                    step: name.to_string(),
                    kind: e.kind(),
                    message: e.to_string(),
                    exit_code: e.exit_code(),
                });
                None
            }
        }
    }

    /// Record every step of a privileged batch, in order.
    ///
    /// `outcome` is what the host returned for the batch. When the batch as a
    /// whole failed (authentication refused, broker missing) that failure is
    /// recorded once and every step is skipped. Returns one entry per batch
    /// step holding its output when it succeeded.
    pub fn replay(
        &mut self,
        batch: &PrivilegedBatch,
        outcome: Result<Vec<CommandOutput>>,
    ) -> Vec<Option<CommandOutput>> {
        let outputs = match outcome {
            Ok(outputs) => outputs,
            Err(e) => {
                self.step::<()>("authorize privileged changes", || Err(e));
                for step in &batch.steps {
                    self.skip(&step.name, "privileged commands did not run");
                }
                return vec![None; batch.steps.len()];
            }
        };

        batch
            .steps
            .iter()
            .enumerate()
            .map(|(index, step)| self.step(&step.name, || step.result(outputs.get(index))))
            .collect()
    }

    /// Record a step that was deliberately not run
    pub fn skip(&mut self, name: &str, reason: impl Into<String>) {
        self.outcomes.push(StepOutcome {
            name: name.to_string(),
            status: StepStatus::Skipped {
                reason: reason.into(),
            },
        });
    }

    /// Build the action result.
    ///
    /// An aborted run names the failed step and states that earlier steps
    /// stay applied; a best-effort run lists every failed step.
    pub fn finish(self, success_message: impl Into<String>) -> ActionResult {
        let Self {
            policy,
            outcomes,
            failures,
        } = self;

        let Some(first) = failures.first() else {
            return ActionResult::succeeded(success_message).with_steps(outcomes);
        };

        let message = match policy {
            StepPolicy::AbortOnFirstFailure => {
                let applied = outcomes
                    .iter()
                    .filter(|o| o.status == StepStatus::Succeeded)
                    .count();
                let mut message = format!("Step '{}' failed: {}", first.step, first.message);
                if applied > 0 {
                    message.push_str(&format!(
                        "\n{} earlier step(s) remain applied; they were not rolled back.",
                        applied
                    ));
                }
                message
            }
            StepPolicy::BestEffort => {
                let attempted = outcomes
                    .iter()
                    .filter(|o| !matches!(o.status, StepStatus::Skipped { .. }))
                    .count();
                let mut message = format!("{} of {} steps failed:", failures.len(), attempted);
                for failure in &failures {
                    message.push_str(&format!("\n- {}: {}", failure.step, failure.message));
                }
                message
            }
        };

        ActionResult {
            success: false,
            message,
            exit_code: first.exit_code,
            failure: Some(first.kind),
            steps: outcomes,
        }
    }
}
