//! Ordered, non-atomic step sequences.
//!
//! Each provisioning operation declares its remote steps up front as a list
//! of [`StepSpec`]s. A [`WorkflowRun`] executes them in that order and keeps
//! a record of what happened to each one. Nothing is ever rolled back: when a
//! required step fails, the steps that already completed stay in place and
//! are reported as uncompensated.

use std::future::Future;

use crate::ServiceResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPolicy {
    /// Failure aborts the run.
    Required,
    /// Failure is logged and the run continues.
    BestEffort,
}

/// Whether an undo action exists for a step. It is never executed automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compensation {
    None,
    Available,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepSpec {
    pub name: &'static str,
    pub policy: StepPolicy,
    pub compensation: Compensation,
}

impl StepSpec {
    pub const fn required(name: &'static str, compensation: Compensation) -> Self {
        Self {
            name,
            policy: StepPolicy::Required,
            compensation,
        }
    }

    pub const fn best_effort(name: &'static str, compensation: Compensation) -> Self {
        Self {
            name,
            policy: StepPolicy::BestEffort,
            compensation,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Completed,
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRecord {
    pub name: &'static str,
    pub outcome: StepOutcome,
}

/// Execution record of one operation.
#[derive(Debug, Clone)]
pub struct WorkflowRun {
    operation: &'static str,
    plan: &'static [StepSpec],
    records: Vec<StepRecord>,
    aborted: bool,
}

impl WorkflowRun {
    pub fn new(operation: &'static str, plan: &'static [StepSpec]) -> Self {
        Self {
            operation,
            plan,
            records: Vec::with_capacity(plan.len()),
            aborted: false,
        }
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    pub fn plan(&self) -> &'static [StepSpec] {
        self.plan
    }

    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    pub fn outcome_of(&self, name: &str) -> Option<&StepOutcome> {
        self.records.iter().find(|r| r.name == name).map(|r| &r.outcome)
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// Names of the steps that completed, in execution order.
    pub fn completed(&self) -> Vec<&'static str> {
        self.records
            .iter()
            .filter(|r| r.outcome == StepOutcome::Completed)
            .map(|r| r.name)
            .collect()
    }

    /// Completed steps left in place by an aborted run.
    pub fn uncompensated(&self) -> Vec<&'static str> {
        if self.aborted {
            self.completed()
        } else {
            Vec::new()
        }
    }

    /// Run a step whose failure aborts the workflow.
    pub async fn required<T, F>(&mut self, step: &StepSpec, action: F) -> ServiceResult<T>
    where
        F: Future<Output = ServiceResult<T>>,
    {
        debug_assert_eq!(step.policy, StepPolicy::Required, "{} is not a required step", step.name);
        self.check_order(step);
        tracing::info!("[{}] {}", self.operation, step.name);

        match action.await {
            Ok(value) => {
                self.record(step, StepOutcome::Completed);
                Ok(value)
            }
            Err(err) => {
                tracing::error!("❌ [{}] {} failed: {}", self.operation, step.name, err);
                self.record(step, StepOutcome::Failed(err.to_string()));
                self.abort(step);
                Err(err)
            }
        }
    }

    /// Run a step whose failure is logged and otherwise ignored.
    pub async fn best_effort<T, F>(&mut self, step: &StepSpec, action: F) -> Option<T>
    where
        F: Future<Output = ServiceResult<T>>,
    {
        debug_assert_eq!(step.policy, StepPolicy::BestEffort, "{} is not a best-effort step", step.name);
        self.check_order(step);
        tracing::info!("[{}] {}", self.operation, step.name);

        match action.await {
            Ok(value) => {
                self.record(step, StepOutcome::Completed);
                Some(value)
            }
            Err(err) => {
                tracing::warn!("[{}] {} failed, continuing: {}", self.operation, step.name, err);
                self.record(step, StepOutcome::Failed(err.to_string()));
                None
            }
        }
    }

    fn check_order(&self, step: &StepSpec) {
        let expected = self.plan.get(self.records.len()).map(|s| s.name);
        if expected != Some(step.name) {
            tracing::warn!(
                "[{}] step {} executed out of declared order (expected {:?})",
                self.operation,
                step.name,
                expected
            );
        }
    }

    fn record(&mut self, step: &StepSpec, outcome: StepOutcome) {
        self.records.push(StepRecord {
            name: step.name,
            outcome,
        });
    }

    fn abort(&mut self, failed: &StepSpec) {
        self.aborted = true;

        for done in self.completed() {
            let compensation = self
                .plan
                .iter()
                .find(|s| s.name == done)
                .map(|s| s.compensation)
                .unwrap_or(Compensation::None);
            match compensation {
                Compensation::Available => tracing::warn!(
                    "[{}] {} stays applied; undo is possible but not performed",
                    self.operation,
                    done
                ),
                Compensation::None => tracing::warn!("[{}] {} stays applied", self.operation, done),
            }
        }

        let executed = self.records.len();
        let reason = format!("interrompido após falha em {}", failed.name);
        for pending in self.plan.iter().skip(executed) {
            self.records.push(StepRecord {
                name: pending.name,
                outcome: StepOutcome::Skipped(reason.clone()),
            });
        }
    }
}
