//! Ordered steps with compensating actions.
//!
//! Steps run in order against a shared context. When a step at or before the
//! pivot fails, the compensations of every step that already completed run in
//! reverse order and the original error is returned. Past the pivot the work
//! can no longer be undone, so failures there are returned as they are.

use std::fmt::Display;

pub type Action<C, E> = fn(&mut C) -> Result<(), E>;
pub type Compensation<C> = fn(&mut C);

struct SagaStep<C, E> {
    name: &'static str,
    action: Action<C, E>,
    compensation: Option<Compensation<C>>,
}

pub struct Saga<C, E> {
    label: &'static str,
    steps: Vec<SagaStep<C, E>>,
    pivot: Option<usize>,
}

impl<C, E: Display> Saga<C, E> {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            steps: Vec::new(),
            pivot: None,
        }
    }

    /// A step with nothing to undo.
    pub fn step(mut self, name: &'static str, action: Action<C, E>) -> Self {
        self.steps.push(SagaStep {
            name,
            action,
            compensation: None,
        });
        self
    }

    pub fn compensated(
        mut self,
        name: &'static str,
        action: Action<C, E>,
        compensation: Compensation<C>,
    ) -> Self {
        self.steps.push(SagaStep {
            name,
            action,
            compensation: Some(compensation),
        });
        self
    }

    /// The point of no return. Later steps are never compensated.
    pub fn pivot(mut self, name: &'static str, action: Action<C, E>) -> Self {
        self.pivot = Some(self.steps.len());
        self.step(name, action)
    }

    pub fn run(&self, ctx: &mut C) -> Result<(), E> {
        for (index, step) in self.steps.iter().enumerate() {
            tracing::debug!(saga = self.label, step = step.name, "running step");
            let Err(err) = (step.action)(ctx) else {
                continue;
            };
            if self.pivot.is_some_and(|pivot| index > pivot) {
                tracing::warn!(
                    saga = self.label,
                    step = step.name,
                    error = %err,
                    "step failed past the pivot; not compensating",
                );
                return Err(err);
            }
            tracing::warn!(
                saga = self.label,
                step = step.name,
                error = %err,
                "step failed; compensating",
            );
            for done in self.steps[..index].iter().rev() {
                if let Some(compensate) = done.compensation {
                    tracing::debug!(saga = self.label, step = done.name, "compensating");
                    compensate(ctx);
                }
            }
            return Err(err);
        }
        Ok(())
    }
}
