use crate::cron::CronEvaluator;
use crate::errors::ChimeErrors;
use crate::utils::format_millis;
use serde::{Deserialize, Serialize};
use std::error::Error;
use uuid::Uuid;

/// The identity of a [`Schedule`], unique across the durable store
pub type ScheduleId = Uuid;

/// The recurrence discriminant of a [`Schedule`]: either a single one-shot
/// fire instant or a cron expression describing repeated fire times.
///
/// The discriminant is immutable after creation, changing the recurrence of
/// an existing schedule means deleting and recreating it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recurrence {
    /// Fires exactly once at the given instant (milliseconds since the UNIX epoch)
    Once { run_at: u64 },

    /// Fires repeatedly according to a cron expression, validated against
    /// the cron grammar at set-time
    Cron { expression: String },
}

/// [`Schedule`] is the persisted entity describing when a bound task should
/// run (once or recurring) plus its execution bookkeeping. It is created by
/// [`Scheduler::schedule_once`](crate::scheduler::Scheduler::schedule_once) /
/// [`Scheduler::schedule_cron`](crate::scheduler::Scheduler::schedule_cron),
/// mutated by the engine (counters, flags) and by cancellation, and becomes
/// logically inert once ``done`` or ``cancelled`` is set
///
/// # Construction
/// [`Schedule::once`] builds a one-shot schedule, [`Schedule::cron`] builds a
/// recurring one and validates the expression up front
///
/// # Usage Note(s)
/// The "never fires again" sentinel is expressed as ``Option::None`` from
/// [`Schedule::next_run`], there are no reserved numeric values
///
/// # See Also
/// - [`Recurrence`]
/// - [`Scheduler`](crate::scheduler::Scheduler)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    id: ScheduleId,
    task_ref: String,
    start: u64,
    recurrence: Recurrence,
    cancelled: bool,
    running: bool,
    done: bool,
    execution_counter: u64,
    exception_counter: u64,
    overrun: u64,
    next_fire: Option<u64>,
}

impl Schedule {
    /// Creates / Constructs a one-shot [`Schedule`] firing at ``run_at``
    /// (milliseconds since the UNIX epoch) and binding the task registered
    /// under ``task_ref``
    pub fn once(task_ref: impl Into<String>, run_at: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_ref: task_ref.into(),
            start: run_at,
            recurrence: Recurrence::Once { run_at },
            cancelled: false,
            running: false,
            done: false,
            execution_counter: 0,
            exception_counter: 0,
            overrun: 0,
            next_fire: None,
        }
    }

    /// Creates / Constructs a recurring [`Schedule`] driven by ``expression``
    /// and never firing before the ``start`` instant
    ///
    /// # Returns
    /// Fails with [`ChimeErrors::InvalidCronExpression`] when the expression
    /// doesn't parse against the cron grammar
    pub fn cron(
        task_ref: impl Into<String>,
        expression: impl Into<String>,
        start: u64,
    ) -> Result<Self, ChimeErrors> {
        let expression = expression.into();
        if !CronEvaluator::is_valid(&expression) {
            return Err(ChimeErrors::InvalidCronExpression(
                expression,
                "expression does not parse against the cron grammar".to_owned(),
            ));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            task_ref: task_ref.into(),
            start,
            recurrence: Recurrence::Cron { expression },
            cancelled: false,
            running: false,
            done: false,
            execution_counter: 0,
            exception_counter: 0,
            overrun: 0,
            next_fire: None,
        })
    }

    pub fn id(&self) -> &ScheduleId {
        &self.id
    }

    pub fn task_ref(&self) -> &str {
        &self.task_ref
    }

    /// The instant (millis since the UNIX epoch) before which this schedule
    /// never fires, immutable once set
    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn recurrence(&self) -> &Recurrence {
        &self.recurrence
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn is_one_shot(&self) -> bool {
        matches!(self.recurrence, Recurrence::Once { .. })
    }

    /// Total number of firings, successful or not
    pub fn execution_counter(&self) -> u64 {
        self.execution_counter
    }

    /// Number of firings whose task completed with an error
    pub fn exception_counter(&self) -> u64 {
        self.exception_counter
    }

    /// Number of fire instants that were observed at least one full
    /// recurrence late
    pub fn overrun(&self) -> u64 {
        self.overrun
    }

    /// The persisted next fire instant, maintained transactionally by the
    /// engine so the timing queue can be reconstructed after a restart
    pub fn next_fire(&self) -> Option<u64> {
        self.next_fire
    }

    pub(crate) fn set_next_fire(&mut self, next_fire: Option<u64>) {
        self.next_fire = next_fire;
    }

    pub(crate) fn mark_cancelled(&mut self) {
        self.cancelled = true;
    }

    pub(crate) fn mark_done(&mut self) {
        self.done = true;
    }

    pub(crate) fn record_overrun(&mut self) {
        self.overrun += 1;
        tracing::warn!(id = %self.id, "schedule fired at least one full recurrence late");
    }

    /// Computes the next fire instant strictly after ``from_millis``, or
    /// ``None`` when the schedule never fires again. A cancelled or done
    /// schedule is inert and always yields ``None``; a cron schedule clamps
    /// the evaluation basis to its ``start`` instant
    pub fn next_run(&self, from_millis: u64) -> Option<u64> {
        if self.cancelled || self.done {
            return None;
        }
        match &self.recurrence {
            Recurrence::Once { run_at } => (*run_at > from_millis).then_some(*run_at),
            Recurrence::Cron { expression } => {
                let basis = self.start.max(from_millis);
                match CronEvaluator::first_run_after(expression, basis) {
                    Ok(next) => next,
                    Err(err) => {
                        // the expression was validated at creation, a parse
                        // failure here means the record was tampered with
                        tracing::error!(id = %self.id, %err, "stored cron expression no longer evaluates");
                        None
                    }
                }
            }
        }
    }

    /// Hook invoked by the runner right before the bound task executes
    pub fn task_starting(&mut self) {
        self.running = true;
        tracing::debug!(id = %self.id, task_ref = %self.task_ref, "task starting");
    }

    /// Hook invoked by the runner when the bound task returned normally,
    /// updates the execution counter
    pub fn task_completed_successfully(&mut self) {
        self.running = false;
        self.execution_counter += 1;
        tracing::debug!(
            id = %self.id,
            executions = self.execution_counter,
            "task completed successfully"
        );
    }

    /// Hook invoked by the runner when the bound task failed, updates both
    /// the execution and exception counters
    pub fn task_completed_with_exception(&mut self, err: &(dyn Error + 'static)) {
        self.running = false;
        self.execution_counter += 1;
        self.exception_counter += 1;
        tracing::warn!(
            id = %self.id,
            task_ref = %self.task_ref,
            exceptions = self.exception_counter,
            "task completed with exception: {err}"
        );
    }

    /// Returns a human-readable description of the recurrence, the cron
    /// expression or the one-shot fire timestamp
    pub fn presentation_string(&self) -> String {
        match &self.recurrence {
            Recurrence::Once { run_at } => format!("once at {}", format_millis(*run_at)),
            Recurrence::Cron { expression } => format!("cron `{expression}`"),
        }
    }
}
