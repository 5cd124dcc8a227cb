use crate::errors::ChimeErrors;
use crate::schedule::ScheduleId;
use crate::store::{DurableStore, ScheduleStore, StoreTransaction};
use crate::task::TaskRegistry;
use std::error::Error;
use std::sync::Arc;

/// [`TaskRunner`] is the unit of work executed per firing, on a pool worker,
/// inside its own usecase-tagged transaction: load the schedule, resolve its
/// bound task, invoke it between the schedule's lifecycle hooks and commit
/// the bookkeeping regardless of how the task itself fared
///
/// # Usage Note(s)
/// A schedule that vanished or was cancelled between dispatch and execution
/// is a designed race, the runner no-ops silently. A task failure is
/// recorded on the counters and never propagated further; the only error the
/// runner surfaces is a failure to commit its own bookkeeping, which the
/// worker logs as fatal for this firing
///
/// # See Also
/// - [`Schedule`](crate::schedule::Schedule)
/// - [`WorkerPool`](crate::dispatch::WorkerPool)
pub struct TaskRunner<S: DurableStore> {
    id: ScheduleId,
    store: Arc<S>,
    registry: Arc<TaskRegistry>,
}

impl<S: DurableStore> TaskRunner<S> {
    pub fn new(id: ScheduleId, store: Arc<S>, registry: Arc<TaskRegistry>) -> Self {
        Self { id, store, registry }
    }

    /// Executes one firing of the schedule this runner was built for
    pub async fn execute(self) -> Result<(), ChimeErrors> {
        let mut tx = self.store.begin("run schedule task").await;
        let Some(mut schedule) = ScheduleStore::try_get(&mut tx, &self.id).await? else {
            // removed since dispatch, expected race with concurrent removal
            tx.rollback().await;
            return Ok(());
        };
        if schedule.is_cancelled() {
            tx.rollback().await;
            return Ok(());
        }

        match self.registry.resolve(schedule.task_ref()) {
            None => {
                // the binding disappeared after creation-time validation,
                // recorded like any other failed firing
                let err = ChimeErrors::TaskUnresolvable(schedule.task_ref().to_owned());
                schedule.task_starting();
                schedule.task_completed_with_exception(&err);
            }
            Some(task) => {
                schedule.task_starting();
                match task.run().await {
                    Ok(()) => schedule.task_completed_successfully(),
                    Err(err) => schedule.task_completed_with_exception(root_cause(err.as_ref())),
                }
            }
        }

        ScheduleStore::save(&mut tx, &schedule)?;
        tx.commit().await
    }
}

/// Unwraps nested wrapper errors down to the real cause by walking the
/// ``source()`` chain
fn root_cause<'a>(err: &'a (dyn Error + 'static)) -> &'a (dyn Error + 'static) {
    let mut cause = err;
    while let Some(source) = cause.source() {
        cause = source;
    }
    cause
}
