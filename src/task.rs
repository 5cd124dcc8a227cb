use crate::errors::TaskError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

/// [`Task`] is the unit of work the scheduler executes per firing. The
/// scheduler treats it as an opaque callable, it owns no scheduling state of
/// its own, all bookkeeping lives on the [`Schedule`](crate::schedule::Schedule)
/// entity that binds it
///
/// # Required Method(s)
/// When implementing the [`Task`], one has to supply an implementation for
/// the method [`Task::run`] which is where the application logic lives. Any
/// error it returns is recorded on the schedule's exception counter and
/// never propagated to the timing loop
///
/// # Object Safety
/// [`Task`] is object safe, the [`TaskRegistry`] stores trait objects
///
/// # See Also
/// - [`TaskRegistry`]
/// - [`Schedule`](crate::schedule::Schedule)
#[async_trait]
pub trait Task: Send + Sync + 'static {
    async fn run(&self) -> Result<(), TaskError>;
}

/// [`TaskRegistry`] is a factory registry resolving the opaque task
/// references stored on [`Schedule`](crate::schedule::Schedule) entities to
/// concrete [`Task`] implementations. Registration is plain constructor
/// injection, a schedule only ever persists the string reference
///
/// # Constructor(s)
/// Construct an empty registry via [`TaskRegistry::new`] (or [`Default`])
/// and populate it with [`TaskRegistry::register`] before scheduling
///
/// # See Also
/// - [`Task`]
/// - [`Scheduler`](crate::scheduler::Scheduler)
#[derive(Default)]
pub struct TaskRegistry {
    tasks: DashMap<String, Arc<dyn Task>>,
}

impl TaskRegistry {
    /// Creates / Constructs a new empty [`TaskRegistry`] instance
    pub fn new() -> Self {
        Self {
            tasks: DashMap::new(),
        }
    }

    /// Registers ``task`` under ``task_ref``, replacing any previous binding
    /// with the same reference
    pub fn register(&self, task_ref: impl Into<String>, task: Arc<dyn Task>) {
        self.tasks.insert(task_ref.into(), task);
    }

    /// Resolves a task reference to its bound [`Task`], returns ``None``
    /// when nothing is registered under ``task_ref``
    pub fn resolve(&self, task_ref: &str) -> Option<Arc<dyn Task>> {
        self.tasks.get(task_ref).map(|entry| entry.value().clone())
    }

    /// Checks if a [`Task`] is registered under ``task_ref``
    pub fn contains(&self, task_ref: &str) -> bool {
        self.tasks.contains_key(task_ref)
    }
}
