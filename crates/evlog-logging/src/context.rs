//! Job context for log entries
//!
//! Thread-local storage for the job being processed, so spans created in a
//! scope can be tagged with the job, machine and run that produced them.

use std::cell::RefCell;

use uuid::Uuid;

/// Job context data stored in thread-local storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobContextData {
    /// Job name
    pub job: String,
    /// Machine the job runs for
    pub machine: String,
    /// Unique id of this run
    pub run_id: Uuid,
}

thread_local! {
    static JOB_CONTEXT: RefCell<Option<JobContextData>> = const { RefCell::new(None) };
}

/// RAII guard for job context
///
/// Sets the job context for the current thread and restores the previous
/// one when dropped.
///
/// ```ignore
/// let _guard = JobContextGuard::new("security", "host1");
/// tracing::info!("Importing");
/// ```
pub struct JobContextGuard {
    previous: Option<JobContextData>,
}

impl JobContextGuard {
    /// Enter a job context with a fresh run id
    pub fn new(job: impl Into<String>, machine: impl Into<String>) -> Self {
        Self::with_run_id(job, machine, Uuid::new_v4())
    }

    /// Enter a job context with a given run id
    pub fn with_run_id(job: impl Into<String>, machine: impl Into<String>, run_id: Uuid) -> Self {
        let data = JobContextData {
            job: job.into(),
            machine: machine.into(),
            run_id,
        };
        let previous = JOB_CONTEXT.with(|ctx| ctx.borrow_mut().replace(data));
        Self { previous }
    }

    /// The current job context, if any
    pub fn current() -> Option<JobContextData> {
        JOB_CONTEXT.with(|ctx| ctx.borrow().clone())
    }

    pub fn current_job() -> Option<String> {
        Self::current().map(|ctx| ctx.job)
    }

    pub fn current_run_id() -> Option<Uuid> {
        Self::current().map(|ctx| ctx.run_id)
    }
}

impl Drop for JobContextGuard {
    fn drop(&mut self) {
        JOB_CONTEXT.with(|ctx| *ctx.borrow_mut() = self.previous.take());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_context_guard() {
        assert!(JobContextGuard::current().is_none());
        {
            let _guard = JobContextGuard::new("security", "host1");
            let ctx = JobContextGuard::current().unwrap();
            assert_eq!(ctx.job, "security");
            assert_eq!(ctx.machine, "host1");
        }
        assert!(JobContextGuard::current().is_none());
    }

    #[test]
    fn test_nested_contexts() {
        let _outer = JobContextGuard::new("security", "host1");
        let outer_run = JobContextGuard::current_run_id();
        {
            let _inner = JobContextGuard::new("system", "host1");
            assert_eq!(JobContextGuard::current_job().as_deref(), Some("system"));
            assert_ne!(JobContextGuard::current_run_id(), outer_run);
        }
        assert_eq!(JobContextGuard::current_job().as_deref(), Some("security"));
        assert_eq!(JobContextGuard::current_run_id(), outer_run);
    }

    #[test]
    fn test_with_run_id() {
        let run_id = Uuid::new_v4();
        let _guard = JobContextGuard::with_run_id("app", "h", run_id);
        assert_eq!(JobContextGuard::current_run_id(), Some(run_id));
    }
}
