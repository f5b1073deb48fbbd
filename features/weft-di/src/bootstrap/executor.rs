//! Fork-join execution of the independent work items of one bootstrap phase

use std::{
    any::Any,
    future::Future,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    time::{Duration, Instant},
};

use futures::{
    executor::{block_on, ThreadPool},
    future::{join_all, AbortHandle, Abortable},
    task::SpawnExt,
};
use parking_lot::{Condvar, Mutex};
use weft_config::ContainerConfiguration;

use crate::errors::{BootstrapError, Problem, Problems};

/// Runs the items of a phase, on a thread pool if there is one
///
/// Without a pool items run one after the other on the calling thread. Both produce the
/// same results in the same order, only the problems of failing items are collected
/// rather than returned on the first failure.
pub struct Executor {
    pool: Option<ThreadPool>,
    tasks: Arc<RunningTasks>,
    grace_period: Duration,
}

#[derive(Default)]
struct RunningTasks {
    count: Mutex<usize>,
    idle: Condvar,
    /// Background tasks, phase tasks are always joined before their phase ends
    handles: Mutex<Vec<AbortHandle>>,
}

/// Decrements the running count however the task ends
struct TaskGuard(Arc<RunningTasks>);
impl Drop for TaskGuard {
    fn drop(&mut self) {
        let mut count = self.0.count.lock();
        *count -= 1;
        if *count == 0 {
            self.0.idle.notify_all();
        }
    }
}

impl Executor {
    /// A pool sized by the configuration, or sequential execution if concurrent
    /// deployment is disabled
    pub fn new(configuration: &ContainerConfiguration) -> Result<Self, BootstrapError> {
        if !configuration.uses_executor() {
            return Ok(Self::sequential());
        }
        let threads = configuration.executor_threads.max(1);
        let pool = ThreadPool::builder()
            .pool_size(threads)
            .name_prefix("weft-bootstrap-")
            .create()
            .map_err(|e| BootstrapError::Executor(e.to_string()))?;
        tracing::debug!("Bootstrap executor with {threads} threads");
        Ok(Self {
            pool: Some(pool),
            tasks: Arc::default(),
            grace_period: configuration.shutdown_grace_period,
        })
    }

    pub fn sequential() -> Self {
        Self {
            pool: None,
            tasks: Arc::default(),
            grace_period: Duration::ZERO,
        }
    }

    pub fn is_parallel(&self) -> bool {
        self.pool.is_some()
    }

    /// Runs `task` on the pool without waiting for it, [Executor::shutdown] waits for it
    /// up to the grace period
    ///
    /// Returns `None` without a pool, nothing runs then. Aborting the returned handle
    /// drops the task at its next suspension point.
    pub fn spawn_background<F>(&self, task: F) -> Option<AbortHandle>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let pool = self.pool.as_ref()?;
        let (abort, registration) = AbortHandle::new_pair();
        *self.tasks.count.lock() += 1;
        let guard = TaskGuard(self.tasks.clone());
        let task = Abortable::new(task, registration);
        pool.spawn_ok(async move {
            let _guard = guard;
            let _ = task.await;
        });
        let mut handles = self.tasks.handles.lock();
        handles.retain(|handle| !handle.is_aborted());
        handles.push(abort.clone());
        Some(abort)
    }

    /// Runs `task` for every item and waits for all of them
    ///
    /// Results keep the order of the items. A failing or panicking item does not stop
    /// the others, the problems of every failed item are returned together.
    pub fn invoke_all<I, R, F>(&self, items: Vec<I>, task: F) -> Result<Vec<R>, Problems>
    where
        I: Send + 'static,
        R: Send + 'static,
        F: Fn(I) -> Result<R, Problems> + Send + Sync + 'static,
    {
        let results = match &self.pool {
            None => items
                .into_iter()
                .map(|item| run_caught(&task, item))
                .collect::<Vec<_>>(),
            Some(pool) => self.run_on(pool, items, Arc::new(task)),
        };

        let mut problems = Problems::new();
        let mut produced = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(value) => produced.push(value),
                Err(p) => problems.extend(p),
            }
        }
        if problems.is_empty() {
            Ok(produced)
        } else {
            problems.normalize();
            Err(problems)
        }
    }

    fn run_on<I, R, F>(
        &self,
        pool: &ThreadPool,
        items: Vec<I>,
        task: Arc<F>,
    ) -> Vec<Result<R, Problems>>
    where
        I: Send + 'static,
        R: Send + 'static,
        F: Fn(I) -> Result<R, Problems> + Send + Sync + 'static,
    {
        let mut handles = Vec::with_capacity(items.len());
        for item in items {
            let task = task.clone();
            *self.tasks.count.lock() += 1;
            let guard = TaskGuard(self.tasks.clone());
            let future = async move {
                let _guard = guard;
                run_caught(&*task, item)
            };
            match pool.spawn_with_handle(future) {
                Ok(handle) => handles.push(handle),
                // The future and its guard were dropped, nothing is running
                Err(e) => {
                    return vec![Err(Problem::Other(format!(
                        "Spawning a bootstrap task failed: {e}"
                    ))
                    .into())]
                }
            }
        }

        block_on(join_all(handles))
    }

    /// Waits up to the grace period for running tasks, then aborts the background ones
    ///
    /// A background task blocking inside a poll cannot be aborted, it finishes on its own.
    pub fn shutdown(&self) {
        if self.pool.is_none() {
            return;
        }
        let deadline = Instant::now() + self.grace_period;
        let mut count = self.tasks.count.lock();
        while *count > 0 {
            if self.tasks.idle.wait_until(&mut count, deadline).timed_out() {
                tracing::warn!(
                    "{} bootstrap tasks still running after {:?}, aborting them",
                    *count,
                    self.grace_period
                );
                for handle in self.tasks.handles.lock().drain(..) {
                    handle.abort();
                }
                break;
            }
        }
    }
}

fn run_caught<I, R>(
    task: &(dyn Fn(I) -> Result<R, Problems> + Send + Sync),
    item: I,
) -> Result<R, Problems> {
    match panic::catch_unwind(AssertUnwindSafe(|| task(item))) {
        Ok(result) => result,
        Err(panic) => {
            let message = panic_message(&*panic);
            tracing::error!("Bootstrap task panicked: {message}");
            Err(Problem::Other(format!("Bootstrap task panicked: {message}")).into())
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use futures::future;

    use super::*;
    use crate::errors::DefinitionError;

    fn parallel() -> Executor {
        let configuration = ContainerConfiguration::default().with_executor_threads(2);
        Executor::new(&configuration).unwrap()
    }

    fn square_odd(i: u32) -> Result<u32, Problems> {
        if i % 2 == 0 {
            return Err(DefinitionError::NoSuitableConstructor {
                class: format!("C{i}"),
            }
            .into());
        }
        Ok(i * i)
    }

    #[test]
    fn parallel_and_sequential_results_are_equal() {
        let items = (0..20).collect::<Vec<u32>>();
        let sequential = Executor::sequential().invoke_all(items.clone(), square_odd);
        let parallel = parallel().invoke_all(items, square_odd);

        assert_eq!(sequential, parallel);
        assert_eq!(sequential.unwrap_err().errors.len(), 10);
    }

    #[test]
    fn results_keep_item_order() {
        let results = parallel()
            .invoke_all(vec![1u32, 3, 5, 7], square_odd)
            .unwrap();
        assert_eq!(results, vec![1, 9, 25, 49]);
    }

    #[test]
    fn panics_become_problems() {
        let result = parallel().invoke_all(vec![1u32, 2], |i| {
            if i == 2 {
                panic!("boom");
            }
            Ok(i)
        });

        let problems = result.unwrap_err();
        assert_eq!(
            problems.errors,
            vec![Problem::Other("Bootstrap task panicked: boom".to_string())]
        );
    }

    #[test]
    fn shutdown_returns_once_idle() {
        let executor = parallel();
        executor.invoke_all(vec![1u32], square_odd).unwrap();
        executor.shutdown();
        assert_eq!(*executor.tasks.count.lock(), 0);
    }

    #[test]
    fn shutdown_waits_for_background_tasks() {
        let executor = parallel();
        let done = Arc::new(AtomicBool::new(false));
        let finished = done.clone();
        executor
            .spawn_background(async move {
                std::thread::sleep(Duration::from_millis(30));
                finished.store(true, Ordering::SeqCst);
            })
            .unwrap();

        executor.shutdown();
        assert!(done.load(Ordering::SeqCst));
        assert_eq!(*executor.tasks.count.lock(), 0);
    }

    #[test]
    fn background_tasks_are_aborted_after_the_grace_period() {
        let configuration = ContainerConfiguration::default()
            .with_executor_threads(1)
            .with_shutdown_grace_period(Duration::from_millis(10));
        let executor = Executor::new(&configuration).unwrap();
        let handle = executor.spawn_background(future::pending::<()>()).unwrap();

        executor.shutdown();
        assert!(handle.is_aborted());
    }

    #[test]
    fn nothing_runs_in_the_background_without_a_pool() {
        assert!(Executor::sequential().spawn_background(async {}).is_none());
    }
}
