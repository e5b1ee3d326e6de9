//! Order-preserving, fail-fast execution of independent work units.
//!
//! Units run on a fixed-size rayon pool. The first failure raises an abort
//! flag so units that have not started yet are skipped; the failure with the
//! lowest input index is reported. Units must not log or perform I/O.

use crate::error::{Result, SolverError};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExecutorConfig {
    /// Worker count; `None` sizes the pool to the available parallelism.
    pub threads: Option<usize>,
    /// Run every batch on the calling thread.
    pub sequential: bool,
}

/// Cooperative cancellation flag checked before each unit starts.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

enum Outcome<T> {
    Done(T),
    Failed(SolverError),
    Skipped,
}

#[derive(Debug)]
pub struct Executor {
    pool: Option<ThreadPool>,
}

impl Executor {
    /// Builds a pool per `config`, falling back to sequential execution when
    /// the pool cannot be created.
    pub fn new(config: &ExecutorConfig) -> Self {
        if config.sequential {
            return Self::sequential();
        }
        let threads = config.threads.filter(|&n| n > 0).unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        });
        match ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("fade-worker-{i}"))
            .build()
        {
            Ok(pool) => {
                log::debug!("executor pool started with {} workers", threads);
                Self { pool: Some(pool) }
            }
            Err(err) => {
                log::warn!("thread pool unavailable ({}); running tasks sequentially", err);
                Self::sequential()
            }
        }
    }

    pub fn sequential() -> Self {
        Self { pool: None }
    }

    /// The process-level executor, created on first use.
    pub fn shared() -> Arc<Executor> {
        static SHARED: OnceLock<Arc<Executor>> = OnceLock::new();
        Arc::clone(SHARED.get_or_init(|| Arc::new(Executor::new(&ExecutorConfig::default()))))
    }

    pub fn is_parallel(&self) -> bool {
        self.pool.is_some()
    }

    pub fn threads(&self) -> usize {
        self.pool
            .as_ref()
            .map(|pool| pool.current_num_threads())
            .unwrap_or(1)
    }

    pub fn execute_tasks<T, F>(&self, tasks: Vec<F>) -> Result<Vec<T>>
    where
        T: Send,
        F: FnOnce() -> Result<T> + Send,
    {
        self.execute_tasks_with_cancellation(tasks, None)
    }

    /// Runs `tasks` and returns their results in input order.
    pub fn execute_tasks_with_cancellation<T, F>(
        &self,
        tasks: Vec<F>,
        cancel: Option<&CancellationToken>,
    ) -> Result<Vec<T>>
    where
        T: Send,
        F: FnOnce() -> Result<T> + Send,
    {
        let abort = AtomicBool::new(false);
        let run = |task: F| -> Outcome<T> {
            if abort.load(Ordering::Relaxed) || cancel.is_some_and(|c| c.is_cancelled()) {
                return Outcome::Skipped;
            }
            let outcome = match panic::catch_unwind(AssertUnwindSafe(task)) {
                Ok(Ok(value)) => return Outcome::Done(value),
                Ok(Err(err)) => Outcome::Failed(err),
                Err(payload) => Outcome::Failed(SolverError::Panicked {
                    message: panic_message(payload.as_ref()),
                }),
            };
            abort.store(true, Ordering::Relaxed);
            outcome
        };

        let outcomes: Vec<Outcome<T>> = match &self.pool {
            Some(pool) => pool.install(|| tasks.into_par_iter().map(run).collect()),
            None => tasks.into_iter().map(run).collect(),
        };

        let mut results = Vec::with_capacity(outcomes.len());
        let mut skipped = false;
        for (index, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Outcome::Done(value) => results.push(value),
                Outcome::Failed(source) => {
                    return Err(SolverError::ExecutorAggregate {
                        index,
                        source: Box::new(source),
                    })
                }
                Outcome::Skipped => skipped = true,
            }
        }
        if skipped {
            return Err(SolverError::Cancelled);
        }
        Ok(results)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn pool(threads: usize) -> Executor {
        Executor::new(&ExecutorConfig {
            threads: Some(threads),
            sequential: false,
        })
    }

    #[test]
    fn preserves_input_order_under_uneven_latency() {
        let executor = pool(4);
        let tasks: Vec<_> = (0..16u64)
            .map(|i| {
                move || {
                    std::thread::sleep(Duration::from_millis(16 - i));
                    Ok(i * i)
                }
            })
            .collect();
        let results = executor.execute_tasks(tasks).expect("results");
        assert_eq!(results, (0..16u64).map(|i| i * i).collect::<Vec<_>>());
    }

    #[test]
    fn reports_lowest_index_failure_and_skips_remaining_units() {
        let executor = Executor::sequential();
        let started = AtomicUsize::new(0);
        let tasks: Vec<_> = (0..10usize)
            .map(|i| {
                let started = &started;
                move || {
                    started.fetch_add(1, Ordering::SeqCst);
                    if i >= 3 {
                        Err(SolverError::Computation {
                            term: i,
                            time: 0.0,
                            message: "boom".to_string(),
                        })
                    } else {
                        Ok(i)
                    }
                }
            })
            .collect();
        let err = executor.execute_tasks(tasks).expect_err("failure");
        match &err {
            SolverError::ExecutorAggregate { index, source } => {
                assert_eq!(*index, 3);
                assert!(matches!(**source, SolverError::Computation { term: 3, .. }));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(err.kind(), ErrorKind::ExecutorAggregateError);
        assert_eq!(started.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn parallel_failure_reports_lowest_failing_index() {
        let executor = pool(4);
        let tasks: Vec<_> = (0..32usize)
            .map(|i| {
                move || {
                    if i % 5 == 2 {
                        Err(SolverError::Cancelled)
                    } else {
                        Ok(i)
                    }
                }
            })
            .collect();
        match executor.execute_tasks(tasks) {
            Err(SolverError::ExecutorAggregate { index, .. }) => assert_eq!(index % 5, 2),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn captures_panicking_units() {
        let executor = pool(2);
        let tasks: Vec<Box<dyn FnOnce() -> Result<u32> + Send>> = vec![
            Box::new(|| Ok(1)),
            Box::new(|| panic!("unit exploded")),
        ];
        let err = executor.execute_tasks(tasks).expect_err("panic");
        match err.root_cause() {
            SolverError::Panicked { message } => assert!(message.contains("unit exploded")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn cancelled_batches_report_cancellation() {
        let executor = pool(2);
        let token = CancellationToken::new();
        token.cancel();
        let tasks: Vec<_> = (0..4).map(|i| move || Ok(i)).collect();
        let err = executor
            .execute_tasks_with_cancellation(tasks, Some(&token))
            .expect_err("cancelled");
        assert_eq!(err, SolverError::Cancelled);
    }

    #[test]
    fn sequential_mode_has_the_same_contract() {
        let executor = Executor::new(&ExecutorConfig {
            threads: None,
            sequential: true,
        });
        assert!(!executor.is_parallel());
        assert_eq!(executor.threads(), 1);
        let tasks: Vec<_> = (0..5).map(|i| move || Ok(i * 2)).collect();
        assert_eq!(executor.execute_tasks(tasks).expect("ok"), vec![0, 2, 4, 6, 8]);
        let empty: Vec<fn() -> Result<i32>> = Vec::new();
        assert!(executor.execute_tasks(empty).expect("empty").is_empty());
    }

    #[test]
    fn shared_executor_is_a_single_instance() {
        assert!(Arc::ptr_eq(&Executor::shared(), &Executor::shared()));
    }
}
