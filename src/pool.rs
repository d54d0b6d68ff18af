//! Fixed-size worker pool for tranche tasks.
//!
//! Tasks are handed out over a bounded channel to scoped threads; a panic in
//! one task is caught and reported for that task only.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread;

use crossbeam_channel::bounded;

/// Why a task produced no result.
#[derive(Debug, thiserror::Error)]
pub enum TaskError<E> {
    #[error("{0}")]
    Failed(E),
    #[error("worker panicked: {0}")]
    Panicked(String),
}

pub struct WorkerPool {
    threads: usize,
}

impl WorkerPool {
    pub fn new(threads: usize) -> Self {
        Self { threads: threads.max(1) }
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Run `work` over every task and return one result per task, in task order.
    pub fn run<T, R, E, F>(&self, tasks: Vec<T>, work: F) -> Vec<Result<R, TaskError<E>>>
    where
        T: Send,
        R: Send,
        E: Send,
        F: Fn(T) -> Result<R, E> + Sync,
    {
        let total = tasks.len();
        if total == 0 {
            return Vec::new();
        }
        let (task_tx, task_rx) = bounded::<(usize, T)>(self.threads);
        let (result_tx, result_rx) = bounded::<(usize, Result<R, TaskError<E>>)>(total);
        let work = &work;

        thread::scope(|s| {
            for _ in 0..self.threads.min(total) {
                let task_rx = task_rx.clone();
                let result_tx = result_tx.clone();
                s.spawn(move || {
                    for (idx, task) in task_rx.iter() {
                        let result = match panic::catch_unwind(AssertUnwindSafe(|| work(task))) {
                            Ok(Ok(r)) => Ok(r),
                            Ok(Err(e)) => Err(TaskError::Failed(e)),
                            Err(payload) => Err(TaskError::Panicked(panic_message(payload))),
                        };
                        if result_tx.send((idx, result)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(task_rx);
            drop(result_tx);
            for (idx, task) in tasks.into_iter().enumerate() {
                if task_tx.send((idx, task)).is_err() {
                    break;
                }
            }
            drop(task_tx);
        });

        let mut slots: Vec<Option<Result<R, TaskError<E>>>> = (0..total).map(|_| None).collect();
        for (idx, result) in result_rx.try_iter() {
            slots[idx] = Some(result);
        }
        slots
            .into_iter()
            .map(|slot| slot.unwrap_or_else(|| Err(TaskError::Panicked("task was never run".to_string()))))
            .collect()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
