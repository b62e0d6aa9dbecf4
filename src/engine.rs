use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use crate::error::{ExecuteError, MALICIOUS_COMMAND_ERROR};
use crate::executor::ShellRunner;
use crate::storage::{Task, TaskExecution};
use crate::store_manager::TaskRepository;
use crate::validator::CommandValidator;

/// Loads a task, runs its command, and records the run in its history.
///
/// Once a command passes validation a record is always written: a timeout or
/// a failed spawn ends up in the record's output, not in the return value.
/// Runs of the same task id are serialized so concurrent callers cannot lose
/// each other's records. Other processes sharing the store are not coordinated.
pub struct ExecutionEngine<R> {
    repository: R,
    validator: CommandValidator,
    runner: ShellRunner,
    task_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<R: TaskRepository> ExecutionEngine<R> {
    pub fn new(repository: R, validator: CommandValidator, runner: ShellRunner) -> Self {
        Self {
            repository,
            validator,
            runner,
            task_locks: Mutex::new(HashMap::new()),
        }
    }

    #[cfg(test)]
    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn execute(&self, task_id: &str) -> Result<Task, ExecuteError> {
        let lock = self.task_lock(task_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let task = self
            .repository
            .find_by_id(task_id)
            .map_err(ExecuteError::Persistence)?
            .ok_or_else(|| ExecuteError::NotFound(task_id.to_string()))?;

        if !self.validator.is_safe(&task.command) {
            tracing::warn!(
                task_id,
                matched = self.validator.matched_entry(&task.command).unwrap_or("<blank>"),
                "Rejected unsafe command"
            );
            return Err(ExecuteError::ValidationRejected(
                MALICIOUS_COMMAND_ERROR.to_string(),
            ));
        }

        tracing::info!(task_id, command = %task.command, "Executing task");
        let started = Instant::now();
        let start_time = Utc::now();
        let outcome = self.runner.run(&task.command);
        let end_time = Utc::now();

        let exit_code = outcome.exit_code();
        let output = outcome.into_output(self.runner.deadline());
        let execution = TaskExecution::new(start_time, end_time, output, exit_code);

        let saved = self
            .repository
            .save(task.with_execution(execution))
            .map_err(ExecuteError::Persistence)?;

        tracing::info!(
            task_id,
            exit_code = ?exit_code,
            elapsed_ms = started.elapsed().as_millis() as u64,
            history = saved.executions().len(),
            "Recorded execution"
        );
        Ok(saved)
    }

    fn task_lock(&self, task_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self
            .task_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // Drop locks nobody else is holding or waiting on.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks
            .entry(task_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
