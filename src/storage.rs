use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One run of a task's command. Built once, never edited.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskExecution {
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    output: String,
    #[serde(default)]
    exit_code: Option<i32>, // None for timeout, spawn failure or signal
}

impl TaskExecution {
    pub fn new(
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        output: String,
        exit_code: Option<i32>,
    ) -> Self {
        // Wall clock can step backwards between the two reads.
        let end_time = end_time.max(start_time);
        Self {
            start_time,
            end_time,
            output,
            exit_code,
        }
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn end_time(&self) -> DateTime<Utc> {
        self.end_time
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    pub fn duration_ms(&self) -> i64 {
        (self.end_time - self.start_time).num_milliseconds()
    }
}

/// A stored command definition plus its execution history, newest first.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub owner: String,
    pub command: String,
    #[serde(default)]
    task_executions: Vec<TaskExecution>,
}

impl Task {
    pub fn new(name: impl Into<String>, owner: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            owner: owner.into(),
            command: command.into(),
            task_executions: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn executions(&self) -> &[TaskExecution] {
        &self.task_executions
    }

    pub fn latest_execution(&self) -> Option<&TaskExecution> {
        self.task_executions.first()
    }

    /// Returns the task with `execution` at the front of a fresh history.
    /// The previous history is left untouched for anyone still holding it.
    pub fn with_execution(&self, execution: TaskExecution) -> Task {
        let mut history = Vec::with_capacity(self.task_executions.len() + 1);
        history.push(execution);
        history.extend(self.task_executions.iter().cloned());
        Task {
            id: self.id.clone(),
            name: self.name.clone(),
            owner: self.owner.clone(),
            command: self.command.clone(),
            task_executions: history,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn exec_at(offset_secs: i64, output: &str) -> TaskExecution {
        let start = Utc::now() + Duration::seconds(offset_secs);
        TaskExecution::new(start, start + Duration::milliseconds(5), output.to_string(), Some(0))
    }

    #[test]
    fn new_task_has_empty_history() {
        let task = Task::new("greet", "ops", "echo hi");
        assert!(task.executions().is_empty());
        assert!(task.latest_execution().is_none());
        assert!(task.id.is_empty());
    }

    #[test]
    fn with_execution_prepends_without_touching_original() {
        let task = Task::new("greet", "ops", "echo hi").with_id("t1");
        let first = task.with_execution(exec_at(0, "a\n"));
        let second = first.with_execution(exec_at(1, "b\n"));

        assert!(task.executions().is_empty());
        assert_eq!(first.executions().len(), 1);
        assert_eq!(second.executions().len(), 2);
        assert_eq!(second.executions()[0].output(), "b\n");
        assert_eq!(second.executions()[1].output(), "a\n");
        assert_eq!(second.id, "t1");
    }

    #[test]
    fn end_time_never_precedes_start_time() {
        let start = Utc::now();
        let exec = TaskExecution::new(start, start - Duration::seconds(3), String::new(), None);
        assert_eq!(exec.end_time(), exec.start_time());
        assert_eq!(exec.duration_ms(), 0);
    }

    #[test]
    fn serializes_with_camel_case_fields() -> anyhow::Result<()> {
        let task = Task::new("greet", "ops", "echo hi")
            .with_id("t1")
            .with_execution(exec_at(0, "hi\n"));
        let json = serde_json::to_value(&task)?;
        assert!(json.get("taskExecutions").is_some());
        assert!(json["taskExecutions"][0].get("startTime").is_some());
        assert_eq!(json["taskExecutions"][0]["exitCode"], 0);

        let back: Task = serde_json::from_value(json)?;
        assert_eq!(back, task);
        Ok(())
    }

    #[test]
    fn missing_history_deserializes_as_empty() -> anyhow::Result<()> {
        let task: Task =
            serde_json::from_str(r#"{"name":"n","owner":"o","command":"echo x"}"#)?;
        assert!(task.executions().is_empty());
        assert!(task.id.is_empty());
        Ok(())
    }
}
