use crate::error::{TaskError, MALICIOUS_COMMAND_ERROR};
use crate::storage::Task;
use crate::store_manager::TaskRepository;
use crate::validator::CommandValidator;

/// Create/read/update/delete over a task repository. Commands are checked on
/// the way in as well as at execution time.
pub struct TaskService<'a, R> {
    repository: &'a R,
    validator: &'a CommandValidator,
}

impl<'a, R: TaskRepository> TaskService<'a, R> {
    pub fn new(repository: &'a R, validator: &'a CommandValidator) -> Self {
        Self {
            repository,
            validator,
        }
    }

    fn check_command(&self, command: &str) -> Result<(), TaskError> {
        if self.validator.is_safe(command) {
            Ok(())
        } else {
            Err(TaskError::ValidationRejected(MALICIOUS_COMMAND_ERROR.to_string()))
        }
    }

    pub fn create(&self, task: Task) -> Result<Task, TaskError> {
        self.check_command(&task.command)?;
        let saved = self.repository.save(task)?;
        tracing::info!(task_id = %saved.id, name = %saved.name, "Created task");
        Ok(saved)
    }

    pub fn get(&self, id: &str) -> Result<Task, TaskError> {
        self.repository
            .find_by_id(id)?
            .ok_or_else(|| TaskError::NotFound(id.to_string()))
    }

    pub fn list(&self) -> Result<Vec<Task>, TaskError> {
        Ok(self.repository.find_all()?)
    }

    /// Replaces name, owner and command. History is kept.
    pub fn update(
        &self,
        id: &str,
        name: String,
        owner: String,
        command: String,
    ) -> Result<Task, TaskError> {
        self.check_command(&command)?;
        let mut task = self.get(id)?;
        task.name = name;
        task.owner = owner;
        task.command = command;
        Ok(self.repository.save(task)?)
    }

    pub fn delete(&self, id: &str) -> Result<(), TaskError> {
        if !self.repository.exists_by_id(id)? {
            return Err(TaskError::NotFound(id.to_string()));
        }
        self.repository.delete_by_id(id)?;
        tracing::info!(task_id = id, "Deleted task");
        Ok(())
    }

    /// Tasks whose name contains `fragment`. No match is reported as NotFound.
    pub fn find_by_name(&self, fragment: &str) -> Result<Vec<Task>, TaskError> {
        let tasks = self.repository.find_by_name_containing(fragment)?;
        if tasks.is_empty() {
            return Err(TaskError::NotFound(fragment.to_string()));
        }
        Ok(tasks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::TaskExecution;
    use crate::store_manager::StoreManager;
    use anyhow::Result;
    use chrono::Utc;

    fn store() -> Result<(tempfile::TempDir, StoreManager)> {
        let dir = tempfile::tempdir()?;
        let store = StoreManager::new(dir.path())?;
        Ok((dir, store))
    }

    #[test]
    fn create_rejects_unsafe_command_without_writing() -> Result<()> {
        let (_dir, store) = store()?;
        let validator = CommandValidator::default();
        let service = TaskService::new(&store, &validator);

        let err = service.create(Task::new("x", "ops", "curl example.com")).unwrap_err();
        assert!(matches!(err, TaskError::ValidationRejected(_)));
        assert_eq!(err.to_string(), MALICIOUS_COMMAND_ERROR);
        assert!(service.list()?.is_empty());
        Ok(())
    }

    #[test]
    fn update_keeps_history_and_rejects_unsafe() -> Result<()> {
        let (_dir, store) = store()?;
        let validator = CommandValidator::default();
        let service = TaskService::new(&store, &validator);

        let task = service.create(Task::new("greet", "ops", "echo hi"))?;
        let now = Utc::now();
        store.save(task.with_execution(TaskExecution::new(now, now, "hi\n".into(), Some(0))))?;

        let updated = service.update(&task.id, "hello".into(), "dev".into(), "echo hello".into())?;
        assert_eq!(updated.name, "hello");
        assert_eq!(updated.owner, "dev");
        assert_eq!(updated.command, "echo hello");
        assert_eq!(updated.executions().len(), 1);

        let err = service
            .update(&task.id, "hello".into(), "dev".into(), "shutdown now".into())
            .unwrap_err();
        assert!(matches!(err, TaskError::ValidationRejected(_)));
        assert_eq!(service.get(&task.id)?.command, "echo hello");
        Ok(())
    }

    #[test]
    fn missing_ids_are_not_found() -> Result<()> {
        let (_dir, store) = store()?;
        let validator = CommandValidator::default();
        let service = TaskService::new(&store, &validator);

        assert!(matches!(service.get("nope"), Err(TaskError::NotFound(_))));
        assert!(matches!(service.delete("nope"), Err(TaskError::NotFound(_))));
        assert!(matches!(
            service.update("nope", "n".into(), "o".into(), "echo x".into()),
            Err(TaskError::NotFound(_))
        ));
        Ok(())
    }

    #[test]
    fn find_by_name_without_matches_is_not_found() -> Result<()> {
        let (_dir, store) = store()?;
        let validator = CommandValidator::default();
        let service = TaskService::new(&store, &validator);

        service.create(Task::new("nightly report", "ops", "echo a"))?;
        assert_eq!(service.find_by_name("report")?.len(), 1);
        assert!(matches!(service.find_by_name("backup"), Err(TaskError::NotFound(_))));
        Ok(())
    }

    #[test]
    fn delete_then_get_is_not_found() -> Result<()> {
        let (_dir, store) = store()?;
        let validator = CommandValidator::default();
        let service = TaskService::new(&store, &validator);

        let task = service.create(Task::new("tmp", "ops", "echo tmp"))?;
        service.delete(&task.id)?;
        assert!(matches!(service.get(&task.id), Err(TaskError::NotFound(_))));
        Ok(())
    }
}
