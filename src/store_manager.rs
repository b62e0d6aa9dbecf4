use anyhow::{Context, Result};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

use crate::storage::Task;

/// Persistence seam for task aggregates. `save` is an upsert of the whole
/// task, history included.
pub trait TaskRepository {
    fn find_by_id(&self, id: &str) -> Result<Option<Task>>;
    fn find_all(&self) -> Result<Vec<Task>>;
    fn save(&self, task: Task) -> Result<Task>;
    fn exists_by_id(&self, id: &str) -> Result<bool>;
    fn delete_by_id(&self, id: &str) -> Result<()>;
    fn find_by_name_containing(&self, fragment: &str) -> Result<Vec<Task>>;
}

impl<R: TaskRepository + ?Sized> TaskRepository for &R {
    fn find_by_id(&self, id: &str) -> Result<Option<Task>> {
        (**self).find_by_id(id)
    }
    fn find_all(&self) -> Result<Vec<Task>> {
        (**self).find_all()
    }
    fn save(&self, task: Task) -> Result<Task> {
        (**self).save(task)
    }
    fn exists_by_id(&self, id: &str) -> Result<bool> {
        (**self).exists_by_id(id)
    }
    fn delete_by_id(&self, id: &str) -> Result<()> {
        (**self).delete_by_id(id)
    }
    fn find_by_name_containing(&self, fragment: &str) -> Result<Vec<Task>> {
        (**self).find_by_name_containing(fragment)
    }
}

/// Stores each task as `<base_dir>/tasks/<id>.json`.
pub struct StoreManager {
    base_dir: PathBuf,
}

impl StoreManager {
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        let tasks_dir = base_dir.join("tasks");
        fs::create_dir_all(&tasks_dir)
            .with_context(|| format!("Failed to create tasks directory {}", tasks_dir.display()))?;
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn tasks_dir(&self) -> PathBuf {
        self.base_dir.join("tasks")
    }

    fn task_path(&self, id: &str) -> PathBuf {
        self.tasks_dir().join(format!("{}.json", id))
    }

    fn load_task(path: &Path) -> Result<Task> {
        let file = fs::File::open(path)
            .with_context(|| format!("Failed to open task file {}", path.display()))?;
        serde_json::from_reader(file)
            .with_context(|| format!("Failed to parse task file {}", path.display()))
    }

    fn generate_id(task: &Task) -> String {
        let seed = format!(
            "{}\0{}\0{}",
            task.name,
            task.command,
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        );
        let mut hasher = Sha256::new();
        hasher.update(seed.as_bytes());
        hex::encode(hasher.finalize())[..12].to_string()
    }
}

/// Ids become file names, so keep them to a safe alphabet.
fn validate_id(id: &str) -> Result<()> {
    if id.is_empty()
        || !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        anyhow::bail!("Invalid task id: {:?}", id);
    }
    Ok(())
}

impl TaskRepository for StoreManager {
    fn find_by_id(&self, id: &str) -> Result<Option<Task>> {
        if validate_id(id).is_err() {
            return Ok(None);
        }
        let path = self.task_path(id);
        if !path.exists() {
            return Ok(None);
        }
        Self::load_task(&path).map(Some)
    }

    fn find_all(&self) -> Result<Vec<Task>> {
        let mut tasks = Vec::new();
        for entry in fs::read_dir(self.tasks_dir()).context("Failed to read tasks directory")? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            match Self::load_task(&path) {
                Ok(task) => tasks.push(task),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable task file"),
            }
        }
        tasks.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(tasks)
    }

    fn save(&self, mut task: Task) -> Result<Task> {
        if task.id.is_empty() {
            task.id = Self::generate_id(&task);
        }
        validate_id(&task.id)?;

        let path = self.task_path(&task.id);
        let tmp_path = self.tasks_dir().join(format!(".{}.json.tmp", task.id));
        let content = serde_json::to_string_pretty(&task).context("Failed to serialize task")?;
        fs::write(&tmp_path, content)
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &path)
            .with_context(|| format!("Failed to replace {}", path.display()))?;

        tracing::debug!(task_id = %task.id, executions = task.executions().len(), "Saved task");
        Ok(task)
    }

    fn exists_by_id(&self, id: &str) -> Result<bool> {
        Ok(validate_id(id).is_ok() && self.task_path(id).exists())
    }

    fn delete_by_id(&self, id: &str) -> Result<()> {
        validate_id(id)?;
        let path = self.task_path(id);
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to delete {}", path.display()))?;
        }
        Ok(())
    }

    fn find_by_name_containing(&self, fragment: &str) -> Result<Vec<Task>> {
        Ok(self
            .find_all()?
            .into_iter()
            .filter(|task| task.name.contains(fragment))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::TaskExecution;

    fn store() -> Result<(tempfile::TempDir, StoreManager)> {
        let dir = tempfile::tempdir()?;
        let store = StoreManager::new(dir.path())?;
        Ok((dir, store))
    }

    #[test]
    fn save_assigns_id_and_round_trips() -> Result<()> {
        let (_dir, store) = store()?;
        let saved = store.save(Task::new("greet", "ops", "echo hi"))?;
        assert_eq!(saved.id.len(), 12);

        let loaded = store.find_by_id(&saved.id)?;
        assert_eq!(loaded, Some(saved));
        Ok(())
    }

    #[test]
    fn save_keeps_given_id_and_upserts() -> Result<()> {
        let (_dir, store) = store()?;
        let task = store.save(Task::new("greet", "ops", "echo hi").with_id("fixed-1"))?;
        let now = Utc::now();
        let updated = task.with_execution(TaskExecution::new(now, now, "hi\n".into(), Some(0)));
        store.save(updated)?;

        let all = store.find_all()?;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, "fixed-1");
        assert_eq!(all[0].executions().len(), 1);
        Ok(())
    }

    #[test]
    fn missing_and_malformed_ids_are_absent() -> Result<()> {
        let (_dir, store) = store()?;
        assert_eq!(store.find_by_id("nope")?, None);
        assert_eq!(store.find_by_id("../escape")?, None);
        assert!(!store.exists_by_id("nope")?);
        assert!(store.save(Task::new("x", "y", "z").with_id("a/b")).is_err());
        Ok(())
    }

    #[test]
    fn delete_removes_task() -> Result<()> {
        let (_dir, store) = store()?;
        let saved = store.save(Task::new("greet", "ops", "echo hi"))?;
        assert!(store.exists_by_id(&saved.id)?);
        store.delete_by_id(&saved.id)?;
        assert!(!store.exists_by_id(&saved.id)?);
        assert!(store.find_all()?.is_empty());
        Ok(())
    }

    #[test]
    fn find_by_name_is_case_sensitive_substring() -> Result<()> {
        let (_dir, store) = store()?;
        store.save(Task::new("nightly backup", "ops", "echo a"))?;
        store.save(Task::new("Backup check", "ops", "echo b"))?;
        store.save(Task::new("report", "ops", "echo c"))?;

        let found = store.find_by_name_containing("backup")?;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "nightly backup");
        assert!(store.find_by_name_containing("zzz")?.is_empty());
        Ok(())
    }

    #[test]
    fn unreadable_files_are_skipped_in_listing() -> Result<()> {
        let (dir, store) = store()?;
        store.save(Task::new("ok", "ops", "echo ok"))?;
        fs::write(dir.path().join("tasks").join("broken.json"), "{not json")?;
        assert_eq!(store.find_all()?.len(), 1);
        Ok(())
    }
}
