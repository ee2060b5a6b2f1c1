use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, params_from_iter};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::models::{FieldChange, NewTask, Priority, StatsSummary, Task, TaskFilter};
use crate::utils;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Failed to create database directory: {0}")]
    Directory(String),
}

/// A single SQLite connection. Each request opens its own `Database` and
/// drops it when the response is produced; there is no pooling and no
/// shared connection state between requests.
pub struct Database {
    conn: Connection,
}

impl Database {
    const TASK_COLUMNS: &'static str =
        "id, title, description, category, priority, completed, created_at, due_date";

    /// Open (or create) the database file at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let db_path = PathBuf::from(path);

        // Create parent directory if it doesn't exist
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Directory(e.to_string()))?;
            }
        }

        let conn = Connection::open(&db_path)?;
        Ok(Database { conn })
    }

    /// Open an in-memory database. Used by tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Ok(Database { conn })
    }

    /// Initialize the database schema (table and indexes). Idempotent;
    /// run once at startup.
    pub fn initialize_schema(&self) -> Result<(), StoreError> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS tasks (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                title           TEXT NOT NULL,
                description     TEXT,
                category        TEXT DEFAULT 'General',
                priority        TEXT DEFAULT 'Medium',
                completed       INTEGER DEFAULT 0,
                created_at      TEXT NOT NULL,
                due_date        TEXT
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_tasks_created_at ON tasks(created_at)",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_tasks_category ON tasks(category)",
            [],
        )?;

        Ok(())
    }

    /// Helper function to map a row to a Task
    fn row_to_task(row: &rusqlite::Row) -> Result<Task, rusqlite::Error> {
        let priority: String = row.get(4)?;
        Ok(Task {
            id: row.get(0)?,
            title: row.get(1)?,
            description: row.get(2)?,
            category: row.get(3)?,
            priority: Priority::parse(&priority).unwrap_or_default(),
            completed: row.get::<_, i64>(5)? != 0,
            created_at: row.get(6)?,
            due_date: row.get(7)?,
        })
    }

    /// Insert a task and read it back. The title must already be validated
    /// as non-empty by the caller; the remaining fields take their defaults
    /// when absent and an invalid priority coerces to `Medium`.
    ///
    /// Insert and read-back are two separate statements; a concurrent
    /// delete in between surfaces as `None`.
    pub fn create_task(&self, title: &str, new: &NewTask) -> Result<Option<Task>, StoreError> {
        let priority = new
            .priority
            .as_deref()
            .and_then(Priority::parse)
            .unwrap_or_default();

        self.conn.execute(
            "INSERT INTO tasks (title, description, category, priority, completed, created_at, due_date)
             VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6)",
            rusqlite::params![
                title,
                new.description.as_deref().unwrap_or(""),
                new.category.as_deref().unwrap_or("General"),
                priority.as_str(),
                utils::now_timestamp(),
                new.due_date,
            ],
        )?;

        self.task(self.conn.last_insert_rowid())
    }

    /// Get a single task by ID.
    pub fn task(&self, id: i64) -> Result<Option<Task>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM tasks WHERE id = ?1",
            Self::TASK_COLUMNS
        ))?;

        stmt.query_row(rusqlite::params![id], Self::row_to_task)
            .optional()
            .map_err(StoreError::from)
    }

    /// Check whether a task with this ID exists.
    pub fn contains(&self, id: i64) -> Result<bool, StoreError> {
        let found: Option<i64> = self
            .conn
            .query_row("SELECT id FROM tasks WHERE id = ?1", rusqlite::params![id], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(found.is_some())
    }

    /// Get all tasks matching the filter, newest first. Filter conditions
    /// are composed as parameterized WHERE clauses, never interpolated.
    pub fn tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, StoreError> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut params: Vec<Value> = Vec::new();

        if let Some(completed) = filter.completed {
            clauses.push("completed = ?");
            params.push(Value::from(completed));
        }
        if let Some(priority) = &filter.priority {
            clauses.push("priority = ?");
            params.push(Value::from(priority.clone()));
        }
        if let Some(category) = &filter.category {
            clauses.push("category = ?");
            params.push(Value::from(category.clone()));
        }

        let mut sql = format!("SELECT {} FROM tasks", Self::TASK_COLUMNS);
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        // created_at has second resolution; id breaks ties deterministically
        sql.push_str(" ORDER BY created_at DESC, id DESC");

        let mut stmt = self.conn.prepare(&sql)?;
        let tasks = stmt
            .query_map(params_from_iter(params), Self::row_to_task)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(tasks)
    }

    /// Apply a change set to an existing task and read it back. Callers
    /// check existence and reject empty change sets first; an empty set
    /// here is a no-op read.
    pub fn update_task(
        &self,
        id: i64,
        changes: &[FieldChange],
    ) -> Result<Option<Task>, StoreError> {
        if changes.is_empty() {
            return self.task(id);
        }

        let mut sets: Vec<&str> = Vec::new();
        let mut params: Vec<Value> = Vec::new();

        for change in changes {
            match change {
                FieldChange::Title(title) => {
                    sets.push("title = ?");
                    params.push(Value::from(title.clone()));
                }
                FieldChange::Description(description) => {
                    sets.push("description = ?");
                    params.push(description.clone().map_or(Value::Null, Value::from));
                }
                FieldChange::Category(category) => {
                    sets.push("category = ?");
                    params.push(Value::from(category.clone()));
                }
                FieldChange::Priority(priority) => {
                    sets.push("priority = ?");
                    params.push(Value::from(priority.as_str().to_string()));
                }
                FieldChange::Completed(completed) => {
                    sets.push("completed = ?");
                    params.push(Value::from(*completed));
                }
                FieldChange::DueDate(due_date) => {
                    sets.push("due_date = ?");
                    params.push(due_date.clone().map_or(Value::Null, Value::from));
                }
            }
        }

        let sql = format!("UPDATE tasks SET {} WHERE id = ?", sets.join(", "));
        params.push(Value::from(id));

        self.conn.execute(&sql, params_from_iter(params))?;
        self.task(id)
    }

    /// Delete a task by ID. Returns whether a row was removed.
    pub fn delete_task(&self, id: i64) -> Result<bool, StoreError> {
        let removed = self
            .conn
            .execute("DELETE FROM tasks WHERE id = ?1", rusqlite::params![id])?;
        Ok(removed > 0)
    }

    /// Distinct non-null category values currently present.
    pub fn categories(&self) -> Result<Vec<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT category FROM tasks WHERE category IS NOT NULL")?;
        let categories = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(categories)
    }

    /// Aggregate counts and completion rate over the current rows.
    pub fn stats(&self) -> Result<StatsSummary, StoreError> {
        let total: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM tasks", [], |row| row.get(0))?;
        let completed: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM tasks WHERE completed = 1",
            [],
            |row| row.get(0),
        )?;

        let completion_rate = if total > 0 {
            (completed as f64 / total as f64 * 100.0 * 100.0).round() / 100.0
        } else {
            0.0
        };

        let mut stmt = self
            .conn
            .prepare("SELECT priority, COUNT(*) FROM tasks GROUP BY priority")?;
        let priority_stats = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<Result<BTreeMap<_, _>, _>>()?;

        let mut stmt = self.conn.prepare(
            "SELECT category, COUNT(*) FROM tasks WHERE category IS NOT NULL GROUP BY category",
        )?;
        let category_stats = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<Result<BTreeMap<_, _>, _>>()?;

        Ok(StatsSummary {
            total,
            completed,
            pending: total - completed,
            completion_rate,
            priority_stats,
            category_stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TaskPatch;

    fn setup_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.initialize_schema().unwrap();
        db
    }

    fn create(db: &Database, title: &str, new: NewTask) -> Task {
        db.create_task(title, &new).unwrap().unwrap()
    }

    #[test]
    fn create_applies_defaults() {
        let db = setup_db();
        let task = create(&db, "Buy milk", NewTask::default());

        assert_eq!(task.title, "Buy milk");
        assert_eq!(task.description.as_deref(), Some(""));
        assert_eq!(task.category, "General");
        assert_eq!(task.priority, Priority::Medium);
        assert!(!task.completed);
        assert!(task.due_date.is_none());
        assert!(!task.created_at.is_empty());
        assert!(task.id > 0);
    }

    #[test]
    fn create_coerces_invalid_priority() {
        let db = setup_db();
        let task = create(
            &db,
            "Buy milk",
            NewTask {
                priority: Some("Urgent".to_string()),
                ..Default::default()
            },
        );
        assert_eq!(task.priority, Priority::Medium);
    }

    #[test]
    fn list_filters_combine_as_and() {
        let db = setup_db();
        let a = create(
            &db,
            "a",
            NewTask {
                priority: Some("High".to_string()),
                category: Some("Work".to_string()),
                ..Default::default()
            },
        );
        let b = create(
            &db,
            "b",
            NewTask {
                priority: Some("High".to_string()),
                ..Default::default()
            },
        );
        create(&db, "c", NewTask::default());
        db.update_task(b.id, &[FieldChange::Completed(true)]).unwrap();

        let all = db.tasks(&TaskFilter::default()).unwrap();
        assert_eq!(all.len(), 3);
        // Newest first
        assert_eq!(all.last().unwrap().id, a.id);

        let pending = db
            .tasks(&TaskFilter::from_params(Some("pending"), None, None))
            .unwrap();
        assert_eq!(pending.len(), 2);

        let filter = TaskFilter::from_params(
            Some("pending"),
            Some("High".to_string()),
            Some("Work".to_string()),
        );
        let matched = db.tasks(&filter).unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id, a.id);

        // Unrecognized status applies no status filter
        let unfiltered = db
            .tasks(&TaskFilter::from_params(Some("archived"), None, None))
            .unwrap();
        assert_eq!(unfiltered.len(), 3);
    }

    #[test]
    fn update_changes_only_supplied_fields() {
        let db = setup_db();
        let task = create(
            &db,
            "Buy milk",
            NewTask {
                description: Some("2 liters".to_string()),
                due_date: Some("2026-09-01".to_string()),
                ..Default::default()
            },
        );

        let updated = db
            .update_task(task.id, &[FieldChange::Completed(true)])
            .unwrap()
            .unwrap();

        assert!(updated.completed);
        assert_eq!(updated.title, task.title);
        assert_eq!(updated.description, task.description);
        assert_eq!(updated.category, task.category);
        assert_eq!(updated.priority, task.priority);
        assert_eq!(updated.created_at, task.created_at);
        assert_eq!(updated.due_date, task.due_date);
    }

    #[test]
    fn update_can_clear_nullable_fields() {
        let db = setup_db();
        let task = create(
            &db,
            "Buy milk",
            NewTask {
                due_date: Some("2026-09-01".to_string()),
                ..Default::default()
            },
        );

        let patch: TaskPatch =
            serde_json::from_str(r#"{"due_date": null, "description": null}"#).unwrap();
        let updated = db.update_task(task.id, &patch.changes()).unwrap().unwrap();
        assert!(updated.due_date.is_none());
        assert!(updated.description.is_none());
    }

    #[test]
    fn update_missing_task_returns_none() {
        let db = setup_db();
        assert!(!db.contains(42).unwrap());
        assert!(db.update_task(42, &[FieldChange::Completed(true)]).unwrap().is_none());
    }

    #[test]
    fn delete_is_permanent() {
        let db = setup_db();
        let task = create(&db, "Buy milk", NewTask::default());

        assert!(db.delete_task(task.id).unwrap());
        assert!(db.task(task.id).unwrap().is_none());
        assert!(!db.delete_task(task.id).unwrap());
    }

    #[test]
    fn categories_are_distinct() {
        let db = setup_db();
        for (title, category) in [("a", "Work"), ("b", "Work"), ("c", "Home")] {
            create(
                &db,
                title,
                NewTask {
                    category: Some(category.to_string()),
                    ..Default::default()
                },
            );
        }

        let mut categories = db.categories().unwrap();
        categories.sort();
        assert_eq!(categories, vec!["Home", "Work"]);
    }

    #[test]
    fn stats_counts_and_rate() {
        let db = setup_db();
        for priority in ["High", "High", "Low"] {
            create(
                &db,
                "t",
                NewTask {
                    priority: Some(priority.to_string()),
                    ..Default::default()
                },
            );
        }
        let first = db.tasks(&TaskFilter::default()).unwrap().pop().unwrap();
        db.update_task(first.id, &[FieldChange::Completed(true)]).unwrap();

        let stats = db.stats().unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.pending, 2);
        assert_eq!(stats.completion_rate, 33.33);
        assert_eq!(stats.priority_stats.get("High"), Some(&2));
        assert_eq!(stats.priority_stats.get("Low"), Some(&1));
        assert_eq!(stats.priority_stats.get("Medium"), None);
        assert_eq!(stats.category_stats.get("General"), Some(&3));
    }

    #[test]
    fn stats_empty_store() {
        let db = setup_db();
        let stats = db.stats().unwrap();
        assert_eq!(stats.total, 0);
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.completion_rate, 0.0);
        assert!(stats.priority_stats.is_empty());
        assert!(stats.category_stats.is_empty());
    }
}
