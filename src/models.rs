use serde::{Deserialize, Deserializer, Serialize};

/// Task priority. Anything outside these three values coerces to `Medium`
/// on create and is dropped from the change set on update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    /// Parse a client-supplied priority string. Case-sensitive, exact match.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Low" => Some(Priority::Low),
            "Medium" => Some(Priority::Medium),
            "High" => Some(Priority::High),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub priority: Priority,
    pub completed: bool,
    pub created_at: String, // YYYY-MM-DD HH:MM:SS (UTC)
    pub due_date: Option<String>,
}

/// Creation payload. Everything except `title` has a documented default;
/// `completed` is not settable at creation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTask {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub priority: Option<String>,
    pub due_date: Option<String>,
}

impl NewTask {
    /// The validated title, or `None` when missing or empty.
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref().filter(|t| !t.is_empty())
    }
}

/// Partial-update payload. Absent fields are left untouched. `description`
/// and `due_date` distinguish "absent" from an explicit JSON null so they
/// can be cleared; for the remaining fields null counts as absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskPatch {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    pub category: Option<String>,
    pub priority: Option<String>,
    pub completed: Option<bool>,
    #[serde(default, deserialize_with = "nullable")]
    pub due_date: Option<Option<String>>,
}

/// Deserialize a field where JSON null means "set to NULL" rather than
/// "field absent". The outer `None` only ever comes from `#[serde(default)]`.
fn nullable<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

/// One validated column assignment produced from a `TaskPatch`.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldChange {
    Title(String),
    Description(Option<String>),
    Category(String),
    Priority(Priority),
    Completed(bool),
    DueDate(Option<String>),
}

impl TaskPatch {
    /// The effective change set. An invalid priority contributes nothing,
    /// so a payload carrying only an invalid priority comes back empty and
    /// is rejected by the caller as having no valid fields.
    pub fn changes(&self) -> Vec<FieldChange> {
        let mut changes = Vec::new();
        if let Some(title) = &self.title {
            changes.push(FieldChange::Title(title.clone()));
        }
        if let Some(description) = &self.description {
            changes.push(FieldChange::Description(description.clone()));
        }
        if let Some(category) = &self.category {
            changes.push(FieldChange::Category(category.clone()));
        }
        if let Some(priority) = self.priority.as_deref().and_then(Priority::parse) {
            changes.push(FieldChange::Priority(priority));
        }
        if let Some(completed) = self.completed {
            changes.push(FieldChange::Completed(completed));
        }
        if let Some(due_date) = &self.due_date {
            changes.push(FieldChange::DueDate(due_date.clone()));
        }
        changes
    }
}

/// List-operation constraints. All present filters AND together.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub completed: Option<bool>,
    pub priority: Option<String>,
    pub category: Option<String>,
}

impl TaskFilter {
    /// Build a filter from raw query parameters. Status values other than
    /// `completed`/`pending` apply no status filter; priority and category
    /// are exact matches, unvalidated.
    pub fn from_params(
        status: Option<&str>,
        priority: Option<String>,
        category: Option<String>,
    ) -> Self {
        let completed = match status {
            Some("completed") => Some(true),
            Some("pending") => Some(false),
            _ => None,
        };
        TaskFilter {
            completed,
            priority,
            category,
        }
    }
}

/// Aggregates over the current rows only.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSummary {
    pub total: i64,
    pub completed: i64,
    pub pending: i64,
    /// completed / total * 100, rounded to 2 decimal places; 0 when empty.
    pub completion_rate: f64,
    pub priority_stats: std::collections::BTreeMap<String, i64>,
    pub category_stats: std::collections::BTreeMap<String, i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_parse_is_exact() {
        assert_eq!(Priority::parse("High"), Some(Priority::High));
        assert_eq!(Priority::parse("high"), None);
        assert_eq!(Priority::parse("Urgent"), None);
        assert_eq!(Priority::default(), Priority::Medium);
    }

    #[test]
    fn patch_changes_drop_invalid_priority() {
        let patch: TaskPatch =
            serde_json::from_str(r#"{"priority": "Urgent", "completed": true}"#).unwrap();
        let changes = patch.changes();
        assert_eq!(changes, vec![FieldChange::Completed(true)]);
    }

    #[test]
    fn patch_changes_empty_for_unrecognized_fields() {
        let patch: TaskPatch = serde_json::from_str(r#"{"foo": 1}"#).unwrap();
        assert!(patch.changes().is_empty());
    }

    #[test]
    fn patch_distinguishes_null_from_absent() {
        let patch: TaskPatch = serde_json::from_str(r#"{"due_date": null}"#).unwrap();
        assert_eq!(patch.changes(), vec![FieldChange::DueDate(None)]);

        let patch: TaskPatch = serde_json::from_str("{}").unwrap();
        assert!(patch.changes().is_empty());
    }

    #[test]
    fn status_filter_ignores_unrecognized_values() {
        assert_eq!(
            TaskFilter::from_params(Some("completed"), None, None).completed,
            Some(true)
        );
        assert_eq!(
            TaskFilter::from_params(Some("pending"), None, None).completed,
            Some(false)
        );
        assert_eq!(
            TaskFilter::from_params(Some("archived"), None, None).completed,
            None
        );
    }
}
