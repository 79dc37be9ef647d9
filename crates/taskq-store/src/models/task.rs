use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persisted unit of deferred work.
///
/// `error == None` marks a pending row, the only kind a claim ever considers.
/// A quarantined row carries the handler failure detail and stays parked until
/// an operator clears the error or deletes the row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub task_type: String,
    pub payload: serde_json::Value,
    pub error: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn is_pending(&self) -> bool {
        self.error.is_none()
    }

    pub fn is_quarantined(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskFilter {
    #[default]
    All,
    Pending,
    Quarantined,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        match self {
            Self::All => true,
            Self::Pending => task.is_pending(),
            Self::Quarantined => task.is_quarantined(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ListTasksParams {
    pub filter: TaskFilter,
    pub task_type: Option<String>,
    pub limit: Option<i64>,
}

impl ListTasksParams {
    pub fn pending() -> Self {
        Self {
            filter: TaskFilter::Pending,
            ..Default::default()
        }
    }

    pub fn quarantined() -> Self {
        Self {
            filter: TaskFilter::Quarantined,
            ..Default::default()
        }
    }

    pub fn with_task_type(mut self, task_type: impl Into<String>) -> Self {
        self.task_type = Some(task_type.into());
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, task: &Task) -> bool {
        self.filter.matches(task)
            && self
                .task_type
                .as_deref()
                .is_none_or(|task_type| task.task_type == task_type)
    }
}
