use std::{collections::HashMap, fmt, str::FromStr};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::{clock::Clock, storage::StoreError};

/// Errors surfaced by task operations. None of them leave the store inconsistent.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskError {
    /// Task text was empty after trimming.
    #[error("task text must not be empty")]
    Validation,
    /// No task carries the requested id.
    #[error("task not found: {id}")]
    NotFound { id: u64 },
    /// Import payload did not have the expected shape.
    #[error("invalid import payload: {reason}")]
    Format { reason: String },
    /// Every id up to `u64::MAX` is taken.
    #[error("no task ids left")]
    IdsExhausted,
    /// Persistence read or write failed.
    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// Failure to parse a user-supplied enum value (category, priority, filter...).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown {kind}: {value}")]
pub struct ParseValueError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseValueError {
    pub fn new(kind: &'static str, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}

/// Fixed set of task categories.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    #[default]
    Personal,
    Work,
    Hobby,
    Health,
    Study,
    Shopping,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Personal,
        Category::Work,
        Category::Hobby,
        Category::Health,
        Category::Study,
        Category::Shopping,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Personal => "personal",
            Category::Work => "work",
            Category::Hobby => "hobby",
            Category::Health => "health",
            Category::Study => "study",
            Category::Shopping => "shopping",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| ParseValueError::new("category", s))
    }
}

/// Task priority; persisted as 1, 2 or 3.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
#[serde(try_from = "u8", into = "u8")]
pub enum Priority {
    Low = 1,
    #[default]
    Medium = 2,
    High = 3,
}

impl Priority {
    pub fn label(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl TryFrom<u8> for Priority {
    type Error = ParseValueError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Priority::Low),
            2 => Ok(Priority::Medium),
            3 => Ok(Priority::High),
            other => Err(ParseValueError::new("priority", other.to_string())),
        }
    }
}

impl From<Priority> for u8 {
    fn from(value: Priority) -> Self {
        value as u8
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Priority {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" | "1" => Ok(Priority::Low),
            "medium" | "2" => Ok(Priority::Medium),
            "high" | "3" => Ok(Priority::High),
            _ => Err(ParseValueError::new("priority", s)),
        }
    }
}

/// Task entity, persisted with the camelCase field names of the on-disk format.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: u64,
    pub text: String,
    pub completed: bool,
    /// Day the task is scheduled on.
    pub date: NaiveDate,
    pub category: Category,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    /// Position used by manual sort.
    pub order: u64,
}

impl Task {
    /// Open task whose due date lies strictly before `today`.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        !self.completed && self.due_date.is_some_and(|due| due < today)
    }
}

/// Input for [`TaskStore::create`]. Unset fields take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewTask {
    pub text: String,
    pub date: Option<NaiveDate>,
    pub category: Option<Category>,
    pub priority: Option<Priority>,
    pub due_date: Option<NaiveDate>,
}

impl NewTask {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn on(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    pub fn category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn due(mut self, due_date: NaiveDate) -> Self {
        self.due_date = Some(due_date);
        self
    }
}

/// Partial update. `due_date: Some(None)` clears the deadline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    pub text: Option<String>,
    pub category: Option<Category>,
    pub priority: Option<Priority>,
    pub due_date: Option<Option<NaiveDate>>,
    pub date: Option<NaiveDate>,
}

/// Ordered task collection plus the id counter. The only place tasks are mutated.
#[derive(Debug, Clone)]
pub struct TaskStore {
    tasks: Vec<Task>,
    next_id: u64,
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskStore {
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            next_id: 1,
        }
    }

    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        let mut store = Self::new();
        store.replace_all(tasks);
        store
    }

    /// Swap in a whole collection. The id counter only ever moves forward.
    pub fn replace_all(&mut self, tasks: Vec<Task>) {
        let floor = tasks
            .iter()
            .map(|t| t.id)
            .max()
            .map_or(1, |max| max.saturating_add(1));
        self.next_id = self.next_id.max(floor);
        self.tasks = tasks;
    }

    pub fn all(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, id: u64) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Id the next created task will receive.
    pub fn peek_next_id(&self) -> u64 {
        self.next_id
    }

    pub fn create(&mut self, draft: NewTask, clock: &dyn Clock) -> Result<Task, TaskError> {
        let text = normalize_text(&draft.text)?;
        let following = self.next_id.checked_add(1).ok_or(TaskError::IdsExhausted)?;
        let task = Task {
            id: self.next_id,
            text,
            completed: false,
            date: draft.date.unwrap_or_else(|| clock.today()),
            category: draft.category.unwrap_or_default(),
            priority: draft.priority.unwrap_or_default(),
            due_date: draft.due_date,
            created_at: clock.now(),
            order: self.tasks.len() as u64,
        };
        self.next_id = following;
        self.tasks.push(task.clone());
        debug!(id = task.id, date = %task.date, "created task");
        Ok(task)
    }

    pub fn update(&mut self, id: u64, patch: TaskPatch) -> Result<Task, TaskError> {
        // Validate before touching the task so a bad patch changes nothing.
        let text = patch.text.as_deref().map(normalize_text).transpose()?;
        let task = self.find_mut(id)?;
        if let Some(text) = text {
            task.text = text;
        }
        if let Some(category) = patch.category {
            task.category = category;
        }
        if let Some(priority) = patch.priority {
            task.priority = priority;
        }
        if let Some(due_date) = patch.due_date {
            task.due_date = due_date;
        }
        if let Some(date) = patch.date {
            task.date = date;
        }
        debug!(id, "updated task");
        Ok(task.clone())
    }

    pub fn edit_text(&mut self, id: u64, text: &str) -> Result<Task, TaskError> {
        self.update(
            id,
            TaskPatch {
                text: Some(text.to_string()),
                ..TaskPatch::default()
            },
        )
    }

    pub fn toggle_completed(&mut self, id: u64) -> Result<Task, TaskError> {
        let task = self.find_mut(id)?;
        task.completed = !task.completed;
        debug!(id, completed = task.completed, "toggled task");
        Ok(task.clone())
    }

    /// Remove a task. Unknown ids are ignored.
    pub fn delete(&mut self, id: u64) -> Option<Task> {
        let idx = self.tasks.iter().position(|t| t.id == id)?;
        let removed = self.tasks.remove(idx);
        debug!(id, "deleted task");
        Some(removed)
    }

    /// Move a task to `new_index` within the manual order and renumber every `order`.
    /// Collection (insertion) order is left alone.
    pub fn reorder(&mut self, id: u64, new_index: usize) -> Result<(), TaskError> {
        let mut ranked: Vec<&Task> = self.tasks.iter().collect();
        ranked.sort_by_key(|t| t.order);
        let mut ids: Vec<u64> = ranked.into_iter().map(|t| t.id).collect();

        let from = ids
            .iter()
            .position(|&candidate| candidate == id)
            .ok_or(TaskError::NotFound { id })?;
        let moved = ids.remove(from);
        ids.insert(new_index.min(ids.len()), moved);

        let ranks: HashMap<u64, u64> = ids
            .into_iter()
            .enumerate()
            .map(|(rank, id)| (id, rank as u64))
            .collect();
        for task in &mut self.tasks {
            if let Some(&rank) = ranks.get(&task.id) {
                task.order = rank;
            }
        }
        Ok(())
    }

    fn find_mut(&mut self, id: u64) -> Result<&mut Task, TaskError> {
        self.tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(TaskError::NotFound { id })
    }
}

fn normalize_text(text: &str) -> Result<String, TaskError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(TaskError::Validation);
    }
    Ok(trimmed.to_string())
}
