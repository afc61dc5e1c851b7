//! Derives the visible task list from the collection and the active criteria.
//!
//! Narrowing runs in a fixed order (selected day, search, category, status)
//! and every step keeps the incoming order; the sort is applied last.

use std::{cmp::Ordering, fmt, str::FromStr};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::tasks::{Category, ParseValueError, Task};

/// Completion-state filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    Pending,
    Completed,
    /// Open tasks whose due date has passed.
    Overdue,
}

impl StatusFilter {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusFilter::Pending => "pending",
            StatusFilter::Completed => "completed",
            StatusFilter::Overdue => "overdue",
        }
    }
}

impl fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatusFilter {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(StatusFilter::Pending),
            "completed" => Ok(StatusFilter::Completed),
            "overdue" => Ok(StatusFilter::Overdue),
            _ => Err(ParseValueError::new("status", s)),
        }
    }
}

/// Sort applied after filtering. Incomplete tasks always come first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortKey {
    /// Newest `created_at` first.
    #[default]
    Date,
    /// Highest priority first.
    Priority,
    /// Category name, ascending.
    Category,
    /// Earliest deadline first; tasks without one go last.
    DueDate,
    /// User-assigned `order`.
    Manual,
}

impl SortKey {
    pub fn as_str(self) -> &'static str {
        match self {
            SortKey::Date => "date",
            SortKey::Priority => "priority",
            SortKey::Category => "category",
            SortKey::DueDate => "dueDate",
            SortKey::Manual => "manual",
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortKey {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "date" => Ok(SortKey::Date),
            "priority" => Ok(SortKey::Priority),
            "category" => Ok(SortKey::Category),
            "duedate" | "due" | "due-date" => Ok(SortKey::DueDate),
            "manual" => Ok(SortKey::Manual),
            _ => Err(ParseValueError::new("sort key", s)),
        }
    }
}

/// User filter criteria. Unset category/status are stored as `""`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Filters {
    pub search: String,
    #[serde(with = "blank_as_none")]
    pub category: Option<Category>,
    #[serde(with = "blank_as_none")]
    pub status: Option<StatusFilter>,
    pub sort: SortKey,
}

/// Apply date narrowing, search, category and status filters, then sort.
pub fn visible_tasks(
    tasks: &[Task],
    selected: Option<NaiveDate>,
    filters: &Filters,
    today: NaiveDate,
) -> Vec<Task> {
    let query = filters.search.trim().to_lowercase();
    let mut view: Vec<Task> = tasks
        .iter()
        .filter(|t| selected.is_none_or(|day| t.date == day))
        .filter(|t| matches_search(t, &query))
        .filter(|t| filters.category.is_none_or(|c| t.category == c))
        .filter(|t| matches_status(t, filters.status, today))
        .cloned()
        .collect();
    sort_tasks(&mut view, filters.sort);
    view
}

/// Stable sort: incomplete before completed, then by `key`.
pub fn sort_tasks(tasks: &mut [Task], key: SortKey) {
    tasks.sort_by(|a, b| {
        a.completed
            .cmp(&b.completed)
            .then_with(|| compare_by(a, b, key))
    });
}

fn compare_by(a: &Task, b: &Task, key: SortKey) -> Ordering {
    match key {
        SortKey::Priority => b.priority.cmp(&a.priority),
        SortKey::Category => a.category.as_str().cmp(b.category.as_str()),
        SortKey::DueDate => match (a.due_date, b.due_date) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        },
        SortKey::Manual => a.order.cmp(&b.order),
        SortKey::Date => b.created_at.cmp(&a.created_at),
    }
}

fn matches_search(task: &Task, query: &str) -> bool {
    query.is_empty()
        || task.text.to_lowercase().contains(query)
        || task.category.as_str().contains(query)
}

fn matches_status(task: &Task, status: Option<StatusFilter>, today: NaiveDate) -> bool {
    match status {
        None => true,
        Some(StatusFilter::Pending) => !task.completed,
        Some(StatusFilter::Completed) => task.completed,
        Some(StatusFilter::Overdue) => task.is_overdue(today),
    }
}

/// Serde adapter for optional enums that persist "unset" as an empty string.
mod blank_as_none {
    use std::{fmt, str::FromStr};

    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<T, S>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: fmt::Display,
        S: Serializer,
    {
        match value {
            Some(inner) => serializer.collect_str(inner),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        T: FromStr,
        T::Err: fmt::Display,
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") | Some("all") => Ok(None),
            Some(value) => value.parse().map(Some).map_err(de::Error::custom),
        }
    }
}
