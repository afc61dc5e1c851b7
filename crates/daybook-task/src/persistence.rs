use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use daybook_core::{
    clock::Clock,
    settings::Settings,
    storage::{KvStore, StoreError},
    tasks::{Priority, Task, TaskError},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};

pub const TASKS_KEY: &str = "todos";
pub const SETTINGS_KEY: &str = "settings";
pub const BACKUP_KEY: &str = "todos.backup";
pub const EXPORT_VERSION: &str = "1.0";

/// Shape of an export file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub todos: Vec<Task>,
    pub settings: Settings,
    pub export_date: DateTime<Utc>,
    pub version: String,
}

/// Reads and writes the task collection and settings through a `KvStore`.
///
/// Task records are read tolerantly: missing or malformed fields are filled
/// in rather than failing the whole load.
pub struct TaskPersistence<S: KvStore> {
    store: S,
}

impl<S: KvStore> TaskPersistence<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[instrument(skip_all, fields(count = tasks.len()))]
    pub fn save_tasks(&self, tasks: &[Task]) -> Result<(), TaskError> {
        self.write_json(TASKS_KEY, tasks)
    }

    /// Missing record means an empty collection.
    #[instrument(skip_all)]
    pub fn load_tasks(&self, clock: &dyn Clock) -> Result<Vec<Task>, TaskError> {
        match self.read_value(TASKS_KEY)? {
            Some(Value::Array(records)) => Ok(repair_tasks(&records, clock)),
            Some(_) => Err(StoreError::Storage {
                reason: format!("record `{TASKS_KEY}` is not an array"),
            }
            .into()),
            None => Ok(Vec::new()),
        }
    }

    #[instrument(skip_all)]
    pub fn save_settings(&self, settings: &Settings) -> Result<(), TaskError> {
        self.write_json(SETTINGS_KEY, settings)
    }

    /// Missing or unreadable settings fall back to defaults.
    #[instrument(skip_all)]
    pub fn load_settings(&self) -> Result<Settings, TaskError> {
        let Some(value) = self.read_value(SETTINGS_KEY)? else {
            return Ok(Settings::default());
        };
        match serde_json::from_value(value) {
            Ok(settings) => Ok(settings),
            Err(err) => {
                warn!(%err, "stored settings unreadable, using defaults");
                Ok(Settings::default())
            }
        }
    }

    #[instrument(skip_all, fields(count = tasks.len()))]
    pub fn save_backup(&self, tasks: &[Task]) -> Result<(), TaskError> {
        self.write_json(BACKUP_KEY, tasks)
    }

    #[instrument(skip_all)]
    pub fn load_backup(&self, clock: &dyn Clock) -> Result<Option<Vec<Task>>, TaskError> {
        match self.read_value(BACKUP_KEY)? {
            Some(Value::Array(records)) => Ok(Some(repair_tasks(&records, clock))),
            Some(_) | None => Ok(None),
        }
    }

    pub fn clear_backup(&self) -> Result<(), TaskError> {
        self.store.delete(BACKUP_KEY)?;
        Ok(())
    }

    fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), TaskError> {
        let bytes = serde_json::to_vec(value).map_err(|e| StoreError::Storage {
            reason: format!("encode `{key}`: {e}"),
        })?;
        self.store.put(key, &bytes)?;
        Ok(())
    }

    fn read_value(&self, key: &str) -> Result<Option<Value>, TaskError> {
        match self.store.get(key) {
            Ok(bytes) => serde_json::from_slice(&bytes).map(Some).map_err(|e| {
                StoreError::Storage {
                    reason: format!("corrupt record `{key}`: {e}"),
                }
                .into()
            }),
            Err(StoreError::NotFound { .. }) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

/// Serialize tasks and settings into a pretty-printed export document.
pub fn export_all(
    tasks: &[Task],
    settings: &Settings,
    now: DateTime<Utc>,
) -> Result<String, TaskError> {
    let document = ExportDocument {
        todos: tasks.to_vec(),
        settings: settings.clone(),
        export_date: now,
        version: EXPORT_VERSION.to_string(),
    };
    serde_json::to_string_pretty(&document).map_err(|e| TaskError::Format {
        reason: format!("encode export: {e}"),
    })
}

/// Parse an export document and return its repaired tasks.
///
/// Anything without a top-level `todos` array is rejected.
pub fn import_all(blob: &str, clock: &dyn Clock) -> Result<Vec<Task>, TaskError> {
    let document: Value = serde_json::from_str(blob).map_err(|e| TaskError::Format {
        reason: format!("not valid JSON: {e}"),
    })?;
    let records = document
        .get("todos")
        .and_then(Value::as_array)
        .ok_or_else(|| TaskError::Format {
            reason: "missing `todos` array".to_string(),
        })?;
    Ok(repair_tasks(records, clock))
}

/// Turn loosely-shaped records into valid tasks.
///
/// Ids that are missing, repeat an earlier record or equal `u64::MAX` get
/// fresh ids above the highest valid one. Records without usable text are
/// dropped, as are records left over once the id space runs out.
pub fn repair_tasks(records: &[Value], clock: &dyn Clock) -> Vec<Task> {
    let mut next_id = records
        .iter()
        .filter_map(record_id)
        .max()
        .map_or(1, |max| max + 1);
    let mut seen = HashSet::new();
    let mut tasks = Vec::with_capacity(records.len());

    for (index, record) in records.iter().enumerate() {
        let Some(fields) = record.as_object() else {
            warn!(index, "skipping non-object task record");
            continue;
        };
        let Some(text) = text_field(fields) else {
            warn!(index, "skipping task record without text");
            continue;
        };

        let id = match record_id(record) {
            Some(id) if seen.insert(id) => id,
            original => {
                if next_id == u64::MAX {
                    warn!(index, "no task ids left; skipping record");
                    continue;
                }
                let id = next_id;
                next_id += 1;
                seen.insert(id);
                debug!(index, ?original, id, "assigned id to task record");
                id
            }
        };

        tasks.push(Task {
            id,
            text,
            completed: fields
                .get("completed")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            date: date_field(fields, "date").unwrap_or_else(|| clock.today()),
            category: fields
                .get("category")
                .and_then(Value::as_str)
                .and_then(|c| c.parse().ok())
                .unwrap_or_default(),
            priority: fields
                .get("priority")
                .and_then(priority_field)
                .unwrap_or_default(),
            due_date: date_field(fields, "dueDate"),
            created_at: fields
                .get("createdAt")
                .and_then(Value::as_str)
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|ts| ts.with_timezone(&Utc))
                .unwrap_or_else(|| clock.now()),
            order: fields
                .get("order")
                .and_then(Value::as_u64)
                .unwrap_or(index as u64),
        });
    }
    tasks
}

/// Ids at `u64::MAX` are treated as missing so the counter can always move past them.
fn record_id(record: &Value) -> Option<u64> {
    record
        .get("id")
        .and_then(Value::as_u64)
        .filter(|&id| id != u64::MAX)
}

fn text_field(fields: &Map<String, Value>) -> Option<String> {
    let text = fields.get("text")?.as_str()?.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Accepts `YYYY-MM-DD`, optionally followed by a time part.
fn date_field(fields: &Map<String, Value>, name: &str) -> Option<NaiveDate> {
    let raw = fields.get(name)?.as_str()?.trim();
    let day = raw.split('T').next().unwrap_or(raw);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

fn priority_field(value: &Value) -> Option<Priority> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u8::try_from(n).ok())?.try_into().ok(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;
    use daybook_core::{
        clock::FixedClock,
        storage::InMemoryKvStore,
        tasks::{Category, NewTask, TaskStore},
    };
    use daybook_storage::JsonFileStore;
    use serde_json::json;

    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn sample_tasks(clock: &FixedClock) -> Vec<Task> {
        let mut store = TaskStore::new();
        store
            .create(
                NewTask::new("Buy milk")
                    .category(Category::Shopping)
                    .due(day(2024, 3, 12)),
                clock,
            )
            .expect("create");
        clock.advance(TimeDelta::milliseconds(1500));
        store
            .create(NewTask::new("Call mom").priority(Priority::High), clock)
            .expect("create");
        store.toggle_completed(2).expect("toggle");
        store.all().to_vec()
    }

    #[test]
    fn save_then_load_round_trips() {
        let clock = FixedClock::on(day(2024, 3, 10));
        let persistence = TaskPersistence::new(InMemoryKvStore::new());
        let tasks = sample_tasks(&clock);

        persistence.save_tasks(&tasks).expect("save");
        let loaded = persistence.load_tasks(&clock).expect("load");
        assert_eq!(loaded, tasks);
    }

    #[test]
    fn round_trips_through_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let clock = FixedClock::on(day(2024, 3, 10));
        let tasks = sample_tasks(&clock);

        TaskPersistence::new(JsonFileStore::new(dir.path()))
            .save_tasks(&tasks)
            .expect("save");
        let reopened = TaskPersistence::new(JsonFileStore::new(dir.path()));
        assert_eq!(reopened.load_tasks(&clock).expect("load"), tasks);
    }

    #[test]
    fn empty_store_loads_defaults() {
        let clock = FixedClock::on(day(2024, 3, 10));
        let persistence = TaskPersistence::new(InMemoryKvStore::new());

        assert!(persistence.load_tasks(&clock).expect("load").is_empty());
        assert_eq!(
            persistence.load_settings().expect("settings"),
            Settings::default()
        );
        assert_eq!(persistence.load_backup(&clock).expect("backup"), None);
    }

    #[test]
    fn repairs_missing_fields_on_load() {
        let clock = FixedClock::on(day(2024, 3, 10));
        let store = InMemoryKvStore::new();
        let raw = json!([
            {"id": 4, "text": "has id", "date": "2024-03-01", "category": "work", "priority": 3, "order": 7},
            {"text": "  no id  ", "dueDate": ""},
            {"id": 4, "text": "duplicate id", "category": "gardening", "priority": 9},
            {"id": 9, "text": "   "},
            "not an object",
            {"text": "legacy", "priority": "1", "date": "2024-02-02T10:00:00.000Z", "completed": true}
        ]);
        store.put(TASKS_KEY, raw.to_string().as_bytes()).expect("seed");

        let tasks = TaskPersistence::new(store).load_tasks(&clock).expect("load");

        assert_eq!(tasks.len(), 4);
        let ids: Vec<u64> = tasks.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![4, 10, 11, 12]);

        assert_eq!(tasks[0].category, Category::Work);
        assert_eq!(tasks[0].priority, Priority::High);
        assert_eq!(tasks[0].order, 7);

        assert_eq!(tasks[1].text, "no id");
        assert_eq!(tasks[1].date, day(2024, 3, 10));
        assert_eq!(tasks[1].due_date, None);
        assert_eq!(tasks[1].category, Category::Personal);
        assert_eq!(tasks[1].priority, Priority::Medium);
        assert_eq!(tasks[1].order, 1);
        assert_eq!(tasks[1].created_at, clock.now());

        assert_eq!(tasks[2].category, Category::Personal);
        assert_eq!(tasks[2].priority, Priority::Medium);

        assert_eq!(tasks[3].priority, Priority::Low);
        assert_eq!(tasks[3].date, day(2024, 2, 2));
        assert!(tasks[3].completed);
    }

    #[test]
    fn corrupt_task_record_is_a_storage_error() {
        let clock = FixedClock::on(day(2024, 3, 10));
        let store = InMemoryKvStore::new();
        store.put(TASKS_KEY, b"{\"oops\":true}").expect("seed");

        let err = TaskPersistence::new(store)
            .load_tasks(&clock)
            .expect_err("object is not a task list");
        assert!(matches!(err, TaskError::Storage(StoreError::Storage { .. })));
    }

    #[test]
    fn unreadable_settings_fall_back_to_defaults() {
        let store = InMemoryKvStore::new();
        store
            .put(SETTINGS_KEY, br#"{"currentView":"decade"}"#)
            .expect("seed");

        let settings = TaskPersistence::new(store).load_settings().expect("settings");
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn export_then_import_restores_tasks() {
        let clock = FixedClock::on(day(2024, 3, 10));
        let tasks = sample_tasks(&clock);
        let settings = Settings {
            is_dark_mode: true,
            ..Settings::default()
        };

        let blob = export_all(&tasks, &settings, clock.now()).expect("export");
        let document: ExportDocument = serde_json::from_str(&blob).expect("parse export");
        assert_eq!(document.version, EXPORT_VERSION);
        assert_eq!(document.settings, settings);
        assert_eq!(document.export_date, clock.now());

        let imported = import_all(&blob, &clock).expect("import");
        assert_eq!(imported, tasks);
    }

    #[test]
    fn import_requires_todos_array() {
        let clock = FixedClock::on(day(2024, 3, 10));
        for blob in [
            r#"{"tasks": []}"#,
            r#"{"todos": {"id": 1}}"#,
            "[]",
            "definitely not json",
        ] {
            let err = import_all(blob, &clock).expect_err("should reject");
            assert!(matches!(err, TaskError::Format { .. }), "accepted {blob}");
        }
    }

    #[test]
    fn largest_ids_are_reassigned_or_dropped() {
        let clock = FixedClock::on(day(2024, 3, 10));
        let blob = r#"{"todos":[{"id":18446744073709551615,"text":"a"},{"text":"b"}]}"#;
        let imported = import_all(blob, &clock).expect("import");
        let ids: Vec<u64> = imported.iter().map(|t| t.id).collect();
        assert_eq!(ids, [1, 2]);

        let records = [
            json!({"id": u64::MAX - 1, "text": "last"}),
            json!({"text": "no room"}),
        ];
        let repaired = repair_tasks(&records, &clock);
        assert_eq!(repaired.len(), 1);
        assert_eq!(repaired[0].id, u64::MAX - 1);
        assert_eq!(TaskStore::with_tasks(repaired).peek_next_id(), u64::MAX);
    }
}
