use chrono::NaiveDate;
use daybook_core::{
    calendar::{self, CalendarState, DayCell, Granularity, GridDay, MonthGrid},
    clock::Clock,
    events::{Listener, TaskEvent},
    filter::{self, Filters},
    settings::Settings,
    stats::Stats,
    storage::KvStore,
    tasks::{NewTask, Task, TaskError, TaskPatch, TaskStore},
};
use tracing::{debug, info, warn};

use crate::persistence::{self, TaskPersistence};

/// Application state: tasks, calendar position, preferences and persistence.
///
/// Every mutation goes through a method here. Writes are synchronous and
/// best-effort: after the first failed write the planner stops writing and
/// keeps working in memory for the rest of the session.
pub struct Planner<S: KvStore> {
    tasks: TaskStore,
    calendar: CalendarState,
    settings: Settings,
    persistence: TaskPersistence<S>,
    clock: Box<dyn Clock>,
    listeners: Vec<Listener>,
    storage_error: Option<String>,
    backup: Option<Vec<Task>>,
}

impl<S: KvStore> Planner<S> {
    /// Load tasks and settings. A failed read leaves the planner empty and memory-only
    /// so the unreadable record is never overwritten.
    pub fn open(store: S, clock: impl Clock + 'static) -> Self {
        let persistence = TaskPersistence::new(store);
        let mut storage_error = None;

        let tasks = persistence.load_tasks(&clock).unwrap_or_else(|err| {
            warn!(%err, "could not load tasks; continuing in memory only");
            storage_error = Some(err.to_string());
            Vec::new()
        });
        let settings = persistence.load_settings().unwrap_or_else(|err| {
            warn!(%err, "could not load settings; using defaults");
            storage_error.get_or_insert_with(|| err.to_string());
            Settings::default()
        });

        info!(tasks = tasks.len(), view = %settings.current_view, "opened planner");
        Self {
            tasks: TaskStore::with_tasks(tasks),
            calendar: CalendarState::new(clock.today(), settings.current_view),
            settings,
            persistence,
            clock: Box::new(clock),
            listeners: Vec::new(),
            storage_error,
            backup: None,
        }
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&TaskEvent) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Set once a read or write failed; the session is memory-only from then on.
    pub fn storage_error(&self) -> Option<&str> {
        self.storage_error.as_deref()
    }

    pub fn tasks(&self) -> &[Task] {
        self.tasks.all()
    }

    pub fn get(&self, id: u64) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn calendar(&self) -> &CalendarState {
        &self.calendar
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    /// Create a task. Without an explicit date it lands on the selected day, or today.
    pub fn add(&mut self, mut draft: NewTask) -> Result<Task, TaskError> {
        if draft.date.is_none() {
            draft.date = Some(self.calendar.selected.unwrap_or_else(|| self.clock.today()));
        }
        let task = self.tasks.create(draft, self.clock.as_ref())?;
        self.save_tasks();
        self.emit(TaskEvent::Created { id: task.id });
        Ok(task)
    }

    pub fn update(&mut self, id: u64, patch: TaskPatch) -> Result<Task, TaskError> {
        let task = self.tasks.update(id, patch)?;
        self.save_tasks();
        self.emit(TaskEvent::Updated { id });
        Ok(task)
    }

    pub fn edit_text(&mut self, id: u64, text: &str) -> Result<Task, TaskError> {
        let task = self.tasks.edit_text(id, text)?;
        self.save_tasks();
        self.emit(TaskEvent::Updated { id });
        Ok(task)
    }

    pub fn toggle(&mut self, id: u64) -> Result<Task, TaskError> {
        let task = self.tasks.toggle_completed(id)?;
        self.save_tasks();
        self.emit(if task.completed {
            TaskEvent::Completed { id }
        } else {
            TaskEvent::Reopened { id }
        });
        Ok(task)
    }

    /// Delete a task; unknown ids are ignored.
    pub fn delete(&mut self, id: u64) -> Option<Task> {
        let removed = self.tasks.delete(id)?;
        self.save_tasks();
        self.emit(TaskEvent::Deleted { id });
        Some(removed)
    }

    pub fn reorder(&mut self, id: u64, new_index: usize) -> Result<(), TaskError> {
        self.tasks.reorder(id, new_index)?;
        self.save_tasks();
        self.emit(TaskEvent::Updated { id });
        Ok(())
    }

    /// Tasks for the selected day (if any) under the saved filters.
    pub fn visible_tasks(&self) -> Vec<Task> {
        self.view_with(&self.settings.current_filters)
    }

    /// Like [`Planner::visible_tasks`] with one-off filters that are not saved.
    pub fn view_with(&self, filters: &Filters) -> Vec<Task> {
        filter::visible_tasks(
            self.tasks.all(),
            self.calendar.selected,
            filters,
            self.clock.today(),
        )
    }

    pub fn stats(&self) -> Stats {
        Stats::compute(self.tasks.all(), self.clock.today())
    }

    pub fn period_title(&self) -> String {
        calendar::period_title(self.calendar.anchor, self.calendar.granularity)
    }

    pub fn week(&self) -> [NaiveDate; calendar::DAYS_PER_WEEK] {
        calendar::generate_week(self.calendar.anchor)
    }

    pub fn month_grid(&self) -> MonthGrid {
        calendar::generate_month_grid(self.calendar.anchor)
    }

    pub fn year_grid(&self) -> Vec<MonthGrid> {
        calendar::generate_year_grid(self.calendar.anchor)
    }

    pub fn week_cells(&self) -> Vec<DayCell> {
        let days = self.week().map(|date| GridDay {
            date,
            other_month: false,
        });
        self.mark(days)
    }

    pub fn month_cells(&self, grid: &MonthGrid) -> Vec<DayCell> {
        self.mark(grid.days.iter().copied())
    }

    /// Cells for whatever the current view shows; the year view yields twelve grids back to back.
    pub fn day_cells(&self) -> Vec<DayCell> {
        match self.calendar.granularity {
            Granularity::Week => self.week_cells(),
            Granularity::Month => self.month_cells(&self.month_grid()),
            Granularity::Year => self
                .year_grid()
                .iter()
                .flat_map(|grid| self.month_cells(grid))
                .collect(),
        }
    }

    fn mark(&self, days: impl IntoIterator<Item = GridDay>) -> Vec<DayCell> {
        calendar::mark_days(
            days,
            self.clock.today(),
            self.calendar.selected,
            self.tasks.all(),
        )
    }

    /// Narrow the list to `date`; choosing the selected day again clears the selection.
    pub fn select_date(&mut self, date: NaiveDate) -> Option<NaiveDate> {
        self.calendar.selected = if self.calendar.selected == Some(date) {
            None
        } else {
            Some(date)
        };
        debug!(selected = ?self.calendar.selected, "selection changed");
        self.calendar.selected
    }

    pub fn clear_selection(&mut self) {
        self.calendar.selected = None;
    }

    pub fn go_to_today(&mut self) {
        self.calendar.anchor = self.clock.today();
        self.calendar.selected = None;
    }

    pub fn set_anchor(&mut self, anchor: NaiveDate) {
        self.calendar.anchor = anchor;
    }

    pub fn navigate(&mut self, direction: i32) -> NaiveDate {
        self.calendar.anchor =
            calendar::navigate(self.calendar.anchor, self.calendar.granularity, direction);
        self.calendar.anchor
    }

    pub fn switch_view(&mut self, granularity: Granularity) {
        self.calendar.granularity = granularity;
        self.settings.current_view = granularity;
        self.save_settings();
    }

    pub fn set_filters(&mut self, filters: Filters) {
        self.settings.current_filters = filters;
        self.save_settings();
    }

    pub fn set_search(&mut self, query: &str) {
        self.settings.current_filters.search = query.trim().to_lowercase();
        self.save_settings();
    }

    pub fn toggle_dark_mode(&mut self) -> bool {
        self.settings.is_dark_mode = !self.settings.is_dark_mode;
        self.save_settings();
        self.settings.is_dark_mode
    }

    pub fn export(&self) -> Result<String, TaskError> {
        persistence::export_all(self.tasks.all(), &self.settings, self.clock.now())
    }

    /// Replace the collection with an export document's tasks.
    ///
    /// The current collection is backed up first. A malformed document is
    /// rejected before anything changes.
    pub fn import(&mut self, blob: &str) -> Result<usize, TaskError> {
        let imported = persistence::import_all(blob, self.clock.as_ref())?;
        let count = imported.len();

        let current = self.tasks.all().to_vec();
        if self.storage_error.is_none() {
            if let Err(err) = self.persistence.save_backup(&current) {
                self.degrade(err);
            }
        }
        self.backup = Some(current);

        self.tasks.replace_all(imported);
        self.save_tasks();
        info!(count, "imported tasks");
        self.emit(TaskEvent::Imported { count });
        Ok(count)
    }

    /// Put back the collection saved by the last import. Returns `None` if there is none.
    pub fn restore_backup(&mut self) -> Result<Option<usize>, TaskError> {
        let backup = match self.backup.take() {
            Some(tasks) => Some(tasks),
            None => self.persistence.load_backup(self.clock.as_ref())?,
        };
        let Some(tasks) = backup else {
            return Ok(None);
        };

        let count = tasks.len();
        self.tasks.replace_all(tasks);
        self.save_tasks();
        if self.storage_error.is_none() {
            if let Err(err) = self.persistence.clear_backup() {
                self.degrade(err);
            }
        }
        info!(count, "restored backup");
        self.emit(TaskEvent::Restored { count });
        Ok(Some(count))
    }

    fn save_tasks(&mut self) {
        if self.storage_error.is_some() {
            return;
        }
        if let Err(err) = self.persistence.save_tasks(self.tasks.all()) {
            self.degrade(err);
        }
    }

    fn save_settings(&mut self) {
        if self.storage_error.is_some() {
            return;
        }
        if let Err(err) = self.persistence.save_settings(&self.settings) {
            self.degrade(err);
        }
    }

    fn degrade(&mut self, err: TaskError) {
        warn!(%err, "persistence failed; continuing in memory only");
        let reason = err.to_string();
        self.storage_error = Some(reason.clone());
        self.emit(TaskEvent::StorageFailed { reason });
    }

    fn emit(&mut self, event: TaskEvent) {
        for listener in &mut self.listeners {
            listener(&event);
        }
    }
}
