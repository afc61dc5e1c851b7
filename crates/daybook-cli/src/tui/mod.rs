use std::{cell::RefCell, io, rc::Rc, time::Duration};

use chrono::Datelike;
use color_eyre::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use daybook_core::{
    calendar::{weekday_label, DayCell, Granularity, DAYS_PER_WEEK},
    events::TaskEvent,
    filter::{Filters, SortKey, StatusFilter},
    storage::KvStore,
    tasks::{NewTask, Task},
};
use daybook_task::Planner;
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, List, ListItem, ListState, Paragraph},
    Frame, Terminal,
};

const MONTH_LABELS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

const SORT_CYCLE: [SortKey; 5] = [
    SortKey::Date,
    SortKey::Priority,
    SortKey::Category,
    SortKey::DueDate,
    SortKey::Manual,
];

/// Interactive planner: a calendar strip over the visible task list.
/// Press `q` or `Esc` to exit.
pub fn launch<S: KvStore>(planner: &mut Planner<S>) -> Result<()> {
    // Guard restores the terminal even if we early-return.
    let guard = TerminalGuard::enter()?;
    let mut terminal = guard.terminal()?;
    let mut app = App::new(planner);

    while !app.quit {
        terminal.draw(|frame| app.draw(frame))?;

        if event::poll(Duration::from_millis(150))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    app.handle_key(key);
                }
            }
        }
    }

    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Mode {
    Normal,
    Adding(String),
    Searching(String),
}

struct App<'a, S: KvStore> {
    planner: &'a mut Planner<S>,
    list: ListState,
    mode: Mode,
    notice: Rc<RefCell<Option<String>>>,
    quit: bool,
}

impl<'a, S: KvStore> App<'a, S> {
    fn new(planner: &'a mut Planner<S>) -> Self {
        let notice = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&notice);
        planner.subscribe(move |event| {
            let message = match event {
                TaskEvent::Completed { .. } => "Nice work, task completed!".to_string(),
                TaskEvent::Deleted { id } => format!("Deleted task {id}"),
                TaskEvent::StorageFailed { reason } => {
                    format!("Saving failed ({reason}); changes stay in memory")
                }
                _ => return,
            };
            *sink.borrow_mut() = Some(message);
        });

        let mut list = ListState::default();
        list.select(Some(0));
        Self {
            planner,
            list,
            mode: Mode::Normal,
            notice,
            quit: false,
        }
    }

    fn visible(&self) -> Vec<Task> {
        self.planner.visible_tasks()
    }

    fn selected_task(&self) -> Option<Task> {
        let index = self.list.selected()?;
        self.visible().into_iter().nth(index)
    }

    fn notify(&self, message: impl Into<String>) {
        *self.notice.borrow_mut() = Some(message.into());
    }

    fn handle_key(&mut self, key: KeyEvent) {
        match std::mem::replace(&mut self.mode, Mode::Normal) {
            Mode::Normal => self.handle_normal(key),
            Mode::Adding(text) => self.mode = self.edit_input(key, text, true),
            Mode::Searching(text) => self.mode = self.edit_input(key, text, false),
        }
        self.clamp_selection();
    }

    fn handle_normal(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => self.quit = true,
            KeyCode::Down | KeyCode::Char('j') => self.move_selection(1),
            KeyCode::Up | KeyCode::Char('k') => self.move_selection(-1),
            KeyCode::Char(' ') => {
                if let Some(task) = self.selected_task() {
                    if let Err(err) = self.planner.toggle(task.id) {
                        self.notify(err.to_string());
                    }
                }
            }
            KeyCode::Char('x') | KeyCode::Delete => {
                if let Some(task) = self.selected_task() {
                    self.planner.delete(task.id);
                }
            }
            KeyCode::Char('J') => self.shift_manual_order(1),
            KeyCode::Char('K') => self.shift_manual_order(-1),
            KeyCode::Char('a') => self.mode = Mode::Adding(String::new()),
            KeyCode::Char('/') => {
                self.mode = Mode::Searching(self.planner.settings().current_filters.search.clone())
            }
            KeyCode::Left | KeyCode::Char('h') => {
                self.planner.navigate(-1);
            }
            KeyCode::Right | KeyCode::Char('l') => {
                self.planner.navigate(1);
            }
            KeyCode::Char('w') => self.planner.switch_view(Granularity::Week),
            KeyCode::Char('m') => self.planner.switch_view(Granularity::Month),
            KeyCode::Char('y') => self.planner.switch_view(Granularity::Year),
            KeyCode::Char('t') => self.planner.go_to_today(),
            KeyCode::Char('c') => self.planner.clear_selection(),
            KeyCode::Char(digit @ '1'..='7') => {
                let offset = digit as usize - '1' as usize;
                let date = self.planner.week()[offset];
                self.planner.select_date(date);
                self.list.select(Some(0));
            }
            KeyCode::Char('s') => {
                let mut filters = self.planner.settings().current_filters.clone();
                filters.sort = next_sort(filters.sort);
                self.notify(format!("Sorted by {}", filters.sort));
                self.planner.set_filters(filters);
            }
            KeyCode::Char('f') => {
                let mut filters = self.planner.settings().current_filters.clone();
                filters.status = next_status(filters.status);
                self.planner.set_filters(filters);
            }
            KeyCode::Char('d') => {
                self.planner.toggle_dark_mode();
            }
            _ => {}
        }
    }

    /// Line editor shared by the add and search prompts; returns the next mode.
    fn edit_input(&mut self, key: KeyEvent, mut text: String, adding: bool) -> Mode {
        match key.code {
            KeyCode::Esc => return Mode::Normal,
            KeyCode::Enter => {
                if adding {
                    match self.planner.add(NewTask::new(text)) {
                        Ok(task) => self.notify(format!("Added task {}", task.id)),
                        Err(err) => self.notify(err.to_string()),
                    }
                } else {
                    self.planner.set_search(&text);
                    self.list.select(Some(0));
                }
                return Mode::Normal;
            }
            KeyCode::Backspace => {
                text.pop();
            }
            KeyCode::Char(c) => text.push(c),
            _ => {}
        }
        if adding {
            Mode::Adding(text)
        } else {
            Mode::Searching(text)
        }
    }

    fn move_selection(&mut self, delta: isize) {
        let len = self.visible().len();
        if len == 0 {
            return;
        }
        let current = self.list.selected().unwrap_or(0) as isize;
        let next = (current + delta).clamp(0, len as isize - 1);
        self.list.select(Some(next as usize));
    }

    /// Move the selected task one step in the manual order and keep it selected.
    fn shift_manual_order(&mut self, delta: isize) {
        let Some(task) = self.selected_task() else {
            return;
        };
        let mut ranked: Vec<&Task> = self.planner.tasks().iter().collect();
        ranked.sort_by_key(|t| t.order);
        let Some(rank) = ranked.iter().position(|t| t.id == task.id) else {
            return;
        };
        let target = (rank as isize + delta).max(0) as usize;
        if let Err(err) = self.planner.reorder(task.id, target) {
            self.notify(err.to_string());
            return;
        }
        if let Some(index) = self.visible().iter().position(|t| t.id == task.id) {
            self.list.select(Some(index));
        }
    }

    fn clamp_selection(&mut self) {
        let len = self.visible().len();
        let selected = match self.list.selected() {
            _ if len == 0 => None,
            Some(index) => Some(index.min(len - 1)),
            None => Some(0),
        };
        self.list.select(selected);
    }

    fn draw(&mut self, frame: &mut Frame) {
        let palette = Palette::new(self.planner.settings().is_dark_mode);
        let calendar = self.calendar_lines(&palette);
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .margin(1)
            .constraints([
                Constraint::Length(3),
                Constraint::Length(calendar.len() as u16 + 2),
                Constraint::Min(1),
                Constraint::Length(3),
            ])
            .split(frame.area());

        let stats = self.planner.stats();
        let header = Paragraph::new(Line::from(vec![
            Span::styled(
                self.planner.period_title(),
                Style::default()
                    .fg(palette.accent)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::raw(format!(
                "  {}/{} done ({}%), {} overdue, streak {}",
                stats.completed,
                stats.total,
                stats.completion_percent,
                stats.overdue,
                stats.streak
            )),
        ]))
        .style(palette.base)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .title(Span::styled(
                    "Daybook",
                    Style::default()
                        .fg(Color::Green)
                        .add_modifier(Modifier::BOLD | Modifier::ITALIC),
                )),
        );
        frame.render_widget(header, chunks[0]);

        let strip = Paragraph::new(calendar)
            .style(palette.base)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(format!("View: {}", self.planner.calendar().granularity)),
            );
        frame.render_widget(strip, chunks[1]);

        let today = self.planner.today();
        let items: Vec<ListItem> = self
            .visible()
            .iter()
            .map(|task| task_item(task, task.is_overdue(today), &palette))
            .collect();
        let filters = &self.planner.settings().current_filters;
        let body = List::new(items)
            .style(palette.base)
            .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(list_title(filters, self.planner.calendar().selected)),
            );
        frame.render_stateful_widget(body, chunks[2], &mut self.list);

        let footer = Paragraph::new(self.footer_line(&palette))
            .style(palette.base)
            .block(Block::default().borders(Borders::ALL).title("Controls"));
        frame.render_widget(footer, chunks[3]);
    }

    /// Week strip, month grid or a row of months, following the current view.
    fn calendar_lines(&self, palette: &Palette) -> Vec<Line<'static>> {
        match self.planner.calendar().granularity {
            Granularity::Week => week_lines(&self.planner.day_cells(), palette),
            Granularity::Month => month_lines(&self.planner.day_cells(), palette),
            Granularity::Year => {
                let anchor_month = self.planner.calendar().anchor.month();
                let months = self
                    .planner
                    .year_grid()
                    .iter()
                    .map(|grid| {
                        let busy = self
                            .planner
                            .month_cells(grid)
                            .iter()
                            .any(|cell| !cell.other_month && cell.has_tasks);
                        let mut style = Style::default();
                        if grid.month == anchor_month {
                            style = style.fg(palette.accent).add_modifier(Modifier::BOLD);
                        }
                        let name = MONTH_LABELS[grid.month as usize - 1];
                        let marker = if busy { "*" } else { " " };
                        Span::styled(format!("{name}{marker} "), style)
                    })
                    .collect::<Vec<_>>();
                vec![Line::from(months)]
            }
        }
    }

    fn footer_line(&self, palette: &Palette) -> Line<'static> {
        let key = |k: &'static str| Span::styled(k, Style::default().fg(palette.accent));
        match &self.mode {
            Mode::Adding(text) => Line::from(vec![key("New task: "), Span::raw(format!("{text}_"))]),
            Mode::Searching(text) => Line::from(vec![key("Search: "), Span::raw(format!("{text}_"))]),
            Mode::Normal => {
                if let Some(message) = self.notice.borrow().as_ref() {
                    return Line::from(Span::raw(message.clone()));
                }
                Line::from(vec![
                    key("a"),
                    Span::raw(" add  "),
                    key("space"),
                    Span::raw(" done  "),
                    key("x"),
                    Span::raw(" delete  "),
                    key("1-7"),
                    Span::raw(" day  "),
                    key("h/l"),
                    Span::raw(" prev/next  "),
                    key("w/m/y"),
                    Span::raw(" view  "),
                    key("/ s f"),
                    Span::raw(" search/sort/status  "),
                    key("q"),
                    Span::raw(" quit"),
                ])
            }
        }
    }
}

struct Palette {
    base: Style,
    accent: Color,
    muted: Color,
}

impl Palette {
    fn new(dark: bool) -> Self {
        if dark {
            Self {
                base: Style::default().fg(Color::Gray).bg(Color::Black),
                accent: Color::Cyan,
                muted: Color::DarkGray,
            }
        } else {
            Self {
                base: Style::default(),
                accent: Color::Blue,
                muted: Color::Gray,
            }
        }
    }
}

fn cell_span(cell: &DayCell, palette: &Palette) -> Span<'static> {
    if cell.other_month {
        return Span::raw(" ".repeat(7));
    }
    let mut style = Style::default();
    if cell.weekend {
        style = style.fg(palette.muted);
    }
    if cell.today {
        style = style.fg(palette.accent).add_modifier(Modifier::BOLD);
    }
    if cell.selected {
        style = style.add_modifier(Modifier::REVERSED);
    }
    let marker = if cell.has_tasks { "*" } else { " " };
    Span::styled(
        format!("{:^7}", format!("{}{marker}", cell.date.format("%-d"))),
        style,
    )
}

fn week_lines(cells: &[DayCell], palette: &Palette) -> Vec<Line<'static>> {
    let labels: Vec<Span> = cells
        .iter()
        .map(|cell| Span::raw(format!("{:^7}", weekday_label(cell.date))))
        .collect();
    let days: Vec<Span> = cells.iter().map(|cell| cell_span(cell, palette)).collect();
    vec![Line::from(labels), Line::from(days)]
}

fn month_lines(cells: &[DayCell], palette: &Palette) -> Vec<Line<'static>> {
    let labels: Vec<Span> = cells
        .iter()
        .take(DAYS_PER_WEEK)
        .map(|cell| Span::raw(format!("{:^7}", weekday_label(cell.date))))
        .collect();
    let mut lines = vec![Line::from(labels)];
    for week in cells.chunks(DAYS_PER_WEEK) {
        let days: Vec<Span> = week.iter().map(|cell| cell_span(cell, palette)).collect();
        lines.push(Line::from(days));
    }
    lines
}

fn task_item(task: &Task, overdue: bool, palette: &Palette) -> ListItem<'static> {
    let check = if task.completed { "[x]" } else { "[ ]" };
    let mut text_style = Style::default().add_modifier(Modifier::BOLD);
    if task.completed {
        text_style = Style::default()
            .fg(palette.muted)
            .add_modifier(Modifier::CROSSED_OUT);
    }
    let mut line = vec![
        Span::raw(format!("{check} ")),
        Span::styled(task.text.clone(), text_style),
        Span::raw(format!("  {} · {}", task.category, task.priority)),
    ];
    if let Some(due) = task.due_date {
        let style = if overdue {
            Style::default().fg(Color::Red)
        } else {
            Style::default()
        };
        line.push(Span::styled(format!("  due {due}"), style));
    }
    ListItem::new(Line::from(line))
}

fn list_title(filters: &Filters, selected: Option<chrono::NaiveDate>) -> String {
    let mut title = match selected {
        Some(date) => format!("Tasks on {date}"),
        None => "All tasks".to_string(),
    };
    if !filters.search.is_empty() {
        title.push_str(&format!(" matching \"{}\"", filters.search));
    }
    if let Some(status) = filters.status {
        title.push_str(&format!(" [{status}]"));
    }
    title.push_str(&format!(" sorted by {}", filters.sort));
    title
}

fn next_sort(current: SortKey) -> SortKey {
    let index = SORT_CYCLE.iter().position(|k| *k == current).unwrap_or(0);
    SORT_CYCLE[(index + 1) % SORT_CYCLE.len()]
}

fn next_status(current: Option<StatusFilter>) -> Option<StatusFilter> {
    match current {
        None => Some(StatusFilter::Pending),
        Some(StatusFilter::Pending) => Some(StatusFilter::Completed),
        Some(StatusFilter::Completed) => Some(StatusFilter::Overdue),
        Some(StatusFilter::Overdue) => None,
    }
}

struct TerminalGuard;

impl TerminalGuard {
    fn enter() -> Result<Self> {
        enable_raw_mode()?;
        execute!(io::stdout(), EnterAlternateScreen)?;
        Ok(Self)
    }

    fn terminal(&self) -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
        let backend = CrosstermBackend::new(io::stdout());
        Ok(Terminal::new(backend)?)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        // Errors can only be reported from Drop, not propagated.
        if let Err(err) = disable_raw_mode() {
            eprintln!("failed to disable raw mode: {err}");
        }
        if let Err(err) = execute!(io::stdout(), LeaveAlternateScreen) {
            eprintln!("failed to restore terminal: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use crossterm::event::KeyModifiers;
    use daybook_core::{clock::FixedClock, storage::InMemoryKvStore};

    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn press(app: &mut App<'_, InMemoryKvStore>, keys: &str) {
        for c in keys.chars() {
            app.handle_key(KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE));
        }
    }

    fn code(app: &mut App<'_, InMemoryKvStore>, code: KeyCode) {
        app.handle_key(KeyEvent::new(code, KeyModifiers::NONE));
    }

    fn planner() -> Planner<InMemoryKvStore> {
        Planner::open(InMemoryKvStore::new(), FixedClock::on(day(2024, 3, 13)))
    }

    #[test]
    fn adds_and_completes_a_task() {
        let mut planner = planner();
        let mut app = App::new(&mut planner);

        press(&mut app, "aBuy milk");
        code(&mut app, KeyCode::Enter);
        assert_eq!(app.mode, Mode::Normal);
        assert_eq!(app.visible().len(), 1);

        press(&mut app, " ");
        assert!(app.visible()[0].completed);
        assert_eq!(
            app.notice.borrow().as_deref(),
            Some("Nice work, task completed!")
        );

        press(&mut app, "q");
        assert!(app.quit);
    }

    #[test]
    fn escape_cancels_add_and_blank_text_is_rejected() {
        let mut planner = planner();
        let mut app = App::new(&mut planner);

        press(&mut app, "adraft");
        code(&mut app, KeyCode::Esc);
        assert!(!app.quit);
        assert!(app.visible().is_empty());

        press(&mut app, "a   ");
        code(&mut app, KeyCode::Enter);
        assert!(app.visible().is_empty());
        assert_eq!(
            app.notice.borrow().as_deref(),
            Some("task text must not be empty")
        );
    }

    #[test]
    fn digits_select_days_of_the_week() {
        let mut planner = planner();
        planner
            .add(NewTask::new("Yoga").on(day(2024, 3, 15)))
            .expect("add");
        planner.add(NewTask::new("Groceries")).expect("add");
        let mut app = App::new(&mut planner);

        press(&mut app, "6");
        assert_eq!(app.planner.calendar().selected, Some(day(2024, 3, 15)));
        assert_eq!(app.visible().len(), 1);

        press(&mut app, "6");
        assert_eq!(app.planner.calendar().selected, None);
        assert_eq!(app.visible().len(), 2);
    }

    #[test]
    fn view_navigation_and_preferences() {
        let mut planner = planner();
        let mut app = App::new(&mut planner);

        press(&mut app, "ml");
        assert_eq!(app.planner.calendar().granularity, Granularity::Month);
        assert_eq!(app.planner.calendar().anchor, day(2024, 4, 13));

        press(&mut app, "tsfd");
        assert_eq!(app.planner.calendar().anchor, day(2024, 3, 13));
        let settings = app.planner.settings();
        assert_eq!(settings.current_filters.sort, SortKey::Priority);
        assert_eq!(settings.current_filters.status, Some(StatusFilter::Pending));
        assert!(settings.is_dark_mode);
    }

    #[test]
    fn search_prompt_saves_query_and_delete_removes_selection() {
        let mut planner = planner();
        planner.add(NewTask::new("Buy milk")).expect("add");
        planner.add(NewTask::new("Call mom")).expect("add");
        let mut app = App::new(&mut planner);

        press(&mut app, "/MILK");
        code(&mut app, KeyCode::Enter);
        assert_eq!(app.planner.settings().current_filters.search, "milk");
        assert_eq!(app.visible().len(), 1);

        press(&mut app, "x");
        assert!(app.visible().is_empty());
        assert_eq!(app.planner.tasks().len(), 1);
        assert_eq!(app.list.selected(), None);
    }

    #[test]
    fn shifting_manual_order_moves_the_task() {
        let mut planner = planner();
        for text in ["first", "second", "third"] {
            planner.add(NewTask::new(text)).expect("add");
        }
        planner.set_filters(Filters {
            sort: SortKey::Manual,
            ..Filters::default()
        });
        let mut app = App::new(&mut planner);

        press(&mut app, "J");
        let order: Vec<String> = app.visible().into_iter().map(|t| t.text).collect();
        assert_eq!(order, ["second", "first", "third"]);
        assert_eq!(app.list.selected(), Some(1));
    }

    #[test]
    fn calendar_follows_the_current_view() {
        let mut planner = planner();
        planner
            .add(NewTask::new("Yoga").on(day(2024, 3, 15)))
            .expect("add");
        let mut app = App::new(&mut planner);
        let palette = Palette::new(false);

        let week = app.calendar_lines(&palette);
        assert_eq!(week.len(), 2);
        assert_eq!(week[1].spans[5].content, "  15*  ");

        press(&mut app, "m");
        let month = app.calendar_lines(&palette);
        assert_eq!(month.len(), 7);
        assert_eq!(month[0].spans[0].content, "  Sun  ");
        // March 2024 opens on a Friday; February days stay blank.
        assert_eq!(month[1].spans[4].content, " ".repeat(7));
        assert_eq!(month[1].spans[5].content, "  1    ");

        press(&mut app, "l");
        let april = app.calendar_lines(&palette);
        assert_eq!(april[1].spans[1].content, "  1    ");

        press(&mut app, "y");
        let year = app.calendar_lines(&palette);
        assert_eq!(year.len(), 1);
        let labels: Vec<&str> = year[0].spans.iter().map(|s| s.content.as_ref()).collect();
        assert_eq!(labels.len(), 12);
        assert_eq!(labels[2], "Mar* ");
        assert_eq!(labels[3], "Apr  ");
    }

    #[test]
    fn cycles_wrap_around() {
        assert_eq!(next_sort(SortKey::Manual), SortKey::Date);
        assert_eq!(next_status(Some(StatusFilter::Overdue)), None);
    }
}
