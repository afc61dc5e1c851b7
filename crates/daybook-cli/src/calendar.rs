use std::fmt::Write as _;

use chrono::{Datelike, NaiveDate};
use daybook_core::{
    calendar::{weekday_label, DayCell, Granularity, MonthGrid, DAYS_PER_WEEK},
    storage::KvStore,
};
use daybook_task::Planner;

use crate::{cli::CalendarArgs, config, storage};

const WEEKDAY_HEADER: [&str; DAYS_PER_WEEK] = ["Su", "Mo", "Tu", "We", "Th", "Fr", "Sa"];

/// Print the requested period. A `--view` switch is remembered like in the TUI.
pub fn handle(args: CalendarArgs, config: &config::Config) -> color_eyre::Result<()> {
    let mut planner = crate::open_planner(storage::store_from_config(config)?);
    if let Some(view) = args.view {
        if view != planner.calendar().granularity {
            planner.switch_view(view);
        }
    }
    if let Some(at) = args.at {
        planner.set_anchor(at);
    }
    if args.offset != 0 {
        planner.navigate(args.offset);
    }
    print!("{}", render(&planner));
    Ok(())
}

/// Text rendering of the planner's current period.
pub fn render<S: KvStore>(planner: &Planner<S>) -> String {
    let mut out = format!("{}\n", planner.period_title());
    match planner.calendar().granularity {
        Granularity::Week => out.push_str(&render_week(&planner.week_cells())),
        Granularity::Month => {
            let grid = planner.month_grid();
            out.push_str(&render_month(&planner.month_cells(&grid)));
        }
        Granularity::Year => {
            for grid in planner.year_grid() {
                out.push('\n');
                out.push_str(&month_heading(&grid));
                out.push_str(&render_month(&planner.month_cells(&grid)));
            }
        }
    }
    out.push_str("\n[today] (selected) * has tasks\n");
    out
}

/// One line per day.
pub fn render_week(cells: &[DayCell]) -> String {
    let mut out = String::new();
    for cell in cells {
        let _ = writeln!(
            out,
            "{} {} {}{}",
            weekday_label(cell.date),
            cell.date.format("%b"),
            day_marker(cell),
            if cell.has_tasks { " *" } else { "" }
        );
    }
    out
}

/// Six rows of seven cells; days of neighbouring months are left blank.
pub fn render_month(cells: &[DayCell]) -> String {
    let mut out = String::new();
    for label in WEEKDAY_HEADER {
        let _ = write!(out, "{label:^5}");
    }
    out.push('\n');
    for row in cells.chunks(DAYS_PER_WEEK) {
        let line: String = row.iter().map(month_cell).collect();
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

fn month_heading(grid: &MonthGrid) -> String {
    let first = NaiveDate::from_ymd_opt(grid.year, grid.month, 1);
    match first {
        Some(date) => format!("{}\n", date.format("%B")),
        None => format!("{}\n", grid.month),
    }
}

fn month_cell(cell: &DayCell) -> String {
    if cell.other_month {
        return " ".repeat(5);
    }
    format!("{}{}", day_marker(cell), if cell.has_tasks { '*' } else { ' ' })
}

fn day_marker(cell: &DayCell) -> String {
    let (open, close) = if cell.today {
        ('[', ']')
    } else if cell.selected {
        ('(', ')')
    } else {
        (' ', ' ')
    };
    format!("{open}{:>2}{close}", cell.date.day())
}
