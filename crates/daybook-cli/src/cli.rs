use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use daybook_core::{
    calendar::Granularity,
    filter::{SortKey, StatusFilter},
    tasks::{Category, Priority},
};

/// CLI surface definition. Running without a subcommand opens the TUI.
#[derive(Parser, Debug)]
#[command(
    name = "daybook",
    about = "Local task planner with a calendar view",
    version,
    propagate_version = true
)]
pub struct Cli {
    /// Optional subcommand; defaults to launching the TUI when absent.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Launch the interactive TUI (press q or Esc to exit).
    Tui,
    /// Print version and exit.
    Version,
    /// Check that the data directory can be written and read back.
    Health,
    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Create, list and change tasks.
    #[command(subcommand)]
    Task(TaskCommand),
    /// Print the calendar for the current or an offset period.
    Calendar(CalendarArgs),
    /// Show completion counters and the current streak.
    Stats,
    /// Write all tasks and settings as a JSON document.
    Export {
        /// Destination file; prints to stdout when omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Replace all tasks with the ones in an exported document.
    Import { path: PathBuf },
    /// Undo the last import.
    Restore,
    /// Toggle dark mode.
    Theme,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a default config file if one does not exist.
    Init,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum TaskCommand {
    /// Add a task; it is scheduled for today unless --date is given.
    Add {
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(short, long)]
        category: Option<Category>,
        #[arg(short, long)]
        priority: Option<Priority>,
        #[arg(long)]
        due: Option<NaiveDate>,
    },
    /// List tasks under the saved filters, or the ones given here.
    List(ListArgs),
    /// Toggle a task between done and open.
    Done { id: u64 },
    /// Replace a task's text.
    Edit {
        id: u64,
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    /// Reschedule a task or change its category, priority or deadline.
    Update {
        id: u64,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(short, long)]
        category: Option<Category>,
        #[arg(short, long)]
        priority: Option<Priority>,
        #[arg(long, conflicts_with = "clear_due")]
        due: Option<NaiveDate>,
        /// Remove the deadline.
        #[arg(long)]
        clear_due: bool,
    },
    /// Delete a task.
    Delete { id: u64 },
    /// Move a task to a position in the manual order.
    Move { id: u64, index: usize },
}

#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct ListArgs {
    #[arg(short, long)]
    pub search: Option<String>,
    #[arg(short, long)]
    pub category: Option<Category>,
    #[arg(long)]
    pub status: Option<StatusFilter>,
    #[arg(long)]
    pub sort: Option<SortKey>,
    /// Only tasks scheduled on this day.
    #[arg(long)]
    pub date: Option<NaiveDate>,
    /// Keep the given filters as the new defaults.
    #[arg(long)]
    pub save: bool,
}

impl ListArgs {
    pub fn has_filters(&self) -> bool {
        self.search.is_some()
            || self.category.is_some()
            || self.status.is_some()
            || self.sort.is_some()
    }
}

#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct CalendarArgs {
    /// week, month or year; defaults to the saved view.
    #[arg(long)]
    pub view: Option<Granularity>,
    /// Day the view is centred on; defaults to today.
    #[arg(long)]
    pub at: Option<NaiveDate>,
    /// Periods to move forward (or back, when negative).
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub offset: i32,
}
