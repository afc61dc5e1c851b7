use std::{fs, path::Path};

use color_eyre::Result;
use daybook_core::{
    filter::Filters,
    stats::Stats,
    storage::KvStore,
    tasks::{NewTask, Task, TaskPatch},
};
use daybook_task::Planner;
use tracing::debug;

use crate::{
    cli::{ListArgs, TaskCommand},
    config, storage,
};

/// Execute a task subcommand against the configured store.
pub fn handle(cmd: TaskCommand, config: &config::Config) -> Result<()> {
    let mut planner = crate::open_planner(storage::store_from_config(config)?);
    run(&mut planner, cmd, config)
}

fn run<S: KvStore>(
    planner: &mut Planner<S>,
    cmd: TaskCommand,
    config: &config::Config,
) -> Result<()> {
    match cmd {
        TaskCommand::List(args) => {
            let tasks = list(planner, args)?;
            if tasks.is_empty() {
                println!("No tasks yet. Add one with `daybook task add <text>`.");
                return Ok(());
            }
            let today = planner.today();
            for task in &tasks {
                println!("{}", task_line(task, today));
            }
        }
        TaskCommand::Add {
            text,
            date,
            category,
            priority,
            due,
        } => {
            let draft = NewTask {
                text: text.join(" "),
                date,
                category: category.or(config.default_category),
                priority: priority.or(config.default_priority),
                due_date: due,
            };
            let task = planner.add(draft).map_err(to_report)?;
            println!("Created task {} on {}: {}", task.id, task.date, task.text);
        }
        TaskCommand::Done { id } => {
            let task = planner.toggle(id).map_err(to_report)?;
            if task.completed {
                println!("Marked done: {}", task.text);
            } else {
                println!("Reopened: {}", task.text);
            }
        }
        TaskCommand::Edit { id, text } => {
            let task = planner.edit_text(id, &text.join(" ")).map_err(to_report)?;
            println!("Updated task {}: {}", task.id, task.text);
        }
        TaskCommand::Update {
            id,
            date,
            category,
            priority,
            due,
            clear_due,
        } => {
            let patch = TaskPatch {
                date,
                category,
                priority,
                due_date: if clear_due { Some(None) } else { due.map(Some) },
                ..TaskPatch::default()
            };
            if patch == TaskPatch::default() {
                color_eyre::eyre::bail!(
                    "nothing to update; pass --date, --category, --priority, --due or --clear-due"
                );
            }
            let task = planner.update(id, patch).map_err(to_report)?;
            println!("{}", task_line(&task, planner.today()));
        }
        TaskCommand::Delete { id } => match planner.delete(id) {
            Some(task) => println!("Deleted: {}", task.text),
            None => println!("No task with id {id}."),
        },
        TaskCommand::Move { id, index } => {
            planner.reorder(id, index).map_err(to_report)?;
            println!("Moved task {id} to position {index}.");
        }
    }
    Ok(())
}

/// Visible tasks for `args`; flags override the saved filters field by field.
fn list<S: KvStore>(planner: &mut Planner<S>, args: ListArgs) -> Result<Vec<Task>> {
    if args.save && !args.has_filters() {
        color_eyre::eyre::bail!(
            "--save needs at least one of --search, --category, --status or --sort"
        );
    }
    if let Some(date) = args.date {
        planner.select_date(date);
    }
    if !args.has_filters() {
        return Ok(planner.visible_tasks());
    }

    let saved = planner.settings().current_filters.clone();
    let filters = Filters {
        search: args
            .search
            .map(|q| q.trim().to_lowercase())
            .unwrap_or(saved.search),
        category: args.category.or(saved.category),
        status: args.status.or(saved.status),
        sort: args.sort.unwrap_or(saved.sort),
    };
    debug!(?filters, save = args.save, "listing tasks");
    if args.save {
        planner.set_filters(filters);
        Ok(planner.visible_tasks())
    } else {
        Ok(planner.view_with(&filters))
    }
}

/// Print the dashboard counters.
pub fn stats(config: &config::Config) -> Result<()> {
    let planner = crate::open_planner(storage::store_from_config(config)?);
    print!("{}", stats_text(&planner.stats()));
    Ok(())
}

pub fn export(output: Option<&Path>, config: &config::Config) -> Result<()> {
    let planner = crate::open_planner(storage::store_from_config(config)?);
    let document = planner.export().map_err(to_report)?;
    match output {
        Some(path) => {
            fs::write(path, document)?;
            println!(
                "Exported {} tasks to {}",
                planner.tasks().len(),
                path.display()
            );
        }
        None => println!("{document}"),
    }
    Ok(())
}

pub fn import(path: &Path, config: &config::Config) -> Result<()> {
    let blob = fs::read_to_string(path)?;
    let mut planner = crate::open_planner(storage::store_from_config(config)?);
    let count = planner.import(&blob).map_err(to_report)?;
    println!("Imported {count} tasks. Run `daybook restore` to undo.");
    Ok(())
}

pub fn restore(config: &config::Config) -> Result<()> {
    let mut planner = crate::open_planner(storage::store_from_config(config)?);
    match planner.restore_backup().map_err(to_report)? {
        Some(count) => println!("Restored {count} tasks from the last import backup."),
        None => println!("No import backup to restore."),
    }
    Ok(())
}

pub fn toggle_theme(config: &config::Config) -> Result<()> {
    let mut planner = crate::open_planner(storage::store_from_config(config)?);
    let dark = planner.toggle_dark_mode();
    println!("Dark mode {}.", if dark { "on" } else { "off" });
    Ok(())
}

fn task_line(task: &Task, today: chrono::NaiveDate) -> String {
    let mut line = format!(
        "{:>3} [{}] {} {} ({}, {})",
        task.id,
        if task.completed { "x" } else { " " },
        task.date,
        task.text,
        task.category,
        task.priority
    );
    if let Some(due) = task.due_date {
        line.push_str(&format!(" due {due}"));
        if task.is_overdue(today) {
            line.push_str(" OVERDUE");
        }
    }
    line
}

fn stats_text(stats: &Stats) -> String {
    format!(
        "Total:     {}\nCompleted: {} ({}%)\nPending:   {}\nOverdue:   {}\nStreak:    {} day(s)\n",
        stats.total,
        stats.completed,
        stats.completion_percent,
        stats.pending,
        stats.overdue,
        stats.streak
    )
}

fn to_report(err: daybook_core::tasks::TaskError) -> color_eyre::Report {
    color_eyre::eyre::eyre!(err.to_string())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use daybook_core::{
        clock::FixedClock,
        filter::{SortKey, StatusFilter},
        storage::InMemoryKvStore,
        tasks::{Category, Priority},
    };

    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn planner() -> Planner<InMemoryKvStore> {
        Planner::open(InMemoryKvStore::new(), FixedClock::on(day(2024, 3, 10)))
    }

    fn add(text: &str) -> TaskCommand {
        TaskCommand::Add {
            text: text.split(' ').map(String::from).collect(),
            date: None,
            category: None,
            priority: None,
            due: None,
        }
    }

    #[test]
    fn add_applies_config_defaults() {
        let mut planner = planner();
        let config = config::Config {
            default_category: Some(Category::Work),
            default_priority: Some(Priority::High),
            ..config::Config::default()
        };

        run(&mut planner, add("Ship release notes"), &config).expect("add");
        let task = planner.get(1).expect("created");
        assert_eq!(task.text, "Ship release notes");
        assert_eq!(task.category, Category::Work);
        assert_eq!(task.priority, Priority::High);
        assert_eq!(task.date, day(2024, 3, 10));
    }

    #[test]
    fn done_toggles_and_unknown_ids_error() {
        let mut planner = planner();
        let config = config::Config::default();
        run(&mut planner, add("Buy milk"), &config).expect("add");

        run(&mut planner, TaskCommand::Done { id: 1 }, &config).expect("done");
        assert!(planner.get(1).expect("task").completed);
        assert!(run(&mut planner, TaskCommand::Done { id: 9 }, &config).is_err());
        run(&mut planner, TaskCommand::Delete { id: 9 }, &config).expect("no-op delete");
    }

    #[test]
    fn list_flags_override_without_saving() {
        let mut planner = planner();
        let config = config::Config::default();
        run(&mut planner, add("Buy milk"), &config).expect("add");
        run(&mut planner, add("Call mom"), &config).expect("add");
        planner.toggle(1).expect("toggle");

        let pending = list(
            &mut planner,
            ListArgs {
                status: Some(StatusFilter::Pending),
                ..ListArgs::default()
            },
        )
        .expect("list");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].text, "Call mom");
        assert_eq!(planner.settings().current_filters, Filters::default());

        let saved = list(
            &mut planner,
            ListArgs {
                search: Some("  MILK ".into()),
                sort: Some(SortKey::Priority),
                save: true,
                ..ListArgs::default()
            },
        )
        .expect("list");
        assert_eq!(saved.len(), 1);
        assert_eq!(planner.settings().current_filters.search, "milk");
        assert_eq!(planner.settings().current_filters.sort, SortKey::Priority);
    }

    #[test]
    fn list_by_date_selects_the_day() {
        let mut planner = planner();
        planner
            .add(NewTask::new("Dentist").on(day(2024, 3, 12)))
            .expect("add");
        planner.add(NewTask::new("Groceries")).expect("add");

        let tasks = list(
            &mut planner,
            ListArgs {
                date: Some(day(2024, 3, 12)),
                ..ListArgs::default()
            },
        )
        .expect("list");
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].text, "Dentist");
    }

    #[test]
    fn save_without_filters_is_rejected() {
        let mut planner = planner();
        let err = list(
            &mut planner,
            ListArgs {
                save: true,
                ..ListArgs::default()
            },
        )
        .expect_err("nothing to save");
        assert!(err.to_string().contains("--save"));
        assert_eq!(planner.settings().current_filters, Filters::default());
    }

    #[test]
    fn update_patches_fields_and_requires_a_change() {
        let mut planner = planner();
        let config = config::Config::default();
        planner
            .add(NewTask::new("Dentist").due(day(2024, 3, 11)))
            .expect("add");

        let update = |date, clear_due| TaskCommand::Update {
            id: 1,
            date,
            category: Some(Category::Health),
            priority: None,
            due: None,
            clear_due,
        };
        run(&mut planner, update(Some(day(2024, 3, 14)), true), &config).expect("update");
        let task = planner.get(1).expect("task");
        assert_eq!(task.date, day(2024, 3, 14));
        assert_eq!(task.category, Category::Health);
        assert_eq!(task.due_date, None);

        let empty = TaskCommand::Update {
            id: 1,
            date: None,
            category: None,
            priority: None,
            due: None,
            clear_due: false,
        };
        assert!(run(&mut planner, empty, &config).is_err());
        assert!(run(&mut planner, update(None, false), &config).is_ok());
        let missing = TaskCommand::Update {
            id: 9,
            date: None,
            category: None,
            priority: Some(Priority::Low),
            due: None,
            clear_due: false,
        };
        assert!(run(&mut planner, missing, &config).is_err());
    }

    #[test]
    fn task_line_flags_overdue() {
        let mut planner = planner();
        let task = planner
            .add(NewTask::new("Renew passport").due(day(2024, 3, 1)))
            .expect("add");
        assert_eq!(
            task_line(&task, day(2024, 3, 10)),
            "  1 [ ] 2024-03-10 Renew passport (personal, medium) due 2024-03-01 OVERDUE"
        );
    }

    #[test]
    fn stats_text_lists_counters() {
        let text = stats_text(&Stats {
            total: 4,
            completed: 1,
            pending: 3,
            overdue: 2,
            completion_percent: 25,
            streak: 1,
        });
        assert!(text.contains("Completed: 1 (25%)"));
        assert!(text.contains("Overdue:   2"));
    }
}
