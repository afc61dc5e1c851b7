use chrono::NaiveDate;

use crate::{calendar::streak, tasks::Task};

/// Dashboard counters over the whole collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
    pub overdue: usize,
    /// Rounded share of completed tasks, 0 when there are none.
    pub completion_percent: u8,
    pub streak: u32,
}

impl Stats {
    pub fn compute(tasks: &[Task], today: NaiveDate) -> Self {
        let total = tasks.len();
        let completed = tasks.iter().filter(|t| t.completed).count();
        let overdue = tasks.iter().filter(|t| t.is_overdue(today)).count();
        let completion_percent = if total == 0 {
            0
        } else {
            ((completed * 100 + total / 2) / total) as u8
        };
        Self {
            total,
            completed,
            pending: total - completed,
            overdue,
            completion_percent,
            streak: streak(tasks, today),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::FixedClock,
        tasks::{NewTask, TaskStore},
    };

    #[test]
    fn counts_collection() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 10).expect("date");
        let clock = FixedClock::on(today);
        let mut store = TaskStore::new();
        store.create(NewTask::new("done"), &clock).expect("create");
        store
            .create(
                NewTask::new("late").due(today.pred_opt().expect("date")),
                &clock,
            )
            .expect("create");
        store.create(NewTask::new("open"), &clock).expect("create");
        store.toggle_completed(1).expect("toggle");

        let stats = Stats::compute(store.all(), today);
        assert_eq!(
            stats,
            Stats {
                total: 3,
                completed: 1,
                pending: 2,
                overdue: 1,
                completion_percent: 33,
                streak: 1,
            }
        );
        assert_eq!(Stats::compute(&[], today), Stats::default());
    }
}
