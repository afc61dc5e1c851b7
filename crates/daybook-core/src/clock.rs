use std::{cell::Cell, rc::Rc};

use chrono::{DateTime, Local, NaiveDate, NaiveTime, TimeDelta, Utc};

/// Source of "now" and "today". Task timestamps are UTC; calendar days are local.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
    fn today(&self) -> NaiveDate;
}

/// Wall clock of the host, with days taken in the local timezone.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Manually driven clock. Clones share the same time so a test can keep a
/// handle after passing one to a planner.
#[derive(Debug, Clone)]
pub struct FixedClock {
    now: Rc<Cell<DateTime<Utc>>>,
    today: NaiveDate,
}

impl FixedClock {
    /// Clock pinned to midnight UTC of `today`.
    pub fn on(today: NaiveDate) -> Self {
        Self {
            now: Rc::new(Cell::new(today.and_time(NaiveTime::MIN).and_utc())),
            today,
        }
    }

    pub fn advance(&self, by: TimeDelta) {
        self.now.set(self.now.get() + by);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.get()
    }

    fn today(&self) -> NaiveDate {
        self.today
    }
}
