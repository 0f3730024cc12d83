use chrono::{DateTime, NaiveDate, Utc};
use mockall::automock;

#[automock]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub fn today<C: Clock + ?Sized>(clock: &C) -> NaiveDate {
    clock.now().date_naive()
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
