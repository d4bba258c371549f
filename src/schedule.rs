use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use jiff::civil::{DateTime, Time};
use jiff::tz::TimeZone;
use jiff::Timestamp;
use log::info;

use crate::error::EtlError;

pub trait Clock {
    /// Current wall clock time.
    fn now(&self) -> DateTime;
}

/// Wall clock time in a given timezone.
#[derive(Clone, Debug)]
pub struct SystemClock {
    tz: TimeZone,
}

impl SystemClock {
    /// Use the IANA timezone `tz` if given, the system timezone otherwise.
    pub fn new(tz: Option<&str>) -> Result<SystemClock, EtlError> {
        let tz = match tz {
            Some(name) => {
                TimeZone::get(name).map_err(|_| EtlError::InvalidTimezone(name.to_string()))?
            }
            None => TimeZone::system(),
        };
        Ok(SystemClock { tz })
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime {
        Timestamp::now().to_zoned(self.tz.clone()).datetime()
    }
}

/// Parse `HH:MM` or `HH:MM:SS`, 24 hour clock.
pub fn parse_time_of_day(s: &str) -> Result<Time, EtlError> {
    let invalid = || EtlError::InvalidTime(s.to_string());
    let parts: Vec<&str> = s.split(':').collect();
    if !(2..=3).contains(&parts.len())
        || parts
            .iter()
            .any(|p| p.len() != 2 || !p.bytes().all(|b| b.is_ascii_digit()))
    {
        return Err(invalid());
    }
    let field = |i: usize| -> Result<i8, EtlError> {
        match parts.get(i) {
            Some(p) => p.parse::<i8>().map_err(|_| invalid()),
            None => Ok(0),
        }
    };
    Time::new(field(0)?, field(1)?, field(2)?, 0).map_err(|_| invalid())
}

struct Job {
    at: Time,
    next_run: DateTime,
    task: Box<dyn FnMut()>,
}

/// The registry of daily jobs, and the loop that runs them.
pub struct Scheduler<C: Clock> {
    clock: C,
    jobs: Vec<Job>,
    poll_interval: Duration,
}

impl<C: Clock> Scheduler<C> {
    pub fn new(clock: C) -> Scheduler<C> {
        Scheduler {
            clock,
            jobs: Vec::new(),
            poll_interval: Duration::from_secs(1),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Scheduler<C> {
        self.poll_interval = poll_interval;
        self
    }

    /// Run `task` every day at `time_of_day`.  The first run is today if that
    /// time hasn't passed yet, tomorrow otherwise.
    pub fn every_day_at(
        &mut self,
        time_of_day: &str,
        task: impl FnMut() + 'static,
    ) -> Result<&mut Self, EtlError> {
        let at = parse_time_of_day(time_of_day)?;
        let next_run = first_run(self.clock.now(), at);
        info!("Job scheduled to run daily at {}, next run at {}", at, next_run);
        self.jobs.push(Job {
            at,
            next_run,
            task: Box::new(task),
        });
        Ok(self)
    }

    /// Time of the earliest upcoming run, if any job is registered.
    pub fn next_run(&self) -> Option<DateTime> {
        self.jobs.iter().map(|job| job.next_run).min()
    }

    /// Run every job that is due, then reschedule it for the next day.
    /// Return the number of jobs that ran.
    pub fn run_pending(&mut self) -> usize {
        let now = self.clock.now();
        let mut count = 0;
        for job in self.jobs.iter_mut().filter(|job| job.next_run <= now) {
            (job.task)();
            job.next_run = run_after(self.clock.now().max(now), job.at);
            count += 1;
        }
        count
    }

    /// Poll for due jobs until `shutdown` is set.  A running job is never
    /// interrupted, the flag is checked between polls.
    pub fn run_forever(&mut self, shutdown: &AtomicBool) {
        loop {
            if shutdown.load(Ordering::SeqCst) {
                info!("Interrupt detected. Shutting down scheduler gracefully...");
                return;
            }
            self.run_pending();
            thread::sleep(self.poll_interval);
        }
    }
}

/// Today at `at` unless that is already in the past.
fn first_run(now: DateTime, at: Time) -> DateTime {
    let today = now.date().to_datetime(at);
    if today >= now {
        today
    } else {
        tomorrow_at(now, at)
    }
}

/// The first time of day `at` strictly after `now`.
fn run_after(now: DateTime, at: Time) -> DateTime {
    let today = now.date().to_datetime(at);
    if today > now {
        today
    } else {
        tomorrow_at(now, at)
    }
}

fn tomorrow_at(now: DateTime, at: Time) -> DateTime {
    now.date()
        .tomorrow()
        .map(|day| day.to_datetime(at))
        .unwrap_or(DateTime::MAX)
}
