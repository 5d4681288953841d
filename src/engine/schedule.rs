//! Fixed-time job schedule.
//!
//! Pure bookkeeping: given the local time, say which jobs are due and
//! remember that they fired. The main loop polls it on a short tick.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};

use super::scanner::in_window;
use crate::config::{ScalpConfig, ScheduleConfig};

/// A once-a-day job that misses its time by more than this is skipped
/// for the day.
pub const GRACE_MINUTES: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Job {
    Daily,
    Scan,
    Liquidate,
}

impl std::fmt::Display for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Job::Daily => write!(f, "daily"),
            Job::Scan => write!(f, "scan"),
            Job::Liquidate => write!(f, "liquidate"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Schedule {
    daily_at: NaiveTime,
    liquidate_at: NaiveTime,
    scan_every: Duration,
    weekdays_only: bool,
    scalp_enabled: bool,
    window_start: NaiveTime,
    window_end: NaiveTime,
    last_daily: Option<NaiveDate>,
    last_liquidation: Option<NaiveDate>,
    last_scan: Option<NaiveDateTime>,
}

impl Schedule {
    pub fn new(schedule: &ScheduleConfig, scalp: &ScalpConfig) -> Self {
        Self {
            daily_at: schedule.daily_job_at,
            liquidate_at: schedule.liquidate_at,
            scan_every: Duration::minutes(i64::from(schedule.scan_interval_mins.max(1))),
            weekdays_only: schedule.weekdays_only,
            scalp_enabled: scalp.enabled,
            window_start: scalp.window_start,
            window_end: scalp.window_end,
            last_daily: None,
            last_liquidation: None,
            last_scan: None,
        }
    }

    fn is_trading_day(&self, day: NaiveDate) -> bool {
        !self.weekdays_only || !matches!(day.weekday(), Weekday::Sat | Weekday::Sun)
    }

    /// Jobs due at `now`, in firing order. Each returned job is marked as run.
    pub fn due(&mut self, now: NaiveDateTime) -> Vec<Job> {
        let today = now.date();
        if !self.is_trading_day(today) {
            return Vec::new();
        }

        let mut jobs = Vec::new();
        let t = now.time();

        if self.last_daily != Some(today) && within_grace(t, self.daily_at) {
            self.last_daily = Some(today);
            jobs.push(Job::Daily);
        }

        if self.scalp_enabled && in_window(t, self.window_start, self.window_end) {
            let ready = self
                .last_scan
                .map_or(true, |last| last.date() != today || now - last >= self.scan_every);
            if ready {
                self.last_scan = Some(now);
                jobs.push(Job::Scan);
            }
        }

        // Restored lots must close even when scanning is switched off.
        if self.last_liquidation != Some(today) && within_grace(t, self.liquidate_at) {
            self.last_liquidation = Some(today);
            jobs.push(Job::Liquidate);
        }

        jobs
    }
}

fn within_grace(t: NaiveTime, at: NaiveTime) -> bool {
    t >= at && t - at < Duration::minutes(GRACE_MINUTES)
}
