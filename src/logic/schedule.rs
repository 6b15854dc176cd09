//! Schedule gate: when formation and ranking submission are allowed.

use chrono::{DateTime, Datelike, Days, Duration, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;

/// Time-window policy consulted by the ladder before forming groups or accepting rankings.
pub trait ScheduleGate: Send + Sync {
    fn can_form_groups(&self, now: DateTime<Utc>) -> bool;

    fn can_submit_ranking(&self, now: DateTime<Utc>) -> bool;

    /// Start of the cycle `now` belongs to.
    fn cycle_marker(&self, now: DateTime<Utc>) -> DateTime<Utc>;

    /// `false` when every predicate is always true.
    fn is_enforced(&self) -> bool;
}

/// No time restrictions; every instant starts its own cycle.
#[derive(Clone, Copy, Debug, Default)]
pub struct AlwaysOpen;

impl ScheduleGate for AlwaysOpen {
    fn can_form_groups(&self, _now: DateTime<Utc>) -> bool {
        true
    }

    fn can_submit_ranking(&self, _now: DateTime<Utc>) -> bool {
        true
    }

    fn cycle_marker(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now
    }

    fn is_enforced(&self) -> bool {
        false
    }
}

/// Weekly cutoff in a named timezone.
///
/// Formation is open for `formation_window` after each cutoff. Submission is open
/// from the cutoff until `submission_blackout` before the next one.
#[derive(Clone, Debug)]
pub struct WeeklyWindow {
    pub timezone: Tz,
    pub weekday: Weekday,
    pub cutoff: NaiveTime,
    pub formation_window: Duration,
    pub submission_blackout: Duration,
}

impl WeeklyWindow {
    /// Thursday 18:01 Pacific; formation until midnight, no submissions on Thursday before the cutoff.
    pub fn thursday_evening() -> Self {
        Self {
            timezone: chrono_tz::America::Los_Angeles,
            weekday: Weekday::Thu,
            cutoff: NaiveTime::from_hms_opt(18, 1, 0).unwrap_or_default(),
            formation_window: Duration::minutes(359),
            submission_blackout: Duration::minutes(18 * 60 + 1),
        }
    }

    /// Cutoff instant on a local date. A cutoff inside a DST gap moves one hour later.
    fn cutoff_on(&self, date: NaiveDate) -> Option<DateTime<Utc>> {
        let local = date.and_time(self.cutoff);
        self.timezone
            .from_local_datetime(&local)
            .earliest()
            .or_else(|| {
                self.timezone
                    .from_local_datetime(&(local + Duration::hours(1)))
                    .earliest()
            })
            .map(|t| t.with_timezone(&Utc))
    }

    /// Most recent cutoff at or before `now`.
    pub fn last_cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let local = now.with_timezone(&self.timezone);
        let days_back = (local.weekday().num_days_from_monday() + 7
            - self.weekday.num_days_from_monday())
            % 7;
        let date = local.date_naive().checked_sub_days(Days::new(u64::from(days_back)))?;
        let cutoff = self.cutoff_on(date)?;
        if cutoff <= now {
            Some(cutoff)
        } else {
            self.cutoff_on(date.checked_sub_days(Days::new(7))?)
        }
    }

    /// First cutoff strictly after `now`.
    pub fn next_cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let last = self.last_cutoff(now)?;
        let date = last
            .with_timezone(&self.timezone)
            .date_naive()
            .checked_add_days(Days::new(7))?;
        self.cutoff_on(date)
    }
}

impl ScheduleGate for WeeklyWindow {
    fn can_form_groups(&self, now: DateTime<Utc>) -> bool {
        self.last_cutoff(now)
            .is_some_and(|cutoff| now < cutoff + self.formation_window)
    }

    fn can_submit_ranking(&self, now: DateTime<Utc>) -> bool {
        self.next_cutoff(now)
            .is_some_and(|next| now < next - self.submission_blackout)
    }

    fn cycle_marker(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.last_cutoff(now).unwrap_or(now)
    }

    fn is_enforced(&self) -> bool {
        true
    }
}
