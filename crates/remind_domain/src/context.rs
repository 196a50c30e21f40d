use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::quiet_hours::QuietHours;

/// Built per pass; the engine never reads the clock or global settings.
#[derive(Debug, Clone)]
pub struct EngineContext<Tz: TimeZone> {
    pub now: DateTime<Utc>,
    pub tz: Tz,
    pub quiet_hours: Option<QuietHours>,
}

impl<Tz: TimeZone> EngineContext<Tz> {
    pub fn new(now: DateTime<Utc>, tz: Tz) -> Self {
        Self {
            now,
            tz,
            quiet_hours: None,
        }
    }

    pub fn with_quiet_hours(mut self, quiet_hours: Option<QuietHours>) -> Self {
        self.quiet_hours = quiet_hours;
        self
    }

    pub fn today(&self) -> NaiveDate {
        self.local_date(self.now)
    }

    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        self.local_naive(instant).date()
    }

    pub fn local_naive(&self, instant: DateTime<Utc>) -> NaiveDateTime {
        instant.with_timezone(&self.tz).naive_local()
    }

    /// Ambiguous times (DST fall-back) take the earlier mapping; times inside a
    /// DST gap are pushed forward by one hour.
    pub fn to_instant(&self, local: NaiveDateTime) -> Option<DateTime<Utc>> {
        match self.tz.from_local_datetime(&local) {
            LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
            LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
            LocalResult::None => {
                let shifted = local.checked_add_signed(Duration::hours(1))?;
                self.tz
                    .from_local_datetime(&shifted)
                    .earliest()
                    .map(|dt| dt.with_timezone(&Utc))
            }
        }
    }

    pub fn start_of_day(&self, date: NaiveDate) -> Option<DateTime<Utc>> {
        self.to_instant(date.and_hms_opt(0, 0, 0)?)
    }

    pub fn start_of_today(&self) -> Option<DateTime<Utc>> {
        self.start_of_day(self.today())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;
    use chrono_tz::America::New_York;

    fn local(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn today_follows_the_local_zone_not_utc() {
        let tz = FixedOffset::east_opt(-5 * 3600).unwrap();
        let now = Utc.with_ymd_and_hms(2025, 3, 11, 2, 0, 0).unwrap();
        let ctx = EngineContext::new(now, tz);
        assert_eq!(ctx.today(), NaiveDate::from_ymd_opt(2025, 3, 10).unwrap());
    }

    #[test]
    fn start_of_today_is_local_midnight() {
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let now = Utc.with_ymd_and_hms(2025, 3, 11, 12, 0, 0).unwrap();
        let ctx = EngineContext::new(now, tz);
        assert_eq!(
            ctx.start_of_today(),
            Some(Utc.with_ymd_and_hms(2025, 3, 10, 22, 0, 0).unwrap())
        );
    }

    #[test]
    fn wall_clock_times_in_a_dst_gap_move_one_hour_later() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let ctx = EngineContext::new(now, New_York);
        // 02:30 does not exist on 2025-03-09; 03:30 EDT is 07:30 UTC.
        assert_eq!(
            ctx.to_instant(local(2025, 3, 9, 2, 30)),
            Some(Utc.with_ymd_and_hms(2025, 3, 9, 7, 30, 0).unwrap())
        );
        assert_eq!(
            ctx.to_instant(local(2025, 3, 9, 3, 30)),
            Some(Utc.with_ymd_and_hms(2025, 3, 9, 7, 30, 0).unwrap())
        );
    }

    #[test]
    fn ambiguous_wall_clock_times_take_the_earlier_instant() {
        let now = Utc.with_ymd_and_hms(2025, 11, 1, 12, 0, 0).unwrap();
        let ctx = EngineContext::new(now, New_York);
        // 01:30 happens twice on 2025-11-02; the EDT reading comes first.
        assert_eq!(
            ctx.to_instant(local(2025, 11, 2, 1, 30)),
            Some(Utc.with_ymd_and_hms(2025, 11, 2, 5, 30, 0).unwrap())
        );
    }
}
