//! Working-time axis used by the engine.
//!
//! The passes work in integer milli-hours offset from the project start, so
//! sums of durations and lags are exact. Each calendar day contributes
//! `hours_per_day` working hours starting at `day_start_hour`; time of day
//! outside that window is clamped to it.

use chrono::{Days, Duration, NaiveDateTime, NaiveTime, Timelike};

/// Working time in thousandths of an hour.
pub type MilliHours = i64;

/// Largest magnitude carried on the time axis, a billion hours.
pub const MAX_MILLI_HOURS: MilliHours = 1_000_000_000_000;

/// Convert hours to milli-hours, rounding to the nearest unit.
///
/// NaN maps to zero and magnitudes past `MAX_MILLI_HOURS` saturate.
pub fn to_milli_hours(hours: f64) -> MilliHours {
    if hours.is_nan() {
        return 0;
    }
    ((hours * 1000.0).round() as MilliHours).clamp(-MAX_MILLI_HOURS, MAX_MILLI_HOURS)
}

pub fn to_hours(value: MilliHours) -> f64 {
    value as f64 / 1000.0
}

/// Converts between calendar datetimes and working-time offsets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkCalendar {
    per_day: MilliHours,
    day_start_hour: u32,
}

impl WorkCalendar {
    /// `hours_per_day` outside (0, 24] falls back to 8.
    pub fn new(hours_per_day: f64, day_start_hour: u32) -> Self {
        let hours_per_day = if hours_per_day > 0.0 && hours_per_day <= 24.0 {
            hours_per_day
        } else {
            8.0
        };
        Self {
            per_day: to_milli_hours(hours_per_day).max(1),
            day_start_hour: day_start_hour.min(23),
        }
    }

    pub fn hours_per_day(&self) -> f64 {
        to_hours(self.per_day)
    }

    pub fn day_start_hour(&self) -> u32 {
        self.day_start_hour
    }

    /// Working time already elapsed on the day of `dt`.
    fn into_day(&self, dt: NaiveDateTime) -> MilliHours {
        let seconds = dt.time().num_seconds_from_midnight() as i64 - self.day_start_hour as i64 * 3600;
        to_milli_hours(seconds as f64 / 3600.0).clamp(0, self.per_day)
    }

    /// Working-time offset of `dt` relative to `origin`. Negative before the origin.
    pub fn offset(&self, origin: NaiveDateTime, dt: NaiveDateTime) -> MilliHours {
        let days = (dt.date() - origin.date()).num_days();
        days * self.per_day + self.into_day(dt) - self.into_day(origin)
    }

    /// Datetime at which work positioned at `offset` begins.
    pub fn start_datetime(&self, origin: NaiveDateTime, offset: MilliHours) -> NaiveDateTime {
        let total = offset + self.into_day(origin);
        self.at(origin, total.div_euclid(self.per_day), total.rem_euclid(self.per_day))
    }

    /// Datetime at which work ending at `offset` finishes.
    ///
    /// A finish exactly on a day boundary lands at the end of the previous
    /// working day rather than the start of the next one.
    pub fn finish_datetime(&self, origin: NaiveDateTime, offset: MilliHours) -> NaiveDateTime {
        let total = offset + self.into_day(origin);
        let mut days = total.div_euclid(self.per_day);
        let mut rem = total.rem_euclid(self.per_day);
        if rem == 0 {
            days -= 1;
            rem = self.per_day;
        }
        self.at(origin, days, rem)
    }

    /// Saturates at the ends of the representable date range.
    fn at(&self, origin: NaiveDateTime, days: i64, into_day: MilliHours) -> NaiveDateTime {
        let shift = Days::new(days.unsigned_abs());
        let date = if days >= 0 {
            origin.date().checked_add_days(shift)
        } else {
            origin.date().checked_sub_days(shift)
        };
        let seconds = self.day_start_hour as i64 * 3600 + (into_day * 36 + 5) / 10;
        let saturated = if days >= 0 {
            NaiveDateTime::MAX
        } else {
            NaiveDateTime::MIN
        };
        date.and_then(|date| {
            date.and_time(NaiveTime::MIN)
                .checked_add_signed(Duration::seconds(seconds))
        })
        .unwrap_or(saturated)
    }
}

impl Default for WorkCalendar {
    fn default() -> Self {
        Self::new(8.0, 8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const H: MilliHours = 1000;

    fn dt(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_offset_whole_days() {
        let cal = WorkCalendar::default();
        let origin = dt(2025, 3, 3, 8);
        assert_eq!(cal.offset(origin, dt(2025, 3, 3, 8)), 0);
        assert_eq!(cal.offset(origin, dt(2025, 3, 4, 8)), 8 * H);
        assert_eq!(cal.offset(origin, dt(2025, 3, 3, 12)), 4 * H);
        assert_eq!(cal.offset(origin, dt(2025, 3, 2, 8)), -8 * H);
    }

    #[test]
    fn test_offset_clamps_outside_working_hours() {
        let cal = WorkCalendar::default();
        let origin = dt(2025, 3, 3, 8);
        // 20:00 is past the 8h window, so it counts as the full day
        assert_eq!(cal.offset(origin, dt(2025, 3, 3, 20)), 8 * H);
        assert_eq!(cal.offset(origin, dt(2025, 3, 4, 6)), 8 * H);
    }

    #[test]
    fn test_start_and_finish_datetimes() {
        let cal = WorkCalendar::default();
        let origin = dt(2025, 3, 3, 8);
        assert_eq!(cal.start_datetime(origin, 0), dt(2025, 3, 3, 8));
        assert_eq!(cal.start_datetime(origin, 40 * H), dt(2025, 3, 8, 8));
        assert_eq!(cal.finish_datetime(origin, 40 * H), dt(2025, 3, 7, 16));
        assert_eq!(cal.finish_datetime(origin, 12 * H), dt(2025, 3, 4, 12));
        // 0.25h is 15 minutes
        assert_eq!(
            cal.start_datetime(origin, 250),
            dt(2025, 3, 3, 8) + Duration::minutes(15)
        );
    }

    #[test]
    fn test_dates_saturate_past_calendar_range() {
        let cal = WorkCalendar::default();
        let origin = dt(2025, 3, 3, 8);
        let far = to_milli_hours(1e9);
        assert_eq!(cal.start_datetime(origin, far), NaiveDateTime::MAX);
        assert_eq!(cal.finish_datetime(origin, far), NaiveDateTime::MAX);
        assert_eq!(cal.start_datetime(origin, -far), NaiveDateTime::MIN);
    }

    #[test]
    fn test_milli_hour_conversion() {
        assert_eq!(to_milli_hours(0.1) + to_milli_hours(0.2), to_milli_hours(0.3));
        assert_eq!(to_milli_hours(-8.0), -8 * H);
        assert_eq!(to_milli_hours(f64::NAN), 0);
        assert_eq!(to_milli_hours(1e300), MAX_MILLI_HOURS);
        assert_eq!(to_hours(1500), 1.5);
    }

    #[test]
    fn test_hours_per_day_outside_a_day_falls_back() {
        assert_eq!(WorkCalendar::new(30.0, 8).hours_per_day(), 8.0);
        assert_eq!(WorkCalendar::new(7.5, 7).hours_per_day(), 7.5);
    }
}
