//! Working-hours gate: the engine only touches candidate state inside the
//! configured local-time window.

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};

use crate::config::Settings;

/// Whether `now` falls inside the working window in the operating timezone.
pub fn within_working_hours(settings: &Settings, now: DateTime<Utc>) -> bool {
    let local = now.with_timezone(&settings.timezone());

    if settings.pause_on_weekends
        && matches!(local.weekday(), Weekday::Sat | Weekday::Sun)
    {
        return false;
    }

    let hour = local.hour();
    hour >= settings.work_start_hour && hour < settings.work_end_hour
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn settings(offset_minutes: i32) -> Settings {
        Settings {
            work_start_hour: 9,
            work_end_hour: 17,
            utc_offset_minutes: offset_minutes,
            pause_on_weekends: true,
            ..Default::default()
        }
    }

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn window_boundaries_in_utc() {
        let s = settings(0);
        // Wednesday
        assert!(!within_working_hours(&s, utc(2026, 3, 4, 8, 59)));
        assert!(within_working_hours(&s, utc(2026, 3, 4, 9, 0)));
        assert!(within_working_hours(&s, utc(2026, 3, 4, 16, 59)));
        assert!(!within_working_hours(&s, utc(2026, 3, 4, 17, 0)));
    }

    #[test]
    fn offset_shifts_the_window() {
        // UTC-5: 9am local is 14:00 UTC.
        let s = settings(-300);
        assert!(!within_working_hours(&s, utc(2026, 3, 4, 13, 30)));
        assert!(within_working_hours(&s, utc(2026, 3, 4, 14, 30)));
        assert!(!within_working_hours(&s, utc(2026, 3, 4, 22, 30)));
    }

    #[test]
    fn weekends_paused() {
        let s = settings(0);
        // Saturday noon
        assert!(!within_working_hours(&s, utc(2026, 3, 7, 12, 0)));
        // Same settings with the pause off
        let mut s = s;
        s.pause_on_weekends = false;
        assert!(within_working_hours(&s, utc(2026, 3, 7, 12, 0)));
    }

    #[test]
    fn offset_can_move_across_the_weekend_boundary() {
        // UTC+13: Saturday 11pm UTC is already Sunday locally either way,
        // but Friday 23:00 UTC is Saturday 12:00 local.
        let s = settings(780);
        assert!(!within_working_hours(&s, utc(2026, 3, 6, 23, 0)));
    }
}
