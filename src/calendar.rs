use chrono::{Datelike, Days, Local, NaiveDate, NaiveDateTime};

/// Today's date in the host's local time zone.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Day granularity: drop the time of day.
pub fn normalize_day(at: NaiveDateTime) -> NaiveDate {
    at.date()
}

/// The next Saturday strictly after `today`. On a Saturday that is a week out.
pub fn next_saturday(today: NaiveDate) -> NaiveDate {
    // Monday=0 .. Saturday=5, Sunday=6
    let weekday = today.weekday().num_days_from_monday();
    let days = match (5 + 7 - weekday) % 7 {
        0 => 7,
        d => d,
    };
    today + Days::new(u64::from(days))
}

/// Saturday/Sunday pairs for the `horizon_weeks` weekends following `today`.
pub fn upcoming_weekends(today: NaiveDate, horizon_weeks: u32) -> impl Iterator<Item = (NaiveDate, NaiveDate)> {
    let first = next_saturday(today);
    (0..horizon_weeks).map(move |week| {
        let saturday = first + Days::new(u64::from(week) * 7);
        (saturday, saturday + Days::new(1))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn next_saturday_from_each_weekday() {
        // 2026-10-19 is a Monday.
        let monday = date(2026, 10, 19);
        let expected = date(2026, 10, 24);
        for offset in 0..5 {
            let day = monday + Days::new(offset);
            assert_eq!(next_saturday(day), expected, "from {day}");
        }
        // Saturday itself rolls a full week; Sunday goes to the following Saturday.
        assert_eq!(next_saturday(date(2026, 10, 24)), date(2026, 10, 31));
        assert_eq!(next_saturday(date(2026, 10, 25)), date(2026, 10, 31));
    }

    #[test]
    fn weekends_roll_in_seven_day_steps() {
        let weekends: Vec<_> = upcoming_weekends(date(2026, 10, 21), 3).collect();
        assert_eq!(
            weekends,
            vec![
                (date(2026, 10, 24), date(2026, 10, 25)),
                (date(2026, 10, 31), date(2026, 11, 1)),
                (date(2026, 11, 7), date(2026, 11, 8)),
            ]
        );
        for (sat, sun) in weekends {
            assert_eq!(sat.weekday(), Weekday::Sat);
            assert_eq!(sun.weekday(), Weekday::Sun);
        }
    }

    #[test]
    fn zero_horizon_is_empty() {
        assert_eq!(upcoming_weekends(date(2026, 10, 21), 0).count(), 0);
    }

    #[test]
    fn normalize_drops_time() {
        let at = date(2026, 10, 24).and_hms_opt(17, 45, 3).unwrap();
        assert_eq!(normalize_day(at), date(2026, 10, 24));
    }
}
