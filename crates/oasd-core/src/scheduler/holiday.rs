//! Holiday windows and debounced theme transitions.
//!
//! A fixed table of (key, date rule, theme id). `_week` entries match the
//! Monday..Sunday week containing the target date; the rest match the exact
//! day. At most one holiday is active; table order is the tie-break when
//! windows could overlap.

use chrono::{Datelike, Duration, NaiveDate};

#[derive(Debug, Clone, Copy)]
enum DateRule {
    Fixed { month: u32, day: u32 },
    Easter,
    Thanksgiving,
}

#[derive(Debug, Clone, Copy)]
pub struct HolidaySpec {
    pub key: &'static str,
    pub theme_id: i64,
    rule: DateRule,
    week_window: bool,
}

pub const HOLIDAYS: &[HolidaySpec] = &[
    HolidaySpec { key: "new_years", theme_id: 1, rule: DateRule::Fixed { month: 1, day: 1 }, week_window: false },
    HolidaySpec { key: "valentines", theme_id: 2, rule: DateRule::Fixed { month: 2, day: 14 }, week_window: false },
    HolidaySpec { key: "st_patricks", theme_id: 3, rule: DateRule::Fixed { month: 3, day: 17 }, week_window: false },
    HolidaySpec { key: "april_fools", theme_id: 4, rule: DateRule::Fixed { month: 4, day: 1 }, week_window: false },
    HolidaySpec { key: "easter_week", theme_id: 5, rule: DateRule::Easter, week_window: true },
    HolidaySpec { key: "cinco_de_mayo", theme_id: 6, rule: DateRule::Fixed { month: 5, day: 5 }, week_window: false },
    HolidaySpec { key: "fourth_of_july", theme_id: 7, rule: DateRule::Fixed { month: 7, day: 4 }, week_window: false },
    HolidaySpec { key: "halloween_week", theme_id: 8, rule: DateRule::Fixed { month: 10, day: 31 }, week_window: true },
    HolidaySpec { key: "thanksgiving_week", theme_id: 9, rule: DateRule::Thanksgiving, week_window: true },
    HolidaySpec { key: "christmas_week", theme_id: 10, rule: DateRule::Fixed { month: 12, day: 25 }, week_window: true },
];

impl HolidaySpec {
    fn target_date(&self, year: i32) -> NaiveDate {
        match self.rule {
            DateRule::Fixed { month, day } => ymd(year, month, day),
            DateRule::Easter => easter(year),
            DateRule::Thanksgiving => thanksgiving(year),
        }
    }

    fn matches(&self, today: NaiveDate) -> bool {
        let target = self.target_date(today.year());
        if self.week_window {
            is_within_week_of(target, today)
        } else {
            today == target
        }
    }
}

fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid calendar date")
}

/// Easter Sunday by the anonymous Gregorian computus.
pub fn easter(year: i32) -> NaiveDate {
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = (h + l - 7 * m + 114) % 31 + 1;
    ymd(year, month as u32, day as u32)
}

/// Fourth Thursday of November.
pub fn thanksgiving(year: i32) -> NaiveDate {
    let november_first = ymd(year, 11, 1);
    let dow = november_first.weekday().num_days_from_monday() as i64;
    november_first + Duration::days((3 - dow + 21) % 7 + 21)
}

/// True when `today` falls in the Monday..Sunday week containing `target`.
pub fn is_within_week_of(target: NaiveDate, today: NaiveDate) -> bool {
    let start = target - Duration::days(target.weekday().num_days_from_monday() as i64);
    let end = start + Duration::days(6);
    (start..=end).contains(&today)
}

/// First matching table entry for `today`.
pub fn active_holiday(today: NaiveDate) -> Option<&'static HolidaySpec> {
    HOLIDAYS.iter().find(|h| h.matches(today))
}

/// Table key for a published theme id.
pub fn key_for_id(theme_id: i64) -> Option<&'static str> {
    HOLIDAYS
        .iter()
        .find(|h| h.theme_id == theme_id)
        .map(|h| h.key)
}

/// Emitted once per transition, never once per tick.
#[derive(Debug, Clone, Copy)]
pub struct HolidayTransition {
    pub theme_id: i64,
    /// Table key of the new holiday; None when transitioning back to no
    /// holiday (theme id 0).
    pub key: Option<&'static str>,
}

/// Debounces holiday evaluation across ticks.
#[derive(Debug, Default)]
pub struct HolidayTracker {
    previous: i64,
}

impl HolidayTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate `today`; returns a transition only when the active theme id
    /// changed since the previous evaluation.
    pub fn update(&mut self, today: NaiveDate) -> Option<HolidayTransition> {
        let (theme_id, key) = match active_holiday(today) {
            Some(h) => (h.theme_id, Some(h.key)),
            None => (0, None),
        };
        if theme_id == self.previous {
            return None;
        }
        self.previous = theme_id;
        Some(HolidayTransition { theme_id, key })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn easter_canonical_dates() {
        assert_eq!(easter(2024), ymd(2024, 3, 31));
        assert_eq!(easter(2025), ymd(2025, 4, 20));
        assert_eq!(easter(2021), ymd(2021, 4, 4));
    }

    #[test]
    fn thanksgiving_is_fourth_thursday() {
        assert_eq!(thanksgiving(2024), ymd(2024, 11, 28));
        assert_eq!(thanksgiving(2025), ymd(2025, 11, 27));
        assert_eq!(thanksgiving(2026), ymd(2026, 11, 26));
    }

    #[test]
    fn week_window_is_monday_through_sunday() {
        // Easter 2024 is Sunday March 31; its week starts Monday March 25.
        let target = easter(2024);
        assert!(!is_within_week_of(target, ymd(2024, 3, 24)));
        for day in 25..=31 {
            assert!(is_within_week_of(target, ymd(2024, 3, day)));
        }
        assert!(!is_within_week_of(target, ymd(2024, 4, 1)));
    }

    #[test]
    fn exact_day_holidays_do_not_bleed() {
        assert_eq!(active_holiday(ymd(2025, 7, 4)).unwrap().theme_id, 7);
        assert!(active_holiday(ymd(2025, 7, 3)).is_none());
        assert!(active_holiday(ymd(2025, 7, 5)).is_none());
    }

    #[test]
    fn week_holidays_cover_their_window() {
        // Halloween 2025 is Friday; its week runs Oct 27 through Nov 2.
        assert_eq!(active_holiday(ymd(2025, 10, 27)).unwrap().theme_id, 8);
        assert_eq!(active_holiday(ymd(2025, 11, 2)).unwrap().theme_id, 8);
        assert!(active_holiday(ymd(2025, 11, 3)).is_none());
    }

    #[test]
    fn tracker_fires_once_per_transition() {
        let mut tracker = HolidayTracker::new();
        // No holiday at startup: no transition to publish.
        assert!(tracker.update(ymd(2024, 6, 10)).is_none());

        // Christmas 2024 week (Dec 23..29).
        let t = tracker.update(ymd(2024, 12, 25)).unwrap();
        assert_eq!(t.theme_id, 10);
        assert_eq!(t.key, Some("christmas_week"));
        assert!(tracker.update(ymd(2024, 12, 26)).is_none());

        // New Year's Day replaces the Christmas theme.
        let t = tracker.update(ymd(2025, 1, 1)).unwrap();
        assert_eq!(t.theme_id, 1);

        // The day after, the theme returns to none exactly once.
        let t = tracker.update(ymd(2025, 1, 2)).unwrap();
        assert_eq!(t.theme_id, 0);
        assert_eq!(t.key, None);
        assert!(tracker.update(ymd(2025, 1, 3)).is_none());
    }

    #[test]
    fn key_for_id_roundtrips() {
        assert_eq!(key_for_id(10), Some("christmas_week"));
        assert_eq!(key_for_id(0), None);
    }
}
