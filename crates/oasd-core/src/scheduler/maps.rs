//! Offline map-update scheduling on day boundaries.
//!
//! Schedules: 0 = only when maps are missing, 1 = weekly on Sunday,
//! 2 = monthly on the 1st. At most one request per calendar day, and never
//! while a map download is already in progress.

use chrono::{Datelike, NaiveDate, Weekday};

use crate::store::{keys, StateStore};

/// The stamp recorded in `LastMapsUpdate`, e.g. "August 6th, 2026".
pub fn ordinal_date(date: NaiveDate) -> String {
    let day = date.day();
    let suffix = match day {
        4..=20 | 24..=30 => "th",
        d => ["st", "nd", "rd"][(d % 10 - 1) as usize],
    };
    format!("{} {}{}, {}", date.format("%B"), day, suffix, date.year())
}

/// Publish a map refresh request when the schedule says one is due.
pub fn update_maps(store: &dyn StateStore, today: NaiveDate, maps_downloaded: bool) {
    let Some(selected) = store.get(keys::MAPS_SELECTED) else {
        return;
    };
    if selected.is_empty() {
        return;
    }

    let schedule = store.get_int(keys::PREFERRED_SCHEDULE).unwrap_or(0);
    let is_first = today.day() == 1;
    let is_sunday = today.weekday() == Weekday::Sun;
    if maps_downloaded
        && (schedule == 0 || (schedule == 1 && !is_sunday) || (schedule == 2 && !is_first))
    {
        return;
    }

    let todays_date = ordinal_date(today);
    if store.get(keys::LAST_MAPS_UPDATE).as_deref() == Some(todays_date.as_str()) {
        return;
    }

    if store.get(keys::OSM_DOWNLOAD_PROGRESS).is_none() {
        store.put(keys::OSM_DOWNLOAD_LOCATIONS, &selected);
        store.put(keys::LAST_MAPS_UPDATE, &todays_date);
    }
}
