use crate::types::{BusinessSettings, Interval};

/// Business hours are the same for every day of the week.
pub fn is_within_business_hours(interval: &Interval, settings: &BusinessSettings) -> bool {
    interval.start >= settings.opening_time && interval.end <= settings.closing_time
}
