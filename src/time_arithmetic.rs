use lazy_static::lazy_static;
use regex::Regex;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};
use thiserror::Error;

pub const MINUTES_PER_DAY: u32 = 24 * 60;

lazy_static! {
    pub static ref TIME_OF_DAY_PATTERN: Regex = Regex::new(r"^(\d{1,2}):(\d{2})$").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeError {
    #[error("Invalid time format '{0}', expected HH:MM")]
    InvalidTimeFormat(String),
    #[error("{0} minutes is past midnight")]
    PastMidnight(u32),
}

/// Wall-clock time in the business's local timezone, stored as minutes since midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay(u16);

impl TimeOfDay {
    pub const NINE_AM: TimeOfDay = TimeOfDay(9 * 60);
    pub const SIX_PM: TimeOfDay = TimeOfDay(18 * 60);

    pub fn from_minutes(minutes: u32) -> Result<Self, TimeError> {
        if minutes >= MINUTES_PER_DAY {
            return Err(TimeError::PastMidnight(minutes));
        }
        Ok(Self(minutes as u16))
    }

    pub fn minutes(self) -> u32 {
        u32::from(self.0)
    }
}

impl FromStr for TimeOfDay {
    type Err = TimeError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Self::from_minutes(to_minutes(text)?)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = to_time_string(self.minutes()).map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeOfDay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(de::Error::custom)
    }
}

/// Parses "HH:MM" into minutes since midnight.
pub fn to_minutes(text: &str) -> Result<u32, TimeError> {
    let invalid = || TimeError::InvalidTimeFormat(text.to_string());
    let captures = TIME_OF_DAY_PATTERN.captures(text).ok_or_else(invalid)?;

    let hours: u32 = captures[1].parse().map_err(|_| invalid())?;
    let minutes: u32 = captures[2].parse().map_err(|_| invalid())?;
    if hours > 23 || minutes > 59 {
        return Err(invalid());
    }
    Ok(hours * 60 + minutes)
}

/// Formats minutes since midnight as zero-padded "HH:MM".
pub fn to_time_string(minutes: u32) -> Result<String, TimeError> {
    if minutes >= MINUTES_PER_DAY {
        return Err(TimeError::PastMidnight(minutes));
    }
    Ok(format!("{:02}:{:02}", minutes / 60, minutes % 60))
}

/// End of an interval starting at `start`. Intervals never wrap past midnight.
pub fn compute_end_time(start: TimeOfDay, duration_minutes: u32) -> Result<TimeOfDay, TimeError> {
    let end = start
        .minutes()
        .checked_add(duration_minutes)
        .ok_or(TimeError::PastMidnight(u32::MAX))?;
    TimeOfDay::from_minutes(end)
}

#[cfg(test)]
mod test {
    use super::*;
    use test_case::test_case;

    #[test_case("00:00", 0)]
    #[test_case("09:00", 540)]
    #[test_case("9:05", 545)]
    #[test_case("17:30", 1050)]
    #[test_case("23:59", 1439)]
    fn test_to_minutes(text: &str, expected: u32) {
        assert_eq!(to_minutes(text).unwrap(), expected);
    }

    #[test_case("24:00")]
    #[test_case("12:60")]
    #[test_case("12")]
    #[test_case("12:00:00")]
    #[test_case("ab:cd")]
    #[test_case("-1:30")]
    #[test_case("12:5")]
    #[test_case("")]
    fn test_to_minutes_rejects_malformed(text: &str) {
        assert_eq!(
            to_minutes(text).unwrap_err(),
            TimeError::InvalidTimeFormat(text.to_string())
        );
    }

    #[test]
    fn test_every_minute_of_the_day_round_trips() {
        for minutes in 0..MINUTES_PER_DAY {
            let text = to_time_string(minutes).unwrap();
            assert_eq!(text.len(), 5);
            assert_eq!(to_minutes(&text).unwrap(), minutes);
            assert_eq!(to_time_string(to_minutes(&text).unwrap()).unwrap(), text);
        }
    }

    #[test]
    fn test_to_time_string_rejects_past_midnight() {
        assert_eq!(to_time_string(1440), Err(TimeError::PastMidnight(1440)));
    }

    #[test_case("09:00", 60, "10:00")]
    #[test_case("17:30", 60, "18:30")]
    #[test_case("10:45", 90, "12:15")]
    #[test_case("22:59", 60, "23:59")]
    fn test_compute_end_time(start: &str, duration: u32, expected: &str) {
        let start: TimeOfDay = start.parse().unwrap();
        assert_eq!(
            compute_end_time(start, duration).unwrap().to_string(),
            expected
        );
    }

    #[test]
    fn test_compute_end_time_past_midnight() {
        let start: TimeOfDay = "23:30".parse().unwrap();
        assert_eq!(
            compute_end_time(start, 30),
            Err(TimeError::PastMidnight(1440))
        );
    }

    #[test]
    fn test_serde_uses_clock_string() {
        let time: TimeOfDay = serde_json::from_str("\"8:15\"").unwrap();
        assert_eq!(time.minutes(), 495);
        assert_eq!(serde_json::to_string(&time).unwrap(), "\"08:15\"");
        serde_json::from_str::<TimeOfDay>("\"25:00\"").unwrap_err();
    }
}
