use crate::{errors::SchedulingError, time_arithmetic::TimeOfDay};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use uuid::Uuid;

pub const DEFAULT_OPENING_TIME: TimeOfDay = TimeOfDay::NINE_AM;
pub const DEFAULT_CLOSING_TIME: TimeOfDay = TimeOfDay::SIX_PM;
pub const DEFAULT_SLOT_INTERVAL_MINUTES: i32 = 30;

/// A date-scoped `[start, end)` range. `start < end` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interval {
    pub date: NaiveDate,
    pub start: TimeOfDay,
    pub end: TimeOfDay,
}

impl Interval {
    pub fn new(date: NaiveDate, start: TimeOfDay, end: TimeOfDay) -> Result<Self, SchedulingError> {
        if start >= end {
            return Err(SchedulingError::Validation(format!(
                "Interval must end after it starts ({start} - {end})"
            )));
        }
        Ok(Self { date, start, end })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
    #[serde(rename = "no-show")]
    NoShow,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 5] = [
        AppointmentStatus::Pending,
        AppointmentStatus::Confirmed,
        AppointmentStatus::Completed,
        AppointmentStatus::Cancelled,
        AppointmentStatus::NoShow,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::NoShow => "no-show",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Cancelled | AppointmentStatus::Completed | AppointmentStatus::NoShow
        )
    }

    /// Re-applying the current status is allowed and changes nothing.
    pub fn can_transition_to(&self, next: AppointmentStatus) -> bool {
        use AppointmentStatus::*;

        if *self == next {
            return true;
        }
        match (self, next) {
            (Pending, Confirmed) => true,
            (Confirmed, Completed) => true,
            (Pending | Confirmed, Cancelled | NoShow) => true,
            _ => false,
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = SchedulingError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == text)
            .ok_or_else(|| {
                let allowed: Vec<&str> = Self::ALL.iter().map(|status| status.as_str()).collect();
                SchedulingError::Validation(format!(
                    "Invalid status '{text}'. Allowed: {}",
                    allowed.join(", ")
                ))
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: Uuid,
    pub name: String,
    pub price: f64,
    pub duration_minutes: u32,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewService {
    pub name: String,
    pub price: f64,
    pub duration_minutes: u32,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: Uuid,
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewClient {
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessSettings {
    pub opening_time: TimeOfDay,
    pub closing_time: TimeOfDay,
    #[serde(alias = "slotInterval")]
    pub slot_interval_minutes: i32,
    /// Stored for the admin panel, slot generation ignores it.
    #[serde(alias = "bufferTime")]
    pub buffer_minutes: i32,
    pub max_advance_booking_days: i32,
    pub business_name: String,
    pub contact_email: String,
    pub contact_phone: String,
}

impl Default for BusinessSettings {
    fn default() -> Self {
        Self {
            opening_time: DEFAULT_OPENING_TIME,
            closing_time: DEFAULT_CLOSING_TIME,
            slot_interval_minutes: DEFAULT_SLOT_INTERVAL_MINUTES,
            buffer_minutes: 0,
            max_advance_booking_days: 60,
            business_name: "Nail Salon".into(),
            contact_email: String::new(),
            contact_phone: String::new(),
        }
    }
}

impl BusinessSettings {
    /// Rejects settings the slot generator could not work with.
    pub fn check_configuration(&self) -> Result<(), SchedulingError> {
        if self.slot_interval_minutes <= 0 {
            return Err(SchedulingError::InvalidConfiguration(format!(
                "Slot interval must be positive, got {}",
                self.slot_interval_minutes
            )));
        }
        if self.buffer_minutes < 0 {
            return Err(SchedulingError::InvalidConfiguration(format!(
                "Buffer must not be negative, got {}",
                self.buffer_minutes
            )));
        }
        if self.opening_time >= self.closing_time {
            return Err(SchedulingError::InvalidConfiguration(format!(
                "Opening time {} must be before closing time {}",
                self.opening_time, self.closing_time
            )));
        }
        Ok(())
    }
}

/// Partial settings write, unset fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub opening_time: Option<TimeOfDay>,
    pub closing_time: Option<TimeOfDay>,
    #[serde(alias = "slotInterval")]
    pub slot_interval_minutes: Option<i32>,
    #[serde(alias = "bufferTime")]
    pub buffer_minutes: Option<i32>,
    pub max_advance_booking_days: Option<i32>,
    pub business_name: Option<String>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
}

impl SettingsUpdate {
    pub fn apply_to(self, mut settings: BusinessSettings) -> BusinessSettings {
        if let Some(opening_time) = self.opening_time {
            settings.opening_time = opening_time;
        }
        if let Some(closing_time) = self.closing_time {
            settings.closing_time = closing_time;
        }
        if let Some(slot_interval_minutes) = self.slot_interval_minutes {
            settings.slot_interval_minutes = slot_interval_minutes;
        }
        if let Some(buffer_minutes) = self.buffer_minutes {
            settings.buffer_minutes = buffer_minutes;
        }
        if let Some(max_advance_booking_days) = self.max_advance_booking_days {
            settings.max_advance_booking_days = max_advance_booking_days;
        }
        if let Some(business_name) = self.business_name {
            settings.business_name = business_name;
        }
        if let Some(contact_email) = self.contact_email {
            settings.contact_email = contact_email;
        }
        if let Some(contact_phone) = self.contact_phone {
            settings.contact_phone = contact_phone;
        }
        settings
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: Uuid,
    pub client_id: Uuid,
    pub service_id: Uuid,
    pub service_name: String,
    pub duration_minutes: u32,
    pub date: NaiveDate,
    pub start_time: TimeOfDay,
    pub end_time: TimeOfDay,
    pub status: AppointmentStatus,
    pub notes: String,
    pub reminder_sent: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn interval(&self) -> Interval {
        Interval {
            date: self.date,
            start: self.start_time,
            end: self.end_time,
        }
    }

    /// Copies the reschedulable fields. Status and reminder state stay untouched.
    pub fn take_schedule_from(&mut self, other: &Appointment) {
        self.service_id = other.service_id;
        self.service_name = other.service_name.clone();
        self.duration_minutes = other.duration_minutes;
        self.date = other.date;
        self.start_time = other.start_time;
        self.end_time = other.end_time;
        self.notes = other.notes.clone();
        self.updated_at = other.updated_at;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use test_case::test_case;

    #[test_case(AppointmentStatus::Pending, AppointmentStatus::Confirmed, true)]
    #[test_case(AppointmentStatus::Confirmed, AppointmentStatus::Completed, true)]
    #[test_case(AppointmentStatus::Pending, AppointmentStatus::Cancelled, true)]
    #[test_case(AppointmentStatus::Confirmed, AppointmentStatus::Cancelled, true)]
    #[test_case(AppointmentStatus::Pending, AppointmentStatus::NoShow, true)]
    #[test_case(AppointmentStatus::Confirmed, AppointmentStatus::NoShow, true)]
    #[test_case(AppointmentStatus::Confirmed, AppointmentStatus::Confirmed, true)]
    #[test_case(AppointmentStatus::Pending, AppointmentStatus::Completed, false)]
    #[test_case(AppointmentStatus::Confirmed, AppointmentStatus::Pending, false)]
    #[test_case(AppointmentStatus::Cancelled, AppointmentStatus::Confirmed, false)]
    #[test_case(AppointmentStatus::Completed, AppointmentStatus::Cancelled, false)]
    #[test_case(AppointmentStatus::NoShow, AppointmentStatus::Completed, false)]
    fn test_status_transitions(from: AppointmentStatus, to: AppointmentStatus, allowed: bool) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[test]
    fn test_status_wire_format() {
        for status in AppointmentStatus::ALL {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
            assert_eq!(status.as_str().parse::<AppointmentStatus>().unwrap(), status);
        }
        "done".parse::<AppointmentStatus>().unwrap_err();
    }

    #[test]
    fn test_interval_must_not_be_empty() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
        let ten: TimeOfDay = "10:00".parse().unwrap();
        let eleven: TimeOfDay = "11:00".parse().unwrap();

        Interval::new(date, ten, eleven).unwrap();
        Interval::new(date, ten, ten).unwrap_err();
        Interval::new(date, eleven, ten).unwrap_err();
    }

    #[test_case(BusinessSettings { slot_interval_minutes: 0, ..Default::default() })]
    #[test_case(BusinessSettings { slot_interval_minutes: -15, ..Default::default() })]
    #[test_case(BusinessSettings { buffer_minutes: -1, ..Default::default() })]
    #[test_case(BusinessSettings { opening_time: DEFAULT_CLOSING_TIME, closing_time: DEFAULT_OPENING_TIME, ..Default::default() })]
    fn test_invalid_settings_are_rejected(settings: BusinessSettings) {
        assert!(matches!(
            settings.check_configuration(),
            Err(SchedulingError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_settings_update_keeps_unset_fields() {
        let update: SettingsUpdate =
            serde_json::from_str(r#"{"closingTime": "20:00", "slotInterval": 15}"#).unwrap();
        let settings = update.apply_to(BusinessSettings::default());

        assert_eq!(settings.opening_time.to_string(), "09:00");
        assert_eq!(settings.closing_time.to_string(), "20:00");
        assert_eq!(settings.slot_interval_minutes, 15);
        assert_eq!(settings.business_name, "Nail Salon");
        settings.check_configuration().unwrap();
    }
}
