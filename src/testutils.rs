use crate::{
    time_arithmetic::TimeOfDay,
    types::{Appointment, AppointmentStatus, Client, Interval, Service},
};
use chrono::{NaiveDate, Utc};
use uuid::Uuid;

pub fn date(text: &str) -> NaiveDate {
    NaiveDate::parse_from_str(text, "%Y-%m-%d").unwrap()
}

pub fn time(text: &str) -> TimeOfDay {
    text.parse().unwrap()
}

pub fn interval(day: &str, start: &str, end: &str) -> Interval {
    Interval::new(date(day), time(start), time(end)).unwrap()
}

pub fn service(duration_minutes: u32) -> Service {
    Service {
        id: Uuid::new_v4(),
        name: format!("Manicure {duration_minutes}min"),
        price: 25.0,
        duration_minutes,
        description: String::new(),
    }
}

pub fn client() -> Client {
    Client {
        id: Uuid::new_v4(),
        full_name: "Ada Obi".into(),
        email: Some("ada@example.com".into()),
        phone: Some("0803 123 4567".into()),
    }
}

/// Confirmed appointment for a fresh client and service.
pub fn appointment(day: &str, start: &str, end: &str) -> Appointment {
    let start = time(start);
    let end = time(end);
    Appointment {
        id: Uuid::new_v4(),
        client_id: Uuid::new_v4(),
        service_id: Uuid::new_v4(),
        service_name: "Gel Polish".into(),
        duration_minutes: end.minutes() - start.minutes(),
        date: date(day),
        start_time: start,
        end_time: end,
        status: AppointmentStatus::Confirmed,
        notes: String::new(),
        reminder_sent: false,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}
