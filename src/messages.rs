use crate::notifications::{AppointmentEvent, EventKind};
use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub subject: String,
    pub body: String,
}

/// "Friday, March 14, 2025"
pub fn format_date(date: NaiveDate) -> String {
    date.format("%A, %B %-d, %Y").to_string()
}

/// Normalises a phone number to E.164, assuming `country_code` for local numbers.
pub fn format_phone(phone: &str, country_code: &str) -> Option<String> {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    let digits = digits.strip_prefix('0').unwrap_or(&digits);
    if digits.is_empty() {
        return None;
    }
    if digits.starts_with(country_code) {
        return Some(format!("+{digits}"));
    }
    Some(format!("+{country_code}{digits}"))
}

pub fn email_for(event: &AppointmentEvent) -> EmailMessage {
    let appointment = &event.appointment;
    let date = format_date(appointment.date);
    let notes = match appointment.notes.as_str() {
        "" => String::new(),
        notes => format!("Notes: {notes}\n"),
    };

    let (subject, intro, outro) = match &event.kind {
        EventKind::Confirmed => (
            "Appointment Confirmation".to_string(),
            "Your appointment has been confirmed!".to_string(),
            "We look forward to seeing you!\n\nIf you need to reschedule or cancel, please contact us as soon as possible.",
        ),
        EventKind::Rescheduled {
            previous_date,
            previous_start,
        } => (
            "Appointment Rescheduled".to_string(),
            format!(
                "Your appointment has been moved from {} at {previous_start}.",
                format_date(*previous_date)
            ),
            "If the new time does not work for you, please contact us.",
        ),
        EventKind::Cancelled => (
            "Appointment Cancelled".to_string(),
            "Your appointment has been cancelled.".to_string(),
            "We hope to see you again soon. Book a new appointment any time.",
        ),
        EventKind::Reminder => (
            "Appointment Reminder".to_string(),
            "This is a reminder of your appointment tomorrow.".to_string(),
            "See you soon!",
        ),
    };

    let body = format!(
        "Hi {name},\n\n{intro}\n\nService: {service}\nDate: {date}\nTime: {time}\n{notes}\n{outro}\n\nBest regards,\n{business}\n",
        name = event.client.full_name,
        service = appointment.service_name,
        time = appointment.start_time,
        business = event.business_name,
    );
    EmailMessage { subject, body }
}

pub fn sms_for(event: &AppointmentEvent) -> String {
    let appointment = &event.appointment;
    let business = &event.business_name;
    let service = &appointment.service_name;
    let date = format_date(appointment.date);
    let time = appointment.start_time;

    match &event.kind {
        EventKind::Confirmed => {
            format!("{business}: Your {service} appointment is confirmed for {date} at {time}.")
        }
        EventKind::Rescheduled { .. } => {
            format!("{business}: Your {service} appointment was rescheduled to {date} at {time}.")
        }
        EventKind::Cancelled => {
            format!("{business}: Your {service} appointment on {date} at {time} was cancelled.")
        }
        EventKind::Reminder => {
            format!("{business}: Reminder, your {service} appointment is tomorrow at {time}.")
        }
    }
}
