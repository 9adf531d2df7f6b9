use crate::{
    messages::{email_for, format_phone, sms_for, EmailMessage},
    time_arithmetic::TimeOfDay,
    types::{Appointment, Client},
};
use chrono::NaiveDate;
use futures::StreamExt;
#[cfg(test)]
use mockall::automock;
use thiserror::Error;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Confirmed,
    Rescheduled {
        previous_date: NaiveDate,
        previous_start: TimeOfDay,
    },
    Cancelled,
    Reminder,
}

/// Emitted after an appointment change has been committed.
#[derive(Debug, Clone, PartialEq)]
pub struct AppointmentEvent {
    pub kind: EventKind,
    pub appointment: Appointment,
    pub client: Client,
    pub business_name: String,
}

pub type EventSender = UnboundedSender<AppointmentEvent>;
pub type EventReceiver = UnboundedReceiver<AppointmentEvent>;

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Email delivery failed: {0}")]
    Email(String),
    #[error("SMS delivery failed: {0}")]
    Sms(String),
}

/// Message transport. Implementations may block; the worker runs on its own task.
#[cfg_attr(test, automock)]
pub trait Notifier {
    fn send_email(&self, to: &str, message: &EmailMessage) -> Result<(), NotificationError>;
    fn send_sms(&self, to: &str, body: &str) -> Result<(), NotificationError>;
}

/// Transport that only writes the rendered messages to the log.
/// Recipients a real gateway would refuse are rejected the same way.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send_email(&self, to: &str, message: &EmailMessage) -> Result<(), NotificationError> {
        if !to.contains('@') {
            return Err(NotificationError::Email(format!("invalid address '{to}'")));
        }
        info!(to, subject = %message.subject, body = %message.body, "Email");
        Ok(())
    }

    fn send_sms(&self, to: &str, body: &str) -> Result<(), NotificationError> {
        let digits = to.strip_prefix('+').unwrap_or_default();
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(NotificationError::Sms(format!("invalid number '{to}'")));
        }
        info!(to, body, "SMS");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub email_sent: bool,
    pub sms_sent: bool,
}

pub struct NotificationWorker<N> {
    notifier: N,
    phone_country_code: String,
}

impl<N: Notifier> NotificationWorker<N> {
    pub fn new(notifier: N, phone_country_code: impl Into<String>) -> Self {
        Self {
            notifier,
            phone_country_code: phone_country_code.into(),
        }
    }

    /// Delivers events until every sender is dropped.
    pub async fn run(self, receiver: EventReceiver) {
        let mut events = UnboundedReceiverStream::new(receiver);
        while let Some(event) = events.next().await {
            let delivery = self.deliver(&event);
            info!(
                appointment = %event.appointment.id,
                kind = ?event.kind,
                email = delivery.email_sent,
                sms = delivery.sms_sent,
                "Notification processed"
            );
        }
        info!("Notification channel closed");
    }

    /// Failures are logged and never retried.
    pub fn deliver(&self, event: &AppointmentEvent) -> Delivery {
        let mut delivery = Delivery::default();

        if let Some(email) = event.client.email.as_deref().filter(|email| !email.is_empty()) {
            match self.notifier.send_email(email, &email_for(event)) {
                Ok(()) => delivery.email_sent = true,
                Err(err) => warn!(%err, appointment = %event.appointment.id, "Failed to send email"),
            }
        }

        let phone = event
            .client
            .phone
            .as_deref()
            .and_then(|phone| format_phone(phone, &self.phone_country_code));
        if let Some(phone) = phone {
            match self.notifier.send_sms(&phone, &sms_for(event)) {
                Ok(()) => delivery.sms_sent = true,
                Err(err) => warn!(%err, appointment = %event.appointment.id, "Failed to send SMS"),
            }
        }
        delivery
    }
}
