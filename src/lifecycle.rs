//! Appointment lifecycle: validate, commit, then announce.
//!
//! Every write follows the same order. Business hours and conflicts are checked
//! against a fresh read first, then the backend repeats the conflict check inside
//! its atomic commit. Nothing is written when any check fails. Notification events
//! are published only after a successful commit.

use crate::{
    backend::SchedulingBackend,
    business_hours::is_within_business_hours,
    conflict_detector::{find_conflict, CancelledAppointments, ConflictCheck},
    errors::SchedulingError,
    notifications::{AppointmentEvent, EventKind, EventSender},
    reminders,
    slot_generator::available_slots,
    time_arithmetic::{compute_end_time, TimeError, TimeOfDay},
    types::{
        Appointment, AppointmentStatus, BusinessSettings, Client, Interval, SettingsUpdate,
    },
};
use chrono::{NaiveDate, Utc};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct CreateAppointment {
    pub client_id: Uuid,
    pub service_id: Uuid,
    pub date: NaiveDate,
    pub time: TimeOfDay,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reschedule {
    pub date: Option<NaiveDate>,
    pub time: Option<TimeOfDay>,
    pub service_id: Option<Uuid>,
    pub notes: Option<String>,
}

#[derive(Clone)]
pub struct AppointmentLifecycle<T: SchedulingBackend> {
    backend: T,
    events: EventSender,
    cancelled: CancelledAppointments,
}

impl<T: SchedulingBackend> AppointmentLifecycle<T> {
    pub fn new(backend: T, events: EventSender, cancelled: CancelledAppointments) -> Self {
        Self {
            backend,
            events,
            cancelled,
        }
    }

    pub fn backend(&self) -> &T {
        &self.backend
    }

    pub fn create(&self, request: CreateAppointment) -> Result<Appointment, SchedulingError> {
        let client = self
            .backend
            .client(request.client_id)?
            .ok_or(SchedulingError::NotFound("Client"))?;
        let service = self
            .backend
            .service(request.service_id)?
            .ok_or(SchedulingError::NotFound("Service"))?;
        let settings = self.backend.settings()?;

        let interval = proposed_interval(request.date, request.time, service.duration_minutes)?;
        let check = ConflictCheck::new(self.cancelled);
        self.validate(&interval, &settings, &check)?;

        let now = Utc::now();
        let appointment = Appointment {
            id: Uuid::new_v4(),
            client_id: client.id,
            service_id: service.id,
            service_name: service.name,
            duration_minutes: service.duration_minutes,
            date: interval.date,
            start_time: interval.start,
            end_time: interval.end,
            status: AppointmentStatus::Confirmed,
            notes: request.notes.unwrap_or_default(),
            reminder_sent: false,
            created_at: now,
            updated_at: now,
        };
        self.backend.insert_appointment(&appointment, &check)?;
        info!(
            id = %appointment.id,
            date = %appointment.date,
            start = %appointment.start_time,
            end = %appointment.end_time,
            "Appointment booked"
        );

        self.publish(EventKind::Confirmed, &appointment, client, &settings);
        Ok(appointment)
    }

    pub fn reschedule(&self, id: Uuid, changes: Reschedule) -> Result<Appointment, SchedulingError> {
        let current = self.existing(id)?;
        if current.status.is_terminal() {
            return Err(SchedulingError::Validation(format!(
                "Appointment is {} and can no longer be changed",
                current.status
            )));
        }

        let mut updated = current.clone();
        if let Some(service_id) = changes.service_id {
            let service = self
                .backend
                .service(service_id)?
                .ok_or(SchedulingError::NotFound("Service"))?;
            updated.service_id = service.id;
            updated.service_name = service.name;
            updated.duration_minutes = service.duration_minutes;
        }
        if let Some(notes) = changes.notes {
            updated.notes = notes;
        }

        let date = changes.date.unwrap_or(current.date);
        let start = changes.time.unwrap_or(current.start_time);
        let moved = date != current.date || start != current.start_time;
        let interval_changed = moved || updated.duration_minutes != current.duration_minutes;

        let settings = self.backend.settings()?;
        let check = if interval_changed {
            let interval = proposed_interval(date, start, updated.duration_minutes)?;
            let check = ConflictCheck::new(self.cancelled).excluding(id);
            self.validate(&interval, &settings, &check)?;

            updated.date = interval.date;
            updated.start_time = interval.start;
            updated.end_time = interval.end;
            Some(check)
        } else {
            None
        };

        updated.updated_at = Utc::now();
        self.backend
            .update_appointment(&updated, current.updated_at, check.as_ref())?;
        info!(%id, moved, "Appointment updated");

        if moved {
            if let Some(client) = self.client_of(&updated) {
                let kind = EventKind::Rescheduled {
                    previous_date: current.date,
                    previous_start: current.start_time,
                };
                self.publish(kind, &updated, client, &settings);
            }
        }
        Ok(updated)
    }

    /// Frees the appointment's slot. Cancelling twice is a no-op.
    pub fn cancel(&self, id: Uuid) -> Result<Appointment, SchedulingError> {
        let current = self.existing(id)?;
        if current.status == AppointmentStatus::Cancelled {
            return Ok(current);
        }
        self.ensure_transition(&current, AppointmentStatus::Cancelled)?;
        let settings = self.backend.settings()?;

        let cancelled = self.backend.set_status(id, AppointmentStatus::Cancelled)?;
        info!(%id, "Appointment cancelled");

        if let Some(client) = self.client_of(&cancelled) {
            self.publish(EventKind::Cancelled, &cancelled, client, &settings);
        }
        Ok(cancelled)
    }

    pub fn update_status(
        &self,
        id: Uuid,
        status: AppointmentStatus,
    ) -> Result<Appointment, SchedulingError> {
        let current = self.existing(id)?;
        self.ensure_transition(&current, status)?;

        let updated = self.backend.set_status(id, status)?;
        info!(%id, from = %current.status, to = %status, "Appointment status updated");
        Ok(updated)
    }

    pub fn delete(&self, id: Uuid) -> Result<(), SchedulingError> {
        self.backend.remove_appointment(id)?;
        info!(%id, "Appointment deleted");
        Ok(())
    }

    pub fn available_slots_for(
        &self,
        date: NaiveDate,
        service_id: Uuid,
    ) -> Result<Vec<TimeOfDay>, SchedulingError> {
        let service = self
            .backend
            .service(service_id)?
            .ok_or(SchedulingError::NotFound("Service"))?;
        let settings = self.backend.settings()?;
        let existing = self.backend.appointments(Some(date))?;
        available_slots(date, &service, &settings, &existing, self.cancelled)
    }

    pub fn appointment(&self, id: Uuid) -> Result<Appointment, SchedulingError> {
        self.existing(id)
    }

    pub fn appointments(&self, date: Option<NaiveDate>) -> Result<Vec<Appointment>, SchedulingError> {
        Ok(self.backend.appointments(date)?)
    }

    pub fn client_appointments(&self, client_id: Uuid) -> Result<Vec<Appointment>, SchedulingError> {
        self.backend
            .client(client_id)?
            .ok_or(SchedulingError::NotFound("Client"))?;
        Ok(self.backend.client_appointments(client_id)?)
    }

    pub fn send_reminder(&self, id: Uuid) -> Result<Appointment, SchedulingError> {
        reminders::send_reminder(&self.backend, &self.events, id)
    }

    /// Reminders for every open appointment on `date` that has not had one.
    pub fn send_due_reminders(&self, date: NaiveDate) -> Result<usize, SchedulingError> {
        Ok(reminders::send_due_reminders(&self.backend, &self.events, date)?)
    }

    pub fn settings(&self) -> Result<BusinessSettings, SchedulingError> {
        Ok(self.backend.settings()?)
    }

    /// Applies a partial settings write, rejecting results the slot generator can't use.
    pub fn update_settings(&self, update: SettingsUpdate) -> Result<BusinessSettings, SchedulingError> {
        let settings = update.apply_to(self.backend.settings()?);
        settings.check_configuration()?;
        let settings = self.backend.update_settings(settings)?;
        info!(
            opening = %settings.opening_time,
            closing = %settings.closing_time,
            interval = settings.slot_interval_minutes,
            "Business settings updated"
        );
        Ok(settings)
    }

    fn validate(
        &self,
        interval: &Interval,
        settings: &BusinessSettings,
        check: &ConflictCheck,
    ) -> Result<(), SchedulingError> {
        if !is_within_business_hours(interval, settings) {
            warn!(date = %interval.date, start = %interval.start, end = %interval.end, "Booking outside business hours");
            return Err(SchedulingError::OutsideBusinessHours);
        }
        let same_date = self.backend.appointments(Some(interval.date))?;
        if let Some(conflict) = find_conflict(interval, &same_date, check) {
            warn!(date = %interval.date, start = %interval.start, with = %conflict.id, "Booking conflicts");
            return Err(SchedulingError::Conflict {
                with: Some(conflict.id),
            });
        }
        Ok(())
    }

    fn ensure_transition(
        &self,
        current: &Appointment,
        next: AppointmentStatus,
    ) -> Result<(), SchedulingError> {
        if current.status.can_transition_to(next) {
            return Ok(());
        }
        Err(SchedulingError::Validation(format!(
            "Appointment can't change from {} to {next}",
            current.status
        )))
    }

    fn existing(&self, id: Uuid) -> Result<Appointment, SchedulingError> {
        self.backend
            .appointment(id)?
            .ok_or(SchedulingError::NotFound("Appointment"))
    }

    /// Missing clients only suppress the notification.
    fn client_of(&self, appointment: &Appointment) -> Option<Client> {
        match self.backend.client(appointment.client_id) {
            Ok(client) => client,
            Err(err) => {
                warn!(%err, id = %appointment.id, "Client lookup for notification failed");
                None
            }
        }
    }

    fn publish(
        &self,
        kind: EventKind,
        appointment: &Appointment,
        client: Client,
        settings: &BusinessSettings,
    ) {
        let event = AppointmentEvent {
            kind,
            appointment: appointment.clone(),
            client,
            business_name: settings.business_name.clone(),
        };
        if let Err(err) = self.events.send(event) {
            warn!(%err, id = %appointment.id, "Failed to queue notification");
        }
    }
}

/// Intervals that would run past midnight are necessarily after closing.
fn proposed_interval(
    date: NaiveDate,
    start: TimeOfDay,
    duration_minutes: u32,
) -> Result<Interval, SchedulingError> {
    let end = compute_end_time(start, duration_minutes).map_err(|err| match err {
        TimeError::PastMidnight(_) => SchedulingError::OutsideBusinessHours,
        other => SchedulingError::InvalidTimeFormat(other),
    })?;
    Interval::new(date, start, end)
}
