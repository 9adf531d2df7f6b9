use crate::{
    backend::{BackendError, SchedulingBackend},
    errors::SchedulingError,
    notifications::{AppointmentEvent, EventKind, EventSender},
    types::{Appointment, AppointmentStatus},
};
use chrono::{Local, NaiveDate};
use std::time::Duration;
use tokio::time::interval;
use tracing::{error, info, warn};
use uuid::Uuid;

pub fn tomorrow() -> Option<NaiveDate> {
    Local::now().date_naive().succ_opt()
}

/// Queues a reminder for one appointment on demand, even if one went out before.
pub fn send_reminder<T: SchedulingBackend>(
    backend: &T,
    events: &EventSender,
    id: Uuid,
) -> Result<Appointment, SchedulingError> {
    let appointment = backend
        .appointment(id)?
        .ok_or(SchedulingError::NotFound("Appointment"))?;
    if appointment.status.is_terminal() {
        return Err(SchedulingError::Validation(format!(
            "Appointment is {} and gets no reminder",
            appointment.status
        )));
    }
    let client = backend
        .client(appointment.client_id)?
        .ok_or(SchedulingError::NotFound("Client"))?;
    let business_name = backend.settings()?.business_name;

    let event = AppointmentEvent {
        kind: EventKind::Reminder,
        appointment: appointment.clone(),
        client,
        business_name,
    };
    events
        .send(event)
        .map_err(|err| SchedulingError::Internal(format!("Notification queue closed: {err}")))?;
    backend.mark_reminder_sent(id)?;
    info!(%id, "Reminder queued on request");
    Ok(Appointment {
        reminder_sent: true,
        ..appointment
    })
}

/// Queues a reminder for every open appointment on `date` that hasn't had one yet.
/// Returns how many reminders were queued.
pub fn send_due_reminders<T: SchedulingBackend>(
    backend: &T,
    events: &EventSender,
    date: NaiveDate,
) -> Result<usize, BackendError> {
    let business_name = backend.settings()?.business_name;
    let due = backend.appointments(Some(date))?.into_iter().filter(|appointment| {
        matches!(
            appointment.status,
            AppointmentStatus::Pending | AppointmentStatus::Confirmed
        ) && !appointment.reminder_sent
    });

    let mut queued = 0;
    for appointment in due {
        let Some(client) = backend.client(appointment.client_id)? else {
            warn!(id = %appointment.id, "No client for reminder");
            continue;
        };
        let id = appointment.id;
        let event = AppointmentEvent {
            kind: EventKind::Reminder,
            appointment,
            client,
            business_name: business_name.clone(),
        };
        if let Err(err) = events.send(event) {
            warn!(%err, %id, "Failed to queue reminder");
            continue;
        }
        backend.mark_reminder_sent(id)?;
        queued += 1;
    }
    Ok(queued)
}

/// Sweeps tomorrow's appointments every `period`.
pub async fn run_reminders<T: SchedulingBackend>(backend: T, events: EventSender, period: Duration) {
    let mut ticker = interval(period);
    loop {
        ticker.tick().await;
        let Some(tomorrow) = tomorrow() else {
            continue;
        };
        match send_due_reminders(&backend, &events, tomorrow) {
            Ok(queued) => info!(%tomorrow, queued, "Reminder sweep finished"),
            Err(err) => error!(?err, %tomorrow, "Reminder sweep failed"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        conflict_detector::ConflictCheck,
        local_store::LocalStore,
        testutils::{appointment, date},
        types::NewClient,
    };
    use tokio::sync::mpsc;

    #[test]
    fn test_reminders_are_sent_once_for_open_appointments() {
        let store = LocalStore::default();
        let client = store
            .add_client(NewClient {
                full_name: "Ada Obi".into(),
                email: Some("ada@example.com".into()),
                phone: None,
            })
            .unwrap();
        let check = ConflictCheck::default();

        let mut confirmed = appointment("2025-03-15", "09:00", "10:00");
        let mut pending = appointment("2025-03-15", "10:00", "11:00");
        let mut cancelled = appointment("2025-03-15", "11:00", "12:00");
        let mut other_day = appointment("2025-03-16", "09:00", "10:00");
        pending.status = AppointmentStatus::Pending;
        cancelled.status = AppointmentStatus::Cancelled;
        for appointment in [&mut confirmed, &mut pending, &mut cancelled, &mut other_day] {
            appointment.client_id = client.id;
            store.insert_appointment(appointment, &check).unwrap();
        }
        let orphan = appointment("2025-03-15", "14:00", "15:00");
        store.insert_appointment(&orphan, &check).unwrap();

        let (sender, mut receiver) = mpsc::unbounded_channel();
        let queued = send_due_reminders(&store, &sender, date("2025-03-15")).unwrap();
        assert_eq!(queued, 2);

        let first = receiver.try_recv().unwrap();
        let second = receiver.try_recv().unwrap();
        assert_eq!(first.kind, EventKind::Reminder);
        assert_eq!(first.appointment.id, confirmed.id);
        assert_eq!(second.appointment.id, pending.id);
        assert!(receiver.try_recv().is_err());

        assert!(store.appointment(confirmed.id).unwrap().unwrap().reminder_sent);
        assert!(!store.appointment(orphan.id).unwrap().unwrap().reminder_sent);

        let queued = send_due_reminders(&store, &sender, date("2025-03-15")).unwrap();
        assert_eq!(queued, 0);
    }

    #[test]
    fn test_manual_reminder_marks_appointment() {
        let store = LocalStore::default();
        let client = store
            .add_client(NewClient {
                full_name: "Ada Obi".into(),
                email: None,
                phone: Some("08031234567".into()),
            })
            .unwrap();
        let check = ConflictCheck::default();
        let mut open = appointment("2025-03-15", "09:00", "10:00");
        let mut completed = appointment("2025-03-15", "10:00", "11:00");
        open.client_id = client.id;
        open.reminder_sent = true;
        completed.client_id = client.id;
        completed.status = AppointmentStatus::Completed;
        let orphan = appointment("2025-03-15", "12:00", "13:00");
        for appointment in [&open, &completed, &orphan] {
            store.insert_appointment(appointment, &check).unwrap();
        }

        let (sender, mut receiver) = mpsc::unbounded_channel();
        let reminded = send_reminder(&store, &sender, open.id).unwrap();
        assert!(reminded.reminder_sent);
        let event = receiver.try_recv().unwrap();
        assert_eq!(event.kind, EventKind::Reminder);
        assert_eq!(event.client, client);

        let err = send_reminder(&store, &sender, completed.id).unwrap_err();
        assert!(matches!(err, SchedulingError::Validation(_)));
        let err = send_reminder(&store, &sender, orphan.id).unwrap_err();
        assert!(matches!(err, SchedulingError::NotFound("Client")));
        let err = send_reminder(&store, &sender, Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, SchedulingError::NotFound("Appointment")));
        assert!(receiver.try_recv().is_err());

        drop(receiver);
        let err = send_reminder(&store, &sender, open.id).unwrap_err();
        assert!(matches!(err, SchedulingError::Internal(_)));
    }
}
