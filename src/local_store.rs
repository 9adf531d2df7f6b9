use crate::{
    backend::{BackendError, SchedulingBackend},
    conflict_detector::{find_conflict, ConflictCheck},
    types::{
        Appointment, AppointmentStatus, BusinessSettings, Client, NewClient, NewService, Service,
    },
};
use chrono::{DateTime, NaiveDate, Utc};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};
use tracing::error;
use uuid::Uuid;

#[derive(Debug, Default)]
struct LocalState {
    settings: Option<BusinessSettings>,
    services: HashMap<Uuid, Service>,
    clients: HashMap<Uuid, Client>,
    appointments: HashMap<Uuid, Appointment>,
}

impl LocalState {
    fn conflicting(&self, appointment: &Appointment, check: &ConflictCheck) -> Option<Uuid> {
        let same_date = self
            .appointments
            .values()
            .filter(|existing| existing.date == appointment.date);
        find_conflict(&appointment.interval(), same_date, check).map(|existing| existing.id)
    }
}

/// Non-persistent backend. Everything is lost on restart.
#[derive(Debug, Clone, Default)]
pub struct LocalStore {
    state: Arc<Mutex<LocalState>>,
}

impl LocalStore {
    fn state(&self) -> Result<MutexGuard<'_, LocalState>, BackendError> {
        self.state.lock().map_err(|err| {
            error!(%err, "Local store lock poisoned");
            BackendError::Unavailable("local store lock poisoned".into())
        })
    }
}

fn sorted(mut appointments: Vec<Appointment>) -> Vec<Appointment> {
    appointments.sort_unstable_by_key(|appointment| (appointment.date, appointment.start_time));
    appointments
}

impl SchedulingBackend for LocalStore {
    fn settings(&self) -> Result<BusinessSettings, BackendError> {
        Ok(self
            .state()?
            .settings
            .get_or_insert_with(BusinessSettings::default)
            .clone())
    }

    fn update_settings(&self, settings: BusinessSettings) -> Result<BusinessSettings, BackendError> {
        self.state()?.settings = Some(settings.clone());
        Ok(settings)
    }

    fn services(&self) -> Result<Vec<Service>, BackendError> {
        let mut services: Vec<Service> = self.state()?.services.values().cloned().collect();
        services.sort_unstable_by(|a, b| a.name.cmp(&b.name));
        Ok(services)
    }

    fn service(&self, id: Uuid) -> Result<Option<Service>, BackendError> {
        Ok(self.state()?.services.get(&id).cloned())
    }

    fn add_service(&self, service: NewService) -> Result<Service, BackendError> {
        let service = Service {
            id: Uuid::new_v4(),
            name: service.name,
            price: service.price,
            duration_minutes: service.duration_minutes,
            description: service.description,
        };
        self.state()?.services.insert(service.id, service.clone());
        Ok(service)
    }

    fn client(&self, id: Uuid) -> Result<Option<Client>, BackendError> {
        Ok(self.state()?.clients.get(&id).cloned())
    }

    fn add_client(&self, client: NewClient) -> Result<Client, BackendError> {
        let client = Client {
            id: Uuid::new_v4(),
            full_name: client.full_name,
            email: client.email,
            phone: client.phone,
        };
        self.state()?.clients.insert(client.id, client.clone());
        Ok(client)
    }

    fn appointment(&self, id: Uuid) -> Result<Option<Appointment>, BackendError> {
        Ok(self.state()?.appointments.get(&id).cloned())
    }

    fn appointments(&self, date: Option<NaiveDate>) -> Result<Vec<Appointment>, BackendError> {
        let appointments = self
            .state()?
            .appointments
            .values()
            .filter(|appointment| date.map_or(true, |date| appointment.date == date))
            .cloned()
            .collect();
        Ok(sorted(appointments))
    }

    fn client_appointments(&self, client_id: Uuid) -> Result<Vec<Appointment>, BackendError> {
        let appointments = self
            .state()?
            .appointments
            .values()
            .filter(|appointment| appointment.client_id == client_id)
            .cloned()
            .collect();
        Ok(sorted(appointments))
    }

    fn insert_appointment(
        &self,
        appointment: &Appointment,
        check: &ConflictCheck,
    ) -> Result<(), BackendError> {
        let mut state = self.state()?;
        if let Some(conflict) = state.conflicting(appointment, check) {
            return Err(BackendError::Conflict(Some(conflict)));
        }
        state
            .appointments
            .insert(appointment.id, appointment.clone());
        Ok(())
    }

    fn update_appointment(
        &self,
        appointment: &Appointment,
        read_version: DateTime<Utc>,
        check: Option<&ConflictCheck>,
    ) -> Result<(), BackendError> {
        let mut state = self.state()?;
        let stored_version = state
            .appointments
            .get(&appointment.id)
            .map(|stored| stored.updated_at)
            .ok_or(BackendError::NotFound("Appointment"))?;
        if stored_version != read_version {
            return Err(BackendError::Stale(appointment.id));
        }
        if let Some(check) = check {
            let check = check.excluding(appointment.id);
            if let Some(conflict) = state.conflicting(appointment, &check) {
                return Err(BackendError::Conflict(Some(conflict)));
            }
        }
        if let Some(stored) = state.appointments.get_mut(&appointment.id) {
            stored.take_schedule_from(appointment);
        }
        Ok(())
    }

    fn set_status(&self, id: Uuid, status: AppointmentStatus) -> Result<Appointment, BackendError> {
        let mut state = self.state()?;
        let appointment = state
            .appointments
            .get_mut(&id)
            .ok_or(BackendError::NotFound("Appointment"))?;
        appointment.status = status;
        appointment.updated_at = Utc::now();
        Ok(appointment.clone())
    }

    fn mark_reminder_sent(&self, id: Uuid) -> Result<(), BackendError> {
        let mut state = self.state()?;
        let appointment = state
            .appointments
            .get_mut(&id)
            .ok_or(BackendError::NotFound("Appointment"))?;
        appointment.reminder_sent = true;
        Ok(())
    }

    fn remove_appointment(&self, id: Uuid) -> Result<(), BackendError> {
        if self.state()?.appointments.remove(&id).is_none() {
            let err = "Appointment does not exist and can't be removed";
            error!(err);
            return Err(BackendError::NotFound("Appointment"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testutils::{appointment, date};
    use std::thread;

    #[test]
    fn test_settings_are_created_lazily_with_defaults() {
        let store = LocalStore::default();
        let settings = store.settings().unwrap();
        assert_eq!(settings, BusinessSettings::default());

        let changed = BusinessSettings {
            slot_interval_minutes: 15,
            ..settings
        };
        store.update_settings(changed.clone()).unwrap();
        assert_eq!(store.settings().unwrap(), changed);
    }

    #[test]
    fn test_insert_rejects_overlap_under_lock() {
        let store = LocalStore::default();
        let first = appointment("2025-03-14", "10:00", "11:00");
        let overlapping = appointment("2025-03-14", "10:30", "11:30");
        let back_to_back = appointment("2025-03-14", "11:00", "12:00");
        let check = ConflictCheck::default();

        store.insert_appointment(&first, &check).unwrap();
        let err = store.insert_appointment(&overlapping, &check).unwrap_err();
        assert!(matches!(err, BackendError::Conflict(Some(id)) if id == first.id));
        store.insert_appointment(&back_to_back, &check).unwrap();

        let stored = store.appointments(Some(date("2025-03-14"))).unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].id, first.id);
        assert_eq!(stored[1].id, back_to_back.id);
    }

    #[test]
    fn test_concurrent_inserts_commit_only_one_booking() {
        let store = LocalStore::default();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                thread::spawn(move || {
                    let candidate = appointment("2025-03-14", "10:00", "11:00");
                    store.insert_appointment(&candidate, &ConflictCheck::default())
                })
            })
            .collect();

        let committed = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(Result::is_ok)
            .count();
        assert_eq!(committed, 1);
        assert_eq!(store.appointments(None).unwrap().len(), 1);
    }

    #[test]
    fn test_update_excludes_itself() {
        let store = LocalStore::default();
        let mut booked = appointment("2025-03-14", "10:00", "11:00");
        let check = ConflictCheck::default();
        store.insert_appointment(&booked, &check).unwrap();

        let read_version = booked.updated_at;
        booked.start_time = "10:30".parse().unwrap();
        booked.end_time = "11:30".parse().unwrap();
        booked.updated_at = Utc::now();
        store
            .update_appointment(&booked, read_version, Some(&check))
            .unwrap();

        let stored = store.appointment(booked.id).unwrap().unwrap();
        assert_eq!(stored.start_time.to_string(), "10:30");
        assert_eq!(stored.updated_at, booked.updated_at);
    }

    #[test]
    fn test_update_from_stale_read_cannot_revive_cancelled_booking() {
        let store = LocalStore::default();
        let check = ConflictCheck::default();
        let first = appointment("2025-03-14", "10:00", "11:00");
        store.insert_appointment(&first, &check).unwrap();

        let read = store.appointment(first.id).unwrap().unwrap();
        store.set_status(first.id, AppointmentStatus::Cancelled).unwrap();
        let replacement = appointment("2025-03-14", "10:00", "11:00");
        store.insert_appointment(&replacement, &check).unwrap();

        let mut edited = read.clone();
        edited.notes = "bring reference photos".into();
        edited.updated_at = Utc::now();
        let err = store
            .update_appointment(&edited, read.updated_at, None)
            .unwrap_err();
        assert!(matches!(err, BackendError::Stale(id) if id == first.id));

        let live: Vec<Appointment> = store
            .appointments(Some(date("2025-03-14")))
            .unwrap()
            .into_iter()
            .filter(|appointment| appointment.status != AppointmentStatus::Cancelled)
            .collect();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].id, replacement.id);
        let stored = store.appointment(first.id).unwrap().unwrap();
        assert_eq!(stored.status, AppointmentStatus::Cancelled);
        assert_eq!(stored.notes, "");
    }

    #[test]
    fn test_update_keeps_status_and_reminder_state() {
        let store = LocalStore::default();
        let booked = appointment("2025-03-14", "10:00", "11:00");
        store
            .insert_appointment(&booked, &ConflictCheck::default())
            .unwrap();
        store.mark_reminder_sent(booked.id).unwrap();

        let mut edited = booked.clone();
        edited.status = AppointmentStatus::Pending;
        edited.reminder_sent = false;
        edited.notes = "gel removal first".into();
        store
            .update_appointment(&edited, booked.updated_at, None)
            .unwrap();

        let stored = store.appointment(booked.id).unwrap().unwrap();
        assert_eq!(stored.notes, "gel removal first");
        assert_eq!(stored.status, AppointmentStatus::Confirmed);
        assert!(stored.reminder_sent);
    }

    #[test]
    fn test_update_and_remove_missing_appointment() {
        let store = LocalStore::default();
        let missing = appointment("2025-03-14", "10:00", "11:00");

        let err = store
            .update_appointment(&missing, missing.updated_at, None)
            .unwrap_err();
        assert!(matches!(err, BackendError::NotFound(_)));
        store.set_status(missing.id, AppointmentStatus::Cancelled).unwrap_err();
        store.remove_appointment(missing.id).unwrap_err();
    }

    #[test]
    fn test_appointments_are_ordered_by_date_and_time() {
        let store = LocalStore::default();
        let check = ConflictCheck::default();
        let late = appointment("2025-03-15", "09:00", "10:00");
        let afternoon = appointment("2025-03-14", "14:00", "15:00");
        let morning = appointment("2025-03-14", "09:00", "10:00");
        for appointment in [&late, &afternoon, &morning] {
            store.insert_appointment(appointment, &check).unwrap();
        }

        let ids: Vec<Uuid> = store.appointments(None).unwrap().iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![morning.id, afternoon.id, late.id]);

        let by_client = store.client_appointments(morning.client_id).unwrap();
        assert_eq!(by_client.len(), 1);
    }
}
