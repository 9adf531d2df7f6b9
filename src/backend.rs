use crate::{
    conflict_detector::ConflictCheck,
    errors::SchedulingError,
    types::{
        Appointment, AppointmentStatus, BusinessSettings, Client, NewClient, NewService, Service,
    },
};
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Overlaps with an existing appointment")]
    Conflict(Option<Uuid>),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("Appointment {0} changed since it was read")]
    Stale(Uuid),
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("Stored data is invalid: {0}")]
    Corrupt(String),
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl From<BackendError> for SchedulingError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Conflict(with) => SchedulingError::Conflict { with },
            BackendError::NotFound(what) => SchedulingError::NotFound(what),
            BackendError::Stale(id) => SchedulingError::Stale(id),
            other => SchedulingError::Internal(other.to_string()),
        }
    }
}

/// Storage the scheduling core reads from and commits to.
///
/// `insert_appointment` and `update_appointment` must run the conflict check and the
/// write as one atomic step, so two concurrent bookings can never both commit an
/// overlapping interval.
pub trait SchedulingBackend: Clone + Send + Sync + 'static {
    /// Current settings, created with defaults on first access.
    fn settings(&self) -> Result<BusinessSettings, BackendError>;
    fn update_settings(&self, settings: BusinessSettings) -> Result<BusinessSettings, BackendError>;

    fn services(&self) -> Result<Vec<Service>, BackendError>;
    fn service(&self, id: Uuid) -> Result<Option<Service>, BackendError>;
    fn add_service(&self, service: NewService) -> Result<Service, BackendError>;

    fn client(&self, id: Uuid) -> Result<Option<Client>, BackendError>;
    fn add_client(&self, client: NewClient) -> Result<Client, BackendError>;

    fn appointment(&self, id: Uuid) -> Result<Option<Appointment>, BackendError>;
    /// All appointments, or those on `date`, ordered by date and start time.
    fn appointments(&self, date: Option<NaiveDate>) -> Result<Vec<Appointment>, BackendError>;
    fn client_appointments(&self, client_id: Uuid) -> Result<Vec<Appointment>, BackendError>;

    fn insert_appointment(
        &self,
        appointment: &Appointment,
        check: &ConflictCheck,
    ) -> Result<(), BackendError>;
    /// Writes the schedule fields of `appointment` (see [`Appointment::take_schedule_from`]).
    ///
    /// Fails with `Stale` unless the stored `updated_at` still equals `read_version`.
    /// With a `check`, the new interval is re-validated against the other appointments
    /// of its date. Version check, conflict check and write form one atomic step.
    fn update_appointment(
        &self,
        appointment: &Appointment,
        read_version: DateTime<Utc>,
        check: Option<&ConflictCheck>,
    ) -> Result<(), BackendError>;
    fn set_status(&self, id: Uuid, status: AppointmentStatus) -> Result<Appointment, BackendError>;
    fn mark_reminder_sent(&self, id: Uuid) -> Result<(), BackendError>;
    fn remove_appointment(&self, id: Uuid) -> Result<(), BackendError>;
}
