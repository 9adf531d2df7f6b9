use crate::{
    backend::{BackendError, SchedulingBackend},
    conflict_detector::{find_conflict, ConflictCheck},
    schema::{appointments, business_settings, clients, services},
    time_arithmetic::TimeOfDay,
    types::{
        Appointment, AppointmentStatus, BusinessSettings, Client, NewClient, NewService, Service,
    },
};
use chrono::{DateTime, NaiveDate, Utc};
use diesel::{
    pg::PgConnection,
    prelude::*,
    result::{DatabaseErrorKind, Error as DieselError},
    ConnectionError,
};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{error, warn};
use uuid::Uuid;

const SETTINGS_ID: i32 = 1;
const NO_OVERLAP_CONSTRAINT: &str = "appointments_no_overlap";
const MAX_TRANSACTION_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = appointments)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct AppointmentRow {
    id: Uuid,
    client_id: Uuid,
    service_id: Uuid,
    service_name: String,
    duration_minutes: i32,
    appointment_date: NaiveDate,
    start_minute: i32,
    end_minute: i32,
    status: String,
    notes: String,
    reminder_sent: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Columns a reschedule may change.
#[derive(Debug, AsChangeset)]
#[diesel(table_name = appointments)]
struct ScheduleChangeset<'a> {
    service_id: Uuid,
    service_name: &'a str,
    duration_minutes: i32,
    appointment_date: NaiveDate,
    start_minute: i32,
    end_minute: i32,
    notes: &'a str,
    updated_at: DateTime<Utc>,
}

impl<'a> From<&'a AppointmentRow> for ScheduleChangeset<'a> {
    fn from(row: &'a AppointmentRow) -> Self {
        Self {
            service_id: row.service_id,
            service_name: &row.service_name,
            duration_minutes: row.duration_minutes,
            appointment_date: row.appointment_date,
            start_minute: row.start_minute,
            end_minute: row.end_minute,
            notes: &row.notes,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = business_settings)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct SettingsRow {
    id: i32,
    opening_minute: i32,
    closing_minute: i32,
    slot_interval_minutes: i32,
    buffer_minutes: i32,
    max_advance_booking_days: i32,
    business_name: String,
    contact_email: String,
    contact_phone: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = services)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct ServiceRow {
    id: Uuid,
    name: String,
    price: f64,
    duration_minutes: i32,
    description: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = clients)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct ClientRow {
    id: Uuid,
    full_name: String,
    email: Option<String>,
    phone: Option<String>,
}

fn corrupt(err: impl ToString) -> BackendError {
    BackendError::Corrupt(err.to_string())
}

fn time_of_day(minutes: i32) -> Result<TimeOfDay, BackendError> {
    let minutes = u32::try_from(minutes).map_err(corrupt)?;
    TimeOfDay::from_minutes(minutes).map_err(corrupt)
}

fn stored_minutes(time: TimeOfDay) -> i32 {
    time.minutes() as i32
}

impl From<&Appointment> for AppointmentRow {
    fn from(appointment: &Appointment) -> Self {
        Self {
            id: appointment.id,
            client_id: appointment.client_id,
            service_id: appointment.service_id,
            service_name: appointment.service_name.clone(),
            duration_minutes: appointment.duration_minutes as i32,
            appointment_date: appointment.date,
            start_minute: stored_minutes(appointment.start_time),
            end_minute: stored_minutes(appointment.end_time),
            status: appointment.status.as_str().to_string(),
            notes: appointment.notes.clone(),
            reminder_sent: appointment.reminder_sent,
            created_at: appointment.created_at,
            updated_at: appointment.updated_at,
        }
    }
}

impl TryFrom<AppointmentRow> for Appointment {
    type Error = BackendError;

    fn try_from(row: AppointmentRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            client_id: row.client_id,
            service_id: row.service_id,
            service_name: row.service_name,
            duration_minutes: u32::try_from(row.duration_minutes).map_err(corrupt)?,
            date: row.appointment_date,
            start_time: time_of_day(row.start_minute)?,
            end_time: time_of_day(row.end_minute)?,
            status: row.status.parse::<AppointmentStatus>().map_err(corrupt)?,
            notes: row.notes,
            reminder_sent: row.reminder_sent,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl From<&BusinessSettings> for SettingsRow {
    fn from(settings: &BusinessSettings) -> Self {
        Self {
            id: SETTINGS_ID,
            opening_minute: stored_minutes(settings.opening_time),
            closing_minute: stored_minutes(settings.closing_time),
            slot_interval_minutes: settings.slot_interval_minutes,
            buffer_minutes: settings.buffer_minutes,
            max_advance_booking_days: settings.max_advance_booking_days,
            business_name: settings.business_name.clone(),
            contact_email: settings.contact_email.clone(),
            contact_phone: settings.contact_phone.clone(),
        }
    }
}

impl TryFrom<SettingsRow> for BusinessSettings {
    type Error = BackendError;

    fn try_from(row: SettingsRow) -> Result<Self, Self::Error> {
        Ok(Self {
            opening_time: time_of_day(row.opening_minute)?,
            closing_time: time_of_day(row.closing_minute)?,
            slot_interval_minutes: row.slot_interval_minutes,
            buffer_minutes: row.buffer_minutes,
            max_advance_booking_days: row.max_advance_booking_days,
            business_name: row.business_name,
            contact_email: row.contact_email,
            contact_phone: row.contact_phone,
        })
    }
}

impl TryFrom<ServiceRow> for Service {
    type Error = BackendError;

    fn try_from(row: ServiceRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            name: row.name,
            price: row.price,
            duration_minutes: u32::try_from(row.duration_minutes).map_err(corrupt)?,
            description: row.description,
        })
    }
}

impl From<ClientRow> for Client {
    fn from(row: ClientRow) -> Self {
        Self {
            id: row.id,
            full_name: row.full_name,
            email: row.email,
            phone: row.phone,
        }
    }
}

fn load_appointments(rows: Vec<AppointmentRow>) -> Result<Vec<Appointment>, BackendError> {
    rows.into_iter().map(Appointment::try_from).collect()
}

/// Re-runs the conflict check against the rows visible inside the current transaction.
fn conflict_on(
    connection: &mut PgConnection,
    appointment: &Appointment,
    check: &ConflictCheck,
) -> Result<Option<Uuid>, BackendError> {
    let rows = appointments::table
        .filter(appointments::appointment_date.eq(appointment.date))
        .select(AppointmentRow::as_select())
        .load(connection)?;
    let same_date = load_appointments(rows)?;
    Ok(find_conflict(&appointment.interval(), &same_date, check).map(|existing| existing.id))
}

#[derive(Clone)]
pub struct DatabaseInterface {
    connection: Arc<Mutex<PgConnection>>,
}

impl DatabaseInterface {
    pub fn new(database_url: &str) -> Result<Self, ConnectionError> {
        let connection = Self::establish_connection(database_url)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    fn establish_connection(database_url: &str) -> Result<PgConnection, ConnectionError> {
        PgConnection::establish(database_url)
    }

    fn connection(&self) -> Result<MutexGuard<'_, PgConnection>, BackendError> {
        self.connection.lock().map_err(|err| {
            error!(%err, "Database connection lock poisoned");
            BackendError::Unavailable("database connection lock poisoned".into())
        })
    }

    /// Runs `operation` in a SERIALIZABLE transaction, retrying serialization failures.
    /// A violation of the overlap exclusion constraint is reported as a conflict.
    fn serialized<R>(
        &self,
        operation: impl Fn(&mut PgConnection) -> Result<R, BackendError>,
    ) -> Result<R, BackendError> {
        let mut connection = self.connection()?;
        let mut attempt = 1;
        loop {
            let result = connection
                .build_transaction()
                .serializable()
                .run(|connection| operation(connection));

            match result {
                Err(BackendError::Database(DieselError::DatabaseError(
                    DatabaseErrorKind::SerializationFailure,
                    _,
                ))) if attempt < MAX_TRANSACTION_ATTEMPTS => {
                    warn!(attempt, "Serialization failure, retrying transaction");
                    attempt += 1;
                }
                Err(BackendError::Database(DieselError::DatabaseError(_, info)))
                    if info.constraint_name() == Some(NO_OVERLAP_CONSTRAINT) =>
                {
                    warn!("Overlap rejected by exclusion constraint");
                    return Err(BackendError::Conflict(None));
                }
                other => return other,
            }
        }
    }
}

impl SchedulingBackend for DatabaseInterface {
    fn settings(&self) -> Result<BusinessSettings, BackendError> {
        let mut connection = self.connection()?;
        let stored = business_settings::table
            .find(SETTINGS_ID)
            .select(SettingsRow::as_select())
            .first(&mut *connection)
            .optional()?;

        match stored {
            Some(row) => row.try_into(),
            None => {
                let defaults = BusinessSettings::default();
                diesel::insert_into(business_settings::table)
                    .values(SettingsRow::from(&defaults))
                    .on_conflict_do_nothing()
                    .execute(&mut *connection)?;
                Ok(defaults)
            }
        }
    }

    fn update_settings(&self, settings: BusinessSettings) -> Result<BusinessSettings, BackendError> {
        let mut connection = self.connection()?;
        let row = SettingsRow::from(&settings);
        diesel::insert_into(business_settings::table)
            .values(&row)
            .on_conflict(business_settings::id)
            .do_update()
            .set(&row)
            .execute(&mut *connection)?;
        Ok(settings)
    }

    fn services(&self) -> Result<Vec<Service>, BackendError> {
        let mut connection = self.connection()?;
        services::table
            .order(services::name.asc())
            .select(ServiceRow::as_select())
            .load(&mut *connection)?
            .into_iter()
            .map(Service::try_from)
            .collect()
    }

    fn service(&self, id: Uuid) -> Result<Option<Service>, BackendError> {
        let mut connection = self.connection()?;
        services::table
            .find(id)
            .select(ServiceRow::as_select())
            .first(&mut *connection)
            .optional()?
            .map(Service::try_from)
            .transpose()
    }

    fn add_service(&self, service: NewService) -> Result<Service, BackendError> {
        let mut connection = self.connection()?;
        let duration_minutes = i32::try_from(service.duration_minutes).map_err(|_| {
            BackendError::Corrupt(format!(
                "Service duration {} does not fit a database column",
                service.duration_minutes
            ))
        })?;
        let row = ServiceRow {
            id: Uuid::new_v4(),
            name: service.name,
            price: service.price,
            duration_minutes,
            description: service.description,
        };
        diesel::insert_into(services::table)
            .values(&row)
            .execute(&mut *connection)?;
        row.try_into()
    }

    fn client(&self, id: Uuid) -> Result<Option<Client>, BackendError> {
        let mut connection = self.connection()?;
        let row = clients::table
            .find(id)
            .select(ClientRow::as_select())
            .first(&mut *connection)
            .optional()?;
        Ok(row.map(Client::from))
    }

    fn add_client(&self, client: NewClient) -> Result<Client, BackendError> {
        let mut connection = self.connection()?;
        let row = ClientRow {
            id: Uuid::new_v4(),
            full_name: client.full_name,
            email: client.email,
            phone: client.phone,
        };
        diesel::insert_into(clients::table)
            .values(&row)
            .execute(&mut *connection)?;
        Ok(row.into())
    }

    fn appointment(&self, id: Uuid) -> Result<Option<Appointment>, BackendError> {
        let mut connection = self.connection()?;
        appointments::table
            .find(id)
            .select(AppointmentRow::as_select())
            .first(&mut *connection)
            .optional()?
            .map(Appointment::try_from)
            .transpose()
    }

    fn appointments(&self, date: Option<NaiveDate>) -> Result<Vec<Appointment>, BackendError> {
        let mut connection = self.connection()?;
        let mut query = appointments::table
            .select(AppointmentRow::as_select())
            .order((appointments::appointment_date.asc(), appointments::start_minute.asc()))
            .into_boxed();
        if let Some(date) = date {
            query = query.filter(appointments::appointment_date.eq(date));
        }
        load_appointments(query.load(&mut *connection)?)
    }

    fn client_appointments(&self, client_id: Uuid) -> Result<Vec<Appointment>, BackendError> {
        let mut connection = self.connection()?;
        let rows = appointments::table
            .filter(appointments::client_id.eq(client_id))
            .order((appointments::appointment_date.asc(), appointments::start_minute.asc()))
            .select(AppointmentRow::as_select())
            .load(&mut *connection)?;
        load_appointments(rows)
    }

    fn insert_appointment(
        &self,
        appointment: &Appointment,
        check: &ConflictCheck,
    ) -> Result<(), BackendError> {
        let row = AppointmentRow::from(appointment);
        self.serialized(|connection| {
            if let Some(conflict) = conflict_on(connection, appointment, check)? {
                return Err(BackendError::Conflict(Some(conflict)));
            }
            diesel::insert_into(appointments::table)
                .values(&row)
                .execute(connection)?;
            Ok(())
        })
    }

    fn update_appointment(
        &self,
        appointment: &Appointment,
        read_version: DateTime<Utc>,
        check: Option<&ConflictCheck>,
    ) -> Result<(), BackendError> {
        let row = AppointmentRow::from(appointment);
        self.serialized(|connection| {
            let stored_version = appointments::table
                .find(appointment.id)
                .select(appointments::updated_at)
                .first::<DateTime<Utc>>(connection)
                .optional()?
                .ok_or(BackendError::NotFound("Appointment"))?;
            if stored_version != read_version {
                return Err(BackendError::Stale(appointment.id));
            }
            if let Some(check) = check {
                let check = check.excluding(appointment.id);
                if let Some(conflict) = conflict_on(connection, appointment, &check)? {
                    return Err(BackendError::Conflict(Some(conflict)));
                }
            }
            diesel::update(appointments::table.find(appointment.id))
                .set(ScheduleChangeset::from(&row))
                .execute(connection)?;
            Ok(())
        })
    }

    fn set_status(&self, id: Uuid, status: AppointmentStatus) -> Result<Appointment, BackendError> {
        let mut connection = self.connection()?;
        let row = diesel::update(appointments::table.find(id))
            .set((
                appointments::status.eq(status.as_str()),
                appointments::updated_at.eq(Utc::now()),
            ))
            .returning(AppointmentRow::as_returning())
            .get_result(&mut *connection)
            .optional()?;
        row.ok_or(BackendError::NotFound("Appointment"))?
            .try_into()
    }

    fn mark_reminder_sent(&self, id: Uuid) -> Result<(), BackendError> {
        let mut connection = self.connection()?;
        let updated = diesel::update(appointments::table.find(id))
            .set(appointments::reminder_sent.eq(true))
            .execute(&mut *connection)?;
        if updated == 0 {
            return Err(BackendError::NotFound("Appointment"));
        }
        Ok(())
    }

    fn remove_appointment(&self, id: Uuid) -> Result<(), BackendError> {
        let mut connection = self.connection()?;
        let deleted = diesel::delete(appointments::table.find(id)).execute(&mut *connection)?;
        if deleted == 0 {
            error!(%id, "Deletion failed. 0 database lines were changed");
            return Err(BackendError::NotFound("Appointment"));
        }
        Ok(())
    }
}
