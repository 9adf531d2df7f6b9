use crate::{
    backend::SchedulingBackend,
    configuration::Configuration,
    errors::SchedulingError,
    lifecycle::{AppointmentLifecycle, CreateAppointment, Reschedule},
    reminders::tomorrow,
    time_arithmetic::TimeOfDay,
    types::{
        Appointment, AppointmentStatus, BusinessSettings, Client, NewClient, NewService, Service,
        SettingsUpdate,
    },
};
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, Request, State,
    },
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post, put},
    Json, Router,
};
use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;
use uuid::Uuid;
use validator::Validate;

const ADMIN_HEADER: &str = "x-admin-password";

lazy_static! {
    static ref DATE_PATTERN: Regex = Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap();
}

#[derive(Clone)]
pub struct AppState<T: SchedulingBackend> {
    lifecycle: AppointmentLifecycle<T>,
    admin_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SlotsQuery {
    date: Option<String>,
    service_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DateQuery {
    date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct CreateAppointmentRequest {
    client_id: Uuid,
    service_id: Uuid,
    #[validate(regex(path = *DATE_PATTERN, message = "date must be formatted as YYYY-MM-DD"))]
    date: String,
    time: String,
    #[validate(length(max = 1000))]
    notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct RescheduleRequest {
    #[validate(regex(path = *DATE_PATTERN, message = "date must be formatted as YYYY-MM-DD"))]
    date: Option<String>,
    time: Option<String>,
    service_id: Option<Uuid>,
    #[validate(length(max = 1000))]
    notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StatusRequest {
    status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct CreateServiceRequest {
    #[validate(length(min = 1, message = "name must not be empty"))]
    name: String,
    #[validate(range(min = 0.0, message = "price must not be negative"))]
    price: f64,
    #[validate(range(min = 1, max = 1439, message = "duration must be between 1 and 1439 minutes"))]
    duration_minutes: u32,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct CreateClientRequest {
    #[validate(length(min = 1, message = "name must not be empty"))]
    full_name: String,
    #[validate(email)]
    email: Option<String>,
    phone: Option<String>,
}

pub fn create_app<T: SchedulingBackend, C: Configuration>(
    lifecycle: AppointmentLifecycle<T>,
    configuration: C,
) -> Router {
    let state = AppState {
        lifecycle,
        admin_password: configuration.admin_password(),
    };
    let admin = middleware::from_fn_with_state(state.clone(), admin_auth::<T>);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/appointments/slots", get(get_available_slots::<T>))
        .route(
            "/appointments",
            get(get_appointments::<T>)
                .route_layer(admin.clone())
                .post(create_appointment::<T>),
        )
        .route(
            "/appointments/:id",
            delete(delete_appointment::<T>)
                .route_layer(admin.clone())
                .get(get_appointment::<T>)
                .put(reschedule_appointment::<T>),
        )
        .route("/appointments/:id/cancel", patch(cancel_appointment::<T>))
        .route(
            "/appointments/:id/status",
            patch(update_status::<T>).route_layer(admin.clone()),
        )
        .route("/clients", post(create_client::<T>).route_layer(admin.clone()))
        .route("/clients/:id/appointments", get(get_client_appointments::<T>))
        .route(
            "/settings",
            put(update_settings::<T>)
                .route_layer(admin.clone())
                .get(get_settings::<T>),
        )
        .route(
            "/services",
            post(create_service::<T>)
                .route_layer(admin.clone())
                .get(get_services::<T>),
        )
        .route(
            "/notifications/reminder/:id",
            post(send_reminder::<T>).route_layer(admin.clone()),
        )
        .route(
            "/notifications/reminders/tomorrow",
            post(send_tomorrow_reminders::<T>).route_layer(admin),
        )
        .with_state(state)
        .layer(cors)
}

async fn admin_auth<T: SchedulingBackend>(
    State(state): State<AppState<T>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(header) = request.headers().get(ADMIN_HEADER) else {
        return unauthorized("Missing credentials");
    };
    if header.to_str().unwrap_or("") != state.admin_password {
        warn!(path = %request.uri().path(), "Rejected admin request");
        return unauthorized("Unauthorized");
    }
    next.run(request).await
}

fn unauthorized(message: &str) -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "message": message }))).into_response()
}

fn body<B: Validate>(payload: Result<Json<B>, JsonRejection>) -> Result<B, SchedulingError> {
    let Json(body) = payload.map_err(|rejection| SchedulingError::Validation(rejection.body_text()))?;
    body.validate()?;
    Ok(body)
}

fn path_id(id: Result<Path<Uuid>, PathRejection>) -> Result<Uuid, SchedulingError> {
    let Path(id) = id.map_err(|rejection| SchedulingError::Validation(rejection.body_text()))?;
    Ok(id)
}

fn parse_date(value: &str) -> Result<NaiveDate, SchedulingError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| SchedulingError::Validation(format!("Invalid date '{value}', expected YYYY-MM-DD")))
}

async fn get_available_slots<T: SchedulingBackend>(
    State(state): State<AppState<T>>,
    query: Result<Query<SlotsQuery>, QueryRejection>,
) -> Result<Json<Vec<TimeOfDay>>, SchedulingError> {
    let Query(query) = query.map_err(|rejection| SchedulingError::Validation(rejection.body_text()))?;
    let (Some(date), Some(service_id)) = (query.date, query.service_id) else {
        return Err(SchedulingError::Validation(
            "date and serviceId are required".into(),
        ));
    };
    let slots = state
        .lifecycle
        .available_slots_for(parse_date(&date)?, service_id)?;
    Ok(Json(slots))
}

async fn create_appointment<T: SchedulingBackend>(
    State(state): State<AppState<T>>,
    payload: Result<Json<CreateAppointmentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Appointment>), SchedulingError> {
    let request = body(payload)?;
    let appointment = state.lifecycle.create(CreateAppointment {
        client_id: request.client_id,
        service_id: request.service_id,
        date: parse_date(&request.date)?,
        time: request.time.parse()?,
        notes: request.notes,
    })?;
    Ok((StatusCode::CREATED, Json(appointment)))
}

async fn get_appointments<T: SchedulingBackend>(
    State(state): State<AppState<T>>,
    query: Result<Query<DateQuery>, QueryRejection>,
) -> Result<Json<Vec<Appointment>>, SchedulingError> {
    let Query(query) = query.map_err(|rejection| SchedulingError::Validation(rejection.body_text()))?;
    let date = query.date.as_deref().map(parse_date).transpose()?;
    Ok(Json(state.lifecycle.appointments(date)?))
}

async fn get_appointment<T: SchedulingBackend>(
    State(state): State<AppState<T>>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Appointment>, SchedulingError> {
    Ok(Json(state.lifecycle.appointment(path_id(id)?)?))
}

async fn get_client_appointments<T: SchedulingBackend>(
    State(state): State<AppState<T>>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Vec<Appointment>>, SchedulingError> {
    Ok(Json(state.lifecycle.client_appointments(path_id(id)?)?))
}

async fn reschedule_appointment<T: SchedulingBackend>(
    State(state): State<AppState<T>>,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<RescheduleRequest>, JsonRejection>,
) -> Result<Json<Appointment>, SchedulingError> {
    let id = path_id(id)?;
    let request = body(payload)?;
    let changes = Reschedule {
        date: request.date.as_deref().map(parse_date).transpose()?,
        time: request.time.as_deref().map(str::parse::<TimeOfDay>).transpose()?,
        service_id: request.service_id,
        notes: request.notes,
    };
    Ok(Json(state.lifecycle.reschedule(id, changes)?))
}

async fn cancel_appointment<T: SchedulingBackend>(
    State(state): State<AppState<T>>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Appointment>, SchedulingError> {
    Ok(Json(state.lifecycle.cancel(path_id(id)?)?))
}

async fn update_status<T: SchedulingBackend>(
    State(state): State<AppState<T>>,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<StatusRequest>, JsonRejection>,
) -> Result<Json<Appointment>, SchedulingError> {
    let id = path_id(id)?;
    let Json(request) =
        payload.map_err(|rejection| SchedulingError::Validation(rejection.body_text()))?;
    let status: AppointmentStatus = request.status.parse()?;
    Ok(Json(state.lifecycle.update_status(id, status)?))
}

async fn delete_appointment<T: SchedulingBackend>(
    State(state): State<AppState<T>>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<serde_json::Value>, SchedulingError> {
    state.lifecycle.delete(path_id(id)?)?;
    Ok(Json(json!({ "message": "Appointment deleted" })))
}

async fn send_reminder<T: SchedulingBackend>(
    State(state): State<AppState<T>>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Appointment>, SchedulingError> {
    Ok(Json(state.lifecycle.send_reminder(path_id(id)?)?))
}

async fn send_tomorrow_reminders<T: SchedulingBackend>(
    State(state): State<AppState<T>>,
) -> Result<Json<serde_json::Value>, SchedulingError> {
    let date = tomorrow().ok_or_else(|| SchedulingError::Internal("No date after today".into()))?;
    let count = state.lifecycle.send_due_reminders(date)?;
    Ok(Json(json!({ "message": "Reminders sent", "date": date, "count": count })))
}

async fn get_settings<T: SchedulingBackend>(
    State(state): State<AppState<T>>,
) -> Result<Json<BusinessSettings>, SchedulingError> {
    Ok(Json(state.lifecycle.settings()?))
}

async fn update_settings<T: SchedulingBackend>(
    State(state): State<AppState<T>>,
    payload: Result<Json<SettingsUpdate>, JsonRejection>,
) -> Result<Json<BusinessSettings>, SchedulingError> {
    let Json(update) =
        payload.map_err(|rejection| SchedulingError::Validation(rejection.body_text()))?;
    Ok(Json(state.lifecycle.update_settings(update)?))
}

async fn get_services<T: SchedulingBackend>(
    State(state): State<AppState<T>>,
) -> Result<Json<Vec<Service>>, SchedulingError> {
    Ok(Json(state.lifecycle.backend().services()?))
}

async fn create_service<T: SchedulingBackend>(
    State(state): State<AppState<T>>,
    payload: Result<Json<CreateServiceRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Service>), SchedulingError> {
    let request = body(payload)?;
    let service = state.lifecycle.backend().add_service(NewService {
        name: request.name,
        price: request.price,
        duration_minutes: request.duration_minutes,
        description: request.description,
    })?;
    Ok((StatusCode::CREATED, Json(service)))
}

async fn create_client<T: SchedulingBackend>(
    State(state): State<AppState<T>>,
    payload: Result<Json<CreateClientRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Client>), SchedulingError> {
    let request = body(payload)?;
    let client = state.lifecycle.backend().add_client(NewClient {
        full_name: request.full_name,
        email: request.email,
        phone: request.phone,
    })?;
    Ok((StatusCode::CREATED, Json(client)))
}
