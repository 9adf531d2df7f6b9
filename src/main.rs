#[macro_use]
extern crate diesel;
use std::time::Duration;

use crate::{
    backend::{BackendError, SchedulingBackend},
    configuration::Configuration,
    configuration_handler::ConfigurationHandler,
    database_interface::DatabaseInterface,
    http::create_app,
    lifecycle::AppointmentLifecycle,
    local_store::LocalStore,
    notifications::{LogNotifier, NotificationWorker},
    reminders::run_reminders,
    types::{NewClient, NewService},
};
use tokio::{net::TcpListener, sync::mpsc, time::sleep};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod backend;
mod business_hours;
mod configuration;
mod configuration_handler;
mod conflict_detector;
mod database_interface;
mod errors;
mod http;
mod lifecycle;
mod local_store;
mod messages;
mod notifications;
mod reminders;
mod schema;
mod slot_generator;
#[cfg(test)]
mod testutils;
mod time_arithmetic;
mod types;

const EXAMPLE_SERVICES: [(&str, f64, u32, &str); 4] = [
    ("Classic Manicure", 15.0, 30, "Shape, cuticle care and polish"),
    ("Gel Polish", 25.0, 60, "Long lasting gel colour"),
    ("Acrylic Full Set", 40.0, 90, "Acrylic extensions with a finish of choice"),
    ("Spa Pedicure", 35.0, 60, "Soak, scrub, massage and polish"),
];

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("###################");
    println!("# Salon Scheduler #");
    println!("###################");

    let configuration = ConfigurationHandler::parse_arguments();

    let address = format!("0.0.0.0:{}", configuration.port());
    println!("Accessible at:\n{address}");
    let listener = match TcpListener::bind(&address).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(?err, %address, "Failed to bind listener");
            return;
        }
    };

    if let Some(database_url) = configuration.database_url() {
        let backend = loop {
            match DatabaseInterface::new(&database_url) {
                Ok(backend) => {
                    info!("Successfully connected to database");
                    break backend;
                }
                Err(err) => {
                    error!(?err, "Failed to establish database connection: {database_url}. Retry in 1 sec. You may want to restart it with database disabled (appointments kept in memory).");
                    sleep(Duration::from_secs(1)).await;
                }
            }
        };
        run(backend, configuration, listener).await;
    } else {
        info!("No database configured, appointments are kept in memory");
        run(LocalStore::default(), configuration, listener).await;
    }
}

async fn run<T: SchedulingBackend, C: Configuration>(
    backend: T,
    configuration: C,
    listener: TcpListener,
) {
    if configuration.seed_example_data() {
        if let Err(err) = seed_example_data(&backend) {
            error!(?err, "Failed to seed example data");
        }
    }

    let (events, receiver) = mpsc::unbounded_channel();
    let worker = NotificationWorker::new(LogNotifier, configuration.phone_country_code());
    tokio::spawn(worker.run(receiver));
    tokio::spawn(run_reminders(
        backend.clone(),
        events.clone(),
        configuration.reminder_interval(),
    ));

    let lifecycle =
        AppointmentLifecycle::new(backend, events, configuration.cancelled_appointments());
    let app = create_app(lifecycle, configuration);

    if let Err(err) = axum::serve(listener, app).await {
        error!(?err, "Server stopped");
    }
}

/// Fills an empty catalogue with a few services and a walk-in client.
fn seed_example_data<T: SchedulingBackend>(backend: &T) -> Result<(), BackendError> {
    if !backend.services()?.is_empty() {
        info!("Services already present, skipping example data");
        return Ok(());
    }
    for (name, price, duration_minutes, description) in EXAMPLE_SERVICES {
        backend.add_service(NewService {
            name: name.into(),
            price,
            duration_minutes,
            description: description.into(),
        })?;
    }
    let client = backend.add_client(NewClient {
        full_name: "Walk-in Client".into(),
        email: None,
        phone: None,
    })?;
    info!(client = %client.id, services = EXAMPLE_SERVICES.len(), "Seeded example data");
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_seed_example_data_runs_once() {
        let store = LocalStore::default();
        seed_example_data(&store).unwrap();
        seed_example_data(&store).unwrap();

        let services = store.services().unwrap();
        assert_eq!(services.len(), EXAMPLE_SERVICES.len());
        assert!(services
            .iter()
            .any(|service| service.name == "Gel Polish" && service.duration_minutes == 60));
    }
}
