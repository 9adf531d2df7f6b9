use crate::conflict_detector::CancelledAppointments;
use std::time::Duration;

pub trait Configuration: Clone + Send + Sync + 'static {
    fn port(&self) -> String;
    fn database_url(&self) -> Option<String>;
    fn admin_password(&self) -> String;
    fn cancelled_appointments(&self) -> CancelledAppointments;
    fn phone_country_code(&self) -> String;
    fn reminder_interval(&self) -> Duration;
    fn seed_example_data(&self) -> bool;
}
