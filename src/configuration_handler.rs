use crate::{configuration::Configuration, conflict_detector::CancelledAppointments};
use clap::Parser;
use std::time::Duration;

const MAX_REMINDER_INTERVAL_MINUTES: u64 = 7 * 24 * 60;

#[derive(Debug, Clone, Parser)]
#[command(name = "salon_scheduler", about = "Salon appointment scheduling backend")]
pub struct ConfigurationHandler {
    #[arg(long, env = "PORT", default_value = "3000")]
    port: String,

    /// Keep appointments in memory when not set.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[arg(long, env = "ADMIN_PASSWORD", default_value = "123")]
    admin_password: String,

    /// Let cancelled appointments keep blocking their time slot.
    #[arg(long, env = "COUNT_CANCELLED_AS_CONFLICT")]
    count_cancelled_as_conflict: bool,

    /// Country calling code prepended to local phone numbers.
    #[arg(long, env = "PHONE_COUNTRY_CODE", default_value = "234")]
    phone_country_code: String,

    /// Minutes between reminder sweeps, at most one week.
    #[arg(
        long,
        env = "REMINDER_INTERVAL_MINUTES",
        default_value_t = 720,
        value_parser = clap::value_parser!(u64).range(1..=MAX_REMINDER_INTERVAL_MINUTES)
    )]
    reminder_interval_minutes: u64,

    /// Insert example services and a client on startup.
    #[arg(long)]
    seed_example_data: bool,
}

impl ConfigurationHandler {
    pub fn parse_arguments() -> Self {
        dotenvy::dotenv().ok();
        Self::parse()
    }
}

impl Configuration for ConfigurationHandler {
    fn port(&self) -> String {
        self.port.clone()
    }

    fn database_url(&self) -> Option<String> {
        self.database_url.clone()
    }

    fn admin_password(&self) -> String {
        self.admin_password.clone()
    }

    fn cancelled_appointments(&self) -> CancelledAppointments {
        if self.count_cancelled_as_conflict {
            CancelledAppointments::Block
        } else {
            CancelledAppointments::Release
        }
    }

    fn phone_country_code(&self) -> String {
        self.phone_country_code.clone()
    }

    fn reminder_interval(&self) -> Duration {
        Duration::from_secs(self.reminder_interval_minutes.saturating_mul(60))
    }

    fn seed_example_data(&self) -> bool {
        self.seed_example_data
    }
}
