use crate::types::{Appointment, AppointmentStatus, Interval};
use uuid::Uuid;

/// Whether cancelled appointments still occupy their interval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CancelledAppointments {
    /// Cancelling frees the slot for new bookings.
    #[default]
    Release,
    /// Cancelled appointments keep blocking their slot.
    Block,
}

impl CancelledAppointments {
    pub fn blocks(&self, status: AppointmentStatus) -> bool {
        match self {
            CancelledAppointments::Release => status != AppointmentStatus::Cancelled,
            CancelledAppointments::Block => true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConflictCheck {
    /// Appointment being rescheduled, never conflicts with itself.
    pub exclude: Option<Uuid>,
    pub cancelled: CancelledAppointments,
}

impl ConflictCheck {
    pub fn new(cancelled: CancelledAppointments) -> Self {
        Self {
            exclude: None,
            cancelled,
        }
    }

    pub fn excluding(self, id: Uuid) -> Self {
        Self {
            exclude: Some(id),
            ..self
        }
    }

    fn considers(&self, appointment: &Appointment) -> bool {
        self.exclude != Some(appointment.id) && self.cancelled.blocks(appointment.status)
    }
}

/// Half-open overlap: intervals that only touch (`a.end == b.start`) do not overlap.
pub fn overlaps(a: &Interval, b: &Interval) -> bool {
    a.date == b.date && a.start < b.end && a.end > b.start
}

/// First existing appointment that the candidate interval collides with.
pub fn find_conflict<'a, I>(
    candidate: &Interval,
    existing: I,
    check: &ConflictCheck,
) -> Option<&'a Appointment>
where
    I: IntoIterator<Item = &'a Appointment>,
{
    existing
        .into_iter()
        .filter(|appointment| check.considers(appointment))
        .find(|appointment| overlaps(candidate, &appointment.interval()))
}
