use crate::{
    conflict_detector::{find_conflict, CancelledAppointments, ConflictCheck},
    errors::SchedulingError,
    time_arithmetic::TimeOfDay,
    types::{Appointment, BusinessSettings, Interval, Service},
};
use chrono::NaiveDate;

/// Bookable start times for `service` on `date`, in ascending order.
///
/// Candidates start at opening time and advance by the configured slot interval,
/// independent of the service duration. A candidate is offered when its whole
/// `[start, start + duration)` window fits before closing and collides with no
/// existing appointment.
pub fn available_slots(
    date: NaiveDate,
    service: &Service,
    settings: &BusinessSettings,
    existing: &[Appointment],
    cancelled: CancelledAppointments,
) -> Result<Vec<TimeOfDay>, SchedulingError> {
    if settings.slot_interval_minutes <= 0 {
        return Err(SchedulingError::InvalidConfiguration(format!(
            "Slot interval must be positive, got {}",
            settings.slot_interval_minutes
        )));
    }
    let step = settings.slot_interval_minutes as u32;
    let duration = service.duration_minutes;
    let closing = settings.closing_time.minutes();
    let check = ConflictCheck::new(cancelled);

    let mut slots = Vec::new();
    let mut cursor = settings.opening_time.minutes();
    loop {
        let Some(end) = cursor.checked_add(duration).filter(|end| *end <= closing) else {
            break;
        };
        let candidate = Interval {
            date,
            start: TimeOfDay::from_minutes(cursor)?,
            end: TimeOfDay::from_minutes(end)?,
        };
        if find_conflict(&candidate, existing, &check).is_none() {
            slots.push(candidate.start);
        }
        cursor += step;
    }
    Ok(slots)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        testutils::{appointment, date, service},
        time_arithmetic::MINUTES_PER_DAY,
        types::AppointmentStatus,
    };

    fn as_strings(slots: &[TimeOfDay]) -> Vec<String> {
        slots.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_existing_appointment_blocks_overlapping_windows() {
        let existing = vec![appointment("2025-03-14", "10:00", "11:00")];
        let slots = available_slots(
            date("2025-03-14"),
            &service(60),
            &BusinessSettings::default(),
            &existing,
            CancelledAppointments::Release,
        )
        .unwrap();
        let slots = as_strings(&slots);

        assert!(slots.contains(&"09:00".to_string()));
        assert!(!slots.contains(&"09:30".to_string()));
        assert!(!slots.contains(&"10:00".to_string()));
        assert!(!slots.contains(&"10:30".to_string()));
        assert_eq!(slots.first().unwrap(), "09:00");
        assert_eq!(slots.last().unwrap(), "17:00");

        let expected_after: Vec<String> = (22..=34)
            .map(|half_hours| format!("{:02}:{:02}", half_hours / 2, (half_hours % 2) * 30))
            .collect();
        assert_eq!(slots[1..], expected_after[..]);
    }

    #[test]
    fn test_empty_day_offers_every_interval() {
        let slots = available_slots(
            date("2025-03-14"),
            &service(60),
            &BusinessSettings::default(),
            &[],
            CancelledAppointments::Release,
        )
        .unwrap();

        assert_eq!(slots.len(), 17);
        assert!(slots.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_step_is_independent_of_duration() {
        let settings = BusinessSettings {
            closing_time: "12:00".parse().unwrap(),
            ..Default::default()
        };
        let slots =
            available_slots(date("2025-03-14"), &service(90), &settings, &[], CancelledAppointments::Release)
                .unwrap();

        assert_eq!(as_strings(&slots), vec!["09:00", "09:30", "10:00", "10:30"]);
    }

    #[test]
    fn test_service_longer_than_business_day_has_no_slots() {
        let slots = available_slots(
            date("2025-03-14"),
            &service(600),
            &BusinessSettings::default(),
            &[],
            CancelledAppointments::Release,
        )
        .unwrap();
        assert!(slots.is_empty());
    }

    #[test]
    fn test_non_positive_interval_is_rejected() {
        for slot_interval_minutes in [0, -30] {
            let settings = BusinessSettings {
                slot_interval_minutes,
                ..Default::default()
            };
            let result =
                available_slots(date("2025-03-14"), &service(30), &settings, &[], CancelledAppointments::Release);
            assert!(matches!(result, Err(SchedulingError::InvalidConfiguration(_))));
        }
    }

    #[test]
    fn test_generation_is_repeatable() {
        let existing = vec![
            appointment("2025-03-14", "09:30", "10:15"),
            appointment("2025-03-14", "14:00", "15:00"),
        ];
        let settings = BusinessSettings {
            slot_interval_minutes: 15,
            ..Default::default()
        };
        let first =
            available_slots(date("2025-03-14"), &service(45), &settings, &existing, CancelledAppointments::Release)
                .unwrap();
        let second =
            available_slots(date("2025-03-14"), &service(45), &settings, &existing, CancelledAppointments::Release)
                .unwrap();

        assert_eq!(first, second);
        assert!(first.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_appointments_on_other_dates_are_ignored() {
        let existing = vec![appointment("2025-03-15", "09:00", "18:00")];
        let slots = available_slots(
            date("2025-03-14"),
            &service(60),
            &BusinessSettings::default(),
            &existing,
            CancelledAppointments::Release,
        )
        .unwrap();
        assert_eq!(slots.len(), 17);
    }

    #[test]
    fn test_cancelled_appointment_slot_follows_policy() {
        let mut cancelled = appointment("2025-03-14", "09:00", "18:00");
        cancelled.status = AppointmentStatus::Cancelled;
        let existing = vec![cancelled];

        let released = available_slots(
            date("2025-03-14"),
            &service(60),
            &BusinessSettings::default(),
            &existing,
            CancelledAppointments::Release,
        )
        .unwrap();
        let blocked = available_slots(
            date("2025-03-14"),
            &service(60),
            &BusinessSettings::default(),
            &existing,
            CancelledAppointments::Block,
        )
        .unwrap();

        assert_eq!(released.len(), 17);
        assert!(blocked.is_empty());
    }

    #[test]
    fn test_service_longer_than_a_day_gets_no_slots() {
        for duration in [MINUTES_PER_DAY, u32::MAX - 1, u32::MAX] {
            let slots = available_slots(
                date("2025-03-14"),
                &service(duration),
                &BusinessSettings::default(),
                &[],
                CancelledAppointments::Release,
            )
            .unwrap();
            assert!(slots.is_empty(), "{duration} minutes offered {slots:?}");
        }
    }
}
