use ulid::Ulid;

use crate::limits::*;
use crate::model::{DayState, Ms, SpotId, Window};

use super::EngineError;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as Ms
}

pub(crate) fn validate_window(window: &Window) -> Result<(), EngineError> {
    if window.start < MIN_VALID_TIMESTAMP_MS || window.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if window.start >= window.end {
        return Err(EngineError::DurationTooShort);
    }
    Ok(())
}

/// The allocation facts checked before any booking or reschedule commits.
pub(crate) struct BookingCheck<'a> {
    pub spot: SpotId,
    pub window: Window,
    pub technicians: &'a [Ulid],
    /// Sum of the assigned repair tasks' estimated durations.
    pub task_total_ms: Ms,
    /// Omit this order's own occupancy (reschedule path).
    pub exclude: Option<Ulid>,
}

/// Enforce the allocation invariants against committed state. Pure; must run
/// inside the per-day write critical section so check and commit cannot race.
/// First failure wins, in this order: operating window, minimum duration,
/// task duration, spot conflict, labor conflict.
pub(crate) fn validate_booking(
    check: &BookingCheck,
    ds: &DayState,
    operating: &Window,
    min_appointment_ms: Ms,
) -> Result<(), EngineError> {
    if !operating.contains(&check.window) {
        return Err(EngineError::OutsideOperatingHours);
    }
    if check.window.duration_ms() < min_appointment_ms {
        return Err(EngineError::DurationTooShort);
    }
    if check.window.duration_ms() < check.task_total_ms {
        return Err(EngineError::DurationInsufficientForTasks);
    }

    for other in ds.active_on_spot(check.spot) {
        if Some(other.id) == check.exclude {
            continue;
        }
        if other.window.overlaps(&check.window) {
            return Err(EngineError::SpotTimeConflict(other.id));
        }
    }

    // A technician cannot be double-booked across any spot.
    for other in ds.active() {
        if Some(other.id) == check.exclude || !other.window.overlaps(&check.window) {
            continue;
        }
        if other.technicians.iter().any(|t| check.technicians.contains(t)) {
            return Err(EngineError::LaborTimeConflict(other.id));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Audit, WorkOrder, WorkOrderState};

    const H: Ms = 3_600_000;
    const M: Ms = 60_000;

    fn day_window() -> Window {
        // 08:00–18:00 on day zero of the test grid
        Window::new(8 * H, 18 * H)
    }

    fn order(spot: SpotId, start: Ms, end: Ms, technicians: Vec<Ulid>) -> WorkOrder {
        WorkOrder {
            id: Ulid::new(),
            customer: Ulid::new(),
            vehicle: Ulid::new(),
            spot,
            technicians,
            tasks: vec![],
            window: Window::new(start, end),
            state: WorkOrderState::Scheduled,
            confirmed: false,
            cancel_cause: None,
            audit: Audit::new("test", 0),
        }
    }

    fn check(spot: SpotId, start: Ms, end: Ms, technicians: &[Ulid]) -> BookingCheck<'_> {
        BookingCheck {
            spot,
            window: Window::new(start, end),
            technicians,
            task_total_ms: 0,
            exclude: None,
        }
    }

    #[test]
    fn accepts_booking_within_hours() {
        let ds = DayState::new(0);
        let techs = [Ulid::new()];
        let c = check(SpotId(1), 9 * H, 10 * H, &techs);
        validate_booking(&c, &ds, &day_window(), 30 * M).unwrap();
    }

    #[test]
    fn rejects_outside_operating_hours() {
        let ds = DayState::new(0);
        let techs = [Ulid::new()];
        let c = check(SpotId(1), 7 * H, 9 * H, &techs);
        assert_eq!(
            validate_booking(&c, &ds, &day_window(), 30 * M),
            Err(EngineError::OutsideOperatingHours)
        );
    }

    #[test]
    fn rejects_too_short() {
        let ds = DayState::new(0);
        let techs = [Ulid::new()];
        let c = check(SpotId(1), 9 * H, 9 * H + 10 * M, &techs);
        assert_eq!(
            validate_booking(&c, &ds, &day_window(), 30 * M),
            Err(EngineError::DurationTooShort)
        );
    }

    #[test]
    fn rejects_insufficient_for_tasks() {
        let ds = DayState::new(0);
        let techs = [Ulid::new()];
        let mut c = check(SpotId(1), 9 * H, 10 * H, &techs);
        c.task_total_ms = 2 * H;
        assert_eq!(
            validate_booking(&c, &ds, &day_window(), 30 * M),
            Err(EngineError::DurationInsufficientForTasks)
        );
    }

    #[test]
    fn rejects_spot_overlap() {
        let mut ds = DayState::new(0);
        let existing = order(SpotId(1), 9 * H, 10 * H, vec![Ulid::new()]);
        let existing_id = existing.id;
        ds.insert_order(existing);

        let techs = [Ulid::new()];
        let c = check(SpotId(1), 9 * H + 30 * M, 10 * H + 30 * M, &techs);
        assert_eq!(
            validate_booking(&c, &ds, &day_window(), 30 * M),
            Err(EngineError::SpotTimeConflict(existing_id))
        );
    }

    #[test]
    fn boundary_touch_is_not_conflict() {
        let mut ds = DayState::new(0);
        ds.insert_order(order(SpotId(1), 9 * H, 10 * H, vec![Ulid::new()]));

        let techs = [Ulid::new()];
        let c = check(SpotId(1), 10 * H, 11 * H, &techs);
        validate_booking(&c, &ds, &day_window(), 30 * M).unwrap();
    }

    #[test]
    fn other_spot_does_not_conflict() {
        let mut ds = DayState::new(0);
        ds.insert_order(order(SpotId(1), 9 * H, 10 * H, vec![Ulid::new()]));

        let techs = [Ulid::new()];
        let c = check(SpotId(2), 9 * H + 30 * M, 10 * H + 30 * M, &techs);
        validate_booking(&c, &ds, &day_window(), 30 * M).unwrap();
    }

    #[test]
    fn technician_double_booking_rejected_across_spots() {
        let shared = Ulid::new();
        let mut ds = DayState::new(0);
        let existing = order(SpotId(1), 9 * H, 10 * H, vec![shared]);
        let existing_id = existing.id;
        ds.insert_order(existing);

        let techs = [shared];
        let c = check(SpotId(2), 9 * H + 30 * M, 10 * H + 30 * M, &techs);
        assert_eq!(
            validate_booking(&c, &ds, &day_window(), 30 * M),
            Err(EngineError::LaborTimeConflict(existing_id))
        );
    }

    #[test]
    fn spot_conflict_reported_before_labor_conflict() {
        let shared = Ulid::new();
        let mut ds = DayState::new(0);
        let existing = order(SpotId(1), 9 * H, 10 * H, vec![shared]);
        let existing_id = existing.id;
        ds.insert_order(existing);

        let techs = [shared];
        let c = check(SpotId(1), 9 * H, 10 * H, &techs);
        assert_eq!(
            validate_booking(&c, &ds, &day_window(), 30 * M),
            Err(EngineError::SpotTimeConflict(existing_id))
        );
    }

    #[test]
    fn cancelled_order_does_not_conflict() {
        let mut ds = DayState::new(0);
        let mut existing = order(SpotId(1), 9 * H, 10 * H, vec![Ulid::new()]);
        existing.state = WorkOrderState::Cancelled;
        ds.insert_order(existing);

        let techs = [Ulid::new()];
        let c = check(SpotId(1), 9 * H, 10 * H, &techs);
        validate_booking(&c, &ds, &day_window(), 30 * M).unwrap();
    }

    #[test]
    fn exclude_skips_own_occupancy() {
        let mut ds = DayState::new(0);
        let existing = order(SpotId(1), 9 * H, 10 * H, vec![Ulid::new()]);
        let id = existing.id;
        let techs = existing.technicians.clone();
        ds.insert_order(existing);

        let mut c = check(SpotId(1), 9 * H + 30 * M, 10 * H + 30 * M, &techs);
        c.exclude = Some(id);
        validate_booking(&c, &ds, &day_window(), 30 * M).unwrap();
    }

    #[test]
    fn validate_window_bounds() {
        assert!(validate_window(&Window {
            start: 0,
            end: 1000,
        })
        .is_err());
        assert!(validate_window(&Window::new(
            MIN_VALID_TIMESTAMP_MS + 1000,
            MIN_VALID_TIMESTAMP_MS + 2000
        ))
        .is_ok());
    }
}
