use crate::model::*;

// ── Availability Algorithm ────────────────────────────────────────

/// Compute the full derived view for one business day. Pure: recomputed
/// from committed state on every read, never cached across mutations.
/// Ordering is deterministic — spots ascending, slots by start time.
pub fn compute_schedule(
    day: Day,
    operating: &Window,
    ds: &DayState,
    max_spots: u16,
    now: Ms,
) -> Schedule {
    let mut spots = Vec::with_capacity(max_spots as usize);
    for n in 1..=max_spots {
        let spot = SpotId(n);
        spots.push(SpotSchedule {
            spot,
            slots: spot_slots(spot, operating, ds, now),
        });
    }
    Schedule {
        day,
        window: *operating,
        spots,
    }
}

/// Walk one spot's occupying orders (already sorted by `(start, id)`,
/// disjoint by the booking invariant) merging into the operating window:
/// alternating free/occupied slots, gaps bounded by the window, zero-duration
/// slots never emitted. A spot with no bookings yields one free slot
/// spanning the whole window.
pub fn spot_slots(
    spot: SpotId,
    operating: &Window,
    ds: &DayState,
    now: Ms,
) -> Vec<AvailabilitySlot> {
    let active_locks: Vec<&SlotLock> = ds
        .locks
        .iter()
        .filter(|l| l.spot == spot && l.is_active(now))
        .collect();

    let free = |window: Window| AvailabilitySlot {
        spot,
        window,
        occupied_by: None,
        locked: active_locks.iter().any(|l| l.window.overlaps(&window)),
    };

    let mut slots = Vec::new();
    let mut cursor = operating.start;

    for order in ds.active_on_spot(spot) {
        let start = order.window.start.max(operating.start);
        let end = order.window.end.min(operating.end);
        if end <= cursor {
            continue;
        }
        if start > cursor {
            slots.push(free(Window::new(cursor, start)));
        }
        if start < end {
            slots.push(AvailabilitySlot {
                spot,
                window: Window::new(start, end),
                occupied_by: Some(order.id),
                locked: false,
            });
        }
        cursor = end;
    }

    if cursor < operating.end {
        slots.push(free(Window::new(cursor, operating.end)));
    }

    slots
}
