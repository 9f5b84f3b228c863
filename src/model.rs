use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Milliseconds in shop-local business time — the only time type.
pub type Ms = i64;

/// Business day, counted in whole days from the epoch in shop-local time.
pub type Day = i64;

pub const MINUTE_MS: Ms = 60_000;
pub const DAY_MS: Ms = 86_400_000;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub start: Ms,
    pub end: Ms,
}

impl Window {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Window start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Window) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains(&self, other: &Window) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// The business day this window starts on.
    pub fn day(&self) -> Day {
        self.start.div_euclid(DAY_MS)
    }
}

/// One physical repair bay, 1-based, fixed cardinality `max_spots`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SpotId(pub u16);

impl std::fmt::Display for SpotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "spot {}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkOrderState {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
}

impl WorkOrderState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkOrderState::Completed | WorkOrderState::Cancelled)
    }

    /// Only non-terminal orders hold their spot/time reservation.
    pub fn occupies_grid(&self) -> bool {
        matches!(self, WorkOrderState::Scheduled | WorkOrderState::InProgress)
    }
}

impl std::fmt::Display for WorkOrderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkOrderState::Scheduled => "Scheduled",
            WorkOrderState::InProgress => "InProgress",
            WorkOrderState::Completed => "Completed",
            WorkOrderState::Cancelled => "Cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancelCause {
    Dispatcher,
    Overdue,
}

/// Creation/modification stamp embedded in every aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Audit {
    pub created_at: Ms,
    pub created_by: String,
    pub modified_at: Ms,
    pub modified_by: String,
}

impl Audit {
    pub fn new(actor: &str, at: Ms) -> Self {
        Self {
            created_at: at,
            created_by: actor.to_string(),
            modified_at: at,
            modified_by: actor.to_string(),
        }
    }

    pub fn touch(&mut self, actor: &str, at: Ms) {
        self.modified_at = at;
        self.modified_by = actor.to_string();
    }
}

/// The aggregate being scheduled. Never physically deleted — Cancelled is
/// the terminal record kept for history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkOrder {
    pub id: Ulid,
    /// Opaque references, resolved by the directory collaborator.
    pub customer: Ulid,
    pub vehicle: Ulid,
    pub spot: SpotId,
    /// Assigned technicians, at least one.
    pub technicians: Vec<Ulid>,
    /// Ordered repair-task references; durations come from the catalog.
    pub tasks: Vec<Ulid>,
    pub window: Window,
    pub state: WorkOrderState,
    /// Set by explicit confirmation or implicitly on start of work.
    /// Confirmed orders are exempt from the overdue sweep.
    pub confirmed: bool,
    pub cancel_cause: Option<CancelCause>,
    pub audit: Audit,
}

/// Advisory marker a dispatcher places while composing a booking. UX-only:
/// the validator's overlap check at commit time is the source of truth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotLock {
    pub id: Ulid,
    pub spot: SpotId,
    pub window: Window,
    pub expires_at: Ms,
    pub holder: String,
}

impl SlotLock {
    pub fn is_active(&self, now: Ms) -> bool {
        self.expires_at > now
    }
}

/// All scheduling state for one business day: work orders (sorted by
/// window start, ties by id) plus advisory slot locks.
#[derive(Debug, Clone)]
pub struct DayState {
    pub day: Day,
    pub orders: Vec<WorkOrder>,
    pub locks: Vec<SlotLock>,
}

impl DayState {
    pub fn new(day: Day) -> Self {
        Self {
            day,
            orders: Vec::new(),
            locks: Vec::new(),
        }
    }

    /// Insert keeping the `(window.start, id)` sort order.
    pub fn insert_order(&mut self, order: WorkOrder) {
        let key = (order.window.start, order.id);
        let pos = self
            .orders
            .binary_search_by_key(&key, |o| (o.window.start, o.id))
            .unwrap_or_else(|e| e);
        self.orders.insert(pos, order);
    }

    pub fn order(&self, id: &Ulid) -> Option<&WorkOrder> {
        self.orders.iter().find(|o| o.id == *id)
    }

    pub fn order_mut(&mut self, id: &Ulid) -> Option<&mut WorkOrder> {
        self.orders.iter_mut().find(|o| o.id == *id)
    }

    pub fn take_order(&mut self, id: &Ulid) -> Option<WorkOrder> {
        let pos = self.orders.iter().position(|o| o.id == *id)?;
        Some(self.orders.remove(pos))
    }

    /// Orders still occupying the grid, in `(start, id)` order.
    pub fn active(&self) -> impl Iterator<Item = &WorkOrder> {
        self.orders.iter().filter(|o| o.state.occupies_grid())
    }

    pub fn active_on_spot(&self, spot: SpotId) -> impl Iterator<Item = &WorkOrder> {
        self.active().filter(move |o| o.spot == spot)
    }

    pub fn insert_lock(&mut self, lock: SlotLock) {
        self.locks.push(lock);
    }

    pub fn remove_lock(&mut self, id: &Ulid) -> Option<SlotLock> {
        let pos = self.locks.iter().position(|l| l.id == *id)?;
        Some(self.locks.remove(pos))
    }
}

/// The event types — flat, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    WorkOrderBooked {
        id: Ulid,
        day: Day,
        customer: Ulid,
        vehicle: Ulid,
        spot: SpotId,
        technicians: Vec<Ulid>,
        tasks: Vec<Ulid>,
        window: Window,
        actor: String,
        at: Ms,
    },
    WorkOrderRescheduled {
        id: Ulid,
        from_day: Day,
        day: Day,
        spot: SpotId,
        window: Window,
        actor: String,
        at: Ms,
    },
    WorkOrderTransitioned {
        id: Ulid,
        day: Day,
        to: WorkOrderState,
        cause: Option<CancelCause>,
        actor: String,
        at: Ms,
    },
    WorkOrderConfirmed {
        id: Ulid,
        day: Day,
        actor: String,
        at: Ms,
    },
    SlotLocked {
        id: Ulid,
        day: Day,
        spot: SpotId,
        window: Window,
        expires_at: Ms,
        holder: String,
    },
    SlotUnlocked {
        id: Ulid,
        day: Day,
    },
}

impl Event {
    /// The business day whose viewers should re-fetch after this event.
    /// For a reschedule this is the target day.
    pub fn day(&self) -> Day {
        match self {
            Event::WorkOrderBooked { day, .. }
            | Event::WorkOrderRescheduled { day, .. }
            | Event::WorkOrderTransitioned { day, .. }
            | Event::WorkOrderConfirmed { day, .. }
            | Event::SlotLocked { day, .. }
            | Event::SlotUnlocked { day, .. } => *day,
        }
    }
}

// ── Derived view types ───────────────────────────────────────────

/// Ephemeral, recomputed on every read — never persisted, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailabilitySlot {
    pub spot: SpotId,
    pub window: Window,
    pub occupied_by: Option<Ulid>,
    /// A dispatcher session is mid-edit here; advisory only.
    pub locked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpotSchedule {
    pub spot: SpotId,
    pub slots: Vec<AvailabilitySlot>,
}

/// The full view for one business day, ordered by spot then start time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Schedule {
    pub day: Day,
    pub window: Window,
    pub spots: Vec<SpotSchedule>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(id: Ulid, start: Ms, end: Ms) -> WorkOrder {
        WorkOrder {
            id,
            customer: Ulid::new(),
            vehicle: Ulid::new(),
            spot: SpotId(1),
            technicians: vec![Ulid::new()],
            tasks: vec![],
            window: Window::new(start, end),
            state: WorkOrderState::Scheduled,
            confirmed: false,
            cancel_cause: None,
            audit: Audit::new("test", 0),
        }
    }

    #[test]
    fn window_basics() {
        let w = Window::new(100, 200);
        assert_eq!(w.duration_ms(), 100);
        let outer = Window::new(50, 300);
        assert!(outer.contains(&w));
        assert!(!w.contains(&outer));
    }

    #[test]
    fn window_overlap_half_open() {
        let a = Window::new(100, 200);
        let b = Window::new(150, 250);
        let c = Window::new(200, 300);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c)); // touching, not overlapping
    }

    #[test]
    fn window_day() {
        let w = Window::new(3 * DAY_MS + 9 * 3_600_000, 3 * DAY_MS + 10 * 3_600_000);
        assert_eq!(w.day(), 3);
    }

    #[test]
    fn state_classification() {
        assert!(WorkOrderState::Scheduled.occupies_grid());
        assert!(WorkOrderState::InProgress.occupies_grid());
        assert!(!WorkOrderState::Completed.occupies_grid());
        assert!(!WorkOrderState::Cancelled.occupies_grid());
        assert!(WorkOrderState::Completed.is_terminal());
        assert!(!WorkOrderState::Scheduled.is_terminal());
    }

    #[test]
    fn day_state_keeps_orders_sorted() {
        let mut ds = DayState::new(0);
        ds.insert_order(order(Ulid::new(), 300, 400));
        ds.insert_order(order(Ulid::new(), 100, 200));
        ds.insert_order(order(Ulid::new(), 200, 300));
        let starts: Vec<Ms> = ds.orders.iter().map(|o| o.window.start).collect();
        assert_eq!(starts, vec![100, 200, 300]);
    }

    #[test]
    fn day_state_active_filters_terminal() {
        let mut ds = DayState::new(0);
        let mut cancelled = order(Ulid::new(), 100, 200);
        cancelled.state = WorkOrderState::Cancelled;
        ds.insert_order(cancelled);
        ds.insert_order(order(Ulid::new(), 300, 400));
        assert_eq!(ds.orders.len(), 2);
        assert_eq!(ds.active().count(), 1);
    }

    #[test]
    fn day_state_active_on_spot() {
        let mut ds = DayState::new(0);
        let mut a = order(Ulid::new(), 100, 200);
        a.spot = SpotId(1);
        let mut b = order(Ulid::new(), 100, 200);
        b.spot = SpotId(2);
        ds.insert_order(a);
        ds.insert_order(b);
        assert_eq!(ds.active_on_spot(SpotId(1)).count(), 1);
    }

    #[test]
    fn take_order_preserves_rest() {
        let mut ds = DayState::new(0);
        let ids: Vec<Ulid> = (0..3).map(|_| Ulid::new()).collect();
        for (i, &id) in ids.iter().enumerate() {
            ds.insert_order(order(id, (i as Ms) * 100, (i as Ms) * 100 + 50));
        }
        let taken = ds.take_order(&ids[1]).unwrap();
        assert_eq!(taken.id, ids[1]);
        assert_eq!(ds.orders.len(), 2);
        assert!(ds.take_order(&ids[1]).is_none());
    }

    #[test]
    fn slot_lock_expiry() {
        let lock = SlotLock {
            id: Ulid::new(),
            spot: SpotId(1),
            window: Window::new(100, 200),
            expires_at: 1000,
            holder: "dispatcher-a".into(),
        };
        assert!(lock.is_active(999));
        assert!(!lock.is_active(1000));
    }

    #[test]
    fn audit_touch() {
        let mut audit = Audit::new("alice", 100);
        audit.touch("bob", 200);
        assert_eq!(audit.created_by, "alice");
        assert_eq!(audit.created_at, 100);
        assert_eq!(audit.modified_by, "bob");
        assert_eq!(audit.modified_at, 200);
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::WorkOrderTransitioned {
            id: Ulid::new(),
            day: 42,
            to: WorkOrderState::Cancelled,
            cause: Some(CancelCause::Overdue),
            actor: "sweep".into(),
            at: 1234,
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
