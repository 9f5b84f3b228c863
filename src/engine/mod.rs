mod availability;
mod error;
mod mutations;
mod queries;
mod state;
mod validate;

pub use availability::{compute_schedule, spot_slots};
pub use error::EngineError;
pub use mutations::BookingRequest;
pub use state::transition_allowed;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, RwLock};
use ulid::Ulid;

use crate::calendar::OperatingCalendar;
use crate::config::Config;
use crate::directory::RepairTaskCatalog;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

pub type SharedDayState = Arc<RwLock<DayState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single sync for the whole batch.
/// 5. Respond to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush what we have, then handle the non-append command
                            flush_and_respond(&mut wal, &mut batch);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    flush_and_respond(&mut wal, &mut batch);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_and_respond(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut buffer_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.buffer_event(event) {
            buffer_err = Some(e);
            break;
        }
    }
    // Always sync — even on a buffering error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let sync_err = wal.sync().err();
    if let Some(e) = buffer_err {
        return Err(e);
    }
    if let Some(e) = sync_err {
        return Err(e);
    }
    Ok(())
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// The Scheduling & Availability Engine. Owns all scheduling state; every
/// mutation goes through its per-day write lock (serializable per-day
/// mutation), every read recomputes from committed state.
pub struct Engine {
    pub(super) state: DashMap<Day, SharedDayState>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    /// Reverse lookup: work order or slot lock id → business day.
    pub(super) entity_to_day: DashMap<Ulid, Day>,
    pub(super) calendar: OperatingCalendar,
    pub(super) max_spots: u16,
    pub(super) cancellation_threshold_ms: Ms,
    pub(super) catalog: Arc<RepairTaskCatalog>,
}

/// Apply a same-day event directly to a DayState (no locking — caller holds
/// the write guard). Cross-day reschedules are handled at the map level.
fn apply_to_day(ds: &mut DayState, event: &Event, order_index: &DashMap<Ulid, Day>) {
    match event {
        Event::WorkOrderBooked {
            id,
            day,
            customer,
            vehicle,
            spot,
            technicians,
            tasks,
            window,
            actor,
            at,
        } => {
            ds.insert_order(WorkOrder {
                id: *id,
                customer: *customer,
                vehicle: *vehicle,
                spot: *spot,
                technicians: technicians.clone(),
                tasks: tasks.clone(),
                window: *window,
                state: WorkOrderState::Scheduled,
                confirmed: false,
                cancel_cause: None,
                audit: Audit::new(actor, *at),
            });
            order_index.insert(*id, *day);
        }
        Event::WorkOrderRescheduled {
            id,
            from_day,
            day,
            spot,
            window,
            actor,
            at,
        } => {
            debug_assert_eq!(from_day, day, "cross-day reschedule applied at map level");
            if let Some(mut order) = ds.take_order(id) {
                order.spot = *spot;
                order.window = *window;
                order.audit.touch(actor, *at);
                ds.insert_order(order);
            }
            order_index.insert(*id, *day);
        }
        Event::WorkOrderTransitioned {
            id,
            to,
            cause,
            actor,
            at,
            ..
        } => {
            if let Some(order) = ds.order_mut(id) {
                order.state = *to;
                order.cancel_cause = *cause;
                if *to == WorkOrderState::InProgress {
                    // Starting work implies the customer showed up.
                    order.confirmed = true;
                }
                order.audit.touch(actor, *at);
            }
        }
        Event::WorkOrderConfirmed { id, actor, at, .. } => {
            if let Some(order) = ds.order_mut(id) {
                order.confirmed = true;
                order.audit.touch(actor, *at);
            }
        }
        Event::SlotLocked {
            id,
            spot,
            window,
            expires_at,
            holder,
            day,
        } => {
            ds.insert_lock(SlotLock {
                id: *id,
                spot: *spot,
                window: *window,
                expires_at: *expires_at,
                holder: holder.clone(),
            });
            order_index.insert(*id, *day);
        }
        Event::SlotUnlocked { id, .. } => {
            ds.remove_lock(id);
            order_index.remove(id);
        }
    }
}

impl Engine {
    pub fn new(
        config: &Config,
        catalog: Arc<RepairTaskCatalog>,
        wal_path: PathBuf,
        notify: Arc<NotifyHub>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let calendar = OperatingCalendar::new(
            config.opening_minutes,
            config.closing_minutes,
            config.min_appointment_minutes,
        )?;

        let events = Wal::replay(&wal_path).map_err(|e| EngineError::WalError(e.to_string()))?;
        let wal = Wal::open(&wal_path).map_err(|e| EngineError::WalError(e.to_string()))?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            state: DashMap::new(),
            wal_tx,
            notify,
            entity_to_day: DashMap::new(),
            calendar,
            max_spots: config.max_spots,
            cancellation_threshold_ms: config.cancellation_threshold_minutes as Ms * MINUTE_MS,
            catalog,
        };

        // Replay — we're the sole owner of these Arcs, so try_write always
        // succeeds instantly. Never use blocking_write here because this may
        // run inside an async context.
        for event in &events {
            match event {
                Event::WorkOrderRescheduled { id, from_day, day, spot, window, actor, at }
                    if from_day != day =>
                {
                    let moved = engine.state.get(from_day).and_then(|entry| {
                        let arc = entry.value().clone();
                        let mut guard = arc.try_write().expect("replay: uncontended write");
                        guard.take_order(id)
                    });
                    if let Some(mut order) = moved {
                        order.spot = *spot;
                        order.window = *window;
                        order.audit.touch(actor, *at);
                        let target = engine.day_entry(*day);
                        let mut guard = target.try_write().expect("replay: uncontended write");
                        guard.insert_order(order);
                        engine.entity_to_day.insert(*id, *day);
                    }
                }
                // Day-creating events, like their live paths via day_entry.
                Event::WorkOrderBooked { day, .. } | Event::SlotLocked { day, .. } => {
                    let target = engine.day_entry(*day);
                    let mut guard = target.try_write().expect("replay: uncontended write");
                    apply_to_day(&mut guard, event, &engine.entity_to_day);
                }
                other => {
                    if let Some(entry) = engine.state.get(&other.day()) {
                        let arc = entry.value().clone();
                        let mut guard = arc.try_write().expect("replay: uncontended write");
                        apply_to_day(&mut guard, other, &engine.entity_to_day);
                    }
                }
            }
        }

        Ok(engine)
    }

    pub fn calendar(&self) -> &OperatingCalendar {
        &self.calendar
    }

    pub fn max_spots(&self) -> u16 {
        self.max_spots
    }

    pub fn get_day(&self, day: Day) -> Option<SharedDayState> {
        self.state.get(&day).map(|e| e.value().clone())
    }

    /// Get or lazily create the state for a day.
    pub(super) fn day_entry(&self, day: Day) -> SharedDayState {
        let entry = self
            .state
            .entry(day)
            .or_insert_with(|| Arc::new(RwLock::new(DayState::new(day))))
            .value()
            .clone();
        metrics::gauge!(crate::observability::DAYS_LOADED).set(self.state.len() as f64);
        entry
    }

    pub fn day_for_order(&self, id: &Ulid) -> Option<Day> {
        self.entity_to_day.get(id).map(|e| *e.value())
    }

    /// Lookup order → day, then acquire that day's write lock.
    pub(super) async fn resolve_order_write(
        &self,
        id: &Ulid,
    ) -> Result<(Day, tokio::sync::OwnedRwLockWriteGuard<DayState>), EngineError> {
        let day = self.day_for_order(id).ok_or(EngineError::NotFound(*id))?;
        let ds = self.get_day(day).ok_or(EngineError::NotFound(*id))?;
        let guard = ds.write_owned().await;
        Ok((day, guard))
    }

    /// Write event to WAL via the background group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// WAL-append + apply + notify, in that order. A persistence failure
    /// aborts before any in-memory change; notification happens only for
    /// what actually committed.
    pub(super) async fn persist_and_apply(
        &self,
        day: Day,
        ds: &mut DayState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_day(ds, event, &self.entity_to_day);
        self.notify.send(day, event);
        Ok(())
    }
}
