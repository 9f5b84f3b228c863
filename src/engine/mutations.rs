use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::state::check_transition;
use super::validate::{now_ms, validate_booking, validate_window, BookingCheck};
use super::{Engine, EngineError, WalCommand};

/// A booking candidate as submitted by a dispatcher. The engine assigns
/// the work order id on acceptance.
#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub customer: Ulid,
    pub vehicle: Ulid,
    pub spot: SpotId,
    pub technicians: Vec<Ulid>,
    pub tasks: Vec<Ulid>,
    pub window: Window,
    pub actor: String,
}

impl Engine {
    fn check_spot(&self, spot: SpotId) -> Result<(), EngineError> {
        if spot.0 == 0 || spot.0 > self.max_spots {
            return Err(EngineError::UnknownSpot(spot));
        }
        Ok(())
    }

    fn check_actor(actor: &str) -> Result<(), EngineError> {
        if actor.len() > MAX_ACTOR_LEN {
            return Err(EngineError::LimitExceeded("actor name too long"));
        }
        Ok(())
    }

    fn check_day_budget(&self, day: Day) -> Result<(), EngineError> {
        if !self.state.contains_key(&day) && self.state.len() >= MAX_LOADED_DAYS {
            return Err(EngineError::LimitExceeded("too many loaded days"));
        }
        Ok(())
    }

    /// Accept a booking: window check, validator, commit, notify.
    /// Exactly one of two conflicting concurrent requests can win — the
    /// whole validate-then-commit sequence runs under the day write lock.
    pub async fn book(&self, request: BookingRequest) -> Result<Ulid, EngineError> {
        Self::check_actor(&request.actor)?;
        self.check_spot(request.spot)?;
        validate_window(&request.window)?;
        if request.technicians.is_empty() {
            return Err(EngineError::InvalidConfiguration(
                "at least one technician must be assigned",
            ));
        }
        if request.technicians.len() > MAX_TECHNICIANS_PER_ORDER {
            return Err(EngineError::LimitExceeded("too many technicians"));
        }
        if request.tasks.len() > MAX_TASKS_PER_ORDER {
            return Err(EngineError::LimitExceeded("too many repair tasks"));
        }
        let task_total_ms = self.catalog.estimated_total_ms(&request.tasks)?;

        let day = request.window.day();
        let operating = self.calendar.window_for(day);
        self.check_day_budget(day)?;

        let ds = self.day_entry(day);
        let mut guard = ds.write().await;
        if guard.orders.len() >= MAX_ORDERS_PER_DAY {
            return Err(EngineError::LimitExceeded("too many orders on day"));
        }

        let check = BookingCheck {
            spot: request.spot,
            window: request.window,
            technicians: &request.technicians,
            task_total_ms,
            exclude: None,
        };
        if let Err(e) = validate_booking(
            &check,
            &guard,
            &operating,
            self.calendar.min_appointment_ms(),
        ) {
            metrics::counter!(crate::observability::CONFLICTS_TOTAL).increment(1);
            return Err(e);
        }

        let id = Ulid::new();
        let event = Event::WorkOrderBooked {
            id,
            day,
            customer: request.customer,
            vehicle: request.vehicle,
            spot: request.spot,
            technicians: request.technicians,
            tasks: request.tasks,
            window: request.window,
            actor: request.actor,
            at: now_ms(),
        };
        self.persist_and_apply(day, &mut guard, &event).await?;
        metrics::counter!(crate::observability::BOOKINGS_TOTAL).increment(1);
        Ok(id)
    }

    /// Move a Scheduled order to a new spot and/or window, possibly on a
    /// different day. Subject to the same conflict checks as a fresh
    /// booking, excluding the order's own current occupancy.
    pub async fn reschedule(
        &self,
        id: Ulid,
        new_spot: SpotId,
        new_window: Window,
        actor: &str,
    ) -> Result<(), EngineError> {
        Self::check_actor(actor)?;
        self.check_spot(new_spot)?;
        validate_window(&new_window)?;

        let from_day = self.day_for_order(&id).ok_or(EngineError::NotFound(id))?;
        let to_day = new_window.day();
        let operating = self.calendar.window_for(to_day);

        if from_day == to_day {
            let ds = self.get_day(from_day).ok_or(EngineError::NotFound(id))?;
            let mut guard = ds.write().await;
            let order = guard.order(&id).ok_or(EngineError::NotFound(id))?;
            if order.state != WorkOrderState::Scheduled {
                return Err(EngineError::InvalidTransition {
                    from: order.state,
                    to: WorkOrderState::Scheduled,
                });
            }
            let task_total_ms = self.catalog.estimated_total_ms(&order.tasks)?;
            let technicians = order.technicians.clone();

            let check = BookingCheck {
                spot: new_spot,
                window: new_window,
                technicians: &technicians,
                task_total_ms,
                exclude: Some(id),
            };
            if let Err(e) = validate_booking(
                &check,
                &guard,
                &operating,
                self.calendar.min_appointment_ms(),
            ) {
                metrics::counter!(crate::observability::CONFLICTS_TOTAL).increment(1);
                return Err(e);
            }

            let event = Event::WorkOrderRescheduled {
                id,
                from_day,
                day: to_day,
                spot: new_spot,
                window: new_window,
                actor: actor.to_string(),
                at: now_ms(),
            };
            return self.persist_and_apply(from_day, &mut guard, &event).await;
        }

        // Cross-day move: acquire both day locks in sorted order so two
        // concurrent moves in opposite directions cannot deadlock.
        self.check_day_budget(to_day)?;
        let source = self.get_day(from_day).ok_or(EngineError::NotFound(id))?;
        let target = self.day_entry(to_day);
        let (mut source_guard, mut target_guard) = if from_day < to_day {
            let s = source.write_owned().await;
            let t = target.write_owned().await;
            (s, t)
        } else {
            let t = target.write_owned().await;
            let s = source.write_owned().await;
            (s, t)
        };
        if target_guard.orders.len() >= MAX_ORDERS_PER_DAY {
            return Err(EngineError::LimitExceeded("too many orders on day"));
        }

        let order = source_guard.order(&id).ok_or(EngineError::NotFound(id))?;
        if order.state != WorkOrderState::Scheduled {
            return Err(EngineError::InvalidTransition {
                from: order.state,
                to: WorkOrderState::Scheduled,
            });
        }
        let task_total_ms = self.catalog.estimated_total_ms(&order.tasks)?;
        let technicians = order.technicians.clone();

        let check = BookingCheck {
            spot: new_spot,
            window: new_window,
            technicians: &technicians,
            task_total_ms,
            exclude: Some(id),
        };
        if let Err(e) = validate_booking(
            &check,
            &target_guard,
            &operating,
            self.calendar.min_appointment_ms(),
        ) {
            metrics::counter!(crate::observability::CONFLICTS_TOTAL).increment(1);
            return Err(e);
        }

        let at = now_ms();
        let event = Event::WorkOrderRescheduled {
            id,
            from_day,
            day: to_day,
            spot: new_spot,
            window: new_window,
            actor: actor.to_string(),
            at,
        };
        self.wal_append(&event).await?;

        let mut order = source_guard
            .take_order(&id)
            .expect("order present under write guard");
        order.spot = new_spot;
        order.window = new_window;
        order.audit.touch(actor, at);
        target_guard.insert_order(order);
        self.entity_to_day.insert(id, to_day);

        // Viewers of both days need to refresh.
        self.notify.send(from_day, &event);
        self.notify.send(to_day, &event);
        Ok(())
    }

    /// Dispatcher-initiated lifecycle transition.
    pub async fn transition(
        &self,
        id: Ulid,
        target: WorkOrderState,
        actor: &str,
    ) -> Result<(), EngineError> {
        Self::check_actor(actor)?;
        let (day, mut guard) = self.resolve_order_write(&id).await?;
        let order = guard.order(&id).ok_or(EngineError::NotFound(id))?;
        check_transition(order.state, target)?;

        let cause = (target == WorkOrderState::Cancelled).then_some(CancelCause::Dispatcher);
        let event = Event::WorkOrderTransitioned {
            id,
            day,
            to: target,
            cause,
            actor: actor.to_string(),
            at: now_ms(),
        };
        self.persist_and_apply(day, &mut guard, &event).await?;
        metrics::counter!(crate::observability::TRANSITIONS_TOTAL).increment(1);
        Ok(())
    }

    /// Explicitly mark a booking as confirmed, exempting it from the
    /// overdue sweep. Idempotent; rejected on terminal orders.
    pub async fn confirm(&self, id: Ulid, actor: &str) -> Result<(), EngineError> {
        Self::check_actor(actor)?;
        let (day, mut guard) = self.resolve_order_write(&id).await?;
        let order = guard.order(&id).ok_or(EngineError::NotFound(id))?;
        if order.state.is_terminal() {
            return Err(EngineError::InvalidTransition {
                from: order.state,
                to: order.state,
            });
        }
        if order.confirmed {
            return Ok(());
        }

        let event = Event::WorkOrderConfirmed {
            id,
            day,
            actor: actor.to_string(),
            at: now_ms(),
        };
        self.persist_and_apply(day, &mut guard, &event).await
    }

    /// Sweep path: cancel an overdue booking, re-checking eligibility under
    /// the lock. Returns Ok(false) when a concurrent mutation made the order
    /// ineligible in the meantime — the sweep treats that as a skip.
    pub async fn sweep_cancel(&self, id: Ulid, now: Ms) -> Result<bool, EngineError> {
        let (day, mut guard) = self.resolve_order_write(&id).await?;
        let order = guard.order(&id).ok_or(EngineError::NotFound(id))?;
        if order.state != WorkOrderState::Scheduled
            || order.confirmed
            || order.window.start + self.cancellation_threshold_ms >= now
        {
            return Ok(false);
        }

        let event = Event::WorkOrderTransitioned {
            id,
            day,
            to: WorkOrderState::Cancelled,
            cause: Some(CancelCause::Overdue),
            actor: "sweep".to_string(),
            at: now,
        };
        self.persist_and_apply(day, &mut guard, &event).await?;
        metrics::counter!(crate::observability::SWEEP_CANCELLED_TOTAL).increment(1);
        Ok(true)
    }

    /// Place an advisory lock on a spot/time range while composing a
    /// booking. Purely a UX marker: commit-time validation stays the
    /// source of truth.
    pub async fn lock_slot(
        &self,
        id: Ulid,
        spot: SpotId,
        window: Window,
        expires_at: Ms,
        holder: &str,
    ) -> Result<(), EngineError> {
        Self::check_actor(holder)?;
        self.check_spot(spot)?;
        validate_window(&window)?;
        if self.entity_to_day.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let day = window.day();
        self.check_day_budget(day)?;
        let ds = self.day_entry(day);
        let mut guard = ds.write().await;
        if guard.locks.len() >= MAX_LOCKS_PER_DAY {
            return Err(EngineError::LimitExceeded("too many slot locks on day"));
        }

        let event = Event::SlotLocked {
            id,
            day,
            spot,
            window,
            expires_at,
            holder: holder.to_string(),
        };
        self.persist_and_apply(day, &mut guard, &event).await
    }

    pub async fn unlock_slot(&self, id: Ulid) -> Result<(), EngineError> {
        let day = self.day_for_order(&id).ok_or(EngineError::NotFound(id))?;
        let ds = self.get_day(day).ok_or(EngineError::NotFound(id))?;
        let mut guard = ds.write().await;
        if !guard.locks.iter().any(|l| l.id == id) {
            return Err(EngineError::NotFound(id));
        }

        let event = Event::SlotUnlocked { id, day };
        self.persist_and_apply(day, &mut guard, &event).await
    }

    /// Scan for Scheduled, unconfirmed orders past the cancellation
    /// threshold. Read-only; the sweep re-checks under the write lock.
    pub fn collect_overdue(&self, now: Ms) -> Vec<Ulid> {
        let mut overdue = Vec::new();
        for entry in self.state.iter() {
            let ds = entry.value().clone();
            if let Ok(guard) = ds.try_read() {
                for order in &guard.orders {
                    if order.state == WorkOrderState::Scheduled
                        && !order.confirmed
                        && order.window.start + self.cancellation_threshold_ms < now
                    {
                        overdue.push(order.id);
                    }
                }
            }
        }
        overdue
    }

    /// Scan for advisory locks whose expiry has passed.
    pub fn collect_expired_locks(&self, now: Ms) -> Vec<Ulid> {
        let mut expired = Vec::new();
        for entry in self.state.iter() {
            let ds = entry.value().clone();
            if let Ok(guard) = ds.try_read() {
                for lock in &guard.locks {
                    if !lock.is_active(now) {
                        expired.push(lock.id);
                    }
                }
            }
        }
        expired
    }

    /// Rewrite the WAL with only the events needed to recreate current state.
    /// Waits for in-flight mutations day by day; the snapshot is per-day
    /// consistent, which is all replay needs.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let mut events = Vec::new();

        let mut days: Vec<Day> = self.state.iter().map(|e| *e.key()).collect();
        days.sort_unstable();

        for day in days {
            let entry = match self.state.get(&day) {
                Some(e) => e,
                None => continue,
            };
            let ds = entry.value().clone();
            drop(entry);
            let guard = ds.read().await;

            for order in &guard.orders {
                events.push(Event::WorkOrderBooked {
                    id: order.id,
                    day,
                    customer: order.customer,
                    vehicle: order.vehicle,
                    spot: order.spot,
                    technicians: order.technicians.clone(),
                    tasks: order.tasks.clone(),
                    window: order.window,
                    actor: order.audit.created_by.clone(),
                    at: order.audit.created_at,
                });
                if order.confirmed && order.state == WorkOrderState::Scheduled {
                    events.push(Event::WorkOrderConfirmed {
                        id: order.id,
                        day,
                        actor: order.audit.modified_by.clone(),
                        at: order.audit.modified_at,
                    });
                }
                if order.state != WorkOrderState::Scheduled {
                    events.push(Event::WorkOrderTransitioned {
                        id: order.id,
                        day,
                        to: order.state,
                        cause: order.cancel_cause,
                        actor: order.audit.modified_by.clone(),
                        at: order.audit.modified_at,
                    });
                }
            }
            for lock in &guard.locks {
                events.push(Event::SlotLocked {
                    id: lock.id,
                    day,
                    spot: lock.spot,
                    window: lock.window,
                    expires_at: lock.expires_at,
                    holder: lock.holder.clone(),
                });
            }
        }

        let (tx, rx) = tokio::sync::oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = tokio::sync::oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
