use ulid::Ulid;

use crate::model::*;

use super::availability::compute_schedule;
use super::validate::now_ms;
use super::Engine;

impl Engine {
    /// Availability view for a day: free and occupied slots for every spot,
    /// recomputed from committed state on each call. Days with no bookings
    /// yield one all-day free slot per spot.
    pub async fn get_schedule(&self, day: Day) -> Schedule {
        let operating = self.calendar.window_for(day);
        let now = now_ms();
        match self.get_day(day) {
            Some(ds) => {
                let guard = ds.read().await;
                compute_schedule(day, &operating, &guard, self.max_spots, now)
            }
            None => {
                let empty = DayState::new(day);
                compute_schedule(day, &operating, &empty, self.max_spots, now)
            }
        }
    }

    pub async fn get_work_order(&self, id: &Ulid) -> Option<WorkOrder> {
        let day = self.day_for_order(id)?;
        let ds = self.get_day(day)?;
        let guard = ds.read().await;
        guard.order(id).cloned()
    }

    /// All work orders on a day, terminal ones included, in (start, id) order.
    pub async fn list_work_orders(&self, day: Day) -> Vec<WorkOrder> {
        match self.get_day(day) {
            Some(ds) => ds.read().await.orders.clone(),
            None => Vec::new(),
        }
    }

    /// Advisory locks on a day that are still active.
    pub async fn list_active_locks(&self, day: Day) -> Vec<SlotLock> {
        let now = now_ms();
        match self.get_day(day) {
            Some(ds) => {
                let guard = ds.read().await;
                guard
                    .locks
                    .iter()
                    .filter(|l| l.is_active(now))
                    .cloned()
                    .collect()
            }
            None => Vec::new(),
        }
    }
}
