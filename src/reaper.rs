use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::engine::Engine;
use crate::model::Ms;

fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as Ms
}

/// Background task that auto-cancels overdue, unconfirmed bookings.
/// Candidates come from a lock-free scan; `sweep_cancel` re-checks
/// eligibility under the day lock, so a race just becomes a skip.
pub async fn run_sweep(engine: Arc<Engine>, frequency_minutes: u32) {
    let mut interval = tokio::time::interval(Duration::from_secs(frequency_minutes as u64 * 60));
    loop {
        interval.tick().await;
        let now = now_ms();
        for id in engine.collect_overdue(now) {
            match engine.sweep_cancel(id, now).await {
                Ok(true) => info!("cancelled overdue work order {id}"),
                Ok(false) => {} // confirmed or mutated since the scan
                Err(e) => tracing::debug!("sweep skip {id}: {e}"),
            }
        }
    }
}

/// Background task that releases expired advisory slot locks.
pub async fn run_lock_reaper(engine: Arc<Engine>) {
    let mut interval = tokio::time::interval(Duration::from_secs(5));
    loop {
        interval.tick().await;
        let now = now_ms();
        for id in engine.collect_expired_locks(now) {
            match engine.unlock_slot(id).await {
                Ok(_) => info!("released expired slot lock {id}"),
                Err(e) => {
                    // May already have been released by its holder
                    tracing::debug!("lock reaper skip {id}: {e}");
                }
            }
        }
    }
}

/// Background task that compacts the WAL once enough appends accumulate.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        interval.tick().await;
        let appends = engine.wal_appends_since_compact().await;
        if appends < threshold {
            continue;
        }
        match engine.compact_wal().await {
            Ok(()) => info!("compacted WAL after {appends} appends"),
            Err(e) => tracing::warn!("WAL compaction failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::directory::RepairTaskCatalog;
    use crate::model::*;
    use crate::notify::NotifyHub;
    use std::path::PathBuf;
    use ulid::Ulid;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("bayline_test_reaper");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn lock_reaper_releases_expired_locks() {
        let path = test_wal_path("lock_reaper.wal");
        let engine = Arc::new(
            Engine::new(
                &Config::default(),
                Arc::new(RepairTaskCatalog::new()),
                path,
                Arc::new(NotifyHub::new()),
            )
            .unwrap(),
        );

        let day: Day = 20_000;
        let start = day * DAY_MS + 9 * 3_600_000;
        let lock_id = Ulid::new();
        engine
            .lock_slot(
                lock_id,
                SpotId(1),
                Window::new(start, start + 3_600_000),
                now_ms() - 1000,
                "dispatcher-a",
            )
            .await
            .unwrap();

        let expired = engine.collect_expired_locks(now_ms());
        assert_eq!(expired, vec![lock_id]);

        engine.unlock_slot(lock_id).await.unwrap();
        assert!(engine.collect_expired_locks(now_ms()).is_empty());
    }
}
