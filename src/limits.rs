use crate::model::Ms;

/// Hard caps protecting memory and the WAL from runaway input.
/// Violations surface as `EngineError::LimitExceeded`.
pub const MAX_ORDERS_PER_DAY: usize = 4096;
pub const MAX_LOCKS_PER_DAY: usize = 1024;
pub const MAX_TECHNICIANS_PER_ORDER: usize = 16;
pub const MAX_TASKS_PER_ORDER: usize = 64;
pub const MAX_ACTOR_LEN: usize = 128;
pub const MAX_LOADED_DAYS: usize = 4096;

/// Year 2000 in unix ms.
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
/// Year 2100 in unix ms.
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;
