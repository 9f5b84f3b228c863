use ulid::Ulid;

use crate::model::{SpotId, WorkOrderState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    InvalidConfiguration(&'static str),
    NotFound(Ulid),
    AlreadyExists(Ulid),
    UnknownSpot(SpotId),
    UnknownTask(Ulid),
    OutsideOperatingHours,
    DurationTooShort,
    DurationInsufficientForTasks,
    /// Another work order already occupies the spot/time. Carries the
    /// conflicting order's id.
    SpotTimeConflict(Ulid),
    /// A technician is already booked in the window, on any spot.
    LaborTimeConflict(Ulid),
    InvalidTransition {
        from: WorkOrderState,
        to: WorkOrderState,
    },
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidConfiguration(msg) => write!(f, "invalid configuration: {msg}"),
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::UnknownSpot(spot) => write!(f, "unknown {spot}"),
            EngineError::UnknownTask(id) => write!(f, "unknown repair task: {id}"),
            EngineError::OutsideOperatingHours => {
                write!(f, "window lies outside operating hours")
            }
            EngineError::DurationTooShort => {
                write!(f, "window shorter than minimum appointment duration")
            }
            EngineError::DurationInsufficientForTasks => {
                write!(f, "window too short for the assigned repair tasks")
            }
            EngineError::SpotTimeConflict(id) => {
                write!(f, "spot/time conflict with work order: {id}")
            }
            EngineError::LaborTimeConflict(id) => {
                write!(f, "technician already booked on work order: {id}")
            }
            EngineError::InvalidTransition { from, to } => {
                write!(f, "invalid transition: {from} -> {to}")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
