use chrono::NaiveDate;

use crate::model::{BookingId, RoomId};

/// Record kinds, used to tell apart which id went missing or collided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Hotel,
    RoomType,
    Room,
    Client,
    Booking,
    Employee,
    CleaningSchedule,
    CleaningLog,
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Entity::Hotel => "hotel",
            Entity::RoomType => "room type",
            Entity::Room => "room",
            Entity::Client => "client",
            Entity::Booking => "booking",
            Entity::Employee => "employee",
            Entity::CleaningSchedule => "cleaning schedule",
            Entity::CleaningLog => "cleaning log",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid stay: check-in {check_in} is after check-out {check_out}")]
    InvalidInterval {
        check_in: NaiveDate,
        check_out: NaiveDate,
    },
    #[error("room {room_id} is already booked for these dates (booking {booking_id})")]
    Conflict { room_id: RoomId, booking_id: BookingId },
    #[error("{0} not found: {1}")]
    NotFound(Entity, i64),
    #[error("{0} already exists: {1}")]
    AlreadyExists(Entity, i64),
    #[error("room {0} is busy, retry the operation")]
    ConcurrentModification(RoomId),
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error("WAL error: {0}")]
    WalError(String),
}

impl EngineError {
    /// Retrying the whole operation may succeed without changing the input.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::ConcurrentModification(_))
    }
}
