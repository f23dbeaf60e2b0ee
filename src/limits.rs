//! Hard limits enforced at the engine boundary.

pub const MAX_NAME_LEN: usize = 100;
pub const MAX_ROOM_NUMBER_LEN: usize = 10;
pub const MAX_PASSPORT_LEN: usize = 20;

pub const MAX_HOTELS: usize = 10_000;
pub const MAX_ROOMS: usize = 100_000;
pub const MAX_BOOKINGS_PER_ROOM: usize = 50_000;

/// Longest stay accepted, in nights.
pub const MAX_STAY_NIGHTS: i64 = 366;

pub const DEFAULT_PAGE_SIZE: usize = 100;
pub const MAX_PAGE_SIZE: usize = 10_000;

/// Largest encoded event the WAL writes or accepts on replay.
pub const MAX_EVENT_BYTES: usize = 1 << 20;
