use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

pub type HotelId = i64;
pub type RoomTypeId = i64;
pub type RoomId = i64;
pub type ClientId = i64;
pub type BookingId = i64;
pub type EmployeeId = i64;
pub type ScheduleId = i64;
pub type CleaningLogId = i64;

/// Closed interval `[check_in, check_out]`, inclusive of both days.
///
/// A stay ending on day D and another starting on day D share that day and
/// therefore overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StayInterval {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

impl StayInterval {
    pub fn new(check_in: NaiveDate, check_out: NaiveDate) -> Self {
        Self { check_in, check_out }
    }

    pub fn is_inverted(&self) -> bool {
        self.check_in > self.check_out
    }

    pub fn nights(&self) -> i64 {
        (self.check_out - self.check_in).num_days()
    }

    pub fn overlaps(&self, other: &StayInterval) -> bool {
        self.check_in <= other.check_out && self.check_out >= other.check_in
    }

    pub fn covers(&self, day: NaiveDate) -> bool {
        self.check_in <= day && day <= self.check_out
    }
}

impl fmt::Display for StayInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.check_in, self.check_out)
    }
}

// ── Status taxonomies ────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {label:?}")]
pub struct UnknownLabel {
    pub kind: &'static str,
    pub label: String,
}

/// Closed enum with a fixed snake_case wire label per variant.
macro_rules! labelled_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $label:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownLabel;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let wanted = s.trim();
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str().eq_ignore_ascii_case(wanted))
                    .ok_or_else(|| UnknownLabel {
                        kind: stringify!($name),
                        label: s.to_string(),
                    })
            }
        }
    };
}

labelled_enum! {
    /// Occupancy status of a room.
    #[derive(Default)]
    RoomStatus {
        #[default]
        Available => "available",
        Occupied => "occupied",
        /// Set by staff; never overwritten by reconciliation.
        Cleaning => "cleaning",
        /// Set by staff; never overwritten by reconciliation.
        Maintenance => "maintenance",
    }
}

impl RoomStatus {
    /// Manually managed statuses sit outside booking-derived logic.
    pub fn is_manual(&self) -> bool {
        matches!(self, RoomStatus::Cleaning | RoomStatus::Maintenance)
    }
}

labelled_enum! {
    #[derive(Default)]
    BookingStatus {
        #[default]
        Confirmed => "confirmed",
        Paid => "paid",
        CheckedIn => "checked_in",
        Cancelled => "cancelled",
        CheckedOut => "checked_out",
    }
}

impl BookingStatus {
    /// Active bookings count toward occupancy and conflicts.
    pub fn is_active(&self) -> bool {
        !matches!(self, BookingStatus::Cancelled | BookingStatus::CheckedOut)
    }
}

labelled_enum! {
    #[derive(Default)]
    EmployeeStatus {
        #[default]
        Active => "active",
        OnLeave => "on_leave",
        Dismissed => "dismissed",
    }
}

labelled_enum! {
    #[derive(Default)]
    CleaningStatus {
        #[default]
        Pending => "pending",
        InProgress => "in_progress",
        Completed => "completed",
        Skipped => "skipped",
    }
}

// ── Records ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hotel {
    pub id: HotelId,
    pub name: String,
    pub total_rooms: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomType {
    pub id: RoomTypeId,
    pub name: String,
    /// Guests per room.
    pub capacity: u32,
    pub price_per_night: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub hotel_id: HotelId,
    pub type_id: RoomTypeId,
    pub floor: i32,
    pub room_number: String,
    pub status: RoomStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub first_name: String,
    pub last_name: String,
    pub passport_number: String,
    pub city: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub room_id: RoomId,
    pub client_id: ClientId,
    pub stay: StayInterval,
    pub status: BookingStatus,
}

impl Booking {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    pub id: EmployeeId,
    pub hotel_id: HotelId,
    pub first_name: String,
    pub last_name: String,
    pub status: EmployeeStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleaningSchedule {
    pub id: ScheduleId,
    pub employee_id: EmployeeId,
    pub floor: i32,
    pub day_of_week: Weekday,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleaningLog {
    pub id: CleaningLogId,
    pub room_id: RoomId,
    pub employee_id: EmployeeId,
    pub cleaning_date: NaiveDate,
    pub status: CleaningStatus,
}

// ── Per-room state ───────────────────────────────────────────────

/// A room together with every booking that references it.
#[derive(Debug, Clone)]
pub struct RoomState {
    pub room: Room,
    /// Active and inactive bookings, sorted by `stay.check_in`.
    pub bookings: Vec<Booking>,
}

impl RoomState {
    pub fn new(room: Room) -> Self {
        Self {
            room,
            bookings: Vec::new(),
        }
    }

    pub fn id(&self) -> RoomId {
        self.room.id
    }

    /// Insert booking maintaining sort order by check-in.
    pub fn insert_booking(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .binary_search_by_key(&booking.stay.check_in, |b| b.stay.check_in)
            .unwrap_or_else(|e| e);
        self.bookings.insert(pos, booking);
    }

    pub fn remove_booking(&mut self, id: BookingId) -> Option<Booking> {
        let pos = self.bookings.iter().position(|b| b.id == id)?;
        Some(self.bookings.remove(pos))
    }

    pub fn booking(&self, id: BookingId) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    /// Bookings whose stay overlaps `query`, active or not.
    /// Binary search skips everything checking in after `query.check_out`.
    pub fn overlapping(&self, query: &StayInterval) -> impl Iterator<Item = &Booking> + use<'_> {
        let query = *query;
        let right_bound = self
            .bookings
            .partition_point(|b| b.stay.check_in <= query.check_out);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.stay.check_out >= query.check_in)
    }

    /// Active bookings whose stay includes `day`.
    pub fn active_on(&self, day: NaiveDate) -> impl Iterator<Item = &Booking> + use<'_> {
        self.overlapping(&StayInterval::new(day, day))
            .filter(|b| b.is_active())
    }
}

/// The event types. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    HotelCreated {
        hotel: Hotel,
    },
    RoomTypeCreated {
        room_type: RoomType,
    },
    RoomCreated {
        room: Room,
    },
    RoomStatusChanged {
        room_id: RoomId,
        status: RoomStatus,
    },
    ClientCreated {
        client: Client,
    },
    BookingCreated {
        booking: Booking,
    },
    BookingUpdated {
        booking: Booking,
        previous_room_id: RoomId,
    },
    BookingDeleted {
        id: BookingId,
        room_id: RoomId,
    },
    EmployeeCreated {
        employee: Employee,
    },
    EmployeeStatusChanged {
        id: EmployeeId,
        status: EmployeeStatus,
    },
    CleaningScheduleCreated {
        schedule: CleaningSchedule,
    },
    CleaningLogCreated {
        log: CleaningLog,
    },
    CleaningLogStatusChanged {
        id: CleaningLogId,
        status: CleaningStatus,
    },
}

/// Partial update of a booking; `None` fields keep their current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BookingPatch {
    pub room_id: Option<RoomId>,
    pub client_id: Option<ClientId>,
    pub check_in: Option<NaiveDate>,
    pub check_out: Option<NaiveDate>,
    pub status: Option<BookingStatus>,
}

impl BookingPatch {
    pub fn status(status: BookingStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// The booking as it reads after the patch.
    pub fn apply_to(&self, booking: &Booking) -> Booking {
        Booking {
            id: booking.id,
            room_id: self.room_id.unwrap_or(booking.room_id),
            client_id: self.client_id.unwrap_or(booking.client_id),
            stay: StayInterval::new(
                self.check_in.unwrap_or(booking.stay.check_in),
                self.check_out.unwrap_or(booking.stay.check_out),
            ),
            status: self.status.unwrap_or(booking.status),
        }
    }
}

// ── Query result types ───────────────────────────────────────────

/// Outcome of an availability check. A conflict is a declined request,
/// not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    NoConflict,
    Conflict(BookingId),
}

impl Availability {
    pub fn is_available(&self) -> bool {
        matches!(self, Availability::NoConflict)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciled {
    pub room_id: RoomId,
    pub status: RoomStatus,
    pub updated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OccupancyReport {
    pub hotel_id: HotelId,
    pub total: usize,
    pub available: usize,
    pub occupied: usize,
    pub cleaning: usize,
    pub maintenance: usize,
}

impl OccupancyReport {
    pub fn occupancy_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.occupied as f64 / self.total as f64
        }
    }
}

/// Offset/limit window for list queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub skip: usize,
    pub limit: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: crate::limits::DEFAULT_PAGE_SIZE,
        }
    }
}

impl Page {
    pub fn new(skip: usize, limit: usize) -> Self {
        Self {
            skip,
            limit: limit.min(crate::limits::MAX_PAGE_SIZE),
        }
    }

    pub fn all() -> Self {
        Self {
            skip: 0,
            limit: usize::MAX,
        }
    }

    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        items.into_iter().skip(self.skip).take(self.limit).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn stay(a: &str, b: &str) -> StayInterval {
        StayInterval::new(d(a), d(b))
    }

    fn booking(id: BookingId, a: &str, b: &str, status: BookingStatus) -> Booking {
        Booking {
            id,
            room_id: 10,
            client_id: 1,
            stay: stay(a, b),
            status,
        }
    }

    fn room_state() -> RoomState {
        RoomState::new(Room {
            id: 10,
            hotel_id: 1,
            type_id: 1,
            floor: 1,
            room_number: "101".into(),
            status: RoomStatus::Available,
        })
    }

    #[test]
    fn stay_overlap_is_closed_closed() {
        let a = stay("2024-06-01", "2024-06-05");
        assert!(a.overlaps(&stay("2024-06-03", "2024-06-07")));
        // Checkout day equals check-in day: shared day, conflict
        assert!(a.overlaps(&stay("2024-06-05", "2024-06-10")));
        assert!(stay("2024-05-25", "2024-06-01").overlaps(&a));
        assert!(!a.overlaps(&stay("2024-06-06", "2024-06-10")));
        assert!(!a.overlaps(&stay("2024-05-20", "2024-05-31")));
    }

    #[test]
    fn stay_covers_both_endpoints() {
        let a = stay("2024-06-01", "2024-06-05");
        assert!(a.covers(d("2024-06-01")));
        assert!(a.covers(d("2024-06-05")));
        assert!(!a.covers(d("2024-06-06")));
        assert_eq!(a.nights(), 4);
    }

    #[test]
    fn inverted_stay_detected() {
        assert!(stay("2024-06-05", "2024-06-01").is_inverted());
        assert!(!stay("2024-06-05", "2024-06-05").is_inverted());
    }

    #[test]
    fn status_labels_parse_case_insensitively() {
        assert_eq!("Maintenance".parse::<RoomStatus>().unwrap(), RoomStatus::Maintenance);
        assert_eq!("checked_in".parse::<BookingStatus>().unwrap(), BookingStatus::CheckedIn);
        assert_eq!(" ON_LEAVE ".parse::<EmployeeStatus>().unwrap(), EmployeeStatus::OnLeave);
        let err = "vacant".parse::<RoomStatus>().unwrap_err();
        assert_eq!(err.kind, "RoomStatus");
    }

    #[test]
    fn booking_status_classes() {
        assert!(BookingStatus::Confirmed.is_active());
        assert!(BookingStatus::Paid.is_active());
        assert!(BookingStatus::CheckedIn.is_active());
        assert!(!BookingStatus::Cancelled.is_active());
        assert!(!BookingStatus::CheckedOut.is_active());
    }

    #[test]
    fn manual_room_statuses() {
        assert!(RoomStatus::Cleaning.is_manual());
        assert!(RoomStatus::Maintenance.is_manual());
        assert!(!RoomStatus::Available.is_manual());
        assert!(!RoomStatus::Occupied.is_manual());
    }

    #[test]
    fn bookings_kept_sorted_by_check_in() {
        let mut rs = room_state();
        rs.insert_booking(booking(3, "2024-07-01", "2024-07-03", BookingStatus::Paid));
        rs.insert_booking(booking(1, "2024-05-01", "2024-05-03", BookingStatus::Paid));
        rs.insert_booking(booking(2, "2024-06-01", "2024-06-03", BookingStatus::Paid));
        let ids: Vec<_> = rs.bookings.iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn overlapping_includes_touching_and_skips_disjoint() {
        let mut rs = room_state();
        rs.insert_booking(booking(1, "2024-05-01", "2024-05-10", BookingStatus::Confirmed));
        rs.insert_booking(booking(2, "2024-06-01", "2024-06-05", BookingStatus::Confirmed));
        rs.insert_booking(booking(3, "2024-06-20", "2024-06-25", BookingStatus::Confirmed));

        let hits: Vec<_> = rs
            .overlapping(&stay("2024-06-05", "2024-06-20"))
            .map(|b| b.id)
            .collect();
        assert_eq!(hits, vec![2, 3]);

        assert_eq!(rs.overlapping(&stay("2024-05-11", "2024-05-31")).count(), 0);
    }

    #[test]
    fn overlapping_long_stay_spanning_query() {
        let mut rs = room_state();
        rs.insert_booking(booking(1, "2024-01-01", "2024-12-31", BookingStatus::Confirmed));
        assert_eq!(rs.overlapping(&stay("2024-06-01", "2024-06-02")).count(), 1);
    }

    #[test]
    fn active_on_ignores_inactive() {
        let mut rs = room_state();
        rs.insert_booking(booking(1, "2024-06-01", "2024-06-05", BookingStatus::Cancelled));
        assert_eq!(rs.active_on(d("2024-06-03")).count(), 0);
        rs.insert_booking(booking(2, "2024-06-03", "2024-06-04", BookingStatus::CheckedIn));
        assert_eq!(rs.active_on(d("2024-06-03")).count(), 1);
    }

    #[test]
    fn overlap_iterators_outlive_the_query() {
        let mut rs = room_state();
        rs.insert_booking(booking(1, "2024-06-01", "2024-06-05", BookingStatus::Paid));

        let hits = {
            let query = stay("2024-06-04", "2024-06-08");
            rs.overlapping(&query)
        };
        assert_eq!(hits.map(|b| b.id).collect::<Vec<_>>(), vec![1]);

        let active = rs.active_on(d("2024-06-02"));
        assert_eq!(active.count(), 1);
    }

    #[test]
    fn remove_booking_by_id() {
        let mut rs = room_state();
        rs.insert_booking(booking(1, "2024-06-01", "2024-06-05", BookingStatus::Confirmed));
        assert!(rs.remove_booking(99).is_none());
        assert_eq!(rs.remove_booking(1).map(|b| b.id), Some(1));
        assert!(rs.bookings.is_empty());
    }

    #[test]
    fn occupancy_rate_handles_empty_hotel() {
        let empty = OccupancyReport::default();
        assert_eq!(empty.occupancy_rate(), 0.0);
        let half = OccupancyReport {
            total: 4,
            occupied: 2,
            ..Default::default()
        };
        assert_eq!(half.occupancy_rate(), 0.5);
    }

    #[test]
    fn page_window() {
        let items: Vec<i32> = (0..10).collect();
        assert_eq!(Page::new(2, 3).apply(items.clone()), vec![2, 3, 4]);
        assert_eq!(Page::new(8, 5).apply(items), vec![8, 9]);
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::BookingCreated {
            booking: booking(7, "2024-06-01", "2024-06-05", BookingStatus::Paid),
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
