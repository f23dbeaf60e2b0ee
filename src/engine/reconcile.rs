use chrono::NaiveDate;

use crate::model::*;

use super::{apply_to_room, Engine, EngineError};

/// Occupancy implied by the room's bookings on `today`.
pub fn derived_status(rs: &RoomState, today: NaiveDate) -> RoomStatus {
    if rs.active_on(today).next().is_some() {
        RoomStatus::Occupied
    } else {
        RoomStatus::Available
    }
}

/// The status a reconciliation would write, or `None` when nothing changes.
/// Manual statuses are never overwritten.
pub fn pending_status(rs: &RoomState, today: NaiveDate) -> Option<RoomStatus> {
    if rs.room.status.is_manual() {
        return None;
    }
    let target = derived_status(rs, today);
    (target != rs.room.status).then_some(target)
}

/// Event reconciling a room, for inclusion in a mutation's WAL batch.
pub(super) fn reconcile_event(rs: &RoomState, today: NaiveDate) -> Option<Event> {
    pending_status(rs, today).map(|status| Event::RoomStatusChanged {
        room_id: rs.id(),
        status,
    })
}

impl Engine {
    /// Bring one room's stored status in line with its bookings on `today`.
    pub async fn reconcile_room(
        &self,
        room_id: RoomId,
        today: NaiveDate,
    ) -> Result<Reconciled, EngineError> {
        let mut guard = self.lock_room(room_id).await?;
        let Some(event) = reconcile_event(&guard, today) else {
            return Ok(Reconciled {
                room_id,
                status: guard.room.status,
                updated: false,
            });
        };
        self.wal_append_all(std::slice::from_ref(&event)).await?;
        apply_to_room(&mut guard, &event);
        metrics::counter!(crate::observability::ROOM_STATUS_UPDATES_TOTAL).increment(1);
        tracing::debug!(room_id, status = %guard.room.status, %today, "room reconciled");
        Ok(Reconciled {
            room_id,
            status: guard.room.status,
            updated: true,
        })
    }

    /// Reconcile every room, each under its own lock. Rooms that stay busy
    /// past the lock timeout are left for the next pass.
    pub async fn reconcile_all(&self, today: NaiveDate) -> Result<usize, EngineError> {
        let mut updated = 0;
        for room_id in self.room_ids() {
            match self.reconcile_room(room_id, today).await {
                Ok(r) if r.updated => updated += 1,
                Ok(_) => {}
                Err(EngineError::ConcurrentModification(_)) => {
                    tracing::warn!(room_id, "room busy, skipped reconciliation");
                }
                // Removed between listing and locking
                Err(EngineError::NotFound(..)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, day).unwrap()
    }

    fn room(status: RoomStatus) -> RoomState {
        let mut rs = RoomState::new(Room {
            id: 10,
            hotel_id: 1,
            type_id: 1,
            floor: 1,
            room_number: "101".into(),
            status,
        });
        rs.insert_booking(Booking {
            id: 1,
            room_id: 10,
            client_id: 1,
            stay: StayInterval::new(d(1), d(5)),
            status: BookingStatus::Confirmed,
        });
        rs
    }

    #[test]
    fn derived_follows_calendar() {
        let rs = room(RoomStatus::Available);
        assert_eq!(derived_status(&rs, d(1)), RoomStatus::Occupied);
        assert_eq!(derived_status(&rs, d(5)), RoomStatus::Occupied);
        assert_eq!(derived_status(&rs, d(6)), RoomStatus::Available);
    }

    #[test]
    fn pending_only_when_different() {
        assert_eq!(
            pending_status(&room(RoomStatus::Available), d(3)),
            Some(RoomStatus::Occupied)
        );
        assert_eq!(pending_status(&room(RoomStatus::Occupied), d(3)), None);
        assert_eq!(
            pending_status(&room(RoomStatus::Occupied), d(9)),
            Some(RoomStatus::Available)
        );
    }

    #[test]
    fn manual_statuses_are_left_alone() {
        assert_eq!(pending_status(&room(RoomStatus::Maintenance), d(3)), None);
        assert_eq!(pending_status(&room(RoomStatus::Cleaning), d(9)), None);
    }

    #[test]
    fn cancelled_booking_does_not_occupy() {
        let mut rs = room(RoomStatus::Occupied);
        let mut b = rs.remove_booking(1).unwrap();
        b.status = BookingStatus::Cancelled;
        rs.insert_booking(b);
        assert_eq!(pending_status(&rs, d(3)), Some(RoomStatus::Available));
    }
}
