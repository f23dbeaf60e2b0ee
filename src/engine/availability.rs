use crate::model::*;

use super::conflict::{find_conflict, validate_interval};
use super::{Engine, EngineError, Entity, SharedRoomState};

impl Engine {
    /// Whether `stay` is free on the room, ignoring `exclude` if given.
    /// A conflict is an answer, not an error.
    pub async fn check_availability(
        &self,
        room_id: RoomId,
        stay: StayInterval,
        exclude: Option<BookingId>,
    ) -> Result<Availability, EngineError> {
        validate_interval(&stay)?;
        let guard = self.read_room(room_id).await?;
        Ok(match find_conflict(&guard, &stay, exclude) {
            Some(booking_id) => Availability::Conflict(booking_id),
            None => Availability::NoConflict,
        })
    }

    /// Rooms free for `stay`, ascending by id. Rooms under maintenance are
    /// never offered.
    pub async fn find_available_rooms(
        &self,
        stay: StayInterval,
    ) -> Result<Vec<RoomId>, EngineError> {
        validate_interval(&stay)?;
        self.available_among(self.room_snapshot(), &stay).await
    }

    pub async fn find_available_rooms_in_hotel(
        &self,
        hotel_id: HotelId,
        stay: StayInterval,
    ) -> Result<Vec<RoomId>, EngineError> {
        validate_interval(&stay)?;
        if !self.hotels.contains_key(&hotel_id) {
            return Err(EngineError::NotFound(Entity::Hotel, hotel_id));
        }
        let mut rooms = Vec::new();
        for (id, rs) in self.room_snapshot() {
            if self.read_shared(id, rs.clone()).await?.room.hotel_id == hotel_id {
                rooms.push((id, rs));
            }
        }
        self.available_among(rooms, &stay).await
    }

    async fn available_among(
        &self,
        rooms: Vec<(RoomId, SharedRoomState)>,
        stay: &StayInterval,
    ) -> Result<Vec<RoomId>, EngineError> {
        let mut free = Vec::new();
        for (id, rs) in rooms {
            let guard = self.read_shared(id, rs).await?;
            if guard.room.status == RoomStatus::Maintenance {
                continue;
            }
            if find_conflict(&guard, stay, None).is_none() {
                free.push(id);
            }
        }
        Ok(free)
    }
}
