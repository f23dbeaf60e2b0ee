use chrono::NaiveDate;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::oneshot;

use crate::limits::*;
use crate::model::*;

use super::conflict::{check_no_conflict, validate_stay};
use super::queries::sorted_values;
use super::reconcile::{derived_status, reconcile_event};
use super::{apply_to_room, Engine, EngineError, Entity, WalCommand};

/// Claim on a booking id in the booking → room index. Released on drop
/// unless the booking was committed.
struct Reservation<'a> {
    index: &'a DashMap<BookingId, RoomId>,
    id: BookingId,
    committed: bool,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.index.remove(&self.id);
        }
    }
}

/// Apply `event` to a staged copy of the room, then append the room's
/// reconciliation (if any). Returns whether the status changed.
fn stage(
    staged: &mut RoomState,
    event: &Event,
    today: NaiveDate,
    events: &mut Vec<Event>,
) -> bool {
    apply_to_room(staged, event);
    match reconcile_event(staged, today) {
        Some(reconciled) => {
            apply_to_room(staged, &reconciled);
            events.push(reconciled);
            true
        }
        None => false,
    }
}

fn check_room_number(room_number: &str) -> Result<(), EngineError> {
    if room_number.trim().is_empty() {
        return Err(EngineError::InvalidInput("room number must not be empty"));
    }
    if room_number.len() > MAX_ROOM_NUMBER_LEN {
        return Err(EngineError::LimitExceeded("room number too long"));
    }
    Ok(())
}

impl Engine {
    pub async fn create_room(&self, mut room: Room) -> Result<Room, EngineError> {
        check_room_number(&room.room_number)?;
        let _records = self.records_lock.lock().await;
        if self.rooms.len() >= MAX_ROOMS {
            return Err(EngineError::LimitExceeded("too many rooms"));
        }
        if self.rooms.contains_key(&room.id) {
            return Err(EngineError::AlreadyExists(Entity::Room, room.id));
        }
        if !self.hotels.contains_key(&room.hotel_id) {
            return Err(EngineError::NotFound(Entity::Hotel, room.hotel_id));
        }
        if !self.room_types.contains_key(&room.type_id) {
            return Err(EngineError::NotFound(Entity::RoomType, room.type_id));
        }
        // A new room has no bookings, so any derived status is Available.
        if !room.status.is_manual() {
            room.status = RoomStatus::Available;
        }

        let event = Event::RoomCreated { room: room.clone() };
        self.wal_append_all(std::slice::from_ref(&event)).await?;
        self.apply_record(&event);
        tracing::debug!(room_id = room.id, hotel_id = room.hotel_id, "room created");
        Ok(room)
    }

    /// Cleaning and Maintenance are stored as given. Available and Occupied
    /// release a manual status; the room then takes its derived status.
    pub async fn set_room_status(
        &self,
        room_id: RoomId,
        status: RoomStatus,
    ) -> Result<Reconciled, EngineError> {
        let mut guard = self.lock_room(room_id).await?;
        let target = if status.is_manual() {
            status
        } else {
            derived_status(&guard, self.today())
        };
        if target == guard.room.status {
            return Ok(Reconciled {
                room_id,
                status: target,
                updated: false,
            });
        }

        let event = Event::RoomStatusChanged {
            room_id,
            status: target,
        };
        self.wal_append_all(std::slice::from_ref(&event)).await?;
        apply_to_room(&mut guard, &event);
        metrics::counter!(crate::observability::ROOM_STATUS_UPDATES_TOTAL).increment(1);
        tracing::info!(room_id, requested = %status, stored = %target, "room status set");
        Ok(Reconciled {
            room_id,
            status: target,
            updated: true,
        })
    }

    /// Accept a booking if its room is free for the stay, and reconcile the
    /// room in the same commit.
    pub async fn create_booking(&self, booking: Booking) -> Result<Reconciled, EngineError> {
        validate_stay(&booking.stay)?;
        if !self.clients.contains_key(&booking.client_id) {
            return Err(EngineError::NotFound(Entity::Client, booking.client_id));
        }
        match self.booking_to_room.entry(booking.id) {
            Entry::Occupied(_) => {
                return Err(EngineError::AlreadyExists(Entity::Booking, booking.id));
            }
            Entry::Vacant(slot) => {
                slot.insert(booking.room_id);
            }
        }
        let mut reservation = Reservation {
            index: &self.booking_to_room,
            id: booking.id,
            committed: false,
        };

        let room_id = booking.room_id;
        let mut guard = self.lock_room(room_id).await?;
        if guard.bookings.len() >= MAX_BOOKINGS_PER_ROOM {
            return Err(EngineError::LimitExceeded("too many bookings on room"));
        }
        if booking.is_active() {
            check_no_conflict(&guard, &booking.stay, None)?;
        }

        let booking_id = booking.id;
        let event = Event::BookingCreated { booking };
        let mut staged = RoomState::clone(&guard);
        let mut events = vec![event.clone()];
        let updated = stage(&mut staged, &event, self.today(), &mut events);

        self.wal_append_all(&events).await?;
        *guard = staged;
        reservation.committed = true;

        if updated {
            metrics::counter!(crate::observability::ROOM_STATUS_UPDATES_TOTAL).increment(1);
        }
        tracing::debug!(booking_id, room_id, status = %guard.room.status, "booking created");
        Ok(Reconciled {
            room_id,
            status: guard.room.status,
            updated,
        })
    }

    /// Change any of a booking's fields. A move locks both rooms in ascending
    /// id order and reconciles both in the same commit.
    pub async fn update_booking(
        &self,
        id: BookingId,
        patch: BookingPatch,
    ) -> Result<Booking, EngineError> {
        if let Some(client_id) = patch.client_id
            && !self.clients.contains_key(&client_id)
        {
            return Err(EngineError::NotFound(Entity::Client, client_id));
        }
        let from = self
            .room_for_booking(&id)
            .ok_or(EngineError::NotFound(Entity::Booking, id))?;
        let to = patch.room_id.unwrap_or(from);

        let (mut from_guard, mut to_guard) = self.lock_room_pair(from, to).await?;
        let Some(current) = from_guard.booking(id).cloned() else {
            return Err(self.missing_booking(id, from));
        };
        if patch.is_empty() {
            return Ok(current);
        }
        let updated = patch.apply_to(&current);
        validate_stay(&updated.stay)?;

        let target: &RoomState = to_guard.as_deref().unwrap_or(&*from_guard);
        if to != from && target.bookings.len() >= MAX_BOOKINGS_PER_ROOM {
            return Err(EngineError::LimitExceeded("too many bookings on room"));
        }
        if updated.is_active() {
            check_no_conflict(target, &updated.stay, Some(id))?;
        }

        let today = self.today();
        let event = Event::BookingUpdated {
            booking: updated.clone(),
            previous_room_id: from,
        };
        let mut events = vec![event.clone()];
        let mut staged_from = RoomState::clone(&from_guard);
        let mut changed = stage(&mut staged_from, &event, today, &mut events) as u64;
        let staged_to = match to_guard.as_deref() {
            Some(rs) => {
                let mut staged = rs.clone();
                changed += stage(&mut staged, &event, today, &mut events) as u64;
                Some(staged)
            }
            None => None,
        };

        self.wal_append_all(&events).await?;
        *from_guard = staged_from;
        if let (Some(guard), Some(staged)) = (to_guard.as_mut(), staged_to) {
            **guard = staged;
        }
        if to != from {
            self.booking_to_room.insert(id, to);
        }

        metrics::counter!(crate::observability::ROOM_STATUS_UPDATES_TOTAL).increment(changed);
        tracing::debug!(
            booking_id = id,
            from_room = from,
            to_room = to,
            status = %updated.status,
            "booking updated"
        );
        Ok(updated)
    }

    pub async fn set_booking_status(
        &self,
        id: BookingId,
        status: BookingStatus,
    ) -> Result<Booking, EngineError> {
        self.update_booking(id, BookingPatch::status(status)).await
    }

    pub async fn delete_booking(&self, id: BookingId) -> Result<Booking, EngineError> {
        let room_id = self
            .room_for_booking(&id)
            .ok_or(EngineError::NotFound(Entity::Booking, id))?;
        let mut guard = self.lock_room(room_id).await?;
        let Some(booking) = guard.booking(id).cloned() else {
            return Err(self.missing_booking(id, room_id));
        };

        let event = Event::BookingDeleted { id, room_id };
        let mut events = vec![event.clone()];
        let mut staged = RoomState::clone(&guard);
        let updated = stage(&mut staged, &event, self.today(), &mut events);

        self.wal_append_all(&events).await?;
        *guard = staged;
        self.booking_to_room.remove(&id);

        if updated {
            metrics::counter!(crate::observability::ROOM_STATUS_UPDATES_TOTAL).increment(1);
        }
        tracing::debug!(booking_id = id, room_id, "booking deleted");
        Ok(booking)
    }

    /// The booking was not on the room we locked: either it moved while we
    /// waited, or it is gone.
    fn missing_booking(&self, id: BookingId, locked: RoomId) -> EngineError {
        match self.room_for_booking(&id) {
            Some(room_id) if room_id != locked => EngineError::ConcurrentModification(locked),
            _ => EngineError::NotFound(Entity::Booking, id),
        }
    }

    /// Compact the WAL by rewriting it with only the events needed to recreate
    /// the current state. Writers are held off until the new file is in place.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _records = self.records_lock.lock().await;

        let mut events = Vec::new();
        events.extend(sorted_values(&self.hotels).map(|hotel| Event::HotelCreated { hotel }));
        events.extend(
            sorted_values(&self.room_types).map(|room_type| Event::RoomTypeCreated { room_type }),
        );
        events.extend(sorted_values(&self.clients).map(|client| Event::ClientCreated { client }));
        events.extend(
            sorted_values(&self.employees).map(|employee| Event::EmployeeCreated { employee }),
        );
        events.extend(
            sorted_values(&self.schedules)
                .map(|schedule| Event::CleaningScheduleCreated { schedule }),
        );

        let mut guards = Vec::with_capacity(self.rooms.len());
        for (room_id, rs) in self.room_snapshot() {
            let guard = self.read_shared(room_id, rs).await?;
            events.push(Event::RoomCreated {
                room: guard.room.clone(),
            });
            events.extend(guard.bookings.iter().map(|b| Event::BookingCreated {
                booking: b.clone(),
            }));
            guards.push(guard);
        }

        events.extend(
            sorted_values(&self.cleaning_logs).map(|log| Event::CleaningLogCreated { log }),
        );

        let count = events.len();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;
        drop(guards);
        tracing::info!(events = count, "WAL compacted");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
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
