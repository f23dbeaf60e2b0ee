mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;
mod reconcile;
mod records;

pub use conflict::{find_conflict, local_today};
pub use error::{EngineError, Entity};
pub use reconcile::{derived_status, pending_status};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, Mutex, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

use crate::model::*;
use crate::wal::Wal;

pub type SharedRoomState = Arc<RwLock<RoomState>>;

/// Source of "today" for reconciliation after mutations.
pub type Clock = fn() -> NaiveDate;

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    /// Events of one commit. They land in the same flush.
    Append {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Vec<Event>, oneshot::Sender<io::Result<()>>);

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Drain all immediately available Appends (the batch window).
/// 3. Commit the whole batch as one frame with a single fsync. A failed
///    batch is rolled back and every sender in it gets the error.
/// 4. Respond to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { events, response } => {
                let mut batch = vec![(events, response)];
                let mut deferred = None;

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { events, response }) => {
                            batch.push((events, response));
                        }
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }

                metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE)
                    .record(batch.len() as f64);
                let flush_start = std::time::Instant::now();
                let result = flush_batch(&mut wal, &batch);
                metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
                    .record(flush_start.elapsed().as_secs_f64());
                respond_batch(batch, &result);

                if let Some(other) = deferred {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: &[PendingAppend]) -> io::Result<()> {
    wal.commit(batch.iter().flat_map(|(events, _)| events))
}

fn respond_batch(batch: Vec<PendingAppend>, result: &io::Result<()>) {
    for (_, tx) in batch {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = wal.compact(&events);
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { events, response } => {
            let batch = vec![(events, response)];
            let result = flush_batch(wal, &batch);
            respond_batch(batch, &result);
        }
    }
}

/// In-memory record store with per-room locking, backed by the WAL.
pub struct Engine {
    pub(super) rooms: DashMap<RoomId, SharedRoomState>,
    /// Reverse lookup: booking id → room id.
    pub(super) booking_to_room: DashMap<BookingId, RoomId>,
    pub(super) hotels: DashMap<HotelId, Hotel>,
    pub(super) room_types: DashMap<RoomTypeId, RoomType>,
    pub(super) clients: DashMap<ClientId, Client>,
    pub(super) employees: DashMap<EmployeeId, Employee>,
    pub(super) schedules: DashMap<ScheduleId, CleaningSchedule>,
    pub(super) cleaning_logs: DashMap<CleaningLogId, CleaningLog>,
    /// Serializes creation of non-room records and rooms themselves.
    pub(super) records_lock: Mutex<()>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    lock_timeout: Duration,
    clock: Clock,
}

/// Apply a room-scoped event to one room's state (caller holds the lock).
pub(super) fn apply_to_room(rs: &mut RoomState, event: &Event) {
    match event {
        Event::RoomStatusChanged { status, .. } => {
            rs.room.status = *status;
        }
        Event::BookingCreated { booking } => {
            rs.insert_booking(booking.clone());
        }
        Event::BookingUpdated { booking, .. } => {
            rs.remove_booking(booking.id);
            if booking.room_id == rs.id() {
                rs.insert_booking(booking.clone());
            }
        }
        Event::BookingDeleted { id, .. } => {
            rs.remove_booking(*id);
        }
        // Record-level events never touch a room's state
        Event::HotelCreated { .. }
        | Event::RoomTypeCreated { .. }
        | Event::RoomCreated { .. }
        | Event::ClientCreated { .. }
        | Event::EmployeeCreated { .. }
        | Event::EmployeeStatusChanged { .. }
        | Event::CleaningScheduleCreated { .. }
        | Event::CleaningLogCreated { .. }
        | Event::CleaningLogStatusChanged { .. } => {}
    }
}

/// Rooms whose state an event changes.
fn event_room_ids(event: &Event) -> Vec<RoomId> {
    match event {
        Event::RoomStatusChanged { room_id, .. } | Event::BookingDeleted { room_id, .. } => {
            vec![*room_id]
        }
        Event::BookingCreated { booking } => vec![booking.room_id],
        Event::BookingUpdated {
            booking,
            previous_room_id,
        } => {
            if booking.room_id == *previous_room_id {
                vec![booking.room_id]
            } else {
                vec![*previous_room_id, booking.room_id]
            }
        }
        _ => Vec::new(),
    }
}

impl Engine {
    pub fn new(wal_path: PathBuf, lock_timeout: Duration) -> io::Result<Self> {
        let (wal, events) = Wal::recover(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            rooms: DashMap::new(),
            booking_to_room: DashMap::new(),
            hotels: DashMap::new(),
            room_types: DashMap::new(),
            clients: DashMap::new(),
            employees: DashMap::new(),
            schedules: DashMap::new(),
            cleaning_logs: DashMap::new(),
            records_lock: Mutex::new(()),
            wal_tx,
            lock_timeout,
            clock: local_today,
        };

        // We're the sole owner of these Arcs during replay, so try_write always
        // succeeds. Never use blocking_write here: this may run inside an async context.
        for event in &events {
            engine.apply_record(event);
            for room_id in event_room_ids(event) {
                if let Some(rs) = engine.room_state(&room_id)
                    && let Ok(mut guard) = rs.try_write()
                {
                    apply_to_room(&mut guard, event);
                }
            }
            engine.index_bookings(event);
        }

        tracing::debug!(
            events = events.len(),
            rooms = engine.rooms.len(),
            bookings = engine.booking_to_room.len(),
            "engine state replayed"
        );
        Ok(engine)
    }

    /// Replace the clock used to date post-mutation reconciliation.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn today(&self) -> NaiveDate {
        (self.clock)()
    }

    /// Apply a record-level event to the record maps.
    pub(super) fn apply_record(&self, event: &Event) {
        match event {
            Event::HotelCreated { hotel } => {
                self.hotels.insert(hotel.id, hotel.clone());
            }
            Event::RoomTypeCreated { room_type } => {
                self.room_types.insert(room_type.id, room_type.clone());
            }
            Event::RoomCreated { room } => {
                self.rooms
                    .insert(room.id, Arc::new(RwLock::new(RoomState::new(room.clone()))));
            }
            Event::ClientCreated { client } => {
                self.clients.insert(client.id, client.clone());
            }
            Event::EmployeeCreated { employee } => {
                self.employees.insert(employee.id, employee.clone());
            }
            Event::EmployeeStatusChanged { id, status } => {
                if let Some(mut employee) = self.employees.get_mut(id) {
                    employee.status = *status;
                }
            }
            Event::CleaningScheduleCreated { schedule } => {
                self.schedules.insert(schedule.id, schedule.clone());
            }
            Event::CleaningLogCreated { log } => {
                self.cleaning_logs.insert(log.id, log.clone());
            }
            Event::CleaningLogStatusChanged { id, status } => {
                if let Some(mut log) = self.cleaning_logs.get_mut(id) {
                    log.status = *status;
                }
            }
            // Room-scoped events are applied through apply_to_room
            Event::RoomStatusChanged { .. }
            | Event::BookingCreated { .. }
            | Event::BookingUpdated { .. }
            | Event::BookingDeleted { .. } => {}
        }
    }

    /// Keep the booking → room index in step with committed events.
    pub(super) fn index_bookings(&self, event: &Event) {
        match event {
            Event::BookingCreated { booking } | Event::BookingUpdated { booking, .. } => {
                self.booking_to_room.insert(booking.id, booking.room_id);
            }
            Event::BookingDeleted { id, .. } => {
                self.booking_to_room.remove(id);
            }
            _ => {}
        }
    }

    /// Write events to the WAL as one batch via the group-commit writer.
    pub(super) async fn wal_append_all(&self, events: &[Event]) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                events: events.to_vec(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn room_state(&self, id: &RoomId) -> Option<SharedRoomState> {
        self.rooms.get(id).map(|e| e.value().clone())
    }

    pub fn room_for_booking(&self, booking_id: &BookingId) -> Option<RoomId> {
        self.booking_to_room.get(booking_id).map(|e| *e.value())
    }

    /// All room ids in ascending order (the lock acquisition order).
    pub fn room_ids(&self) -> Vec<RoomId> {
        let mut ids: Vec<RoomId> = self.rooms.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }

    /// Rooms with their shared state, ascending by id. DashMap refs are
    /// released before the caller awaits any room lock.
    pub(super) fn room_snapshot(&self) -> Vec<(RoomId, SharedRoomState)> {
        let mut rooms: Vec<_> = self
            .rooms
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        rooms.sort_unstable_by_key(|(id, _)| *id);
        rooms
    }

    /// Acquire a room's write lock within the configured wait.
    pub(super) async fn lock_room(
        &self,
        room_id: RoomId,
    ) -> Result<OwnedRwLockWriteGuard<RoomState>, EngineError> {
        let rs = self
            .room_state(&room_id)
            .ok_or(EngineError::NotFound(Entity::Room, room_id))?;
        tokio::time::timeout(self.lock_timeout, rs.write_owned())
            .await
            .map_err(|_| lock_timed_out(room_id))
    }

    /// Acquire a room's read lock within the configured wait.
    pub(super) async fn read_room(
        &self,
        room_id: RoomId,
    ) -> Result<OwnedRwLockReadGuard<RoomState>, EngineError> {
        let rs = self
            .room_state(&room_id)
            .ok_or(EngineError::NotFound(Entity::Room, room_id))?;
        self.read_shared(room_id, rs).await
    }

    pub(super) async fn read_shared(
        &self,
        room_id: RoomId,
        rs: SharedRoomState,
    ) -> Result<OwnedRwLockReadGuard<RoomState>, EngineError> {
        tokio::time::timeout(self.lock_timeout, rs.read_owned())
            .await
            .map_err(|_| lock_timed_out(room_id))
    }

    /// Lock two rooms in ascending id order. Returns `(from, to)` guards;
    /// `to` is `None` when both ids name the same room.
    pub(super) async fn lock_room_pair(
        &self,
        from: RoomId,
        to: RoomId,
    ) -> Result<
        (
            OwnedRwLockWriteGuard<RoomState>,
            Option<OwnedRwLockWriteGuard<RoomState>>,
        ),
        EngineError,
    > {
        if from == to {
            return Ok((self.lock_room(from).await?, None));
        }
        if from < to {
            let first = self.lock_room(from).await?;
            let second = self.lock_room(to).await?;
            Ok((first, Some(second)))
        } else {
            let second = self.lock_room(to).await?;
            let first = self.lock_room(from).await?;
            Ok((first, Some(second)))
        }
    }
}

fn lock_timed_out(room_id: RoomId) -> EngineError {
    tracing::warn!(room_id, "room lock wait timed out");
    metrics::counter!(crate::observability::LOCK_TIMEOUTS_TOTAL).increment(1);
    EngineError::ConcurrentModification(room_id)
}
