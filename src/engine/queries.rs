use chrono::{NaiveDate, Weekday};
use dashmap::DashMap;

use crate::model::*;

use super::{Engine, EngineError, Entity};

/// Clone a record map's values out, ascending by id.
pub(super) fn sorted_values<K, V>(map: &DashMap<K, V>) -> impl Iterator<Item = V> + use<K, V>
where
    K: Ord + Copy + std::hash::Hash + Eq,
    V: Clone,
{
    select(map, |_| true).into_iter()
}

/// Values matching `keep`, ascending by id.
fn select<K, V>(map: &DashMap<K, V>, keep: impl Fn(&V) -> bool) -> Vec<V>
where
    K: Ord + Copy + std::hash::Hash + Eq,
    V: Clone,
{
    let mut entries: Vec<(K, V)> = map
        .iter()
        .filter(|e| keep(e.value()))
        .map(|e| (*e.key(), e.value().clone()))
        .collect();
    entries.sort_unstable_by_key(|(k, _)| *k);
    entries.into_iter().map(|(_, v)| v).collect()
}

fn lookup<V: Clone>(map: &DashMap<i64, V>, entity: Entity, id: i64) -> Result<V, EngineError> {
    map.get(&id)
        .map(|e| e.value().clone())
        .ok_or(EngineError::NotFound(entity, id))
}

impl Engine {
    // ── Hotels and room types ─────────────────────────────

    pub fn get_hotel(&self, id: HotelId) -> Result<Hotel, EngineError> {
        lookup(&self.hotels, Entity::Hotel, id)
    }

    pub fn list_hotels(&self, page: Page) -> Vec<Hotel> {
        page.apply(select(&self.hotels, |_| true))
    }

    pub fn get_room_type(&self, id: RoomTypeId) -> Result<RoomType, EngineError> {
        lookup(&self.room_types, Entity::RoomType, id)
    }

    pub fn list_room_types(&self, page: Page) -> Vec<RoomType> {
        page.apply(select(&self.room_types, |_| true))
    }

    // ── Rooms ─────────────────────────────────────────────

    pub async fn get_room(&self, id: RoomId) -> Result<Room, EngineError> {
        Ok(self.read_room(id).await?.room.clone())
    }

    /// Rooms matching `keep`, ascending by id. Each room is read under its own lock.
    async fn rooms_where(&self, keep: impl Fn(&Room) -> bool) -> Result<Vec<Room>, EngineError> {
        let mut rooms = Vec::new();
        for (id, rs) in self.room_snapshot() {
            let guard = self.read_shared(id, rs).await?;
            if keep(&guard.room) {
                rooms.push(guard.room.clone());
            }
        }
        Ok(rooms)
    }

    pub async fn list_rooms(&self, page: Page) -> Result<Vec<Room>, EngineError> {
        Ok(page.apply(self.rooms_where(|_| true).await?))
    }

    pub async fn rooms_by_hotel(
        &self,
        hotel_id: HotelId,
        page: Page,
    ) -> Result<Vec<Room>, EngineError> {
        Ok(page.apply(self.rooms_where(|r| r.hotel_id == hotel_id).await?))
    }

    pub async fn rooms_by_type(
        &self,
        type_id: RoomTypeId,
        page: Page,
    ) -> Result<Vec<Room>, EngineError> {
        Ok(page.apply(self.rooms_where(|r| r.type_id == type_id).await?))
    }

    /// Room counts per status for one hotel.
    pub async fn hotel_occupancy(&self, hotel_id: HotelId) -> Result<OccupancyReport, EngineError> {
        if !self.hotels.contains_key(&hotel_id) {
            return Err(EngineError::NotFound(Entity::Hotel, hotel_id));
        }
        let mut report = OccupancyReport {
            hotel_id,
            ..Default::default()
        };
        for room in self.rooms_where(|r| r.hotel_id == hotel_id).await? {
            report.total += 1;
            match room.status {
                RoomStatus::Available => report.available += 1,
                RoomStatus::Occupied => report.occupied += 1,
                RoomStatus::Cleaning => report.cleaning += 1,
                RoomStatus::Maintenance => report.maintenance += 1,
            }
        }
        Ok(report)
    }

    // ── Clients ───────────────────────────────────────────

    pub fn get_client(&self, id: ClientId) -> Result<Client, EngineError> {
        lookup(&self.clients, Entity::Client, id)
    }

    pub fn list_clients(&self, page: Page) -> Vec<Client> {
        page.apply(select(&self.clients, |_| true))
    }

    pub fn clients_by_city(&self, city: &str, page: Page) -> Vec<Client> {
        page.apply(select(&self.clients, |c| c.city == city))
    }

    // ── Bookings ──────────────────────────────────────────

    pub async fn get_booking(&self, id: BookingId) -> Result<Booking, EngineError> {
        let room_id = self
            .room_for_booking(&id)
            .ok_or(EngineError::NotFound(Entity::Booking, id))?;
        self.read_room(room_id)
            .await?
            .booking(id)
            .cloned()
            .ok_or(EngineError::NotFound(Entity::Booking, id))
    }

    async fn bookings_where(
        &self,
        keep: impl Fn(&Booking) -> bool,
    ) -> Result<Vec<Booking>, EngineError> {
        let mut bookings = Vec::new();
        for (id, rs) in self.room_snapshot() {
            let guard = self.read_shared(id, rs).await?;
            bookings.extend(guard.bookings.iter().filter(|b| keep(b)).cloned());
        }
        bookings.sort_unstable_by_key(|b| b.id);
        Ok(bookings)
    }

    pub async fn list_bookings(&self, page: Page) -> Result<Vec<Booking>, EngineError> {
        Ok(page.apply(self.bookings_where(|_| true).await?))
    }

    pub async fn bookings_by_client(
        &self,
        client_id: ClientId,
        page: Page,
    ) -> Result<Vec<Booking>, EngineError> {
        Ok(page.apply(self.bookings_where(|b| b.client_id == client_id).await?))
    }

    pub async fn bookings_by_room(
        &self,
        room_id: RoomId,
        page: Page,
    ) -> Result<Vec<Booking>, EngineError> {
        let guard = self.read_room(room_id).await?;
        let mut bookings = guard.bookings.clone();
        drop(guard);
        bookings.sort_unstable_by_key(|b| b.id);
        Ok(page.apply(bookings))
    }

    // ── Employees ─────────────────────────────────────────

    pub fn get_employee(&self, id: EmployeeId) -> Result<Employee, EngineError> {
        lookup(&self.employees, Entity::Employee, id)
    }

    pub fn list_employees(&self, page: Page) -> Vec<Employee> {
        page.apply(select(&self.employees, |_| true))
    }

    pub fn employees_by_hotel(&self, hotel_id: HotelId, page: Page) -> Vec<Employee> {
        page.apply(select(&self.employees, |e| e.hotel_id == hotel_id))
    }

    pub fn active_employees(&self, page: Page) -> Vec<Employee> {
        page.apply(select(&self.employees, |e| {
            e.status == EmployeeStatus::Active
        }))
    }

    // ── Cleaning ──────────────────────────────────────────

    pub fn get_cleaning_schedule(&self, id: ScheduleId) -> Result<CleaningSchedule, EngineError> {
        lookup(&self.schedules, Entity::CleaningSchedule, id)
    }

    pub fn list_cleaning_schedules(&self, page: Page) -> Vec<CleaningSchedule> {
        page.apply(select(&self.schedules, |_| true))
    }

    pub fn schedules_by_employee(&self, employee_id: EmployeeId, page: Page) -> Vec<CleaningSchedule> {
        page.apply(select(&self.schedules, |s| s.employee_id == employee_id))
    }

    pub fn schedules_by_day(&self, day: Weekday, page: Page) -> Vec<CleaningSchedule> {
        page.apply(select(&self.schedules, |s| s.day_of_week == day))
    }

    pub fn get_cleaning_log(&self, id: CleaningLogId) -> Result<CleaningLog, EngineError> {
        lookup(&self.cleaning_logs, Entity::CleaningLog, id)
    }

    pub fn list_cleaning_logs(&self, page: Page) -> Vec<CleaningLog> {
        page.apply(select(&self.cleaning_logs, |_| true))
    }

    pub fn logs_by_employee(&self, employee_id: EmployeeId, page: Page) -> Vec<CleaningLog> {
        page.apply(select(&self.cleaning_logs, |l| l.employee_id == employee_id))
    }

    pub fn logs_by_room(&self, room_id: RoomId, page: Page) -> Vec<CleaningLog> {
        page.apply(select(&self.cleaning_logs, |l| l.room_id == room_id))
    }

    /// Logs for one day, optionally restricted to rooms on `floor`.
    pub async fn logs_by_date(
        &self,
        date: NaiveDate,
        floor: Option<i32>,
        page: Page,
    ) -> Result<Vec<CleaningLog>, EngineError> {
        let logs = select(&self.cleaning_logs, |l| l.cleaning_date == date);
        let Some(floor) = floor else {
            return Ok(page.apply(logs));
        };
        let mut on_floor = Vec::with_capacity(logs.len());
        for log in logs {
            if self.read_room(log.room_id).await?.room.floor == floor {
                on_floor.push(log);
            }
        }
        Ok(page.apply(on_floor))
    }
}
