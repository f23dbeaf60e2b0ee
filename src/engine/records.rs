use crate::limits::*;
use crate::model::*;

use super::{Engine, EngineError, Entity};

fn check_text(value: &str, max_len: usize, empty: &'static str, long: &'static str) -> Result<(), EngineError> {
    if value.trim().is_empty() {
        return Err(EngineError::InvalidInput(empty));
    }
    if value.len() > max_len {
        return Err(EngineError::LimitExceeded(long));
    }
    Ok(())
}

fn check_name(value: &str) -> Result<(), EngineError> {
    check_text(value, MAX_NAME_LEN, "name must not be empty", "name too long")
}

impl Engine {
    /// Persist a record event and apply it. Caller holds `records_lock`.
    async fn commit_record(&self, event: Event) -> Result<(), EngineError> {
        self.wal_append_all(std::slice::from_ref(&event)).await?;
        self.apply_record(&event);
        Ok(())
    }

    pub async fn create_hotel(&self, hotel: Hotel) -> Result<Hotel, EngineError> {
        check_name(&hotel.name)?;
        let _records = self.records_lock.lock().await;
        if self.hotels.len() >= MAX_HOTELS {
            return Err(EngineError::LimitExceeded("too many hotels"));
        }
        if self.hotels.contains_key(&hotel.id) {
            return Err(EngineError::AlreadyExists(Entity::Hotel, hotel.id));
        }
        if self.hotels.iter().any(|h| h.name == hotel.name) {
            return Err(EngineError::InvalidInput("hotel name already taken"));
        }
        self.commit_record(Event::HotelCreated {
            hotel: hotel.clone(),
        })
        .await?;
        tracing::info!(hotel_id = hotel.id, name = %hotel.name, "hotel created");
        Ok(hotel)
    }

    pub async fn create_room_type(&self, room_type: RoomType) -> Result<RoomType, EngineError> {
        check_name(&room_type.name)?;
        if room_type.capacity == 0 {
            return Err(EngineError::InvalidInput("room type capacity must be positive"));
        }
        if !room_type.price_per_night.is_finite() || room_type.price_per_night < 0.0 {
            return Err(EngineError::InvalidInput("price per night must be a non-negative number"));
        }
        let _records = self.records_lock.lock().await;
        if self.room_types.contains_key(&room_type.id) {
            return Err(EngineError::AlreadyExists(Entity::RoomType, room_type.id));
        }
        self.commit_record(Event::RoomTypeCreated {
            room_type: room_type.clone(),
        })
        .await?;
        Ok(room_type)
    }

    pub async fn create_client(&self, client: Client) -> Result<Client, EngineError> {
        check_name(&client.first_name)?;
        check_name(&client.last_name)?;
        check_text(
            &client.passport_number,
            MAX_PASSPORT_LEN,
            "passport number must not be empty",
            "passport number too long",
        )?;
        check_name(&client.city)?;
        let _records = self.records_lock.lock().await;
        if self.clients.contains_key(&client.id) {
            return Err(EngineError::AlreadyExists(Entity::Client, client.id));
        }
        self.commit_record(Event::ClientCreated {
            client: client.clone(),
        })
        .await?;
        Ok(client)
    }

    pub async fn create_employee(&self, employee: Employee) -> Result<Employee, EngineError> {
        check_name(&employee.first_name)?;
        check_name(&employee.last_name)?;
        let _records = self.records_lock.lock().await;
        if self.employees.contains_key(&employee.id) {
            return Err(EngineError::AlreadyExists(Entity::Employee, employee.id));
        }
        if !self.hotels.contains_key(&employee.hotel_id) {
            return Err(EngineError::NotFound(Entity::Hotel, employee.hotel_id));
        }
        self.commit_record(Event::EmployeeCreated {
            employee: employee.clone(),
        })
        .await?;
        Ok(employee)
    }

    pub async fn set_employee_status(
        &self,
        id: EmployeeId,
        status: EmployeeStatus,
    ) -> Result<Employee, EngineError> {
        let _records = self.records_lock.lock().await;
        let mut employee = self
            .employees
            .get(&id)
            .map(|e| e.value().clone())
            .ok_or(EngineError::NotFound(Entity::Employee, id))?;
        if employee.status != status {
            self.commit_record(Event::EmployeeStatusChanged { id, status })
                .await?;
            employee.status = status;
            tracing::info!(employee_id = id, %status, "employee status changed");
        }
        Ok(employee)
    }

    pub async fn create_cleaning_schedule(
        &self,
        schedule: CleaningSchedule,
    ) -> Result<CleaningSchedule, EngineError> {
        let _records = self.records_lock.lock().await;
        if self.schedules.contains_key(&schedule.id) {
            return Err(EngineError::AlreadyExists(
                Entity::CleaningSchedule,
                schedule.id,
            ));
        }
        if !self.employees.contains_key(&schedule.employee_id) {
            return Err(EngineError::NotFound(Entity::Employee, schedule.employee_id));
        }
        self.commit_record(Event::CleaningScheduleCreated {
            schedule: schedule.clone(),
        })
        .await?;
        Ok(schedule)
    }

    pub async fn create_cleaning_log(&self, log: CleaningLog) -> Result<CleaningLog, EngineError> {
        let _records = self.records_lock.lock().await;
        if self.cleaning_logs.contains_key(&log.id) {
            return Err(EngineError::AlreadyExists(Entity::CleaningLog, log.id));
        }
        if !self.rooms.contains_key(&log.room_id) {
            return Err(EngineError::NotFound(Entity::Room, log.room_id));
        }
        if !self.employees.contains_key(&log.employee_id) {
            return Err(EngineError::NotFound(Entity::Employee, log.employee_id));
        }
        self.commit_record(Event::CleaningLogCreated { log: log.clone() })
            .await?;
        Ok(log)
    }

    /// Update a cleaning log's status. The room's own status is not touched.
    pub async fn set_cleaning_log_status(
        &self,
        id: CleaningLogId,
        status: CleaningStatus,
    ) -> Result<CleaningLog, EngineError> {
        let _records = self.records_lock.lock().await;
        let mut log = self
            .cleaning_logs
            .get(&id)
            .map(|e| e.value().clone())
            .ok_or(EngineError::NotFound(Entity::CleaningLog, id))?;
        if log.status != status {
            self.commit_record(Event::CleaningLogStatusChanged { id, status })
                .await?;
            log.status = status;
        }
        Ok(log)
    }

    pub async fn complete_cleaning(&self, id: CleaningLogId) -> Result<CleaningLog, EngineError> {
        self.set_cleaning_log_status(id, CleaningStatus::Completed)
            .await
    }
}
