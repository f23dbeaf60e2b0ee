use std::fmt::Debug;
use std::io;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Weekday;
use futures::stream;
use futures::Sink;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldFormat, FieldInfo,
    QueryResponse, Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::data::DataRow;
use pgwire::messages::PgWireBackendMessage;
use pgwire::tokio::TlsAcceptor;
use tokio::net::TcpStream;

use crate::auth::InnControlAuthSource;
use crate::engine::{Engine, EngineError};
use crate::model::*;
use crate::observability;
use crate::sql::{self, *};

pub struct InnControlHandler {
    engine: Arc<Engine>,
    query_parser: Arc<InnControlQueryParser>,
}

impl InnControlHandler {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            query_parser: Arc::new(InnControlQueryParser),
        }
    }

    fn parse(&self, query: &str) -> PgWireResult<Vec<Command>> {
        sql::parse_batch(query).map_err(|e| {
            metrics::counter!(observability::QUERIES_TOTAL, "command" => "parse", "status" => "error")
                .increment(1);
            sql_err(e)
        })
    }

    /// Run one command, recording its latency and outcome.
    async fn run(&self, cmd: Command) -> PgWireResult<Response> {
        let label = observability::command_label(&cmd);
        let started = Instant::now();
        let result = self.execute_command(cmd).await;
        metrics::histogram!(observability::QUERY_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(observability::QUERIES_TOTAL, "command" => label, "status" => status)
            .increment(1);
        result
    }

    async fn execute_command(&self, cmd: Command) -> PgWireResult<Response> {
        let engine = &self.engine;
        match cmd {
            Command::InsertHotel(hotel) => {
                engine.create_hotel(hotel).await.map_err(engine_err)?;
                Ok(inserted())
            }
            Command::InsertRoomType(room_type) => {
                engine.create_room_type(room_type).await.map_err(engine_err)?;
                Ok(inserted())
            }
            Command::InsertRoom(room) => {
                engine.create_room(room).await.map_err(engine_err)?;
                Ok(inserted())
            }
            Command::InsertClient(client) => {
                engine.create_client(client).await.map_err(engine_err)?;
                Ok(inserted())
            }
            Command::InsertBooking(booking) => {
                engine.create_booking(booking).await.map_err(engine_err)?;
                Ok(inserted())
            }
            Command::InsertEmployee(employee) => {
                engine.create_employee(employee).await.map_err(engine_err)?;
                Ok(inserted())
            }
            Command::InsertCleaningSchedule(schedule) => {
                engine
                    .create_cleaning_schedule(schedule)
                    .await
                    .map_err(engine_err)?;
                Ok(inserted())
            }
            Command::InsertCleaningLog(log) => {
                engine.create_cleaning_log(log).await.map_err(engine_err)?;
                Ok(inserted())
            }
            Command::UpdateRoomStatus { id, status } => {
                engine.set_room_status(id, status).await.map_err(engine_err)?;
                Ok(updated())
            }
            Command::UpdateBooking { id, patch } => {
                engine.update_booking(id, patch).await.map_err(engine_err)?;
                Ok(updated())
            }
            Command::UpdateEmployeeStatus { id, status } => {
                engine
                    .set_employee_status(id, status)
                    .await
                    .map_err(engine_err)?;
                Ok(updated())
            }
            Command::UpdateCleaningLogStatus { id, status } => {
                engine
                    .set_cleaning_log_status(id, status)
                    .await
                    .map_err(engine_err)?;
                Ok(updated())
            }
            Command::DeleteBooking { id } => {
                engine.delete_booking(id).await.map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("DELETE").with_rows(1)))
            }
            Command::SelectHotels { id, page } => {
                let hotels = match id {
                    Some(id) => vec![engine.get_hotel(id).map_err(engine_err)?],
                    None => engine.list_hotels(page),
                };
                query_rows(Relation::Hotels, hotels, encode_hotel)
            }
            Command::SelectRoomTypes { id, page } => {
                let types = match id {
                    Some(id) => vec![engine.get_room_type(id).map_err(engine_err)?],
                    None => engine.list_room_types(page),
                };
                query_rows(Relation::RoomTypes, types, encode_room_type)
            }
            Command::SelectRooms { filter, page } => {
                let rooms = match filter {
                    RoomFilter::All => engine.list_rooms(page).await,
                    RoomFilter::Id(id) => engine.get_room(id).await.map(|r| vec![r]),
                    RoomFilter::Hotel(hotel_id) => engine.rooms_by_hotel(hotel_id, page).await,
                    RoomFilter::Type(type_id) => engine.rooms_by_type(type_id, page).await,
                }
                .map_err(engine_err)?;
                query_rows(Relation::Rooms, rooms, encode_room)
            }
            Command::SelectClients { filter, page } => {
                let clients = match filter {
                    ClientFilter::All => engine.list_clients(page),
                    ClientFilter::Id(id) => vec![engine.get_client(id).map_err(engine_err)?],
                    ClientFilter::City(city) => engine.clients_by_city(&city, page),
                };
                query_rows(Relation::Clients, clients, encode_client)
            }
            Command::SelectBookings { filter, page } => {
                let bookings = match filter {
                    BookingFilter::All => engine.list_bookings(page).await,
                    BookingFilter::Id(id) => engine.get_booking(id).await.map(|b| vec![b]),
                    BookingFilter::Client(client_id) => {
                        engine.bookings_by_client(client_id, page).await
                    }
                    BookingFilter::Room(room_id) => engine.bookings_by_room(room_id, page).await,
                }
                .map_err(engine_err)?;
                query_rows(Relation::Bookings, bookings, encode_booking)
            }
            Command::SelectEmployees { filter, page } => {
                let employees = match filter {
                    EmployeeFilter::All => engine.list_employees(page),
                    EmployeeFilter::Id(id) => vec![engine.get_employee(id).map_err(engine_err)?],
                    EmployeeFilter::Hotel(hotel_id) => engine.employees_by_hotel(hotel_id, page),
                    EmployeeFilter::Active => engine.active_employees(page),
                };
                query_rows(Relation::Employees, employees, encode_employee)
            }
            Command::SelectCleaningSchedules { filter, page } => {
                let schedules = match filter {
                    ScheduleFilter::All => engine.list_cleaning_schedules(page),
                    ScheduleFilter::Id(id) => {
                        vec![engine.get_cleaning_schedule(id).map_err(engine_err)?]
                    }
                    ScheduleFilter::Employee(employee_id) => {
                        engine.schedules_by_employee(employee_id, page)
                    }
                    ScheduleFilter::Day(day) => engine.schedules_by_day(day, page),
                };
                query_rows(Relation::CleaningSchedules, schedules, encode_schedule)
            }
            Command::SelectCleaningLogs { filter, page } => {
                let logs = match filter {
                    LogFilter::All => engine.list_cleaning_logs(page),
                    LogFilter::Id(id) => vec![engine.get_cleaning_log(id).map_err(engine_err)?],
                    LogFilter::Employee(employee_id) => engine.logs_by_employee(employee_id, page),
                    LogFilter::Room(room_id) => engine.logs_by_room(room_id, page),
                    LogFilter::Date { date, floor } => engine
                        .logs_by_date(date, floor, page)
                        .await
                        .map_err(engine_err)?,
                };
                query_rows(Relation::CleaningLogs, logs, encode_log)
            }
            Command::SelectAvailableRooms { stay, hotel_id } => {
                let rooms = match hotel_id {
                    Some(hotel_id) => engine.find_available_rooms_in_hotel(hotel_id, stay).await,
                    None => engine.find_available_rooms(stay).await,
                }
                .map_err(engine_err)?;
                query_rows(Relation::AvailableRooms, rooms, |enc, id| {
                    enc.encode_field(id)
                })
            }
            Command::SelectRoomAvailability {
                room_id,
                stay,
                exclude,
            } => {
                let availability = engine
                    .check_availability(room_id, stay, exclude)
                    .await
                    .map_err(engine_err)?;
                let conflicting = match availability {
                    Availability::Conflict(booking_id) => Some(booking_id),
                    Availability::NoConflict => None,
                };
                query_rows(
                    Relation::RoomAvailability,
                    vec![(room_id, availability.is_available(), conflicting)],
                    |enc, (room_id, available, conflicting)| {
                        enc.encode_field(room_id)?;
                        enc.encode_field(available)?;
                        enc.encode_field(conflicting)
                    },
                )
            }
            Command::Reconcile { room_id, today } => {
                let today = today.unwrap_or_else(|| engine.today());
                match room_id {
                    Some(room_id) => {
                        let reconciled = engine
                            .reconcile_room(room_id, today)
                            .await
                            .map_err(engine_err)?;
                        query_rows(Relation::ReconcileRoom, vec![reconciled], |enc, r| {
                            enc.encode_field(&r.room_id)?;
                            enc.encode_field(&r.status.to_string())?;
                            enc.encode_field(&r.updated)
                        })
                    }
                    None => {
                        let count = engine.reconcile_all(today).await.map_err(engine_err)?;
                        query_rows(Relation::ReconcileAll, vec![count as i64], |enc, n| {
                            enc.encode_field(n)
                        })
                    }
                }
            }
            Command::SelectOccupancy { hotel_id } => {
                let report = engine.hotel_occupancy(hotel_id).await.map_err(engine_err)?;
                query_rows(Relation::Occupancy, vec![report], encode_occupancy)
            }
        }
    }
}

fn inserted() -> Response {
    Response::Execution(Tag::new("INSERT").with_rows(1))
}

fn updated() -> Response {
    Response::Execution(Tag::new("UPDATE").with_rows(1))
}

fn query_rows<T>(
    relation: Relation,
    items: Vec<T>,
    encode: impl Fn(&mut DataRowEncoder, &T) -> PgWireResult<()>,
) -> PgWireResult<Response> {
    let schema = Arc::new(schema(relation));
    let rows: Vec<PgWireResult<DataRow>> = items
        .iter()
        .map(|item| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encode(&mut encoder, item)?;
            Ok(encoder.take_row())
        })
        .collect();
    Ok(Response::Query(QueryResponse::new(
        schema,
        stream::iter(rows),
    )))
}

// ── Row encoding ─────────────────────────────────────────────────

fn encode_hotel(enc: &mut DataRowEncoder, h: &Hotel) -> PgWireResult<()> {
    enc.encode_field(&h.id)?;
    enc.encode_field(&h.name)?;
    enc.encode_field(&i64::from(h.total_rooms))
}

fn encode_room_type(enc: &mut DataRowEncoder, t: &RoomType) -> PgWireResult<()> {
    enc.encode_field(&t.id)?;
    enc.encode_field(&t.name)?;
    enc.encode_field(&i64::from(t.capacity))?;
    enc.encode_field(&t.price_per_night)
}

fn encode_room(enc: &mut DataRowEncoder, r: &Room) -> PgWireResult<()> {
    enc.encode_field(&r.id)?;
    enc.encode_field(&r.hotel_id)?;
    enc.encode_field(&r.type_id)?;
    enc.encode_field(&r.floor)?;
    enc.encode_field(&r.room_number)?;
    enc.encode_field(&r.status.to_string())
}

fn encode_client(enc: &mut DataRowEncoder, c: &Client) -> PgWireResult<()> {
    enc.encode_field(&c.id)?;
    enc.encode_field(&c.first_name)?;
    enc.encode_field(&c.last_name)?;
    enc.encode_field(&c.passport_number)?;
    enc.encode_field(&c.city)
}

fn encode_booking(enc: &mut DataRowEncoder, b: &Booking) -> PgWireResult<()> {
    enc.encode_field(&b.id)?;
    enc.encode_field(&b.room_id)?;
    enc.encode_field(&b.client_id)?;
    enc.encode_field(&b.stay.check_in.to_string())?;
    enc.encode_field(&b.stay.check_out.to_string())?;
    enc.encode_field(&b.status.to_string())
}

fn encode_employee(enc: &mut DataRowEncoder, e: &Employee) -> PgWireResult<()> {
    enc.encode_field(&e.id)?;
    enc.encode_field(&e.hotel_id)?;
    enc.encode_field(&e.first_name)?;
    enc.encode_field(&e.last_name)?;
    enc.encode_field(&e.status.to_string())
}

fn encode_schedule(enc: &mut DataRowEncoder, s: &CleaningSchedule) -> PgWireResult<()> {
    enc.encode_field(&s.id)?;
    enc.encode_field(&s.employee_id)?;
    enc.encode_field(&s.floor)?;
    enc.encode_field(&weekday_label(s.day_of_week).to_string())
}

fn encode_log(enc: &mut DataRowEncoder, l: &CleaningLog) -> PgWireResult<()> {
    enc.encode_field(&l.id)?;
    enc.encode_field(&l.room_id)?;
    enc.encode_field(&l.employee_id)?;
    enc.encode_field(&l.cleaning_date.to_string())?;
    enc.encode_field(&l.status.to_string())
}

fn encode_occupancy(enc: &mut DataRowEncoder, o: &OccupancyReport) -> PgWireResult<()> {
    enc.encode_field(&o.hotel_id)?;
    enc.encode_field(&(o.total as i64))?;
    enc.encode_field(&(o.available as i64))?;
    enc.encode_field(&(o.occupied as i64))?;
    enc.encode_field(&(o.cleaning as i64))?;
    enc.encode_field(&(o.maintenance as i64))?;
    enc.encode_field(&o.occupancy_rate())
}

fn weekday_label(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

// ── Schemas ──────────────────────────────────────────────────────

fn field(name: &str, ty: Type) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, ty, FieldFormat::Text)
}

/// Column layout per relation. Dates and statuses travel as text.
fn schema(relation: Relation) -> Vec<FieldInfo> {
    match relation {
        Relation::Hotels => vec![
            field("id", Type::INT8),
            field("name", Type::VARCHAR),
            field("total_rooms", Type::INT8),
        ],
        Relation::RoomTypes => vec![
            field("id", Type::INT8),
            field("name", Type::VARCHAR),
            field("capacity", Type::INT8),
            field("price_per_night", Type::FLOAT8),
        ],
        Relation::Rooms => vec![
            field("id", Type::INT8),
            field("hotel_id", Type::INT8),
            field("type_id", Type::INT8),
            field("floor", Type::INT4),
            field("room_number", Type::VARCHAR),
            field("status", Type::VARCHAR),
        ],
        Relation::Clients => vec![
            field("id", Type::INT8),
            field("first_name", Type::VARCHAR),
            field("last_name", Type::VARCHAR),
            field("passport_number", Type::VARCHAR),
            field("city", Type::VARCHAR),
        ],
        Relation::Bookings => vec![
            field("id", Type::INT8),
            field("room_id", Type::INT8),
            field("client_id", Type::INT8),
            field("check_in_date", Type::VARCHAR),
            field("check_out_date", Type::VARCHAR),
            field("status", Type::VARCHAR),
        ],
        Relation::Employees => vec![
            field("id", Type::INT8),
            field("hotel_id", Type::INT8),
            field("first_name", Type::VARCHAR),
            field("last_name", Type::VARCHAR),
            field("status", Type::VARCHAR),
        ],
        Relation::CleaningSchedules => vec![
            field("id", Type::INT8),
            field("employee_id", Type::INT8),
            field("floor", Type::INT4),
            field("day_of_week", Type::VARCHAR),
        ],
        Relation::CleaningLogs => vec![
            field("id", Type::INT8),
            field("room_id", Type::INT8),
            field("employee_id", Type::INT8),
            field("cleaning_date", Type::VARCHAR),
            field("status", Type::VARCHAR),
        ],
        Relation::AvailableRooms => vec![field("room_id", Type::INT8)],
        Relation::RoomAvailability => vec![
            field("room_id", Type::INT8),
            field("available", Type::BOOL),
            field("conflicting_booking_id", Type::INT8),
        ],
        Relation::ReconcileRoom => vec![
            field("room_id", Type::INT8),
            field("status", Type::VARCHAR),
            field("updated", Type::BOOL),
        ],
        Relation::ReconcileAll => vec![field("updated", Type::INT8)],
        Relation::Occupancy => vec![
            field("hotel_id", Type::INT8),
            field("total", Type::INT8),
            field("available", Type::INT8),
            field("occupied", Type::INT8),
            field("cleaning", Type::INT8),
            field("maintenance", Type::INT8),
            field("occupancy_rate", Type::FLOAT8),
        ],
    }
}

fn describe_schema(stmt: &str) -> Vec<FieldInfo> {
    sql::describe(stmt).map(schema).unwrap_or_default()
}

#[async_trait]
impl SimpleQueryHandler for InnControlHandler {
    async fn do_query<C>(
        &self,
        _client: &mut C,
        query: &str,
    ) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        // Statements before a failing one stay committed.
        let mut responses = Vec::new();
        for cmd in self.parse(query)? {
            responses.push(self.run(cmd).await?);
        }
        Ok(responses)
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct InnControlQueryParser;

#[async_trait]
impl QueryParser for InnControlQueryParser {
    type Statement = String;

    async fn parse_sql<C>(
        &self,
        _client: &C,
        sql: &str,
        _types: &[Option<Type>],
    ) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(
        &self,
        stmt: &String,
        _column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        Ok(describe_schema(stmt))
    }
}

#[async_trait]
impl ExtendedQueryHandler for InnControlHandler {
    type Statement = String;
    type QueryParser = InnControlQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        _client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let sql = substitute_params(portal);
        let cmd = sql::parse_sql(&sql).map_err(sql_err)?;
        self.run(cmd).await
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        Ok(DescribeStatementResponse::new(
            param_types,
            describe_schema(&target.statement),
        ))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(DescribePortalResponse::new(describe_schema(
            &target.statement.statement,
        )))
    }
}

/// Count the highest $N parameter placeholder in the SQL string.
fn count_params(sql: &str) -> usize {
    let mut max = 0usize;
    let bytes = sql.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' {
            i += 1;
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if i > start
                && let Ok(n) = sql[start..i].parse::<usize>()
            {
                max = max.max(n);
            }
        } else {
            i += 1;
        }
    }
    max
}

/// Substitute $1, $2, ... placeholders with bound parameter values (text format).
/// Higher numbers go first so `$1` never clobbers the prefix of `$10`.
fn substitute_params(portal: &Portal<String>) -> String {
    let params: Vec<Option<String>> = portal
        .parameters
        .iter()
        .map(|p| p.as_ref().map(|bytes| String::from_utf8_lossy(bytes).into_owned()))
        .collect();
    bind_params(&portal.statement.statement, &params)
}

fn bind_params(sql: &str, params: &[Option<String>]) -> String {
    let mut result = sql.to_string();
    for (i, param) in params.iter().enumerate().rev() {
        let placeholder = format!("${}", i + 1);
        let value = match param {
            Some(text) => format!("'{}'", text.replace('\'', "''")),
            None => "NULL".to_string(),
        };
        result = result.replace(&placeholder, &value);
    }
    result
}

// ── Factory ──────────────────────────────────────────────────────

pub struct InnControlFactory {
    handler: Arc<InnControlHandler>,
    auth_handler: Arc<
        CleartextPasswordAuthStartupHandler<InnControlAuthSource, DefaultServerParameterProvider>,
    >,
    noop: Arc<NoopHandler>,
}

impl InnControlFactory {
    pub fn new(engine: Arc<Engine>, password: String) -> Self {
        let auth_source = InnControlAuthSource::new(password);
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(InnControlHandler::new(engine)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                auth_source,
                param_provider,
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for InnControlFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.auth_handler.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// Serve one client connection until it closes.
pub async fn process_connection(
    socket: TcpStream,
    factory: Arc<InnControlFactory>,
    tls: Option<TlsAcceptor>,
) -> io::Result<()> {
    pgwire::tokio::process_socket(socket, tls, factory).await
}

// ── Errors ───────────────────────────────────────────────────────

fn engine_sqlstate(e: &EngineError) -> &'static str {
    match e {
        EngineError::InvalidInterval { .. } | EngineError::InvalidInput(_) => "22023",
        EngineError::Conflict { .. } => "23P01",
        EngineError::NotFound(..) => "P0002",
        EngineError::AlreadyExists(..) => "23505",
        EngineError::ConcurrentModification(_) => "40001",
        EngineError::LimitExceeded(_) => "54000",
        EngineError::WalError(_) => "58030",
    }
}

fn engine_err(e: EngineError) -> PgWireError {
    if let EngineError::WalError(msg) = &e {
        tracing::error!(error = %msg, "WAL write failed");
    }
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        engine_sqlstate(&e).into(),
        e.to_string(),
    )))
}

fn sql_err(e: SqlError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        e.sqlstate().into(),
        e.to_string(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Entity;

    #[test]
    fn count_params_takes_highest() {
        assert_eq!(count_params("SELECT * FROM rooms"), 0);
        assert_eq!(
            count_params("SELECT * FROM available_rooms WHERE check_in_date = $1 AND check_out_date = $2"),
            2
        );
        assert_eq!(count_params("UPDATE bookings SET room_id = $10 WHERE id = $3"), 10);
    }

    #[test]
    fn bind_params_quotes_and_nulls() {
        let params: Vec<Option<String>> = (1..=10)
            .map(|n| if n == 2 { None } else { Some(n.to_string()) })
            .collect();
        let sql = bind_params("SELECT $1, $2, $10", &params);
        assert_eq!(sql, "SELECT '1', NULL, '10'");

        let sql = bind_params(
            "SELECT * FROM clients WHERE city = $1",
            &[Some("Saint-Jean-d'Angély".into())],
        );
        assert_eq!(sql, "SELECT * FROM clients WHERE city = 'Saint-Jean-d''Angély'");
    }

    #[test]
    fn bound_statement_parses() {
        let sql = bind_params(
            "INSERT INTO bookings (id, room_id, client_id, check_in_date, check_out_date) VALUES ($1, $2, $3, $4, $5)",
            &[
                Some("1".into()),
                Some("10".into()),
                Some("5".into()),
                Some("2024-06-01".into()),
                Some("2024-06-05".into()),
            ],
        );
        assert!(matches!(
            sql::parse_sql(&sql),
            Ok(Command::InsertBooking(Booking { id: 1, room_id: 10, .. }))
        ));
    }

    #[test]
    fn engine_errors_map_to_sqlstates() {
        let cases = [
            (
                EngineError::Conflict {
                    room_id: 1,
                    booking_id: 2,
                },
                "23P01",
            ),
            (EngineError::NotFound(Entity::Room, 1), "P0002"),
            (EngineError::AlreadyExists(Entity::Booking, 1), "23505"),
            (EngineError::ConcurrentModification(1), "40001"),
            (EngineError::InvalidInput("x"), "22023"),
            (EngineError::LimitExceeded("x"), "54000"),
            (EngineError::WalError("disk".into()), "58030"),
        ];
        for (err, code) in cases {
            assert_eq!(engine_sqlstate(&err), code, "{err}");
        }
    }

    #[test]
    fn schemas_match_relations() {
        assert_eq!(describe_schema("SELECT * FROM rooms WHERE hotel_id = $1").len(), 6);
        assert_eq!(describe_schema("SELECT * FROM occupancy WHERE hotel_id = $1").len(), 7);
        assert_eq!(describe_schema("SELECT * FROM reconcile").len(), 1);
        assert!(describe_schema("DELETE FROM bookings WHERE id = $1").is_empty());
    }
}
