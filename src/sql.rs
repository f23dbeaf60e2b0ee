use std::str::FromStr;

use chrono::{NaiveDate, Weekday};
use sqlparser::ast::{
    self, AssignmentTarget, Expr, FromTable, LimitClause, ObjectNamePart, SetExpr, Statement,
    TableFactor, TableObject, Value, ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;

use crate::limits::DEFAULT_PAGE_SIZE;
use crate::model::*;

/// Parsed command from SQL input.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    InsertHotel(Hotel),
    InsertRoomType(RoomType),
    InsertRoom(Room),
    InsertClient(Client),
    InsertBooking(Booking),
    InsertEmployee(Employee),
    InsertCleaningSchedule(CleaningSchedule),
    InsertCleaningLog(CleaningLog),
    UpdateRoomStatus {
        id: RoomId,
        status: RoomStatus,
    },
    UpdateBooking {
        id: BookingId,
        patch: BookingPatch,
    },
    UpdateEmployeeStatus {
        id: EmployeeId,
        status: EmployeeStatus,
    },
    UpdateCleaningLogStatus {
        id: CleaningLogId,
        status: CleaningStatus,
    },
    DeleteBooking {
        id: BookingId,
    },
    SelectHotels {
        id: Option<HotelId>,
        page: Page,
    },
    SelectRoomTypes {
        id: Option<RoomTypeId>,
        page: Page,
    },
    SelectRooms {
        filter: RoomFilter,
        page: Page,
    },
    SelectClients {
        filter: ClientFilter,
        page: Page,
    },
    SelectBookings {
        filter: BookingFilter,
        page: Page,
    },
    SelectEmployees {
        filter: EmployeeFilter,
        page: Page,
    },
    SelectCleaningSchedules {
        filter: ScheduleFilter,
        page: Page,
    },
    SelectCleaningLogs {
        filter: LogFilter,
        page: Page,
    },
    SelectAvailableRooms {
        stay: StayInterval,
        hotel_id: Option<HotelId>,
    },
    SelectRoomAvailability {
        room_id: RoomId,
        stay: StayInterval,
        exclude: Option<BookingId>,
    },
    /// Reconcile one room, or every room when `room_id` is absent.
    Reconcile {
        room_id: Option<RoomId>,
        today: Option<NaiveDate>,
    },
    SelectOccupancy {
        hotel_id: HotelId,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomFilter {
    All,
    Id(RoomId),
    Hotel(HotelId),
    Type(RoomTypeId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFilter {
    All,
    Id(ClientId),
    City(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingFilter {
    All,
    Id(BookingId),
    Client(ClientId),
    Room(RoomId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmployeeFilter {
    All,
    Id(EmployeeId),
    Hotel(HotelId),
    Active,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleFilter {
    All,
    Id(ScheduleId),
    Employee(EmployeeId),
    Day(Weekday),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFilter {
    All,
    Id(CleaningLogId),
    Employee(EmployeeId),
    Room(RoomId),
    Date { date: NaiveDate, floor: Option<i32> },
}

/// Row shape a SELECT produces, known before parameters are bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Hotels,
    RoomTypes,
    Rooms,
    Clients,
    Bookings,
    Employees,
    CleaningSchedules,
    CleaningLogs,
    AvailableRooms,
    RoomAvailability,
    ReconcileRoom,
    ReconcileAll,
    Occupancy,
}

impl Relation {
    fn from_table(table: &str, has_room_filter: bool) -> Option<Self> {
        Some(match table {
            "hotels" => Relation::Hotels,
            "room_types" => Relation::RoomTypes,
            "rooms" => Relation::Rooms,
            "clients" => Relation::Clients,
            "bookings" => Relation::Bookings,
            "employees" => Relation::Employees,
            "cleaning_schedules" => Relation::CleaningSchedules,
            "cleaning_logs" => Relation::CleaningLogs,
            "available_rooms" => Relation::AvailableRooms,
            "room_availability" => Relation::RoomAvailability,
            "reconcile" if has_room_filter => Relation::ReconcileRoom,
            "reconcile" => Relation::ReconcileAll,
            "occupancy" => Relation::Occupancy,
            _ => return None,
        })
    }
}

impl Command {
    /// Rows this command returns, if it is a query.
    pub fn relation(&self) -> Option<Relation> {
        Some(match self {
            Command::SelectHotels { .. } => Relation::Hotels,
            Command::SelectRoomTypes { .. } => Relation::RoomTypes,
            Command::SelectRooms { .. } => Relation::Rooms,
            Command::SelectClients { .. } => Relation::Clients,
            Command::SelectBookings { .. } => Relation::Bookings,
            Command::SelectEmployees { .. } => Relation::Employees,
            Command::SelectCleaningSchedules { .. } => Relation::CleaningSchedules,
            Command::SelectCleaningLogs { .. } => Relation::CleaningLogs,
            Command::SelectAvailableRooms { .. } => Relation::AvailableRooms,
            Command::SelectRoomAvailability { .. } => Relation::RoomAvailability,
            Command::Reconcile { room_id: Some(_), .. } => Relation::ReconcileRoom,
            Command::Reconcile { room_id: None, .. } => Relation::ReconcileAll,
            Command::SelectOccupancy { .. } => Relation::Occupancy,
            _ => return None,
        })
    }
}

fn parse_statements(sql: &str) -> Result<Vec<Statement>, SqlError> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    if stmts.is_empty() {
        return Err(SqlError::Empty);
    }
    Ok(stmts)
}

/// Parse the first statement of `sql`.
pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    parse_statement(&parse_statements(sql)?[0])
}

/// Parse every statement of a simple-query string, in order.
pub fn parse_batch(sql: &str) -> Result<Vec<Command>, SqlError> {
    parse_statements(sql)?.iter().map(parse_statement).collect()
}

fn parse_statement(stmt: &Statement) -> Result<Command, SqlError> {
    match stmt {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Update {
            table,
            assignments,
            selection,
            ..
        } => parse_update(&table.relation, assignments, selection.as_ref()),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

/// Result shape of a statement with unbound `$n` parameters. `None` for
/// anything that does not return rows.
pub fn describe(sql: &str) -> Option<Relation> {
    let stmts = parse_statements(sql).ok()?;
    let Statement::Query(query) = &stmts[0] else {
        return None;
    };
    let SetExpr::Select(select) = query.body.as_ref() else {
        return None;
    };
    let table = table_factor_name(&select.from.first()?.relation).ok()?;
    let filters = Filters::collect(select.selection.as_ref()).ok()?;
    Relation::from_table(&table, filters.has("room_id"))
}

// ── INSERT ────────────────────────────────────────────────────

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    match table.as_str() {
        "hotels" => {
            let row = Row::from_insert(insert, "hotels", &["id", "name", "total_rooms"])?;
            Ok(Command::InsertHotel(Hotel {
                id: row.int("id")?,
                name: row.text("name")?,
                total_rooms: row.uint("total_rooms")?,
            }))
        }
        "room_types" => {
            let row = Row::from_insert(
                insert,
                "room_types",
                &["id", "name", "capacity", "price_per_night"],
            )?;
            Ok(Command::InsertRoomType(RoomType {
                id: row.int("id")?,
                name: row.text("name")?,
                capacity: row.uint("capacity")?,
                price_per_night: parse_f64(row.require("price_per_night")?)?,
            }))
        }
        "rooms" => {
            let row = Row::from_insert(
                insert,
                "rooms",
                &["id", "hotel_id", "type_id", "floor", "room_number", "status"],
            )?;
            Ok(Command::InsertRoom(Room {
                id: row.int("id")?,
                hotel_id: row.int("hotel_id")?,
                type_id: row.int("type_id")?,
                floor: row.floor("floor")?,
                room_number: row.text("room_number")?,
                status: row.label_or_default("status")?,
            }))
        }
        "clients" => {
            let row = Row::from_insert(
                insert,
                "clients",
                &["id", "first_name", "last_name", "passport_number", "city"],
            )?;
            Ok(Command::InsertClient(Client {
                id: row.int("id")?,
                first_name: row.text("first_name")?,
                last_name: row.text("last_name")?,
                passport_number: row.text("passport_number")?,
                city: row.text("city")?,
            }))
        }
        "bookings" => {
            let row = Row::from_insert(
                insert,
                "bookings",
                &[
                    "id",
                    "room_id",
                    "client_id",
                    "check_in_date",
                    "check_out_date",
                    "status",
                ],
            )?;
            Ok(Command::InsertBooking(Booking {
                id: row.int("id")?,
                room_id: row.int("room_id")?,
                client_id: row.int("client_id")?,
                stay: StayInterval::new(row.date("check_in_date")?, row.date("check_out_date")?),
                status: row.label_or_default("status")?,
            }))
        }
        "employees" => {
            let row = Row::from_insert(
                insert,
                "employees",
                &["id", "hotel_id", "first_name", "last_name", "status"],
            )?;
            Ok(Command::InsertEmployee(Employee {
                id: row.int("id")?,
                hotel_id: row.int("hotel_id")?,
                first_name: row.text("first_name")?,
                last_name: row.text("last_name")?,
                status: match row.get("status") {
                    Some(expr) if !is_null(expr) => parse_label(expr)?,
                    _ => EmployeeStatus::Active,
                },
            }))
        }
        "cleaning_schedules" => {
            let row = Row::from_insert(
                insert,
                "cleaning_schedules",
                &["id", "employee_id", "floor", "day_of_week"],
            )?;
            Ok(Command::InsertCleaningSchedule(CleaningSchedule {
                id: row.int("id")?,
                employee_id: row.int("employee_id")?,
                floor: row.floor("floor")?,
                day_of_week: parse_weekday(row.require("day_of_week")?)?,
            }))
        }
        "cleaning_logs" => {
            let row = Row::from_insert(
                insert,
                "cleaning_logs",
                &["id", "room_id", "employee_id", "cleaning_date", "status"],
            )?;
            Ok(Command::InsertCleaningLog(CleaningLog {
                id: row.int("id")?,
                room_id: row.int("room_id")?,
                employee_id: row.int("employee_id")?,
                cleaning_date: row.date("cleaning_date")?,
                status: match row.get("status") {
                    Some(expr) if !is_null(expr) => parse_label(expr)?,
                    _ => CleaningStatus::Pending,
                },
            }))
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

/// One VALUES row keyed by column name. Without a column list, values are
/// taken in the table's declared column order.
struct Row {
    table: &'static str,
    cells: Vec<(String, Expr)>,
}

impl Row {
    fn from_insert(
        insert: &ast::Insert,
        table: &'static str,
        columns: &[&'static str],
    ) -> Result<Self, SqlError> {
        let rows = extract_insert_rows(insert)?;
        if rows.len() != 1 {
            return Err(SqlError::Unsupported("multi-row INSERT".into()));
        }
        let values = &rows[0];
        let names: Vec<String> = if insert.columns.is_empty() {
            if values.len() > columns.len() {
                return Err(SqlError::WrongArity(table, columns.len(), values.len()));
            }
            columns.iter().map(|c| c.to_string()).collect()
        } else {
            if insert.columns.len() != values.len() {
                return Err(SqlError::WrongArity(
                    table,
                    insert.columns.len(),
                    values.len(),
                ));
            }
            insert
                .columns
                .iter()
                .map(|c| c.value.to_lowercase())
                .collect()
        };
        if let Some(unknown) = names.iter().find(|n| !columns.contains(&n.as_str())) {
            return Err(SqlError::UnknownColumn(table, unknown.clone()));
        }
        Ok(Self {
            table,
            cells: names.into_iter().zip(values.iter().cloned()).collect(),
        })
    }

    fn get(&self, column: &str) -> Option<&Expr> {
        self.cells
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, expr)| expr)
    }

    fn require(&self, column: &'static str) -> Result<&Expr, SqlError> {
        self.get(column)
            .ok_or(SqlError::MissingColumn(self.table, column))
    }

    fn int(&self, column: &'static str) -> Result<i64, SqlError> {
        parse_i64_expr(self.require(column)?)
    }

    fn uint(&self, column: &'static str) -> Result<u32, SqlError> {
        parse_u32(self.require(column)?)
    }

    fn floor(&self, column: &'static str) -> Result<i32, SqlError> {
        parse_i32(self.require(column)?)
    }

    fn text(&self, column: &'static str) -> Result<String, SqlError> {
        parse_string(self.require(column)?)
    }

    fn date(&self, column: &'static str) -> Result<NaiveDate, SqlError> {
        parse_date(self.require(column)?)
    }

    fn label_or_default<T>(&self, column: &'static str) -> Result<T, SqlError>
    where
        T: FromStr<Err = UnknownLabel> + Default,
    {
        match self.get(column) {
            Some(expr) if !is_null(expr) => parse_label(expr),
            _ => Ok(T::default()),
        }
    }
}

// ── UPDATE / DELETE ───────────────────────────────────────────

fn parse_update(
    table: &TableFactor,
    assignments: &[ast::Assignment],
    selection: Option<&Expr>,
) -> Result<Command, SqlError> {
    let table = table_factor_name(table)?;
    let id = extract_where_id(selection)?;
    let mut set = Vec::with_capacity(assignments.len());
    for assignment in assignments {
        let column = match &assignment.target {
            AssignmentTarget::ColumnName(name) => object_name_last(name)
                .ok_or_else(|| SqlError::Parse("empty column name".into()))?,
            AssignmentTarget::Tuple(_) => {
                return Err(SqlError::Unsupported("tuple assignment".into()));
            }
        };
        set.push((column, &assignment.value));
    }

    let status_only = |table: &'static str| -> Result<&Expr, SqlError> {
        match set.as_slice() {
            [(column, value)] if column == "status" => Ok(*value),
            [(column, _)] => Err(SqlError::UnknownColumn(table, column.clone())),
            _ => Err(SqlError::Unsupported(format!(
                "{table}: only status can be updated"
            ))),
        }
    };

    match table.as_str() {
        "rooms" => Ok(Command::UpdateRoomStatus {
            id,
            status: parse_label(status_only("rooms")?)?,
        }),
        "employees" => Ok(Command::UpdateEmployeeStatus {
            id,
            status: parse_label(status_only("employees")?)?,
        }),
        "cleaning_logs" => Ok(Command::UpdateCleaningLogStatus {
            id,
            status: parse_label(status_only("cleaning_logs")?)?,
        }),
        "bookings" => {
            let mut patch = BookingPatch::default();
            for (column, value) in set {
                match column.as_str() {
                    "room_id" => patch.room_id = Some(parse_i64_expr(value)?),
                    "client_id" => patch.client_id = Some(parse_i64_expr(value)?),
                    "check_in_date" => patch.check_in = Some(parse_date(value)?),
                    "check_out_date" => patch.check_out = Some(parse_date(value)?),
                    "status" => patch.status = Some(parse_label(value)?),
                    _ => return Err(SqlError::UnknownColumn("bookings", column)),
                }
            }
            Ok(Command::UpdateBooking { id, patch })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    let id = extract_where_id(delete.selection.as_ref())?;

    match table.as_str() {
        "bookings" => Ok(Command::DeleteBooking { id }),
        _ => Err(SqlError::Unsupported(format!("DELETE FROM {table}"))),
    }
}

// ── SELECT ────────────────────────────────────────────────────

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    if select.from.is_empty() {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    }
    let table = table_factor_name(&select.from[0].relation)?;
    let mut f = Filters::collect(select.selection.as_ref())?;
    let page = parse_page(query.limit_clause.as_ref())?;

    let command = match table.as_str() {
        "hotels" => Command::SelectHotels {
            id: f.int("id")?,
            page,
        },
        "room_types" => Command::SelectRoomTypes {
            id: f.int("id")?,
            page,
        },
        "rooms" => {
            let filter = if let Some(id) = f.int("id")? {
                RoomFilter::Id(id)
            } else if let Some(hotel_id) = f.int("hotel_id")? {
                RoomFilter::Hotel(hotel_id)
            } else if let Some(type_id) = f.int("type_id")? {
                RoomFilter::Type(type_id)
            } else {
                RoomFilter::All
            };
            Command::SelectRooms { filter, page }
        }
        "clients" => {
            let filter = if let Some(id) = f.int("id")? {
                ClientFilter::Id(id)
            } else if let Some(city) = f.take("city") {
                ClientFilter::City(parse_string(&city)?)
            } else {
                ClientFilter::All
            };
            Command::SelectClients { filter, page }
        }
        "bookings" => {
            let filter = if let Some(id) = f.int("id")? {
                BookingFilter::Id(id)
            } else if let Some(client_id) = f.int("client_id")? {
                BookingFilter::Client(client_id)
            } else if let Some(room_id) = f.int("room_id")? {
                BookingFilter::Room(room_id)
            } else {
                BookingFilter::All
            };
            Command::SelectBookings { filter, page }
        }
        "employees" => {
            let filter = if let Some(id) = f.int("id")? {
                EmployeeFilter::Id(id)
            } else if let Some(hotel_id) = f.int("hotel_id")? {
                EmployeeFilter::Hotel(hotel_id)
            } else if let Some(status) = f.take("status") {
                match parse_label::<EmployeeStatus>(&status)? {
                    EmployeeStatus::Active => EmployeeFilter::Active,
                    other => {
                        return Err(SqlError::Unsupported(format!(
                            "employees: status filter {other}"
                        )));
                    }
                }
            } else {
                EmployeeFilter::All
            };
            Command::SelectEmployees { filter, page }
        }
        "cleaning_schedules" => {
            let filter = if let Some(id) = f.int("id")? {
                ScheduleFilter::Id(id)
            } else if let Some(employee_id) = f.int("employee_id")? {
                ScheduleFilter::Employee(employee_id)
            } else if let Some(day) = f.take("day_of_week") {
                ScheduleFilter::Day(parse_weekday(&day)?)
            } else {
                ScheduleFilter::All
            };
            Command::SelectCleaningSchedules { filter, page }
        }
        "cleaning_logs" => {
            let filter = if let Some(id) = f.int("id")? {
                LogFilter::Id(id)
            } else if let Some(employee_id) = f.int("employee_id")? {
                LogFilter::Employee(employee_id)
            } else if let Some(room_id) = f.int("room_id")? {
                LogFilter::Room(room_id)
            } else if let Some(date) = f.date("cleaning_date")? {
                let floor = f.take("floor").map(|e| parse_i32(&e)).transpose()?;
                LogFilter::Date { date, floor }
            } else {
                LogFilter::All
            };
            Command::SelectCleaningLogs { filter, page }
        }
        "available_rooms" => Command::SelectAvailableRooms {
            stay: f.stay()?,
            hotel_id: f.int("hotel_id")?,
        },
        "room_availability" => Command::SelectRoomAvailability {
            room_id: f.int("room_id")?.ok_or(SqlError::MissingFilter("room_id"))?,
            stay: f.stay()?,
            exclude: f.int("exclude_booking_id")?,
        },
        "reconcile" => Command::Reconcile {
            room_id: f.int("room_id")?,
            today: f.date("today")?,
        },
        "occupancy" => Command::SelectOccupancy {
            hotel_id: f.int("hotel_id")?.ok_or(SqlError::MissingFilter("hotel_id"))?,
        },
        _ => return Err(SqlError::UnknownTable(table)),
    };
    f.finish(&table)?;
    Ok(command)
}

/// Equality filters of a WHERE clause joined by AND.
struct Filters(Vec<(String, Expr)>);

impl Filters {
    fn collect(selection: Option<&Expr>) -> Result<Self, SqlError> {
        let mut filters = Vec::new();
        if let Some(expr) = selection {
            collect_filters(expr, &mut filters)?;
        }
        Ok(Self(filters))
    }

    fn has(&self, column: &str) -> bool {
        self.0.iter().any(|(name, _)| name == column)
    }

    fn take(&mut self, column: &str) -> Option<Expr> {
        let idx = self.0.iter().position(|(name, _)| name == column)?;
        Some(self.0.remove(idx).1)
    }

    fn int(&mut self, column: &str) -> Result<Option<i64>, SqlError> {
        self.take(column).map(|e| parse_i64_expr(&e)).transpose()
    }

    fn date(&mut self, column: &str) -> Result<Option<NaiveDate>, SqlError> {
        self.take(column).map(|e| parse_date(&e)).transpose()
    }

    fn stay(&mut self) -> Result<StayInterval, SqlError> {
        let check_in = self
            .date("check_in_date")?
            .ok_or(SqlError::MissingFilter("check_in_date"))?;
        let check_out = self
            .date("check_out_date")?
            .ok_or(SqlError::MissingFilter("check_out_date"))?;
        Ok(StayInterval::new(check_in, check_out))
    }

    /// Filters left over were either unknown or combined in a way no lookup
    /// supports.
    fn finish(self, table: &str) -> Result<(), SqlError> {
        match self.0.first() {
            None => Ok(()),
            Some((column, _)) => Err(SqlError::Unsupported(format!(
                "filter on {table}.{column}"
            ))),
        }
    }
}

fn collect_filters(expr: &Expr, out: &mut Vec<(String, Expr)>) -> Result<(), SqlError> {
    match expr {
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::And,
            right,
        } => {
            collect_filters(left, out)?;
            collect_filters(right, out)
        }
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        } => {
            let column = expr_column_name(left)
                .ok_or_else(|| SqlError::Unsupported(format!("filter {expr}")))?;
            out.push((column, (**right).clone()));
            Ok(())
        }
        Expr::Nested(inner) => collect_filters(inner, out),
        _ => Err(SqlError::Unsupported(format!(
            "filter {expr}: only column = value joined by AND"
        ))),
    }
}

fn parse_page(limit: Option<&LimitClause>) -> Result<Page, SqlError> {
    let (limit, offset) = match limit {
        None => (None, None),
        Some(LimitClause::LimitOffset { limit, offset, .. }) => {
            (limit.as_ref(), offset.as_ref().map(|o| &o.value))
        }
        Some(LimitClause::OffsetCommaLimit { offset, limit }) => (Some(limit), Some(offset)),
    };
    let to_usize = |e: &Expr| -> Result<usize, SqlError> {
        let v = parse_i64_expr(e)?;
        usize::try_from(v).map_err(|_| SqlError::BadValue("limit/offset", v.to_string()))
    };
    let skip = offset.map(to_usize).transpose()?.unwrap_or(0);
    let limit = limit.map(to_usize).transpose()?.unwrap_or(DEFAULT_PAGE_SIZE);
    Ok(Page::new(skip, limit))
}

// ── Helpers ───────────────────────────────────────────────────

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    if let Some(first) = tables_with_joins.first() {
        table_factor_name(&first.relation)
    } else {
        Err(SqlError::Parse("DELETE without table".into()))
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn extract_insert_rows(insert: &ast::Insert) -> Result<&[Vec<Expr>], SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => {
            if values.rows.is_empty() {
                return Err(SqlError::Parse("empty VALUES".into()));
            }
            Ok(&values.rows)
        }
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn extract_where_id(selection: Option<&Expr>) -> Result<i64, SqlError> {
    let sel = selection.ok_or(SqlError::MissingFilter("id"))?;
    match sel {
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        } if expr_column_name(left).as_deref() == Some("id") => parse_i64_expr(right),
        _ => Err(SqlError::MissingFilter("id")),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

fn is_null(expr: &Expr) -> bool {
    matches!(extract_value(expr), Some(Value::Null))
}

fn parse_i64_expr(expr: &Expr) -> Result<i64, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Number(s, _) | Value::SingleQuotedString(s) => s
                .trim()
                .parse()
                .map_err(|_| SqlError::BadValue("integer", s.clone())),
            _ => Err(SqlError::Parse(format!("expected number, got {value}"))),
        }
    } else if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        Ok(-parse_i64_expr(expr)?)
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr}")))
    }
}

fn parse_u32(expr: &Expr) -> Result<u32, SqlError> {
    let v = parse_i64_expr(expr)?;
    u32::try_from(v).map_err(|_| SqlError::BadValue("non-negative integer", v.to_string()))
}

fn parse_i32(expr: &Expr) -> Result<i32, SqlError> {
    let v = parse_i64_expr(expr)?;
    i32::try_from(v).map_err(|_| SqlError::BadValue("floor", v.to_string()))
}

fn parse_f64(expr: &Expr) -> Result<f64, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Number(s, _) | Value::SingleQuotedString(s) => s
                .trim()
                .parse()
                .map_err(|_| SqlError::BadValue("number", s.clone())),
            _ => Err(SqlError::Parse(format!("expected number, got {value}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr}")))
    }
}

fn parse_string(expr: &Expr) -> Result<String, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) => Ok(s.clone()),
        Some(Value::Number(s, _)) => Ok(s.clone()),
        Some(value) => Err(SqlError::Parse(format!("expected string, got {value}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

/// ISO-8601 calendar date, e.g. `'2024-06-01'`.
fn parse_date(expr: &Expr) -> Result<NaiveDate, SqlError> {
    let s = parse_string(expr)?;
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| SqlError::BadValue("date", s))
}

fn parse_weekday(expr: &Expr) -> Result<Weekday, SqlError> {
    let s = parse_string(expr)?;
    s.trim()
        .parse()
        .map_err(|_| SqlError::BadValue("day_of_week", s))
}

fn parse_label<T: FromStr<Err = UnknownLabel>>(expr: &Expr) -> Result<T, SqlError> {
    let s = parse_string(expr)?;
    s.parse()
        .map_err(|e: UnknownLabel| SqlError::BadValue(e.kind, e.label))
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum SqlError {
    #[error("parse error: {0}")]
    Parse(String),
    #[error("empty query")]
    Empty,
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("unknown table: {0}")]
    UnknownTable(String),
    #[error("{0}: unknown column {1}")]
    UnknownColumn(&'static str, String),
    #[error("{0}: expected {1} values, got {2}")]
    WrongArity(&'static str, usize, usize),
    #[error("{0}: missing column {1}")]
    MissingColumn(&'static str, &'static str),
    #[error("missing filter: {0}")]
    MissingFilter(&'static str),
    #[error("invalid {0}: {1}")]
    BadValue(&'static str, String),
}

impl SqlError {
    /// Malformed values are data errors; everything else is a syntax error.
    pub fn sqlstate(&self) -> &'static str {
        match self {
            SqlError::BadValue(..) => "22023",
            _ => "42601",
        }
    }
}
