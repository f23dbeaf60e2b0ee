use std::net::SocketAddr;
use std::sync::Arc;

use chrono::NaiveDate;
use tokio::net::TcpListener;
use tokio_postgres::{Client, Config, NoTls, SimpleQueryMessage, SimpleQueryRow};
use tokio_test::{assert_err, assert_ok};

use inncontrol::engine::{DEFAULT_LOCK_TIMEOUT, Engine};
use inncontrol::wire::{self, InnControlFactory};

const PASSWORD: &str = "frontdesk";

// ── Test infrastructure ──────────────────────────────────────

fn june_3() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 3).unwrap()
}

async fn start_test_server(name: &str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let dir = std::env::temp_dir().join("inncontrol_int_test");
    std::fs::create_dir_all(&dir).unwrap();
    let wal_path = dir.join(format!("{name}.wal"));
    let _ = std::fs::remove_file(&wal_path);
    let engine = Arc::new(
        Engine::new(wal_path, DEFAULT_LOCK_TIMEOUT)
            .unwrap()
            .with_clock(june_3),
    );
    let factory = Arc::new(InnControlFactory::new(engine, PASSWORD.to_string()));

    tokio::spawn(async move {
        loop {
            let (socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let factory = factory.clone();
            tokio::spawn(async move {
                let _ = wire::process_connection(socket, factory, None).await;
            });
        }
    });

    addr
}

async fn connect_with(addr: SocketAddr, password: &str) -> Result<Client, tokio_postgres::Error> {
    let mut config = Config::new();
    config
        .host(addr.ip().to_string())
        .port(addr.port())
        .dbname("inncontrol")
        .user("reception")
        .password(password);
    let (client, conn) = config.connect(NoTls).await?;
    tokio::spawn(async move {
        let _ = conn.await;
    });
    Ok(client)
}

async fn connect(addr: SocketAddr) -> Client {
    connect_with(addr, PASSWORD).await.unwrap()
}

async fn rows(client: &Client, sql: &str) -> Vec<SimpleQueryRow> {
    client
        .simple_query(sql)
        .await
        .unwrap()
        .into_iter()
        .filter_map(|m| match m {
            SimpleQueryMessage::Row(row) => Some(row),
            _ => None,
        })
        .collect()
}

fn sqlstate(err: &tokio_postgres::Error) -> Option<&str> {
    err.code().map(|c| c.code())
}

/// Hotel 1, room type 1, rooms 10 and 11 on floor 1, room 20 on floor 2,
/// client 1.
async fn seed(client: &Client) {
    client
        .batch_execute(
            "INSERT INTO hotels (id, name, total_rooms) VALUES (1, 'Volga', 3);
             INSERT INTO room_types (id, name, capacity, price_per_night) VALUES (1, 'Standard', 2, 3500);
             INSERT INTO rooms (id, hotel_id, type_id, floor, room_number) VALUES (10, 1, 1, 1, '101');
             INSERT INTO rooms (id, hotel_id, type_id, floor, room_number) VALUES (11, 1, 1, 1, '102');
             INSERT INTO rooms (id, hotel_id, type_id, floor, room_number) VALUES (20, 1, 1, 2, '201');
             INSERT INTO clients (id, first_name, last_name, passport_number, city)
                 VALUES (1, 'Anna', 'Petrova', '4510987654', 'Kazan');",
        )
        .await
        .unwrap();
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn booking_occupies_room_and_blocks_overlaps() {
    let addr = start_test_server("booking_flow").await;
    let client = connect(addr).await;
    seed(&client).await;

    assert_ok!(
        client
            .batch_execute(
                "INSERT INTO bookings (id, room_id, client_id, check_in_date, check_out_date) \
                 VALUES (1, 10, 1, '2024-06-01', '2024-06-05')"
            )
            .await
    );

    let room = rows(&client, "SELECT * FROM rooms WHERE id = 10").await;
    assert_eq!(room.len(), 1);
    assert_eq!(room[0].get("status"), Some("occupied"));

    // Sharing the checkout day is an overlap.
    let err = assert_err!(
        client
            .batch_execute(
                "INSERT INTO bookings (id, room_id, client_id, check_in_date, check_out_date) \
                 VALUES (2, 10, 1, '2024-06-05', '2024-06-10')"
            )
            .await
    );
    assert_eq!(sqlstate(&err), Some("23P01"));

    let check = rows(
        &client,
        "SELECT * FROM room_availability WHERE room_id = 10 \
         AND check_in_date = '2024-06-03' AND check_out_date = '2024-06-07'",
    )
    .await;
    assert_eq!(check[0].get("available"), Some("f"));
    assert_eq!(check[0].get("conflicting_booking_id"), Some("1"));

    let excluded = rows(
        &client,
        "SELECT * FROM room_availability WHERE room_id = 10 \
         AND check_in_date = '2024-06-03' AND check_out_date = '2024-06-07' \
         AND exclude_booking_id = 1",
    )
    .await;
    assert_eq!(excluded[0].get("available"), Some("t"));
    assert_eq!(excluded[0].get("conflicting_booking_id"), None);
}

#[tokio::test]
async fn cancellation_frees_room() {
    let addr = start_test_server("cancellation").await;
    let client = connect(addr).await;
    seed(&client).await;

    client
        .batch_execute(
            "INSERT INTO bookings VALUES (1, 11, 1, '2024-06-02', '2024-06-04', 'checked_in')",
        )
        .await
        .unwrap();
    let room = rows(&client, "SELECT * FROM rooms WHERE id = 11").await;
    assert_eq!(room[0].get("status"), Some("occupied"));

    assert_ok!(
        client
            .batch_execute("UPDATE bookings SET status = 'cancelled' WHERE id = 1")
            .await
    );
    let room = rows(&client, "SELECT * FROM rooms WHERE id = 11").await;
    assert_eq!(room[0].get("status"), Some("available"));

    let booking = rows(&client, "SELECT * FROM bookings WHERE id = 1").await;
    assert_eq!(booking[0].get("status"), Some("cancelled"));
    assert_eq!(booking[0].get("check_in_date"), Some("2024-06-02"));
}

#[tokio::test]
async fn available_rooms_skip_maintenance() {
    let addr = start_test_server("available_rooms").await;
    let client = connect(addr).await;
    seed(&client).await;

    client
        .batch_execute(
            "INSERT INTO bookings VALUES (1, 10, 1, '2024-06-10', '2024-06-12');
             UPDATE rooms SET status = 'maintenance' WHERE id = 20;",
        )
        .await
        .unwrap();

    let free = rows(
        &client,
        "SELECT * FROM available_rooms WHERE check_in_date = '2024-06-11' \
         AND check_out_date = '2024-06-13' AND hotel_id = 1",
    )
    .await;
    let ids: Vec<&str> = free.iter().filter_map(|r| r.get("room_id")).collect();
    assert_eq!(ids, vec!["11"]);

    let err = assert_err!(
        client
            .simple_query(
                "SELECT * FROM available_rooms WHERE check_in_date = '2024-06-13' \
                 AND check_out_date = '2024-06-11'"
            )
            .await
    );
    assert_eq!(sqlstate(&err), Some("22023"));
}

#[tokio::test]
async fn reconcile_and_occupancy() {
    let addr = start_test_server("reconcile").await;
    let client = connect(addr).await;
    seed(&client).await;

    client
        .batch_execute("INSERT INTO bookings VALUES (1, 10, 1, '2024-06-01', '2024-06-05')")
        .await
        .unwrap();

    let occupancy = rows(&client, "SELECT * FROM occupancy WHERE hotel_id = 1").await;
    assert_eq!(occupancy[0].get("total"), Some("3"));
    assert_eq!(occupancy[0].get("occupied"), Some("1"));

    // Unchanged day: nothing to do.
    let same = rows(&client, "SELECT * FROM reconcile WHERE room_id = 10").await;
    assert_eq!(same[0].get("status"), Some("occupied"));
    assert_eq!(same[0].get("updated"), Some("f"));

    let later = rows(
        &client,
        "SELECT * FROM reconcile WHERE room_id = 10 AND today = '2024-06-06'",
    )
    .await;
    assert_eq!(later[0].get("status"), Some("available"));
    assert_eq!(later[0].get("updated"), Some("t"));

    let sweep = rows(&client, "SELECT * FROM reconcile WHERE today = '2024-06-06'").await;
    assert_eq!(sweep[0].get("updated"), Some("0"));
}

#[tokio::test]
async fn extended_protocol_parameters() {
    let addr = start_test_server("extended").await;
    let client = connect(addr).await;
    seed(&client).await;

    let inserted = client
        .execute(
            "INSERT INTO bookings (id, room_id, client_id, check_in_date, check_out_date) \
             VALUES ($1, $2, $3, $4, $5)",
            &[&"7", &"20", &"1", &"2024-07-01", &"2024-07-03"],
        )
        .await
        .unwrap();
    assert_eq!(inserted, 1);

    let bookings = rows(&client, "SELECT * FROM bookings WHERE client_id = 1").await;
    assert_eq!(bookings.len(), 1);
    assert_eq!(bookings[0].get("room_id"), Some("20"));
}

#[tokio::test]
async fn errors_carry_sqlstates() {
    let addr = start_test_server("errors").await;
    let client = connect(addr).await;
    seed(&client).await;

    let err = assert_err!(client.simple_query("SELECT * FROM rooms WHERE id = 99").await);
    assert_eq!(sqlstate(&err), Some("P0002"));

    let err = assert_err!(
        client
            .simple_query("INSERT INTO hotels (id, name, total_rooms) VALUES (1, 'Kama', 5)")
            .await
    );
    assert_eq!(sqlstate(&err), Some("23505"));

    let err = assert_err!(client.simple_query("SELEKT * FROM rooms").await);
    assert_eq!(sqlstate(&err), Some("42601"));

    let err = assert_err!(
        client
            .simple_query("UPDATE rooms SET status = 'haunted' WHERE id = 10")
            .await
    );
    assert_eq!(sqlstate(&err), Some("22023"));
}

#[tokio::test]
async fn wrong_password_is_rejected() {
    let addr = start_test_server("auth").await;
    assert_err!(connect_with(addr, "guess").await);
    assert_ok!(connect_with(addr, PASSWORD).await);
}
