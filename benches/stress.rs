use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use chrono::{Days, NaiveDate};
use tokio_postgres::{Config, NoTls};

/// First check-in date used by the benchmark. Stays are two days long with
/// a free day between them, so sequential bookings never touch.
fn stay_dates(slot: u64) -> (NaiveDate, NaiveDate) {
    let base = NaiveDate::from_ymd_opt(2030, 1, 1).unwrap_or_default();
    let check_in = base + Days::new(slot * 3);
    (check_in, check_in + Days::new(1))
}

async fn connect(host: &str, port: u16) -> tokio_postgres::Client {
    let password = std::env::var("INNCONTROL_PASSWORD").unwrap_or_else(|_| "inncontrol".into());
    let mut config = Config::new();
    config
        .host(host)
        .port(port)
        .dbname("inncontrol")
        .user("bench")
        .password(password);

    let (client, conn) = config.connect(NoTls).await.expect("connect failed");
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            eprintln!("connection error: {e}");
        }
    });
    client
}

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    if latencies.is_empty() {
        println!("  {label}: no samples");
        return;
    }
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies[latencies.len() - 1].as_secs_f64() * 1000.0,
    );
}

/// Ids for one benchmark run, offset so repeated runs against the same
/// server do not collide.
#[derive(Clone, Copy)]
struct Ids {
    base: i64,
}

impl Ids {
    fn hotel(&self) -> i64 {
        self.base
    }
    fn room(&self, n: usize) -> i64 {
        self.base + n as i64
    }
    fn client(&self) -> i64 {
        self.base
    }
    fn booking(&self, phase: i64, n: usize) -> i64 {
        self.base + phase * 1_000_000 + n as i64
    }
}

async fn book(
    client: &tokio_postgres::Client,
    ids: Ids,
    booking_id: i64,
    room: usize,
    slot: u64,
) -> Result<u64, tokio_postgres::Error> {
    let (check_in, check_out) = stay_dates(slot);
    client
        .execute(
            &format!(
                "INSERT INTO bookings (id, room_id, client_id, check_in_date, check_out_date) \
                 VALUES ({booking_id}, {}, {}, '{check_in}', '{check_out}')",
                ids.room(room),
                ids.client()
            ),
            &[],
        )
        .await
}

async fn setup(client: &tokio_postgres::Client, ids: Ids, rooms: usize) {
    client
        .batch_execute(&format!(
            "INSERT INTO hotels (id, name, total_rooms) VALUES ({h}, 'Bench {h}', {rooms});
             INSERT INTO room_types (id, name, capacity, price_per_night) VALUES ({h}, 'Bench', 2, 4200);
             INSERT INTO clients (id, first_name, last_name, passport_number, city)
                 VALUES ({c}, 'Load', 'Tester', 'B{c}', 'Tver');",
            h = ids.hotel(),
            c = ids.client() % 1_000_000_000,
        ))
        .await
        .unwrap();

    for n in 0..rooms {
        client
            .batch_execute(&format!(
                "INSERT INTO rooms (id, hotel_id, type_id, floor, room_number) \
                 VALUES ({}, {}, {}, {}, 'R{n}')",
                ids.room(n),
                ids.hotel(),
                ids.hotel(),
                n / 10 + 1,
            ))
            .await
            .unwrap();
    }
    println!("  created hotel {} with {rooms} rooms", ids.hotel());
}

async fn phase1_sequential(host: &str, port: u16, ids: Ids) {
    let client = connect(host, port).await;

    let n = 2000;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();

    for i in 0..n {
        let t = Instant::now();
        book(&client, ids, ids.booking(1, i), 0, i as u64)
            .await
            .unwrap();
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} bookings in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("write latency", &mut latencies);
}

async fn phase2_concurrent(host: &str, port: u16, ids: Ids) {
    let n_tasks = 10;
    let n_per_task = 200;

    let start = Instant::now();
    let mut handles = Vec::new();

    for task in 0..n_tasks {
        let host = host.to_string();
        handles.push(tokio::spawn(async move {
            let client = connect(&host, port).await;
            // One room per task: no lock contention, only WAL group commit.
            for j in 0..n_per_task {
                book(&client, ids, ids.booking(2, task * n_per_task + j), task + 1, j as u64)
                    .await
                    .unwrap();
            }
        }));
    }

    for h in handles {
        h.await.unwrap();
    }

    let elapsed = start.elapsed();
    let total = n_tasks * n_per_task;
    let ops = total as f64 / elapsed.as_secs_f64();
    println!(
        "  {n_tasks} tasks x {n_per_task} bookings = {total} total in {:.2}s = {ops:.0} ops/sec",
        elapsed.as_secs_f64()
    );
}

async fn phase3_read_under_load(host: &str, port: u16, ids: Ids) {
    let stop = Arc::new(AtomicBool::new(false));
    let mut writer_handles = Vec::new();
    for w in 0..5 {
        let host = host.to_string();
        let stop = stop.clone();
        writer_handles.push(tokio::spawn(async move {
            let client = connect(&host, port).await;
            let mut i = 0usize;
            while !stop.load(Ordering::Relaxed) {
                let _ = book(&client, ids, ids.booking(3, w * 100_000 + i), 20 + w, i as u64).await;
                i += 1;
            }
        }));
    }

    let n_readers = 10;
    let reads_per_reader = 500;
    let mut reader_handles = Vec::new();

    for r in 0..n_readers {
        let host = host.to_string();
        reader_handles.push(tokio::spawn(async move {
            let client = connect(&host, port).await;
            let mut latencies = Vec::with_capacity(reads_per_reader);
            for i in 0..reads_per_reader {
                let (check_in, check_out) = stay_dates((r * reads_per_reader + i) as u64 % 500);
                let t = Instant::now();
                client
                    .simple_query(&format!(
                        "SELECT * FROM available_rooms WHERE hotel_id = {} \
                         AND check_in_date = '{check_in}' AND check_out_date = '{check_out}'",
                        ids.hotel()
                    ))
                    .await
                    .unwrap();
                latencies.push(t.elapsed());
            }
            latencies
        }));
    }

    let mut all_latencies = Vec::new();
    for h in reader_handles {
        all_latencies.extend(h.await.unwrap());
    }

    stop.store(true, Ordering::Relaxed);
    for h in writer_handles {
        let _ = h.await;
    }

    print_latency("available_rooms query", &mut all_latencies);
}

/// Many connections race for the same room and dates. Exactly one booking
/// per slot may win.
async fn phase4_contention(host: &str, port: u16, ids: Ids) {
    let n_conns = 50;
    let slots = 20;

    let start = Instant::now();
    let mut handles = Vec::new();
    let won = Arc::new(AtomicUsize::new(0));
    let declined = Arc::new(AtomicUsize::new(0));

    for c in 0..n_conns {
        let host = host.to_string();
        let won = won.clone();
        let declined = declined.clone();
        handles.push(tokio::spawn(async move {
            let client = connect(&host, port).await;
            for slot in 0..slots {
                match book(&client, ids, ids.booking(4, c * slots + slot), 30, slot as u64).await {
                    Ok(_) => won.fetch_add(1, Ordering::Relaxed),
                    Err(_) => declined.fetch_add(1, Ordering::Relaxed),
                };
            }
        }));
    }

    for h in handles {
        let _ = h.await;
    }

    let elapsed = start.elapsed();
    let won = won.load(Ordering::Relaxed);
    let declined = declined.load(Ordering::Relaxed);
    println!(
        "  {n_conns} connections x {slots} slots: {won} accepted, {declined} declined in {:.2}s",
        elapsed.as_secs_f64()
    );
    if won != slots {
        println!("  WARNING: expected exactly {slots} accepted bookings");
    }
}

#[tokio::main]
async fn main() {
    let host = std::env::var("INNCONTROL_HOST").unwrap_or_else(|_| "127.0.0.1".into());
    let port: u16 = std::env::var("INNCONTROL_PORT")
        .unwrap_or_else(|_| "5433".into())
        .parse()
        .expect("invalid INNCONTROL_PORT");

    let run = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    let ids = Ids {
        base: run * 10_000_000,
    };

    println!("=== inncontrol stress benchmark ===");
    println!("target: {host}:{port}\n");

    println!("[setup]");
    let setup_client = connect(&host, port).await;
    setup(&setup_client, ids, 40).await;
    drop(setup_client);

    println!("\n[phase 1] sequential booking throughput");
    phase1_sequential(&host, port, ids).await;

    println!("\n[phase 2] concurrent booking throughput");
    phase2_concurrent(&host, port, ids).await;

    println!("\n[phase 3] availability latency under write load");
    phase3_read_under_load(&host, port, ids).await;

    println!("\n[phase 4] same-room contention");
    phase4_contention(&host, port, ids).await;

    println!("\n=== benchmark complete ===");
}
