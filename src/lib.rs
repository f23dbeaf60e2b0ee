//! Hotel operations core: room availability, booking lifecycle and room
//! status reconciliation over an append-only log, served through the
//! PostgreSQL wire protocol.

pub mod auth;
pub mod config;
pub mod engine;
pub mod housekeeping;
pub mod limits;
pub mod model;
pub mod observability;
pub mod sql;
pub mod tls;
pub mod wal;
pub mod wire;
