//! pgpoll-core — PostgreSQL metrics polling engine.
//!
//! Provides:
//! - `server` — target servers and address normalization
//! - `catalog` — user-defined query catalog
//! - `queries` — built-in `pg_stat_database` SQL
//! - `driver` — database boundary (real `postgres` driver and a scripted mock)
//! - `mapper` — row to observation mapping strategies
//! - `sink` — observation sink trait and stock sinks
//! - `gather` — the gather pass itself
//! - `config` — configuration records and JSON loading

pub mod catalog;
pub mod config;
pub mod driver;
mod error;
pub mod gather;
pub mod mapper;
pub mod queries;
pub mod server;
pub mod sink;

pub use catalog::{QueryCatalog, QueryDefinition};
pub use config::{Config, DESCRIPTION, SAMPLE_CONFIG};
pub use error::{ConfigError, ErrorKind, GatherError};
pub use gather::{ErrorPolicy, GatherSummary, Gatherer, ServerFailure};
pub use server::{DEFAULT_ADDRESS, Server, resolve_servers};
pub use sink::{LineSink, MetricValue, Observation, Sink, Tags};
