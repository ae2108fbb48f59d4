//! The gather pass.
//!
//! One call to [`Gatherer::gather`] visits every configured server once, in
//! order, and forwards every observation to the sink as soon as its row is
//! mapped:
//!
//! ```text
//! servers ─► databases ─► queries ─► rows ─► observations ─► sink
//! ```
//!
//! Per server the mode is chosen by its `queries` list:
//! - empty: built-in mode, `pg_stat_database` over one connection to the
//!   server (all databases, or one filtered query per listed database);
//! - non-empty: catalog mode, one connection per listed database, reused for
//!   every listed query and closed before the next database is opened.
//!
//! Nothing is retried and nothing survives the pass except the driver.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::catalog::QueryCatalog;
use crate::config::Config;
use crate::driver::{Connection, Driver, Rows, SqlRow};
use crate::error::GatherError;
use crate::mapper::{QueryLayout, map_stat_database_row};
use crate::queries::{build_stat_database_all_query, build_stat_database_one_query};
use crate::server::{Server, resolve_servers};
use crate::sink::{MetricValue, Observation, Sink, Tags};

/// What a failing server does to the rest of the pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// The first error ends the pass and is its only result.
    #[default]
    FailFast,
    /// An error ends the current server only; it is recorded in
    /// [`GatherSummary::failures`] and the pass moves on.
    IsolateServers,
}

/// A server that failed under [`ErrorPolicy::IsolateServers`].
#[derive(Debug, Clone, PartialEq)]
pub struct ServerFailure {
    /// Redacted server address.
    pub server: String,
    pub error: GatherError,
}

/// Outcome of a successful pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GatherSummary {
    /// Servers visited.
    pub servers: usize,
    /// Observations forwarded to the sink, including those of servers that
    /// later failed.
    pub observations: usize,
    pub failures: Vec<ServerFailure>,
}

/// Runs gather passes through a [`Driver`].
pub struct Gatherer<D: Driver> {
    driver: D,
}

impl<D: Driver> Gatherer<D> {
    pub fn new(driver: D) -> Self {
        Self { driver }
    }

    /// Runs one full pass over `config`.
    ///
    /// The catalog is rebuilt from `config.queries` on every call and an
    /// empty server list means one implicit local server.
    pub fn gather(
        &mut self,
        config: &Config,
        sink: &mut dyn Sink,
    ) -> Result<GatherSummary, GatherError> {
        let started = Instant::now();
        let catalog = QueryCatalog::build(&config.queries);
        let servers = resolve_servers(&config.servers);
        let mut summary = GatherSummary::default();

        for server in &servers {
            summary.servers += 1;
            let mut counted = CountingSink::new(sink);
            let result = if server.queries.is_empty() {
                self.gather_builtin(server, &mut counted)
            } else {
                self.gather_queries(server, &catalog, &mut counted)
            };
            summary.observations += counted.count;

            if let Err(error) = result {
                match config.on_error {
                    ErrorPolicy::FailFast => return Err(error),
                    ErrorPolicy::IsolateServers => {
                        warn!(server = %server.tag(), error = %error, "server skipped");
                        summary.failures.push(ServerFailure {
                            server: server.tag(),
                            error,
                        });
                    }
                }
            }
        }

        info!(
            servers = summary.servers,
            observations = summary.observations,
            failures = summary.failures.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "gather pass complete"
        );
        Ok(summary)
    }

    /// Collects built-in `pg_stat_database` statistics for one server.
    ///
    /// Returns the number of observations emitted. A listed database with no
    /// statistics row emits nothing and is not an error.
    pub fn gather_builtin(
        &mut self,
        server: &Server,
        sink: &mut dyn Sink,
    ) -> Result<usize, GatherError> {
        let server_tag = server.tag();
        let mut conn = self.driver.connect(&server.normalized_address(), None)?;
        let map = |row: &SqlRow| map_stat_database_row(row, &server_tag);

        let emitted = if server.databases.is_empty() {
            let sql = build_stat_database_all_query();
            emit_rows(conn.query(&sql, &[])?, sink, map)?
        } else {
            let sql = build_stat_database_one_query();
            let mut emitted = 0;
            for name in &server.databases {
                let n = emit_rows(conn.query(&sql, &[name.as_str()])?, sink, map)?;
                if n == 0 {
                    debug!(server = %server_tag, database = %name, "no pg_stat_database row");
                }
                emitted += n;
            }
            emitted
        };

        debug!(server = %server_tag, observations = emitted, "built-in statistics collected");
        Ok(emitted)
    }

    /// Runs the server's catalog queries against each of its databases.
    ///
    /// Returns the number of observations emitted. An identifier missing from
    /// the catalog fails with [`GatherError::UnknownQuery`] when reached.
    pub fn gather_queries(
        &mut self,
        server: &Server,
        catalog: &QueryCatalog,
        sink: &mut dyn Sink,
    ) -> Result<usize, GatherError> {
        let server_tag = server.tag();
        let address = server.normalized_address();
        if server.databases.is_empty() {
            debug!(server = %server_tag, "catalog queries configured without databases");
        }

        let mut emitted = 0;
        for database in &server.databases {
            let mut conn = self.driver.connect(&address, Some(database))?;
            for identifier in &server.queries {
                let definition =
                    catalog
                        .get(identifier)
                        .ok_or_else(|| GatherError::UnknownQuery {
                            identifier: identifier.clone(),
                        })?;
                let layout = QueryLayout::for_definition(definition);

                let rows = conn.query(&definition.sql, &[])?;
                let n = emit_rows(rows, sink, |row| layout.map_row(row, &server_tag, database))?;
                debug!(
                    server = %server_tag,
                    database = %database,
                    query = %identifier,
                    observations = n,
                    "catalog query collected"
                );
                emitted += n;
            }
        }
        Ok(emitted)
    }
}

/// Maps every row and forwards its observations, stopping at the first error.
fn emit_rows<F>(rows: Rows<'_>, sink: &mut dyn Sink, map: F) -> Result<usize, GatherError>
where
    F: Fn(&SqlRow) -> Result<Vec<Observation>, GatherError>,
{
    let mut emitted = 0;
    for row in rows {
        for observation in map(&row?)? {
            sink.add(&observation.metric, observation.value, &observation.tags);
            emitted += 1;
        }
    }
    Ok(emitted)
}

/// Counts what passes through to the wrapped sink.
struct CountingSink<'a> {
    inner: &'a mut dyn Sink,
    count: usize,
}

impl<'a> CountingSink<'a> {
    fn new(inner: &'a mut dyn Sink) -> Self {
        Self { inner, count: 0 }
    }
}

impl Sink for CountingSink<'_> {
    fn add(&mut self, metric: &str, value: MetricValue, tags: &Tags) {
        self.count += 1;
        self.inner.add(metric, value, tags);
    }
}
