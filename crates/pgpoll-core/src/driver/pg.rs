//! Real driver backed by the synchronous `postgres` client.

use std::str::FromStr;

use postgres::fallible_iterator::FallibleIterator;
use postgres::types::{ToSql, Type};
use postgres::{Client, Config, NoTls, Row};
use postgres_native_tls::MakeTlsConnector;
use tracing::{debug, warn};

use super::{Connection, Driver, Rows, SqlRow, Value};
use crate::error::GatherError;
use crate::server::redact_address;

/// Opens `postgres::Client` connections.
///
/// Addresses without a user fall back to `PGUSER`, then `USER`. TLS is
/// negotiated according to the address's `sslmode`.
pub struct PgDriver {
    tls: Option<MakeTlsConnector>,
}

impl PgDriver {
    pub fn new() -> Self {
        let tls = match native_tls::TlsConnector::builder().build() {
            Ok(connector) => Some(MakeTlsConnector::new(connector)),
            Err(e) => {
                warn!(error = %e, "TLS unavailable, connections will not use it");
                None
            }
        };
        Self { tls }
    }

    /// Driver that never negotiates TLS.
    pub fn without_tls() -> Self {
        Self { tls: None }
    }
}

impl Default for PgDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl Driver for PgDriver {
    type Conn = PgConnection;

    fn connect(
        &mut self,
        address: &str,
        database: Option<&str>,
    ) -> Result<PgConnection, GatherError> {
        let connect_error = |message: String| GatherError::Connect {
            server: redact_address(address),
            database: database.map(str::to_string),
            message,
        };

        let mut config =
            Config::from_str(address).map_err(|e| connect_error(format_postgres_error(&e)))?;
        if let Some(db) = database {
            config.dbname(db);
        }
        if config.get_user().is_none()
            && let Some(user) = default_user()
        {
            config.user(user.as_str());
        }

        let client = match &self.tls {
            Some(tls) => config.connect(tls.clone()),
            None => config.connect(NoTls),
        }
        .map_err(|e| connect_error(format_postgres_error(&e)))?;

        debug!(server = %redact_address(address), database = ?database, "connected");
        Ok(PgConnection { client })
    }
}

fn default_user() -> Option<String> {
    std::env::var("PGUSER")
        .or_else(|_| std::env::var("USER"))
        .ok()
}

/// An open `postgres` connection; closed on drop.
pub struct PgConnection {
    client: Client,
}

impl Connection for PgConnection {
    fn query(&mut self, sql: &str, params: &[&str]) -> Result<Rows<'_>, GatherError> {
        let rows = self
            .client
            .query_raw(sql, params.iter().map(|p| p as &dyn ToSql))
            .map_err(|e| GatherError::Query {
                query: sql.trim().to_string(),
                message: format_postgres_error(&e),
            })?;

        Ok(Box::new(rows.iterator().map(|row| match row {
            Ok(row) => decode_row(&row),
            Err(e) => Err(GatherError::Iterate {
                message: format_postgres_error(&e),
            }),
        })))
    }
}

fn decode_row(row: &Row) -> Result<SqlRow, GatherError> {
    let mut columns = Vec::with_capacity(row.len());
    let mut values = Vec::with_capacity(row.len());
    for (idx, column) in row.columns().iter().enumerate() {
        let value = decode_value(row, idx, column.type_())
            .map_err(|e| GatherError::scan(column.name(), format_postgres_error(&e)))?;
        columns.push(column.name().to_string());
        values.push(value);
    }
    Ok(SqlRow::new(columns, values))
}

/// Decodes the column types metrics are made of. Anything else (numeric,
/// timestamps, arrays) becomes `Value::Unsupported` and only fails if a
/// mapper actually reads it.
fn decode_value(row: &Row, idx: usize, ty: &Type) -> Result<Value, postgres::Error> {
    let value = if *ty == Type::BOOL {
        row.try_get::<_, Option<bool>>(idx)?.map(Value::Bool)
    } else if *ty == Type::INT2 {
        row.try_get::<_, Option<i16>>(idx)?
            .map(|v| Value::Int(v.into()))
    } else if *ty == Type::INT4 {
        row.try_get::<_, Option<i32>>(idx)?
            .map(|v| Value::Int(v.into()))
    } else if *ty == Type::INT8 {
        row.try_get::<_, Option<i64>>(idx)?.map(Value::Int)
    } else if *ty == Type::OID {
        row.try_get::<_, Option<u32>>(idx)?
            .map(|v| Value::Int(v.into()))
    } else if *ty == Type::FLOAT4 {
        row.try_get::<_, Option<f32>>(idx)?
            .map(|v| Value::Float(v.into()))
    } else if *ty == Type::FLOAT8 {
        row.try_get::<_, Option<f64>>(idx)?.map(Value::Float)
    } else if [Type::TEXT, Type::VARCHAR, Type::NAME, Type::BPCHAR].contains(ty) {
        row.try_get::<_, Option<String>>(idx)?.map(Value::Text)
    } else {
        return Ok(Value::Unsupported(ty.name().to_string()));
    };
    Ok(value.unwrap_or(Value::Null))
}

/// Server errors as `SEVERITY: message`; client-side errors shortened
/// where the driver text is known to be noisy.
fn format_postgres_error(e: &postgres::Error) -> String {
    if let Some(db_error) = e.as_db_error() {
        return format!("{}: {}", db_error.severity(), db_error.message());
    }
    let msg = e.to_string();
    if msg.contains("Connection refused") {
        "connection refused".to_string()
    } else {
        msg
    }
}
