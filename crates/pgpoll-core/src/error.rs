//! Error types for gather passes and configuration loading.

use std::fmt;

/// Broad failure category of a [`GatherError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Opening a connection failed.
    Connect,
    /// Preparing or executing a query failed (including unknown identifiers).
    Query,
    /// A row did not have the expected shape or column types.
    Scan,
    /// The result set reported a fault while being advanced.
    Iterate,
}

/// Error type for a gather pass.
///
/// The first error raised anywhere in a pass ends it (under the default
/// policy), so a single value describes the whole failure.
#[derive(Debug, Clone, PartialEq)]
pub enum GatherError {
    /// Connection could not be established.
    Connect {
        server: String,
        database: Option<String>,
        message: String,
    },
    /// Query preparation or execution failed.
    Query { query: String, message: String },
    /// Query identifier referenced by a server is not in the catalog.
    UnknownQuery { identifier: String },
    /// Row scan failed (arity, type or NULL mismatch).
    Scan { column: String, message: String },
    /// Result iteration failed.
    Iterate { message: String },
}

impl GatherError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatherError::Connect { .. } => ErrorKind::Connect,
            GatherError::Query { .. } | GatherError::UnknownQuery { .. } => ErrorKind::Query,
            GatherError::Scan { .. } => ErrorKind::Scan,
            GatherError::Iterate { .. } => ErrorKind::Iterate,
        }
    }

    pub(crate) fn scan(column: impl Into<String>, message: impl Into<String>) -> Self {
        GatherError::Scan {
            column: column.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for GatherError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatherError::Connect {
                server,
                database: Some(db),
                message,
            } => write!(f, "PostgreSQL: connect to {} (database {}): {}", server, db, message),
            GatherError::Connect {
                server,
                database: None,
                message,
            } => write!(f, "PostgreSQL: connect to {}: {}", server, message),
            GatherError::Query { query, message } => {
                write!(f, "PostgreSQL query error ({}): {}", query, message)
            }
            GatherError::UnknownQuery { identifier } => {
                write!(f, "PostgreSQL query error: unknown query identifier '{}'", identifier)
            }
            GatherError::Scan { column, message } => {
                write!(f, "PostgreSQL scan error (column {}): {}", column, message)
            }
            GatherError::Iterate { message } => {
                write!(f, "PostgreSQL row iteration error: {}", message)
            }
        }
    }
}

impl std::error::Error for GatherError {}

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    /// Config file could not be read.
    Io(std::io::Error),
    /// Config text is not valid.
    Parse(serde_json::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "failed to read config: {}", e),
            ConfigError::Parse(e) => write!(f, "invalid config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Parse(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Parse(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_query_is_a_query_failure() {
        let err = GatherError::UnknownQuery {
            identifier: "tables_size".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::Query);
        assert!(err.to_string().contains("tables_size"));
    }

    #[test]
    fn connect_error_mentions_database_when_known() {
        let err = GatherError::Connect {
            server: "host=db1".to_string(),
            database: Some("app".to_string()),
            message: "connection refused".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::Connect);
        assert_eq!(
            err.to_string(),
            "PostgreSQL: connect to host=db1 (database app): connection refused"
        );
    }
}
