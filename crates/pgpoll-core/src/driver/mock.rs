//! Scripted in-memory driver for testing the gather engine without a server.
//!
//! Responses are registered per SQL text (optionally per database and bound
//! parameters). Every connect, query and close is recorded so tests can
//! assert on connection lifetimes. Clones share state, so a test can hand a
//! clone to a `Gatherer` and keep the other for assertions.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use super::{Connection, Driver, Rows, SqlRow};
use crate::error::GatherError;

/// Something the mock driver observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEvent {
    Connect {
        address: String,
        database: Option<String>,
    },
    Query {
        database: Option<String>,
        sql: String,
        params: Vec<String>,
    },
    Close {
        database: Option<String>,
    },
}

#[derive(Debug, Clone)]
enum Response {
    Rows(Vec<Result<SqlRow, String>>),
    Fail(String),
}

type ResponseKey = (Option<String>, String, Vec<String>);

#[derive(Debug, Default)]
struct MockState {
    responses: HashMap<ResponseKey, Response>,
    refused_addresses: HashSet<String>,
    refused_databases: HashSet<String>,
    events: Vec<MockEvent>,
    open: usize,
}

/// In-memory driver for tests.
#[derive(Debug, Clone, Default)]
pub struct MockDriver {
    state: Rc<RefCell<MockState>>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `rows` for `sql` executed without parameters on any database.
    pub fn on_query(&self, sql: &str, rows: Vec<SqlRow>) {
        self.script(None, sql, &[], Response::Rows(rows.into_iter().map(Ok).collect()));
    }

    /// Returns `rows` for `sql` executed with exactly `params`.
    pub fn on_query_with(&self, sql: &str, params: &[&str], rows: Vec<SqlRow>) {
        self.script(None, sql, params, Response::Rows(rows.into_iter().map(Ok).collect()));
    }

    /// Returns `rows` for `sql` on connections opened for `database`.
    /// Takes precedence over [`MockDriver::on_query`].
    pub fn on_database_query(&self, database: &str, sql: &str, rows: Vec<SqlRow>) {
        self.script(
            Some(database),
            sql,
            &[],
            Response::Rows(rows.into_iter().map(Ok).collect()),
        );
    }

    /// Fails execution of `sql`.
    pub fn fail_query(&self, sql: &str, message: &str) {
        self.script(None, sql, &[], Response::Fail(message.to_string()));
    }

    /// Yields `rows` for `sql`, then a row iteration fault.
    pub fn fail_after_rows(&self, sql: &str, rows: Vec<SqlRow>, message: &str) {
        let mut items: Vec<Result<SqlRow, String>> = rows.into_iter().map(Ok).collect();
        items.push(Err(message.to_string()));
        self.script(None, sql, &[], Response::Rows(items));
    }

    /// Refuses connections to `address`.
    pub fn refuse_address(&self, address: &str) {
        self.state
            .borrow_mut()
            .refused_addresses
            .insert(address.to_string());
    }

    /// Refuses connections opened for `database`.
    pub fn refuse_database(&self, database: &str) {
        self.state
            .borrow_mut()
            .refused_databases
            .insert(database.to_string());
    }

    pub fn events(&self) -> Vec<MockEvent> {
        self.state.borrow().events.clone()
    }

    /// Connections opened and not yet dropped.
    pub fn open_connections(&self) -> usize {
        self.state.borrow().open
    }

    /// Total successful connects so far.
    pub fn connect_count(&self) -> usize {
        self.state
            .borrow()
            .events
            .iter()
            .filter(|e| matches!(e, MockEvent::Connect { .. }))
            .count()
    }

    /// SQL texts executed so far, in order.
    pub fn executed(&self) -> Vec<String> {
        self.state
            .borrow()
            .events
            .iter()
            .filter_map(|e| match e {
                MockEvent::Query { sql, .. } => Some(sql.clone()),
                _ => None,
            })
            .collect()
    }

    fn script(&self, database: Option<&str>, sql: &str, params: &[&str], response: Response) {
        let key = (
            database.map(str::to_string),
            sql.to_string(),
            params.iter().map(|p| p.to_string()).collect(),
        );
        self.state.borrow_mut().responses.insert(key, response);
    }
}

impl Driver for MockDriver {
    type Conn = MockConnection;

    fn connect(
        &mut self,
        address: &str,
        database: Option<&str>,
    ) -> Result<MockConnection, GatherError> {
        let mut state = self.state.borrow_mut();
        let refused = state.refused_addresses.contains(address)
            || database.is_some_and(|db| state.refused_databases.contains(db));
        if refused {
            return Err(GatherError::Connect {
                server: address.to_string(),
                database: database.map(str::to_string),
                message: "connection refused".to_string(),
            });
        }

        state.events.push(MockEvent::Connect {
            address: address.to_string(),
            database: database.map(str::to_string),
        });
        state.open += 1;

        Ok(MockConnection {
            state: Rc::clone(&self.state),
            database: database.map(str::to_string),
        })
    }
}

/// Connection handed out by [`MockDriver`]. Records a close event on drop.
#[derive(Debug)]
pub struct MockConnection {
    state: Rc<RefCell<MockState>>,
    database: Option<String>,
}

impl Connection for MockConnection {
    fn query(&mut self, sql: &str, params: &[&str]) -> Result<Rows<'_>, GatherError> {
        let mut state = self.state.borrow_mut();
        let params: Vec<String> = params.iter().map(|p| p.to_string()).collect();
        state.events.push(MockEvent::Query {
            database: self.database.clone(),
            sql: sql.to_string(),
            params: params.clone(),
        });

        let specific = (self.database.clone(), sql.to_string(), params.clone());
        let generic = (None, sql.to_string(), params);
        let response = state
            .responses
            .get(&specific)
            .or_else(|| state.responses.get(&generic))
            .cloned();

        match response {
            Some(Response::Rows(rows)) => Ok(Box::new(rows.into_iter().map(|row| {
                row.map_err(|message| GatherError::Iterate { message })
            }))),
            Some(Response::Fail(message)) => Err(GatherError::Query {
                query: sql.trim().to_string(),
                message,
            }),
            None => Err(GatherError::Query {
                query: sql.trim().to_string(),
                message: "no response scripted".to_string(),
            }),
        }
    }
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        let mut state = self.state.borrow_mut();
        state.open -= 1;
        state.events.push(MockEvent::Close {
            database: self.database.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::Value;
    use crate::error::ErrorKind;

    fn row(n: i64) -> SqlRow {
        SqlRow::from_pairs([("n", Value::Int(n))])
    }

    #[test]
    fn test_mock_driver_tracks_connection_lifetime() {
        let mut driver = MockDriver::new();
        {
            let _conn = driver.connect("host=db1", Some("app")).unwrap();
            assert_eq!(driver.open_connections(), 1);
        }
        assert_eq!(driver.open_connections(), 0);
        assert_eq!(
            driver.events(),
            vec![
                MockEvent::Connect {
                    address: "host=db1".to_string(),
                    database: Some("app".to_string()),
                },
                MockEvent::Close {
                    database: Some("app".to_string()),
                },
            ]
        );
    }

    #[test]
    fn test_mock_driver_database_specific_response_wins() {
        let mut driver = MockDriver::new();
        driver.on_query("SELECT n", vec![row(1)]);
        driver.on_database_query("app", "SELECT n", vec![row(2), row(3)]);

        let mut conn = driver.connect("host=db1", Some("app")).unwrap();
        let rows: Vec<_> = conn.query("SELECT n", &[]).unwrap().collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].as_ref().unwrap().int(0).unwrap(), 2);

        let mut other = driver.connect("host=db1", Some("other")).unwrap();
        let rows: Vec<_> = other.query("SELECT n", &[]).unwrap().collect();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_mock_driver_unscripted_query_fails() {
        let mut driver = MockDriver::new();
        let mut conn = driver.connect("host=db1", None).unwrap();
        let err = conn.query("SELECT 1", &[]).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Query);
    }

    #[test]
    fn test_mock_driver_iteration_fault_after_rows() {
        let mut driver = MockDriver::new();
        driver.fail_after_rows("SELECT n", vec![row(1)], "server closed the connection");
        let mut conn = driver.connect("host=db1", None).unwrap();
        let rows: Vec<_> = conn.query("SELECT n", &[]).unwrap().collect();
        assert!(rows[0].is_ok());
        assert_eq!(rows[1].as_ref().unwrap_err().kind(), ErrorKind::Iterate);
    }

    #[test]
    fn test_mock_driver_refused_database() {
        let mut driver = MockDriver::new();
        driver.refuse_database("gone");
        let err = driver.connect("host=db1", Some("gone")).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Connect);
        assert_eq!(driver.connect_count(), 0);
    }
}
