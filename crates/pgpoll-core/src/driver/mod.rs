//! Database boundary.
//!
//! The gather engine only talks to a [`Driver`] that opens [`Connection`]s
//! and a [`Connection`] that yields driver-neutral [`SqlRow`]s. Two drivers
//! ship with the crate:
//!
//! ```text
//!                 ┌────────────┐
//!                 │  Gatherer  │
//!                 └─────┬──────┘
//!                       │
//!                ┌──────▼──────┐
//!                │   Driver    │ (trait)
//!                └──────┬──────┘
//!              ┌────────┴────────┐
//!       ┌──────▼──────┐   ┌──────▼──────┐
//!       │  PgDriver   │   │ MockDriver  │
//!       │ (postgres)  │   │  (Testing)  │
//!       └─────────────┘   └─────────────┘
//! ```
//!
//! Connections are released when dropped, so every exit path of a pass
//! (success, scan error, early abort) closes them.

pub mod mock;
mod pg;
mod row;

pub use pg::{PgConnection, PgDriver};
pub use mock::MockDriver;
pub use row::{SqlRow, Value};

use crate::error::GatherError;

/// Result rows of a query. Each item may fail independently, which is how
/// iteration faults surface.
pub type Rows<'a> = Box<dyn Iterator<Item = Result<SqlRow, GatherError>> + 'a>;

/// Opens connections.
pub trait Driver {
    type Conn: Connection;

    /// Connects to `address`. When `database` is given it replaces whatever
    /// database the address names.
    fn connect(&mut self, address: &str, database: Option<&str>)
    -> Result<Self::Conn, GatherError>;
}

/// An open connection.
pub trait Connection {
    /// Executes `sql` with text parameters bound to `$1..$n`.
    fn query(&mut self, sql: &str, params: &[&str]) -> Result<Rows<'_>, GatherError>;
}
