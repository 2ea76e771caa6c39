//! Statement builders for the four table actions.
//!
//! Each builder comes in two halves:
//!
//! - a pure `build_*` function that validates the request and renders one parameterized
//!   [`Statement`], without touching a database;
//! - an async `run_*` function that executes the statement on a [`GenericClient`] and shapes the
//!   rows into a [`QueryResponse`].
//!
//! # Usage
//!
//! ```ignore
//! use pggate::request::TableQuery;
//! use pggate::stmt::build_select;
//!
//! let mut q = TableQuery::new("widgets");
//! q.limit = Some(5);
//! let stmt = build_select(&q)?;
//! assert_eq!(stmt.sql, r#"SELECT * FROM "widgets" LIMIT $1"#);
//! ```
//!
//! [`GenericClient`]: crate::client::GenericClient

mod delete;
mod insert;
mod order;
mod select;
mod update;


pub use delete::{build_delete, run_delete};
pub use insert::{build_insert, run_insert};
pub use order::build_order;
pub use select::{build_count, build_select, run_select};
pub use update::{build_update, run_update};

use crate::error::{GatewayError, GatewayResult};
use crate::request::{QueryResponse, TableQuery};
use crate::row::Record;
use crate::value::Scalar;
use std::fmt;

/// One SQL statement and the values bound to its `$n` placeholders, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Scalar>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, params: Vec<Scalar>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// Apply `single`/`maybeSingle` to a result set.
///
/// `single` wants exactly one row; zero and several rows fail alike. `maybeSingle` returns the
/// row or `null`, failing only on several rows. Without either flag the rows come back as a list.
pub(crate) fn shape_rows(rows: Vec<Record>, query: &TableQuery) -> GatewayResult<QueryResponse> {
    if query.single {
        if rows.len() != 1 {
            return Err(GatewayError::UnexpectedRowCount {
                expected: "exactly 1",
                got: rows.len(),
            });
        }
        return Ok(QueryResponse::row(rows.into_iter().next()));
    }
    if query.maybe_single {
        if rows.len() > 1 {
            return Err(GatewayError::UnexpectedRowCount {
                expected: "at most 1",
                got: rows.len(),
            });
        }
        return Ok(QueryResponse::row(rows.into_iter().next()));
    }
    Ok(QueryResponse::rows(rows))
}

/// Append ` {clause}` when the clause is non-empty.
pub(crate) fn push_clause(sql: &mut String, clause: &str) {
    if !clause.is_empty() {
        sql.push(' ');
        sql.push_str(clause);
    }
}
