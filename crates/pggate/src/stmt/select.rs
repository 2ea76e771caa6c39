//! SELECT, with the optional exact-count companion query.

use super::{Statement, push_clause, shape_rows};
use crate::client::GenericClient;
use crate::error::{GatewayError, GatewayResult};
use crate::filter::build_where;
use crate::ident::{quote_identifier, sanitize_columns};
use crate::request::{QueryResponse, TableQuery};
use crate::row::RecordExt;
use crate::value::Scalar;

/// Build `SELECT {columns} FROM {table} [WHERE ..] [ORDER BY ..] [LIMIT $k]`.
///
/// Filter values are bound first; the limit, when present, is the last placeholder.
pub fn build_select(query: &TableQuery) -> GatewayResult<Statement> {
    let table = quote_identifier(&query.table)?;
    let columns = sanitize_columns(query.columns.as_deref())?;
    let filter = build_where(&query.filters, 1)?;
    let order = super::build_order(&query.order)?;

    let mut sql = format!("SELECT {columns} FROM {table}");
    push_clause(&mut sql, &filter.clause);
    push_clause(&mut sql, &order);

    let mut params = filter.values;
    if let Some(limit) = query.limit {
        if limit < 0 {
            return Err(GatewayError::InvalidFilter(format!(
                "limit must be non-negative, got {limit}"
            )));
        }
        params.push(Scalar::Int(limit));
        sql.push_str(&format!(" LIMIT ${}", params.len()));
    }

    Ok(Statement::new(sql, params))
}

/// Build `SELECT COUNT(*) FROM {table} [WHERE ..]` with the same filter clause and values as
/// [`build_select`].
pub fn build_count(query: &TableQuery) -> GatewayResult<Statement> {
    let table = quote_identifier(&query.table)?;
    let filter = build_where(&query.filters, 1)?;

    let mut sql = format!("SELECT COUNT(*) FROM {table}");
    push_clause(&mut sql, &filter.clause);
    Ok(Statement::new(sql, filter.values))
}

/// Run a select, then the count query when `count: "exact"` is requested.
///
/// Both statements are built before either runs, so a malformed request never reaches the
/// database. The count is a second round trip on the same connection and is not transactionally
/// tied to the row query.
pub async fn run_select(
    client: &impl GenericClient,
    query: &TableQuery,
) -> GatewayResult<QueryResponse> {
    let stmt = build_select(query)?;
    let count_stmt = query.count.map(|_| build_count(query)).transpose()?;

    let rows = client.query(&stmt.sql, &stmt.params).await?;
    let response = shape_rows(rows, query)?;

    let Some(count_stmt) = count_stmt else {
        return Ok(response);
    };
    let count_rows = client.query(&count_stmt.sql, &count_stmt.params).await?;
    let count = count_rows
        .first()
        .and_then(|row| row.get_i64("count"))
        .ok_or_else(|| GatewayError::decode("count", "count query returned no integer"))?;
    Ok(response.with_count(Some(count)))
}
