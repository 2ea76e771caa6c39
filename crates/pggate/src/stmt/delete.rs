use super::{Statement, push_clause, shape_rows};
use crate::client::GenericClient;
use crate::error::GatewayResult;
use crate::filter::build_where;
use crate::ident::quote_identifier;
use crate::request::{QueryResponse, TableQuery};

/// Build `DELETE FROM {table} [WHERE ..] RETURNING *`. No filters means every row.
pub fn build_delete(query: &TableQuery) -> GatewayResult<Statement> {
    let table = quote_identifier(&query.table)?;
    let filter = build_where(&query.filters, 1)?;

    let mut sql = format!("DELETE FROM {table}");
    push_clause(&mut sql, &filter.clause);
    sql.push_str(" RETURNING *");
    Ok(Statement::new(sql, filter.values))
}

/// Run a delete and return the deleted rows.
pub async fn run_delete(
    client: &impl GenericClient,
    query: &TableQuery,
) -> GatewayResult<QueryResponse> {
    let stmt = build_delete(query)?;
    if query.filters.is_empty() {
        tracing::warn!(table = %query.table, "delete without filters affects every row");
    }
    let rows = client.query(&stmt.sql, &stmt.params).await?;
    shape_rows(rows, query)
}
