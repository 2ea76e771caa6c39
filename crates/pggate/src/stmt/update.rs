use super::{Statement, push_clause, shape_rows};
use crate::client::GenericClient;
use crate::error::{GatewayError, GatewayResult};
use crate::filter::build_where;
use crate::ident::quote_identifier;
use crate::request::{QueryResponse, RowValues, TableQuery};

/// Build `UPDATE {table} SET "a" = $1, .. [WHERE ..] RETURNING *`.
///
/// The filter placeholders continue after the `SET` list. No filters means every row.
pub fn build_update(query: &TableQuery) -> GatewayResult<Statement> {
    let table = quote_identifier(&query.table)?;
    let values = match &query.values {
        Some(RowValues::One(row)) => row,
        Some(RowValues::Many(_)) => {
            return Err(GatewayError::InvalidUpdatePayload(
                "update takes a single object, not an array".to_string(),
            ));
        }
        None => {
            return Err(GatewayError::InvalidUpdatePayload(
                "no values to update".to_string(),
            ));
        }
    };
    if values.is_empty() {
        return Err(GatewayError::InvalidUpdatePayload(
            "no columns to update".to_string(),
        ));
    }

    let mut sets = Vec::with_capacity(values.len());
    let mut params = Vec::with_capacity(values.len() + query.filters.len());
    for (i, (column, value)) in values.iter().enumerate() {
        sets.push(format!("{} = ${}", quote_identifier(column)?, i + 1));
        params.push(value.clone());
    }

    let filter = build_where(&query.filters, params.len() + 1)?;
    let mut sql = format!("UPDATE {table} SET {}", sets.join(", "));
    push_clause(&mut sql, &filter.clause);
    sql.push_str(" RETURNING *");
    params.extend(filter.values);

    Ok(Statement::new(sql, params))
}

/// Run an update and return the updated rows.
pub async fn run_update(
    client: &impl GenericClient,
    query: &TableQuery,
) -> GatewayResult<QueryResponse> {
    let stmt = build_update(query)?;
    if query.filters.is_empty() {
        tracing::warn!(table = %query.table, "update without filters affects every row");
    }
    let rows = client.query(&stmt.sql, &stmt.params).await?;
    shape_rows(rows, query)
}
