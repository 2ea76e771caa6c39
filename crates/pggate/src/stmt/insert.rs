use super::{Statement, shape_rows};
use crate::client::GenericClient;
use crate::error::{GatewayError, GatewayResult};
use crate::ident::{QuotedIdentifier, quote_identifier};
use crate::request::{QueryResponse, TableQuery};

/// Build one multi-row `INSERT INTO {table} (..) VALUES (..), (..) RETURNING *`.
///
/// The column list is the first row's keys, in order. Every other row must carry exactly the
/// same key set, else [`GatewayError::InvalidInsertPayload`]. Placeholder for row `r`, column `c`
/// is `$(r * columns + c + 1)`.
pub fn build_insert(query: &TableQuery) -> GatewayResult<Statement> {
    let table = quote_identifier(&query.table)?;
    let rows = query.values.as_ref().map(|v| v.rows()).unwrap_or_default();
    let Some(first) = rows.first() else {
        return Err(GatewayError::EmptyInsert);
    };
    if first.is_empty() {
        return Err(GatewayError::EmptyInsert);
    }

    let keys: Vec<&str> = first.keys().collect();
    let columns = keys
        .iter()
        .map(|k| quote_identifier(k).map(|q| q.to_sql()))
        .collect::<GatewayResult<Vec<_>>>()?;

    for (idx, row) in rows.iter().enumerate().skip(1) {
        let same_keys = row.len() == keys.len() && keys.iter().all(|k| row.get(k).is_some());
        if !same_keys {
            return Err(GatewayError::InvalidInsertPayload(format!(
                "row {idx} columns ({}) differ from the first row ({})",
                row.keys().collect::<Vec<_>>().join(", "),
                keys.join(", ")
            )));
        }
    }

    let mut params = Vec::with_capacity(rows.len() * keys.len());
    let mut tuples = Vec::with_capacity(rows.len());
    for (r, row) in rows.iter().enumerate() {
        let placeholders: Vec<String> = (0..keys.len())
            .map(|c| format!("${}", r * keys.len() + c + 1))
            .collect();
        tuples.push(format!("({})", placeholders.join(", ")));
        // Key presence was checked above.
        params.extend(keys.iter().filter_map(|k| row.get(k).cloned()));
    }

    Ok(Statement::new(
        insert_sql(&table, &columns, &tuples),
        params,
    ))
}

fn insert_sql(table: &QuotedIdentifier, columns: &[String], tuples: &[String]) -> String {
    format!(
        "INSERT INTO {table} ({}) VALUES {} RETURNING *",
        columns.join(", "),
        tuples.join(", ")
    )
}

/// Run an insert and return the inserted rows.
pub async fn run_insert(
    client: &impl GenericClient,
    query: &TableQuery,
) -> GatewayResult<QueryResponse> {
    let stmt = build_insert(query)?;
    let rows = client.query(&stmt.sql, &stmt.params).await?;
    shape_rows(rows, query)
}
