//! Stored-procedure calls with named arguments.

use crate::allowlist::FunctionAllowList;
use crate::client::GenericClient;
use crate::error::GatewayResult;
use crate::ident::quote_identifier;
use crate::request::{QueryResponse, RpcRequest};
use crate::stmt::Statement;

/// Build `SELECT * FROM "fn"("a" := $1, "b" := $2)`.
///
/// Arguments are bound in the map's (sorted) key order. The function must be allow-listed; the
/// check runs before anything else.
pub fn build_rpc(request: &RpcRequest, functions: &FunctionAllowList) -> GatewayResult<Statement> {
    functions.check(&request.function_name)?;
    let function = quote_identifier(&request.function_name)?;

    let mut args = Vec::with_capacity(request.args.len());
    let mut params = Vec::with_capacity(request.args.len());
    for (i, (name, value)) in request.args.iter().enumerate() {
        args.push(format!("{} := ${}", quote_identifier(name)?, i + 1));
        params.push(value.clone());
    }

    Ok(Statement::new(
        format!("SELECT * FROM {function}({})", args.join(", ")),
        params,
    ))
}

/// Run an allow-listed function and return all its rows.
pub async fn run_rpc(
    client: &impl GenericClient,
    request: &RpcRequest,
    functions: &FunctionAllowList,
) -> GatewayResult<QueryResponse> {
    let stmt = build_rpc(request, functions)?;
    let rows = client.query(&stmt.sql, &stmt.params).await?;
    Ok(QueryResponse::rows(rows))
}
