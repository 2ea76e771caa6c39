//! Request router: allow-list check, connection scope, session setup, dispatch, error shaping.
//!
//! # Example
//!
//! ```ignore
//! use pggate::{Gateway, QueryRequest, SessionContext, TableAllowList, create_pool};
//!
//! let gateway = Gateway::new(create_pool(&url)?, TableAllowList::new(["widgets"])?);
//! let request: QueryRequest = serde_json::from_str(
//!     r#"{"action":"select","table":"widgets","limit":5}"#,
//! )?;
//! let session = SessionContext::new().with("app.user_id", "42");
//! let response = gateway.run_query(request, &session).await;
//! ```

use crate::allowlist::{AllowLists, FunctionAllowList, TableAllowList};
use crate::client::GenericClient;
use crate::config::GatewayConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::pool::ConnectionProvider;
use crate::request::{QueryRequest, QueryResponse};
use crate::row::Record;
use crate::rpc::{build_rpc, run_rpc};
use crate::session::{SessionApplier, SessionContext, SetConfigApplier};
use crate::stmt::{
    Statement, build_count, build_delete, build_insert, build_select, build_update, run_delete,
    run_insert, run_select, run_update,
};
use crate::value::Scalar;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_postgres::tls::{MakeTlsConnect, TlsConnect};
use tokio_postgres::{CancelToken, NoTls, Socket};

/// Default byte length SQL is truncated to in log events.
pub const DEFAULT_MAX_SQL_LOG_LENGTH: usize = 200;

pub(crate) fn truncate_sql_bytes(sql: &str, max_bytes: usize) -> &str {
    if sql.len() <= max_bytes {
        return sql;
    }
    let mut end = max_bytes;
    while end > 0 && !sql.is_char_boundary(end) {
        end -= 1;
    }
    &sql[..end]
}

fn log_sql(sql: &str, max_len: usize) -> String {
    if sql.len() > max_len {
        format!("{}...", truncate_sql_bytes(sql, max_len))
    } else {
        sql.to_string()
    }
}

/// Validate a request and render every statement it would run, without a database.
///
/// Runs the same allow-list check and builders as [`Gateway::run_query`]. A `count: "exact"`
/// select renders two statements.
pub fn plan_request(request: &QueryRequest, lists: &AllowLists) -> GatewayResult<Vec<Statement>> {
    lists.check(request)?;
    Ok(match request {
        QueryRequest::Select(q) => {
            let mut stmts = vec![build_select(q)?];
            if q.count.is_some() {
                stmts.push(build_count(q)?);
            }
            stmts
        }
        QueryRequest::Insert(q) => vec![build_insert(q)?],
        QueryRequest::Update(q) => vec![build_update(q)?],
        QueryRequest::Delete(q) => vec![build_delete(q)?],
        QueryRequest::Rpc(r) => vec![build_rpc(r, &lists.functions)?],
    })
}

/// Future returned by a [`Gateway::cancel_with`] hook.
pub type CancelFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Sends the server-side cancel for a request that hit the query timeout.
type CancelHook = Arc<dyn Fn(CancelToken) -> CancelFuture + Send + Sync>;

fn cancel_over<T>(tls: T) -> CancelHook
where
    T: MakeTlsConnect<Socket> + Clone + Send + Sync + 'static,
    T::Stream: Sync + Send,
    T::TlsConnect: Sync + Send,
    <T::TlsConnect as TlsConnect<Socket>>::Future: Send,
{
    Arc::new(move |token: CancelToken| -> CancelFuture {
        let tls = tls.clone();
        Box::pin(async move {
            if let Err(e) = token.cancel_query(tls).await {
                tracing::warn!(error = %e, "query cancel request failed");
            }
        })
    })
}

/// Logs every statement on target `pggate.sql`. Parameter values are never logged.
struct SqlLogger<'a, C> {
    client: &'a C,
    max_sql_length: usize,
}

impl<C: GenericClient> GenericClient for SqlLogger<'_, C> {
    async fn query(&self, sql: &str, params: &[Scalar]) -> GatewayResult<Vec<Record>> {
        let start = Instant::now();
        let result = self.client.query(sql, params).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;
        let sql = log_sql(sql, self.max_sql_length);
        match &result {
            Ok(rows) => tracing::debug!(
                target: "pggate.sql",
                sql = %sql,
                param_count = params.len(),
                rows = rows.len(),
                elapsed_ms,
                "query"
            ),
            Err(e) => tracing::debug!(
                target: "pggate.sql",
                sql = %sql,
                param_count = params.len(),
                elapsed_ms,
                error = %e,
                "query failed"
            ),
        }
        result
    }

    fn cancel_token(&self) -> Option<tokio_postgres::CancelToken> {
        self.client.cancel_token()
    }
}

/// The server side of the gateway.
///
/// Holds the connection provider and the frozen allow-lists; requests share nothing else, so a
/// `Gateway` can serve concurrent requests through `&self`.
pub struct Gateway<P, S = SetConfigApplier> {
    provider: P,
    lists: AllowLists,
    applier: S,
    query_timeout: Option<Duration>,
    cancel: CancelHook,
    max_sql_log_length: usize,
}

impl<P: ConnectionProvider> Gateway<P> {
    /// A gateway over `tables` and the default RPC functions.
    pub fn new(provider: P, tables: TableAllowList) -> Self {
        Self {
            provider,
            lists: AllowLists::new(tables, FunctionAllowList::default()),
            applier: SetConfigApplier,
            query_timeout: None,
            cancel: cancel_over(NoTls),
            max_sql_log_length: DEFAULT_MAX_SQL_LOG_LENGTH,
        }
    }

    /// A gateway over `provider` with tables, timeout and log settings taken from `config`.
    pub fn from_config(provider: P, config: &GatewayConfig) -> GatewayResult<Self> {
        config.validate()?;
        Ok(Self::new(provider, config.table_allow_list()?)
            .query_timeout(config.query_timeout_duration())
            .max_sql_log_length(config.gateway.max_sql_log_length))
    }
}

impl<P: ConnectionProvider, S: SessionApplier> Gateway<P, S> {
    /// Replace the function allow-list.
    pub fn functions(mut self, functions: FunctionAllowList) -> Self {
        self.lists.functions = functions;
        self
    }

    /// Replace the session applier.
    pub fn session_applier<S2: SessionApplier>(self, applier: S2) -> Gateway<P, S2> {
        Gateway {
            provider: self.provider,
            lists: self.lists,
            applier,
            query_timeout: self.query_timeout,
            cancel: self.cancel,
            max_sql_log_length: self.max_sql_log_length,
        }
    }

    /// Bound each request (session setup plus statements); `None` disables the bound.
    pub fn query_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Connect over `tls` when cancelling a timed-out query. Without this the cancel request is
    /// sent in plain text, which a server requiring TLS refuses.
    pub fn cancel_tls<T>(mut self, tls: T) -> Self
    where
        T: MakeTlsConnect<Socket> + Clone + Send + Sync + 'static,
        T::Stream: Sync + Send,
        T::TlsConnect: Sync + Send,
        <T::TlsConnect as TlsConnect<Socket>>::Future: Send,
    {
        self.cancel = cancel_over(tls);
        self
    }

    /// Replace how a timed-out query is cancelled on the server.
    pub fn cancel_with(
        mut self,
        hook: impl Fn(CancelToken) -> CancelFuture + Send + Sync + 'static,
    ) -> Self {
        self.cancel = Arc::new(hook);
        self
    }

    /// Truncate SQL in log events to this many bytes.
    pub fn max_sql_log_length(mut self, len: usize) -> Self {
        self.max_sql_log_length = len;
        self
    }

    pub fn allow_lists(&self) -> &AllowLists {
        &self.lists
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Run one request and return the normalized response. Never fails: every error is shaped
    /// into `error`.
    pub async fn run_query(
        &self,
        request: QueryRequest,
        session: &SessionContext,
    ) -> QueryResponse {
        match self.try_run_query(&request, session).await {
            Ok(response) => response,
            Err(err) => {
                if err.is_validation() {
                    tracing::warn!(
                        action = request.action().as_str(),
                        name = request.target(),
                        error = %err,
                        "request rejected"
                    );
                } else if !err.is_row_count() {
                    tracing::error!(
                        action = request.action().as_str(),
                        name = request.target(),
                        error = %err,
                        "request failed"
                    );
                }
                QueryResponse::failure(err)
            }
        }
    }

    /// Run one request, returning errors unshaped.
    ///
    /// The allow-list check and statement validation happen before a connection is acquired.
    /// The connection is dropped, and so released, on every return path.
    pub async fn try_run_query(
        &self,
        request: &QueryRequest,
        session: &SessionContext,
    ) -> GatewayResult<QueryResponse> {
        tracing::debug!(
            action = request.action().as_str(),
            name = request.target(),
            "gateway request"
        );
        plan_request(request, &self.lists)?;
        session.validate()?;

        let conn = self.provider.acquire().await?;
        let client = SqlLogger {
            client: &conn,
            max_sql_length: self.max_sql_log_length,
        };
        let work = async {
            self.applier.apply(&client, session).await?;
            self.dispatch(&client, request).await
        };

        match self.query_timeout {
            Some(timeout) => {
                tokio::pin!(work);
                tokio::select! {
                    result = &mut work => result,
                    _ = tokio::time::sleep(timeout) => {
                        if let Some(cancel_token) = conn.cancel_token() {
                            tokio::spawn((self.cancel)(cancel_token));
                        }
                        Err(GatewayError::Timeout(timeout))
                    }
                }
            }
            None => work.await,
        }
    }

    async fn dispatch<C: GenericClient>(
        &self,
        client: &C,
        request: &QueryRequest,
    ) -> GatewayResult<QueryResponse> {
        match request {
            QueryRequest::Select(q) => run_select(client, q).await,
            QueryRequest::Insert(q) => run_insert(client, q).await,
            QueryRequest::Update(q) => run_update(client, q).await,
            QueryRequest::Delete(q) => run_delete(client, q).await,
            QueryRequest::Rpc(r) => run_rpc(client, r, &self.lists.functions).await,
        }
    }

    /// Bind a fixed session, giving a [`Transport`](crate::builder::Transport) for the client
    /// builder.
    pub fn with_session(&self, session: SessionContext) -> SessionGateway<'_, P, S> {
        SessionGateway {
            gateway: self,
            session,
        }
    }
}

/// A [`Gateway`] paired with the session every request through it runs under.
pub struct SessionGateway<'a, P, S = SetConfigApplier> {
    pub(crate) gateway: &'a Gateway<P, S>,
    pub(crate) session: SessionContext,
}

impl<P, S> SessionGateway<'_, P, S> {
    pub fn session(&self) -> &SessionContext {
        &self.session
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{FilterOp, TableFilter};
    use crate::request::{RpcRequest, TableQuery};

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_sql_bytes("SELECT 1", 100), "SELECT 1");
        assert_eq!(truncate_sql_bytes("SELECT", 3), "SEL");
        // 'é' is two bytes; cutting inside it backs off.
        assert_eq!(truncate_sql_bytes("aé", 2), "a");
        assert_eq!(log_sql("SELECT 1", 3), "SEL...");
    }

    fn lists() -> AllowLists {
        AllowLists::new(
            TableAllowList::new(["widgets"]).unwrap(),
            FunctionAllowList::default(),
        )
    }

    #[test]
    fn plan_renders_count_as_second_statement() {
        let mut q = TableQuery::new("widgets");
        q.filters = vec![TableFilter::new("status", FilterOp::Eq, "open")];
        q.count = Some(crate::request::CountMode::Exact);
        let stmts = plan_request(&QueryRequest::Select(q), &lists()).unwrap();
        assert_eq!(stmts.len(), 2);
        assert!(stmts[1].sql.starts_with("SELECT COUNT(*)"));
    }

    #[test]
    fn plan_checks_allow_lists_first() {
        let mut q = TableQuery::new("secrets");
        q.columns = Some("not valid ;".into());
        assert!(matches!(
            plan_request(&QueryRequest::Select(q), &lists()),
            Err(GatewayError::TableNotAllowed(_))
        ));
        assert!(matches!(
            plan_request(&QueryRequest::Rpc(RpcRequest::new("pg_terminate_backend")), &lists()),
            Err(GatewayError::FunctionNotAllowed(_))
        ));
    }
}
