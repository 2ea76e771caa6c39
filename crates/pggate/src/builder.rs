//! Caller-facing fluent query builder.
//!
//! A [`QueryBuilder`] accumulates one request and sends it through a [`Transport`] when
//! [`execute`](QueryBuilder::execute) is awaited. Nothing is validated or sent before that.
//!
//! # Example
//!
//! ```ignore
//! use pggate::{GatewayClient, SessionContext};
//!
//! let transport = gateway.with_session(SessionContext::new().with("app.user_id", "42"));
//! let client = GatewayClient::new(transport);
//!
//! let result = client
//!     .from("widgets")
//!     .select("id, name, created_at")
//!     .eq("status", "open")
//!     .order("created_at", false)
//!     .limit(5)
//!     .execute()
//!     .await;
//! if let Some(err) = &result.error {
//!     eprintln!("{}", err.message);
//! }
//! ```

use crate::error::{GatewayError, GatewayResult};
use crate::filter::{FilterOp, TableFilter};
use crate::pool::ConnectionProvider;
use crate::request::{
    Action, CountMode, OrderSpec, QueryRequest, QueryResponse, ResponseError, RowObject,
    RowValues, RpcRequest, TableQuery,
};
use crate::router::SessionGateway;
use crate::session::SessionApplier;
use crate::value::Scalar;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::sync::Arc;

/// Delivers a request to a router and returns its response.
///
/// `Err` means the request never got a response (for example a broken connection to a remote
/// router); failures the router reports arrive as `Ok` with `error` set.
pub trait Transport: Send + Sync {
    fn send(
        &self,
        request: QueryRequest,
    ) -> impl std::future::Future<Output = GatewayResult<QueryResponse>> + Send;
}

impl<P: ConnectionProvider, S: SessionApplier> Transport for SessionGateway<'_, P, S> {
    async fn send(&self, request: QueryRequest) -> GatewayResult<QueryResponse> {
        Ok(self.gateway.run_query(request, &self.session).await)
    }
}

impl<T: Transport> Transport for &T {
    fn send(
        &self,
        request: QueryRequest,
    ) -> impl std::future::Future<Output = GatewayResult<QueryResponse>> + Send {
        (*self).send(request)
    }
}

impl<T: Transport> Transport for Arc<T> {
    fn send(
        &self,
        request: QueryRequest,
    ) -> impl std::future::Future<Output = GatewayResult<QueryResponse>> + Send {
        (**self).send(request)
    }
}

/// The public result shape: `data`, `count` and `error`.
///
/// Check `error` before trusting `data`.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub data: JsonValue,
    pub count: Option<i64>,
    pub error: Option<ResponseError>,
}

impl QueryResult {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// `data` on success, `error` otherwise.
    pub fn into_result(self) -> Result<JsonValue, ResponseError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.data),
        }
    }

    /// Deserialize `data` into `T`, e.g. `Vec<Widget>` or `Option<Widget>`.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.data)
    }
}

impl From<QueryResponse> for QueryResult {
    fn from(resp: QueryResponse) -> Self {
        Self {
            data: resp.data,
            count: resp.count,
            error: resp.error,
        }
    }
}

impl From<GatewayError> for QueryResult {
    fn from(err: GatewayError) -> Self {
        QueryResponse::failure(err).into()
    }
}

async fn deliver<T: Transport>(transport: &T, request: QueryRequest) -> QueryResult {
    match transport.send(request).await {
        Ok(resp) => resp.into(),
        Err(err) => {
            tracing::warn!(error = %err, "transport failure");
            QueryResult::from(err)
        }
    }
}

/// Entry point: one client per transport.
#[derive(Debug, Clone)]
pub struct GatewayClient<T> {
    transport: T,
}

impl<T: Transport> GatewayClient<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Start a request against `table`. Without an action call it runs as `select *`.
    pub fn from(&self, table: impl Into<String>) -> QueryBuilder<'_, T> {
        QueryBuilder {
            transport: &self.transport,
            action: Action::Select,
            query: TableQuery::new(table),
        }
    }

    /// Start a stored-procedure call.
    pub fn rpc<K, V>(
        &self,
        function: impl Into<String>,
        args: impl IntoIterator<Item = (K, V)>,
    ) -> RpcBuilder<'_, T>
    where
        K: Into<String>,
        V: Into<Scalar>,
    {
        let mut request = RpcRequest::new(function);
        for (k, v) in args {
            request.args.insert(k.into(), v.into());
        }
        RpcBuilder {
            transport: &self.transport,
            request,
        }
    }
}

/// Fluent builder for one table request.
#[must_use = "a query builder does nothing until `execute` is awaited"]
#[derive(Debug, Clone)]
pub struct QueryBuilder<'a, T> {
    transport: &'a T,
    action: Action,
    query: TableQuery,
}

impl<'a, T: Transport> QueryBuilder<'a, T> {
    // ==================== actions ====================

    /// Select `columns` (a comma-separated projection list; empty means `*`).
    ///
    /// After `insert`, `update` or `delete` this keeps the write action: only the projection is
    /// recorded, and writes still return every column.
    pub fn select(mut self, columns: &str) -> Self {
        self.query.columns = Some(columns.to_string());
        self
    }

    /// Select `columns` and also report the exact number of matching rows in `count`.
    pub fn select_with_count(mut self, columns: &str) -> Self {
        self = self.select(columns);
        self.query.count = Some(CountMode::Exact);
        self
    }

    /// Insert one row or a batch.
    pub fn insert(mut self, values: impl Into<RowValues>) -> Self {
        self.action = Action::Insert;
        self.query.values = Some(values.into());
        self
    }

    /// Update matching rows with one set of values.
    pub fn update(mut self, values: RowObject) -> Self {
        self.action = Action::Update;
        self.query.values = Some(RowValues::One(values));
        self
    }

    pub fn delete(mut self) -> Self {
        self.action = Action::Delete;
        self
    }

    // ==================== filters ====================

    /// Add a filter term by operator.
    pub fn filter(mut self, column: &str, op: FilterOp, value: impl Into<Scalar>) -> Self {
        self.query.filters.push(TableFilter::new(column, op, value));
        self
    }

    pub fn eq(self, column: &str, value: impl Into<Scalar>) -> Self {
        self.filter(column, FilterOp::Eq, value)
    }

    pub fn neq(self, column: &str, value: impl Into<Scalar>) -> Self {
        self.filter(column, FilterOp::Neq, value)
    }

    pub fn gt(self, column: &str, value: impl Into<Scalar>) -> Self {
        self.filter(column, FilterOp::Gt, value)
    }

    pub fn gte(self, column: &str, value: impl Into<Scalar>) -> Self {
        self.filter(column, FilterOp::Gte, value)
    }

    pub fn lt(self, column: &str, value: impl Into<Scalar>) -> Self {
        self.filter(column, FilterOp::Lt, value)
    }

    pub fn lte(self, column: &str, value: impl Into<Scalar>) -> Self {
        self.filter(column, FilterOp::Lte, value)
    }

    /// `column = ANY(values)`.
    pub fn in_<V: Into<Scalar>>(self, column: &str, values: impl IntoIterator<Item = V>) -> Self {
        let list = Scalar::List(values.into_iter().map(Into::into).collect());
        self.filter(column, FilterOp::In, list)
    }

    /// Alias of [`in_`](Self::in_).
    pub fn in_list<V: Into<Scalar>>(
        self,
        column: &str,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.in_(column, values)
    }

    /// `IS NULL` for a falsy value, `IS NOT NULL` otherwise.
    pub fn is(self, column: &str, value: impl Into<Scalar>) -> Self {
        self.filter(column, FilterOp::Is, value)
    }

    /// Pattern match; `%` and `_` are not added for you.
    pub fn like(self, column: &str, pattern: &str) -> Self {
        self.filter(column, FilterOp::Like, pattern)
    }

    pub fn ilike(self, column: &str, pattern: &str) -> Self {
        self.filter(column, FilterOp::Ilike, pattern)
    }

    // ==================== shaping ====================

    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        self.query.order.push(OrderSpec::new(column, ascending));
        self
    }

    pub fn limit(mut self, n: i64) -> Self {
        self.query.limit = Some(n);
        self
    }

    /// Expect exactly one row; `data` becomes that row.
    pub fn single(mut self) -> Self {
        self.query.single = true;
        self
    }

    /// Expect zero or one row; `data` becomes the row or `null`.
    pub fn maybe_single(mut self) -> Self {
        self.query.maybe_single = true;
        self
    }

    // ==================== terminal ====================

    /// The request this builder would send.
    pub fn to_request(&self) -> QueryRequest {
        let query = self.query.clone();
        match self.action {
            Action::Insert => QueryRequest::Insert(query),
            Action::Update => QueryRequest::Update(query),
            Action::Delete => QueryRequest::Delete(query),
            Action::Select | Action::Rpc => QueryRequest::Select(query),
        }
    }

    /// Send the request and unwrap the response. Never fails: transport errors land in `error`.
    pub async fn execute(self) -> QueryResult {
        let request = self.to_request();
        deliver(self.transport, request).await
    }
}

/// Builder for one stored-procedure call.
#[must_use = "an rpc builder does nothing until `execute` is awaited"]
#[derive(Debug, Clone)]
pub struct RpcBuilder<'a, T> {
    transport: &'a T,
    request: RpcRequest,
}

impl<T: Transport> RpcBuilder<'_, T> {
    /// Add or replace a named argument.
    pub fn arg(mut self, name: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.request.args.insert(name.into(), value.into());
        self
    }

    pub fn to_request(&self) -> QueryRequest {
        QueryRequest::Rpc(self.request.clone())
    }

    pub async fn execute(self) -> QueryResult {
        deliver(self.transport, QueryRequest::Rpc(self.request)).await
    }
}
