//! # pggate
//!
//! An allow-listed, parameterized PostgreSQL query gateway.
//!
//! Callers describe a single-table request declaratively (`select`/`insert`/`update`/`delete`
//! with filters, ordering and a limit, or an `rpc` call to an allow-listed stored procedure).
//! The gateway turns it into one parameterized statement and returns a normalized
//! `{ data, count, error }` response.
//!
//! ## Features
//!
//! - **Identifiers are validated, values are bound**: table, column and argument names must be
//!   `[A-Za-z0-9_.]+` and are emitted double-quoted; every value is a `$n` placeholder
//! - **Allow-lists**: tables come from configuration at startup, functions are compiled in;
//!   both are checked before any SQL is built or any connection is taken
//! - **Scoped connections**: one pooled connection per request, released on every exit path
//! - **Session context**: per-request settings (`app.user_id`, ...) for row-level security
//! - **Uniform errors**: callers always get `{ data, error }`, never a raw driver error
//!
//! ## Client builder
//!
//! ```ignore
//! use pggate::{Gateway, GatewayClient, RowObject, SessionContext, TableAllowList, create_pool};
//!
//! let gateway = Gateway::new(create_pool(&url)?, TableAllowList::new(["widgets"])?);
//! let client = GatewayClient::new(gateway.with_session(SessionContext::new()));
//!
//! // SELECT
//! let open = client
//!     .from("widgets")
//!     .select("id, name")
//!     .eq("status", "open")
//!     .order("created_at", false)
//!     .limit(5)
//!     .execute()
//!     .await;
//!
//! // INSERT
//! let inserted = client
//!     .from("widgets")
//!     .insert(vec![RowObject::new().set("name", "a"), RowObject::new().set("name", "b")])
//!     .execute()
//!     .await;
//!
//! // RPC
//! let nearby = client
//!     .rpc("get_reports_within_radius", [("lat", 1.0), ("lng", 2.0), ("radius_km", 5.0)])
//!     .execute()
//!     .await;
//! ```

pub mod allowlist;
pub mod builder;
pub mod client;
pub mod config;
pub mod error;
pub mod filter;
pub mod ident;
pub mod pool;
pub mod request;
pub mod router;
pub mod row;
pub mod rpc;
pub mod session;
pub mod stmt;
pub mod value;

pub use allowlist::{AllowLists, DEFAULT_RPC_FUNCTIONS, FunctionAllowList, TableAllowList};
pub use builder::{GatewayClient, QueryBuilder, QueryResult, RpcBuilder, Transport};
pub use client::GenericClient;
pub use config::GatewayConfig;
pub use error::{GatewayError, GatewayResult};
pub use filter::{FilterOp, TableFilter, WhereClause, build_where};
pub use ident::{QuotedIdentifier, quote_identifier, sanitize_columns};
pub use pool::ConnectionProvider;
pub use request::{
    Action, CountMode, OrderSpec, QueryRequest, QueryResponse, ResponseError, RowObject,
    RowValues, RpcRequest, TableQuery,
};
pub use router::{CancelFuture, Gateway, SessionGateway, plan_request};
pub use row::{Record, RecordExt};
pub use rpc::{build_rpc, run_rpc};
pub use session::{SessionApplier, SessionContext, SetConfigApplier};
pub use stmt::Statement;
pub use value::Scalar;

#[cfg(feature = "pool")]
pub use pool::{
    PgPool, PoolOptions, create_pool, create_pool_from_config, create_pool_with_config,
};
