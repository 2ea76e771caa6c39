//! Generic client trait: the `query(sql, params)` seam every statement runs through.

use crate::error::{GatewayError, GatewayResult};
use crate::row::{Record, row_to_record};
use crate::value::Scalar;
use tokio_postgres::types::ToSql;

/// A database connection the gateway can run statements on.
///
/// Implemented for plain clients, transactions and pooled clients, so statement builders take
/// whichever the caller holds. Rows come back already normalized to [`Record`]s.
pub trait GenericClient: Send + Sync {
    /// Execute a statement with positional `$n` parameters and return all rows.
    fn query(
        &self,
        sql: &str,
        params: &[Scalar],
    ) -> impl std::future::Future<Output = GatewayResult<Vec<Record>>> + Send;

    /// Return a cancellation token for the underlying connection, if supported.
    ///
    /// Used for best-effort server-side cancellation when a request times out.
    fn cancel_token(&self) -> Option<tokio_postgres::CancelToken> {
        None
    }
}

fn param_refs(params: &[Scalar]) -> Vec<&(dyn ToSql + Sync)> {
    params.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
}

fn records(rows: Vec<tokio_postgres::Row>) -> GatewayResult<Vec<Record>> {
    rows.iter().map(row_to_record).collect()
}

impl GenericClient for tokio_postgres::Client {
    async fn query(&self, sql: &str, params: &[Scalar]) -> GatewayResult<Vec<Record>> {
        let refs = param_refs(params);
        let rows = tokio_postgres::Client::query(self, sql, &refs)
            .await
            .map_err(GatewayError::from_db_error)?;
        records(rows)
    }

    fn cancel_token(&self) -> Option<tokio_postgres::CancelToken> {
        Some(tokio_postgres::Client::cancel_token(self))
    }
}

impl GenericClient for tokio_postgres::Transaction<'_> {
    async fn query(&self, sql: &str, params: &[Scalar]) -> GatewayResult<Vec<Record>> {
        let refs = param_refs(params);
        let rows = tokio_postgres::Transaction::query(self, sql, &refs)
            .await
            .map_err(GatewayError::from_db_error)?;
        records(rows)
    }

    fn cancel_token(&self) -> Option<tokio_postgres::CancelToken> {
        Some(tokio_postgres::Transaction::cancel_token(self))
    }
}

// ===== deadpool-postgres support =====

#[cfg(feature = "pool")]
impl GenericClient for deadpool_postgres::Client {
    async fn query(&self, sql: &str, params: &[Scalar]) -> GatewayResult<Vec<Record>> {
        // Object -> ClientWrapper -> tokio_postgres::Client
        GenericClient::query(&***self, sql, params).await
    }

    fn cancel_token(&self) -> Option<tokio_postgres::CancelToken> {
        GenericClient::cancel_token(&***self)
    }
}

impl<C: GenericClient> GenericClient for &C {
    fn query(
        &self,
        sql: &str,
        params: &[Scalar],
    ) -> impl std::future::Future<Output = GatewayResult<Vec<Record>>> + Send {
        (*self).query(sql, params)
    }

    fn cancel_token(&self) -> Option<tokio_postgres::CancelToken> {
        (*self).cancel_token()
    }
}

