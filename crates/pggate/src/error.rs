//! Error types for pggate

use std::time::Duration;
use thiserror::Error;

/// Result type alias for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Error types for gateway operations.
///
/// Validation variants are raised before any SQL is built. Everything else comes from
/// acquiring a connection or executing a statement.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Table, column or argument name outside `[A-Za-z0-9_.]`
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Projection list outside the allowed character set
    #[error("Invalid column list: {0}")]
    InvalidColumnList(String),

    /// Table not present in the table allow-list
    #[error("Table not allowed: {0}")]
    TableNotAllowed(String),

    /// Function not present in the function allow-list
    #[error("Function not allowed: {0}")]
    FunctionNotAllowed(String),

    /// Filter operator outside the closed operator set
    #[error("Unsupported operator: {0}")]
    UnsupportedOperator(String),

    /// Filter term with a value of the wrong shape
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// Insert with no rows, or a first row without columns
    #[error("Insert requires at least one row with at least one column")]
    EmptyInsert,

    /// Insert batch whose rows disagree on their column set
    #[error("Invalid insert payload: {0}")]
    InvalidInsertPayload(String),

    /// Update with an array payload or no columns
    #[error("Invalid update payload: {0}")]
    InvalidUpdatePayload(String),

    /// `single`/`maybeSingle` cardinality violation
    #[error("Expected {expected} row(s), got {got}")]
    UnexpectedRowCount { expected: &'static str, got: usize },

    /// Query execution error
    #[error("Query error: {0}")]
    Query(#[from] tokio_postgres::Error),

    /// Unique constraint violation
    #[error("Unique constraint violation: {0}")]
    UniqueViolation(String),

    /// Foreign key constraint violation
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// Check constraint violation
    #[error("Check constraint violation: {0}")]
    CheckViolation(String),

    /// Database connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Pool error
    #[error("Pool error: {0}")]
    Pool(String),

    /// Row decode error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Session context could not be applied
    #[error("Session error: {0}")]
    Session(String),

    /// Query timeout error
    #[error("Query timeout after {0:?}")]
    Timeout(Duration),

    /// Client/router transport failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),
}

impl GatewayError {
    /// Create an invalid identifier error
    pub fn invalid_identifier(name: impl Into<String>) -> Self {
        Self::InvalidIdentifier(name.into())
    }

    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a session error
    pub fn session(message: impl Into<String>) -> Self {
        Self::Session(message.into())
    }

    /// Whether this error was raised before any SQL reached the database.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidIdentifier(_)
                | Self::InvalidColumnList(_)
                | Self::TableNotAllowed(_)
                | Self::FunctionNotAllowed(_)
                | Self::UnsupportedOperator(_)
                | Self::InvalidFilter(_)
                | Self::EmptyInsert
                | Self::InvalidInsertPayload(_)
                | Self::InvalidUpdatePayload(_)
        )
    }

    /// Check if this is a cardinality error from `single`/`maybeSingle`
    pub fn is_row_count(&self) -> bool {
        matches!(self, Self::UnexpectedRowCount { .. })
    }

    /// Check if this is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Stable snake_case code for the response `error.code` field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidIdentifier(_) => "invalid_identifier",
            Self::InvalidColumnList(_) => "invalid_column_list",
            Self::TableNotAllowed(_) => "table_not_allowed",
            Self::FunctionNotAllowed(_) => "function_not_allowed",
            Self::UnsupportedOperator(_) => "unsupported_operator",
            Self::InvalidFilter(_) => "invalid_filter",
            Self::EmptyInsert => "empty_insert",
            Self::InvalidInsertPayload(_) => "invalid_insert_payload",
            Self::InvalidUpdatePayload(_) => "invalid_update_payload",
            Self::UnexpectedRowCount { .. } => "unexpected_row_count",
            Self::Query(_)
            | Self::UniqueViolation(_)
            | Self::ForeignKeyViolation(_)
            | Self::CheckViolation(_)
            | Self::Connection(_)
            | Self::Pool(_)
            | Self::Decode { .. }
            | Self::Session(_)
            | Self::Timeout(_) => "database_query_failed",
            Self::Transport(_) => "transport",
            Self::Config(_) => "config",
        }
    }

    /// Parse a tokio_postgres error into a more specific GatewayError
    pub fn from_db_error(err: tokio_postgres::Error) -> Self {
        if let Some(db_err) = err.as_db_error() {
            let constraint = db_err.constraint().unwrap_or("unknown");
            let message = db_err.message();

            match db_err.code().code() {
                "23505" => return Self::UniqueViolation(format!("{}: {}", constraint, message)),
                "23503" => {
                    return Self::ForeignKeyViolation(format!("{}: {}", constraint, message));
                }
                "23514" => return Self::CheckViolation(format!("{}: {}", constraint, message)),
                _ => {}
            }
        }
        Self::Query(err)
    }
}

#[cfg(feature = "pool")]
impl From<deadpool_postgres::PoolError> for GatewayError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Self::Pool(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_are_classified() {
        assert!(GatewayError::TableNotAllowed("x".into()).is_validation());
        assert!(GatewayError::EmptyInsert.is_validation());
        assert!(!GatewayError::Pool("down".into()).is_validation());
        assert!(!GatewayError::UnexpectedRowCount { expected: "1", got: 2 }.is_validation());
    }

    #[test]
    fn execution_errors_share_a_code() {
        assert_eq!(GatewayError::Pool("x".into()).kind(), "database_query_failed");
        assert_eq!(
            GatewayError::Timeout(Duration::from_secs(1)).kind(),
            "database_query_failed"
        );
        assert_eq!(
            GatewayError::FunctionNotAllowed("drop_all".into()).kind(),
            "function_not_allowed"
        );
    }
}
