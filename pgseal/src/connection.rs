//! Database connection abstraction.

use crate::error::ConnectionError;
use crate::executor::ProjectionQuery;

/// A single result row, as text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    columns: Vec<(String, Option<String>)>,
}

impl Row {
    /// Creates an empty row.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a column value.
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: Option<String>) -> Self {
        self.columns.push((column.into(), value));
        self
    }

    /// Returns the value of `column`: `None` if the column is absent,
    /// `Some(None)` if it is SQL NULL.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<Option<&str>> {
        self.columns.iter().find(|(name, _)| name == column).map(|(_, value)| value.as_deref())
    }
}

/// Executes pgcrypto projection queries against PostgreSQL.
///
/// Implementations must be thread-safe (`Send + Sync`). They must bind the
/// query's parameters positionally and report database errors without
/// retrying or masking them.
///
/// # Example
///
/// ```rust,ignore
/// use pgseal::connection::{Connection, Row};
/// use pgseal::error::ConnectionError;
/// use pgseal::executor::ProjectionQuery;
///
/// struct MyConnection;
///
/// #[async_trait::async_trait]
/// impl Connection for MyConnection {
///     async fn fetch_row(&self, query: &ProjectionQuery) -> Result<Option<Row>, ConnectionError> {
///         // run query.sql() with query.params()
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait Connection: Send + Sync {
    /// Runs `query` and returns its first row, if any.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionError::Unavailable` if no connection can be used
    /// and `ConnectionError::Database` if PostgreSQL rejects the statement.
    async fn fetch_row(&self, query: &ProjectionQuery) -> Result<Option<Row>, ConnectionError>;
}
