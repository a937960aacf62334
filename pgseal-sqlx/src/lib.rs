//! PostgreSQL connection for `pgseal` backed by a sqlx pool.
//!
//! The database needs the `pgcrypto` extension:
//!
//! ```sql
//! CREATE EXTENSION IF NOT EXISTS pgcrypto;
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use pgseal::engine::Engine;
//! use pgseal_sqlx::SqlxConnection;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let connection = SqlxConnection::connect("postgres://localhost/app").await?;
//! let engine = Engine::from_global(&connection);
//!
//! let digest = engine.digest("123-45-6789").await?;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use pgseal::binder::BindValue;
use pgseal::connection::{Connection, Row};
use pgseal::error::ConnectionError;
use pgseal::executor::ProjectionQuery;
use pgseal::scope::Scope;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, Row as _};
use tracing::{debug, warn};

/// Maps a sqlx error onto the connection error kinds.
///
/// Messages reported by PostgreSQL are passed through as-is.
fn connection_error(err: sqlx::Error) -> ConnectionError {
    match err {
        sqlx::Error::Database(db) => ConnectionError::Database(db.message().to_string()),
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Configuration(_) => ConnectionError::Unavailable(err.to_string()),
        sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::Decode(_) => ConnectionError::Decode(err.to_string()),
        other => ConnectionError::Database(other.to_string()),
    }
}

fn bind_all<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &[BindValue],
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            BindValue::Null => query.bind(None::<String>),
            BindValue::Bool(b) => query.bind(*b),
            BindValue::Int(i) => query.bind(*i),
            BindValue::Text(text) => query.bind(text.as_str().to_owned()),
        };
    }
    query
}

/// [`Connection`] over a sqlx PostgreSQL pool.
#[derive(Debug, Clone)]
pub struct SqlxConnection {
    pool: PgPool,
}

impl SqlxConnection {
    /// Wraps an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to `url`.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionError::Unavailable` if the pool cannot connect.
    pub async fn connect(url: &str) -> Result<Self, ConnectionError> {
        let pool = PgPool::connect(url).await.map_err(|e| {
            warn!(error = %e, "failed to connect to PostgreSQL");
            ConnectionError::Unavailable(e.to_string())
        })?;
        Ok(Self::new(pool))
    }

    /// Returns the underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Checks that the `pgcrypto` extension is installed.
    ///
    /// # Errors
    ///
    /// Returns error if the catalog cannot be queried.
    pub async fn has_pgcrypto(&self) -> Result<bool, ConnectionError> {
        let row = sqlx::query("SELECT EXISTS (SELECT 1 FROM pg_extension WHERE extname = 'pgcrypto')")
            .fetch_one(&self.pool)
            .await
            .map_err(connection_error)?;
        row.try_get::<bool, _>(0).map_err(connection_error)
    }

    /// Runs `scope` and returns every matching row.
    ///
    /// # Errors
    ///
    /// Returns error if PostgreSQL rejects the statement.
    pub async fn fetch_all(&self, scope: &Scope) -> Result<Vec<PgRow>, ConnectionError> {
        let sql = scope.to_sql();
        let params = scope.params();
        debug!(sql = %sql, params = ?params, "running scope");
        bind_all(sqlx::query(&sql), &params)
            .fetch_all(&self.pool)
            .await
            .map_err(connection_error)
    }
}

#[async_trait::async_trait]
impl Connection for SqlxConnection {
    async fn fetch_row(&self, query: &ProjectionQuery) -> Result<Option<Row>, ConnectionError> {
        let sql = query.sql();
        let Some(row) = bind_all(sqlx::query(&sql), query.params())
            .fetch_optional(&self.pool)
            .await
            .map_err(connection_error)?
        else {
            return Ok(None);
        };

        let value = row.try_get::<Option<String>, _>(query.alias()).map_err(connection_error)?;
        Ok(Some(Row::new().with(query.alias(), value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgseal::config::Config;
    use pgseal::engine::Engine;

    // Run with a PostgreSQL that has pgcrypto available:
    // DATABASE_URL=postgres://... cargo test -p pgseal-sqlx -- --ignored
    async fn connection() -> SqlxConnection {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        SqlxConnection::connect(&url).await.expect("connect")
    }

    const SALT: &str = "$2a$06$W08w.BZCskDBfssD6kuHge";

    #[test]
    fn test_database_errors_keep_message() {
        let err = connection_error(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, ConnectionError::Unavailable(_)));

        let err = connection_error(sqlx::Error::ColumnNotFound("decrypt".to_string()));
        assert!(matches!(err, ConnectionError::Decode(msg) if msg.contains("decrypt")));
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn test_pgcrypto_installed() {
        let conn = connection().await;
        assert!(conn.has_pgcrypto().await.unwrap());
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn test_fixed_salt_digest_is_deterministic() {
        let conn = connection().await;
        let engine = Engine::new(&conn, Config::new().with_salt(SALT));

        let first = engine.digest("hello").await.unwrap().unwrap();
        let second = engine.digest("hello").await.unwrap().unwrap();
        assert_eq!(first, second);
        assert!(first.starts_with(SALT));
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn test_generated_salt_digest_differs() {
        let conn = connection().await;
        let engine = Engine::new(&conn, Config::new());

        let first = engine.digest("hello").await.unwrap().unwrap();
        let second = engine.digest("hello").await.unwrap().unwrap();
        assert!(first.starts_with("$2a$06$"));
        assert_ne!(first, second);
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL and PGCRYPTO_* keys"]
    async fn test_encrypt_decrypt_round_trip() {
        let conn = connection().await;
        let engine = Engine::new(&conn, Config::from_env());

        let ciphertext = engine.encrypt("hello").await.unwrap().unwrap();
        assert_ne!(ciphertext, "hello");
        assert_eq!(engine.decrypt(&ciphertext).await.unwrap().as_deref(), Some("hello"));
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn test_database_error_propagates() {
        let conn = connection().await;
        let engine = Engine::new(&conn, Config::new().with_private_key("not a key"));

        let result = engine.decrypt("00").await;
        assert!(matches!(
            result,
            Err(pgseal::error::Error::Execution(ConnectionError::Database(_)))
        ));
    }
}
