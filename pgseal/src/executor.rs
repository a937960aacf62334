//! Out-of-band evaluation of pgcrypto expressions.
//!
//! An expression is wrapped in a table-less `SELECT <expr> AS "<alias>"` and
//! sent to PostgreSQL with its bound parameters. The single value comes back
//! as text.

use crate::binder::{BindValue, Binder};
use crate::connection::Connection;
use crate::error::Error;
use crate::expr::{write_quoted, Expr};
use tracing::debug;

/// A projection-only query over a single expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectionQuery {
    projection: Expr,
    alias: &'static str,
    params: Vec<BindValue>,
}

impl ProjectionQuery {
    /// Creates a query projecting `projection` as `alias`.
    #[must_use]
    pub fn new(projection: Expr, alias: &'static str, params: Vec<BindValue>) -> Self {
        Self { projection, alias, params }
    }

    /// Returns the projected expression.
    #[must_use]
    pub const fn projection(&self) -> &Expr {
        &self.projection
    }

    /// Returns the column alias.
    #[must_use]
    pub const fn alias(&self) -> &'static str {
        self.alias
    }

    /// Returns the bound parameters in placeholder order.
    #[must_use]
    pub fn params(&self) -> &[BindValue] {
        &self.params
    }

    /// Renders the statement.
    #[must_use]
    pub fn sql(&self) -> String {
        let mut sql = String::from("SELECT ");
        self.projection.write_sql(&mut sql, 0);
        sql.push_str(" AS ");
        write_quoted(&mut sql, self.alias, '"');
        sql
    }
}

/// Evaluates `projection` with the values bound in `binder`, returning the
/// projected value. The binder is left empty.
///
/// # Errors
///
/// Returns `Error::Execution` if the connection or PostgreSQL fails, and
/// `Error::MissingColumn` if no row or no `alias` column comes back.
pub async fn evaluate<C>(
    conn: &C,
    projection: Expr,
    binder: &mut Binder,
    alias: &'static str,
) -> Result<Option<String>, Error>
where
    C: Connection + ?Sized,
{
    let query = ProjectionQuery::new(projection, alias, binder.take());
    debug!(alias, sql = %query.sql(), params = ?query.params(), "evaluating pgcrypto projection");

    let row = conn.fetch_row(&query).await?.ok_or_else(|| Error::MissingColumn(alias.to_string()))?;
    row.get(alias)
        .map(|value| value.map(str::to_string))
        .ok_or_else(|| Error::MissingColumn(alias.to_string()))
}
