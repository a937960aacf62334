//! Composable filters and a minimal scope to chain them.
//!
//! A [`Filter`] owns its condition and the parameters it binds, numbered
//! from zero. A [`Scope`] renumbers each filter's placeholders when it is
//! rendered, so filters can be chained in any order without their
//! parameters drifting out of position.

use crate::binder::{BindValue, Binder};
use crate::expr::{write_quoted, Expr};

/// A `WHERE` condition together with its bound parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    condition: Expr,
    params: Vec<BindValue>,
}

impl Filter {
    /// Creates a filter from a condition built against `params`.
    #[must_use]
    pub fn new(condition: Expr, params: Vec<BindValue>) -> Self {
        Self { condition, params }
    }

    /// `column = $value`
    #[must_use]
    pub fn column_eq(column: &str, value: impl Into<BindValue>) -> Self {
        let mut binder = Binder::new();
        let condition = Expr::column(column).equals(binder.bind(value));
        Self::new(condition, binder.take())
    }

    /// `column IS NULL`
    #[must_use]
    pub fn column_is_null(column: &str) -> Self {
        Self::new(Expr::column(column).is_null(), Vec::new())
    }

    /// Returns the condition.
    #[must_use]
    pub const fn condition(&self) -> &Expr {
        &self.condition
    }

    /// Returns the bound parameters.
    #[must_use]
    pub fn params(&self) -> &[BindValue] {
        &self.params
    }

    /// Renders the condition on its own.
    #[must_use]
    pub fn to_sql(&self) -> String {
        self.condition.to_sql()
    }
}

/// `SELECT * FROM table WHERE f1 AND f2 ...`
///
/// # Example
///
/// ```
/// use pgseal::scope::{Filter, Scope};
///
/// let scope = Scope::table("messages")
///     .filter(Filter::column_eq("flag", true))
///     .filter(Filter::column_eq("kind", "note"));
///
/// assert_eq!(
///     scope.to_sql(),
///     "SELECT * FROM \"messages\" WHERE \"flag\" = $1 AND \"kind\" = $2"
/// );
/// assert_eq!(scope.params().len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    table: String,
    filters: Vec<Filter>,
}

impl Scope {
    /// Starts a scope over `table`.
    #[must_use]
    pub fn table(table: impl Into<String>) -> Self {
        Self { table: table.into(), filters: Vec::new() }
    }

    /// Appends a filter.
    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Returns the table name.
    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Returns the filters in chain order.
    #[must_use]
    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// Renders the `WHERE` clause body, or `None` without filters.
    #[must_use]
    pub fn where_sql(&self) -> Option<String> {
        if self.filters.is_empty() {
            return None;
        }
        let mut sql = String::new();
        let mut offset = 0;
        for (i, filter) in self.filters.iter().enumerate() {
            if i > 0 {
                sql.push_str(" AND ");
            }
            filter.condition.write_sql(&mut sql, offset);
            offset += filter.params.len();
        }
        Some(sql)
    }

    /// Renders the full statement.
    #[must_use]
    pub fn to_sql(&self) -> String {
        let mut sql = String::from("SELECT * FROM ");
        write_quoted(&mut sql, &self.table, '"');
        if let Some(conditions) = self.where_sql() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions);
        }
        sql
    }

    /// Returns every filter's parameters, concatenated in chain order.
    #[must_use]
    pub fn params(&self) -> Vec<BindValue> {
        self.filters.iter().flat_map(|f| f.params.iter().cloned()).collect()
    }
}
