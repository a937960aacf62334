//! SQL expression trees.
//!
//! Expressions are rendered to PostgreSQL text with `$n` placeholders. Only
//! fixed, non-secret values (encoding names, option strings, algorithm
//! names) are ever rendered inline as literals; everything else is a
//! [`Expr::Placeholder`] bound through a [`Binder`](crate::binder::Binder).

use std::fmt::Write;

/// An inline literal. Never used for secret or user-supplied values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal {
    Text(String),
    Int(i64),
}

/// A node in an SQL expression tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// `name(arg, ...)`
    Function { name: &'static str, args: Vec<Expr> },
    /// Positional reference into the bound parameter list (zero based).
    Placeholder(usize),
    Literal(Literal),
    /// A column of the queried table.
    Column(String),
    /// `lhs = rhs`
    Eq(Box<Expr>, Box<Expr>),
    /// `expr IS NULL`
    IsNull(Box<Expr>),
}

impl Expr {
    /// Builds a function call node.
    #[must_use]
    pub fn function(name: &'static str, args: Vec<Self>) -> Self {
        Self::Function { name, args }
    }

    /// Builds an inline text literal.
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self::Literal(Literal::Text(value.into()))
    }

    /// Builds an inline integer literal.
    #[must_use]
    pub const fn int(value: i64) -> Self {
        Self::Literal(Literal::Int(value))
    }

    /// Builds a column reference.
    #[must_use]
    pub fn column(name: impl Into<String>) -> Self {
        Self::Column(name.into())
    }

    /// Builds `self = rhs`.
    #[must_use]
    pub fn equals(self, rhs: Self) -> Self {
        Self::Eq(Box::new(self), Box::new(rhs))
    }

    /// Builds `self IS NULL`.
    #[must_use]
    pub fn is_null(self) -> Self {
        Self::IsNull(Box::new(self))
    }

    /// Renders the expression with placeholders numbered from `$1`.
    #[must_use]
    pub fn to_sql(&self) -> String {
        self.to_sql_with_offset(0)
    }

    /// Renders the expression with placeholders shifted by `offset`, for
    /// embedding after `offset` parameters bound elsewhere in the statement.
    #[must_use]
    pub fn to_sql_with_offset(&self, offset: usize) -> String {
        let mut out = String::new();
        self.write_sql(&mut out, offset);
        out
    }

    /// Returns placeholder positions in the order they appear in the SQL.
    #[must_use]
    pub fn placeholders(&self) -> Vec<usize> {
        let mut found = Vec::new();
        self.collect_placeholders(&mut found);
        found
    }

    fn collect_placeholders(&self, found: &mut Vec<usize>) {
        match self {
            Self::Function { args, .. } => {
                for arg in args {
                    arg.collect_placeholders(found);
                }
            }
            Self::Placeholder(index) => found.push(*index),
            Self::Literal(_) | Self::Column(_) => {}
            Self::Eq(lhs, rhs) => {
                lhs.collect_placeholders(found);
                rhs.collect_placeholders(found);
            }
            Self::IsNull(inner) => inner.collect_placeholders(found),
        }
    }

    pub(crate) fn write_sql(&self, out: &mut String, offset: usize) {
        match self {
            Self::Function { name, args } => {
                out.push_str(name);
                out.push('(');
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    arg.write_sql(out, offset);
                }
                out.push(')');
            }
            Self::Placeholder(index) => {
                let _ = write!(out, "${}", offset + index + 1);
            }
            Self::Literal(Literal::Text(text)) => write_quoted(out, text, '\''),
            Self::Literal(Literal::Int(value)) => {
                let _ = write!(out, "{value}");
            }
            Self::Column(name) => write_quoted(out, name, '"'),
            Self::Eq(lhs, rhs) => {
                lhs.write_sql(out, offset);
                out.push_str(" = ");
                rhs.write_sql(out, offset);
            }
            Self::IsNull(inner) => {
                inner.write_sql(out, offset);
                out.push_str(" IS NULL");
            }
        }
    }
}

/// Quotes `text` with `quote`, doubling embedded quote characters.
pub(crate) fn write_quoted(out: &mut String, text: &str, quote: char) {
    out.push(quote);
    for c in text.chars() {
        if c == quote {
            out.push(quote);
        }
        out.push(c);
    }
    out.push(quote);
}
