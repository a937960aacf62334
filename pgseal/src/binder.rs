//! Bound query parameters.
//!
//! Every secret or user-supplied value reaches PostgreSQL as a bound
//! parameter. The [`Binder`] collects them for one round trip and hands out
//! [`Expr::Placeholder`] nodes that refer to them by position.

use crate::expr::Expr;
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use zeroize::Zeroizing;

/// A value sent to the database as a bound parameter.
///
/// `Debug` never prints text values, so parameter lists are safe to log.
#[derive(Clone, PartialEq, Eq)]
pub enum BindValue {
    Null,
    Bool(bool),
    Int(i64),
    Text(Zeroizing<String>),
}

impl BindValue {
    /// Wraps text, zeroized on drop.
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(Zeroizing::new(value.into()))
    }

    /// Copies a secret, or binds NULL when it is not configured.
    #[must_use]
    pub fn secret(value: Option<&SecretString>) -> Self {
        value.map_or(Self::Null, |s| Self::text(s.expose_secret().as_str()))
    }

    /// Returns the text if this is a [`BindValue::Text`].
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl fmt::Debug for BindValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Text(_) => f.write_str("[FILTERED]"),
        }
    }
}

impl From<bool> for BindValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for BindValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for BindValue {
    fn from(value: &str) -> Self {
        Self::text(value)
    }
}

impl From<String> for BindValue {
    fn from(value: String) -> Self {
        Self::text(value)
    }
}

impl<T: Into<Self>> From<Option<T>> for BindValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Append-only parameter list for a single expression-building pass.
///
/// Placeholders are numbered in binding order. Builders bind arguments in
/// the order they appear in the rendered SQL, so positions and values line
/// up for drivers that associate parameters positionally.
///
/// # Example
///
/// ```
/// use pgseal::binder::{BindValue, Binder};
///
/// let mut binder = Binder::new();
/// let first = binder.bind("alice");
/// let second = binder.bind(BindValue::Null);
///
/// assert_eq!(first.to_sql(), "$1");
/// assert_eq!(second.to_sql(), "$2");
/// assert_eq!(binder.len(), 2);
///
/// binder.reset();
/// assert!(binder.is_empty());
/// ```
#[derive(Debug, Default)]
pub struct Binder {
    values: Vec<BindValue>,
}

impl Binder {
    /// Creates an empty binder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `value` and returns the placeholder referring to it.
    pub fn bind(&mut self, value: impl Into<BindValue>) -> Expr {
        self.values.push(value.into());
        Expr::Placeholder(self.values.len() - 1)
    }

    /// Returns the bound values in binding order.
    ///
    /// Parameters are positional only; see [`Binder::named_snapshot`] for the
    /// `(name, value)` view.
    #[must_use]
    pub fn snapshot(&self) -> &[BindValue] {
        &self.values
    }

    /// Returns `(name, value)` pairs in binding order.
    ///
    /// Names are always `None`: every parameter is bound by position.
    #[must_use]
    pub fn named_snapshot(&self) -> Vec<(Option<&str>, &BindValue)> {
        self.values.iter().map(|value| (None, value)).collect()
    }

    /// Clears the list before an unrelated build pass.
    pub fn reset(&mut self) {
        self.values.clear();
    }

    /// Takes the bound values, leaving the binder empty.
    pub fn take(&mut self) -> Vec<BindValue> {
        std::mem::take(&mut self.values)
    }

    /// Returns the number of bound values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if nothing is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
