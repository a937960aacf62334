//! Equality search over encrypted attributes.
//!
//! Search re-computes the `crypt` digest of the searched value in SQL and
//! compares it with the digest column:
//!
//! ```text
//! hashed_a = crypt($value, $salt)         -- fixed salt configured
//! hashed_a = crypt($value, hashed_a)      -- no fixed salt
//! hashed_a IS NULL                        -- searching for null
//! ```
//!
//! Without a fixed salt each stored digest embeds its own bcrypt salt, which
//! `crypt` reads back from the column. That matches, but it cannot use an
//! index: PostgreSQL evaluates `crypt` once per candidate row. Only use it on
//! small tables.

use crate::attribute::EncryptedAttribute;
use crate::binder::{BindValue, Binder};
use crate::config::Config;
use crate::envelope;
use crate::error::Error;
use crate::expr::Expr;
use crate::scope::Filter;
use crate::value::Value;

/// Builds the filter matching records whose `attribute` equals `value`.
///
/// Values are normalized exactly like the attribute writer does, so an
/// integer searches for the integer envelope, not its decimal text.
///
/// # Errors
///
/// Returns `Error::InvalidEnvelope` if the value cannot be serialized.
///
/// # Example
///
/// ```
/// use pgseal::attribute::EncryptedAttribute;
/// use pgseal::config::Config;
/// use pgseal::search::find_by;
/// use pgseal::value::Value;
///
/// let config = Config::new().with_salt("$2a$06$W08w.BZCskDBfssD6kuHge");
/// let ssn = EncryptedAttribute::new("ssn");
///
/// let filter = find_by(&config, &ssn, "123-45-6789").unwrap();
/// assert_eq!(filter.to_sql(), "\"hashed_ssn\" = crypt($1, $2)");
///
/// let filter = find_by(&config, &ssn, Value::Null).unwrap();
/// assert_eq!(filter.to_sql(), "\"hashed_ssn\" IS NULL");
/// ```
pub fn find_by(
    config: &Config,
    attribute: &EncryptedAttribute,
    value: impl Into<Value>,
) -> Result<Filter, Error> {
    let Some(stored) = envelope::to_storage(&value.into())? else {
        return Ok(Filter::column_is_null(attribute.hashed_column()));
    };

    let mut binder = Binder::new();
    let searched = binder.bind(stored);
    let salt = config.salt().map_or_else(
        || Expr::column(attribute.hashed_column()),
        |salt| binder.bind(BindValue::secret(Some(salt))),
    );

    let digest = Expr::function("crypt", vec![searched, salt]);
    let condition = Expr::column(attribute.hashed_column()).equals(digest);
    Ok(Filter::new(condition, binder.take()))
}
