//! Process-wide registry of parameter names whose values must not be logged.
//!
//! Declaring an encrypted attribute registers its name here. Request or
//! parameter loggers can run their key/value pairs through [`filter_params`]
//! before emitting them.
//!
//! Derived record types build their schema on first use. Call
//! [`register_type`] for each of them at start-up so their names are
//! filtered before any record is touched.

use crate::attribute::{Encryptable, Schema};
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// Replacement text for filtered values.
pub const FILTERED: &str = "[FILTERED]";

fn registry() -> &'static RwLock<BTreeSet<String>> {
    static REGISTRY: OnceLock<RwLock<BTreeSet<String>>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(BTreeSet::new()))
}

/// Registers `name` as sensitive.
pub fn register(name: &str) {
    registry().write().insert(name.to_string());
}

/// Registers every attribute declared on `T` and returns its schema.
///
/// # Example
///
/// ```rust,ignore
/// pgseal::filter::register_type::<User>();
/// assert!(pgseal::filter::is_filtered("ssn"));
/// ```
pub fn register_type<T: Encryptable>() -> &'static Schema {
    T::schema()
}

/// Returns `true` if `name` is registered.
#[must_use]
pub fn is_filtered(name: &str) -> bool {
    registry().read().contains(name)
}

/// Returns the registered names, sorted.
#[must_use]
pub fn registered() -> Vec<String> {
    registry().read().iter().cloned().collect()
}

/// Replaces the values of registered keys with [`FILTERED`].
pub fn filter_params<'a, I>(params: I) -> Vec<(String, String)>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let names = registry().read();
    params
        .into_iter()
        .map(|(key, value)| {
            let value = if names.contains(key) { FILTERED } else { value };
            (key.to_string(), value.to_string())
        })
        .collect()
}
