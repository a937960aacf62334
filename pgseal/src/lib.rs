//! # `pgseal`
//!
//! Searchable column encryption for PostgreSQL, built on the `pgcrypto`
//! extension.
//!
//! ## Features
//!
//! - PGP public-key encryption performed inside PostgreSQL
//! - Equality search through a `crypt` digest column
//! - Secrets always travel as bound parameters, never as SQL text
//! - Per-record cache of decrypted values
//! - Non-text values round-trip through a tagged binary envelope
//!
//! ## Example
//!
//! ```rust,ignore
//! use pgseal::prelude::*;
//!
//! #[derive(Encryptable)]
//! #[encryptable(ssn)]
//! struct User { /* columns, dirty tracking, DecryptedCache */ }
//!
//! let engine = Engine::from_global(&connection);
//! user.set_ssn(&engine, "123-45-6789").await?;
//! assert_eq!(user.ssn(&engine).await?, Value::from("123-45-6789"));
//!
//! let scope = Scope::table("users").filter(User::find_by_ssn(engine.config(), "123-45-6789")?);
//! ```

#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod attribute;
pub mod binder;
pub mod config;
pub mod connection;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod executor;
pub mod expr;
pub mod filter;
pub mod pgcrypto;
pub mod scope;
pub mod search;
pub mod value;

#[cfg(feature = "derive")]
pub use pgseal_derive::Encryptable;

pub mod prelude {
    //! Convenience re-exports for common use.
    pub use crate::attribute::{DecryptedCache, Encryptable, EncryptedAttribute, EncryptedRecord, Schema};
    pub use crate::config::{Config, ConfigHolder};
    pub use crate::connection::{Connection, Row};
    pub use crate::engine::Engine;
    pub use crate::error::{ConnectionError, Error};
    pub use crate::scope::{Filter, Scope};
    pub use crate::value::Value;

    #[cfg(feature = "derive")]
    pub use pgseal_derive::Encryptable;
}
