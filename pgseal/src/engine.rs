//! Reading and writing encrypted attributes.
//!
//! The [`Engine`] ties a database connection to a configuration snapshot.
//! All encryption, decryption and hashing happens inside PostgreSQL via
//! pgcrypto; each operation is one blocking round trip with its own freshly
//! built parameter list.
//!
//! Loading N records and reading an encrypted attribute on each costs N
//! extra round trips. Values are cached on the record after the first read.

use crate::attribute::{CacheState, EncryptedAttribute, EncryptedRecord};
use crate::binder::Binder;
use crate::config::{Config, ConfigHolder};
use crate::connection::Connection;
use crate::envelope;
use crate::error::Error;
use crate::pgcrypto::CryptoExpr;
use crate::scope::Filter;
use crate::search;
use crate::value::Value;
use tracing::debug;
use zeroize::Zeroizing;

/// Column alias for decryption results.
pub const DECRYPT_ALIAS: &str = "decrypt";
/// Column alias for encryption results.
pub const ENCRYPT_ALIAS: &str = "encrypt";
/// Column alias for digest results.
pub const CRYPT_ALIAS: &str = "crypt";

/// Encrypted attribute engine.
///
/// # Example
///
/// ```rust,ignore
/// use pgseal::attribute::EncryptedAttribute;
/// use pgseal::engine::Engine;
///
/// let engine = Engine::from_global(&connection);
/// let ssn = EncryptedAttribute::new("ssn");
///
/// engine.write(&mut user, &ssn, "123-45-6789".into()).await?;
/// assert_eq!(engine.read(&mut user, &ssn).await?, "123-45-6789".into());
/// ```
pub struct Engine<'c, C: ?Sized> {
    conn: &'c C,
    config: Config,
}

impl<'c, C> Engine<'c, C>
where
    C: Connection + ?Sized,
{
    /// Creates an engine over `conn` using `config`.
    pub fn new(conn: &'c C, config: Config) -> Self {
        Self { conn, config }
    }

    /// Creates an engine using the process-wide configuration.
    pub fn from_global(conn: &'c C) -> Self {
        Self::new(conn, ConfigHolder::global().get())
    }

    /// Returns the configuration snapshot in use.
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Decrypts hex-encoded ciphertext.
    ///
    /// # Errors
    ///
    /// Returns `Error::Execution` if PostgreSQL rejects the key, passphrase
    /// or ciphertext.
    pub async fn decrypt(&self, ciphertext_hex: &str) -> Result<Option<String>, Error> {
        let mut binder = Binder::new();
        let expr = CryptoExpr::new(&mut binder, &self.config).pgp_pub_decrypt(ciphertext_hex);
        crate::executor::evaluate(self.conn, expr, &mut binder, DECRYPT_ALIAS).await
    }

    /// Encrypts `plaintext` to hex-encoded ciphertext.
    ///
    /// # Errors
    ///
    /// Returns `Error::Execution` if PostgreSQL rejects the key.
    pub async fn encrypt(&self, plaintext: &str) -> Result<Option<String>, Error> {
        let mut binder = Binder::new();
        let expr = CryptoExpr::new(&mut binder, &self.config).pgp_pub_encrypt(plaintext);
        crate::executor::evaluate(self.conn, expr, &mut binder, ENCRYPT_ALIAS).await
    }

    /// Computes the `crypt` digest of `plaintext`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Execution` if PostgreSQL rejects the salt.
    pub async fn digest(&self, plaintext: &str) -> Result<Option<String>, Error> {
        let mut binder = Binder::new();
        let expr = CryptoExpr::new(&mut binder, &self.config).crypt(plaintext);
        crate::executor::evaluate(self.conn, expr, &mut binder, CRYPT_ALIAS).await
    }

    /// Returns the decrypted value of `attribute`, loading it on first access.
    ///
    /// A null ciphertext column reads as [`Value::Null`] without a round trip.
    ///
    /// # Errors
    ///
    /// Returns `Error::Execution` if decryption fails.
    pub async fn read<R>(&self, record: &mut R, attribute: &EncryptedAttribute) -> Result<Value, Error>
    where
        R: EncryptedRecord + ?Sized,
    {
        if let CacheState::Loaded(value) = record.decrypted_cache().state(attribute.name()) {
            return Ok(value.clone());
        }

        let ciphertext = record.read_column(attribute.encrypted_column()).map(str::to_string);
        let value = match ciphertext {
            None => Value::Null,
            Some(ciphertext) => {
                self.decrypt(&ciphertext).await?.map_or(Value::Null, envelope::from_storage)
            }
        };

        record.decrypted_cache().set(attribute.name(), value.clone());
        Ok(value)
    }

    /// Assigns `value` to `attribute`.
    ///
    /// The cache is updated immediately. The backing columns are only
    /// written when the value differs from what is currently persisted, so
    /// re-assigning an unchanged value does not dirty the record.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The value cannot be serialized
    /// - Decrypting the current value, encrypting or hashing fails
    pub async fn write<R>(
        &self,
        record: &mut R,
        attribute: &EncryptedAttribute,
        value: Value,
    ) -> Result<(), Error>
    where
        R: EncryptedRecord + ?Sized,
    {
        let stored = envelope::to_storage(&value)?.map(Zeroizing::new);
        record.decrypted_cache().set(attribute.name(), value);

        let current = match record.read_column(attribute.encrypted_column()).map(str::to_string) {
            None => None,
            Some(ciphertext) => self.decrypt(&ciphertext).await?.map(Zeroizing::new),
        };

        if stored.as_ref().map(|s| s.as_str()) == current.as_ref().map(|s| s.as_str()) {
            debug!(attribute = attribute.name(), "value unchanged, leaving columns untouched");
            return Ok(());
        }

        let Some(plaintext) = stored else {
            record.write_column(attribute.encrypted_column(), None);
            record.write_column(attribute.hashed_column(), None);
            return Ok(());
        };

        let digest = self.digest(&plaintext).await?;
        let ciphertext = self.encrypt(&plaintext).await?;

        record.write_column(attribute.encrypted_column(), ciphertext);
        record.write_column(attribute.hashed_column(), digest);
        Ok(())
    }

    /// Returns `true` if `attribute` holds a present value.
    ///
    /// # Errors
    ///
    /// Returns `Error::Execution` if decryption fails.
    pub async fn is_present<R>(&self, record: &mut R, attribute: &EncryptedAttribute) -> Result<bool, Error>
    where
        R: EncryptedRecord + ?Sized,
    {
        Ok(self.read(record, attribute).await?.is_present())
    }

    /// Builds the search filter for `attribute == value`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidEnvelope` if the value cannot be serialized.
    pub fn find_by(&self, attribute: &EncryptedAttribute, value: impl Into<Value>) -> Result<Filter, Error> {
        search::find_by(&self.config, attribute, value)
    }
}
