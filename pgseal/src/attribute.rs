//! Encrypted attribute declarations and per-record decrypted-value cache.

use crate::filter;
use crate::value::Value;
use std::collections::BTreeMap;
use std::fmt;

/// A declared encrypted attribute and its backing columns.
///
/// An attribute `ssn` is stored in two text columns: `encrypted_ssn` holds
/// the hex-encoded PGP ciphertext and `hashed_ssn` the `crypt` digest used
/// for equality search.
///
/// # Example
///
/// ```
/// use pgseal::attribute::EncryptedAttribute;
///
/// let ssn = EncryptedAttribute::new("ssn");
/// assert_eq!(ssn.encrypted_column(), "encrypted_ssn");
/// assert_eq!(ssn.hashed_column(), "hashed_ssn");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedAttribute {
    name: String,
    encrypted_column: String,
    hashed_column: String,
}

impl EncryptedAttribute {
    /// Declares an attribute named `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            encrypted_column: format!("encrypted_{name}"),
            hashed_column: format!("hashed_{name}"),
            name,
        }
    }

    /// Returns the attribute name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the ciphertext column name.
    #[must_use]
    pub fn encrypted_column(&self) -> &str {
        &self.encrypted_column
    }

    /// Returns the digest column name.
    #[must_use]
    pub fn hashed_column(&self) -> &str {
        &self.hashed_column
    }
}

impl fmt::Display for EncryptedAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// The encrypted attributes declared for a record type.
///
/// Declarations accumulate: declaring more names appends them, and a name
/// declared twice is kept once, at its first position. Every declared name
/// is registered with the [sensitive parameter filter](crate::filter).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    attributes: Vec<EncryptedAttribute>,
}

impl Schema {
    /// Creates an empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares `names`, returning the extended schema.
    #[must_use]
    pub fn declare<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.declare_in_place(names);
        self
    }

    /// Declares `names` on an existing schema.
    pub fn declare_in_place<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in names {
            let name = name.as_ref();
            filter::register(name);
            if self.get(name).is_none() {
                self.attributes.push(EncryptedAttribute::new(name));
            }
        }
    }

    /// Returns the declared attribute named `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&EncryptedAttribute> {
        self.attributes.iter().find(|a| a.name() == name)
    }

    /// Returns the declared names in declaration order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.attributes.iter().map(EncryptedAttribute::name).collect()
    }

    /// Iterates over the declared attributes.
    pub fn iter(&self) -> impl Iterator<Item = &EncryptedAttribute> {
        self.attributes.iter()
    }
}

/// State of one attribute in a [`DecryptedCache`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CacheState<'a> {
    /// Nothing read or written since the record was loaded.
    Unloaded,
    /// A value is cached; it may be [`Value::Null`].
    Loaded(&'a Value),
}

/// Decrypted values of one record instance.
///
/// Owned by the record. The host must call [`DecryptedCache::reset`] when
/// the record is reloaded from storage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecryptedCache {
    slots: BTreeMap<String, Value>,
}

impl DecryptedCache {
    /// Creates a cache with every attribute unloaded.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the state of `attribute`.
    #[must_use]
    pub fn state(&self, attribute: &str) -> CacheState<'_> {
        self.slots.get(attribute).map_or(CacheState::Unloaded, CacheState::Loaded)
    }

    /// Returns `true` if `attribute` has not been loaded.
    #[must_use]
    pub fn is_unloaded(&self, attribute: &str) -> bool {
        !self.slots.contains_key(attribute)
    }

    /// Caches `value` for `attribute`.
    pub fn set(&mut self, attribute: &str, value: Value) {
        self.slots.insert(attribute.to_string(), value);
    }

    /// Marks every attribute unloaded.
    pub fn reset(&mut self) {
        self.slots.clear();
    }
}

/// The host record seam: column access and the decrypted-value cache.
///
/// `write_column` is the host's attribute setter; it is only called when a
/// backing column really changes, so hosts can track dirtiness there.
pub trait EncryptedRecord {
    /// Returns the current value of `column`.
    fn read_column(&self, column: &str) -> Option<&str>;

    /// Assigns `column`.
    fn write_column(&mut self, column: &str, value: Option<String>);

    /// Returns the record's decrypted-value cache.
    fn decrypted_cache(&mut self) -> &mut DecryptedCache;
}

/// Record types with declared encrypted attributes.
///
/// Usually implemented with `#[derive(Encryptable)]`. Hosts call
/// [`filter::register_type`] for each implementor at start-up.
pub trait Encryptable {
    /// Returns the record type's declared attributes.
    fn schema() -> &'static Schema;

    /// Returns the declared attribute names in declaration order.
    #[must_use]
    fn encrypted_attributes() -> Vec<&'static str> {
        Self::schema().names()
    }
}
