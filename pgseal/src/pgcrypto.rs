//! Builders for the pgcrypto calls used to encrypt, decrypt and hash values.
//!
//! Each builder binds the plaintext and the key material it needs through
//! the [`Binder`] as it goes, so the returned tree only ever renders
//! placeholders for secrets.
//!
//! The ciphertext round trip is
//! `pgp_pub_encrypt -> encode(.., 'hex') -> column -> decode(.., 'hex') -> pgp_pub_decrypt`,
//! because `pgp_pub_encrypt` returns `bytea` and the column holds text.

use crate::binder::{BindValue, Binder};
use crate::config::Config;
use crate::expr::Expr;
use secrecy::SecretString;

/// Options passed to `pgp_pub_encrypt`.
pub const ENCRYPT_OPTIONS: [(&str, &str); 3] =
    [("compress-algo", "2"), ("compress-level", "9"), ("cipher-algo", "aes256")];

/// Blowfish cost factor used when `gen_salt` generates a fresh salt.
pub const BF_ITERATION_COUNT: i64 = 6;

/// Renders [`ENCRYPT_OPTIONS`] as the `key=value,...` string pgcrypto expects.
#[must_use]
pub fn encrypt_options() -> String {
    ENCRYPT_OPTIONS.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join(",")
}

/// `encode(expr, 'hex')`
#[must_use]
pub fn encode_hex(expr: Expr) -> Expr {
    Expr::function("encode", vec![expr, Expr::text("hex")])
}

/// `decode(expr, 'hex')`
#[must_use]
pub fn decode_hex(expr: Expr) -> Expr {
    Expr::function("decode", vec![expr, Expr::text("hex")])
}

/// `gen_salt('bf', 6)`
#[must_use]
pub fn gen_salt() -> Expr {
    Expr::function("gen_salt", vec![Expr::text("bf"), Expr::int(BF_ITERATION_COUNT)])
}

/// Builds pgcrypto expressions against one configuration and one binder.
///
/// # Example
///
/// ```
/// use pgseal::binder::Binder;
/// use pgseal::config::Config;
/// use pgseal::pgcrypto::CryptoExpr;
///
/// let config = Config::new().with_public_key("pub").with_salt("$2a$06$W08w.BZCskDBfssD6kuHge");
/// let mut binder = Binder::new();
///
/// let hash = CryptoExpr::new(&mut binder, &config).crypt("hello");
/// assert_eq!(hash.to_sql(), "crypt($1, $2)");
/// assert_eq!(binder.len(), 2);
/// ```
pub struct CryptoExpr<'a> {
    binder: &'a mut Binder,
    config: &'a Config,
}

impl<'a> CryptoExpr<'a> {
    /// Creates a builder that binds into `binder`.
    pub fn new(binder: &'a mut Binder, config: &'a Config) -> Self {
        Self { binder, config }
    }

    /// `dearmor($key)`
    pub fn dearmor(&mut self, key: Option<&SecretString>) -> Expr {
        Expr::function("dearmor", vec![self.binder.bind(BindValue::secret(key))])
    }

    /// `pgp_pub_decrypt(decode($ciphertext, 'hex'), dearmor($private_key)[, $passphrase])`
    ///
    /// The passphrase argument is left out entirely when none is configured,
    /// selecting the two-argument overload.
    pub fn pgp_pub_decrypt(&mut self, ciphertext_hex: &str) -> Expr {
        let config = self.config;
        let mut args = vec![decode_hex(self.binder.bind(ciphertext_hex))];
        args.push(self.dearmor(config.private_key()));
        if let Some(password) = config.private_key_password() {
            args.push(self.binder.bind(BindValue::secret(Some(password))));
        }
        Expr::function("pgp_pub_decrypt", args)
    }

    /// `encode(pgp_pub_encrypt($plaintext, dearmor($public_key), '<options>'), 'hex')`
    pub fn pgp_pub_encrypt(&mut self, plaintext: &str) -> Expr {
        let config = self.config;
        let mut args = vec![self.binder.bind(plaintext)];
        args.push(self.dearmor(config.public_key()));
        args.push(Expr::text(encrypt_options()));
        encode_hex(Expr::function("pgp_pub_encrypt", args))
    }

    /// `crypt($plaintext, $salt)`, or `crypt($plaintext, gen_salt('bf', 6))`
    /// when no fixed salt is configured.
    ///
    /// Only a fixed salt gives deterministic, searchable hashes.
    pub fn crypt(&mut self, plaintext: &str) -> Expr {
        let mut args = vec![self.binder.bind(plaintext)];
        match self.config.salt() {
            Some(salt) => args.push(self.binder.bind(BindValue::secret(Some(salt)))),
            None => args.push(gen_salt()),
        }
        Expr::function("crypt", args)
    }
}
