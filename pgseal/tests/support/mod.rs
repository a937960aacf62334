//! In-memory stand-in for PostgreSQL with the pgcrypto functions pgseal uses.
//!
//! The fake interprets the expression tree of each projection query against
//! its bound parameters, so tests observe exactly what the engine binds.
//! Ciphertext is keyed and randomized; `crypt` honours the salt prefix the
//! way bcrypt does, so searching without a fixed salt still works.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use pgseal::attribute::{DecryptedCache, EncryptedRecord};
use pgseal::binder::BindValue;
use pgseal::connection::{Connection, Row};
use pgseal::error::ConnectionError;
use pgseal::executor::ProjectionQuery;
use pgseal::expr::{Expr, Literal};
use pgseal::scope::Scope;
use pgseal::Encryptable;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

const CIPHERTEXT_MAGIC: &[u8] = b"FAKEPGP1";
const BCRYPT_ALPHABET: &[u8] = b"./ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
const SALT_LEN: usize = 29;

/// A key pair in fake ASCII armor.
#[derive(Debug, Clone)]
pub struct KeyPair {
    pub id: String,
    pub public: String,
    pub private: String,
    pub passphrase: Option<String>,
}

impl KeyPair {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            public: armor("PUBLIC KEY", id),
            private: armor("PRIVATE KEY", id),
            passphrase: None,
        }
    }

    pub fn protected(id: &str, passphrase: &str) -> Self {
        Self { passphrase: Some(passphrase.to_string()), ..Self::new(id) }
    }
}

fn armor(kind: &str, id: &str) -> String {
    format!("-----BEGIN PGP {kind} BLOCK-----\n\n{id}\n-----END PGP {kind} BLOCK-----\n")
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Datum {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
    Bytes(Vec<u8>),
}

impl Datum {
    fn into_text(self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Bool(b) => Some(if b { "t".to_string() } else { "f".to_string() }),
            Self::Int(i) => Some(i.to_string()),
            Self::Text(s) => Some(s),
            Self::Bytes(b) => Some(format!("\\x{}", hex::encode(b))),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum KeyKind {
    Public,
    Private,
}

fn database_error(message: &str) -> ConnectionError {
    ConnectionError::Database(message.to_string())
}

/// Fake PostgreSQL connection with pgcrypto.
#[derive(Debug, Default)]
pub struct FakePgcrypto {
    keys: Vec<KeyPair>,
    queries: Mutex<Vec<(String, Vec<BindValue>)>>,
}

impl FakePgcrypto {
    pub fn new(keys: Vec<KeyPair>) -> Self {
        Self { keys, queries: Mutex::new(Vec::new()) }
    }

    /// Rendered SQL and parameters of every query run so far.
    pub fn queries(&self) -> Vec<(String, Vec<BindValue>)> {
        self.queries.lock().clone()
    }

    pub fn query_count(&self) -> usize {
        self.queries.lock().len()
    }

    fn eval(
        &self,
        expr: &Expr,
        params: &[BindValue],
        row: Option<&BTreeMap<String, Option<String>>>,
    ) -> Result<Datum, ConnectionError> {
        match expr {
            Expr::Placeholder(index) => {
                let value = params
                    .get(*index)
                    .ok_or_else(|| database_error(&format!("there is no parameter ${}", index + 1)))?;
                Ok(match value {
                    BindValue::Null => Datum::Null,
                    BindValue::Bool(b) => Datum::Bool(*b),
                    BindValue::Int(i) => Datum::Int(*i),
                    BindValue::Text(s) => Datum::Text(s.as_str().to_string()),
                })
            }
            Expr::Literal(Literal::Text(s)) => Ok(Datum::Text(s.clone())),
            Expr::Literal(Literal::Int(i)) => Ok(Datum::Int(*i)),
            Expr::Column(name) => {
                let row = row.ok_or_else(|| database_error(&format!("column \"{name}\" does not exist")))?;
                Ok(row.get(name).cloned().flatten().map_or(Datum::Null, Datum::Text))
            }
            Expr::Eq(lhs, rhs) => {
                let lhs = self.eval(lhs, params, row)?;
                let rhs = self.eval(rhs, params, row)?;
                Ok(match (lhs, rhs) {
                    (Datum::Null, _) | (_, Datum::Null) => Datum::Null,
                    (Datum::Text(l), Datum::Bool(r)) | (Datum::Bool(r), Datum::Text(l)) => {
                        Datum::Bool((l == "t") == r)
                    }
                    (Datum::Text(l), Datum::Int(r)) | (Datum::Int(r), Datum::Text(l)) => {
                        Datum::Bool(l == r.to_string())
                    }
                    (l, r) => Datum::Bool(l == r),
                })
            }
            Expr::IsNull(inner) => Ok(Datum::Bool(self.eval(inner, params, row)? == Datum::Null)),
            Expr::Function { name, args } => {
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg, params, row))
                    .collect::<Result<Vec<_>, _>>()?;
                // pgcrypto functions are strict
                if args.iter().any(|a| *a == Datum::Null) {
                    return Ok(Datum::Null);
                }
                self.call(name, args)
            }
        }
    }

    fn call(&self, name: &str, args: Vec<Datum>) -> Result<Datum, ConnectionError> {
        match (name, args.as_slice()) {
            ("encode", [Datum::Bytes(bytes), Datum::Text(format)]) if format == "hex" => {
                Ok(Datum::Text(hex::encode(bytes)))
            }
            ("decode", [Datum::Text(text), Datum::Text(format)]) if format == "hex" => hex::decode(text)
                .map(Datum::Bytes)
                .map_err(|_| database_error("invalid hexadecimal data")),
            ("dearmor", [Datum::Text(armored)]) => dearmor(armored),
            ("pgp_pub_encrypt", [Datum::Text(plaintext), Datum::Bytes(key), Datum::Text(_options)]) => {
                let (kind, id) = parse_key(key)?;
                if !matches!(kind, KeyKind::Public) {
                    return Err(database_error("Refusing to encrypt with secret key"));
                }
                Ok(Datum::Bytes(encrypt(plaintext.as_bytes(), &id)))
            }
            ("pgp_pub_decrypt", [Datum::Bytes(data), Datum::Bytes(key), rest @ ..]) => {
                let passphrase = match rest {
                    [] => None,
                    [Datum::Text(p)] => Some(p.as_str()),
                    _ => return Err(database_error("function pgp_pub_decrypt does not exist")),
                };
                self.decrypt(data, key, passphrase).map(Datum::Text)
            }
            ("crypt", [Datum::Text(password), Datum::Text(salt)]) => crypt(password, salt).map(Datum::Text),
            ("gen_salt", [Datum::Text(kind), Datum::Int(rounds)]) if kind == "bf" => {
                Ok(Datum::Text(gen_salt(*rounds)))
            }
            _ => Err(database_error(&format!("function {name} does not exist"))),
        }
    }

    fn decrypt(&self, data: &[u8], key: &[u8], passphrase: Option<&str>) -> Result<String, ConnectionError> {
        let (kind, id) = parse_key(key)?;
        if !matches!(kind, KeyKind::Private) {
            return Err(database_error("Need secret key"));
        }
        let pair = self
            .keys
            .iter()
            .find(|k| k.id == id)
            .ok_or_else(|| database_error("Wrong key or corrupt data"))?;
        if let Some(expected) = &pair.passphrase {
            if passphrase != Some(expected.as_str()) {
                return Err(database_error("Wrong key or corrupt data"));
            }
        }

        let rest = data
            .strip_prefix(CIPHERTEXT_MAGIC)
            .ok_or_else(|| database_error("Wrong key or corrupt data"))?;
        let (id_len, rest) = rest.split_first().ok_or_else(|| database_error("Corrupt data"))?;
        let id_len = usize::from(*id_len);
        if rest.len() < id_len + 8 || rest[..id_len] != *id.as_bytes() {
            return Err(database_error("Wrong key or corrupt data"));
        }
        let (nonce, body) = rest[id_len..].split_at(8);
        let plaintext = xor_stream(body, nonce, &id);
        String::from_utf8(plaintext).map_err(|_| database_error("invalid byte sequence for encoding \"UTF8\""))
    }

    /// Evaluates `scope` against `table`, returning matching rows.
    pub fn select(
        &self,
        table: &FakeTable,
        scope: &Scope,
    ) -> Result<Vec<BTreeMap<String, Option<String>>>, ConnectionError> {
        let mut matching = Vec::new();
        'rows: for row in &table.rows {
            for filter in scope.filters() {
                if self.eval(filter.condition(), filter.params(), Some(row))? != Datum::Bool(true) {
                    continue 'rows;
                }
            }
            matching.push(row.clone());
        }
        Ok(matching)
    }
}

#[async_trait]
impl Connection for FakePgcrypto {
    async fn fetch_row(&self, query: &ProjectionQuery) -> Result<Option<Row>, ConnectionError> {
        self.queries.lock().push((query.sql(), query.params().to_vec()));
        let value = self.eval(query.projection(), query.params(), None)?;
        Ok(Some(Row::new().with(query.alias(), value.into_text())))
    }
}

fn dearmor(armored: &str) -> Result<Datum, ConnectionError> {
    let mut lines = armored.lines();
    let header = lines.next().unwrap_or_default();
    let kind = header
        .strip_prefix("-----BEGIN PGP ")
        .and_then(|h| h.strip_suffix(" BLOCK-----"))
        .ok_or_else(|| database_error("Corrupt ascii-armor"))?;
    let id = lines.find(|l| !l.is_empty()).ok_or_else(|| database_error("Corrupt ascii-armor"))?;
    Ok(Datum::Bytes(format!("{kind}:{id}").into_bytes()))
}

fn parse_key(key: &[u8]) -> Result<(KeyKind, String), ConnectionError> {
    let text = std::str::from_utf8(key).map_err(|_| database_error("Not a PGP key"))?;
    match text.split_once(':') {
        Some(("PUBLIC KEY", id)) => Ok((KeyKind::Public, id.to_string())),
        Some(("PRIVATE KEY", id)) => Ok((KeyKind::Private, id.to_string())),
        _ => Err(database_error("Not a PGP key")),
    }
}

fn xor_stream(data: &[u8], nonce: &[u8], key_id: &str) -> Vec<u8> {
    data.chunks(32)
        .enumerate()
        .flat_map(|(counter, chunk)| {
            let pad = Sha256::new()
                .chain_update(nonce)
                .chain_update(key_id.as_bytes())
                .chain_update(counter.to_be_bytes())
                .finalize();
            chunk.iter().zip(pad).map(|(b, p)| b ^ p).collect::<Vec<_>>()
        })
        .collect()
}

fn encrypt(plaintext: &[u8], key_id: &str) -> Vec<u8> {
    let nonce: [u8; 8] = rand::thread_rng().gen();
    let mut out = CIPHERTEXT_MAGIC.to_vec();
    out.push(u8::try_from(key_id.len()).unwrap_or(u8::MAX));
    out.extend_from_slice(key_id.as_bytes());
    out.extend_from_slice(&nonce);
    out.extend(xor_stream(plaintext, &nonce, key_id));
    out
}

fn crypt(password: &str, salt: &str) -> Result<String, ConnectionError> {
    let salt = salt.get(..SALT_LEN).filter(|s| s.starts_with("$2a$")).ok_or_else(|| database_error("invalid salt"))?;
    let digest = Sha256::new().chain_update(salt.as_bytes()).chain_update(password.as_bytes()).finalize();
    let tail: String = hex::encode(digest).chars().take(60 - SALT_LEN).collect();
    Ok(format!("{salt}{tail}"))
}

pub fn gen_salt(rounds: i64) -> String {
    let mut rng = rand::thread_rng();
    let random: String = (0..22).map(|_| char::from(BCRYPT_ALPHABET[rng.gen_range(0..BCRYPT_ALPHABET.len())])).collect();
    format!("$2a${rounds:02}${random}")
}

/// Rows of a table, as text columns.
#[derive(Debug, Default)]
pub struct FakeTable {
    pub rows: Vec<BTreeMap<String, Option<String>>>,
}

impl FakeTable {
    pub fn insert(&mut self, row: BTreeMap<String, Option<String>>) {
        self.rows.push(row);
    }
}

/// A host record with dirty tracking and encrypted attributes.
#[derive(Debug, Default, Encryptable)]
#[encryptable(message, something_else)]
#[encryptable(foo, bar)]
#[encryptable(message)]
pub struct Message {
    pub columns: BTreeMap<String, Option<String>>,
    pub dirty: BTreeSet<String>,
    pub cache: DecryptedCache,
}

impl Message {
    pub fn from_row(columns: BTreeMap<String, Option<String>>) -> Self {
        Self { columns, ..Self::default() }
    }

    pub fn column(&self, column: &str) -> Option<&str> {
        self.read_column(column)
    }

    pub fn set_flag(&mut self, flag: bool) {
        self.write_column("flag", Some(if flag { "t" } else { "f" }.to_string()));
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Persists the record into `table` and clears dirty tracking.
    pub fn save(&mut self, table: &mut FakeTable) {
        table.insert(self.columns.clone());
        self.dirty.clear();
    }

    /// Reloads the record from `row`, discarding cached plaintext.
    pub fn reload(&mut self, row: BTreeMap<String, Option<String>>) {
        self.columns = row;
        self.dirty.clear();
        self.cache.reset();
    }
}

impl EncryptedRecord for Message {
    fn read_column(&self, column: &str) -> Option<&str> {
        self.columns.get(column).and_then(Option::as_deref)
    }

    fn write_column(&mut self, column: &str, value: Option<String>) {
        self.dirty.insert(column.to_string());
        self.columns.insert(column.to_string(), value);
    }

    fn decrypted_cache(&mut self) -> &mut DecryptedCache {
        &mut self.cache
    }
}
