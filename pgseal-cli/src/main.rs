//! `pgseal` CLI tool for configuration checks and SQL inspection.

#![warn(clippy::pedantic, clippy::nursery)]

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use pgseal::attribute::EncryptedAttribute;
use pgseal::binder::Binder;
use pgseal::config::{
    Config, ConfigHolder, PRIVATE_KEY_PASSWORD_VAR, PRIVATE_KEY_VAR, PUBLIC_KEY_VAR, SALT_VAR,
};
use pgseal::engine::{Engine, CRYPT_ALIAS, DECRYPT_ALIAS, ENCRYPT_ALIAS};
use pgseal::executor::ProjectionQuery;
use pgseal::expr::Expr;
use pgseal::filter::FILTERED;
use pgseal::pgcrypto::CryptoExpr;
use pgseal::scope::Scope;
use pgseal::search;
use pgseal_sqlx::SqlxConnection;
use tracing::info;
use tracing_subscriber::EnvFilter;

const SAMPLE: &str = "pgseal check";

#[derive(Parser)]
#[command(name = "pgseal")]
#[command(about = "pgseal configuration and SQL inspection CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report which PGCRYPTO_* settings resolve, optionally checking a database
    Check {
        /// PostgreSQL URL to check for pgcrypto and a key round trip
        #[arg(long, env = "DATABASE_URL")]
        database_url: Option<String>,
    },
    /// Print the SQL sent for an encrypted attribute
    Explain {
        /// Attribute name, e.g. `ssn` for `encrypted_ssn`/`hashed_ssn`
        attribute: String,
        /// Table used in the search example
        #[arg(short, long, default_value = "records")]
        table: String,
    },
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pgseal=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing subscriber: {e}"))
}

fn status_lines(config: &Config) -> Vec<String> {
    let state = |set: bool| if set { "set" } else { "unset" };
    vec![
        format!("{PUBLIC_KEY_VAR}: {}", state(config.public_key().is_some())),
        format!("{PRIVATE_KEY_VAR}: {}", state(config.private_key().is_some())),
        format!("{PRIVATE_KEY_PASSWORD_VAR}: {}", state(config.private_key_password().is_some())),
        format!("{SALT_VAR}: {}", state(config.salt().is_some())),
    ]
}

fn describe(label: &str, expr: Expr, alias: &'static str, binder: &mut Binder) -> String {
    let query = ProjectionQuery::new(expr, alias, binder.take());
    format!("{label:<16}{}  -- params: {:?}", query.sql(), query.params())
}

fn explain_lines(config: &Config, attribute: &EncryptedAttribute, table: &str) -> Result<Vec<String>> {
    let mut lines = vec![
        format!("attribute:      {attribute}"),
        format!("ciphertext:     {}", attribute.encrypted_column()),
        format!("digest:         {}", attribute.hashed_column()),
    ];

    let mut binder = Binder::new();
    let encrypt = CryptoExpr::new(&mut binder, config).pgp_pub_encrypt(FILTERED);
    lines.push(describe("encrypt:", encrypt, ENCRYPT_ALIAS, &mut binder));
    let hash = CryptoExpr::new(&mut binder, config).crypt(FILTERED);
    lines.push(describe("hash:", hash, CRYPT_ALIAS, &mut binder));
    let decrypt = CryptoExpr::new(&mut binder, config).pgp_pub_decrypt(FILTERED);
    lines.push(describe("decrypt:", decrypt, DECRYPT_ALIAS, &mut binder));

    let scope = Scope::table(table).filter(search::find_by(config, attribute, FILTERED)?);
    lines.push(format!("{:<16}{}  -- params: {:?}", "search:", scope.to_sql(), scope.params()));
    if config.salt().is_none() {
        lines.push(format!(
            "note: no {SALT_VAR}; search recomputes crypt per row and cannot use an index on {}",
            attribute.hashed_column()
        ));
    }
    Ok(lines)
}

async fn check_database(url: &str, config: Config) -> Result<()> {
    let connection = SqlxConnection::connect(url).await.context("connecting to database")?;
    if !connection.has_pgcrypto().await? {
        bail!("pgcrypto extension is not installed; run CREATE EXTENSION pgcrypto");
    }
    println!("pgcrypto: installed");

    let engine = Engine::new(&connection, config);
    let digest = engine.digest(SAMPLE).await?.context("crypt returned NULL")?;
    info!(fixed_salt = engine.config().salt().is_some(), "crypt round trip succeeded");
    println!("crypt: ok ({} chars)", digest.len());

    if engine.config().public_key().is_none() || engine.config().private_key().is_none() {
        println!("round trip: skipped (key pair incomplete)");
        return Ok(());
    }
    let ciphertext = engine.encrypt(SAMPLE).await?.context("pgp_pub_encrypt returned NULL")?;
    let plaintext = engine.decrypt(&ciphertext).await?;
    if plaintext.as_deref() != Some(SAMPLE) {
        bail!("round trip returned a different value; check that the keys form a pair");
    }
    println!("round trip: ok");
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_tracing()?;
    let cli = Cli::parse();
    let config = ConfigHolder::global().get();

    match cli.command {
        Commands::Check { database_url } => {
            for line in status_lines(&config) {
                println!("{line}");
            }
            if let Some(url) = database_url {
                check_database(&url, config).await?;
            }
        }
        Commands::Explain { attribute, table } => {
            let attribute = EncryptedAttribute::new(attribute);
            for line in explain_lines(&config, &attribute, &table)? {
                println!("{line}");
            }
        }
    }
    Ok(())
}
