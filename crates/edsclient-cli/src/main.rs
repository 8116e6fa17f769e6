//! edsclient - command line access to the EBSCO Discovery Service.
//!
//! Searches, retrieves records and shows the search criteria of the
//! configured profile. Tokens are cached under the user's cache directory so
//! consecutive runs reuse the same authentication token and session.

mod cli;

use std::io;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::Parser;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use edsclient_core::search::{BooleanOperator, HIGHLIGHT_PARAM, PROFILE_PARAM};
use edsclient_core::{
    AccountIdentity, CredentialStore, EdsBackend, EdsConfig, FileCache, FileSessionStore,
    ParamBag, Query,
};

use cli::{Cli, Commands};

/// Directory for daily log files, when set
const LOG_DIR_VAR: &str = "EDS_LOG_DIR";

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr; with `EDS_LOG_DIR` set they also go to a daily file.
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var(LOG_DIR_VAR) {
        Ok(dir) if !dir.is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, "edsclient.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _guard = init_tracing();
    info!(command = ?cli.command, "edsclient starting");

    match cli.command {
        Commands::Search {
            terms,
            field,
            limit,
            offset,
            profile,
            params,
        } => {
            let mut bag = ParamBag::new();
            if let Some(profile) = profile {
                bag.set(PROFILE_PARAM, profile);
            }
            for (name, value) in params {
                bag.add(name, value);
            }
            let terms = terms.join(" ");
            let query = match field {
                Some(field) => {
                    Query::default().with_clause(BooleanOperator::And, Some(&field), terms)
                }
                None => Query::keywords(terms),
            };

            let collection = backend(&env_config()?)?
                .search(&query, offset, limit, Some(&bag))
                .await?;
            println!("{}", serde_json::to_string_pretty(&collection)?);
        }
        Commands::Retrieve {
            id,
            profile,
            highlight,
        } => {
            let mut bag = ParamBag::new();
            if let Some(profile) = profile {
                bag.set(PROFILE_PARAM, profile);
            }
            for term in highlight.iter().flat_map(|h| h.split_whitespace()) {
                bag.add(HIGHLIGHT_PARAM, term);
            }

            let collection = backend(&env_config()?)?.retrieve(&id, Some(&bag)).await?;
            println!("{}", serde_json::to_string_pretty(&collection)?);
        }
        Commands::Info => {
            let info = backend(&env_config()?)?.get_info(None).await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        Commands::Login { username } => login(&username)?,
        Commands::Logout { username } => {
            CredentialStore::default().delete(&username)?;
            eprintln!("Removed password for {} from the system keychain", username);
        }
    }

    Ok(())
}

/// Config file settings with `EDS_*` environment overrides applied.
fn env_config() -> Result<EdsConfig> {
    let mut config = EdsConfig::load()?;
    config.apply_env();
    Ok(config)
}

fn backend(config: &EdsConfig) -> Result<EdsBackend> {
    let cache_dir = config.cache_dir()?;
    let account = AccountIdentity::from_config(config, &CredentialStore::default());
    let cache = Arc::new(FileCache::new(cache_dir.join("tokens"))?);
    let session = Arc::new(FileSessionStore::open(cache_dir)?);
    EdsBackend::from_config(config, account, cache, session)
}

/// Store the password in the keychain and remember the username in the
/// config file, so later runs find the password without prompting.
fn login(username: &str) -> Result<()> {
    let password = rpassword::prompt_password(format!("EDS password for {}: ", username))?;
    if password.is_empty() {
        bail!("Password cannot be empty");
    }
    CredentialStore::default().store(username, &password)?;

    // Environment overrides stay out of the saved file
    let mut config = EdsConfig::load()?;
    config.username = Some(username.to_string());
    config.save()?;
    eprintln!("Stored password for {} in the system keychain", username);
    Ok(())
}
