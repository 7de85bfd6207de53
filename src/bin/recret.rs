//! recret CLI - passphrase-locked secret messages
//!
//! Runs the HTTP service, or creates and opens secrets directly against
//! the database.

use clap::{Parser, Subcommand};
use std::error::Error as _;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use recret::config::{Config, DEFAULT_BIND, DEFAULT_DATABASE};
use recret::error::{ErrorCategory, ErrorKind, RecretError, Result};
use recret::passphrase::{
    PassphraseReader, ReaderPassphraseReader, TerminalPassphraseReader, read_code,
};
use recret::service::SecretService;
use recret::store::SqliteStore;
use recret::web::{self, AppState};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "recret")]
#[command(version)]
#[command(about = "Share passphrase-locked secret messages.", long_about = None)]
struct Cli {
    /// Read the code from stdin instead of from terminal
    #[arg(long, global = true)]
    passphrase_stdin: bool,

    /// Path to the SQLite database holding encrypted secrets
    #[arg(long, global = true, env = "RECRET_DATABASE", default_value = DEFAULT_DATABASE)]
    database: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service
    #[command(alias = "s")]
    Serve {
        /// Address to listen on
        #[arg(long, env = "RECRET_BIND", default_value = DEFAULT_BIND)]
        bind: SocketAddr,

        /// Public origin used in share links, e.g. https://secrets.example.com
        #[arg(long, env = "RECRET_BASE_URL")]
        base_url: Option<String>,
    },

    /// Encrypt a message and store it, printing the new secret id
    #[command(alias = "c")]
    Create {
        /// Path to the file holding the message
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,
    },

    /// Unlock a stored secret and print the message
    #[command(alias = "o")]
    Open {
        /// Id of the secret
        id: String,
    },
}

fn main() {
    let cli = Cli::parse();

    init_tracing(match cli.command {
        Commands::Serve { .. } => "recret=info",
        _ => "recret=warn",
    });

    let result = match cli.command {
        Commands::Serve { bind, base_url } => {
            Config::new(cli.database, bind, base_url).and_then(serve)
        }
        Commands::Create { input } => create(&cli.database, &input, cli.passphrase_stdin),
        Commands::Open { id } => open(&cli.database, &id, cli.passphrase_stdin),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", error_chain(&e));
        process::exit(1);
    }
}

fn init_tracing(default_filter: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn error_chain(err: &RecretError) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

fn serve(config: Config) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| {
            RecretError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                "failed to start async runtime",
                e,
            )
        })?;
    runtime.block_on(run_server(config))
}

async fn run_server(config: Config) -> Result<()> {
    tracing::info!("starting recret v{}", env!("CARGO_PKG_VERSION"));

    let store = SqliteStore::open(&config.database)?;
    let service = Arc::new(SecretService::new(store));

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|e| {
            RecretError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::Io,
                format!("failed to bind {}", config.bind),
                e,
            )
        })?;

    let state = AppState::new(Arc::clone(&service), config.base_url.clone());
    let served = web::serve(listener, state, shutdown_signal()).await;

    let closed = service.store().close();
    served?;
    closed
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

fn create(database: &Path, input: &Path, use_stdin: bool) -> Result<()> {
    let message = std::fs::read_to_string(input).map_err(|e| {
        let category = if e.kind() == std::io::ErrorKind::NotFound {
            ErrorCategory::User
        } else {
            ErrorCategory::Internal
        };
        RecretError::with_kind_and_source(
            category,
            ErrorKind::Io,
            format!("failed to read message from {}", input.display()),
            e,
        )
    })?;

    let code = read_code(&mut *get_passphrase_reader(use_stdin, "Code (recret): "))?;
    if !use_stdin {
        let again = read_code(&mut TerminalPassphraseReader::new("Confirm code: "))?;
        if *again != *code {
            return Err(RecretError::with_kind(
                ErrorCategory::User,
                ErrorKind::PassphraseUnavailable,
                "codes do not match",
            ));
        }
    }

    let service = SecretService::new(SqliteStore::open(database)?);
    let id = service.create(&message, &code)?;
    service.store().close()?;

    println!("{}", id);
    Ok(())
}

fn open(database: &Path, id: &str, use_stdin: bool) -> Result<()> {
    let code = read_code(&mut *get_passphrase_reader(use_stdin, "Code (recret): "))?;

    let service = SecretService::new(SqliteStore::open(database)?);
    let message = service.unlock(id, &code);
    service.store().close()?;

    print!("{}", message?);
    Ok(())
}

fn get_passphrase_reader(use_stdin: bool, prompt: &'static str) -> Box<dyn PassphraseReader> {
    if use_stdin {
        Box::new(ReaderPassphraseReader::new(Box::new(std::io::stdin())))
    } else {
        Box::new(TerminalPassphraseReader::new(prompt))
    }
}
