//! lyskom - command-line client for LysKOM servers
//!
//! Connects, optionally logs in, runs one command and disconnects.

mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use lyskom_client::{AsyncHandler, Config, HandlerTable, Session};
use lyskom_protocol::{AsyncKind, AsyncMessage};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lyskom")]
#[command(about = "Command-line client for LysKOM conferencing servers")]
#[command(version)]
pub struct Cli {
    /// YAML configuration file
    #[arg(short, long, env = "LYSKOM_CONFIG")]
    config: Option<PathBuf>,

    /// Server address, host or host:port
    #[arg(short, long)]
    server: Option<String>,

    /// Person number to log in as
    #[arg(short, long)]
    person: Option<u32>,

    /// Password for --person
    #[arg(long, env = "LYSKOM_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Disable the entity caches
    #[arg(long)]
    no_cache: bool,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the server's clock
    Time,

    /// Show protocol and server version
    Version,

    /// List sessions on the server
    Who {
        /// Include invisible sessions
        #[arg(long)]
        invisible: bool,

        /// Only sessions active within this many seconds
        #[arg(long, default_value = "0")]
        active_last: u32,
    },

    /// Look up conferences and persons by name
    Lookup {
        /// Name or abbreviation
        name: String,

        /// Only persons
        #[arg(long, conflicts_with = "confs")]
        persons: bool,

        /// Only conferences
        #[arg(long)]
        confs: bool,
    },

    /// Show a conference
    Conf {
        /// Conference number
        conf_no: u32,
    },

    /// Show a text with its status
    Text {
        /// Global text number
        text_no: u32,
    },

    /// List unread texts (requires login)
    Unread {
        /// Only this conference
        #[arg(long)]
        conf: Option<u32>,
    },

    /// Send a message to a conference or person (0: everyone)
    Send {
        recipient: u32,
        message: String,
    },

    /// Print async messages until interrupted
    Watch,
}

fn load_config(cli: &Cli) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => {
            let config = Config::from_file(path)?;
            tracing::info!("Loaded config from {}", path.display());
            config
        }
        None => Config::default(),
    };
    config.apply_env_overrides();

    if let Some(server) = &cli.server {
        config.server.addr = server.clone();
    }
    if let Some(person) = cli.person {
        config.login.person = Some(person);
    }
    if let Some(password) = &cli.password {
        config.login.password = Some(password.clone());
    }
    if cli.no_cache {
        config.cache.enabled = false;
    }
    config.validate()?;
    Ok(config)
}

/// Prints every async message as one JSON line.
struct Printer;

impl AsyncHandler for Printer {
    fn handle(&self, msg: &AsyncMessage) {
        match serde_json::to_string(msg) {
            Ok(json) => println!("{}", json),
            Err(e) => tracing::warn!("Cannot print {}: {}", msg.kind(), e),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let mut handlers = HandlerTable::new();
    if matches!(cli.command, Commands::Watch) {
        let printer = Arc::new(Printer);
        for kind in AsyncKind::ALL {
            handlers.register(*kind, printer.clone());
        }
    }

    let session = Session::new(config.connection_config(), handlers, config.cache.enabled);
    session.connect().await.map_err(|e| {
        eprintln!("{}: {}", "Connection failed".red(), e);
        e
    })?;
    tracing::info!("Connected to {}", config.server.address());

    if let Some((person, password)) = config.login.credentials() {
        session
            .login(person, password, config.login.invisible)
            .await
            .map_err(|e| {
                eprintln!("{}: {}", "Login failed".red(), e);
                e
            })?;
    }

    let result = commands::execute(&session, cli.command, cli.json).await;

    match result {
        Ok(output) => {
            if !output.is_empty() {
                println!("{}", output);
            }
        }
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            session.close().await?;
            std::process::exit(1);
        }
    }

    session.close().await?;
    Ok(())
}
