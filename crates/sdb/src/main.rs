//! SDB - Snapshot Debugger
//!
//! Keeps breakpoints of a remote snapshot debugger in sync and inspects the
//! snapshots they capture.

use std::{path::PathBuf, sync::Arc};

use clap::{Parser, Subcommand};
use eyre::{Result, WrapErr};
use sdb_common::{
    env::{SDB_ACCESS_TOKEN, SDB_API_ROOT, SDB_DEBUGGEE},
    types::SourceLocation,
};
use sdb_engine::{HttpDebuggerClient, SyncConfig};

mod cmd;
mod render;

/// Command-line interface for SDB
#[derive(Debug, Parser)]
#[command(name = "sdb")]
#[command(about = "Snapshot Debugger - sync and inspect breakpoints of a remote snapshot debugger")]
#[command(version)]
pub struct Cli {
    /// Debuggee whose breakpoints are managed
    #[arg(long, env = SDB_DEBUGGEE, global = true)]
    pub debuggee: Option<String>,

    /// Root URL of the debugger service (default: from the config file)
    #[arg(long, env = SDB_API_ROOT, global = true)]
    pub api_root: Option<String>,

    /// OAuth access token sent as a bearer token
    #[arg(long, env = SDB_ACCESS_TOKEN, hide_env_values = true, global = true)]
    pub access_token: Option<String>,

    /// Engine configuration file (default: ~/.sdb.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Poll without wait tokens
    #[arg(long, global = true)]
    pub no_wait_token: bool,

    /// Also write logs to <tmp>/sdb-logs
    #[arg(long, global = true)]
    pub log_file: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List the breakpoints of the debuggee
    List,
    /// Set a snapshot breakpoint
    Set {
        /// Location in the format <path>:<line>
        location: SourceLocation,
        /// Condition that must hold for the snapshot to be taken
        #[arg(long)]
        condition: Option<String>,
        /// Expression evaluated when the snapshot is taken (repeatable)
        #[arg(long = "watch")]
        watches: Vec<String>,
    },
    /// Delete a breakpoint
    Delete {
        /// Breakpoint id
        id: String,
    },
    /// Print the captured stack of a snapshot
    Show {
        /// Breakpoint id
        id: String,
    },
    /// Keep breakpoints in sync and report snapshots until interrupted
    Watch {
        /// Local breakpoint to register, in the format <path>:<line> (repeatable)
        #[arg(long = "break")]
        breakpoints: Vec<SourceLocation>,
    },
}

impl Cli {
    /// Debuggee id, required by every command.
    pub fn debuggee(&self) -> Result<&str> {
        self.debuggee
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .ok_or_else(|| eyre::eyre!("No debuggee given, pass --debuggee or set {SDB_DEBUGGEE}"))
    }

    /// Loads the engine configuration and applies command-line overrides.
    pub fn sync_config(&self) -> Result<SyncConfig> {
        let mut config = match &self.config {
            Some(path) => SyncConfig::load_from(path)?,
            None => SyncConfig::load()?,
        };
        if let Some(root) = &self.api_root {
            config.api_root = root.clone();
        }
        if self.no_wait_token {
            config.use_wait_token = false;
        }
        Ok(config)
    }

    /// Builds the HTTP client for `config`.
    pub fn client(&self, config: &SyncConfig) -> Result<Arc<HttpDebuggerClient>> {
        let mut client =
            HttpDebuggerClient::new(config).wrap_err("Failed to build the HTTP client")?;
        if let Some(token) = &self.access_token {
            client = client.with_access_token(token.clone());
        }
        Ok(Arc::new(client))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse();

    sdb_common::logging::init_logging("sdb", cli.log_file)?;

    let config = cli.sync_config()?;
    tracing::debug!("Using debugger service at {}", config.api_root);

    match &cli.command {
        Commands::List => cmd::list_breakpoints(&cli, config).await,
        Commands::Set { location, condition, watches } => {
            cmd::set_breakpoint(&cli, config, location.clone(), condition.clone(), watches.clone())
                .await
        }
        Commands::Delete { id } => cmd::delete_breakpoint(&cli, config, id).await,
        Commands::Show { id } => cmd::show_snapshot(&cli, config, id).await,
        Commands::Watch { breakpoints } => cmd::watch(&cli, config, breakpoints).await,
    }
}
