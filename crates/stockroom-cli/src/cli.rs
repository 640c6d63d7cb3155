use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use stockroom_core::models::{ConflictStatus, ResolutionStrategy};

#[derive(Parser)]
#[command(name = "stockroom")]
#[command(about = "Keep the local Stockroom database in sync with the server")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// CLI profile name holding the sync server settings
    #[arg(long, global = true, value_name = "NAME")]
    pub profile: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show unsynced records, pending conflicts and last sync times
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Exchange changes with the sync server
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },
    /// Inspect and resolve sync conflicts
    Conflicts {
        #[command(subcommand)]
        command: ConflictCommands,
    },
    /// Configure CLI profiles
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// Upload locally modified records
    Push,
    /// Download and apply server updates
    Pull,
    /// Pull, then push
    Run,
    /// Keep syncing in the background until interrupted
    Watch {
        /// Seconds between passes (profile setting when omitted)
        #[arg(long, value_name = "SECS")]
        interval: Option<u64>,
    },
}

#[derive(Subcommand)]
pub enum ConflictCommands {
    /// List conflicts, newest first
    List {
        /// Only show conflicts with this status
        #[arg(long, value_enum, default_value_t = ConflictFilter::Pending)]
        status: ConflictFilter,
        /// Number of conflicts to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show both snapshots of one conflict
    Show {
        /// Conflict id
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Resolve a pending conflict
    Resolve {
        /// Conflict id
        id: i64,
        /// Which side wins
        #[arg(long, value_enum)]
        strategy: StrategyArg,
        /// Name recorded as the resolver (defaults to the current user)
        #[arg(long, value_name = "NAME")]
        actor: Option<String>,
    },
    /// Close a pending conflict without changing the record
    Ignore {
        /// Conflict id
        id: i64,
        /// Name recorded as the resolver (defaults to the current user)
        #[arg(long, value_name = "NAME")]
        actor: Option<String>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ConflictFilter {
    Pending,
    Resolved,
    Ignored,
    All,
}

impl ConflictFilter {
    pub const fn status(self) -> Option<ConflictStatus> {
        match self {
            Self::Pending => Some(ConflictStatus::Pending),
            Self::Resolved => Some(ConflictStatus::Resolved),
            Self::Ignored => Some(ConflictStatus::Ignored),
            Self::All => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum StrategyArg {
    LocalWins,
    ServerWins,
    Merge,
}

impl From<StrategyArg> for ResolutionStrategy {
    fn from(value: StrategyArg) -> Self {
        match value {
            StrategyArg::LocalWins => Self::LocalWins,
            StrategyArg::ServerWins => Self::ServerWins,
            StrategyArg::Merge => Self::Merge,
        }
    }
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Initialize or update profile config
    Init {
        /// Profile name to initialize
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
        /// Sync server base URL
        #[arg(long, value_name = "URL")]
        server_url: Option<String>,
        /// User id sent with pull requests
        #[arg(long, value_name = "ID")]
        user_id: Option<String>,
        /// Bearer token (prefer STOCKROOM_AUTH_TOKEN to keep it out of the file)
        #[arg(long, value_name = "TOKEN")]
        auth_token: Option<String>,
        /// Request timeout in seconds
        #[arg(long, value_name = "SECS")]
        request_timeout: Option<u64>,
        /// Backoff after a failed pass in seconds
        #[arg(long, value_name = "SECS")]
        retry_delay: Option<u64>,
        /// Seconds between background passes
        #[arg(long, value_name = "SECS")]
        sync_interval: Option<u64>,
        /// Keep current active profile instead of activating this one
        #[arg(long)]
        no_activate: bool,
    },
    /// Print the resolved profile
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
