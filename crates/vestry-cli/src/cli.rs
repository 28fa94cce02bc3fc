use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "vestry")]
#[command(about = "Operate the Vestry offline data-resilience engine")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to the local offline database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show engine status: cached records, queue, conflicts, storage
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run one sync cycle against the configured API
    Sync,
    /// Stage a local mutation while offline or optimistically
    Stage {
        #[command(subcommand)]
        command: StageCommands,
    },
    /// List cached records of an entity
    List {
        /// Entity kind (account, event, task, message)
        entity: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Cache a page of server records from a JSON file or stdin
    Import {
        /// Entity kind (account, event, task, message)
        entity: String,
        /// Path to a JSON array of records (stdin when omitted)
        #[arg(short, long, value_name = "PATH")]
        file: Option<PathBuf>,
    },
    /// List conflicts awaiting adjudication
    Conflicts {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Adjudicate a conflict
    Resolve {
        /// Conflict ID
        id: String,
        /// Which side becomes canonical
        #[arg(value_enum)]
        resolution: ResolutionArg,
        /// Merged payload (required with `merged`; stdin also accepted)
        #[arg(short, long, value_name = "JSON")]
        payload: Option<String>,
    },
    /// Show the outbound mutation queue
    Queue {
        /// Show only items that exhausted their retry budget
        #[arg(long)]
        dead: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Re-arm a dead queue item for delivery
    Revive {
        /// Queue item ID
        id: String,
    },
    /// Evict expired unmodified cached records
    Cleanup {
        /// Override the retention window in days
        #[arg(long, value_name = "DAYS")]
        ttl_days: Option<u64>,
    },
    /// Wipe all offline data including the queue and conflict log
    Reset {
        /// Confirm the wipe
        #[arg(long)]
        yes: bool,
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

#[derive(Subcommand)]
pub enum StageCommands {
    /// Stage a create (POST on next sync)
    Create {
        /// Entity kind (account, event, task, message)
        entity: String,
        /// New record ID
        id: String,
        /// Record payload as JSON (stdin when omitted)
        payload: Option<String>,
    },
    /// Stage an update (PUT on next sync)
    Update {
        /// Entity kind (account, event, task, message)
        entity: String,
        /// Existing record ID
        id: String,
        /// Record payload as JSON (stdin when omitted)
        payload: Option<String>,
    },
    /// Stage a delete (DELETE on next sync)
    Delete {
        /// Entity kind (account, event, task, message)
        entity: String,
        /// Record ID
        id: String,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ResolutionArg {
    Local,
    Server,
    Merged,
}

impl ResolutionArg {
    pub const fn into_resolution(self) -> vestry_core::Resolution {
        match self {
            Self::Local => vestry_core::Resolution::Local,
            Self::Server => vestry_core::Resolution::Server,
            Self::Merged => vestry_core::Resolution::Merged,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}
