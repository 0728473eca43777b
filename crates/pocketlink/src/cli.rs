//! Clap derive structures for the `pocketlink` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// pocketlink -- command-line client for PocketBase
#[derive(Debug, Parser)]
#[command(
    name = "pocketlink",
    version,
    about = "Query, edit and watch PocketBase records from the command line",
    long_about = "A CLI for PocketBase-compatible backends.\n\n\
        Lists and edits collection records, signs in with password auth,\n\
        and streams realtime record changes over Server-Sent Events.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Server profile to use
    #[arg(long, short = 'p', env = "POCKETLINK_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Server URL (overrides profile)
    #[arg(long, short = 'u', env = "POCKETLINK_URL", global = true)]
    pub url: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "POCKETLINK_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,

    /// Accept invalid TLS certificates
    #[arg(long, short = 'k', env = "POCKETLINK_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds (overrides profile and defaults)
    #[arg(long, env = "POCKETLINK_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List, read and edit collection records
    #[command(alias = "rec", alias = "r")]
    Records(RecordsArgs),

    /// Sign in, sign out and inspect the stored session
    Auth(AuthArgs),

    /// Stream realtime changes of a collection or record
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Check server health
    Health,

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  RECORDS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct RecordsArgs {
    #[command(subcommand)]
    pub command: RecordsCommand,
}

/// Pagination and query arguments for `records list`.
#[derive(Debug, Args)]
pub struct ListArgs {
    /// Page number (1-based)
    #[arg(long, default_value = "1")]
    pub page: u32,

    /// Records per page
    #[arg(long, short = 'l', default_value = "30")]
    pub per_page: u32,

    /// Fetch all pages automatically
    #[arg(long, short = 'a')]
    pub all: bool,

    /// Filter expression, e.g. "status = 'active' && created > '2024-01-01'"
    #[arg(long, short = 'f')]
    pub filter: Option<String>,

    /// Sort fields, e.g. "-created,title"
    #[arg(long, short = 's')]
    pub sort: Option<String>,

    /// Relations to expand
    #[arg(long, short = 'e')]
    pub expand: Option<String>,

    /// Comma-separated fields to return
    #[arg(long)]
    pub fields: Option<String>,
}

/// Record body source: inline JSON or a file.
#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
pub struct BodyArgs {
    /// Inline JSON object
    #[arg(long, short = 'd')]
    pub data: Option<String>,

    /// Read the JSON object from a file ("-" for stdin)
    #[arg(long, short = 'F')]
    pub from_file: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum RecordsCommand {
    /// List records of a collection
    #[command(alias = "ls")]
    List {
        /// Collection name or id
        collection: String,

        #[command(flatten)]
        list: ListArgs,
    },

    /// Show a single record
    Get {
        collection: String,
        id: String,

        /// Relations to expand
        #[arg(long, short = 'e')]
        expand: Option<String>,

        /// Comma-separated fields to return
        #[arg(long)]
        fields: Option<String>,
    },

    /// Create a record
    Create {
        collection: String,

        #[command(flatten)]
        body: BodyArgs,
    },

    /// Update fields of a record
    Update {
        collection: String,
        id: String,

        #[command(flatten)]
        body: BodyArgs,
    },

    /// Delete a record
    #[command(alias = "rm")]
    Delete { collection: String, id: String },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  AUTH
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct AuthArgs {
    #[command(subcommand)]
    pub command: AuthCommand,
}

#[derive(Debug, Subcommand)]
pub enum AuthCommand {
    /// Sign in with identity and password and store the session
    Login {
        /// Auth collection (defaults to the profile's auth_collection)
        #[arg(long, short = 'c')]
        collection: Option<String>,

        /// Email or username (defaults to the profile's identity)
        #[arg(long, short = 'i')]
        identity: Option<String>,
    },

    /// Refresh the stored session token
    Refresh {
        /// Auth collection (defaults to the profile's auth_collection)
        #[arg(long, short = 'c')]
        collection: Option<String>,
    },

    /// Forget the stored session
    Logout,

    /// Show the stored session
    Status,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  WATCH
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Collection name or id
    pub collection: String,

    /// Watch a single record instead of the whole collection
    #[arg(long, short = 'r')]
    pub record: Option<String>,

    /// Stop after this many events
    #[arg(long, short = 'n')]
    pub count: Option<u64>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONFIG
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Create initial config file with guided setup
    Init,

    /// Display current resolved configuration
    Show,

    /// Print the config file location
    Path,

    /// Set a value on the active profile
    Set {
        /// Profile key: url, auth_collection, identity, password_env,
        /// ca_cert, insecure, timeout
        key: String,

        /// Value to set
        value: String,
    },

    /// List configured profiles
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name to set as default
        name: String,
    },

    /// Store a password in the system keyring
    SetPassword {
        /// Profile name (defaults to the active profile)
        name: Option<String>,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  COMPLETIONS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
