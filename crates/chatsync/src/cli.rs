//! Clap derive structures for the `chatsync` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// chatsync -- watch and post to chat channels through the local cache
#[derive(Debug, Parser)]
#[command(
    name = "chatsync",
    version,
    about = "Offline-first chat client for the terminal",
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
    /// Profile to use
    #[arg(long, short = 'p', env = "CHATSYNC_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "CHATSYNC_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// User token (overrides profile)
    #[arg(long, env = "CHATSYNC_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Keep the cache in memory for this run
    #[arg(long, global = true)]
    pub in_memory: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Follow a live channel list
    Watch(WatchArgs),

    /// Follow one channel and its members
    Channel(ChannelArgs),

    /// Post a message to a channel
    Send(SendArgs),
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Only channels with this member (repeatable; defaults to yourself)
    #[arg(long, short = 'm')]
    pub member: Vec<String>,

    /// Only channels of this type
    #[arg(long = "type", short = 't')]
    pub channel_type: Option<String>,

    /// Page size
    #[arg(long, default_value = "25")]
    pub limit: u32,
}

#[derive(Debug, Args)]
pub struct ChannelArgs {
    /// Channel id, `type:id`
    pub cid: String,
}

#[derive(Debug, Args)]
pub struct SendArgs {
    /// Channel id, `type:id`
    pub cid: String,

    /// Message text
    pub text: String,
}
