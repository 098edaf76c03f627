use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Checkpoint and restore the tally categorizer database")]
#[command(version)]
pub struct Cli {
    /// Database file (defaults to the platform data directory)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Checkpoint directory (defaults to checkpoints/ next to the database)
    #[arg(long, global = true)]
    pub checkpoint_dir: Option<PathBuf>,

    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Show debug logging
    #[arg(long, short = 'v', global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Manage database checkpoints
    #[command(subcommand)]
    Checkpoint(CheckpointCommand),
}

#[derive(Subcommand)]
pub enum CheckpointCommand {
    /// Snapshot the database
    Create(CreateArgs),

    /// List checkpoints, most recent first
    List(ListArgs),

    /// Show one checkpoint
    Info(InfoArgs),

    /// Replace the database with a checkpoint
    Restore(RestoreArgs),

    /// Remove a checkpoint
    Delete(DeleteArgs),

    /// Create an automatic checkpoint and prune old automatic ones
    Auto(AutoArgs),

    /// Compare a checkpoint's row counts with the current database
    Diff(DiffArgs),
}

#[derive(Parser)]
pub struct CreateArgs {
    /// Checkpoint id (defaults to checkpoint-<timestamp>)
    #[arg(long, default_value = "")]
    pub tag: String,

    /// Free text description
    #[arg(long, short = 'd', default_value = "")]
    pub description: String,
}

#[derive(Parser)]
pub struct ListArgs {
    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Parser)]
pub struct InfoArgs {
    pub id: String,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Parser)]
pub struct RestoreArgs {
    pub id: String,

    /// Take an automatic checkpoint of the current state before restoring
    #[arg(long, default_value_t = false)]
    pub safety_checkpoint: bool,
}

#[derive(Parser)]
pub struct DeleteArgs {
    pub id: String,
}

#[derive(Parser)]
pub struct AutoArgs {
    /// Operation about to run, used in the id and description
    pub prefix: String,
}

#[derive(Parser)]
pub struct DiffArgs {
    pub id: String,
}
