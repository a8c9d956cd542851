use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use pd_types::EntityId;

#[derive(Parser, Debug)]
#[command(
    name = "pointdown",
    about = "Pointdown: cooperative story-point edits for the issue tracker",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Config file (defaults to ./pointdown.toml if present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Verify the tracker URL and credentials
    Check,
    /// Commit local edits, reconciling with concurrent changes
    Commit(CommitArgs),
    /// Inspect or clean up the lock on an issue
    Lock(LockArgs),
    /// Run concurrent clients against in-memory backends
    Simulate(SimulateArgs),
}

#[derive(Args, Debug)]
pub struct CommitArgs {
    /// An edit as KEY=BASELINE:VALUE, e.g. ABC-12=5:3
    #[arg(long = "edit", value_name = "KEY=BASELINE:VALUE", required = true, value_parser = parse_edit)]
    pub edits: Vec<EditSpec>,

    /// Skip the cooperative lock for this run
    #[arg(long)]
    pub no_lock: bool,
}

#[derive(Args, Debug)]
pub struct LockArgs {
    #[command(subcommand)]
    pub action: LockAction,
}

#[derive(Subcommand, Debug)]
pub enum LockAction {
    /// Show the current lock record
    Status {
        /// Numeric issue id
        entity: EntityId,
    },
    /// Delete the lock if it has expired
    ReleaseStale {
        /// Numeric issue id
        entity: EntityId,
    },
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    #[arg(long, default_value_t = 4)]
    pub clients: usize,
    /// Initial field value
    #[arg(long, default_value_t = 10.0)]
    pub start: f64,
    /// How much each client lowers the field by
    #[arg(long, default_value_t = 1.0)]
    pub step: f64,
    #[arg(long)]
    pub no_lock: bool,
}

/// One edit from the command line.
#[derive(Clone, Debug, PartialEq)]
pub struct EditSpec {
    pub key: String,
    pub baseline: f64,
    pub value: f64,
}

pub fn parse_edit(s: &str) -> Result<EditSpec, String> {
    let (key, numbers) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=BASELINE:VALUE, got `{s}`"))?;
    let (baseline, value) = numbers
        .split_once(':')
        .ok_or_else(|| format!("expected BASELINE:VALUE after `=`, got `{numbers}`"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err("issue key is empty".into());
    }
    let number = |text: &str| -> Result<f64, String> {
        text.trim()
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .ok_or_else(|| format!("`{text}` is not a number"))
    };
    Ok(EditSpec {
        key: key.to_string(),
        baseline: number(baseline)?,
        value: number(value)?,
    })
}
