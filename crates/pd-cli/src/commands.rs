use std::sync::Arc;

use anyhow::bail;
use colored::Colorize;
use pd_commit::{BatchReport, EditCommitter, EditItem, FieldService, InMemoryFieldService};
use pd_http::HttpBackend;
use pd_lock::{LockConfig, LockManager, StaleLock};
use pd_merge::MergeKind;
use pd_store::{InMemoryPropertyStore, PropertyStore};
use pd_types::{Clock, EntityId, ObservedLock, OwnerId, SystemClock};

use crate::cli::*;
use crate::config::Config;

pub async fn run_command(command: Command, config: Config) -> anyhow::Result<()> {
    match command {
        Command::Check => cmd_check(&config).await,
        Command::Commit(args) => cmd_commit(args, &config).await,
        Command::Lock(args) => cmd_lock(args, &config).await,
        Command::Simulate(args) => cmd_simulate(args, &config).await,
    }
}

fn lock_manager(store: Arc<dyn PropertyStore>, config: LockConfig) -> LockManager {
    LockManager::new(store, Arc::new(SystemClock), OwnerId::generate(), config)
}

async fn cmd_check(config: &Config) -> anyhow::Result<()> {
    let remote = config.remote_config()?;
    let url = remote.base_url.clone();
    let backend = HttpBackend::new(remote)?;
    if !backend.check_connection().await? {
        bail!("{url} rejected the configured credentials");
    }
    println!("{} Connected to {}", "✓".green().bold(), url.as_str().bold());
    Ok(())
}

async fn cmd_commit(args: CommitArgs, config: &Config) -> anyhow::Result<()> {
    let backend = HttpBackend::new(config.remote_config()?)?;
    let fields: Arc<dyn FieldService> = Arc::new(backend.clone());
    let committer = if args.no_lock || !config.lock.enabled {
        EditCommitter::unlocked(fields)
    } else {
        EditCommitter::locked(
            fields,
            lock_manager(Arc::new(backend), config.lock.lock_config()),
        )
    };

    let mut items: Vec<EditItem> = args
        .edits
        .iter()
        .map(|spec| {
            let mut item = EditItem::fetched(&spec.key, None, spec.baseline);
            item.edit(spec.value);
            item
        })
        .collect();

    let report = committer.commit_batch(&mut items).await;
    print_report(&report);
    if !report.failed.is_empty() {
        bail!("{} edit(s) not saved", report.failed.len());
    }
    Ok(())
}

fn print_report(report: &BatchReport) {
    for edit in &report.committed {
        let how = match edit.kind {
            MergeKind::Direct => "direct".to_string(),
            MergeKind::Rebased { adjustment } => {
                format!("rebased onto {} by {}", edit.server_value, -adjustment)
            }
        };
        println!(
            "  {} {} = {} ({})",
            "✓".green(),
            edit.key.bold(),
            edit.value.to_string().yellow(),
            how.dimmed()
        );
    }
    for failed in &report.failed {
        println!("  {} {}: {}", "✗".red(), failed.key.bold(), failed.error);
    }
    let line = report.status_line();
    if report.is_success() {
        println!("{}", line.green());
    } else {
        println!("{}", line.red());
    }
}

async fn cmd_lock(args: LockArgs, config: &Config) -> anyhow::Result<()> {
    let backend = HttpBackend::new(config.remote_config()?)?;
    let locks = lock_manager(Arc::new(backend), config.lock.lock_config());
    match args.action {
        LockAction::Status { entity } => match locks.inspect(entity).await? {
            Some(lock) => print_lock(entity, &lock, "held"),
            None => println!("No lock on {}", entity.to_string().bold()),
        },
        LockAction::ReleaseStale { entity } => match locks.clear_expired(entity).await? {
            StaleLock::Absent => println!("No lock on {}", entity.to_string().bold()),
            StaleLock::Held(lock) => print_lock(entity, &lock, "still held, left in place"),
            StaleLock::Cleared(lock) => {
                println!(
                    "{} Cleared expired lock on {} (owner {})",
                    "✓".green().bold(),
                    entity.to_string().bold(),
                    lock.owner().unwrap_or("?")
                );
            }
        },
    }
    Ok(())
}

fn print_lock(entity: EntityId, lock: &ObservedLock, state: &str) {
    let now = SystemClock.now();
    let expiry = match lock.expires_at() {
        Some(at) if lock.is_expired_at(now) => format!("{} (expired)", at.to_rfc3339()).red(),
        Some(at) => at.to_rfc3339().green(),
        None => "unreadable (treated as expired)".red(),
    };
    println!("Lock on {} {}", entity.to_string().bold(), state);
    println!("  Owner:   {}", lock.owner().unwrap_or("?").cyan());
    println!("  Nonce:   {}", lock.nonce().unwrap_or("?"));
    println!("  Expires: {expiry}");
}

async fn cmd_simulate(args: SimulateArgs, config: &Config) -> anyhow::Result<()> {
    let locking = !args.no_lock && config.lock.enabled;
    println!(
        "Simulating {} client(s) lowering {} by {} ({})",
        args.clients,
        args.start,
        args.step,
        if locking { "locked" } else { "unlocked" }
    );
    let outcome = simulate(&args, locking.then(|| config.lock.lock_config())).await?;
    let expected = pd_merge::clamp_half_non_negative(args.start - args.step * args.clients as f64);
    let verdict = if outcome.value == expected {
        "consistent".green()
    } else {
        "lost updates".red()
    };
    println!(
        "Final value {} after {} write(s), expected {}: {}",
        outcome.value.to_string().bold(),
        outcome.writes,
        expected,
        verdict
    );
    Ok(())
}

#[derive(Debug, PartialEq)]
pub struct Simulation {
    pub value: f64,
    pub writes: usize,
}

const SIMULATED_ISSUE: &str = "SIM-1";

/// Run `args.clients` concurrent committers that all started from
/// `args.start` and each lower the field by `args.step`.
pub async fn simulate(args: &SimulateArgs, lock: Option<LockConfig>) -> anyhow::Result<Simulation> {
    let entity = EntityId::new(1)?;
    let fields = Arc::new(InMemoryFieldService::new());
    fields.insert(SIMULATED_ISSUE, Some(entity), args.start);
    let store: Arc<dyn PropertyStore> = Arc::new(InMemoryPropertyStore::new());

    let mut clients = tokio::task::JoinSet::new();
    for _ in 0..args.clients {
        let service: Arc<dyn FieldService> = fields.clone();
        let committer = match &lock {
            Some(config) => {
                EditCommitter::locked(service, lock_manager(store.clone(), config.clone()))
            }
            None => EditCommitter::unlocked(service),
        };
        let (start, step) = (args.start, args.step);
        clients.spawn(async move {
            let mut items = vec![EditItem::fetched(SIMULATED_ISSUE, Some(entity), start)];
            items[0].edit(start - step);
            committer.commit_batch(&mut items).await
        });
    }

    while let Some(joined) = clients.join_next().await {
        let report = joined?;
        if !report.is_success() {
            tracing::warn!(status = %report.status_line(), "simulated client failed");
        }
    }

    Ok(Simulation {
        value: fields.value(SIMULATED_ISSUE).unwrap_or_default(),
        writes: fields.write_count(),
    })
}
