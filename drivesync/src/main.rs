use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use drivesync::config::{Config, SyncOptions};
use drivesync::sync::state::{MergeOutcome, SyncState};
use drivesync::sync::transfer::{PlanningSyncer, TransferAction};
use drivesync_core::DriveClient;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "drivesync")]
#[command(about = "Plans a two-way sync between a local directory and a cloud drive")]
struct Cli {
    /// Treat every remote entry as newer than the last sync
    #[arg(short, long)]
    force: bool,

    /// Only sync this top-level directory
    #[arg(short = 's', long)]
    dir: Option<String>,

    /// Extra ignore pattern, matched against whole root-relative paths
    #[arg(long)]
    ignore: Option<String>,

    /// Rename a file locally and remotely
    #[arg(long, num_args = 2, value_names = ["OLD", "NEW"])]
    rename: Option<Vec<PathBuf>>,

    /// Debug logging
    #[arg(short = 'V', long)]
    verbose: bool,
}

impl Cli {
    fn rename_paths(&self) -> Option<(&Path, &Path)> {
        match self.rename.as_deref() {
            Some([from, to]) => Some((from.as_path(), to.as_path())),
            _ => None,
        }
    }
}

/// First change id the feed is asked for, given the last one applied.
fn changes_after(stamp: i64) -> i64 {
    stamp.saturating_add(1)
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn action_label(action: &TransferAction) -> &'static str {
    match action {
        TransferAction::Upload => "upload",
        TransferAction::Download => "download",
        TransferAction::DeleteLocal => "delete-local",
        TransferAction::DeleteRemote => "delete-remote",
        TransferAction::KeepBoth { .. } => "keep-both",
    }
}

/// Builds the merged tree: local scan, full remote listing, then the
/// change feed since the saved cursor.
async fn reconcile(
    state: &mut SyncState,
    client: &DriveClient,
    config: &Config,
) -> anyhow::Result<()> {
    let about = client.about().await.context("failed to fetch drive info")?;
    state.set_root_id(&about.root_folder_id);

    state
        .from_local(&config.root_dir)
        .with_context(|| format!("failed to scan {}", config.root_dir.display()))?;

    let entries = client
        .list_entries(config.page_size)
        .await
        .context("failed to list remote files")?;
    let deferred = entries
        .iter()
        .filter(|entry| state.from_remote(entry) == MergeOutcome::Deferred)
        .count();
    let resolution = state.resolve_entries();
    info!(
        entries = entries.len(),
        deferred,
        resolved = resolution.resolved,
        orphaned = resolution.orphaned,
        "remote listing merged"
    );

    match state.change_stamp() {
        Some(stamp) => {
            let feed = client
                .list_changes(changes_after(stamp), config.page_size)
                .await
                .context("failed to read change feed")?;
            for entry in &feed.entries {
                state.from_remote(entry);
            }
            info!(changes = feed.entries.len(), "change feed merged");
            state.set_change_stamp(feed.largest_change_id);
        }
        None => {
            if let Some(stamp) = about.change_stamp() {
                state.set_change_stamp(stamp);
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = Config::from_env()?;
    tokio::fs::create_dir_all(&config.root_dir)
        .await
        .with_context(|| format!("failed to create sync root at {:?}", config.root_dir))?;
    let token = config
        .token
        .clone()
        .context("DRIVESYNC_TOKEN is not set")?;
    let client = match config.api_url.as_deref() {
        Some(url) => DriveClient::with_base_url(url, token)?,
        None => DriveClient::new(token)?,
    };

    let options = SyncOptions {
        path: config.root_dir.display().to_string(),
        dir: cli.dir.clone(),
        ignore: cli.ignore.clone(),
        force: cli.force,
    };
    let mut state =
        SyncState::open(&config.state_file, options).context("failed to load sync state")?;
    if state.last_sync().is_epoch() {
        info!(root = %config.root_dir.display(), "no previous sync point, starting from scratch");
    } else {
        info!(last_sync = %state.last_sync(), root = %config.root_dir.display(), "starting");
    }

    reconcile(&mut state, &client, &config).await?;
    let tree = state.tree();
    info!(resources = tree.walk(tree.root()).len(), "tree built");

    let mut syncer = PlanningSyncer::new();
    if let Some((from, to)) = cli.rename_paths() {
        state
            .rename(&mut syncer, &config.root_dir, from, to)
            .with_context(|| format!("failed to rename {}", from.display()))?;
        for rename in syncer.renames() {
            println!("rename  {} -> {}", rename.from, rename.to.display());
        }
        return Ok(());
    }

    state.sync(&mut syncer)?;
    for item in syncer.plan() {
        match &item.action {
            TransferAction::KeepBoth { renamed_local } => {
                println!("{:<13} {} (local copy -> {renamed_local})", "keep-both", item.path)
            }
            action => println!("{:<13} {}", action_label(action), item.path),
        }
    }
    // nothing was transferred, so there is no new sync point to record
    info!(actions = syncer.plan().len(), "plan only, state file left untouched");
    Ok(())
}
