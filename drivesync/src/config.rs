use std::path::{Path, PathBuf};

use anyhow::Context;

const DEFAULT_SYNC_DIR_NAME: &str = "Drive";
const DEFAULT_STATE_FILE_NAME: &str = ".drivesync_state";
const DEFAULT_PAGE_SIZE: u32 = 1000;

/// Options the reconciler itself consumes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// Label of the tree root.
    pub path: String,
    /// Only this top-level directory is synced when set.
    pub dir: Option<String>,
    /// Extra ignore pattern, ORed with the built-in one.
    pub ignore: Option<String>,
    /// Start from the epoch watermark regardless of saved state.
    pub force: bool,
}

impl SyncOptions {
    pub fn restrict_dir(&self) -> Option<&str> {
        self.dir.as_deref().filter(|d| !d.is_empty())
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub root_dir: PathBuf,
    pub state_file: PathBuf,
    pub token: Option<String>,
    pub api_url: Option<String>,
    pub page_size: u32,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let home = dirs::home_dir().context("home directory is unavailable")?;
        let root_dir = std::env::var("DRIVESYNC_ROOT")
            .ok()
            .map(|value| expand_with_home(&value, &home))
            .unwrap_or_else(|| home.join(DEFAULT_SYNC_DIR_NAME));
        let state_file = std::env::var("DRIVESYNC_STATE_FILE")
            .ok()
            .map(|value| expand_with_home(&value, &home))
            .unwrap_or_else(|| root_dir.join(DEFAULT_STATE_FILE_NAME));
        let token = std::env::var("DRIVESYNC_TOKEN").ok().filter(|t| !t.is_empty());
        let api_url = std::env::var("DRIVESYNC_API_URL").ok().filter(|u| !u.is_empty());
        let page_size = read_u32_env("DRIVESYNC_PAGE_SIZE", DEFAULT_PAGE_SIZE);

        Ok(Self {
            root_dir,
            state_file,
            token,
            api_url,
            page_size,
        })
    }
}

fn expand_with_home(value: &str, home: &Path) -> PathBuf {
    if value == "~" {
        return home.to_path_buf();
    }
    if let Some(rest) = value.strip_prefix("~/") {
        return home.join(rest);
    }
    PathBuf::from(value)
}

fn read_u32_env(name: &str, default: u32) -> u32 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}
