use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use drivesync_core::{Entry, Timestamp};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use super::ignore::{IgnoreError, IgnorePolicy};
use super::persist::{self, PersistError, Watermarks};
use super::resource::ResourceKind;
use super::transfer::{Syncer, TransferError, WatermarkUpdate};
use super::tree::{ResourceId, ResourceTree};
use crate::config::SyncOptions;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("ignore pattern error: {0}")]
    Ignore(#[from] IgnoreError),
    #[error("state file error: {0}")]
    Persist(#[from] PersistError),
    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),
    #[error("no resource at {0}")]
    NotFound(PathBuf),
}

/// Why an entry was not merged. None of these are errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    OutsideDir,
    NoContent,
    SlashInName,
    AmbiguousParent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Merged into the tree, or deliberately left out by the ignore policy.
    Merged,
    Skipped(SkipReason),
    /// Parent not known yet; queued for [`SyncState::resolve_entries`].
    Deferred,
    /// Change for an object this run has never seen.
    Dropped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Resolution {
    pub resolved: usize,
    pub passes: usize,
    pub orphaned: usize,
}

/// Merged local/remote view for one run, plus the watermarks carried
/// between runs.
#[derive(Debug)]
pub struct SyncState {
    tree: ResourceTree,
    options: SyncOptions,
    ignore: IgnorePolicy,
    last_sync: Timestamp,
    change_stamp: Option<i64>,
    unresolved: Vec<Entry>,
    orphans: Vec<Entry>,
}

impl SyncState {
    pub fn new(options: SyncOptions, watermarks: Watermarks) -> Result<Self, StateError> {
        let ignore = IgnorePolicy::new(options.ignore.as_deref())?;
        let last_sync = if options.force {
            Timestamp::EPOCH
        } else {
            watermarks.last_sync
        };
        debug!(%last_sync, change_stamp = ?watermarks.change_stamp, "sync state ready");
        Ok(Self {
            tree: ResourceTree::new(options.path.clone()),
            options,
            ignore,
            last_sync,
            change_stamp: watermarks.change_stamp,
            unresolved: Vec::new(),
            orphans: Vec::new(),
        })
    }

    pub fn open(state_file: &Path, options: SyncOptions) -> Result<Self, StateError> {
        Self::new(options, persist::load(state_file))
    }

    pub fn save(&self, state_file: &Path) -> Result<(), StateError> {
        persist::save(
            state_file,
            &Watermarks {
                last_sync: self.last_sync,
                change_stamp: self.change_stamp,
            },
        )?;
        Ok(())
    }

    pub fn tree(&self) -> &ResourceTree {
        &self.tree
    }

    pub fn last_sync(&self) -> Timestamp {
        self.last_sync
    }

    pub fn change_stamp(&self) -> Option<i64> {
        self.change_stamp
    }

    pub fn set_change_stamp(&mut self, stamp: i64) {
        debug!(stamp, "change stamp set");
        self.change_stamp = Some(stamp);
    }

    pub fn unresolved(&self) -> &[Entry] {
        &self.unresolved
    }

    /// Entries whose parent never showed up during this run.
    pub fn orphans(&self) -> &[Entry] {
        &self.orphans
    }

    pub fn find_by_remote_id(&self, remote_id: &str) -> Option<ResourceId> {
        self.tree.find_by_remote_id(remote_id)
    }

    /// Binds the tree root to the remote root folder's identifier.
    pub fn set_root_id(&mut self, remote_id: &str) {
        let root = self.tree.root();
        self.tree.set_remote_id(root, remote_id);
    }

    /// Mirrors the directory at `root_dir` onto the tree. Existing nodes are
    /// refreshed, missing ones created; nothing is ever removed here.
    pub fn from_local(&mut self, root_dir: &Path) -> Result<(), StateError> {
        let root = self.tree.root();
        self.walk_local(root_dir, root)
    }

    fn walk_local(&mut self, dir: &Path, folder: ResourceId) -> Result<(), StateError> {
        let mtime = modified_time(dir)?;
        self.tree.get_mut(folder).from_local(mtime, self.last_sync);

        let is_root = self.tree.get(folder).is_root();
        let entries = fs::read_dir(dir).map_err(|source| StateError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        for entry in entries {
            let entry = entry.map_err(|source| StateError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
            let entry_path = entry.path();
            let Some(fname) = entry.file_name().to_str().map(str::to_string) else {
                debug!(path = %entry_path.display(), "name is not valid UTF-8, ignored");
                continue;
            };

            let rel = self.tree.child_path(folder, &fname);
            if self.ignore.is_ignored(&rel) {
                debug!(path = %rel, "file is ignored");
                continue;
            }

            if is_root
                && let Some(only) = self.options.restrict_dir()
                && fname != only
            {
                debug!(name = %fname, "outside the synced directory, ignored");
                continue;
            }

            // follows symlinks, so a dangling link reports NotFound
            let meta = match fs::metadata(&entry_path) {
                Ok(meta) => meta,
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    debug!(path = %entry_path.display(), "file doesn't exist (broken link?), ignored");
                    continue;
                }
                Err(source) => {
                    return Err(StateError::Io {
                        path: entry_path,
                        source,
                    });
                }
            };

            let is_dir = meta.is_dir();
            let child = match self.tree.find_child(folder, &fname) {
                Some(child) => child,
                None => {
                    let kind = if is_dir {
                        ResourceKind::Folder
                    } else {
                        ResourceKind::File
                    };
                    let child = self.tree.add_child(folder, fname.as_str(), kind);
                    self.tree.insert(child);
                    child
                }
            };

            if is_dir != self.tree.get(child).is_folder() {
                debug!(path = %rel, "changed between file and folder, ignored");
                continue;
            }

            let mtime = meta
                .modified()
                .map(Timestamp::from)
                .map_err(|source| StateError::Io {
                    path: entry_path.clone(),
                    source,
                })?;
            self.tree.get_mut(child).from_local(mtime, self.last_sync);

            if is_dir {
                self.walk_local(&entry_path, child)?;
            }
        }
        Ok(())
    }

    /// Feeds one remote entry into the tree.
    pub fn from_remote(&mut self, entry: &Entry) -> MergeOutcome {
        let kind = if entry.is_folder() { "folder" } else { "file" };
        let root_id = self.tree.get(self.tree.root()).remote_id();

        if entry.parent_id().is_some()
            && entry.parent_id() == root_id
            && let Some(dir) = self.options.restrict_dir()
            && entry.name() != dir
        {
            debug!(kind, name = entry.name(), "outside the synced directory, ignored");
            return MergeOutcome::Skipped(SkipReason::OutsideDir);
        }

        if !entry.is_folder() && (entry.filename().is_empty() || entry.content_src().is_empty()) {
            debug!(kind, name = entry.name(), "cloud-native document, ignored");
            return MergeOutcome::Skipped(SkipReason::NoContent);
        }

        if entry.name().contains('/') || entry.filename().contains('/') {
            debug!(kind, name = entry.name(), "name contains a slash, ignored");
            return MergeOutcome::Skipped(SkipReason::SlashInName);
        }

        if !entry.is_change() && entry.parent_ids().len() != 1 {
            debug!(
                kind,
                name = entry.name(),
                parents = entry.parent_ids().len(),
                "not exactly one parent, ignored"
            );
            return MergeOutcome::Skipped(SkipReason::AmbiguousParent);
        }

        if entry.is_change() {
            return if self.from_change(entry) {
                MergeOutcome::Merged
            } else {
                MergeOutcome::Dropped
            };
        }

        if self.update(entry) {
            MergeOutcome::Merged
        } else {
            trace!(id = entry.self_id(), "parent not known yet, deferred");
            self.unresolved.push(entry.clone());
            MergeOutcome::Deferred
        }
    }

    /// Applies a change-feed entry to the resource it names. The feed only
    /// lists what changed, so the entry is judged against the epoch.
    pub fn from_change(&mut self, entry: &Entry) -> bool {
        match self.tree.find_by_remote_id(entry.self_id()) {
            Some(id) => {
                self.tree.update(id, entry, Timestamp::EPOCH);
                true
            }
            None => {
                trace!(id = entry.self_id(), "change for unknown object dropped");
                false
            }
        }
    }

    /// Merges an ordinary entry. Returns `false` only when its parent is not
    /// in the tree yet.
    pub fn update(&mut self, entry: &Entry) -> bool {
        if let Some(id) = self.tree.find_by_remote_id(entry.self_id()) {
            let path = self.tree.rel_path(id);
            if self.ignore.is_ignored(&path) {
                debug!(%path, "file is ignored");
                return true;
            }
            self.tree.update(id, entry, self.last_sync);
            return true;
        }

        let Some(parent) = entry
            .parent_id()
            .and_then(|parent_id| self.tree.find_by_remote_id(parent_id))
        else {
            return false;
        };

        if !self.tree.get(parent).is_folder() {
            debug!(
                id = entry.self_id(),
                parent = %self.tree.rel_path(parent),
                "parent is a file, ignored"
            );
            return true;
        }

        let path = self.tree.child_path(parent, entry.name());
        if self.ignore.is_ignored(&path) {
            debug!(%path, "file is ignored");
            return true;
        }

        let child = match self.tree.find_child(parent, entry.name()) {
            Some(child) => Some(child),
            None if entry.is_folder() || !entry.filename().is_empty() => {
                let kind = if entry.is_folder() {
                    ResourceKind::Folder
                } else {
                    ResourceKind::File
                };
                let child = self.tree.add_child(parent, entry.name(), kind);
                self.tree.insert(child);
                Some(child)
            }
            None => None,
        };
        if let Some(child) = child {
            self.tree.update(child, entry, self.last_sync);
        }
        true
    }

    /// Retries deferred entries until a full pass resolves none of them.
    /// Whatever is left becomes an orphan and is not retried again.
    pub fn resolve_entries(&mut self) -> Resolution {
        let mut resolution = Resolution::default();
        while !self.unresolved.is_empty() {
            resolution.passes += 1;
            let count = self.try_resolve_entries();
            if count == 0 {
                break;
            }
            resolution.resolved += count;
        }
        if !self.unresolved.is_empty() {
            resolution.orphaned = self.unresolved.len();
            for entry in &self.unresolved {
                debug!(
                    id = entry.self_id(),
                    name = entry.name(),
                    parent = ?entry.parent_id(),
                    "parent never appeared, entry orphaned"
                );
            }
            self.orphans.append(&mut self.unresolved);
        }
        resolution
    }

    fn try_resolve_entries(&mut self) -> usize {
        let pending = std::mem::take(&mut self.unresolved);
        let before = pending.len();
        let mut still = Vec::with_capacity(before);
        for entry in pending {
            if !self.update(&entry) {
                still.push(entry);
            }
        }
        self.unresolved = still;
        before - self.unresolved.len()
    }

    /// Runs the transfer pass and moves the watermark forward. If the
    /// collaborator reports the watermark it was given, the local clock is
    /// used instead. A dry-run pass leaves the watermark where it was.
    pub fn sync(&mut self, syncer: &mut dyn Syncer) -> Result<WatermarkUpdate, StateError> {
        let before = self.last_sync;
        let reported = syncer.sync(&self.tree, self.tree.root(), before, &self.options)?;
        let after = if syncer.is_dry_run() {
            debug!(%before, "dry run, watermark kept");
            before
        } else if reported == before {
            trace!(%before, "nothing moved the watermark, using local time");
            Timestamp::now().max(before)
        } else {
            trace!(%reported, "watermark from transfer pass");
            reported
        };
        self.last_sync = after;
        info!(last_sync = %after, "sync pass finished");
        Ok(WatermarkUpdate {
            before,
            reported,
            after,
        })
    }

    /// Renames a local file and asks the collaborator to do the same
    /// remotely. Paths are relative to `root_dir`. A failed remote rename
    /// leaves the local rename in place.
    pub fn rename(
        &mut self,
        syncer: &mut dyn Syncer,
        root_dir: &Path,
        old: &Path,
        new: &Path,
    ) -> Result<(), StateError> {
        let id = self.find_by_path(old)?;
        let from = root_dir.join(old);
        fs::rename(&from, root_dir.join(new)).map_err(|source| StateError::Io {
            path: from.clone(),
            source,
        })?;
        if let Err(err) = syncer.rename(&self.tree, id, new) {
            warn!(from = %old.display(), to = %new.display(), error = %err, "remote rename failed");
            return Err(err.into());
        }
        Ok(())
    }

    /// Follows `path` from the root one segment at a time.
    pub fn find_by_path(&self, path: &Path) -> Result<ResourceId, StateError> {
        let mut cursor = self.tree.root();
        for component in path.components() {
            match component {
                Component::CurDir => continue,
                Component::Normal(part) => {
                    cursor = part
                        .to_str()
                        .and_then(|name| self.tree.find_child(cursor, name))
                        .ok_or_else(|| StateError::NotFound(path.to_path_buf()))?;
                }
                Component::RootDir | Component::ParentDir | Component::Prefix(_) => {
                    return Err(StateError::NotFound(path.to_path_buf()));
                }
            }
        }
        Ok(cursor)
    }
}

fn modified_time(path: &Path) -> Result<Timestamp, StateError> {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .map(Timestamp::from)
        .map_err(|source| StateError::Io {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
