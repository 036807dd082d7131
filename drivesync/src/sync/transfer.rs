use std::path::{Path, PathBuf};

use drivesync_core::Timestamp;
use thiserror::Error;
use tracing::{debug, info};

use super::conflict::conflict_path;
use super::resource::{ResourceKind, ResourceState};
use super::tree::{ResourceId, ResourceTree};
use crate::config::SyncOptions;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("{0} has no remote counterpart")]
    NotOnRemote(String),
    #[error("remote rejected {path}: {reason}")]
    Remote { path: String, reason: String },
}

/// Performs the compare-and-transfer pass over a subtree.
pub trait Syncer {
    /// Works through `root` and its descendants. Returns the watermark the
    /// pass ended on; returning `last_sync` unchanged means nothing moved it.
    fn sync(
        &mut self,
        tree: &ResourceTree,
        root: ResourceId,
        last_sync: Timestamp,
        options: &SyncOptions,
    ) -> Result<Timestamp, TransferError>;

    /// Renames the remote object behind `id` to match `new_path`.
    fn rename(
        &mut self,
        tree: &ResourceTree,
        id: ResourceId,
        new_path: &Path,
    ) -> Result<(), TransferError>;

    /// A collaborator that only plans moves nothing, so its pass must not
    /// move the watermark either.
    fn is_dry_run(&self) -> bool {
        false
    }
}

/// Watermark before a transfer pass, what the collaborator reported, and
/// the value kept afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatermarkUpdate {
    pub before: Timestamp,
    pub reported: Timestamp,
    pub after: Timestamp,
}

impl WatermarkUpdate {
    pub fn from_transfer(&self) -> bool {
        self.reported != self.before
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferAction {
    Upload,
    Download,
    DeleteLocal,
    DeleteRemote,
    KeepBoth { renamed_local: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedTransfer {
    pub path: String,
    pub kind: ResourceKind,
    pub action: TransferAction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedRename {
    pub remote_id: String,
    pub from: String,
    pub to: PathBuf,
}

/// Collaborator that decides what each resource needs without moving any
/// bytes. The watermark comes back untouched since nothing was transferred.
#[derive(Debug, Default)]
pub struct PlanningSyncer {
    plan: Vec<PlannedTransfer>,
    renames: Vec<PlannedRename>,
}

impl PlanningSyncer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plan(&self) -> &[PlannedTransfer] {
        &self.plan
    }

    pub fn renames(&self) -> &[PlannedRename] {
        &self.renames
    }

    fn visit(&mut self, tree: &ResourceTree, id: ResourceId) {
        let resource = tree.get(id);
        let action = if resource.is_root() {
            None
        } else {
            action_for(tree, id)
        };
        let prunes_subtree = matches!(
            action,
            Some(TransferAction::DeleteLocal | TransferAction::DeleteRemote)
        );
        if let Some(action) = action {
            let path = tree.rel_path(id);
            debug!(%path, kind = resource.kind().as_str(), ?action, "planned");
            self.plan.push(PlannedTransfer {
                path,
                kind: resource.kind(),
                action,
            });
        }
        // deleting a folder takes its contents along
        if prunes_subtree {
            return;
        }
        for child in tree.children(id) {
            self.visit(tree, child);
        }
    }
}

impl Syncer for PlanningSyncer {
    fn sync(
        &mut self,
        tree: &ResourceTree,
        root: ResourceId,
        last_sync: Timestamp,
        _options: &SyncOptions,
    ) -> Result<Timestamp, TransferError> {
        self.plan.clear();
        self.visit(tree, root);
        info!(actions = self.plan.len(), "transfer plan ready");
        Ok(last_sync)
    }

    fn rename(
        &mut self,
        tree: &ResourceTree,
        id: ResourceId,
        new_path: &Path,
    ) -> Result<(), TransferError> {
        let from = tree.rel_path(id);
        let remote_id = tree
            .get(id)
            .remote_id()
            .ok_or_else(|| TransferError::NotOnRemote(from.clone()))?
            .to_string();
        self.renames.push(PlannedRename {
            remote_id,
            from,
            to: new_path.to_path_buf(),
        });
        Ok(())
    }

    fn is_dry_run(&self) -> bool {
        true
    }
}

fn action_for(tree: &ResourceTree, id: ResourceId) -> Option<TransferAction> {
    let resource = tree.get(id);
    match resource.state() {
        ResourceState::Sync => None,
        ResourceState::LocalNew | ResourceState::LocalChanged => Some(TransferAction::Upload),
        ResourceState::RemoteNew | ResourceState::RemoteChanged => Some(TransferAction::Download),
        ResourceState::LocalDeleted => Some(TransferAction::DeleteRemote),
        ResourceState::RemoteDeleted => Some(TransferAction::DeleteLocal),
        ResourceState::Conflict => {
            let stamp = resource.local().mtime.unwrap_or(Timestamp::EPOCH);
            Some(TransferAction::KeepBoth {
                renamed_local: conflict_path(&tree.rel_path(id), stamp),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drivesync_core::Entry;

    fn ts(sec: i64) -> Timestamp {
        Timestamp::new(sec, 0)
    }

    fn sample_tree() -> ResourceTree {
        let mut tree = ResourceTree::new("root");
        let root = tree.root();

        let up = tree.add_child(root, "up.txt", ResourceKind::File);
        tree.get_mut(up).from_local(ts(200), ts(100));

        let down = tree.add_child(root, "down.txt", ResourceKind::File);
        tree.update(down, &Entry::file("d", "root", "down.txt", "src", ts(200)), ts(100));

        let gone = tree.add_child(root, "gone", ResourceKind::Folder);
        tree.get_mut(gone).from_local(ts(50), ts(100));
        let inside = tree.add_child(gone, "inner.txt", ResourceKind::File);
        tree.get_mut(inside).from_local(ts(50), ts(100));

        let both = tree.add_child(root, "both.txt", ResourceKind::File);
        tree.get_mut(both).from_local(ts(300), ts(100));
        tree.update(both, &Entry::file("b", "root", "both.txt", "src", ts(250)), ts(100));

        let same = tree.add_child(root, "same.txt", ResourceKind::File);
        tree.get_mut(same).from_local(ts(10), ts(100));
        tree.update(same, &Entry::file("s", "root", "same.txt", "src", ts(10)), ts(100));

        tree
    }

    #[test]
    fn plans_one_action_per_changed_resource() {
        let tree = sample_tree();
        let mut syncer = PlanningSyncer::new();

        let watermark = syncer
            .sync(&tree, tree.root(), ts(100), &SyncOptions::default())
            .unwrap();

        assert_eq!(watermark, ts(100));
        let actions: Vec<_> = syncer
            .plan()
            .iter()
            .map(|p| (p.path.as_str(), p.action.clone()))
            .collect();
        assert_eq!(
            actions,
            vec![
                (
                    "both.txt",
                    TransferAction::KeepBoth {
                        renamed_local: "both (conflict 300).txt".into()
                    }
                ),
                ("down.txt", TransferAction::Download),
                ("gone", TransferAction::DeleteLocal),
                ("up.txt", TransferAction::Upload),
            ]
        );
    }

    #[test]
    fn rename_requires_remote_identity() {
        let tree = sample_tree();
        let mut syncer = PlanningSyncer::new();
        let up = tree.find_child(tree.root(), "up.txt").unwrap();
        let down = tree.find_child(tree.root(), "down.txt").unwrap();

        assert!(matches!(
            syncer.rename(&tree, up, Path::new("up2.txt")),
            Err(TransferError::NotOnRemote(_))
        ));
        syncer.rename(&tree, down, Path::new("down2.txt")).unwrap();
        assert_eq!(
            syncer.renames(),
            [PlannedRename {
                remote_id: "d".into(),
                from: "down.txt".into(),
                to: PathBuf::from("down2.txt"),
            }]
        );
    }
}
