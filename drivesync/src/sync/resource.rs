use std::collections::BTreeMap;

use drivesync_core::{Entry, Timestamp};

use super::tree::ResourceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    File,
    Folder,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::File => "file",
            ResourceKind::Folder => "folder",
        }
    }
}

/// Where a resource stands relative to the last sync watermark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    Sync,
    LocalNew,
    LocalChanged,
    LocalDeleted,
    RemoteNew,
    RemoteChanged,
    RemoteDeleted,
    Conflict,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalSide {
    pub present: bool,
    pub mtime: Option<Timestamp>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteSide {
    pub id: Option<String>,
    pub parent_id: Option<String>,
    pub filename: String,
    pub content_src: String,
    pub mtime: Option<Timestamp>,
}

#[derive(Debug, Clone)]
pub struct Resource {
    name: String,
    kind: ResourceKind,
    pub(super) parent: Option<ResourceId>,
    pub(super) children: BTreeMap<String, ResourceId>,
    local: LocalSide,
    remote: RemoteSide,
    state: ResourceState,
}

impl Resource {
    pub(super) fn new(name: impl Into<String>, kind: ResourceKind, parent: Option<ResourceId>) -> Self {
        Self {
            name: name.into(),
            kind,
            parent,
            children: BTreeMap::new(),
            local: LocalSide::default(),
            remote: RemoteSide::default(),
            state: ResourceState::Sync,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn is_folder(&self) -> bool {
        self.kind == ResourceKind::Folder
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn parent(&self) -> Option<ResourceId> {
        self.parent
    }

    pub fn local(&self) -> &LocalSide {
        &self.local
    }

    pub fn remote(&self) -> &RemoteSide {
        &self.remote
    }

    pub fn remote_id(&self) -> Option<&str> {
        self.remote.id.as_deref()
    }

    pub fn state(&self) -> ResourceState {
        self.state
    }

    /// Records the local file as present with the given modification time.
    pub fn from_local(&mut self, mtime: Timestamp, last_sync: Timestamp) {
        self.local = LocalSide {
            present: true,
            mtime: Some(mtime),
        };
        self.state = if self.remote.id.is_some() {
            self.classify(last_sync)
        } else if mtime > last_sync {
            ResourceState::LocalNew
        } else {
            // it was here at the last sync and the remote has not shown it
            ResourceState::RemoteDeleted
        };
    }

    /// Copies remote attributes from `entry`. `last_sync` is the watermark
    /// the remote modification time is judged against.
    pub(super) fn from_remote(&mut self, entry: &Entry, last_sync: Timestamp) {
        self.remote = RemoteSide {
            id: Some(entry.self_id().to_string()),
            parent_id: entry.parent_id().map(str::to_string),
            filename: entry.filename().to_string(),
            content_src: entry.content_src().to_string(),
            mtime: Some(entry.modified()),
        };
        self.state = if self.local.present {
            self.classify(last_sync)
        } else if entry.modified() > last_sync {
            ResourceState::RemoteNew
        } else {
            ResourceState::LocalDeleted
        };
    }

    pub(super) fn set_remote_id(&mut self, id: impl Into<String>) {
        self.remote.id = Some(id.into());
    }

    fn classify(&self, last_sync: Timestamp) -> ResourceState {
        if self.is_folder() {
            return ResourceState::Sync;
        }
        let local_changed = self.local.mtime.is_some_and(|t| t > last_sync);
        let remote_changed = self.remote.mtime.is_some_and(|t| t > last_sync);
        match (local_changed, remote_changed) {
            (false, false) => ResourceState::Sync,
            (true, false) => ResourceState::LocalChanged,
            (false, true) => ResourceState::RemoteChanged,
            (true, true) => ResourceState::Conflict,
        }
    }
}
