use crate::Timestamp;

/// Snapshot of one remote object as reported by a listing or the change feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    self_id: String,
    parent_ids: Vec<String>,
    name: String,
    filename: String,
    content_src: String,
    is_folder: bool,
    is_change: bool,
    modified: Timestamp,
}

impl Entry {
    pub fn file(
        self_id: impl Into<String>,
        parent_id: impl Into<String>,
        name: impl Into<String>,
        content_src: impl Into<String>,
        modified: Timestamp,
    ) -> Self {
        let name = name.into();
        Self {
            self_id: self_id.into(),
            parent_ids: vec![parent_id.into()],
            filename: name.clone(),
            name,
            content_src: content_src.into(),
            is_folder: false,
            is_change: false,
            modified,
        }
    }

    pub fn folder(
        self_id: impl Into<String>,
        parent_id: impl Into<String>,
        name: impl Into<String>,
        modified: Timestamp,
    ) -> Self {
        let name = name.into();
        Self {
            self_id: self_id.into(),
            parent_ids: vec![parent_id.into()],
            filename: name.clone(),
            name,
            content_src: String::new(),
            is_folder: true,
            is_change: false,
            modified,
        }
    }

    /// Replaces the parent set. The remote side allows an object to live in
    /// several folders at once.
    pub fn with_parents<I, S>(mut self, parents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parent_ids = parents.into_iter().map(Into::into).collect();
        self
    }

    /// On-disk name when it differs from the display name.
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self
    }

    pub fn into_change(mut self) -> Self {
        self.is_change = true;
        self
    }

    pub fn self_id(&self) -> &str {
        &self.self_id
    }

    pub fn parent_ids(&self) -> &[String] {
        &self.parent_ids
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.parent_ids.first().map(String::as_str)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Empty for cloud-native documents that have no byte content.
    pub fn content_src(&self) -> &str {
        &self.content_src
    }

    pub fn is_folder(&self) -> bool {
        self.is_folder
    }

    pub fn is_change(&self) -> bool {
        self.is_change
    }

    pub fn modified(&self) -> Timestamp {
        self.modified
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_defaults_filename_to_name() {
        let entry = Entry::file("f1", "root", "a.txt", "https://dl/f1", Timestamp::new(5, 0));
        assert_eq!(entry.filename(), "a.txt");
        assert_eq!(entry.parent_id(), Some("root"));
        assert!(!entry.is_folder());
        assert!(!entry.is_change());
    }

    #[test]
    fn with_parents_replaces_parent_set() {
        let entry = Entry::folder("d1", "root", "Docs", Timestamp::EPOCH).with_parents(["p1", "p2"]);
        assert_eq!(entry.parent_ids(), ["p1".to_string(), "p2".to_string()]);
        assert_eq!(entry.parent_id(), Some("p1"));
    }

    #[test]
    fn no_parents_yields_none() {
        let entry = Entry::folder("d1", "root", "Docs", Timestamp::EPOCH)
            .with_parents(Vec::<String>::new());
        assert_eq!(entry.parent_id(), None);
    }
}
