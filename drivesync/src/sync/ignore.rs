use regex::Regex;
use thiserror::Error;

/// Local state, its half-written `.partial` copy and the trash directory are
/// never synced.
pub const BUILTIN_IGNORE: &str = r"\.(drivesync|drivesync_state(\.partial)?|trash)";

#[derive(Debug, Error)]
pub enum IgnoreError {
    #[error("invalid ignore pattern {pattern:?}: {source}")]
    Invalid {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Ignore rule built from an ordered list of regex fragments. A path is
/// ignored when any fragment matches the whole root-relative path.
#[derive(Debug, Clone)]
pub struct IgnorePolicy {
    fragments: Vec<String>,
    regex: Regex,
}

impl IgnorePolicy {
    pub fn new(user_pattern: Option<&str>) -> Result<Self, IgnoreError> {
        let mut fragments = Vec::new();
        if let Some(pattern) = user_pattern.filter(|p| !p.is_empty()) {
            fragments.push(pattern.to_string());
        }
        fragments.push(BUILTIN_IGNORE.to_string());
        Self::from_fragments(fragments)
    }

    pub fn from_fragments(fragments: Vec<String>) -> Result<Self, IgnoreError> {
        for fragment in &fragments {
            Regex::new(fragment).map_err(|source| IgnoreError::Invalid {
                pattern: fragment.clone(),
                source,
            })?;
        }
        let alternation = fragments
            .iter()
            .map(|f| format!("(?:{f})"))
            .collect::<Vec<_>>()
            .join("|");
        let combined = format!("^(?:{alternation})$");
        let regex = Regex::new(&combined).map_err(|source| IgnoreError::Invalid {
            pattern: combined.clone(),
            source,
        })?;
        Ok(Self { fragments, regex })
    }

    pub fn is_ignored(&self, rel_path: &str) -> bool {
        self.regex.is_match(rel_path)
    }

    pub fn fragments(&self) -> &[String] {
        &self.fragments
    }
}
