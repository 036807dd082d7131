use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::{Entry, Timestamp};

const DEFAULT_BASE_URL: &str = "https://www.googleapis.com";
const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

#[derive(Debug, Error)]
pub enum DriveError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("api returned {status}: {body}")]
    Api { status: StatusCode, body: String },
    #[error("invalid modified time on {id}: {source}")]
    Modified {
        id: String,
        #[source]
        source: time::error::Parse,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorClass {
    Auth,
    RateLimit,
    Transient,
    Permanent,
}

#[derive(Clone)]
pub struct DriveClient {
    http: Client,
    base_url: Url,
    token: String,
}

/// One page-walk over the change feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeFeed {
    pub entries: Vec<Entry>,
    pub largest_change_id: i64,
}

impl DriveClient {
    pub fn new(token: impl Into<String>) -> Result<Self, DriveError> {
        Self::with_base_url(DEFAULT_BASE_URL, token)
    }

    pub fn with_base_url(base_url: &str, token: impl Into<String>) -> Result<Self, DriveError> {
        Ok(Self {
            http: Client::new(),
            base_url: Url::parse(base_url)?,
            token: token.into(),
        })
    }

    pub async fn about(&self) -> Result<About, DriveError> {
        let url = self.endpoint("/drive/v2/about")?;
        let response = self
            .http
            .get(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        Self::handle_response(response).await
    }

    /// Full listing of every non-trashed object, following `nextPageToken`.
    pub async fn list_entries(&self, page_size: u32) -> Result<Vec<Entry>, DriveError> {
        let page_size = page_size.max(1);
        let mut page_token: Option<String> = None;
        let mut entries = Vec::new();
        loop {
            let mut url = self.endpoint("/drive/v2/files")?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("maxResults", &page_size.to_string());
                query.append_pair("q", "trashed=false");
                if let Some(token) = page_token.as_deref() {
                    query.append_pair("pageToken", token);
                }
            }
            let response = self
                .http
                .get(url)
                .header("Authorization", self.auth_header_value())
                .send()
                .await?;
            let page: FileList = Self::handle_response(response).await?;
            for file in page.items {
                entries.push(file.into_entry(false)?);
            }
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        Ok(entries)
    }

    /// Changes after `start_change_id`. Deleted objects are left out; the
    /// next full listing no longer reports them.
    pub async fn list_changes(
        &self,
        start_change_id: i64,
        page_size: u32,
    ) -> Result<ChangeFeed, DriveError> {
        let page_size = page_size.max(1);
        let mut page_token: Option<String> = None;
        let mut feed = ChangeFeed {
            entries: Vec::new(),
            largest_change_id: start_change_id,
        };
        loop {
            let mut url = self.endpoint("/drive/v2/changes")?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("maxResults", &page_size.to_string());
                query.append_pair("startChangeId", &start_change_id.to_string());
                if let Some(token) = page_token.as_deref() {
                    query.append_pair("pageToken", token);
                }
            }
            let response = self
                .http
                .get(url)
                .header("Authorization", self.auth_header_value())
                .send()
                .await?;
            let page: ChangeList = Self::handle_response(response).await?;
            feed.largest_change_id = feed.largest_change_id.max(page.largest_change_id);
            for change in page.items {
                if change.deleted {
                    continue;
                }
                if let Some(file) = change.file {
                    feed.entries.push(file.into_entry(true)?);
                }
            }
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        Ok(feed)
    }

    fn auth_header_value(&self) -> String {
        format!("Bearer {}", self.token)
    }

    fn endpoint(&self, path: &str) -> Result<Url, DriveError> {
        Ok(self.base_url.join(path)?)
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, DriveError> {
        if response.status().is_success() {
            Ok(response.json::<T>().await?)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(DriveError::Api { status, body })
        }
    }
}

impl DriveError {
    pub fn classification(&self) -> Option<ApiErrorClass> {
        match self {
            DriveError::Api { status, .. } => Some(classify_api_status(*status)),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self.classification(),
            Some(ApiErrorClass::RateLimit | ApiErrorClass::Transient)
        )
    }
}

fn classify_api_status(status: StatusCode) -> ApiErrorClass {
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        ApiErrorClass::Auth
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        ApiErrorClass::RateLimit
    } else if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
        ApiErrorClass::Transient
    } else {
        ApiErrorClass::Permanent
    }
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct About {
    pub root_folder_id: String,
    #[serde(default)]
    pub largest_change_id: Option<String>,
}

impl About {
    /// Change-feed cursor as of this response, if the server reported one.
    pub fn change_stamp(&self) -> Option<i64> {
        self.largest_change_id.as_deref()?.parse().ok()
    }
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub original_filename: Option<String>,
    pub mime_type: String,
    #[serde(default)]
    pub parents: Vec<ParentRef>,
    #[serde(default)]
    pub download_url: Option<String>,
    pub modified_date: String,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentRef {
    pub id: String,
}

impl RemoteFile {
    pub fn into_entry(self, is_change: bool) -> Result<Entry, DriveError> {
        let modified =
            Timestamp::parse_rfc3339(&self.modified_date).map_err(|source| DriveError::Modified {
                id: self.id.clone(),
                source,
            })?;
        let parents = self.parents.into_iter().map(|p| p.id);
        let entry = if self.mime_type == FOLDER_MIME_TYPE {
            Entry::folder(self.id, String::new(), self.title, modified)
        } else {
            // cloud-native documents carry neither a download url nor an
            // original filename
            let filename = self.original_filename.map(|_| self.title.clone());
            Entry::file(
                self.id,
                String::new(),
                self.title,
                self.download_url.unwrap_or_default(),
                modified,
            )
            .with_filename(filename.unwrap_or_default())
        };
        let entry = entry.with_parents(parents);
        Ok(if is_change {
            entry.into_change()
        } else {
            entry
        })
    }
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    items: Vec<RemoteFile>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChangeList {
    #[serde(default)]
    items: Vec<Change>,
    #[serde(default)]
    next_page_token: Option<String>,
    #[serde(default, with = "string_or_int")]
    largest_change_id: i64,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct Change {
    #[serde(default)]
    deleted: bool,
    #[serde(default)]
    file: Option<RemoteFile>,
}

// The v2 API encodes int64 values as JSON strings.
mod string_or_int {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &i64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Int(value) => Ok(value),
            Raw::Text(text) => text.parse().map_err(serde::de::Error::custom),
        }
    }
}
