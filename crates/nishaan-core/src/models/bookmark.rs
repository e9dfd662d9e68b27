//! Domain models for bookmarks and groups.
//!
//! These mirror the rows the backend returns, trimmed to the fields the
//! offline layer reads or mutates optimistically.

use serde::{Deserialize, Serialize};

/// How a bookmark entered the library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookmarkSource {
    #[default]
    Manual,
    TextExtract,
    Screenshot,
    Import,
    Extension,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bookmark {
    pub id: String,
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub favicon_url: Option<String>,
    pub preview_image_url: Option<String>,
    pub site_name: Option<String>,
    pub group_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub sort_order: i64,
    #[serde(default)]
    pub source: BookmarkSource,
    #[serde(default)]
    pub is_archived: bool,
    #[serde(default)]
    pub is_favorite: bool,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl Bookmark {
    /// Placeholder shown while a create is in flight or queued.
    pub fn provisional(id: String, url: String, group_id: Option<String>) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id,
            url,
            title: None,
            description: None,
            favicon_url: None,
            preview_image_url: None,
            site_name: None,
            group_id,
            tags: Vec::new(),
            sort_order: 0,
            source: BookmarkSource::Manual,
            is_archived: false,
            is_favorite: false,
            created_at: Some(now.clone()),
            updated_at: Some(now),
        }
    }

    /// Display title, falling back to the URL.
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.url)
    }
}

/// Editable bookmark fields. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookmarkUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
}

impl BookmarkUpdate {
    pub fn apply_to(&self, bookmark: &mut Bookmark) {
        if let Some(ref title) = self.title {
            bookmark.title = Some(title.clone());
        }
        if let Some(ref description) = self.description {
            bookmark.description = Some(description.clone());
        }
        if let Some(ref group_id) = self.group_id {
            bookmark.group_id = Some(group_id.clone());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub name: String,
    pub color: String,
    #[serde(default)]
    pub sort_order: i64,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

/// Name and color, the only user-editable group fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupData {
    pub name: String,
    pub color: String,
}

/// Best-effort page metadata captured when a bookmark is created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub site_name: Option<String>,
    pub preview_image_url: Option<String>,
    pub favicon_url: Option<String>,
}
