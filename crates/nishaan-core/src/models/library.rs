//! Local view of the user's bookmarks and groups.
//!
//! The coordinator mutates this optimistically before the backend
//! confirms, and replaces it wholesale when it reconciles.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::{Bookmark, Group, Operation};

/// Prefix for ids of entities that exist only locally.
pub const TEMP_ID_PREFIX: &str = "temp-";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Library {
    pub bookmarks: Vec<Bookmark>,
    pub archived: Vec<Bookmark>,
    pub groups: Vec<Group>,
}

impl Library {
    #[cfg(test)]
    pub fn bookmark(&self, id: &str) -> Option<&Bookmark> {
        self.bookmarks
            .iter()
            .chain(self.archived.iter())
            .find(|b| b.id == id)
    }

    fn bookmark_mut(&mut self, id: &str) -> Option<&mut Bookmark> {
        self.bookmarks
            .iter_mut()
            .chain(self.archived.iter_mut())
            .find(|b| b.id == id)
    }

    pub fn group(&self, id: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.id == id)
    }

    /// Apply an operation locally, ahead of backend confirmation.
    pub fn apply(&mut self, operation: &Operation) {
        match operation {
            Operation::CreateBookmark { url, group_id } => {
                let bookmark = Bookmark::provisional(temp_id(), url.clone(), group_id.clone());
                self.bookmarks.insert(0, bookmark);
            }
            Operation::UpdateBookmark { id, data } => {
                if let Some(bookmark) = self.bookmark_mut(id) {
                    data.apply_to(bookmark);
                }
            }
            Operation::DeleteBookmark { id } => {
                self.bookmarks.retain(|b| &b.id != id);
                self.archived.retain(|b| &b.id != id);
            }
            Operation::ToggleFavorite { id, is_favorite } => {
                if let Some(bookmark) = self.bookmark_mut(id) {
                    bookmark.is_favorite = *is_favorite;
                }
            }
            Operation::ArchiveBookmark { id } => {
                if let Some(pos) = self.bookmarks.iter().position(|b| &b.id == id) {
                    let mut bookmark = self.bookmarks.remove(pos);
                    bookmark.is_archived = true;
                    self.archived.insert(0, bookmark);
                }
            }
            Operation::RestoreBookmark { id } => {
                if let Some(pos) = self.archived.iter().position(|b| &b.id == id) {
                    let mut bookmark = self.archived.remove(pos);
                    bookmark.is_archived = false;
                    self.bookmarks.insert(0, bookmark);
                }
            }
            Operation::AddTag { id, tag } => {
                if let Some(bookmark) = self.bookmark_mut(id) {
                    if !bookmark.tags.contains(tag) {
                        bookmark.tags.push(tag.clone());
                    }
                }
            }
            Operation::RemoveTag { id, tag } => {
                if let Some(bookmark) = self.bookmark_mut(id) {
                    bookmark.tags.retain(|t| t != tag);
                }
            }
            Operation::CreateGroup(data) => {
                let now = Utc::now().to_rfc3339();
                self.groups.push(Group {
                    id: temp_id(),
                    name: data.name.clone(),
                    color: data.color.clone(),
                    sort_order: self.groups.len() as i64,
                    created_at: Some(now.clone()),
                    updated_at: Some(now),
                });
            }
            Operation::UpdateGroup { id, data } => {
                if let Some(group) = self.groups.iter_mut().find(|g| &g.id == id) {
                    group.name = data.name.clone();
                    group.color = data.color.clone();
                }
            }
            Operation::DeleteGroup { id } => {
                self.groups.retain(|g| &g.id != id);
                for bookmark in self.bookmarks.iter_mut().chain(self.archived.iter_mut()) {
                    if bookmark.group_id.as_deref() == Some(id.as_str()) {
                        bookmark.group_id = None;
                    }
                }
            }
        }
    }

    /// Number of bookmarks carrying `tag`.
    pub fn tag_count(&self, tag: &str) -> usize {
        self.bookmarks
            .iter()
            .filter(|b| b.tags.iter().any(|t| t == tag))
            .count()
    }
}

fn temp_id() -> String {
    format!("{}{}", TEMP_ID_PREFIX, Utc::now().timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BookmarkUpdate, GroupData};

    fn sample() -> Library {
        let mut a = Bookmark::provisional("b1".into(), "https://a.test".into(), Some("g1".into()));
        a.tags = vec!["read-later".into()];
        let b = Bookmark::provisional("b2".into(), "https://b.test".into(), None);
        Library {
            bookmarks: vec![a, b],
            archived: Vec::new(),
            groups: vec![Group {
                id: "g1".into(),
                name: "Work".into(),
                color: "#000".into(),
                sort_order: 0,
                created_at: None,
                updated_at: None,
            }],
        }
    }

    #[test]
    fn test_create_bookmark_prepends_provisional() {
        let mut library = sample();
        library.apply(&Operation::CreateBookmark {
            url: "https://new.test".into(),
            group_id: None,
        });
        assert_eq!(library.bookmarks.len(), 3);
        assert!(library.bookmarks[0].id.starts_with(TEMP_ID_PREFIX));
        assert_eq!(library.bookmarks[0].url, "https://new.test");
    }

    #[test]
    fn test_update_bookmark() {
        let mut library = sample();
        library.apply(&Operation::UpdateBookmark {
            id: "b2".into(),
            data: BookmarkUpdate {
                title: Some("Renamed".into()),
                ..Default::default()
            },
        });
        assert_eq!(library.bookmark("b2").unwrap().title.as_deref(), Some("Renamed"));
    }

    #[test]
    fn test_archive_and_restore_move_between_lists() {
        let mut library = sample();
        library.apply(&Operation::ArchiveBookmark { id: "b1".into() });
        assert_eq!(library.bookmarks.len(), 1);
        assert!(library.archived[0].is_archived);

        library.apply(&Operation::RestoreBookmark { id: "b1".into() });
        assert!(library.archived.is_empty());
        assert_eq!(library.bookmarks[0].id, "b1");
        assert!(!library.bookmarks[0].is_archived);
    }

    #[test]
    fn test_tags_are_deduplicated() {
        let mut library = sample();
        let op = Operation::AddTag {
            id: "b2".into(),
            tag: "read-later".into(),
        };
        library.apply(&op);
        library.apply(&op);
        assert_eq!(library.tag_count("read-later"), 2);

        library.apply(&Operation::RemoveTag {
            id: "b1".into(),
            tag: "read-later".into(),
        });
        assert_eq!(library.tag_count("read-later"), 1);
    }

    #[test]
    fn test_delete_group_ungroups_bookmarks() {
        let mut library = sample();
        library.apply(&Operation::DeleteGroup { id: "g1".into() });
        assert!(library.groups.is_empty());
        assert_eq!(library.bookmark("b1").unwrap().group_id, None);
    }

    #[test]
    fn test_group_create_and_update() {
        let mut library = sample();
        library.apply(&Operation::CreateGroup(GroupData {
            name: "Later".into(),
            color: "#fff".into(),
        }));
        assert_eq!(library.groups.len(), 2);

        library.apply(&Operation::UpdateGroup {
            id: "g1".into(),
            data: GroupData {
                name: "Office".into(),
                color: "#123".into(),
            },
        });
        assert_eq!(library.group("g1").unwrap().name, "Office");
    }
}
