//! `ViewSnapshot` — the value delivered to subscribers, plus the read-only
//! selectors the presentation layer consumes.

use std::collections::HashMap;

use crate::entity::{Group, Prompt, PromptVersion};
use crate::sync::types::SyncStatus;

#[derive(Debug, Clone)]
pub struct ViewSnapshot {
    pub prompts: HashMap<String, Prompt>,
    pub groups: HashMap<String, Group>,
    pub prompt_versions: HashMap<String, PromptVersion>,
    pub pending_count: usize,
    pub status: SyncStatus,
    pub last_sync_id: i64,
    pub ready: bool,
}

impl Default for ViewSnapshot {
    fn default() -> Self {
        Self {
            prompts: HashMap::new(),
            groups: HashMap::new(),
            prompt_versions: HashMap::new(),
            pending_count: 0,
            status: SyncStatus::Idle,
            last_sync_id: 0,
            ready: false,
        }
    }
}

impl ViewSnapshot {
    /// Non-deleted prompts.
    pub fn active_prompts(&self) -> Vec<&Prompt> {
        self.prompts.values().filter(|p| !p.is_deleted).collect()
    }

    pub fn active_groups(&self) -> Vec<&Group> {
        self.groups.values().filter(|g| !g.is_deleted).collect()
    }

    /// Non-deleted Prompts where `isFavorite` is set.
    pub fn favorites(&self) -> Vec<&Prompt> {
        self.prompts
            .values()
            .filter(|p| !p.is_deleted && p.is_favorite)
            .collect()
    }

    pub fn prompts_in_group(&self, group_id: &str) -> Vec<&Prompt> {
        self.prompts
            .values()
            .filter(|p| !p.is_deleted && p.group_id.as_deref() == Some(group_id))
            .collect()
    }

    /// Versions of a specific Prompt, newest-first by `createdAt`.
    pub fn versions_of(&self, prompt_id: &str) -> Vec<&PromptVersion> {
        let mut versions: Vec<&PromptVersion> = self
            .prompt_versions
            .values()
            .filter(|v| !v.is_deleted && v.prompt_id == prompt_id)
            .collect();
        versions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        versions
    }

    pub fn sync_status(&self) -> &SyncStatus {
        &self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Envelope;

    fn prompt(id: &str, group_id: Option<&str>, favorite: bool) -> Prompt {
        Prompt {
            id: id.to_string(),
            title: "t".to_string(),
            content: "c".to_string(),
            category: "".to_string(),
            is_favorite: favorite,
            group_id: group_id.map(String::from),
            created_at: "2024-01-01T00:00:00Z".to_string(),
            updated_at: "2024-01-01T00:00:00Z".to_string(),
            sync_id: None,
            is_deleted: false,
        }
    }

    #[test]
    fn favorites_filters_both_deleted_and_non_favorite() {
        let mut snap = ViewSnapshot::default();
        let mut deleted_fav = prompt("p1", None, true);
        deleted_fav.set_deleted(true);
        snap.prompts.insert("p1".to_string(), deleted_fav);
        snap.prompts.insert("p2".to_string(), prompt("p2", None, true));
        snap.prompts.insert("p3".to_string(), prompt("p3", None, false));

        let favs = snap.favorites();
        assert_eq!(favs.len(), 1);
        assert_eq!(favs[0].id, "p2");
    }

    #[test]
    fn prompts_in_group_matches_group_id() {
        let mut snap = ViewSnapshot::default();
        snap.prompts.insert("p1".to_string(), prompt("p1", Some("g1"), false));
        snap.prompts.insert("p2".to_string(), prompt("p2", Some("g2"), false));

        let in_group = snap.prompts_in_group("g1");
        assert_eq!(in_group.len(), 1);
        assert_eq!(in_group[0].id, "p1");
    }

    #[test]
    fn versions_of_orders_newest_first() {
        let mut snap = ViewSnapshot::default();
        snap.prompt_versions.insert(
            "v1".to_string(),
            PromptVersion {
                id: "v1".to_string(),
                prompt_id: "p1".to_string(),
                content: "old".to_string(),
                note: None,
                created_at: "2024-01-01T00:00:00Z".to_string(),
                updated_at: "2024-01-01T00:00:00Z".to_string(),
                sync_id: None,
                is_deleted: false,
            },
        );
        snap.prompt_versions.insert(
            "v2".to_string(),
            PromptVersion {
                id: "v2".to_string(),
                prompt_id: "p1".to_string(),
                content: "new".to_string(),
                note: None,
                created_at: "2024-01-02T00:00:00Z".to_string(),
                updated_at: "2024-01-02T00:00:00Z".to_string(),
                sync_id: None,
                is_deleted: false,
            },
        );

        let versions = snap.versions_of("p1");
        assert_eq!(versions[0].id, "v2");
        assert_eq!(versions[1].id, "v1");
    }
}
