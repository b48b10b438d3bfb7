// src/coordinator/state.rs
// Persisted per-post triage state and its serialized mutation path. The
// store is shared with other observers, so every read-modify-write of
// the map goes through one named gate and never interleaves.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::filter::FilterResult;
use crate::lock::KeyedLock;
use crate::storage::{KeyValueStore, StoreChange, StoreItem, KEY_POST_STATE};
use crate::timeline::Post;

/// Gate name covering every read-modify-write of the post-state map.
pub const POST_STATE_GATE: &str = "post_state";

/// Durable record for one post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostState {
    /// Cached payload, kept for replay when rules change.
    pub post: Post,
    /// Whether the on-page widget has expanded a hidden post.
    #[serde(default)]
    pub is_expanded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_result: Option<FilterResult>,
}

impl PostState {
    pub fn new(post: Post) -> Self {
        Self { post, is_expanded: false, filter_result: None }
    }
}

pub type PostStateMap = HashMap<String, PostState>;

/// All post-state mutations flow through here.
pub struct PostStateStore {
    item: StoreItem<PostStateMap>,
    gate: Arc<KeyedLock>,
}

impl PostStateStore {
    pub fn new(store: Arc<dyn KeyValueStore>, gate: Arc<KeyedLock>) -> Self {
        Self {
            item: StoreItem::new(store, KEY_POST_STATE, PostStateMap::new()),
            gate,
        }
    }

    pub async fn snapshot(&self) -> PostStateMap {
        self.item.get_value().await
    }

    pub fn watch(&self) -> broadcast::Receiver<StoreChange> {
        self.item.watch()
    }

    /// Insert states for ids not seen before; existing records win.
    pub async fn initialize(&self, initial: Vec<(String, PostState)>) -> Result<()> {
        let _guard = self.gate.acquire(POST_STATE_GATE).await;
        let mut map = self.item.get_value().await;
        let mut changed = false;
        for (id, state) in initial {
            if !map.contains_key(&id) {
                map.insert(id, state);
                changed = true;
            }
        }
        if changed {
            self.item.set_value(&map).await?;
        }
        Ok(())
    }

    /// Apply `update` to the records of `ids` in one write. Ids without
    /// a record are skipped: the payload that would create them never
    /// arrived, so there is nothing to update.
    pub async fn update_many(
        &self,
        ids: &[String],
        update: impl Fn(&mut PostState),
    ) -> Result<()> {
        let _guard = self.gate.acquire(POST_STATE_GATE).await;
        let mut map = self.item.get_value().await;
        let mut changed = false;
        for id in ids {
            match map.get_mut(id) {
                Some(state) => {
                    update(state);
                    changed = true;
                }
                None => debug!("no post state for {id}, skipping update"),
            }
        }
        if changed {
            self.item.set_value(&map).await?;
        }
        Ok(())
    }

    pub async fn set_verdicts(&self, ids: &[String], verdict: &FilterResult) -> Result<()> {
        self.update_many(ids, |state| state.filter_result = Some(verdict.clone()))
            .await
    }

    pub async fn clear_verdicts(&self, ids: &[String]) -> Result<()> {
        self.update_many(ids, |state| state.filter_result = None).await
    }

    /// Flip the widget-expansion flag for one post.
    pub async fn toggle_expanded(&self, post_id: &str) -> Result<()> {
        let ids = vec![post_id.to_string()];
        self.update_many(&ids, |state| state.is_expanded = !state.is_expanded)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::timeline::Post;

    fn post(id: &str) -> Post {
        Post {
            id: id.into(),
            author: "a".into(),
            text: "t".into(),
            media: vec![],
            quoted: None,
        }
    }

    fn store() -> PostStateStore {
        PostStateStore::new(Arc::new(MemoryStore::new()), Arc::new(KeyedLock::new()))
    }

    #[tokio::test]
    async fn initialize_does_not_overwrite_existing_records() {
        let states = store();
        states
            .initialize(vec![("1".into(), PostState::new(post("1")))])
            .await
            .unwrap();
        states
            .set_verdicts(&["1".to_string()], &FilterResult::Pass)
            .await
            .unwrap();

        // a second capture of the same post must not reset the verdict
        states
            .initialize(vec![("1".into(), PostState::new(post("1")))])
            .await
            .unwrap();
        let map = states.snapshot().await;
        assert_eq!(map["1"].filter_result, Some(FilterResult::Pass));
    }

    #[tokio::test]
    async fn clear_then_set_round_trips() {
        let states = store();
        states
            .initialize(vec![("1".into(), PostState::new(post("1")))])
            .await
            .unwrap();
        states
            .set_verdicts(
                &["1".to_string()],
                &FilterResult::Block { reason: "x".into() },
            )
            .await
            .unwrap();
        states.clear_verdicts(&["1".to_string()]).await.unwrap();
        assert_eq!(states.snapshot().await["1"].filter_result, None);
    }

    #[tokio::test]
    async fn updates_for_unknown_ids_are_skipped() {
        let states = store();
        states
            .set_verdicts(&["ghost".to_string()], &FilterResult::Pass)
            .await
            .unwrap();
        assert!(states.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn expansion_flag_survives_verdict_rewrites() {
        let states = store();
        states
            .initialize(vec![("1".into(), PostState::new(post("1")))])
            .await
            .unwrap();
        states.toggle_expanded("1").await.unwrap();
        states
            .set_verdicts(&["1".to_string()], &FilterResult::Pass)
            .await
            .unwrap();
        let map = states.snapshot().await;
        assert!(map["1"].is_expanded);
        assert_eq!(map["1"].filter_result, Some(FilterResult::Pass));
    }
}
