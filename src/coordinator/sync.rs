// src/coordinator/sync.rs
// Reconciles on-page presentation with triage state. Mutation feeds
// fire far more often than state changes, so the last applied
// (id, state, debug) triple is cached per post and unchanged elements
// are skipped instead of re-rendered.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::lock::KeyedLock;
use crate::messaging::ResolveClient;
use crate::page::{presentation_for, presentation_unresolved, PageElement, PageSurface};

use super::state::{PostState, PostStateMap};

/// Last applied render input for one post.
#[derive(Debug, Clone, PartialEq)]
struct RenderRecord {
    state: Option<PostState>,
    debug: bool,
}

pub struct RenderSync {
    page: Arc<dyn PageSurface>,
    resolver: ResolveClient,
    records: Mutex<HashMap<String, RenderRecord>>,
    render_gate: Arc<KeyedLock>,
}

impl RenderSync {
    pub fn new(page: Arc<dyn PageSurface>, resolver: ResolveClient, render_gate: Arc<KeyedLock>) -> Self {
        Self {
            page,
            resolver,
            records: Mutex::new(HashMap::new()),
            render_gate,
        }
    }

    /// Scan every visible element and reconcile it. Failures are scoped
    /// per element; the scan always completes.
    pub async fn sync(&self, states: &PostStateMap, debug: bool) {
        let elements = self.page.visible_elements();
        let jobs = elements
            .into_iter()
            .map(|element| self.sync_element(element, states, debug));
        futures::future::join_all(jobs).await;
    }

    async fn sync_element(&self, element: PageElement, states: &PostStateMap, debug: bool) {
        let Some(selector) = element.selector.clone() else {
            warn!("element {} has no addressable selector", element.key);
            self.page.apply(&element, None, &presentation_unresolved(debug));
            return;
        };
        let Some(post_id) = self.resolver.resolve_identifier(&selector).await else {
            warn!("no post id behind element {}", element.key);
            self.page.apply(&element, None, &presentation_unresolved(debug));
            return;
        };
        self.render(&element, &post_id, states.get(&post_id), debug).await;
    }

    /// Per-post serialized apply with redundant-write suppression.
    async fn render(
        &self,
        element: &PageElement,
        post_id: &str,
        state: Option<&PostState>,
        debug: bool,
    ) {
        let _guard = self.render_gate.acquire(&format!("render-{post_id}")).await;

        let next = RenderRecord { state: state.cloned(), debug };
        let unchanged = {
            let records = self.records.lock().await;
            records.get(post_id) == Some(&next)
        };
        if unchanged && self.page.has_marker(element) {
            return;
        }

        self.records.lock().await.insert(post_id.to_string(), next);
        debug!("rendering {post_id}");
        self.page
            .apply(element, Some(post_id), &presentation_for(state, debug));
    }
}
