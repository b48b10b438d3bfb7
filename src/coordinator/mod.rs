// src/coordinator/mod.rs

//! The privileged triage hub. Owns the task map, the entry cache, and
//! the render records; turns captured payloads into verdicts and
//! verdicts into page presentation. All of its state lives on the
//! instance and is discarded with it on teardown.

pub mod state;
pub mod sync;
pub mod tasks;

pub use state::{PostState, PostStateMap, PostStateStore};
pub use tasks::{Task, TaskMap};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::config::CONFIG;
use crate::filter::{FilterOracle, FilterResult, Rule};
use crate::lock::KeyedLock;
use crate::messaging::{ProbeEvent, ResolveClient};
use crate::page::PageSurface;
use crate::storage::{KeyValueStore, StoreItem, KEY_DEBUG, KEY_RULES};
use crate::timeline::prompt::{post_blocks, thread_blocks};
use crate::timeline::{ingest, FeedEntry};

use sync::RenderSync;

/// Fixed reason for the advertisement short-circuit.
pub const AD_BLOCK_REASON: &str = "automatically detected ad";

pub struct Coordinator {
    oracle: Arc<dyn FilterOracle>,
    page: Arc<dyn PageSurface>,
    resolver: ResolveClient,
    rules: StoreItem<Vec<Rule>>,
    debug: StoreItem<bool>,
    post_states: Arc<PostStateStore>,
    tasks: TaskMap,
    /// Cached entries keyed by post id; thread members share one entry.
    entries: Mutex<HashMap<String, Arc<FeedEntry>>>,
    render: RenderSync,
    filter_timeout: Duration,
}

impl Coordinator {
    pub fn new(
        oracle: Arc<dyn FilterOracle>,
        page: Arc<dyn PageSurface>,
        store: Arc<dyn KeyValueStore>,
        resolver: ResolveClient,
    ) -> Arc<Self> {
        let gate = Arc::new(KeyedLock::new());
        let post_states = Arc::new(PostStateStore::new(store.clone(), gate.clone()));
        let render = RenderSync::new(page.clone(), resolver.clone(), gate);

        Arc::new(Self {
            oracle,
            page,
            resolver,
            rules: StoreItem::new(store.clone(), KEY_RULES, Vec::new()),
            debug: StoreItem::new(store, KEY_DEBUG, CONFIG.debug_default),
            post_states,
            tasks: TaskMap::new(),
            entries: Mutex::new(HashMap::new()),
            render,
            filter_timeout: Duration::from_secs(CONFIG.filter_timeout_secs),
        })
    }

    /// Drive the pipeline until the probe endpoint closes: captured
    /// payloads, the mutation feed, and the store watches all land on
    /// this one loop.
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<ProbeEvent>) {
        let mut mutations = self.page.mutations();
        let mut rule_changes = self.rules.watch();
        let mut debug_changes = self.debug.watch();
        let mut state_changes = self.post_states.watch();

        // reconcile whatever is already on screen before any event
        self.sync_page().await;

        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Some(ProbeEvent::NetworkPayloadCaptured { url, body }) => {
                            self.handle_payload(&url, &body).await;
                        }
                        None => {
                            info!("probe endpoint closed, coordinator loop exiting");
                            break;
                        }
                    }
                }
                change = watch_tick(&mut rule_changes) => {
                    // the store fires on every write; only a real revision
                    // invalidates verdicts
                    let changed = change.map_or(true, |c| c.new_value != c.old_value);
                    if changed {
                        self.handle_rules_changed().await;
                    }
                }
                _ = watch_tick(&mut debug_changes) => self.sync_page().await,
                _ = watch_tick(&mut state_changes) => self.sync_page().await,
                _ = watch_tick(&mut mutations) => self.sync_page().await,
            }
        }
    }

    /// Ingest one captured payload: cache entries, create states for
    /// ids not seen before, then spawn classification per entry.
    pub async fn handle_payload(&self, url: &str, body: &str) {
        let entries: Vec<Arc<FeedEntry>> =
            ingest(url, body).into_iter().map(Arc::new).collect();
        if entries.is_empty() {
            return;
        }
        info!("ingested {} feed entries from {url}", entries.len());

        self.init_entries(&entries).await;
        for entry in &entries {
            self.spawn_filter(entry.clone()).await;
        }
    }

    async fn init_entries(&self, entries: &[Arc<FeedEntry>]) {
        let mut initial = Vec::new();
        {
            let mut cache = self.entries.lock().await;
            for entry in entries {
                for post in entry.posts() {
                    cache.insert(post.id.clone(), entry.clone());
                    initial.push((post.id.clone(), PostState::new(post.clone())));
                }
            }
        }
        if let Err(e) = self.post_states.initialize(initial).await {
            warn!("failed to initialize post states: {e:#}");
        }
    }

    /// Spawn the classification task for one entry, superseding any
    /// live task covering the same post ids. The rule set is read once,
    /// up front; a mid-flight rule change supersedes this task rather
    /// than mutating its inputs.
    async fn spawn_filter(&self, entry: Arc<FeedEntry>) {
        let ids = entry.post_ids();
        if ids.is_empty() {
            return;
        }
        let rules = self.rules.get_value().await;

        let task = self.tasks.begin(&ids).await;
        if let Err(e) = self.post_states.clear_verdicts(&ids).await {
            warn!("failed to clear verdicts before respawn: {e:#}");
        }

        let oracle = self.oracle.clone();
        let post_states = self.post_states.clone();
        let filter_timeout = self.filter_timeout;
        tokio::spawn(async move {
            let verdict =
                classify_entry(oracle.as_ref(), &entry, &rules, filter_timeout).await;

            // stale-write check: a superseded task discards its result
            if task.is_finished() {
                debug!("task for {:?} superseded before settle, dropping verdict", ids);
                return;
            }
            match post_states.set_verdicts(&ids, &verdict).await {
                Ok(()) => task.finish(),
                // leave the task unfinished so a later trigger can
                // supersede and retry
                Err(e) => warn!("failed to persist verdict for {:?}: {e:#}", ids),
            }
        });
    }

    /// Rule-set revision: verdicts computed under the old rules are
    /// invalid. Affected ids are re-derived from the entry cache (an
    /// item maps to its own id, a thread to every member id), cleared
    /// through the gate, then each distinct cached entry is respawned.
    async fn handle_rules_changed(&self) {
        info!("rule set changed, re-triaging visible entries");
        let visible = self.visible_post_ids().await;

        let (affected, respawn) = {
            let cache = self.entries.lock().await;
            let mut affected = Vec::new();
            let mut respawn = Vec::new();
            let mut seen = HashSet::new();
            for id in &visible {
                let Some(entry) = cache.get(id) else {
                    debug!("no cached entry for visible post {id}");
                    continue;
                };
                if seen.insert(entry.entry_id().to_string()) {
                    affected.extend(entry.post_ids());
                    respawn.push(entry.clone());
                }
            }
            (affected, respawn)
        };
        if affected.is_empty() {
            return;
        }

        if let Err(e) = self.post_states.clear_verdicts(&affected).await {
            warn!("failed to clear verdicts after rule change: {e:#}");
        }
        for entry in respawn {
            self.spawn_filter(entry).await;
        }
    }

    /// Reconcile presentation for everything currently visible.
    pub async fn sync_page(&self) {
        let states = self.post_states.snapshot().await;
        let debug = self.debug.get_value().await;
        self.render.sync(&states, debug).await;
    }

    async fn visible_post_ids(&self) -> Vec<String> {
        let elements = self.page.visible_elements();
        let lookups = elements
            .iter()
            .filter_map(|element| element.selector.clone())
            .map(|selector| {
                let resolver = self.resolver.clone();
                async move { resolver.resolve_identifier(&selector).await }
            });
        futures::future::join_all(lookups)
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    /// Current task handle for a post id, if any was ever spawned.
    pub async fn task_for(&self, post_id: &str) -> Option<Task> {
        self.tasks.get(post_id).await
    }

    /// The serialized post-state path, shared with the on-page widget.
    pub fn post_states(&self) -> &Arc<PostStateStore> {
        &self.post_states
    }
}

/// Produce the verdict for one entry: advertisement short-circuit,
/// bounded oracle call, fail-open on error or timeout.
async fn classify_entry(
    oracle: &dyn FilterOracle,
    entry: &FeedEntry,
    rules: &[Rule],
    timeout: Duration,
) -> FilterResult {
    if entry.is_ad() {
        return FilterResult::Block { reason: AD_BLOCK_REASON.to_string() };
    }

    let blocks = match entry {
        FeedEntry::Item { post, .. } => post_blocks(post),
        FeedEntry::Thread(thread) => thread_blocks(thread),
    };

    match tokio::time::timeout(timeout, oracle.filter(&blocks, rules)).await {
        Ok(Ok(verdict)) => verdict,
        Ok(Err(e)) => {
            warn!("filter call failed, passing content through: {e:#}");
            FilterResult::Pass
        }
        Err(_) => {
            warn!(
                "filter call exceeded {}s, passing content through",
                timeout.as_secs()
            );
            FilterResult::Pass
        }
    }
}

/// Next tick on a watch feed. Lag collapses into one tick with no
/// payload; a closed feed parks forever, since teardown is driven by
/// the event bus closing, not by a watcher going away.
async fn watch_tick<T: Clone>(rx: &mut broadcast::Receiver<T>) -> Option<T> {
    loop {
        match rx.recv().await {
            Ok(value) => return Some(value),
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                debug!("watch feed lagged by {missed}, coalescing");
                return None;
            }
            Err(broadcast::error::RecvError::Closed) => {
                std::future::pending::<()>().await;
            }
        }
    }
}
