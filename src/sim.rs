// src/sim.rs

//! Scripted stand-ins for the external collaborators: a page surface
//! with an apply journal, a canned transport, a scripted oracle that
//! records its calls, and timeline payload builders. The demo command
//! and the integration suites drive the real pipeline through these.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::broadcast;

use crate::filter::{ContentBlock, FilterOracle, FilterResult, Rule};
use crate::page::{PageElement, PageSurface, Presentation};
use crate::probe::{FetchTransport, RenderTree};

/// A home-timeline endpoint the ingest gate recognizes.
pub const TIMELINE_URL: &str = "https://x.com/i/api/graphql/s6ERr1UxkxxBx4YundNsXw/HomeTimeline";

// ── Page surface ──────────────────────────────────────────────────────

/// One journal entry: what was applied to which element.
#[derive(Debug, Clone)]
pub struct AppliedRender {
    pub element_key: u64,
    pub post_id: Option<String>,
    pub presentation: Presentation,
}

#[derive(Default)]
struct PageInner {
    elements: Vec<PageElement>,
    next_key: u64,
    applied: Vec<AppliedRender>,
    marked: HashSet<u64>,
}

/// Scripted page: elements are added by the test, applies are recorded.
pub struct SimulatedPage {
    inner: Mutex<PageInner>,
    mutations: broadcast::Sender<()>,
}

impl SimulatedPage {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(PageInner::default()),
            mutations: broadcast::channel(16).0,
        }
    }

    /// Add a visible post element addressed by `selector` and fire the
    /// mutation feed, as a DOM insertion would.
    pub fn add_element(&self, selector: &str) -> PageElement {
        let element = {
            let mut inner = self.inner.lock().expect("page state poisoned");
            inner.next_key += 1;
            let element = PageElement {
                key: inner.next_key,
                selector: Some(selector.to_string()),
            };
            inner.elements.push(element.clone());
            element
        };
        self.notify_mutation();
        element
    }

    /// Clear the applied marker, as a framework re-render of the node
    /// would.
    pub fn drop_marker(&self, key: u64) {
        self.inner.lock().expect("page state poisoned").marked.remove(&key);
        self.notify_mutation();
    }

    pub fn notify_mutation(&self) {
        let _ = self.mutations.send(());
    }

    pub fn applied(&self) -> Vec<AppliedRender> {
        self.inner.lock().expect("page state poisoned").applied.clone()
    }

    pub fn apply_count(&self) -> usize {
        self.inner.lock().expect("page state poisoned").applied.len()
    }

    /// Most recent apply for one post id.
    pub fn last_for(&self, post_id: &str) -> Option<AppliedRender> {
        self.inner
            .lock()
            .expect("page state poisoned")
            .applied
            .iter()
            .rev()
            .find(|render| render.post_id.as_deref() == Some(post_id))
            .cloned()
    }
}

impl Default for SimulatedPage {
    fn default() -> Self {
        Self::new()
    }
}

impl PageSurface for SimulatedPage {
    fn visible_elements(&self) -> Vec<PageElement> {
        self.inner.lock().expect("page state poisoned").elements.clone()
    }

    fn apply(&self, element: &PageElement, post_id: Option<&str>, presentation: &Presentation) {
        let mut inner = self.inner.lock().expect("page state poisoned");
        inner.applied.push(AppliedRender {
            element_key: element.key,
            post_id: post_id.map(str::to_string),
            presentation: presentation.clone(),
        });
        inner.marked.insert(element.key);
    }

    fn has_marker(&self, element: &PageElement) -> bool {
        self.inner
            .lock()
            .expect("page state poisoned")
            .marked
            .contains(&element.key)
    }

    fn mutations(&self) -> broadcast::Receiver<()> {
        self.mutations.subscribe()
    }
}

// ── Transport ─────────────────────────────────────────────────────────

/// Canned transport: serves a fixed body per url.
#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<HashMap<String, String>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stub(&self, url: &str, body: &str) {
        self.responses
            .lock()
            .expect("transport stubs poisoned")
            .insert(url.to_string(), body.to_string());
    }
}

#[async_trait]
impl FetchTransport for ScriptedTransport {
    async fn fetch(&self, url: &str) -> Result<String> {
        self.responses
            .lock()
            .expect("transport stubs poisoned")
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow!("no stub for {url}"))
    }
}

// ── Oracle ────────────────────────────────────────────────────────────

/// One recorded oracle invocation.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub content: Vec<ContentBlock>,
    pub rules: Vec<Rule>,
}

struct ScriptedCall {
    verdict: Result<FilterResult, String>,
    delay: Option<Duration>,
}

/// Scripted oracle: verdicts are consumed in call order; with the plan
/// exhausted it answers `Pass`. Every invocation is recorded.
#[derive(Default)]
pub struct ScriptedOracle {
    plan: Mutex<VecDeque<ScriptedCall>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_pass(&self) {
        self.push(Ok(FilterResult::Pass), None);
    }

    pub fn push_block(&self, reason: &str) {
        self.push(Ok(FilterResult::Block { reason: reason.to_string() }), None);
    }

    pub fn push_error(&self, message: &str) {
        self.push(Err(message.to_string()), None);
    }

    pub fn push_delayed(&self, verdict: FilterResult, delay: Duration) {
        self.push(Ok(verdict), Some(delay));
    }

    fn push(&self, verdict: Result<FilterResult, String>, delay: Option<Duration>) {
        self.plan
            .lock()
            .expect("oracle plan poisoned")
            .push_back(ScriptedCall { verdict, delay });
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().expect("oracle calls poisoned").clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("oracle calls poisoned").len()
    }
}

#[async_trait]
impl FilterOracle for ScriptedOracle {
    async fn filter(&self, content: &[ContentBlock], rules: &[Rule]) -> Result<FilterResult> {
        self.calls.lock().expect("oracle calls poisoned").push(RecordedCall {
            content: content.to_vec(),
            rules: rules.to_vec(),
        });
        let next = self.plan.lock().expect("oracle plan poisoned").pop_front();
        match next {
            Some(call) => {
                if let Some(delay) = call.delay {
                    tokio::time::sleep(delay).await;
                }
                call.verdict.map_err(|message| anyhow!(message))
            }
            None => Ok(FilterResult::Pass),
        }
    }
}

/// Content-aware oracle for demos: blocks when any block's prompt line
/// contains the needle, case-insensitively.
pub struct KeywordOracle {
    needle: String,
}

impl KeywordOracle {
    pub fn new(needle: &str) -> Self {
        Self { needle: needle.to_lowercase() }
    }
}

#[async_trait]
impl FilterOracle for KeywordOracle {
    async fn filter(&self, content: &[ContentBlock], _rules: &[Rule]) -> Result<FilterResult> {
        let matched = content
            .iter()
            .any(|block| block.as_prompt_line().to_lowercase().contains(&self.needle));
        Ok(if matched {
            FilterResult::Block { reason: format!("mentions {:?}", self.needle) }
        } else {
            FilterResult::Pass
        })
    }
}

// ── Payload builders ──────────────────────────────────────────────────

fn tweet_result(id: &str, author: &str, text: &str) -> Value {
    json!({
        "__typename": "Tweet",
        "rest_id": id,
        "core": { "user_results": { "result": { "legacy": { "screen_name": author } } } },
        "legacy": { "full_text": text, "entities": {} },
    })
}

/// A plain timeline item entry.
pub fn post_entry(id: &str, author: &str, text: &str) -> Value {
    json!({
        "entryId": format!("tweet-{id}"),
        "content": {
            "__typename": "TimelineTimelineItem",
            "itemContent": { "tweet_results": { "result": tweet_result(id, author, text) } },
        },
    })
}

/// A promoted (advertisement) item entry.
pub fn promoted_entry(id: &str, author: &str, text: &str) -> Value {
    let mut entry = post_entry(id, author, text);
    entry["entryId"] = json!(format!("promoted-tweet-{id}"));
    entry
}

/// A conversation module whose members are the given posts.
pub fn thread_entry(module_id: &str, posts: &[(&str, &str, &str)]) -> Value {
    let items: Vec<Value> = posts
        .iter()
        .map(|(id, author, text)| {
            json!({
                "entryId": format!("home-conversation-{module_id}-tweet-{id}"),
                "item": { "itemContent": { "tweet_results": { "result": tweet_result(id, author, text) } } },
            })
        })
        .collect();
    json!({
        "entryId": module_id,
        "content": {
            "__typename": "TimelineTimelineModule",
            "items": items,
            "displayType": "VerticalConversation",
        },
    })
}

/// Wrap entries into a full home-timeline response body.
pub fn timeline_body(entries: Vec<Value>) -> String {
    json!({
        "data": { "home": { "home_timeline_urt": {
            "instructions": [{ "type": "TimelineAddEntries", "entries": entries }],
        }}}
    })
    .to_string()
}

/// Render tree mapping each selector to the post id its element renders.
pub fn render_tree(mappings: &[(&str, &str)]) -> RenderTree {
    let mut tree = RenderTree::new();
    let root = tree.push(Some("App"), json!({}), None);
    for (selector, post_id) in mappings {
        let renderer = tree.push(Some("Tweet"), json!({ "tweet": { "rest_id": post_id } }), Some(root));
        let host = tree.push(None, json!({}), Some(renderer));
        tree.register_host(selector, host);
    }
    tree
}
