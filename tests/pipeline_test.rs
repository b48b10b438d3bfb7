// tests/pipeline_test.rs
// End-to-end triage properties, driven through the real bus, probe,
// coordinator, and an in-memory store.

use std::sync::Arc;
use std::time::Duration;

use feedpilot::coordinator::{Coordinator, AD_BLOCK_REASON};
use feedpilot::filter::{FilterResult, Rule, RuleMode};
use feedpilot::messaging::{page_bus, CoordinatorEndpoint, EventPublisher};
use feedpilot::probe::{Probe, RenderTreeResolver};
use feedpilot::sim::{
    post_entry, promoted_entry, render_tree, thread_entry, timeline_body, ScriptedOracle,
    SimulatedPage, TIMELINE_URL,
};
use feedpilot::storage::{KeyValueStore, MemoryStore, StoreItem, KEY_RULES};

struct Harness {
    coordinator: Arc<Coordinator>,
    oracle: Arc<ScriptedOracle>,
    #[allow(dead_code)]
    page: Arc<SimulatedPage>,
    store: Arc<MemoryStore>,
    publisher: EventPublisher,
}

/// Wire a full pipeline: one page element per (selector, post id) pair,
/// a probe serving the matching render tree, and a running coordinator.
/// Initial rules are written before the coordinator starts watching, so
/// only deliberate in-test rewrites count as rule changes.
async fn harness(visible: &[(&str, &str)], initial_rules: Vec<Rule>) -> Harness {
    let store = Arc::new(MemoryStore::new());
    {
        let store: Arc<dyn KeyValueStore> = store.clone();
        StoreItem::new(store, KEY_RULES, Vec::new())
            .set_value(&initial_rules)
            .await
            .unwrap();
    }

    let page = Arc::new(SimulatedPage::new());
    for (selector, _) in visible {
        page.add_element(selector);
    }

    let (probe_end, coordinator_end) = page_bus();
    let publisher = probe_end.events.clone();
    let _probe = Probe::new(Arc::new(RenderTreeResolver::new(render_tree(visible)))).serve(probe_end);

    let CoordinatorEndpoint { resolver, events } = coordinator_end;
    let oracle = Arc::new(ScriptedOracle::new());
    let coordinator = Coordinator::new(oracle.clone(), page.clone(), store.clone(), resolver);
    tokio::spawn(coordinator.clone().run(events));

    Harness { coordinator, oracle, page, store, publisher }
}

impl Harness {
    async fn publish(&self, entries: Vec<serde_json::Value>) {
        self.publisher
            .publish(TIMELINE_URL.to_string(), timeline_body(entries))
            .await;
    }

    async fn set_rules(&self, rules: Vec<Rule>) {
        let store: Arc<dyn KeyValueStore> = self.store.clone();
        StoreItem::new(store, KEY_RULES, Vec::new())
            .set_value(&rules)
            .await
            .unwrap();
    }

    async fn verdict(&self, id: &str) -> Option<FilterResult> {
        self.coordinator
            .post_states()
            .snapshot()
            .await
            .get(id)
            .and_then(|state| state.filter_result.clone())
    }

    /// Poll until the verdict for `id` settles to any value.
    async fn wait_for_verdict(&self, id: &str) -> FilterResult {
        for _ in 0..200 {
            if let Some(verdict) = self.verdict(id).await {
                return verdict;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("verdict for {id} never settled");
    }

    /// Poll until the verdict for `id` equals `expected`.
    async fn wait_for(&self, id: &str, expected: &FilterResult) {
        for _ in 0..200 {
            if self.verdict(id).await.as_ref() == Some(expected) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "verdict for {id} never became {expected:?}, last seen {:?}",
            self.verdict(id).await
        );
    }
}

fn block_rule(criteria: &str) -> Rule {
    Rule {
        id: format!("rule-{criteria}"),
        criteria: criteria.to_string(),
        mode: RuleMode::Block,
    }
}

#[tokio::test]
async fn ingested_posts_are_classified_and_persisted() {
    let h = harness(&[], vec![]).await;
    h.oracle.push_pass();

    h.publish(vec![post_entry("1", "alice", "a fine post")]).await;

    assert_eq!(h.wait_for_verdict("1").await, FilterResult::Pass);
    assert_eq!(h.oracle.call_count(), 1);
    let calls = h.oracle.calls();
    let prompt: Vec<String> = calls[0].content.iter().map(|b| b.as_prompt_line()).collect();
    assert!(prompt[0].contains("alice"));
    assert!(prompt[0].contains("a fine post"));
}

#[tokio::test]
async fn advertisements_block_without_consulting_the_oracle() {
    let h = harness(&[], vec![]).await;

    h.publish(vec![promoted_entry("9", "brand", "buy now")]).await;

    assert_eq!(
        h.wait_for_verdict("9").await,
        FilterResult::Block { reason: AD_BLOCK_REASON.to_string() }
    );
    assert_eq!(h.oracle.call_count(), 0);
}

#[tokio::test]
async fn oracle_failure_fails_open_to_pass() {
    let h = harness(&[], vec![]).await;
    h.oracle.push_error("backend unavailable");

    h.publish(vec![post_entry("1", "alice", "hello")]).await;

    // settled, not left unset, and not blocked
    assert_eq!(h.wait_for_verdict("1").await, FilterResult::Pass);
}

#[tokio::test]
async fn thread_verdict_fans_out_to_every_member() {
    let h = harness(&[], vec![]).await;
    h.oracle.push_block("X");

    h.publish(vec![thread_entry(
        "conversationthread-7",
        &[("1", "a", "one"), ("2", "b", "two"), ("3", "c", "three")],
    )])
    .await;

    for id in ["1", "2", "3"] {
        assert_eq!(
            h.wait_for_verdict(id).await,
            FilterResult::Block { reason: "X".to_string() }
        );
    }
    // one combined call for the whole thread
    assert_eq!(h.oracle.call_count(), 1);
    let prompt: Vec<String> = h.oracle.calls()[0]
        .content
        .iter()
        .map(|b| b.as_prompt_line())
        .collect();
    assert!(prompt[0].contains("3 related tweets"));
}

#[tokio::test]
async fn superseded_task_never_writes_its_stale_verdict() {
    let h = harness(&[], vec![]).await;
    // the first task is slow and would block; the second is quick and passes
    h.oracle.push_delayed(
        FilterResult::Block { reason: "stale".to_string() },
        Duration::from_millis(400),
    );
    h.oracle
        .push_delayed(FilterResult::Pass, Duration::from_millis(50));

    let entry = post_entry("1", "alice", "same post twice");
    h.publish(vec![entry.clone()]).await;
    // let the first task reach its oracle call before superseding it
    for _ in 0..200 {
        if h.oracle.call_count() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(h.oracle.call_count(), 1);
    h.publish(vec![entry]).await;

    h.wait_for("1", &FilterResult::Pass).await;

    // the slow superseded task completes later; its write must be dropped
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(h.verdict("1").await, Some(FilterResult::Pass));
    assert_eq!(h.oracle.call_count(), 2);
}

#[tokio::test]
async fn rule_change_clears_and_reclassifies_with_the_new_rules() {
    let h = harness(
        &[("[aria-labelledby=\"a1\"]", "1")],
        vec![block_rule("old criteria")],
    )
    .await;

    h.oracle.push_pass();
    h.publish(vec![post_entry("1", "alice", "hello")]).await;
    h.wait_for("1", &FilterResult::Pass).await;
    assert_eq!(h.oracle.calls()[0].rules[0].criteria, "old criteria");

    h.oracle.push_block("violates the new rule");
    h.set_rules(vec![block_rule("new criteria")]).await;

    h.wait_for(
        "1",
        &FilterResult::Block { reason: "violates the new rule".to_string() },
    )
    .await;
    assert_eq!(h.oracle.call_count(), 2);
    assert_eq!(h.oracle.calls()[1].rules[0].criteria, "new criteria");
}

#[tokio::test]
async fn rewriting_identical_rules_does_not_reclassify() {
    let h = harness(
        &[("[aria-labelledby=\"a1\"]", "1")],
        vec![block_rule("same")],
    )
    .await;

    h.oracle.push_pass();
    h.publish(vec![post_entry("1", "alice", "hello")]).await;
    h.wait_for("1", &FilterResult::Pass).await;

    // same value written again: the watch fires but nothing changed
    h.set_rules(vec![block_rule("same")]).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(h.oracle.call_count(), 1);
}

#[tokio::test]
async fn reingesting_a_settled_post_keeps_exactly_one_writer() {
    let h = harness(&[], vec![]).await;
    h.oracle.push_pass();

    let entry = post_entry("1", "alice", "hello");
    h.publish(vec![entry.clone()]).await;
    h.wait_for("1", &FilterResult::Pass).await;

    // second capture of the same post: settled task is replaced, the
    // verdict is cleared and recomputed
    h.oracle.push_block("changed my mind");
    h.publish(vec![entry]).await;
    h.wait_for(
        "1",
        &FilterResult::Block { reason: "changed my mind".to_string() },
    )
    .await;
    assert_eq!(h.oracle.call_count(), 2);
}
