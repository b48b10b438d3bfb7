// src/main.rs

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use feedpilot::config::CONFIG;
use feedpilot::coordinator::Coordinator;
use feedpilot::filter::{ContentBlock, FilterOracle, FilterResult, LlmFilter, Rule, RuleMode};
use feedpilot::messaging::{page_bus, CoordinatorEndpoint};
use feedpilot::probe::{CapturingTransport, Probe, RenderTreeResolver};
use feedpilot::sim::{
    post_entry, render_tree, timeline_body, KeywordOracle, ScriptedTransport, SimulatedPage,
    TIMELINE_URL,
};
use feedpilot::storage::{MemoryStore, StoreItem, KEY_DEBUG, KEY_RULES};

#[derive(Parser)]
#[command(name = "feedpilot", about = "Feed triage: classify timeline posts against your rules")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the filter once over sample text and print the verdict
    Check {
        /// Text to classify
        text: String,
        /// Criterion, repeatable; prefix with "allow:" for an allow rule
        #[arg(short, long = "rule", required = true)]
        rules: Vec<String>,
    },
    /// Drive the full pipeline against a scripted page and transport
    Demo {
        /// Keyword the demo oracle blocks on
        #[arg(long, default_value = "crypto")]
        keyword: String,
        /// Enable debug presentation (tints instead of hiding)
        #[arg(long)]
        debug: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match Cli::parse().command {
        Command::Check { text, rules } => run_check(text, rules).await,
        Command::Demo { keyword, debug } => run_demo(keyword, debug).await,
    }
}

async fn run_check(text: String, raw_rules: Vec<String>) -> Result<()> {
    let rules = parse_rules(&raw_rules);
    let filter = LlmFilter::new()?;
    if !filter.is_available() {
        bail!("FEEDPILOT_FILTER_API_KEY is not set");
    }

    info!(
        "checking sample content against {} rules with {}",
        rules.len(),
        CONFIG.filter_model
    );
    let content = vec![ContentBlock::text(text)];
    let verdict = filter.filter(&content, &rules).await?;

    match verdict {
        FilterResult::Pass => println!("pass"),
        FilterResult::Block { reason } => println!("block: {reason}"),
    }
    Ok(())
}

fn parse_rules(raw: &[String]) -> Vec<Rule> {
    raw.iter()
        .enumerate()
        .map(|(index, criteria)| {
            let (mode, criteria) = match criteria.strip_prefix("allow:") {
                Some(rest) => (RuleMode::Allow, rest.trim()),
                None => (RuleMode::Block, criteria.as_str()),
            };
            Rule {
                id: format!("cli-{index}"),
                criteria: criteria.to_string(),
                mode,
            }
        })
        .collect()
}

async fn run_demo(keyword: String, debug: bool) -> Result<()> {
    let debug_enabled = debug;
    info!("starting scripted pipeline demo (keyword: {keyword:?}, debug: {debug_enabled})");

    // stores
    let store = Arc::new(MemoryStore::new());
    let rules_item: StoreItem<Vec<Rule>> = StoreItem::new(store.clone(), KEY_RULES, Vec::new());
    rules_item
        .set_value(&vec![Rule {
            id: "demo".to_string(),
            criteria: format!("no posts about {keyword}"),
            mode: RuleMode::Block,
        }])
        .await?;
    StoreItem::new(store.clone(), KEY_DEBUG, false)
        .set_value(&debug)
        .await?;

    // page with two visible posts
    let page = Arc::new(SimulatedPage::new());
    page.add_element("[aria-labelledby=\"a1\"]");
    page.add_element("[aria-labelledby=\"a2\"]");

    // probe on the page side of the bus
    let (probe_end, coordinator_end) = page_bus();
    let publisher = probe_end.events.clone();
    let resolver = RenderTreeResolver::new(render_tree(&[
        ("[aria-labelledby=\"a1\"]", "1001"),
        ("[aria-labelledby=\"a2\"]", "1002"),
    ]));
    let _probe_task = Probe::new(Arc::new(resolver)).serve(probe_end);

    // coordinator on the privileged side
    let CoordinatorEndpoint { resolver, events } = coordinator_end;
    let oracle = Arc::new(KeywordOracle::new(&keyword));
    let coordinator = Coordinator::new(oracle, page.clone(), store, resolver);
    let pipeline = tokio::spawn(coordinator.clone().run(events));

    // the page fetches its timeline through the capturing transport
    let transport = ScriptedTransport::new();
    transport.stub(
        TIMELINE_URL,
        &timeline_body(vec![
            post_entry("1001", "alice", "shipping a rust crate today"),
            post_entry("1002", "hype", &format!("this {keyword} coin goes to the moon")),
        ]),
    );
    let capturing = CapturingTransport::new(transport, publisher);
    capturing.fetch(TIMELINE_URL).await?;

    // let the pipeline settle, then report
    tokio::time::sleep(Duration::from_millis(300)).await;

    println!("stored verdicts:");
    let mut states: Vec<_> = coordinator.post_states().snapshot().await.into_iter().collect();
    states.sort_by(|a, b| a.0.cmp(&b.0));
    for (id, state) in states {
        let verdict = match state.filter_result {
            Some(FilterResult::Pass) => "pass".to_string(),
            Some(FilterResult::Block { reason }) => format!("block ({reason})"),
            None => "pending".to_string(),
        };
        println!("  {id} by {}: {verdict}", state.post.author);
    }

    println!("page renders:");
    for render in page.applied() {
        println!(
            "  element {} post {:?}: visible={} tint={:?}",
            render.element_key,
            render.post_id,
            render.presentation.visible,
            render.presentation.tint,
        );
    }

    pipeline.abort();
    Ok(())
}
