// src/timeline/ingest.rs
// Recognizes home-timeline payloads among captured traffic and extracts
// typed entries. Anything unrecognized or malformed degrades to an
// empty list; the pipeline never stops over one bad payload.

use serde_json::Value;
use tracing::debug;

use super::types::{FeedEntry, Post, Thread};

const TIMELINE_URL_PREFIX: &str = "https://x.com/i/api/graphql";
const TIMELINE_URL_MARKER: &str = "HomeTimeline";

/// Module inner items that are actual conversation members.
const CONVERSATION_PREFIX: &str = "home-conversation-";

/// Quoted-post capture depth.
const QUOTE_DEPTH: u32 = 1;

/// Parse a captured response if it is a home-timeline payload.
pub fn ingest(url: &str, body: &str) -> Vec<FeedEntry> {
    if !url.starts_with(TIMELINE_URL_PREFIX) || !url.contains(TIMELINE_URL_MARKER) {
        return Vec::new();
    }

    let payload: Value = match serde_json::from_str(body) {
        Ok(payload) => payload,
        Err(e) => {
            debug!("unparseable timeline body from {url}: {e}");
            return Vec::new();
        }
    };

    let Some(instructions) = payload
        .pointer("/data/home/home_timeline_urt/instructions")
        .and_then(Value::as_array)
    else {
        debug!("timeline payload from {url} has no instructions");
        return Vec::new();
    };

    let mut entries = Vec::new();
    for instruction in instructions {
        if instruction.get("type").and_then(Value::as_str) != Some("TimelineAddEntries") {
            continue;
        }
        let Some(raw_entries) = instruction.get("entries").and_then(Value::as_array) else {
            continue;
        };
        for raw in raw_entries {
            if let Some(entry) = parse_entry(raw) {
                entries.push(entry);
            }
        }
    }
    entries
}

fn parse_entry(raw: &Value) -> Option<FeedEntry> {
    let entry_id = raw.get("entryId").and_then(Value::as_str)?.to_string();
    let content = raw.get("content")?;

    match content.get("__typename").and_then(Value::as_str)? {
        "TimelineTimelineItem" => {
            let result = content.pointer("/itemContent/tweet_results/result")?;
            let post = Post::from_result(result, QUOTE_DEPTH)?;
            Some(FeedEntry::Item { entry_id, post })
        }
        "TimelineTimelineModule" => {
            let items = content.get("items").and_then(Value::as_array)?;
            let posts: Vec<Post> = items
                .iter()
                .filter(|item| {
                    item.get("entryId")
                        .and_then(Value::as_str)
                        .is_some_and(|id| id.starts_with(CONVERSATION_PREFIX))
                })
                .filter_map(|item| item.pointer("/item/itemContent/tweet_results/result"))
                .filter_map(|result| Post::from_result(result, QUOTE_DEPTH))
                .collect();
            if posts.is_empty() {
                return None;
            }
            Some(FeedEntry::Thread(Thread { id: entry_id, posts }))
        }
        // cursors and anything newer than us
        _ => None,
    }
}
