// src/timeline/types.rs
// Timeline data model. Extraction is permissive on purpose: the feed
// API's full shape is neither stable nor fully specified, so we read
// only the fields the pipeline needs and ignore unknown siblings.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Entry-id prefix the feed uses for promoted (advertisement) items.
const PROMOTED_PREFIX: &str = "promoted-tweet-";

/// One classifiable post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    /// Canonical identifier (the API's `rest_id`).
    pub id: String,
    /// Author screen name.
    pub author: String,
    /// Full body text.
    pub text: String,
    #[serde(default)]
    pub media: Vec<MediaRef>,
    /// Quoted post, captured one level deep.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quoted: Option<Box<Post>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaRef {
    /// Attachment kind as the API reports it (`photo`, `video`, ...).
    pub kind: String,
    pub url: String,
    #[serde(default)]
    pub alt_text: String,
}

/// Posts grouped and classified as one unit (a conversation thread).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    /// The module's own entry id.
    pub id: String,
    /// Member posts in feed order.
    pub posts: Vec<Post>,
}

/// One recognized timeline entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FeedEntry {
    Item { entry_id: String, post: Post },
    Thread(Thread),
}

impl FeedEntry {
    pub fn entry_id(&self) -> &str {
        match self {
            FeedEntry::Item { entry_id, .. } => entry_id,
            FeedEntry::Thread(thread) => &thread.id,
        }
    }

    /// Identifiers of every post this entry covers, in order.
    pub fn post_ids(&self) -> Vec<String> {
        self.posts().iter().map(|post| post.id.clone()).collect()
    }

    /// Posts carried by this entry, in order.
    pub fn posts(&self) -> Vec<&Post> {
        match self {
            FeedEntry::Item { post, .. } => vec![post],
            FeedEntry::Thread(thread) => thread.posts.iter().collect(),
        }
    }

    /// Promoted entries are blocked without consulting the filter.
    pub fn is_ad(&self) -> bool {
        matches!(self, FeedEntry::Item { entry_id, .. } if entry_id.starts_with(PROMOTED_PREFIX))
    }
}

impl Post {
    /// Extract a post from a `tweet_results.result` node, unwrapping the
    /// visibility wrapper. `None` when the shape has drifted past what
    /// the pipeline needs.
    pub fn from_result(result: &Value, quote_depth: u32) -> Option<Post> {
        let tweet = match result.get("__typename").and_then(Value::as_str) {
            Some("TweetWithVisibilityResults") => result.get("tweet")?,
            _ => result,
        };

        let id = tweet.get("rest_id").and_then(Value::as_str)?.to_string();
        let author = tweet
            .pointer("/core/user_results/result/legacy/screen_name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let text = tweet
            .pointer("/legacy/full_text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let media = tweet
            .pointer("/legacy/entities/media")
            .and_then(Value::as_array)
            .map(|attachments| attachments.iter().filter_map(MediaRef::from_value).collect())
            .unwrap_or_default();
        let quoted = if quote_depth > 0 {
            tweet
                .pointer("/quoted_status_result/result")
                .and_then(|quoted| Post::from_result(quoted, quote_depth - 1))
                .map(Box::new)
        } else {
            None
        };

        Some(Post { id, author, text, media, quoted })
    }
}

impl MediaRef {
    fn from_value(value: &Value) -> Option<MediaRef> {
        Some(MediaRef {
            kind: value
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("media")
                .to_string(),
            url: value.get("media_url_https").and_then(Value::as_str)?.to_string(),
            alt_text: value
                .get("ext_alt_text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        })
    }
}
