// src/filter/mod.rs

//! Filter contract: user rules, verdicts, and the oracle seam. The
//! oracle is an external collaborator; everything behind the trait is
//! replaceable and its failures are survivable.

pub mod llm;

pub use llm::LlmFilter;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// User-authored filter criterion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    /// Free-text criteria, written by the user.
    pub criteria: String,
    pub mode: RuleMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleMode {
    Block,
    Allow,
}

/// Verdict for one post or one thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FilterResult {
    Pass,
    Block { reason: String },
}

impl FilterResult {
    pub fn is_block(&self) -> bool {
        matches!(self, FilterResult::Block { .. })
    }
}

/// One unit of content shown to the filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentBlock {
    Text(String),
    Media { kind: String, url: String, alt_text: String },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text(text.into())
    }

    /// Flat prompt line for this block.
    pub fn as_prompt_line(&self) -> String {
        match self {
            ContentBlock::Text(text) => text.clone(),
            ContentBlock::Media { kind, alt_text, .. } => format!("Media {kind} -- {alt_text}"),
        }
    }
}

/// The external classification oracle. Classifies content against the
/// full rule set; errors are generic and callers fail open to `Pass`.
#[async_trait]
pub trait FilterOracle: Send + Sync {
    async fn filter(&self, content: &[ContentBlock], rules: &[Rule]) -> Result<FilterResult>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdicts_serialize_with_type_tag() {
        let pass = serde_json::to_value(FilterResult::Pass).unwrap();
        assert_eq!(pass, serde_json::json!({ "type": "pass" }));

        let block = serde_json::to_value(FilterResult::Block { reason: "ad".into() }).unwrap();
        assert_eq!(block, serde_json::json!({ "type": "block", "reason": "ad" }));
    }

    #[test]
    fn rule_mode_uses_lowercase_wire_names() {
        let rule: Rule = serde_json::from_value(serde_json::json!({
            "id": "r1",
            "criteria": "no engagement bait",
            "mode": "block",
        }))
        .unwrap();
        assert_eq!(rule.mode, RuleMode::Block);
    }
}
