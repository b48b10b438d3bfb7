// src/filter/llm.rs
// Reference oracle: a Gemini-style generateContent endpoint over reqwest.
// The model is asked for a strict JSON object; we tolerate the fences it
// wraps around it anyway.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::config::CONFIG;
use crate::error::FeedpilotError;

use super::{ContentBlock, FilterOracle, FilterResult, Rule, RuleMode};

pub struct LlmFilter {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl LlmFilter {
    /// Build from the process configuration.
    pub fn new() -> Result<Self> {
        Self::with_endpoint(
            &CONFIG.filter_base_url,
            &CONFIG.filter_api_key,
            &CONFIG.filter_model,
        )
    }

    pub fn with_endpoint(base_url: &str, api_key: &str, model: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(CONFIG.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }

    /// Whether an API key is configured.
    pub fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    fn build_prompt(content: &[ContentBlock], rules: &[Rule]) -> String {
        let body = content
            .iter()
            .map(ContentBlock::as_prompt_line)
            .collect::<Vec<_>>()
            .join("\n");
        let criteria = rules
            .iter()
            .map(|rule| {
                let mode = match rule.mode {
                    RuleMode::Block => "block",
                    RuleMode::Allow => "allow",
                };
                format!("- [{mode}] {}", rule.criteria)
            })
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            r#"You are a feed filter. Decide whether the content below passes the user's criteria.

A [block] criterion describes content the user does not want to see.
An [allow] criterion describes content the user always wants to keep, even when a block criterion also matches.

Content:
{body}

Criteria:
{criteria}

Respond with JSON only:
{{"reason": "short explanation for the result", "pass_filter": true}}"#
        )
    }

    fn parse_verdict(completion: &str) -> Result<FilterResult, FeedpilotError> {
        let json_str = completion
            .trim()
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim();

        let parsed: Value = serde_json::from_str(json_str)
            .map_err(|e| FeedpilotError::OracleResponse(format!("not a JSON object: {e}")))?;
        let pass = parsed
            .get("pass_filter")
            .and_then(Value::as_bool)
            .ok_or_else(|| FeedpilotError::OracleResponse("missing pass_filter".to_string()))?;

        if pass {
            Ok(FilterResult::Pass)
        } else {
            let reason = parsed
                .get("reason")
                .and_then(Value::as_str)
                .unwrap_or("blocked by rule")
                .to_string();
            Ok(FilterResult::Block { reason })
        }
    }

    async fn call_model(&self, prompt: &str) -> Result<String, FeedpilotError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": { "temperature": 0.1, "maxOutputTokens": 500 },
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let json: Value = response.json().await?;
        let text = json["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .ok_or_else(|| FeedpilotError::OracleResponse("no text in completion".to_string()))?;
        Ok(text.to_string())
    }
}

#[async_trait]
impl FilterOracle for LlmFilter {
    async fn filter(&self, content: &[ContentBlock], rules: &[Rule]) -> Result<FilterResult> {
        let prompt = Self::build_prompt(content, rules);
        debug!("filter prompt built ({} chars, {} rules)", prompt.len(), rules.len());
        let completion = self.call_model(&prompt).await?;
        let verdict = Self::parse_verdict(&completion)?;
        debug!("filter verdict: {verdict:?}");
        Ok(verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(criteria: &str, mode: RuleMode) -> Rule {
        Rule { id: "r".into(), criteria: criteria.into(), mode }
    }

    #[test]
    fn prompt_carries_content_and_criteria() {
        let content = vec![
            ContentBlock::text("Tweet by alice: \n hello"),
            ContentBlock::Media {
                kind: "photo".into(),
                url: "https://img.example/x.jpg".into(),
                alt_text: "a dog".into(),
            },
        ];
        let rules = vec![
            rule("no engagement bait", RuleMode::Block),
            rule("keep rust content", RuleMode::Allow),
        ];
        let prompt = LlmFilter::build_prompt(&content, &rules);
        assert!(prompt.contains("Tweet by alice"));
        assert!(prompt.contains("Media photo -- a dog"));
        assert!(prompt.contains("- [block] no engagement bait"));
        assert!(prompt.contains("- [allow] keep rust content"));
        assert!(prompt.contains("pass_filter"));
    }

    #[test]
    fn parses_plain_and_fenced_verdicts() {
        let pass = LlmFilter::parse_verdict(r#"{"reason": "fine", "pass_filter": true}"#).unwrap();
        assert_eq!(pass, FilterResult::Pass);

        let fenced = "```json\n{\"reason\": \"bait\", \"pass_filter\": false}\n```";
        let block = LlmFilter::parse_verdict(fenced).unwrap();
        assert_eq!(block, FilterResult::Block { reason: "bait".into() });
    }

    #[test]
    fn block_without_reason_gets_a_default() {
        let verdict = LlmFilter::parse_verdict(r#"{"pass_filter": false}"#).unwrap();
        assert_eq!(verdict, FilterResult::Block { reason: "blocked by rule".into() });
    }

    #[test]
    fn malformed_completions_are_errors() {
        assert!(LlmFilter::parse_verdict("I think it should pass!").is_err());
        assert!(LlmFilter::parse_verdict(r#"{"reason": "no flag"}"#).is_err());
    }
}
