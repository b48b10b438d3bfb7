// src/probe/capture.rs
// Wraps the page's transports so every completed response body is
// forwarded, paired with its request URL, without changing what the
// page itself observes. No filtering here; relevance is decided
// downstream by the ingest gate.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use crate::messaging::EventPublisher;

/// Future-style transport (the page's `fetch`).
#[async_trait]
pub trait FetchTransport: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// Capturing wrapper over a transport. Successful bodies are published
/// as `networkPayloadCaptured`; errors pass through untapped.
pub struct CapturingTransport<T> {
    inner: Arc<T>,
    events: EventPublisher,
}

impl<T: FetchTransport + 'static> CapturingTransport<T> {
    pub fn new(inner: T, events: EventPublisher) -> Self {
        Self { inner: Arc::new(inner), events }
    }

    /// Future-style path: resolves with exactly the body the inner
    /// transport produced; the capture forward happens off to the side.
    pub async fn fetch(&self, url: &str) -> Result<String> {
        let body = self.inner.fetch(url).await?;
        let events = self.events.clone();
        let captured_url = url.to_string();
        let captured_body = body.clone();
        tokio::spawn(async move {
            events.publish(captured_url, captured_body).await;
        });
        Ok(body)
    }

    /// Callback-style path (the page's XHR shape): `on_load` fires with
    /// the response once the request completes; the same completion is
    /// captured. A failed request fires nothing, as the page's own
    /// load listener would not.
    pub fn send(&self, url: &str, on_load: impl FnOnce(String) + Send + 'static) {
        let inner = self.inner.clone();
        let events = self.events.clone();
        let url = url.to_string();
        tokio::spawn(async move {
            match inner.fetch(&url).await {
                Ok(body) => {
                    events.publish(url.clone(), body.clone()).await;
                    on_load(body);
                }
                Err(e) => debug!("transport error for {url}: {e:#}"),
            }
        });
    }
}
