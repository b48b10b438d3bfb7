// src/messaging.rs
// Cross-context bus between the page probe and the coordinator. The two
// sides live in different execution contexts; everything crosses as
// messages. Delivery is in send order per direction, nothing more.

use tokio::sync::{mpsc, oneshot};
use tracing::debug;
use uuid::Uuid;

/// Fire-and-forget broadcast from the page context.
#[derive(Debug, Clone)]
pub enum ProbeEvent {
    NetworkPayloadCaptured { url: String, body: String },
}

/// Identifier lookup the coordinator sends into the page context.
#[derive(Debug)]
pub struct ResolveRequest {
    pub correlation_id: Uuid,
    pub selector: String,
    pub reply: oneshot::Sender<ResolveReply>,
}

#[derive(Debug, Clone)]
pub struct ResolveReply {
    pub correlation_id: Uuid,
    pub identifier: Option<String>,
}

/// Page-side endpoint: answers resolve requests, publishes captures.
pub struct ProbeEndpoint {
    pub requests: mpsc::Receiver<ResolveRequest>,
    pub events: EventPublisher,
}

/// Coordinator-side endpoint: issues resolve requests, consumes captures.
pub struct CoordinatorEndpoint {
    pub resolver: ResolveClient,
    pub events: mpsc::Receiver<ProbeEvent>,
}

/// Create the two connected endpoints of one page bus.
pub fn page_bus() -> (ProbeEndpoint, CoordinatorEndpoint) {
    let (request_tx, request_rx) = mpsc::channel(64);
    let (event_tx, event_rx) = mpsc::channel(256);
    (
        ProbeEndpoint {
            requests: request_rx,
            events: EventPublisher { tx: event_tx },
        },
        CoordinatorEndpoint {
            resolver: ResolveClient { tx: request_tx },
            events: event_rx,
        },
    )
}

/// Clonable sender for captured payloads. Publishing into a torn-down
/// coordinator drops the payload silently.
#[derive(Clone)]
pub struct EventPublisher {
    tx: mpsc::Sender<ProbeEvent>,
}

impl EventPublisher {
    pub async fn publish(&self, url: String, body: String) {
        if self
            .tx
            .send(ProbeEvent::NetworkPayloadCaptured { url, body })
            .await
            .is_err()
        {
            debug!("coordinator endpoint gone, dropping captured payload");
        }
    }
}

/// Clonable requester for identifier resolution. A torn-down page
/// context resolves to `None` rather than an error.
#[derive(Clone)]
pub struct ResolveClient {
    tx: mpsc::Sender<ResolveRequest>,
}

impl ResolveClient {
    pub async fn resolve_identifier(&self, selector: &str) -> Option<String> {
        let correlation_id = Uuid::new_v4();
        let (reply_tx, reply_rx) = oneshot::channel();
        let request = ResolveRequest {
            correlation_id,
            selector: selector.to_string(),
            reply: reply_tx,
        };
        if self.tx.send(request).await.is_err() {
            debug!("page context gone, cannot resolve {selector}");
            return None;
        }
        match reply_rx.await {
            Ok(reply) => {
                debug_assert_eq!(reply.correlation_id, correlation_id);
                reply.identifier
            }
            Err(_) => {
                debug!("page context dropped resolve request for {selector}");
                None
            }
        }
    }
}
