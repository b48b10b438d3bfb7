// src/probe/mod.rs

//! The page-context probe: it can see the page's network traffic and
//! framework internals but has no privileged storage access. Everything
//! it learns leaves through the bus.

pub mod capture;
pub mod resolver;

pub use capture::{CapturingTransport, FetchTransport};
pub use resolver::{ElementIdentifierResolver, RenderNode, RenderTree, RenderTreeResolver};

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::messaging::{ProbeEndpoint, ResolveReply};

pub struct Probe {
    resolver: Arc<dyn ElementIdentifierResolver>,
}

impl Probe {
    pub fn new(resolver: Arc<dyn ElementIdentifierResolver>) -> Self {
        Self { resolver }
    }

    /// Serve identifier lookups until the coordinator endpoint closes.
    /// Resolution is best-effort; a failed lookup is a `None` reply, not
    /// an error.
    pub fn serve(self, mut endpoint: ProbeEndpoint) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(request) = endpoint.requests.recv().await {
                let identifier = self.resolver.resolve(&request.selector);
                let reply = ResolveReply {
                    correlation_id: request.correlation_id,
                    identifier,
                };
                if request.reply.send(reply).is_err() {
                    // requester navigated away mid-flight; nothing to do
                    debug!("resolve requester went away");
                }
            }
            debug!("bus closed, resolver loop exiting");
        })
    }
}
