// src/probe/resolver.rs
// Element-to-identifier resolution over the page framework's internal
// render tree. The internals are not a stable contract: every failure
// mode here is expected and maps to `None`, never a panic.

use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value;
use tracing::debug;

/// Resolves a DOM selector to the post identifier its element renders.
pub trait ElementIdentifierResolver: Send + Sync {
    fn resolve(&self, selector: &str) -> Option<String>;
}

/// Component name of the post renderer the walk targets.
const POST_RENDERER: &str = "Tweet";

/// Parent links come from an uncontrolled snapshot; bound the walk.
const MAX_WALK: usize = 512;

/// One captured render-instance node.
#[derive(Debug, Clone)]
pub struct RenderNode {
    /// Declared component name; `None` for host (plain DOM) nodes.
    pub component: Option<String>,
    /// Memoized input props as last committed by the framework.
    pub props: Value,
    /// Parent instance index, `None` at the root.
    pub parent: Option<usize>,
}

/// Snapshot of the page's render-instance tree with host-node lookup.
#[derive(Debug, Default)]
pub struct RenderTree {
    nodes: Vec<RenderNode>,
    hosts: HashMap<String, usize>,
}

impl RenderTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a node, returning its index.
    pub fn push(&mut self, component: Option<&str>, props: Value, parent: Option<usize>) -> usize {
        self.nodes.push(RenderNode {
            component: component.map(str::to_string),
            props,
            parent,
        });
        self.nodes.len() - 1
    }

    /// Register the selector addressing a host node.
    pub fn register_host(&mut self, selector: &str, node: usize) {
        self.hosts.insert(selector.to_string(), node);
    }

    fn host(&self, selector: &str) -> Option<usize> {
        self.hosts.get(selector).copied()
    }

    fn node(&self, index: usize) -> Option<&RenderNode> {
        self.nodes.get(index)
    }
}

/// Walks the instance chain upward from a host node to the post
/// renderer and reads its memoized props for the canonical id.
pub struct RenderTreeResolver {
    tree: RwLock<RenderTree>,
}

impl RenderTreeResolver {
    pub fn new(tree: RenderTree) -> Self {
        Self { tree: RwLock::new(tree) }
    }

    /// Swap the snapshot after a page re-render.
    pub fn replace(&self, tree: RenderTree) {
        if let Ok(mut current) = self.tree.write() {
            *current = tree;
        }
    }

    fn identifier_from_props(props: &Value) -> Option<String> {
        // the renderer memoizes the whole result object; some builds
        // flatten the id instead
        props
            .pointer("/tweet/rest_id")
            .and_then(Value::as_str)
            .or_else(|| props.get("tweetId").and_then(Value::as_str))
            .map(str::to_string)
    }
}

impl ElementIdentifierResolver for RenderTreeResolver {
    fn resolve(&self, selector: &str) -> Option<String> {
        let tree = self.tree.read().ok()?;
        let mut cursor = tree.host(selector);
        let mut hops = 0usize;

        while let Some(index) = cursor {
            if hops > MAX_WALK {
                debug!("instance chain above {selector} does not terminate");
                return None;
            }
            let node = tree.node(index)?;
            if node.component.as_deref() == Some(POST_RENDERER) {
                let identifier = Self::identifier_from_props(&node.props);
                if identifier.is_none() {
                    debug!("post renderer found for {selector} but its props have drifted");
                }
                return identifier;
            }
            cursor = node.parent;
            hops += 1;
        }

        debug!("no post renderer above {selector}");
        None
    }
}
