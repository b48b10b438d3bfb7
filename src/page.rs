// src/page.rs
// The page surface the coordinator renders onto, and the pure mapping
// from triage state to on-screen presentation.

use tokio::sync::broadcast;

use crate::coordinator::state::PostState;
use crate::filter::FilterResult;

/// Handle for one on-screen post element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageElement {
    /// Page-unique key for this element instance.
    pub key: u64,
    /// Selector uniquely addressing the element, when derivable.
    pub selector: Option<String>,
}

/// How one element should look.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Presentation {
    pub visible: bool,
    pub tint: Option<Tint>,
    /// Block reason surfaced in debug mode.
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tint {
    Pending,
    Pass,
    Block,
    Unresolved,
}

/// Map (state, debug flag) to a presentation. No verdict yet renders
/// neutral; a block hides the element unless debug mode flags it
/// visibly with its reason.
pub fn presentation_for(state: Option<&PostState>, debug: bool) -> Presentation {
    match state.and_then(|s| s.filter_result.as_ref()) {
        None => Presentation {
            visible: true,
            tint: debug.then_some(Tint::Pending),
            reason: None,
        },
        Some(FilterResult::Pass) => Presentation {
            visible: true,
            tint: debug.then_some(Tint::Pass),
            reason: None,
        },
        Some(FilterResult::Block { reason }) => {
            if debug {
                Presentation {
                    visible: true,
                    tint: Some(Tint::Block),
                    reason: Some(reason.clone()),
                }
            } else {
                Presentation { visible: false, tint: None, reason: None }
            }
        }
    }
}

/// Presentation for an element whose identifier could not be resolved.
pub fn presentation_unresolved(debug: bool) -> Presentation {
    Presentation {
        visible: true,
        tint: debug.then_some(Tint::Unresolved),
        reason: None,
    }
}

/// Privileged-context view of the live page. Applying a presentation
/// also rebuilds the per-post overlay anchor, which is why redundant
/// applies are worth suppressing upstream.
pub trait PageSurface: Send + Sync {
    /// Snapshot of currently visible post elements, in document order.
    fn visible_elements(&self) -> Vec<PageElement>;

    /// Apply a presentation to an element. `post_id` is `None` when the
    /// element never resolved.
    fn apply(&self, element: &PageElement, post_id: Option<&str>, presentation: &Presentation);

    /// Whether the element still carries the marker from its last
    /// `apply`. Re-created DOM nodes lose it and must be re-rendered
    /// even when the triage state is unchanged.
    fn has_marker(&self, element: &PageElement) -> bool;

    /// Coalesced mutation feed; at-least-once per burst of DOM changes.
    fn mutations(&self) -> broadcast::Receiver<()>;
}
