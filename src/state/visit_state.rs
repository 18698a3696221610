/// Visit state definitions for the link-following crawler
///
/// A locator moves through these states within a single visit. Nothing here
/// is persisted: the only durable trace of a visit is the completion stamp
/// written in the `Completed` transition.
use crate::AtlasError;
use std::fmt;

/// Represents where a single locator is in its visit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VisitState {
    // ===== Active States =====
    /// Not fetched in this visit yet
    Unvisited,

    /// A network request for the locator (or its alias listing) is in flight
    Fetching,

    /// The resolved URL differs from the requested one
    Redirected,

    /// The page was identified as an article and persisted
    Classified,

    /// Outbound links were probed and children enqueued
    ChildrenEnqueued,

    // ===== Terminal States =====
    /// Page belongs to an administrative namespace - recorded skip
    Administrative,

    /// Page does not exist - recorded skip
    NotFound,

    /// Visit finished and the completion stamp was written
    Completed,

    /// Visit aborted; eligible again on the next run
    Failed,
}

impl VisitState {
    /// Returns true if the visit cannot progress any further in this run
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Administrative | Self::NotFound | Self::Completed | Self::Failed
        )
    }

    /// Returns true for the two recorded-skip outcomes
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Administrative | Self::NotFound)
    }

    /// Returns true if the state machine allows moving from `self` to `next`
    pub fn can_transition_to(&self, next: VisitState) -> bool {
        use VisitState::*;
        match (self, next) {
            (Unvisited, Fetching) => true,
            (Fetching, Administrative | NotFound | Redirected | Classified | Failed) => true,
            (Redirected, Fetching | Classified | Failed) => true,
            (Classified, ChildrenEnqueued | Failed) => true,
            (ChildrenEnqueued, Completed | Failed) => true,
            (Failed, Unvisited) => true,
            _ => false,
        }
    }

    /// Moves to `next`, or reports the illegal transition
    pub fn transition(self, next: VisitState) -> Result<VisitState, AtlasError> {
        if self.can_transition_to(next) {
            tracing::trace!("visit state {} -> {}", self, next);
            Ok(next)
        } else {
            Err(AtlasError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unvisited => "unvisited",
            Self::Fetching => "fetching",
            Self::Redirected => "redirected",
            Self::Classified => "classified",
            Self::ChildrenEnqueued => "children_enqueued",
            Self::Administrative => "administrative",
            Self::NotFound => "not_found",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for VisitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
