//! Policy rule domain types shared between the policy store and evaluator.

use crate::identity::RoomId;
use crate::pattern::Pattern;
use serde::{Deserialize, Serialize};

/// What kind of identifier a rule's pattern is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// Matches against user ids.
    User,
    /// Matches against room ids.
    Room,
    /// Matches against server names.
    Server,
}

/// The recommendation a policy rule carries.
///
/// Severity ordering per §3: `Ban` > `Unban` > anything else. Unrecognized
/// recommendation strings are kept as `Other` and treated as no-ops by
/// `ApplyPolicy` rather than guessed at (Open Question (c)).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recommendation {
    /// `m.ban` (and legacy/unstable equivalents).
    Ban,
    /// `m.unban`.
    Unban,
    /// Any other recommendation string; currently a no-op.
    Other(String),
}

impl Recommendation {
    /// Numeric severity used to rank matches; higher wins.
    pub fn severity(&self) -> u8 {
        match self {
            Recommendation::Ban => 2,
            Recommendation::Unban => 1,
            Recommendation::Other(_) => 0,
        }
    }

    /// Whether this recommendation is actionable by the evaluator.
    pub fn is_actionable(&self) -> bool {
        !matches!(self, Recommendation::Other(_))
    }
}

/// A single policy rule absorbed from a policy-list room's state event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    /// The policy-list room this rule was published in.
    pub source_list: RoomId,
    /// What kind of identifier `pattern` matches against.
    pub kind: EntityKind,
    /// The original state key, used as this rule's identity within its list.
    pub state_key: String,
    /// The compiled entity pattern.
    pub pattern: Pattern,
    /// The recommendation carried by this rule.
    pub recommendation: Recommendation,
    /// Free-text reason, if the rule author supplied one.
    pub reason: Option<String>,
    /// The state event id that introduced the current version of this rule.
    pub event_id: String,
    /// The user id that sent the rule's state event.
    pub sender: crate::identity::UserId,
    /// Milliseconds since epoch, from the origin server timestamp.
    pub timestamp_ms: u64,
}

impl Rule {
    /// The entity string this rule's pattern was compiled from.
    pub fn entity(&self) -> &str {
        self.pattern.as_str()
    }
}
