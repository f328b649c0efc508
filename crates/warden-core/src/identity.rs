//! Thin newtypes over chat-network identifiers.
//!
//! These deliberately don't validate Matrix sigil/localpart/server-name
//! grammar — that belongs to the (external) homeserver client. They exist
//! so room ids, user ids, and server names can't be mixed up at call sites.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Borrow the inner identifier string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(RoomId, "A room id, e.g. `!abc:example.org`.");
string_id!(UserId, "A user id, e.g. `@alice:example.org`.");
string_id!(ServerName, "A homeserver name, e.g. `example.org`.");

/// The localpart of a user id (everything before `:`), used to construct an
/// appservice intent for a bot at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Localpart(pub String);

impl fmt::Display for Localpart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl UserId {
    /// Split out the localpart, if this user id is well-formed (`@local:server`).
    pub fn localpart(&self) -> Option<Localpart> {
        let rest = self.0.strip_prefix('@')?;
        let (local, _server) = rest.split_once(':')?;
        Some(Localpart(local.to_string()))
    }
}
