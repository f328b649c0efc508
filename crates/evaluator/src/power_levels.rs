//! Parsing of raw `m.room.power_levels` content into `PowerLevels`.

use serde_json::Value;
use std::collections::HashMap;
use warden_core::chat::PowerLevels;
use warden_core::identity::UserId;

const DEFAULT_BAN_LEVEL: i64 = 50;
const DEFAULT_REDACT_LEVEL: i64 = 50;

/// Parse `m.room.power_levels` content, falling back to the Matrix spec's
/// documented defaults for any field that is missing or malformed.
pub(crate) fn parse(content: &Value) -> PowerLevels {
    let obj = content.as_object();

    let users = obj
        .and_then(|o| o.get("users"))
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .filter_map(|(user, level)| level.as_i64().map(|l| (UserId::from(user.as_str()), l)))
                .collect()
        })
        .unwrap_or_else(HashMap::new);

    let users_default = obj.and_then(|o| o.get("users_default")).and_then(Value::as_i64).unwrap_or(0);
    let ban = obj.and_then(|o| o.get("ban")).and_then(Value::as_i64).unwrap_or(DEFAULT_BAN_LEVEL);
    let redact = obj.and_then(|o| o.get("redact")).and_then(Value::as_i64).unwrap_or(DEFAULT_REDACT_LEVEL);

    PowerLevels { users, users_default, ban, redact }
}
