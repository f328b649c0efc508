//! Parsing of raw policy-rule state content into `Rule` fields.

use serde_json::Value;
use warden_core::rule::Recommendation;

/// The fields carried by a non-empty policy-rule state event.
pub(crate) struct ParsedRule {
    pub entity: String,
    pub recommendation: Recommendation,
    pub reason: Option<String>,
}

/// Whether `content` is the empty-object/`null` form that means "rule gone".
pub(crate) fn is_removal(content: &Value) -> bool {
    match content {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Parse a rule event's content. Returns `None` if required fields are
/// missing or malformed; callers log and drop such events rather than
/// letting them corrupt the index.
pub(crate) fn parse_rule(content: &Value) -> Option<ParsedRule> {
    let obj = content.as_object()?;
    let entity = obj.get("entity")?.as_str()?.to_string();
    if entity.is_empty() {
        return None;
    }
    let recommendation = match obj.get("recommendation")?.as_str()? {
        "m.ban" | "org.matrix.mjolnir.ban" => Recommendation::Ban,
        "m.unban" | "org.matrix.mjolnir.unban" => Recommendation::Unban,
        other => Recommendation::Other(other.to_string()),
    };
    let reason = obj.get("reason").and_then(Value::as_str).map(str::to_string);
    Some(ParsedRule { entity, recommendation, reason })
}
