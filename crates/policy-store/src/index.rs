//! Per-list rule index: the literal/glob split and the redaction reverse
//! lookup described in §4.1.

use crate::parse::{is_removal, parse_rule};
use std::collections::HashMap;
use warden_core::identity::{RoomId, UserId};
use warden_core::pattern::Pattern;
use warden_core::rule::{EntityKind, Rule};

/// Rules for a single policy-list room, split for O(1) literal lookup with
/// a linear fallback for globs.
#[derive(Default)]
pub(crate) struct ListIndex {
    /// Authoritative storage, keyed by this rule's identity within its list.
    by_state_key: HashMap<(EntityKind, String), Rule>,
    /// Literal-pattern rules: pattern text -> state keys sharing it.
    literal: HashMap<EntityKind, HashMap<String, Vec<String>>>,
    /// Glob-pattern rules: state keys only, fetched back through
    /// `by_state_key` during a scan.
    globs: HashMap<EntityKind, Vec<String>>,
    /// event id -> identity, so a bare `m.room.redaction` can find the rule
    /// it targets without carrying a kind/state-key of its own.
    by_event_id: HashMap<String, (EntityKind, String)>,
}

impl ListIndex {
    fn remove_from_derived(&mut self, kind: EntityKind, state_key: &str, pattern: &str) {
        if let Some(bucket) = self.literal.get_mut(&kind) {
            if let Some(keys) = bucket.get_mut(pattern) {
                keys.retain(|k| k != state_key);
                if keys.is_empty() {
                    bucket.remove(pattern);
                }
            }
        }
        if let Some(keys) = self.globs.get_mut(&kind) {
            keys.retain(|k| k != state_key);
        }
    }

    fn insert_into_derived(&mut self, rule: &Rule) {
        if rule.pattern.is_literal() {
            self.literal
                .entry(rule.kind)
                .or_default()
                .entry(rule.pattern.as_str().to_string())
                .or_default()
                .push(rule.state_key.clone());
        } else {
            self.globs.entry(rule.kind).or_default().push(rule.state_key.clone());
        }
    }

    /// Upsert (or remove, for empty content) a rule. Returns `(added, removed)`.
    pub(crate) fn upsert(
        &mut self,
        room_id: RoomId,
        kind: EntityKind,
        state_key: String,
        content: serde_json::Value,
        event_id: String,
        sender: UserId,
        timestamp_ms: u64,
    ) -> (Vec<Rule>, Vec<Rule>) {
        let identity = (kind, state_key.clone());
        let prior = self.by_state_key.get(&identity).cloned();

        if is_removal(&content) {
            return match prior {
                Some(old) => {
                    self.remove_from_derived(kind, &state_key, old.pattern.as_str());
                    self.by_event_id.remove(&old.event_id);
                    self.by_state_key.remove(&identity);
                    (Vec::new(), vec![old])
                }
                None => (Vec::new(), Vec::new()),
            };
        }

        let Some(parsed) = parse_rule(&content) else {
            tracing::warn!(
                list = room_id.as_str(),
                state_key = %state_key,
                "dropping malformed policy rule content"
            );
            return (Vec::new(), Vec::new());
        };

        if let Some(old) = &prior {
            self.remove_from_derived(kind, &state_key, old.pattern.as_str());
            self.by_event_id.remove(&old.event_id);
        }

        let new_rule = Rule {
            source_list: room_id,
            kind,
            state_key: state_key.clone(),
            pattern: Pattern::new(parsed.entity),
            recommendation: parsed.recommendation,
            reason: parsed.reason,
            event_id: event_id.clone(),
            sender,
            timestamp_ms,
        };

        self.insert_into_derived(&new_rule);
        self.by_event_id.insert(event_id, identity.clone());
        self.by_state_key.insert(identity, new_rule.clone());

        (vec![new_rule], prior.into_iter().collect())
    }

    /// Resolve and drop the rule targeted by a redaction. Returns `(added, removed)`.
    pub(crate) fn redact(&mut self, redacts: String) -> (Vec<Rule>, Vec<Rule>) {
        let Some((kind, state_key)) = self.by_event_id.remove(&redacts) else {
            return (Vec::new(), Vec::new());
        };
        let identity = (kind, state_key.clone());
        match self.by_state_key.remove(&identity) {
            Some(old) => {
                self.remove_from_derived(kind, &state_key, old.pattern.as_str());
                (Vec::new(), vec![old])
            }
            None => (Vec::new(), Vec::new()),
        }
    }

    /// Append every rule matching `target` for `kind` into `out`.
    pub(crate) fn collect_matches(&self, kind: EntityKind, target: &str, out: &mut Vec<Rule>) {
        if let Some(bucket) = self.literal.get(&kind) {
            if let Some(keys) = bucket.get(target) {
                for key in keys {
                    if let Some(rule) = self.by_state_key.get(&(kind, key.clone())) {
                        out.push(rule.clone());
                    }
                }
            }
        }
        if let Some(keys) = self.globs.get(&kind) {
            for key in keys {
                if let Some(rule) = self.by_state_key.get(&(kind, key.clone())) {
                    if rule.pattern.matches(target) {
                        out.push(rule.clone());
                    }
                }
            }
        }
    }

    /// A snapshot of every live rule in this list.
    pub(crate) fn all_rules(&self) -> Vec<Rule> {
        self.by_state_key.values().cloned().collect()
    }
}
