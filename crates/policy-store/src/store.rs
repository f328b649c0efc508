//! The `PolicyStore`: a registry of per-list indexes plus the cross-list
//! match queries the evaluator runs against it (§4.1).

use crate::index::ListIndex;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use warden_core::event::PolicyListEvent;
use warden_core::identity::RoomId;
use warden_core::rule::{EntityKind, Recommendation, Rule};

/// An ordered set of rules matching one target, per §3: literal matches
/// before glob matches, then by recommendation severity, then by source
/// list room id, then by timestamp.
#[derive(Debug, Clone, Default)]
pub struct Match(Vec<Rule>);

impl Match {
    /// All matching rules, in canonical order.
    pub fn rules(&self) -> &[Rule] {
        &self.0
    }

    /// Whether any rule matched.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The single effective rule.
    ///
    /// Narrows to the most specific rank present (literal beats glob, as in
    /// `rules()`'s own ordering), then picks within that rank by
    /// precedence: unban beats ban beats anything else. An explicit unban
    /// is an override on the same entity, not just a lower-severity
    /// recommendation: `rules()`'s display ordering puts ban ahead of
    /// unban, but that ordering is for presentation, not for this
    /// reduction. Ties within a precedence tier are broken by whichever
    /// rule comes first in canonical order (source list id, then
    /// timestamp).
    pub fn effective(&self) -> Option<&Rule> {
        let min_rank = self.0.iter().map(rule_rank).min()?;
        self.0
            .iter()
            .filter(|rule| rule_rank(rule) == min_rank)
            .fold(None, |best: Option<&Rule>, candidate| match best {
                None => Some(candidate),
                Some(current) if effective_precedence(candidate) > effective_precedence(current) => {
                    Some(candidate)
                }
                _ => best,
            })
    }
}

fn effective_precedence(rule: &Rule) -> u8 {
    match &rule.recommendation {
        Recommendation::Unban => 2,
        Recommendation::Ban => 1,
        Recommendation::Other(_) => 0,
    }
}

fn rule_rank(rule: &Rule) -> u8 {
    if rule.pattern.is_literal() {
        0
    } else {
        1
    }
}

fn canonical_order(rules: &mut Vec<Rule>) {
    rules.sort_by(|a, b| {
        rule_rank(a)
            .cmp(&rule_rank(b))
            .then_with(|| b.recommendation.severity().cmp(&a.recommendation.severity()))
            .then_with(|| a.source_list.as_str().cmp(b.source_list.as_str()))
            .then_with(|| a.timestamp_ms.cmp(&b.timestamp_ms))
    });
}

/// Indexes policy rules across every policy-list room this process has
/// seen, independent of which evaluator watches which lists.
#[derive(Default)]
pub struct PolicyStore {
    lists: RwLock<HashMap<RoomId, Arc<RwLock<ListIndex>>>>,
}

impl PolicyStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn list(&self, room: &RoomId) -> Arc<RwLock<ListIndex>> {
        if let Some(existing) = self.lists.read().unwrap().get(room) {
            return existing.clone();
        }
        self.lists.write().unwrap().entry(room.clone()).or_default().clone()
    }

    /// Apply a rule or redaction event. Returns `(added, removed)` deltas,
    /// each at most one rule long, per §4.1's per-event contract.
    pub fn update(&self, event: PolicyListEvent) -> (Vec<Rule>, Vec<Rule>) {
        match event {
            PolicyListEvent::Rule { room_id, kind, state_key, content, event_id, sender, timestamp_ms } => {
                let list = self.list(&room_id);
                let mut index = list.write().unwrap();
                index.upsert(room_id, kind, state_key, content, event_id, sender, timestamp_ms)
            }
            PolicyListEvent::Redaction { room_id, redacts } => {
                let list = self.list(&room_id);
                let mut index = list.write().unwrap();
                index.redact(redacts)
            }
        }
    }

    fn match_entity(&self, lists: &[RoomId], kind: EntityKind, target: &str) -> Match {
        let mut out = Vec::new();
        for room in lists {
            let Some(index) = self.lists.read().unwrap().get(room).cloned() else {
                continue;
            };
            index.read().unwrap().collect_matches(kind, target, &mut out);
        }
        canonical_order(&mut out);
        Match(out)
    }

    /// Match a user id against every rule from the given watched lists.
    pub fn match_user(&self, lists: &[RoomId], user_id: &str) -> Match {
        self.match_entity(lists, EntityKind::User, user_id)
    }

    /// Match a room id against every rule from the given watched lists.
    pub fn match_room(&self, lists: &[RoomId], room_id: &str) -> Match {
        self.match_entity(lists, EntityKind::Room, room_id)
    }

    /// Match a server name against every rule from the given watched lists.
    pub fn match_server(&self, lists: &[RoomId], server_name: &str) -> Match {
        self.match_entity(lists, EntityKind::Server, server_name)
    }

    /// A snapshot of every live rule in one list, used to back-fill an
    /// evaluator that just started watching it.
    pub fn rules_for_list(&self, list: &RoomId) -> Vec<Rule> {
        match self.lists.read().unwrap().get(list) {
            Some(index) => index.read().unwrap().all_rules(),
            None => Vec::new(),
        }
    }
}
