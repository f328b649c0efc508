//! `HandleConfigChange` (§4.3, §4.3.2, §4.3.3): watched-lists,
//! protected-rooms, and power-levels updates in the management room.

use crate::apply::evaluate_all_members;
use crate::error::EvaluatorError;
use crate::evaluator::PolicyEvaluator;
use crate::protection::{handle_power_level_change, handle_protected_rooms_change};
use crate::rules::reevaluate_actions;
use std::collections::HashSet;
use std::sync::Arc;
use warden_core::event::{ConfigEvent, ConfigEventType, PowerLevelsEvent, ProtectedRoomsContent, WatchedListsContent};
use warden_core::identity::RoomId;

/// Dispatch a management-room config event to the right handler.
pub async fn handle_config_change(evaluator: &Arc<PolicyEvaluator>, event: ConfigEvent) -> Result<(), EvaluatorError> {
    match event.event_type {
        ConfigEventType::WatchedLists => handle_watched_lists_change(evaluator, event.content).await,
        ConfigEventType::ProtectedRooms => {
            let content: ProtectedRoomsContent = serde_json::from_value(event.content).unwrap_or_default();
            let new_rooms: HashSet<RoomId> = content.rooms.into_iter().map(RoomId::from).collect();
            handle_protected_rooms_change(evaluator, new_rooms).await
        }
    }
}

/// Dispatch a power-levels change in a room this evaluator cares about.
pub async fn handle_power_levels_event(
    evaluator: &Arc<PolicyEvaluator>,
    event: PowerLevelsEvent,
) -> Result<(), EvaluatorError> {
    let power_levels = crate::power_levels::parse(&event.content);
    handle_power_level_change(evaluator, &event.room_id, &power_levels).await
}

async fn handle_watched_lists_change(
    evaluator: &Arc<PolicyEvaluator>,
    content: serde_json::Value,
) -> Result<(), EvaluatorError> {
    let parsed: WatchedListsContent = serde_json::from_value(content).unwrap_or_default();
    let new_lists: Vec<RoomId> = parsed.lists.into_keys().map(RoomId::from).collect();
    let new_set: HashSet<RoomId> = new_lists.iter().cloned().collect();
    let current_set: HashSet<RoomId> = evaluator.watched_lists().into_iter().collect();

    let added: Vec<RoomId> = new_set.difference(&current_set).cloned().collect();
    let removed: Vec<RoomId> = current_set.difference(&new_set).cloned().collect();

    *evaluator.watched_lists.write().unwrap() = new_lists;

    for list in &added {
        backfill_list(evaluator, list).await?;
    }
    if !added.is_empty() {
        let all_users = evaluator.known_users();
        evaluate_all_members(evaluator, &all_users).await?;
    }

    for list in &removed {
        reevaluate_affected_by_list(evaluator, list).await?;
    }
    Ok(())
}

/// Read a newly-watched list's current rule state from the homeserver and
/// feed it through the shared policy store, per §4.3's "lists added must
/// be back-filled" requirement.
async fn backfill_list(evaluator: &Arc<PolicyEvaluator>, list: &RoomId) -> Result<(), EvaluatorError> {
    let raw_rules = evaluator
        .chat_client
        .policy_rules(list)
        .await
        .map_err(|e| EvaluatorError::Transient(e.to_string()))?;
    for raw in raw_rules {
        evaluator.store.update(warden_core::event::PolicyListEvent::Rule {
            room_id: list.clone(),
            kind: raw.kind,
            state_key: raw.state_key,
            content: raw.content,
            event_id: raw.event_id,
            sender: raw.sender,
            timestamp_ms: raw.timestamp_ms,
        });
    }
    Ok(())
}

/// A list was dropped from the watched set: re-run `ReevaluateActions` for
/// everything this evaluator previously actioned in that list's name.
async fn reevaluate_affected_by_list(evaluator: &Arc<PolicyEvaluator>, list: &RoomId) -> Result<(), EvaluatorError> {
    let actions = evaluator.taken_actions.get_all_by_policy_list(list).await?;
    reevaluate_actions(evaluator, &actions).await
}
