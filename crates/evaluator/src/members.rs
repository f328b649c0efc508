//! Member tracking within rooms this evaluator already protects (§4.3.7).
//!
//! The "bot accepts an invite to a brand-new management room" branch of
//! the original `HandleMember` lives in the dispatcher instead: no
//! `PolicyEvaluator` exists yet for a management room that hasn't been
//! registered.

use crate::apply::evaluate_user;
use crate::error::EvaluatorError;
use crate::evaluator::PolicyEvaluator;
use std::sync::Arc;
use warden_core::event::MemberEvent;

/// Update the member index for a membership change in a protected room,
/// and re-evaluate the target if they just became in-room.
pub async fn handle_member(evaluator: &Arc<PolicyEvaluator>, event: &MemberEvent) -> Result<(), EvaluatorError> {
    if !evaluator.protected_rooms().contains(&event.room_id) {
        return Ok(());
    }

    let became_in_room = event.membership.is_in_room();
    {
        let mut users = evaluator.users.write().unwrap();
        if became_in_room {
            users.entry(event.target.clone()).or_default().insert(event.room_id.clone());
        } else {
            let should_remove = if let Some(rooms) = users.get_mut(&event.target) {
                rooms.remove(&event.room_id);
                rooms.is_empty()
            } else {
                false
            };
            if should_remove {
                users.remove(&event.target);
            }
        }
    }

    if became_in_room {
        evaluate_user(evaluator, &event.target).await?;
    }
    Ok(())
}
