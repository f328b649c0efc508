//! The protection-claim protocol (§4.3.1, §4.3.2, §4.3.3).

use crate::apply::evaluate_all_members;
use crate::error::EvaluatorError;
use crate::evaluator::PolicyEvaluator;
use registry::ClaimOutcome;
use std::collections::HashSet;
use std::sync::Arc;
use telemetry::{record_enforcement, EnforcementEvent, Outcome};
use warden_core::chat::PowerLevels;
use warden_core::identity::{RoomId, UserId};

/// Acquire the process-wide claim on `room`, verify the bot can enforce it,
/// and mark it protected. Mirrors meowlnir's `tryProtectingRoom`.
pub async fn try_protecting_room(
    evaluator: &Arc<PolicyEvaluator>,
    room: &RoomId,
    do_reeval: bool,
) -> Result<(), EvaluatorError> {
    let claimant: Arc<dyn registry::Claimant> = evaluator.clone();
    match evaluator.claims.try_claim(room, claimant) {
        ClaimOutcome::Claimed => {}
        ClaimOutcome::HeldByOther(_) => {
            evaluator.protected.write().unwrap().want_to_protect.insert(room.clone());
            record_enforcement(EnforcementEvent {
                outcome: Outcome::ClaimRejected,
                management_room: evaluator.management_room.clone(),
                target_user: None,
                protected_room: Some(room.clone()),
            });
            return Err(EvaluatorError::AlreadyProtected(room.to_string()));
        }
    }

    let joined = evaluator
        .chat_client
        .joined_rooms()
        .await
        .map_err(|e| EvaluatorError::Transient(e.to_string()))?;
    if !joined.contains(room) {
        evaluator.protected.write().unwrap().want_to_protect.insert(room.clone());
        return Err(EvaluatorError::NotInRoom(room.to_string()));
    }

    let power_levels = evaluator
        .chat_client
        .power_levels(room)
        .await
        .map_err(|e| EvaluatorError::Transient(e.to_string()))?;
    if !has_sufficient_power(evaluator, &power_levels) && !evaluator.dry_run {
        evaluator.protected.write().unwrap().want_to_protect.insert(room.clone());
        return Err(EvaluatorError::InsufficientPowerLevel(room.to_string()));
    }

    let members =
        evaluator.chat_client.members(room).await.map_err(|e| EvaluatorError::Transient(e.to_string()))?;
    mark_as_protected_room(evaluator, room, &members);

    if do_reeval {
        let member_ids: Vec<UserId> = members.into_iter().map(|m| m.user_id).collect();
        evaluate_all_members(evaluator, &member_ids).await?;
    }
    Ok(())
}

fn has_sufficient_power(evaluator: &PolicyEvaluator, power_levels: &PowerLevels) -> bool {
    power_levels.level_of(&evaluator.bot_user_id) >= power_levels.min_enforcement_level()
}

fn mark_as_protected_room(
    evaluator: &PolicyEvaluator,
    room: &RoomId,
    members: &[warden_core::chat::RoomMember],
) {
    {
        let mut protected = evaluator.protected.write().unwrap();
        protected.protected.insert(room.clone());
        protected.want_to_protect.remove(room);
    }
    let mut users = evaluator.users.write().unwrap();
    for member in members {
        if member.membership.is_in_room() {
            users.entry(member.user_id.clone()).or_default().insert(room.clone());
        }
    }
}

/// Apply a new protected-rooms configuration: stop protecting rooms no
/// longer listed, claim and protect newly listed ones in a bounded
/// fan-out, then re-evaluate the union of newly-seen members once (§4.3.2).
pub async fn handle_protected_rooms_change(
    evaluator: &Arc<PolicyEvaluator>,
    new_rooms: HashSet<RoomId>,
) -> Result<(), EvaluatorError> {
    let current = evaluator.protected.read().unwrap().protected.clone();

    for room in current.difference(&new_rooms) {
        evaluator.protected.write().unwrap().protected.remove(room);
        let claimant: Arc<dyn registry::Claimant> = evaluator.clone();
        evaluator.claims.release(room, &claimant);
        let _ = evaluator.chat_client.send_notice(&evaluator.management_room, &format!("Stopped protecting {room}")).await;
    }

    let to_add: Vec<RoomId> = new_rooms.difference(&current).cloned().collect();
    let mut set = tokio::task::JoinSet::new();
    for room in to_add {
        let evaluator = evaluator.clone();
        let permit = evaluator.fanout.clone().acquire_owned().await.expect("semaphore not closed");
        set.spawn(async move {
            let _permit = permit;
            let result = try_protecting_room(&evaluator, &room, false).await;
            if let Err(err) = &result {
                tracing::warn!(room = room.as_str(), error = %err, "failed to protect room");
            }
            (room, result)
        });
    }
    let mut newly_protected = Vec::new();
    while let Some(joined) = set.join_next().await {
        if let Ok((room, Ok(()))) = joined {
            newly_protected.push(room);
        }
    }

    let member_union: Vec<UserId> = {
        let users = evaluator.users.read().unwrap();
        users
            .iter()
            .filter(|(_, rooms)| rooms.iter().any(|r| newly_protected.contains(r)))
            .map(|(user, _)| user.clone())
            .collect()
    };
    if !member_union.is_empty() {
        evaluate_all_members(evaluator, &member_union).await?;
    }
    Ok(())
}

/// React to a power-levels change in a protected (or want-to-protect) room
/// (§4.3.3).
pub async fn handle_power_level_change(
    evaluator: &Arc<PolicyEvaluator>,
    room: &RoomId,
    power_levels: &PowerLevels,
) -> Result<(), EvaluatorError> {
    let (is_protected, wants_protection) = {
        let protected = evaluator.protected.read().unwrap();
        (protected.protected.contains(room), protected.want_to_protect.contains(room))
    };

    if is_protected {
        if !has_sufficient_power(evaluator, power_levels) {
            let _ = evaluator
                .chat_client
                .send_notice(
                    &evaluator.management_room,
                    &format!("Lost sufficient power level in {room}; enforcement may fail"),
                )
                .await;
        }
        return Ok(());
    }

    if wants_protection && has_sufficient_power(evaluator, power_levels) {
        try_protecting_room(evaluator, room, true).await?;
    }
    Ok(())
}
