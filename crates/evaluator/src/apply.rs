//! `EvaluateUser`/`EvaluateAllMembers`/`ApplyPolicy` (§4.3).

use crate::error::EvaluatorError;
use crate::evaluator::PolicyEvaluator;
use persistence::{ActionKind, TakenAction};
use std::collections::HashSet;
use std::sync::Arc;
use telemetry::{record_enforcement, EnforcementEvent, Outcome};
use warden_core::identity::{RoomId, UserId};
use warden_core::ids::now_ms;
use warden_core::rule::Recommendation;

/// Re-evaluate one user against the current combined policy corpus and
/// apply whatever recommendation wins.
pub async fn evaluate_user(evaluator: &Arc<PolicyEvaluator>, user_id: &UserId) -> Result<(), EvaluatorError> {
    let lists = evaluator.watched_lists();
    let matched = evaluator.store.match_user(&lists, user_id.as_str());
    if matched.is_empty() {
        return Ok(());
    }
    apply_policy(evaluator, user_id, &matched).await
}

/// Re-evaluate every user in `user_ids`, bounded by the evaluator's
/// fan-out semaphore (§5/§9 "bound the concurrency").
pub async fn evaluate_all_members(
    evaluator: &Arc<PolicyEvaluator>,
    user_ids: &[UserId],
) -> Result<(), EvaluatorError> {
    let mut set = tokio::task::JoinSet::new();
    for user_id in user_ids.iter().cloned() {
        let evaluator = evaluator.clone();
        let permit = evaluator.fanout.clone().acquire_owned().await.expect("semaphore not closed");
        set.spawn(async move {
            let _permit = permit;
            evaluate_user(&evaluator, &user_id).await
        });
    }
    while let Some(joined) = set.join_next().await {
        if let Ok(Err(err)) = joined {
            tracing::warn!(error = %err, "evaluate_user failed during fan-out");
        }
    }
    Ok(())
}

/// Reduce `matched` to a single effective recommendation and enforce it.
/// Safe to call twice with the same input: both the ban and unban branches
/// check the action log before issuing a homeserver call (§5 "Idempotence").
pub async fn apply_policy(
    evaluator: &Arc<PolicyEvaluator>,
    user_id: &UserId,
    matched: &policy_store::Match,
) -> Result<(), EvaluatorError> {
    let Some(winning) = matched.effective() else {
        return Ok(());
    };

    match &winning.recommendation {
        Recommendation::Ban => {
            let member_rooms: HashSet<RoomId> =
                evaluator.users.read().unwrap().get(user_id).cloned().unwrap_or_default();
            if member_rooms.is_empty() {
                return Ok(());
            }

            let already = evaluator
                .taken_actions
                .get_all_by_rule_entity(&winning.source_list, winning.entity())
                .await?;
            let already_rooms: HashSet<RoomId> = already
                .iter()
                .filter(|a| &a.target_user == user_id)
                .flat_map(|a| a.protected_rooms_affected.iter().cloned())
                .collect();

            let to_ban: Vec<RoomId> = member_rooms.difference(&already_rooms).cloned().collect();
            if to_ban.is_empty() {
                return Ok(());
            }

            if !evaluator.dry_run {
                for room in &to_ban {
                    if let Err(err) =
                        evaluator.chat_client.ban(room, user_id, winning.reason.as_deref().unwrap_or("")).await
                    {
                        tracing::warn!(room = room.as_str(), user = user_id.as_str(), error = %err, "ban failed");
                        continue;
                    }
                    record_enforcement(EnforcementEvent {
                        outcome: Outcome::BanIssued,
                        management_room: evaluator.management_room.clone(),
                        target_user: Some(user_id.clone()),
                        protected_room: Some(room.clone()),
                    });
                }
            }

            let mut all_rooms = already_rooms;
            all_rooms.extend(to_ban);
            evaluator
                .taken_actions
                .put(&TakenAction {
                    target_user: user_id.clone(),
                    source_list: winning.source_list.clone(),
                    rule_entity: winning.entity().to_string(),
                    action_kind: ActionKind::Ban,
                    taken_at_ms: now_ms(),
                    protected_rooms_affected: all_rooms.into_iter().collect(),
                })
                .await?;
            Ok(())
        }
        Recommendation::Unban => {
            let previous = evaluator.taken_actions.get_all_by_target(user_id).await?;
            for action in previous {
                for room in &action.protected_rooms_affected {
                    if !evaluator.dry_run {
                        if let Err(err) = evaluator.chat_client.unban(room, user_id).await {
                            tracing::warn!(room = room.as_str(), user = user_id.as_str(), error = %err, "unban failed");
                            continue;
                        }
                    }
                    record_enforcement(EnforcementEvent {
                        outcome: Outcome::UnbanIssued,
                        management_room: evaluator.management_room.clone(),
                        target_user: Some(user_id.clone()),
                        protected_room: Some(room.clone()),
                    });
                }
                evaluator.taken_actions.delete(user_id, &action.source_list, &action.rule_entity).await?;
            }
            Ok(())
        }
        Recommendation::Other(_) => Ok(()),
    }
}
