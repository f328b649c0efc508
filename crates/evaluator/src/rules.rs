//! `HandlePolicyListChange` and its per-rule delta handlers (§4.3.4–§4.3.6).

use crate::apply::evaluate_user;
use crate::error::EvaluatorError;
use crate::evaluator::PolicyEvaluator;
use persistence::TakenAction;
use std::sync::Arc;
use telemetry::{record_enforcement, EnforcementEvent, Outcome};
use warden_core::identity::RoomId;
use warden_core::rule::{Recommendation, Rule};

/// Apply a policy-store delta from one list room, if this evaluator
/// watches it. Removes are processed before adds (§4.3, §5 ordering).
pub async fn handle_policy_list_change(
    evaluator: &Arc<PolicyEvaluator>,
    list_room: &RoomId,
    added: &[Rule],
    removed: &[Rule],
) -> Result<(), EvaluatorError> {
    if !evaluator.watched_lists().contains(list_room) {
        return Ok(());
    }

    for rule in removed {
        evaluate_removed_rule(evaluator, rule).await?;
    }
    for rule in added {
        evaluate_added_rule(evaluator, rule).await?;
    }
    Ok(())
}

/// §4.3.4: an unban removal may unmask a still-live ban; anything else
/// re-examines the targets this evaluator previously actioned in its name.
async fn evaluate_removed_rule(evaluator: &Arc<PolicyEvaluator>, rule: &Rule) -> Result<(), EvaluatorError> {
    if rule.recommendation == Recommendation::Unban {
        let affected: Vec<_> = evaluator
            .known_users()
            .into_iter()
            .filter(|user| rule.pattern.matches(user.as_str()))
            .collect();
        for user in affected {
            evaluate_user(evaluator, &user).await?;
        }
        return Ok(());
    }

    let actions = evaluator.taken_actions.get_all_by_rule_entity(&rule.source_list, rule.entity()).await?;
    reevaluate_actions(evaluator, &actions).await
}

/// §4.3.5: an added rule may newly cover users already known to this
/// evaluator; `EvaluateUser` recombines it with everything else live.
async fn evaluate_added_rule(evaluator: &Arc<PolicyEvaluator>, rule: &Rule) -> Result<(), EvaluatorError> {
    let affected: Vec<_> =
        evaluator.known_users().into_iter().filter(|user| rule.pattern.matches(user.as_str())).collect();
    for user in affected {
        evaluate_user(evaluator, &user).await?;
    }
    Ok(())
}

/// §4.3.6: the only path on which bans are lifted. Re-checks whether each
/// previously-taken action is still justified; if not, unbans and deletes
/// the record.
pub async fn reevaluate_actions(
    evaluator: &Arc<PolicyEvaluator>,
    actions: &[TakenAction],
) -> Result<(), EvaluatorError> {
    let lists = evaluator.watched_lists();
    for action in actions {
        let matched = evaluator.store.match_user(&lists, action.target_user.as_str());
        let still_banned = matches!(matched.effective().map(|r| &r.recommendation), Some(Recommendation::Ban));
        if still_banned {
            continue;
        }

        for room in &action.protected_rooms_affected {
            if !evaluator.dry_run {
                if let Err(err) = evaluator.chat_client.unban(room, &action.target_user).await {
                    tracing::warn!(room = room.as_str(), user = action.target_user.as_str(), error = %err, "unban failed during re-evaluation");
                    continue;
                }
            }
            record_enforcement(EnforcementEvent {
                outcome: Outcome::UnbanIssued,
                management_room: evaluator.management_room.clone(),
                target_user: Some(action.target_user.clone()),
                protected_room: Some(room.clone()),
            });
        }
        evaluator.taken_actions.delete(&action.target_user, &action.source_list, &action.rule_entity).await?;
        record_enforcement(EnforcementEvent {
            outcome: Outcome::Reevaluated,
            management_room: evaluator.management_room.clone(),
            target_user: Some(action.target_user.clone()),
            protected_room: None,
        });
    }
    Ok(())
}
