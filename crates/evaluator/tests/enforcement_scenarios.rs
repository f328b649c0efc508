//! End-to-end scenarios from the testable-properties list: ban propagation
//! across every protected room, a retracted rule lifting a ban, and an
//! unban masking (then un-masking) a ban from a different list.

mod support;

use persistence::InMemoryTakenActionStore;
use policy_store::PolicyStore;
use registry::ProtectionClaims;
use std::sync::Arc;
use support::{json_ban_rule, json_unban_rule, FakeChatClient};
use warden_core::event::{ConfigEvent, ConfigEventType, MemberState, PolicyListEvent};
use warden_core::identity::{RoomId, UserId};
use warden_core::rule::EntityKind;

async fn watch_lists(evaluator: &Arc<evaluator::PolicyEvaluator>, management_room: &RoomId, lists: &[RoomId]) {
    let mut entries = serde_json::Map::new();
    for list in lists {
        entries.insert(list.to_string(), serde_json::json!({"name": list.to_string()}));
    }
    let event = ConfigEvent {
        room_id: management_room.clone(),
        event_type: ConfigEventType::WatchedLists,
        content: serde_json::json!({"lists": entries}),
    };
    evaluator::handle_config_change(evaluator, event).await.unwrap();
}

fn ban_event(list: &RoomId, state_key: &str, entity: &str, event_id: &str, ts: u64) -> PolicyListEvent {
    PolicyListEvent::Rule {
        room_id: list.clone(),
        kind: EntityKind::User,
        state_key: state_key.to_string(),
        content: json_ban_rule(entity),
        event_id: event_id.to_string(),
        sender: UserId::from("@admin:example.org"),
        timestamp_ms: ts,
    }
}

fn unban_event(list: &RoomId, state_key: &str, entity: &str, event_id: &str, ts: u64) -> PolicyListEvent {
    PolicyListEvent::Rule {
        room_id: list.clone(),
        kind: EntityKind::User,
        state_key: state_key.to_string(),
        content: json_unban_rule(entity),
        event_id: event_id.to_string(),
        sender: UserId::from("@admin:example.org"),
        timestamp_ms: ts,
    }
}

async fn protect_room(
    evaluator: &Arc<evaluator::PolicyEvaluator>,
    chat: &FakeChatClient,
    room: &RoomId,
    target: &UserId,
) {
    chat.join(room);
    chat.set_power_levels(room, 100, 50, 50);
    chat.set_members(room, vec![(target.as_str(), MemberState::Join)]);
    evaluator::try_protecting_room(evaluator, room, false).await.unwrap();
}

#[tokio::test]
async fn ban_propagates_to_every_protected_room() {
    let chat = Arc::new(FakeChatClient::new("@bot:example.org"));
    let store = Arc::new(PolicyStore::new());
    let claims = Arc::new(ProtectionClaims::new());
    let actions = Arc::new(InMemoryTakenActionStore::new());

    let management_room = RoomId::from("!mgmt:example.org");
    let evaluator = evaluator::PolicyEvaluator::new(
        management_room.clone(),
        UserId::from("@bot:example.org"),
        false,
        store.clone(),
        claims,
        actions.clone(),
        chat.clone(),
    );

    let list = RoomId::from("!list:example.org");
    watch_lists(&evaluator, &management_room, &[list.clone()]).await;

    let target = UserId::from("@evil:example.org");
    let room_a = RoomId::from("!a:example.org");
    let room_b = RoomId::from("!b:example.org");
    protect_room(&evaluator, &chat, &room_a, &target).await;
    protect_room(&evaluator, &chat, &room_b, &target).await;

    let (added, removed) = store.update(ban_event(&list, "rule1", target.as_str(), "$ev1", 1));
    evaluator::handle_policy_list_change(&evaluator, &list, &added, &removed).await.unwrap();

    let mut calls = chat.ban_calls();
    calls.sort();
    let mut expected = vec![(room_a.clone(), target.clone()), (room_b.clone(), target.clone())];
    expected.sort();
    assert_eq!(calls, expected);

    let recorded = actions.get_all_by_target(&target).await.unwrap();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].protected_rooms_affected.len(), 2);
}

#[tokio::test]
async fn retracting_the_ban_rule_lifts_the_ban() {
    let chat = Arc::new(FakeChatClient::new("@bot:example.org"));
    let store = Arc::new(PolicyStore::new());
    let claims = Arc::new(ProtectionClaims::new());
    let actions = Arc::new(InMemoryTakenActionStore::new());

    let management_room = RoomId::from("!mgmt:example.org");
    let evaluator = evaluator::PolicyEvaluator::new(
        management_room.clone(),
        UserId::from("@bot:example.org"),
        false,
        store.clone(),
        claims,
        actions.clone(),
        chat.clone(),
    );

    let list = RoomId::from("!list:example.org");
    watch_lists(&evaluator, &management_room, &[list.clone()]).await;

    let target = UserId::from("@evil:example.org");
    let room = RoomId::from("!a:example.org");
    protect_room(&evaluator, &chat, &room, &target).await;

    let (added, removed) = store.update(ban_event(&list, "rule1", target.as_str(), "$ev1", 1));
    evaluator::handle_policy_list_change(&evaluator, &list, &added, &removed).await.unwrap();
    assert!(chat.is_banned(&room, &target));

    let (added, removed) =
        store.update(PolicyListEvent::Redaction { room_id: list.clone(), redacts: "$ev1".to_string() });
    evaluator::handle_policy_list_change(&evaluator, &list, &added, &removed).await.unwrap();

    assert!(!chat.is_banned(&room, &target));
    assert_eq!(chat.unban_calls(), vec![(room, target.clone())]);
    assert!(actions.get_all_by_target(&target).await.unwrap().is_empty());
}

#[tokio::test]
async fn unban_in_another_list_masks_the_ban_until_it_is_retracted() {
    let chat = Arc::new(FakeChatClient::new("@bot:example.org"));
    let store = Arc::new(PolicyStore::new());
    let claims = Arc::new(ProtectionClaims::new());
    let actions = Arc::new(InMemoryTakenActionStore::new());

    let management_room = RoomId::from("!mgmt:example.org");
    let evaluator = evaluator::PolicyEvaluator::new(
        management_room.clone(),
        UserId::from("@bot:example.org"),
        false,
        store.clone(),
        claims,
        actions.clone(),
        chat.clone(),
    );

    let ban_list = RoomId::from("!banlist:example.org");
    let allow_list = RoomId::from("!allowlist:example.org");
    watch_lists(&evaluator, &management_room, &[ban_list.clone(), allow_list.clone()]).await;

    let target = UserId::from("@evil:example.org");
    let room = RoomId::from("!a:example.org");
    protect_room(&evaluator, &chat, &room, &target).await;

    let (ban_added, ban_removed) = store.update(ban_event(&ban_list, "rule1", target.as_str(), "$ban1", 1));
    evaluator::handle_policy_list_change(&evaluator, &ban_list, &ban_added, &ban_removed).await.unwrap();
    assert!(chat.is_banned(&room, &target), "ban alone should take effect");

    let (unban_added, unban_removed) =
        store.update(unban_event(&allow_list, "rule1", target.as_str(), "$unban1", 2));
    evaluator::handle_policy_list_change(&evaluator, &allow_list, &unban_added, &unban_removed).await.unwrap();
    assert!(!chat.is_banned(&room, &target), "unban should mask the earlier ban");
    assert!(actions.get_all_by_target(&target).await.unwrap().is_empty());

    let (re_added, re_removed) =
        store.update(PolicyListEvent::Redaction { room_id: allow_list.clone(), redacts: "$unban1".to_string() });
    evaluator::handle_policy_list_change(&evaluator, &allow_list, &re_added, &re_removed).await.unwrap();
    assert!(chat.is_banned(&room, &target), "ban should reappear once the unban is retracted");
}

#[tokio::test]
async fn second_evaluator_cannot_claim_an_already_protected_room() {
    let store = Arc::new(PolicyStore::new());
    let claims = Arc::new(ProtectionClaims::new());
    let actions = Arc::new(InMemoryTakenActionStore::new());
    let room = RoomId::from("!shared:example.org");

    let chat_a = Arc::new(FakeChatClient::new("@bot-a:example.org"));
    let evaluator_a = evaluator::PolicyEvaluator::new(
        RoomId::from("!mgmt-a:example.org"),
        UserId::from("@bot-a:example.org"),
        false,
        store.clone(),
        claims.clone(),
        actions.clone(),
        chat_a.clone(),
    );
    chat_a.join(&room);
    chat_a.set_power_levels(&room, 100, 50, 50);
    chat_a.set_members(&room, vec![]);
    evaluator::try_protecting_room(&evaluator_a, &room, false).await.unwrap();

    let chat_b = Arc::new(FakeChatClient::new("@bot-b:example.org"));
    let evaluator_b = evaluator::PolicyEvaluator::new(
        RoomId::from("!mgmt-b:example.org"),
        UserId::from("@bot-b:example.org"),
        false,
        store,
        claims,
        Arc::new(InMemoryTakenActionStore::new()),
        chat_b.clone(),
    );
    chat_b.join(&room);
    chat_b.set_power_levels(&room, 100, 50, 50);

    let result = evaluator::try_protecting_room(&evaluator_b, &room, false).await;
    assert!(result.is_err());
    assert!(evaluator_b.want_to_protect().contains(&room));
    assert!(evaluator_a.protected_rooms().contains(&room));
}

#[tokio::test]
async fn glob_ban_covers_a_member_who_joins_after_the_rule_exists() {
    let chat = Arc::new(FakeChatClient::new("@bot:example.org"));
    let store = Arc::new(PolicyStore::new());
    let claims = Arc::new(ProtectionClaims::new());
    let actions = Arc::new(InMemoryTakenActionStore::new());

    let management_room = RoomId::from("!mgmt:example.org");
    let evaluator = evaluator::PolicyEvaluator::new(
        management_room.clone(),
        UserId::from("@bot:example.org"),
        false,
        store.clone(),
        claims,
        actions.clone(),
        chat.clone(),
    );

    let list = RoomId::from("!list:example.org");
    watch_lists(&evaluator, &management_room, &[list.clone()]).await;
    store.update(ban_event(&list, "rule1", "@spam_*:example.org", "$ev1", 1));

    let room = RoomId::from("!a:example.org");
    chat.join(&room);
    chat.set_power_levels(&room, 100, 50, 50);
    chat.set_members(&room, vec![]);
    evaluator::try_protecting_room(&evaluator, &room, false).await.unwrap();

    let newcomer = UserId::from("@spam_1:example.org");
    evaluator::handle_member(
        &evaluator,
        &warden_core::event::MemberEvent {
            room_id: room.clone(),
            target: newcomer.clone(),
            membership: MemberState::Join,
            sender: newcomer.clone(),
        },
    )
    .await
    .unwrap();

    assert!(chat.is_banned(&room, &newcomer));
}
