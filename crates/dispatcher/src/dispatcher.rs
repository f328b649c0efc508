//! The `Dispatcher`: routes `InboundEvent`s to the right evaluator, bot, or
//! forwarder (§4.4, §D.7). Mirrors `eventhandling.go`'s `AddEventHandlers`
//! routing table, generalized from per-type-tag handler registration to a
//! single `match` over the already-classified `InboundEvent`.

use crate::admin;
use crate::crypto::decrypt_with_retry;
use crate::error::DispatcherError;
use crate::forwarder::MessageForwarder;
use dashmap::DashMap;
use evaluator::PolicyEvaluator;
use persistence::{ManagementRoomStore, TakenActionStore};
use policy_store::PolicyStore;
use registry::{BotRecord, BotRegistry, ProtectionClaims};
use std::sync::Arc;
use warden_core::event::{
    ConfigEvent, EncryptedEvent, InboundEvent, MemberEvent, MemberState, MessageEvent, PolicyListEvent,
    PowerLevelsEvent,
};
use warden_core::identity::RoomId;

/// Owns the evaluator-by-room indexes and routes every inbound event to the
/// right place. Does not itself implement any enforcement logic; that all
/// lives in `evaluator`.
pub struct Dispatcher {
    bots: Arc<BotRegistry>,
    claims: Arc<ProtectionClaims>,
    store: Arc<PolicyStore>,
    taken_actions: Arc<dyn TakenActionStore>,
    management_rooms: Arc<dyn ManagementRoomStore>,
    forwarder: Option<Arc<dyn MessageForwarder>>,
    evaluators: DashMap<RoomId, Arc<PolicyEvaluator>>,
    protected_index: DashMap<RoomId, RoomId>,
}

impl Dispatcher {
    /// Build a dispatcher with no evaluators registered yet.
    pub fn new(
        bots: Arc<BotRegistry>,
        claims: Arc<ProtectionClaims>,
        store: Arc<PolicyStore>,
        taken_actions: Arc<dyn TakenActionStore>,
        management_rooms: Arc<dyn ManagementRoomStore>,
        forwarder: Option<Arc<dyn MessageForwarder>>,
    ) -> Self {
        Self {
            bots,
            claims,
            store,
            taken_actions,
            management_rooms,
            forwarder,
            evaluators: DashMap::new(),
            protected_index: DashMap::new(),
        }
    }

    /// Register an already-constructed evaluator and index its currently
    /// protected rooms.
    pub fn register_evaluator(&self, evaluator: Arc<PolicyEvaluator>) {
        self.refresh_protected_index(&evaluator);
        self.evaluators.insert(evaluator.management_room().clone(), evaluator);
    }

    fn refresh_protected_index(&self, evaluator: &Arc<PolicyEvaluator>) {
        for room in evaluator.protected_rooms() {
            self.protected_index.insert(room, evaluator.management_room().clone());
        }
    }

    fn management_evaluator(&self, room: &RoomId) -> Option<Arc<PolicyEvaluator>> {
        self.evaluators.get(room).map(|entry| entry.value().clone())
    }

    fn protected_evaluator(&self, room: &RoomId) -> Option<Arc<PolicyEvaluator>> {
        let management_room = self.protected_index.get(room)?.clone();
        self.management_evaluator(&management_room)
    }

    fn evaluator_for_room(&self, room: &RoomId) -> Option<Arc<PolicyEvaluator>> {
        self.management_evaluator(room).or_else(|| self.protected_evaluator(room))
    }

    fn bot_for_room(&self, room: &RoomId) -> Option<BotRecord> {
        let evaluator = self.evaluator_for_room(room)?;
        self.bots.get(evaluator.bot_user_id())
    }

    /// Route one inbound event to its handler.
    pub async fn dispatch(&self, event: InboundEvent) -> Result<(), DispatcherError> {
        match event {
            InboundEvent::PolicyList(event) => self.dispatch_policy_list(event).await,
            InboundEvent::Config(event) => self.dispatch_config(event).await,
            InboundEvent::PowerLevels(event) => self.dispatch_power_levels(event).await,
            InboundEvent::Member(event) => self.dispatch_member(event).await,
            InboundEvent::Message(event) => self.dispatch_message(event).await,
            InboundEvent::Encrypted(event) => self.dispatch_encrypted(event).await,
            InboundEvent::OtkCount(event) => {
                tracing::debug!(user = event.user_id.as_str(), device = event.device_id, "received OTK count, handled by crypto machinery");
                Ok(())
            }
            InboundEvent::ToDevice(event) => {
                tracing::debug!(to = event.to_user_id.as_str(), event_type = event.event_type, "received to-device event, handled by crypto machinery");
                Ok(())
            }
        }
    }

    async fn dispatch_policy_list(&self, event: PolicyListEvent) -> Result<(), DispatcherError> {
        let list_room = match &event {
            PolicyListEvent::Rule { room_id, .. } => room_id.clone(),
            PolicyListEvent::Redaction { room_id, .. } => room_id.clone(),
        };
        let (added, removed) = self.store.update(event);
        for entry in self.evaluators.iter() {
            let evaluator = entry.value().clone();
            if let Err(err) = evaluator::handle_policy_list_change(&evaluator, &list_room, &added, &removed).await {
                tracing::warn!(
                    management_room = evaluator.management_room().as_str(),
                    error = %err,
                    "failed to apply policy list change"
                );
            }
        }
        Ok(())
    }

    async fn dispatch_config(&self, event: ConfigEvent) -> Result<(), DispatcherError> {
        let Some(evaluator) = self.management_evaluator(&event.room_id) else { return Ok(()) };
        evaluator::handle_config_change(&evaluator, event).await?;
        self.refresh_protected_index(&evaluator);
        Ok(())
    }

    async fn dispatch_power_levels(&self, event: PowerLevelsEvent) -> Result<(), DispatcherError> {
        let Some(evaluator) = self.evaluator_for_room(&event.room_id) else { return Ok(()) };
        evaluator::handle_power_levels_event(&evaluator, event).await?;
        self.refresh_protected_index(&evaluator);
        Ok(())
    }

    async fn dispatch_member(&self, event: MemberEvent) -> Result<(), DispatcherError> {
        if event.membership == MemberState::Invite {
            if let Some(bot) = self.bots.get(&event.target) {
                if self.management_evaluator(&event.room_id).is_none() {
                    self.accept_management_room_invite(&bot, &event).await?;
                    return Ok(());
                }
            }
        }

        // A member event's room can be a management room, a protected
        // room, both, or neither; `handle_member` is a no-op for any
        // evaluator that doesn't protect it.
        if let Some(evaluator) = self.management_evaluator(&event.room_id) {
            evaluator::handle_member(&evaluator, &event).await?;
        }
        if let Some(evaluator) = self.protected_evaluator(&event.room_id) {
            evaluator::handle_member(&evaluator, &event).await?;
        }
        Ok(())
    }

    async fn accept_management_room_invite(
        &self,
        bot: &BotRecord,
        invite: &MemberEvent,
    ) -> Result<(), DispatcherError> {
        bot.chat_client.join_room_by_id(&invite.room_id).await?;
        self.management_rooms.put(&invite.room_id, bot.chat_client.own_user_id().as_str()).await?;

        let evaluator = PolicyEvaluator::from_bot_record(
            invite.room_id.clone(),
            bot,
            self.store.clone(),
            self.claims.clone(),
            self.taken_actions.clone(),
        );
        tracing::info!(
            room = invite.room_id.as_str(),
            inviter = invite.sender.as_str(),
            "joined management room after invite, loading room state"
        );
        self.register_evaluator(evaluator);
        Ok(())
    }

    async fn dispatch_message(&self, event: MessageEvent) -> Result<(), DispatcherError> {
        if let Some(evaluator) = self.management_evaluator(&event.room_id) {
            admin::handle_message(&evaluator, &event).await;
            return Ok(());
        }
        if self.protected_evaluator(&event.room_id).is_some() {
            if let Some(forwarder) = &self.forwarder {
                if let Err(err) = forwarder.forward(&event).await {
                    tracing::warn!(room = event.room_id.as_str(), error = %err, "failed to forward message");
                }
            }
        }
        Ok(())
    }

    async fn dispatch_encrypted(&self, event: EncryptedEvent) -> Result<(), DispatcherError> {
        let Some(bot) = self.bot_for_room(&event.room_id) else { return Ok(()) };
        match decrypt_with_retry(&bot.crypto_helper, &event).await {
            Ok(decrypted) => {
                if let Some(inner) = classify_decrypted(&event, &decrypted) {
                    Box::pin(self.dispatch(inner)).await?;
                }
            }
            Err(_) => {
                tracing::warn!(room = event.room_id.as_str(), event_id = %event.event_id, "giving up on encrypted event");
            }
        }
        Ok(())
    }
}

/// Classify a decrypted megolm payload (itself a `{"type", "content", ...}`
/// event) back into a routable `InboundEvent`, so a decrypted message or
/// sticker still reaches admin-command recognition and webhook forwarding.
/// Anything else decrypted is left unrouted: the dispatcher has no typed
/// variant for it.
fn classify_decrypted(event: &EncryptedEvent, decrypted: &serde_json::Value) -> Option<InboundEvent> {
    let type_name = decrypted.get("type")?.as_str()?;
    match type_name {
        "m.room.message" | "m.sticker" => Some(InboundEvent::Message(MessageEvent {
            room_id: event.room_id.clone(),
            sender: event.sender.clone(),
            event_id: event.event_id.clone(),
            body: decrypted
                .get("content")
                .and_then(|content| content.get("body"))
                .and_then(|body| body.as_str())
                .map(str::to_string),
        })),
        _ => None,
    }
}
