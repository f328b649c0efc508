//! Decrypt-wait-retry-once flow for `m.room.encrypted` events (§C).
//!
//! One `CryptoHelper` per bot, created at startup and held for the bot's
//! lifetime (Open Question (a)); this module never constructs one.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use warden_core::chat::{CryptoError, CryptoHelper};
use warden_core::event::EncryptedEvent;

/// How long to wait for a missing room key to arrive before giving up.
const SESSION_WAIT_TIMEOUT: Duration = Duration::from_secs(3);

fn session_id_of(event: &EncryptedEvent) -> &str {
    event.content.get("session_id").and_then(serde_json::Value::as_str).unwrap_or("")
}

/// Decrypt `event`. On a missing session, requests it and waits up to
/// [`SESSION_WAIT_TIMEOUT`] before retrying decryption exactly once.
pub async fn decrypt_with_retry(
    helper: &Arc<dyn CryptoHelper>,
    event: &EncryptedEvent,
) -> Result<serde_json::Value, CryptoError> {
    match helper.decrypt(&event.room_id, &event.event_id, &event.content).await {
        Ok(decrypted) => Ok(decrypted),
        Err(CryptoError::NoSessionFound) => retry_after_session_wait(helper, event).await,
        Err(err) => {
            warn!(room = event.room_id.as_str(), event_id = %event.event_id, error = %err, "failed to decrypt event");
            Err(err)
        }
    }
}

async fn retry_after_session_wait(
    helper: &Arc<dyn CryptoHelper>,
    event: &EncryptedEvent,
) -> Result<serde_json::Value, CryptoError> {
    let session_id = session_id_of(event);
    debug!(
        room = event.room_id.as_str(),
        event_id = %event.event_id,
        wait_seconds = SESSION_WAIT_TIMEOUT.as_secs(),
        "no session found, waiting for keys to arrive"
    );
    helper.request_session(&event.room_id, session_id, &event.sender).await;

    if helper.wait_for_session(&event.room_id, session_id, SESSION_WAIT_TIMEOUT).await {
        debug!(room = event.room_id.as_str(), "got keys after waiting, retrying decryption");
        helper.decrypt(&event.room_id, &event.event_id, &event.content).await
    } else {
        warn!(room = event.room_id.as_str(), event_id = %event.event_id, "timed out waiting for room key");
        Err(CryptoError::NoSessionFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use warden_core::identity::{RoomId, UserId};

    struct FakeHelper {
        decrypt_calls: AtomicUsize,
        fail_first: bool,
        key_arrives: bool,
    }

    #[async_trait]
    impl CryptoHelper for FakeHelper {
        async fn decrypt(
            &self,
            _room: &RoomId,
            _event_id: &str,
            _content: &serde_json::Value,
        ) -> Result<serde_json::Value, CryptoError> {
            let call = self.decrypt_calls.fetch_add(1, Ordering::SeqCst);
            if call == 0 && self.fail_first {
                Err(CryptoError::NoSessionFound)
            } else {
                Ok(serde_json::json!({"body": "hello"}))
            }
        }

        async fn wait_for_session(&self, _room: &RoomId, _session_id: &str, _timeout: Duration) -> bool {
            self.key_arrives
        }

        async fn request_session(&self, _room: &RoomId, _session_id: &str, _sender: &UserId) {}
    }

    fn event() -> EncryptedEvent {
        EncryptedEvent {
            room_id: RoomId::from("!room:example.org"),
            sender: UserId::from("@attacker:example.org"),
            event_id: "$ev1".to_string(),
            content: serde_json::json!({"session_id": "sess1"}),
        }
    }

    #[tokio::test]
    async fn retries_once_after_key_arrives() {
        let helper: Arc<dyn CryptoHelper> =
            Arc::new(FakeHelper { decrypt_calls: AtomicUsize::new(0), fail_first: true, key_arrives: true });
        let result = decrypt_with_retry(&helper, &event()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn gives_up_when_key_never_arrives() {
        let helper: Arc<dyn CryptoHelper> =
            Arc::new(FakeHelper { decrypt_calls: AtomicUsize::new(0), fail_first: true, key_arrives: false });
        let result = decrypt_with_retry(&helper, &event()).await;
        assert!(matches!(result, Err(CryptoError::NoSessionFound)));
    }

    #[tokio::test]
    async fn no_retry_needed_when_session_already_present() {
        let helper: Arc<dyn CryptoHelper> =
            Arc::new(FakeHelper { decrypt_calls: AtomicUsize::new(0), fail_first: false, key_arrives: true });
        let result = decrypt_with_retry(&helper, &event()).await;
        assert!(result.is_ok());
    }
}
