//! Admin-command recognition in management rooms (§D.7).
//!
//! No command grammar is specified beyond "first word is the command
//! name, sender must be admin" — recognition is logged, execution is
//! left to whatever consumes the log/audit trail downstream.

use evaluator::PolicyEvaluator;
use std::sync::Arc;
use warden_core::event::MessageEvent;

/// A recognized command: its name and the rest of the message body.
pub struct Command<'a> {
    /// The command word, without its leading `!`.
    pub name: &'a str,
    /// Everything after the command word, trimmed.
    pub rest: &'a str,
}

/// Parse `body` as a command if it starts with `!` and has a non-empty name.
pub fn parse_command(body: &str) -> Option<Command<'_>> {
    let body = body.trim();
    let body = body.strip_prefix('!')?;
    let mut parts = body.splitn(2, char::is_whitespace);
    let name = parts.next()?;
    if name.is_empty() {
        return None;
    }
    let rest = parts.next().unwrap_or("").trim();
    Some(Command { name, rest })
}

/// Handle a message in a management room: admins' recognized commands are
/// logged, everything else (including non-admin senders) is ignored.
pub async fn handle_message(evaluator: &Arc<PolicyEvaluator>, event: &MessageEvent) {
    if !evaluator.is_admin(&event.sender) {
        return;
    }
    let Some(body) = event.body.as_deref() else { return };
    match parse_command(body) {
        Some(cmd) => {
            tracing::info!(
                command = cmd.name,
                sender = event.sender.as_str(),
                room = event.room_id.as_str(),
                "recognized admin command"
            );
        }
        None => {
            tracing::debug!(
                sender = event.sender.as_str(),
                room = event.room_id.as_str(),
                "ignoring non-command message in management room"
            );
        }
    }
}
