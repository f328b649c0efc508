//! Inbound event routing (§4.4): the layer between the chat-network event
//! stream and the per-management-room evaluators.

#![deny(unsafe_code)]

mod admin;
mod crypto;
mod dispatcher;
mod error;
mod forwarder;

pub use admin::{parse_command, Command};
pub use crypto::decrypt_with_retry;
pub use dispatcher::Dispatcher;
pub use error::DispatcherError;
pub use forwarder::{MessageForwarder, ReqwestMessageForwarder};
