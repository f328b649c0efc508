//! The per-management-room `PolicyEvaluator` (§3, §4.3): watched lists,
//! protected rooms, member index, and enforcement against the shared
//! policy store.

#![deny(unsafe_code)]

mod apply;
mod config;
mod error;
mod evaluator;
mod members;
mod power_levels;
mod protection;
mod rules;
mod state;

pub use apply::{apply_policy, evaluate_all_members, evaluate_user};
pub use config::{handle_config_change, handle_power_levels_event};
pub use error::EvaluatorError;
pub use evaluator::PolicyEvaluator;
pub use members::handle_member;
pub use protection::{handle_power_level_change, handle_protected_rooms_change, try_protecting_room};
pub use rules::{handle_policy_list_change, reevaluate_actions};
