//! `glintcore`: the glintmud world engine.
//!
//! Everything that happens inside the world — sessions, login, command
//! dispatch, NPC reactions, the tick loop — lives here and runs
//! synchronously on one thread. The engine is deterministic given a seed
//! and a sequence of inputs; all network concurrency stays in the server
//! binary, which feeds session input queues and drains output buffers
//! between ticks.

pub mod area;
pub mod building;
pub mod commands;
pub mod events;
pub mod mode;
pub mod npc;
pub mod perms;
pub mod personalize;
pub mod rng;
pub mod session;
pub mod store;
pub mod world;

pub use perms::Permissions;
pub use session::{Session, SessionId};
pub use world::{Actor, World};

/// Failure of a single command, resolved by the dispatcher into a message
/// for the acting session. Nothing here ever escapes a command into the
/// tick loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Malformed or ambiguous command text; carries a usage hint.
    Usage(String),
    /// A referenced room/item/area/player/script is absent.
    NotFound(String),
    /// The actor lacks the required permission bits.
    Permission,
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandError::Usage(hint) => write!(f, "{hint}"),
            CommandError::NotFound(msg) => write!(f, "{msg}"),
            CommandError::Permission => {
                write!(f, "You don't have the authority to do that!")
            }
        }
    }
}

impl std::error::Error for CommandError {}

pub type CmdResult = Result<(), CommandError>;
