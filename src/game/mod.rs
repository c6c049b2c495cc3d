//! The `Match` state machine (C3): types, actions, errors, snapshot
//! projection, and the single-mutator driver that ties them together.

pub mod actions;
pub mod engine;
pub mod errors;
pub mod events;
pub mod snapshot;
pub mod types;

pub use actions::Action;
pub use engine::{spawn_match, MatchHandle, NewPlayer};
pub use errors::GameError;
pub use events::GameEndReport;
pub use types::{Match, Player, TurnPhase};
