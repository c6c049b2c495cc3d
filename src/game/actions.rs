//! The closed set of events the `Match` driver consumes, one at a time,
//! from its inbound `mpsc::Receiver<Action>`, enforcing single-mutator
//! discipline over match state.

use crate::game::types::OutboundSender;

#[derive(Debug)]
pub enum Action {
    FlipCard {
        player_idx: usize,
        index: usize,
    },
    UsePowerUp {
        player_idx: usize,
        power_up_id: String,
        card_index: Option<usize>,
    },
    PlayerDisconnected {
        player_idx: usize,
    },
    RejoinCompleted {
        player_idx: usize,
        outbound: OutboundSender,
    },
    /// Fired by a timer armed when a player disconnected; carries the
    /// player index so a stale timer (already superseded by a rejoin and
    /// then a second disconnect) can't act on the wrong seat.
    ReconnectionTimeout {
        player_idx: usize,
    },
    /// Fired by a timer armed after a mismatched pair is shown; `at_round`
    /// pins the round it was armed in so the driver can detect and ignore
    /// a stale firing.
    ResolveMismatch {
        at_round: u64,
    },
    HideClairvoyanceReveal {
        indices: Vec<usize>,
    },
    TurnTimeout {
        at_round: u64,
    },
    LeaveGame {
        player_idx: usize,
    },
}
