//! Core state types for the `Match` state machine (C3).

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::board::Board;
use crate::wire::ServerMessage;

pub type OutboundSender = tokio::sync::mpsc::Sender<ServerMessage>;

/// Phase of the active player's current turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    /// Waiting on the first `flip_card` of the turn.
    FirstFlip,
    /// One card flipped, waiting on the second.
    SecondFlip,
    /// Both cards flipped, resolving match/mismatch (a short window where
    /// the mismatch-hide timer or match-continuation is pending).
    Resolving,
}

/// Per-seat state the driver owns directly (not wire-visible as-is; see
/// `game::snapshot` for the viewer-specific projection).
pub struct Player {
    pub user_id: String,
    pub name: String,
    pub score: u32,
    pub hand: HashMap<String, u32>,
    /// Copies granted mid-turn that can't be used until the following turn.
    pub cooldown: HashMap<String, u32>,
    pub known_indices: HashSet<usize>,
    pub highlight_indices: Vec<usize>,
    pub leech_active: bool,
    pub blood_pact_active: bool,
    /// Consecutive matches completed while `blood_pact_active`, reset on
    /// the +5 payout or on any mismatch/timeout that breaks the pact.
    pub blood_pact_matches_count: u32,
    pub rejoin_token: [u8; 16],
    pub outbound: Option<OutboundSender>,
    pub is_ai: bool,
}

impl Player {
    pub fn usable_hand(&self) -> HashMap<String, u32> {
        self.hand
            .iter()
            .map(|(id, &count)| {
                let cooling = self.cooldown.get(id).copied().unwrap_or(0);
                (id.clone(), count.saturating_sub(cooling))
            })
            .collect()
    }
}

/// Full authoritative state for one match. Owned exclusively by the
/// driver task in `game::engine::MatchDriver::run`; nothing outside that
/// task ever mutates it directly.
pub struct Match {
    pub id: Uuid,
    pub board: Board,
    pub players: [Player; 2],
    pub current_turn: usize,
    pub turn_phase: TurnPhase,
    pub flipped_indices: Vec<usize>,
    pub pair_id_to_power_up: HashMap<u32, String>,
    pub round: u64,
    /// Each player's score as of the start of the current turn, consulted
    /// by turn-end telemetry.
    pub turn_start_scores: [u32; 2],
    pub disconnected_player_idx: Option<usize>,
    pub reconnection_deadline: Option<DateTime<Utc>>,
    pub turn_ends_at: Option<DateTime<Utc>>,
    pub finished: bool,
}

impl Match {
    pub fn opponent_of(&self, idx: usize) -> usize {
        1 - idx
    }
}
