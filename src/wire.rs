//! JSON wire types exchanged with clients over the `/ws` WebSocket route.
//!
//! Every frame is a UTF-8 JSON object carrying a `type` discriminator.
//! Field names are camelCase on the wire.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::board::CardState;
use crate::game::TurnPhase;

/// Messages a client may send once connected.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Auth {
        token: String,
    },
    SetName {
        name: String,
    },
    Rejoin {
        #[serde(rename = "gameId")]
        game_id: Uuid,
        #[serde(rename = "rejoinToken")]
        rejoin_token: String,
        name: String,
    },
    RejoinMyGame {},
    FlipCard {
        index: usize,
    },
    UsePowerUp {
        #[serde(rename = "powerUpId")]
        power_up_id: String,
        #[serde(rename = "cardIndex")]
        card_index: Option<usize>,
    },
    PlayAgain {},
    LeaveQueue {},
    LeaveGame {},
}

/// A single card as shown to one particular viewer.
#[derive(Debug, Clone, Serialize)]
pub struct CardWire {
    pub index: usize,
    pub state: CardState,
    #[serde(rename = "pairId", skip_serializing_if = "Option::is_none")]
    pub pair_id: Option<u32>,
}

/// `{name, score}` summary of one side of the match.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreLine {
    pub name: String,
    pub score: u32,
}

/// One slot in the viewer's power-up hand.
#[derive(Debug, Clone, Serialize)]
pub struct HandEntry {
    #[serde(rename = "powerUpId")]
    pub power_up_id: String,
    pub count: u32,
    #[serde(rename = "usableCount")]
    pub usable_count: u32,
}

/// Outcome reported in `game_over`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GameResult {
    Win,
    Lose,
    Draw,
}

/// Server → client messages (§6).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Error {
        message: String,
    },
    WaitingForMatch {},
    #[serde(rename_all = "camelCase")]
    MatchFound {
        game_id: Uuid,
        rejoin_token: String,
        opponent_name: String,
        opponent_user_id: String,
        board_rows: usize,
        board_cols: usize,
        your_turn: bool,
    },
    #[serde(rename_all = "camelCase")]
    GameState {
        cards: Vec<CardWire>,
        you: ScoreLine,
        opponent: ScoreLine,
        your_turn: bool,
        hand: Vec<HandEntry>,
        flipped_indices: Vec<usize>,
        phase: TurnPhase,
        #[serde(skip_serializing_if = "Option::is_none")]
        known_indices: Option<Vec<usize>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        highlight_indices: Option<Vec<usize>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pair_id_to_power_up: Option<HashMap<u32, String>>,
        arcana_pairs: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        turn_ends_at_unix_ms: Option<i64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        turn_countdown_show_sec: Option<u64>,
    },
    GameOver {
        result: GameResult,
        you: ScoreLine,
        opponent: ScoreLine,
    },
    OpponentDisconnected {},
    #[serde(rename_all = "camelCase")]
    OpponentReconnecting {
        reconnection_deadline_unix_ms: i64,
    },
    OpponentReconnected {},
    TurnTimeout {},
    #[serde(rename_all = "camelCase")]
    PowerupUsed {
        player_name: String,
        power_up_label: String,
        no_effect: bool,
    },
    #[serde(rename_all = "camelCase")]
    PowerupEffectResolved {
        player_name: String,
        power_up_label: String,
        message: String,
    },
}
