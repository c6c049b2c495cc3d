//! Builds the viewer-specific `game_state` broadcast from a `Match`.

use crate::board::CardState;
use crate::config::RuleConfig;
use crate::wire::{CardWire, HandEntry, ScoreLine, ServerMessage};

use super::types::Match;

pub fn build_game_state(m: &Match, viewer_idx: usize, config: &RuleConfig) -> ServerMessage {
    let opponent_idx = m.opponent_of(viewer_idx);

    let cards = m
        .board
        .cards
        .iter()
        .map(|c| CardWire {
            index: c.index,
            state: c.state,
            pair_id: match c.state {
                CardState::Revealed | CardState::Matched => Some(c.pair_id),
                CardState::Hidden | CardState::Removed => None,
            },
        })
        .collect();

    let viewer = &m.players[viewer_idx];
    let opponent = &m.players[opponent_idx];

    let usable = viewer.usable_hand();
    let hand = viewer
        .hand
        .iter()
        .map(|(id, &count)| HandEntry {
            power_up_id: id.clone(),
            count,
            usable_count: usable.get(id).copied().unwrap_or(0),
        })
        .collect();

    let your_turn = m.current_turn == viewer_idx && m.disconnected_player_idx.is_none();

    let (turn_ends_at_unix_ms, turn_countdown_show_sec) = if m.current_turn == viewer_idx {
        m.turn_ends_at
            .map(|t| (Some(t.timestamp_millis()), Some(config.turn_countdown_show.as_secs())))
            .unwrap_or((None, None))
    } else {
        (None, None)
    };

    ServerMessage::GameState {
        cards,
        you: ScoreLine {
            name: viewer.name.clone(),
            score: viewer.score,
        },
        opponent: ScoreLine {
            name: opponent.name.clone(),
            score: opponent.score,
        },
        your_turn,
        hand,
        flipped_indices: m.flipped_indices.clone(),
        phase: m.turn_phase,
        known_indices: Some(viewer.known_indices.iter().copied().collect()),
        highlight_indices: Some(viewer.highlight_indices.clone()),
        pair_id_to_power_up: Some(m.pair_id_to_power_up.clone()),
        arcana_pairs: m.board.arcana_pairs,
        turn_ends_at_unix_ms,
        turn_countdown_show_sec,
    }
}
