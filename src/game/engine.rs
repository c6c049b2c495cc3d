//! The single-mutator `Match` driver (C3).
//!
//! One task owns the entire `Match` and consumes `Action`s sequentially
//! off a bounded `mpsc::Receiver` — no other task ever touches match
//! state directly, which makes every concurrency invariant free to
//! reason about (no locks, no torn reads).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::board::{new_board, CardState};
use crate::config::RuleConfig;
use crate::persistence::{ArcanaUseRecord, MatchArcanaRecord, PersistenceSink, TurnRecord};
use crate::powerups::{PlayerState, PowerUpContext, PowerUpRegistry};
use crate::wire::{GameResult, ScoreLine, ServerMessage};

use super::actions::Action;
use super::events::GameEndReport;
use super::snapshot::build_game_state;
use super::types::{Match, OutboundSender, Player, TurnPhase};

pub const LOG_TARGET: &str = "match::engine";

pub struct NewPlayer {
    pub user_id: String,
    pub name: String,
    pub outbound: OutboundSender,
    pub is_ai: bool,
}

pub struct MatchHandle {
    pub id: Uuid,
    pub actions_tx: mpsc::Sender<Action>,
    pub rejoin_tokens: [String; 2],
}

/// Build a fresh `Match`, spawn its driver task, and return a handle the
/// caller (the matchmaker) uses to send it actions.
pub fn spawn_match(
    a: NewPlayer,
    b: NewPlayer,
    config: RuleConfig,
    registry: Arc<PowerUpRegistry>,
    persistence: Arc<dyn PersistenceSink>,
    on_game_end: impl FnOnce(GameEndReport) + Send + 'static,
    rng_seed: Option<u64>,
) -> MatchHandle {
    let mut rng = rng_seed.map(StdRng::seed_from_u64).unwrap_or_else(StdRng::from_entropy);

    let id = Uuid::new_v4();
    let board = new_board(config.board_rows, config.board_cols, config.arcana_pairs, &mut rng);
    let arcana_ids = registry.pick_arcana_for_match(config.arcana_pairs, &mut rng);
    let mut pair_id_to_power_up = HashMap::new();
    for (pair_id, power_up_id) in (0..config.arcana_pairs as u32).zip(arcana_ids) {
        pair_id_to_power_up.insert(pair_id, power_up_id);
    }

    let make_player = |p: NewPlayer, rng: &mut StdRng| {
        let mut token = [0u8; 16];
        rng.fill(&mut token);
        Player {
            user_id: p.user_id,
            name: p.name,
            score: 0,
            hand: HashMap::new(),
            cooldown: HashMap::new(),
            known_indices: Default::default(),
            highlight_indices: Vec::new(),
            leech_active: false,
            blood_pact_active: false,
            blood_pact_matches_count: 0,
            rejoin_token: token,
            outbound: Some(p.outbound),
            is_ai: p.is_ai,
        }
    };
    let player_a = make_player(a, &mut rng);
    let player_b = make_player(b, &mut rng);
    let rejoin_tokens = [hex::encode(player_a.rejoin_token), hex::encode(player_b.rejoin_token)];

    let first_turn = rng.gen_range(0..2usize);

    let state = Match {
        id,
        board,
        players: [player_a, player_b],
        current_turn: first_turn,
        turn_phase: TurnPhase::FirstFlip,
        flipped_indices: Vec::new(),
        pair_id_to_power_up: pair_id_to_power_up.clone(),
        round: 0,
        turn_start_scores: [0, 0],
        disconnected_player_idx: None,
        reconnection_deadline: None,
        turn_ends_at: None,
        finished: false,
    };

    let (tx, rx) = mpsc::channel(128);
    let match_arcana: Vec<MatchArcanaRecord> = pair_id_to_power_up
        .iter()
        .map(|(&pair_id, power_up_id)| MatchArcanaRecord {
            match_id: id,
            pair_id,
            power_up_id: power_up_id.clone(),
        })
        .collect();
    {
        let persistence = persistence.clone();
        tokio::spawn(async move { persistence.insert_match_arcana(match_arcana).await });
    }

    let driver = MatchDriver {
        state,
        rx,
        tx: tx.clone(),
        config,
        registry,
        persistence,
        rng,
        on_game_end: Some(Box::new(on_game_end)),
        mismatch_timer: None,
        turn_timer: None,
        reconnection_timer: None,
        clairvoyance_timer: None,
    };

    crate::tokio_tools::spawn_named_task(format!("match-{id}"), driver.run());

    MatchHandle {
        id,
        actions_tx: tx,
        rejoin_tokens,
    }
}

fn cancel_timer(slot: &mut Option<CancellationToken>) {
    if let Some(token) = slot.take() {
        token.cancel();
    }
}

struct MatchDriver {
    state: Match,
    rx: mpsc::Receiver<Action>,
    tx: mpsc::Sender<Action>,
    config: RuleConfig,
    registry: Arc<PowerUpRegistry>,
    persistence: Arc<dyn PersistenceSink>,
    rng: StdRng,
    on_game_end: Option<Box<dyn FnOnce(GameEndReport) + Send>>,
    mismatch_timer: Option<CancellationToken>,
    turn_timer: Option<CancellationToken>,
    reconnection_timer: Option<CancellationToken>,
    clairvoyance_timer: Option<CancellationToken>,
}

impl MatchDriver {
    async fn run(mut self) {
        info!(target: LOG_TARGET, match_id = %self.state.id, "match started");
        self.arm_turn_timer();
        self.broadcast_game_state();

        while let Some(action) = self.rx.recv().await {
            if self.state.finished {
                break;
            }
            self.handle(action);
        }

        info!(target: LOG_TARGET, match_id = %self.state.id, "match driver exiting");
    }

    fn handle(&mut self, action: Action) {
        match action {
            Action::FlipCard { player_idx, index } => self.handle_flip_card(player_idx, index),
            Action::UsePowerUp {
                player_idx,
                power_up_id,
                card_index,
            } => self.handle_use_power_up(player_idx, &power_up_id, card_index),
            Action::PlayerDisconnected { player_idx } => self.handle_disconnected(player_idx),
            Action::RejoinCompleted { player_idx, outbound } => self.handle_rejoin(player_idx, outbound),
            Action::ReconnectionTimeout { player_idx } => self.handle_reconnection_timeout(player_idx),
            Action::ResolveMismatch { at_round } => self.handle_resolve_mismatch(at_round),
            Action::HideClairvoyanceReveal { indices } => self.handle_hide_clairvoyance(indices),
            Action::TurnTimeout { at_round } => self.handle_turn_timeout(at_round),
            Action::LeaveGame { player_idx } => self.handle_leave_game(player_idx),
        }
    }

    fn handle_flip_card(&mut self, player_idx: usize, index: usize) {
        if self.state.disconnected_player_idx.is_some() {
            return;
        }
        if let Err(err) = self.validate_can_act(player_idx) {
            self.send_error(player_idx, &err);
            return;
        }
        if self.state.turn_phase == TurnPhase::Resolving {
            self.send_error(player_idx, "a match is still resolving");
            return;
        }
        if index >= self.state.board.len() {
            self.send_error(player_idx, "card index out of range");
            return;
        }
        if self.state.board.card(index).state != CardState::Hidden {
            self.send_error(player_idx, "that card is not hidden");
            return;
        }
        if self.state.flipped_indices.contains(&index) {
            self.send_error(player_idx, "that card is already flipped");
            return;
        }

        self.state.board.card_mut(index).state = CardState::Revealed;
        self.state.players[0].known_indices.insert(index);
        self.state.players[1].known_indices.insert(index);
        self.state.flipped_indices.push(index);

        if self.state.flipped_indices.len() == 1 {
            self.state.turn_phase = TurnPhase::SecondFlip;
            self.broadcast_game_state();
            return;
        }

        self.state.turn_phase = TurnPhase::Resolving;
        let i0 = self.state.flipped_indices[0];
        let i1 = self.state.flipped_indices[1];
        let matched = self.state.board.card(i0).pair_id == self.state.board.card(i1).pair_id;
        self.record_turn(player_idx, vec![i0, i1], matched);

        if matched {
            self.resolve_match(player_idx, i0, i1);
        } else {
            self.broadcast_game_state();
            self.arm_mismatch_timer();
        }
    }

    fn resolve_match(&mut self, player_idx: usize, i0: usize, i1: usize) {
        let opponent_idx = self.state.opponent_of(player_idx);
        self.state.board.card_mut(i0).state = CardState::Matched;
        self.state.board.card_mut(i1).state = CardState::Matched;
        self.state.board.card_mut(i0).matched_by = Some(player_idx);
        self.state.board.card_mut(i1).matched_by = Some(player_idx);

        self.state.players[player_idx].score += 1;
        if self.state.players[player_idx].leech_active {
            self.state.players[opponent_idx].score = self.state.players[opponent_idx].score.saturating_sub(1);
        }

        if self.state.players[player_idx].blood_pact_active {
            self.state.players[player_idx].blood_pact_matches_count += 1;
            if self.state.players[player_idx].blood_pact_matches_count >= 3 {
                self.state.players[player_idx].score += 5;
                self.state.players[player_idx].blood_pact_matches_count = 0;
                self.state.players[player_idx].blood_pact_active = false;
            }
        }

        let pair_id = self.state.board.card(i0).pair_id;
        if let Some(power_up_id) = self.state.pair_id_to_power_up.get(&pair_id).cloned() {
            *self.state.players[player_idx].hand.entry(power_up_id.clone()).or_insert(0) += 1;
            *self.state.players[player_idx].cooldown.entry(power_up_id).or_insert(0) += 1;
        }

        self.state.flipped_indices.clear();
        self.state.turn_phase = TurnPhase::FirstFlip;

        if self.state.board.all_matched() {
            self.finish_match(None, false);
            return;
        }

        self.broadcast_game_state();
    }

    fn handle_resolve_mismatch(&mut self, at_round: u64) {
        if at_round != self.state.round || self.state.finished {
            return;
        }
        for &idx in self.state.flipped_indices.clone().iter() {
            self.state.board.card_mut(idx).state = CardState::Hidden;
        }
        self.state.flipped_indices.clear();
        self.end_turn_bookkeeping();
        self.advance_turn();
    }

    /// Bookkeeping shared by both turn-ending paths (mismatch and timeout):
    /// clears the ending player's highlights and Leech, and breaks an
    /// active Blood Pact with its -3 penalty.
    fn end_turn_bookkeeping(&mut self) {
        let ending_idx = self.state.current_turn;
        self.state.players[ending_idx].leech_active = false;
        self.state.players[ending_idx].highlight_indices.clear();
        if self.state.players[ending_idx].blood_pact_active {
            self.state.players[ending_idx].blood_pact_active = false;
            self.state.players[ending_idx].blood_pact_matches_count = 0;
            self.state.players[ending_idx].score = self.state.players[ending_idx].score.saturating_sub(3);
        }
    }

    fn handle_use_power_up(&mut self, player_idx: usize, power_up_id: &str, card_index: Option<usize>) {
        if self.state.disconnected_player_idx.is_some() {
            return;
        }
        if let Err(err) = self.validate_can_act(player_idx) {
            self.send_error(player_idx, &err);
            return;
        }
        if self.state.turn_phase == TurnPhase::Resolving {
            self.send_error(player_idx, "a match is still resolving");
            return;
        }
        let Some(effect) = self.registry.get(power_up_id) else {
            self.send_error(player_idx, "unknown power-up");
            return;
        };
        let usable = self.state.players[player_idx].usable_hand().get(power_up_id).copied().unwrap_or(0);
        if usable == 0 {
            self.send_error(player_idx, "you don't have that power-up");
            return;
        }
        if effect.requires_target() && card_index.is_none() {
            self.send_error(player_idx, "this power-up requires a target card");
            return;
        }

        let pair_map = self.state.pair_id_to_power_up.clone();
        let config = self.config.clone();
        let (active, opponent) = if player_idx == 0 {
            let (a, b) = self.state.players.split_at_mut(1);
            (&mut a[0], &mut b[0])
        } else {
            let (a, b) = self.state.players.split_at_mut(1);
            (&mut b[0], &mut a[0])
        };

        let mut ctx = PowerUpContext {
            board: &mut self.state.board,
            active: PlayerState {
                score: &mut active.score,
                hand: &mut active.hand,
                known_indices: &mut active.known_indices,
                highlight_indices: &mut active.highlight_indices,
                leech_active: &mut active.leech_active,
                blood_pact_active: &mut active.blood_pact_active,
            },
            opponent: PlayerState {
                score: &mut opponent.score,
                hand: &mut opponent.hand,
                known_indices: &mut opponent.known_indices,
                highlight_indices: &mut opponent.highlight_indices,
                leech_active: &mut opponent.leech_active,
                blood_pact_active: &mut opponent.blood_pact_active,
            },
            pair_id_to_power_up: &pair_map,
            target_index: card_index,
            rng: &mut self.rng,
            config: &config,
        };
        let outcome = effect.apply(&mut ctx);
        let reveal_indices = outcome.reveal_indices.clone();

        self.state.players[player_idx]
            .hand
            .entry(power_up_id.to_string())
            .and_modify(|c| *c = c.saturating_sub(1));

        let player_name = self.state.players[player_idx].name.clone();
        let label = effect.label().to_string();
        self.send_to(0, ServerMessage::PowerupUsed {
            player_name: player_name.clone(),
            power_up_label: label.clone(),
            no_effect: outcome.no_effect,
        });
        self.send_to(1, ServerMessage::PowerupUsed {
            player_name: player_name.clone(),
            power_up_label: label.clone(),
            no_effect: outcome.no_effect,
        });
        if !outcome.no_effect {
            if let Some(message) = outcome.message.clone() {
                self.send_to(0, ServerMessage::PowerupEffectResolved {
                    player_name: player_name.clone(),
                    power_up_label: label.clone(),
                    message: message.clone(),
                });
                self.send_to(1, ServerMessage::PowerupEffectResolved {
                    player_name: player_name.clone(),
                    power_up_label: label.clone(),
                    message,
                });
            }
        }

        self.record_arcana_use(player_idx, power_up_id, card_index, outcome.no_effect);

        if !reveal_indices.is_empty() {
            self.arm_clairvoyance_timer(reveal_indices);
        }
        self.broadcast_game_state();
    }

    fn handle_hide_clairvoyance(&mut self, indices: Vec<usize>) {
        for idx in indices {
            if self.state.board.card(idx).state == CardState::Revealed
                && !self.state.flipped_indices.contains(&idx)
            {
                self.state.board.card_mut(idx).state = CardState::Hidden;
            }
        }
        if !self.state.finished {
            self.broadcast_game_state();
        }
    }

    fn handle_turn_timeout(&mut self, at_round: u64) {
        if at_round != self.state.round || self.state.finished {
            return;
        }
        self.send_to(self.state.current_turn, ServerMessage::TurnTimeout {});
        self.send_to(self.state.opponent_of(self.state.current_turn), ServerMessage::TurnTimeout {});
        for &idx in self.state.flipped_indices.clone().iter() {
            self.state.board.card_mut(idx).state = CardState::Hidden;
        }
        self.state.flipped_indices.clear();
        self.end_turn_bookkeeping();
        self.advance_turn();
    }

    fn advance_turn(&mut self) {
        self.state.current_turn = self.state.opponent_of(self.state.current_turn);
        self.state.players[self.state.current_turn].cooldown.clear();
        self.state.turn_phase = TurnPhase::FirstFlip;
        self.state.round += 1;
        self.state.turn_start_scores = [self.state.players[0].score, self.state.players[1].score];
        self.arm_turn_timer();
        self.broadcast_game_state();
    }

    fn handle_disconnected(&mut self, player_idx: usize) {
        if self.state.finished || self.state.disconnected_player_idx.is_some() {
            return;
        }
        self.state.disconnected_player_idx = Some(player_idx);
        let deadline = Utc::now() + chrono::Duration::from_std(self.config.reconnect_timeout).unwrap();
        self.state.reconnection_deadline = Some(deadline);
        cancel_timer(&mut self.turn_timer);
        self.arm_reconnection_timer(player_idx);
        self.send_to(
            self.state.opponent_of(player_idx),
            ServerMessage::OpponentDisconnected {},
        );
        self.broadcast_game_state();
    }

    fn handle_rejoin(&mut self, player_idx: usize, outbound: OutboundSender) {
        if self.state.finished || self.state.disconnected_player_idx != Some(player_idx) {
            return;
        }
        self.state.disconnected_player_idx = None;
        self.state.reconnection_deadline = None;
        self.state.players[player_idx].outbound = Some(outbound);
        cancel_timer(&mut self.reconnection_timer);
        self.state.round += 1;
        self.arm_turn_timer();
        self.send_to(
            self.state.opponent_of(player_idx),
            ServerMessage::OpponentReconnected {},
        );
        self.broadcast_game_state();
    }

    fn handle_reconnection_timeout(&mut self, player_idx: usize) {
        if self.state.disconnected_player_idx != Some(player_idx) || self.state.finished {
            return;
        }
        let winner = self.state.opponent_of(player_idx);
        self.finish_match(Some(winner), true);
    }

    fn handle_leave_game(&mut self, player_idx: usize) {
        if self.state.finished {
            return;
        }
        let winner = self.state.opponent_of(player_idx);
        self.finish_match(Some(winner), true);
    }

    fn finish_match(&mut self, winner_idx: Option<usize>, abandoned: bool) {
        self.state.finished = true;
        self.cancel_all_timers();

        for idx in 0..2 {
            let opponent = self.state.opponent_of(idx);
            let result = match winner_idx {
                Some(w) if w == idx => GameResult::Win,
                Some(_) => GameResult::Lose,
                None => GameResult::Draw,
            };
            self.send_to(idx, ServerMessage::GameOver {
                result,
                you: ScoreLine {
                    name: self.state.players[idx].name.clone(),
                    score: self.state.players[idx].score,
                },
                opponent: ScoreLine {
                    name: self.state.players[opponent].name.clone(),
                    score: self.state.players[opponent].score,
                },
            });
        }

        info!(target: LOG_TARGET, match_id = %self.state.id, ?winner_idx, abandoned, "match finished");

        if let Some(cb) = self.on_game_end.take() {
            cb(GameEndReport {
                match_id: self.state.id,
                user_ids: [self.state.players[0].user_id.clone(), self.state.players[1].user_id.clone()],
                scores: [self.state.players[0].score, self.state.players[1].score],
                winner_idx,
                abandoned,
            });
        }
    }

    fn validate_can_act(&self, player_idx: usize) -> Result<(), String> {
        if self.state.finished {
            return Err("match has already ended".into());
        }
        if self.state.disconnected_player_idx.is_some() {
            return Err("match paused while opponent reconnects".into());
        }
        if self.state.current_turn != player_idx {
            return Err("it is not your turn".into());
        }
        Ok(())
    }

    fn send_error(&self, player_idx: usize, message: &str) {
        self.try_send(player_idx, ServerMessage::Error { message: message.to_string() });
    }

    fn send_to(&self, idx: usize, msg: ServerMessage) {
        self.try_send(idx, msg);
    }

    fn try_send(&self, idx: usize, msg: ServerMessage) {
        if let Some(tx) = &self.state.players[idx].outbound {
            if let Err(err) = tx.try_send(msg) {
                warn!(target: LOG_TARGET, match_id = %self.state.id, player = idx, ?err, "dropped outbound message");
            }
        }
    }

    fn broadcast_game_state(&self) {
        for idx in 0..2 {
            let msg = build_game_state(&self.state, idx, &self.config);
            self.try_send(idx, msg);
        }
    }

    fn arm_timer(&self, duration: Duration, action: Action) -> CancellationToken {
        let token = CancellationToken::new();
        let child = token.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = child.cancelled() => {}
                _ = tokio::time::sleep(duration) => {
                    let _ = tx.send(action).await;
                }
            }
        });
        token
    }

    fn arm_mismatch_timer(&mut self) {
        cancel_timer(&mut self.mismatch_timer);
        let at_round = self.state.round;
        self.mismatch_timer = Some(self.arm_timer(self.config.reveal_duration, Action::ResolveMismatch { at_round }));
    }

    fn arm_turn_timer(&mut self) {
        cancel_timer(&mut self.turn_timer);
        if self.config.turn_limit.is_zero() {
            self.turn_timer = None;
            self.state.turn_ends_at = None;
            return;
        }
        let at_round = self.state.round;
        self.state.turn_ends_at = Some(Utc::now() + chrono::Duration::from_std(self.config.turn_limit).unwrap());
        self.turn_timer = Some(self.arm_timer(self.config.turn_limit, Action::TurnTimeout { at_round }));
    }

    fn arm_reconnection_timer(&mut self, player_idx: usize) {
        cancel_timer(&mut self.reconnection_timer);
        self.reconnection_timer =
            Some(self.arm_timer(self.config.reconnect_timeout, Action::ReconnectionTimeout { player_idx }));
    }

    fn arm_clairvoyance_timer(&mut self, indices: Vec<usize>) {
        cancel_timer(&mut self.clairvoyance_timer);
        self.clairvoyance_timer =
            Some(self.arm_timer(self.config.clairvoyance_reveal, Action::HideClairvoyanceReveal { indices }));
    }

    fn cancel_all_timers(&mut self) {
        cancel_timer(&mut self.mismatch_timer);
        cancel_timer(&mut self.turn_timer);
        cancel_timer(&mut self.reconnection_timer);
        cancel_timer(&mut self.clairvoyance_timer);
    }

    fn record_turn(&self, player_idx: usize, flipped_indices: Vec<usize>, matched: bool) {
        let record = TurnRecord {
            match_id: self.state.id,
            round: self.state.round,
            player_user_id: self.state.players[player_idx].user_id.clone(),
            flipped_indices,
            matched,
            turn_start_scores: self.state.turn_start_scores,
            scores: [self.state.players[0].score, self.state.players[1].score],
            at: Utc::now(),
        };
        let persistence = self.persistence.clone();
        tokio::spawn(async move { persistence.record_turn(record).await });
    }

    fn record_arcana_use(&self, player_idx: usize, power_up_id: &str, target_index: Option<usize>, no_effect: bool) {
        let record = ArcanaUseRecord {
            match_id: self.state.id,
            player_user_id: self.state.players[player_idx].user_id.clone(),
            power_up_id: power_up_id.to_string(),
            target_index,
            no_effect,
            at: Utc::now(),
        };
        let persistence = self.persistence.clone();
        tokio::spawn(async move { persistence.record_arcana_use(record).await });
    }
}
