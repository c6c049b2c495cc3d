//! Matchmaking and rejoin-by-token/by-user indexes (C5).
//!
//! A FIFO waiting queue guarded by a single `Mutex`, reconciled by one
//! background task on a short tick — the same "one task owns the
//! mutation, everyone else posts into it" discipline as the match
//! driver, scaled down to a simple poll loop since queue membership
//! changes are cheap to re-scan. `active_games`/`user_to_game` are
//! `DashMap`s since those are read far more often (every rejoin attempt)
//! than they're written.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

use crate::ai;
use crate::config::RuleConfig;
use crate::elo::{self, Outcome};
use crate::game::{self, Action, GameEndReport, MatchHandle, NewPlayer};
use crate::persistence::{GameResultRecord, PersistenceSink};
use crate::powerups::PowerUpRegistry;
use crate::wire::ServerMessage;

pub const LOG_TARGET: &str = "matchmaker";

const DEFAULT_RATING: i32 = 1000;

type OutboundSender = mpsc::Sender<ServerMessage>;

struct WaitingPlayer {
    user_id: String,
    name: String,
    outbound: OutboundSender,
    queued_at: Instant,
}

struct ActiveGame {
    handle: MatchHandle,
    user_ids: [String; 2],
    names: [String; 2],
}

pub struct Matchmaker {
    registry: Arc<PowerUpRegistry>,
    persistence: Arc<dyn PersistenceSink>,
    config: RuleConfig,
    waiting: Mutex<VecDeque<WaitingPlayer>>,
    active_games: DashMap<Uuid, ActiveGame>,
    user_to_game: DashMap<String, Uuid>,
    ratings: DashMap<String, i32>,
}

impl Matchmaker {
    pub fn new(config: RuleConfig, registry: Arc<PowerUpRegistry>, persistence: Arc<dyn PersistenceSink>) -> Arc<Self> {
        let mm = Arc::new(Self {
            registry,
            persistence,
            config,
            waiting: Mutex::new(VecDeque::new()),
            active_games: DashMap::new(),
            user_to_game: DashMap::new(),
            ratings: DashMap::new(),
        });
        let mm_clone = mm.clone();
        crate::tokio_tools::spawn_named_task("matchmaker-pairing-loop", async move {
            mm_clone.run_pairing_loop().await;
        });
        mm
    }

    pub fn enqueue(&self, user_id: String, name: String, outbound: OutboundSender) {
        if self.user_to_game.contains_key(&user_id) {
            let _ = outbound.try_send(ServerMessage::Error {
                message: "you already have an active match".into(),
            });
            return;
        }
        let _ = outbound.try_send(ServerMessage::WaitingForMatch {});
        self.waiting.lock().push_back(WaitingPlayer {
            user_id,
            name,
            outbound,
            queued_at: Instant::now(),
        });
    }

    pub fn leave_queue(&self, user_id: &str) {
        let mut waiting = self.waiting.lock();
        waiting.retain(|p| p.user_id != user_id);
    }

    pub fn rejoin_by_token(&self, match_id: Uuid, token_hex: &str, outbound: OutboundSender) {
        let Some(active) = self.active_games.get(&match_id) else {
            let _ = outbound.try_send(ServerMessage::Error { message: "no such match".into() });
            return;
        };
        let Ok(token_bytes) = hex::decode(token_hex) else {
            let _ = outbound.try_send(ServerMessage::Error { message: "malformed rejoin token".into() });
            return;
        };
        let player_idx = active
            .handle
            .rejoin_tokens
            .iter()
            .position(|t| hex::decode(t).map(|b| b == token_bytes).unwrap_or(false));
        let Some(player_idx) = player_idx else {
            let _ = outbound.try_send(ServerMessage::Error { message: "invalid rejoin token".into() });
            return;
        };
        self.complete_rejoin(&active, player_idx, outbound);
    }

    pub fn rejoin_by_user(&self, user_id: &str, outbound: OutboundSender) -> bool {
        let Some(match_id) = self.user_to_game.get(user_id).map(|e| *e) else {
            return false;
        };
        let Some(active) = self.active_games.get(&match_id) else {
            return false;
        };
        let Some(player_idx) = active.user_ids.iter().position(|u| u == user_id) else {
            return false;
        };
        self.complete_rejoin(&active, player_idx, outbound);
        true
    }

    fn complete_rejoin(&self, active: &ActiveGame, player_idx: usize, outbound: OutboundSender) {
        let opponent_idx = 1 - player_idx;
        let _ = outbound.try_send(ServerMessage::MatchFound {
            game_id: active.handle.id,
            rejoin_token: active.handle.rejoin_tokens[player_idx].clone(),
            opponent_name: active.names[opponent_idx].clone(),
            opponent_user_id: active.user_ids[opponent_idx].clone(),
            board_rows: self.config.board_rows,
            board_cols: self.config.board_cols,
            your_turn: false,
        });
        let tx = active.handle.actions_tx.clone();
        let _ = tx.try_send(Action::RejoinCompleted { player_idx, outbound });
    }

    pub fn notify_disconnected(&self, user_id: &str) {
        let Some(match_id) = self.user_to_game.get(user_id).map(|e| *e) else {
            return;
        };
        if let Some(active) = self.active_games.get(&match_id) {
            if let Some(player_idx) = active.user_ids.iter().position(|u| u == user_id) {
                let _ = active.handle.actions_tx.try_send(Action::PlayerDisconnected { player_idx });
            }
        }
    }

    pub fn leave_game(&self, user_id: &str) {
        let Some(match_id) = self.user_to_game.get(user_id).map(|e| *e) else {
            return;
        };
        if let Some(active) = self.active_games.get(&match_id) {
            if let Some(player_idx) = active.user_ids.iter().position(|u| u == user_id) {
                let _ = active.handle.actions_tx.try_send(Action::LeaveGame { player_idx });
            }
        }
    }

    pub fn send_flip_card(&self, user_id: &str, index: usize) {
        let Some(match_id) = self.user_to_game.get(user_id).map(|e| *e) else {
            return;
        };
        if let Some(active) = self.active_games.get(&match_id) {
            if let Some(player_idx) = active.user_ids.iter().position(|u| u == user_id) {
                let _ = active.handle.actions_tx.try_send(Action::FlipCard { player_idx, index });
            }
        }
    }

    pub fn send_use_power_up(&self, user_id: &str, power_up_id: String, card_index: Option<usize>) {
        let Some(match_id) = self.user_to_game.get(user_id).map(|e| *e) else {
            return;
        };
        if let Some(active) = self.active_games.get(&match_id) {
            if let Some(player_idx) = active.user_ids.iter().position(|u| u == user_id) {
                let _ = active.handle.actions_tx.try_send(Action::UsePowerUp {
                    player_idx,
                    power_up_id,
                    card_index,
                });
            }
        }
    }

    async fn run_pairing_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(Duration::from_millis(250));
        loop {
            ticker.tick().await;
            self.reconcile_queue();
        }
    }

    fn reconcile_queue(self: &Arc<Self>) {
        loop {
            let pair = {
                let mut waiting = self.waiting.lock();
                if waiting.len() >= 2 {
                    let a = waiting.pop_front().unwrap();
                    let b = waiting.pop_front().unwrap();
                    Some((a, b))
                } else {
                    None
                }
            };
            match pair {
                Some((a, b)) => self.create_human_match(a, b),
                None => break,
            }
        }

        let timed_out = {
            let mut waiting = self.waiting.lock();
            match waiting.front() {
                Some(front) if front.queued_at.elapsed() >= self.config.ai_pair_timeout => waiting.pop_front(),
                _ => None,
            }
        };
        if let Some(player) = timed_out {
            self.create_ai_match(player);
        }
    }

    fn create_human_match(self: &Arc<Self>, a: WaitingPlayer, b: WaitingPlayer) {
        self.spawn_match(
            NewPlayer { user_id: a.user_id.clone(), name: a.name, outbound: a.outbound.clone(), is_ai: false },
            NewPlayer { user_id: b.user_id.clone(), name: b.name, outbound: b.outbound.clone(), is_ai: false },
            None,
        );
    }

    fn create_ai_match(self: &Arc<Self>, human: WaitingPlayer) {
        let mut rng = StdRng::from_entropy();
        let (profile, ai_name) = crate::ai::profiles::pick_profile_and_name(&mut rng);
        let (ai_tx, ai_rx) = mpsc::channel(128);
        let ai_user_id = format!("ai:{}", ai_name.to_lowercase());

        let match_handle = self.spawn_match(
            NewPlayer { user_id: human.user_id.clone(), name: human.name, outbound: human.outbound.clone(), is_ai: false },
            NewPlayer { user_id: ai_user_id, name: ai_name, outbound: ai_tx, is_ai: true },
            None,
        );
        if let Some(handle) = match_handle {
            ai::spawn(
                1,
                profile,
                self.config.board_rows,
                self.config.board_cols,
                handle.actions_tx.clone(),
                ai_rx,
                None,
            );
        }
    }

    fn spawn_match(self: &Arc<Self>, a: NewPlayer, b: NewPlayer, seed: Option<u64>) -> Option<MatchHandle> {
        let user_ids = [a.user_id.clone(), b.user_id.clone()];
        let names = [a.name.clone(), b.name.clone()];
        let a_outbound = a.outbound.clone();
        let b_outbound = b.outbound.clone();

        let registry = self.registry.clone();
        let persistence = self.persistence.clone();
        let config = self.config.clone();

        let (report_tx, mut report_rx) = mpsc::unbounded_channel::<GameEndReport>();
        let handle = game::spawn_match(a, b, config, registry, persistence, move |report| {
            let _ = report_tx.send(report);
        }, seed);

        self.active_games.insert(
            handle.id,
            ActiveGame {
                handle: clone_handle(&handle),
                user_ids: user_ids.clone(),
                names: names.clone(),
            },
        );
        self.user_to_game.insert(user_ids[0].clone(), handle.id);
        self.user_to_game.insert(user_ids[1].clone(), handle.id);

        let board_rows = self.config.board_rows;
        let board_cols = self.config.board_cols;
        let match_id = handle.id;
        let rejoin_tokens = handle.rejoin_tokens.clone();
        let _ = a_outbound.try_send(ServerMessage::MatchFound {
            game_id: match_id,
            rejoin_token: rejoin_tokens[0].clone(),
            opponent_name: names[1].clone(),
            opponent_user_id: user_ids[1].clone(),
            board_rows,
            board_cols,
            your_turn: false,
        });
        let _ = b_outbound.try_send(ServerMessage::MatchFound {
            game_id: match_id,
            rejoin_token: rejoin_tokens[1].clone(),
            opponent_name: names[0].clone(),
            opponent_user_id: user_ids[0].clone(),
            board_rows,
            board_cols,
            your_turn: false,
        });

        let mm = self.clone();
        crate::tokio_tools::spawn_named_task(format!("matchmaker-end-watch-{match_id}"), async move {
            if let Some(report) = report_rx.recv().await {
                mm.handle_game_end(report).await;
            }
        });

        Some(handle)
    }

    async fn handle_game_end(&self, report: GameEndReport) {
        self.active_games.remove(&report.match_id);
        for user_id in &report.user_ids {
            self.user_to_game.remove(user_id);
        }

        let mut elos_before_after = None;
        if !report.abandoned {
            let rating_a = *self.ratings.entry(report.user_ids[0].clone()).or_insert(DEFAULT_RATING);
            let rating_b = *self.ratings.entry(report.user_ids[1].clone()).or_insert(DEFAULT_RATING);
            let (outcome_a, outcome_b) = match report.winner_idx {
                Some(0) => (Outcome::Win, Outcome::Loss),
                Some(1) => (Outcome::Loss, Outcome::Win),
                _ => (Outcome::Draw, Outcome::Draw),
            };
            let new_a = elo::update_rating(rating_a, rating_b, outcome_a);
            let new_b = elo::update_rating(rating_b, rating_a, outcome_b);
            self.ratings.insert(report.user_ids[0].clone(), new_a);
            self.ratings.insert(report.user_ids[1].clone(), new_b);
            elos_before_after = Some([(rating_a, new_a), (rating_b, new_b)]);
        }

        self.persistence
            .insert_game_result(GameResultRecord {
                match_id: report.match_id,
                user_ids: report.user_ids.clone(),
                scores: report.scores,
                winner_idx: report.winner_idx,
                abandoned: report.abandoned,
                elos_before_after,
                finished_at: Utc::now(),
            })
            .await;

        if let Some([(_, new_a), (_, new_b)]) = elos_before_after {
            self.persistence
                .update_ratings_after_game(report.match_id, report.user_ids.clone(), [new_a, new_b])
                .await;
        }

        info!(target: LOG_TARGET, match_id = %report.match_id, abandoned = report.abandoned, "match cleaned up");
    }
}

fn clone_handle(handle: &MatchHandle) -> MatchHandle {
    MatchHandle {
        id: handle.id,
        actions_tx: handle.actions_tx.clone(),
        rejoin_tokens: handle.rejoin_tokens.clone(),
    }
}
