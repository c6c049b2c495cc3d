//! Persistence sink: an external collaborator the match driver reports
//! turns, power-up uses, and final results to. Failures are logged and
//! never propagate into gameplay.
//!
//! An async-trait-behind-an-Arc pattern: core logic depends only on the
//! trait, concrete backends are swapped at bootstrap time.

pub mod entity;
pub mod noop;
pub mod sea_orm_sink;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub use noop::NoopPersistenceSink;
pub use sea_orm_sink::SeaOrmPersistenceSink;

pub const LOG_TARGET: &str = "persistence";

#[derive(Debug, Clone)]
pub struct TurnRecord {
    pub match_id: Uuid,
    pub round: u64,
    pub player_user_id: String,
    pub flipped_indices: Vec<usize>,
    pub matched: bool,
    /// Each player's score as of the start of this turn, per §4.3's
    /// turn-telemetry contract.
    pub turn_start_scores: [u32; 2],
    pub scores: [u32; 2],
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ArcanaUseRecord {
    pub match_id: Uuid,
    pub player_user_id: String,
    pub power_up_id: String,
    pub target_index: Option<usize>,
    pub no_effect: bool,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct MatchArcanaRecord {
    pub match_id: Uuid,
    pub pair_id: u32,
    pub power_up_id: String,
}

#[derive(Debug, Clone)]
pub struct GameResultRecord {
    pub match_id: Uuid,
    pub user_ids: [String; 2],
    pub scores: [u32; 2],
    pub winner_idx: Option<usize>,
    pub abandoned: bool,
    pub elos_before_after: Option<[(i32, i32); 2]>,
    pub finished_at: DateTime<Utc>,
}

#[async_trait]
pub trait PersistenceSink: Send + Sync {
    async fn record_turn(&self, record: TurnRecord);
    async fn record_arcana_use(&self, record: ArcanaUseRecord);
    async fn insert_match_arcana(&self, records: Vec<MatchArcanaRecord>);
    /// Called once per finished match, after which `update_ratings_after_game`
    /// may be invoked if ratings were updated. The result row must exist
    /// before rating deltas reference it.
    async fn insert_game_result(&self, record: GameResultRecord);
    async fn update_ratings_after_game(&self, match_id: Uuid, user_ids: [String; 2], new_ratings: [i32; 2]);
}
