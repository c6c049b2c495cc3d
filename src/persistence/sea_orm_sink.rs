use async_trait::async_trait;
use parking_lot::Mutex;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use tracing::error;
use uuid::Uuid;

use super::entity::{arcana_uses, game_results, match_arcana, turns};
use super::{ArcanaUseRecord, GameResultRecord, MatchArcanaRecord, PersistenceSink, TurnRecord, LOG_TARGET};

/// Postgres-backed sink. Turn and arcana-use rows reference `game_results`
/// by `match_id`, so they're buffered in memory and flushed only once
/// `insert_game_result` has run for that match, honoring foreign-key order.
pub struct SeaOrmPersistenceSink {
    conn: DatabaseConnection,
    pending_turns: Mutex<Vec<TurnRecord>>,
    pending_arcana_uses: Mutex<Vec<ArcanaUseRecord>>,
}

impl SeaOrmPersistenceSink {
    pub fn new(conn: DatabaseConnection) -> Self {
        Self {
            conn,
            pending_turns: Mutex::new(Vec::new()),
            pending_arcana_uses: Mutex::new(Vec::new()),
        }
    }

    async fn flush_turns(&self, match_id: Uuid) {
        let batch: Vec<TurnRecord> = {
            let mut pending = self.pending_turns.lock();
            let (matching, rest): (Vec<_>, Vec<_>) =
                pending.drain(..).partition(|t| t.match_id == match_id);
            *pending = rest;
            matching
        };
        for (i, record) in batch.into_iter().enumerate() {
            let model = turns::ActiveModel {
                id: Set(unique_id(match_id, i as i64)),
                match_id: Set(record.match_id),
                round: Set(record.round as i64),
                player_user_id: Set(record.player_user_id),
                flipped_indices: Set(serde_json::json!(record.flipped_indices)),
                matched: Set(record.matched),
                turn_start_score_a: Set(record.turn_start_scores[0] as i32),
                turn_start_score_b: Set(record.turn_start_scores[1] as i32),
                score_a: Set(record.scores[0] as i32),
                score_b: Set(record.scores[1] as i32),
                at: Set(record.at),
            };
            if let Err(err) = model.insert(&self.conn).await {
                error!(target: LOG_TARGET, %err, "failed to insert turn record");
            }
        }
    }

    async fn flush_arcana_uses(&self, match_id: Uuid) {
        let batch: Vec<ArcanaUseRecord> = {
            let mut pending = self.pending_arcana_uses.lock();
            let (matching, rest): (Vec<_>, Vec<_>) =
                pending.drain(..).partition(|a| a.match_id == match_id);
            *pending = rest;
            matching
        };
        for (i, record) in batch.into_iter().enumerate() {
            let model = arcana_uses::ActiveModel {
                id: Set(unique_id(match_id, i as i64)),
                match_id: Set(record.match_id),
                player_user_id: Set(record.player_user_id),
                power_up_id: Set(record.power_up_id),
                target_index: Set(record.target_index.map(|i| i as i32)),
                no_effect: Set(record.no_effect),
                at: Set(record.at),
            };
            if let Err(err) = model.insert(&self.conn).await {
                error!(target: LOG_TARGET, %err, "failed to insert arcana use record");
            }
        }
    }
}

/// Derives a reasonably unique `i64` row id from the match id and a
/// per-batch sequence number; these tables have no natural external key.
fn unique_id(match_id: Uuid, seq: i64) -> i64 {
    let (hi, _) = match_id.as_u64_pair();
    (hi as i64).wrapping_mul(1_000_003).wrapping_add(seq)
}

#[async_trait]
impl PersistenceSink for SeaOrmPersistenceSink {
    async fn record_turn(&self, record: TurnRecord) {
        self.pending_turns.lock().push(record);
    }

    async fn record_arcana_use(&self, record: ArcanaUseRecord) {
        self.pending_arcana_uses.lock().push(record);
    }

    async fn insert_match_arcana(&self, records: Vec<MatchArcanaRecord>) {
        for record in records {
            let model = match_arcana::ActiveModel {
                match_id: Set(record.match_id),
                pair_id: Set(record.pair_id as i32),
                power_up_id: Set(record.power_up_id),
            };
            if let Err(err) = model.insert(&self.conn).await {
                error!(target: LOG_TARGET, %err, "failed to insert match arcana record");
            }
        }
    }

    async fn insert_game_result(&self, record: GameResultRecord) {
        let match_id = record.match_id;
        let (rating_a, rating_b) = record
            .elos_before_after
            .map(|[a, b]| (Some(a), Some(b)))
            .unwrap_or((None, None));

        let model = game_results::ActiveModel {
            match_id: Set(match_id),
            user_id_a: Set(record.user_ids[0].clone()),
            user_id_b: Set(record.user_ids[1].clone()),
            score_a: Set(record.scores[0] as i32),
            score_b: Set(record.scores[1] as i32),
            winner_idx: Set(record.winner_idx.map(|w| w as i16)),
            abandoned: Set(record.abandoned),
            rating_a_before: Set(rating_a.map(|(b, _)| b)),
            rating_a_after: Set(rating_a.map(|(_, a)| a)),
            rating_b_before: Set(rating_b.map(|(b, _)| b)),
            rating_b_after: Set(rating_b.map(|(_, a)| a)),
            finished_at: Set(record.finished_at),
        };
        if let Err(err) = model.insert(&self.conn).await {
            error!(target: LOG_TARGET, %err, "failed to insert game result");
            return;
        }

        self.flush_turns(match_id).await;
        self.flush_arcana_uses(match_id).await;
    }

    async fn update_ratings_after_game(&self, match_id: Uuid, _user_ids: [String; 2], new_ratings: [i32; 2]) {
        use sea_orm::EntityTrait;
        let Ok(Some(existing)) = game_results::Entity::find_by_id(match_id).one(&self.conn).await else {
            error!(target: LOG_TARGET, %match_id, "rating update skipped: game result not found");
            return;
        };
        let mut model: game_results::ActiveModel = existing.into();
        model.rating_a_after = Set(Some(new_ratings[0]));
        model.rating_b_after = Set(Some(new_ratings[1]));
        if let Err(err) = model.update(&self.conn).await {
            error!(target: LOG_TARGET, %err, "failed to update ratings");
        }
    }
}
