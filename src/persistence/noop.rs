use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use super::{ArcanaUseRecord, GameResultRecord, MatchArcanaRecord, PersistenceSink, TurnRecord, LOG_TARGET};

/// Default sink when no `DATABASE_URL` is configured. Logs at debug
/// level and discards.
#[derive(Debug, Default)]
pub struct NoopPersistenceSink;

#[async_trait]
impl PersistenceSink for NoopPersistenceSink {
    async fn record_turn(&self, record: TurnRecord) {
        debug!(target: LOG_TARGET, match_id = %record.match_id, round = record.round, "turn discarded (no-op sink)");
    }

    async fn record_arcana_use(&self, record: ArcanaUseRecord) {
        debug!(target: LOG_TARGET, match_id = %record.match_id, power_up = %record.power_up_id, "arcana use discarded (no-op sink)");
    }

    async fn insert_match_arcana(&self, records: Vec<MatchArcanaRecord>) {
        debug!(target: LOG_TARGET, count = records.len(), "match arcana discarded (no-op sink)");
    }

    async fn insert_game_result(&self, record: GameResultRecord) {
        debug!(target: LOG_TARGET, match_id = %record.match_id, "game result discarded (no-op sink)");
    }

    async fn update_ratings_after_game(&self, match_id: Uuid, _user_ids: [String; 2], _new_ratings: [i32; 2]) {
        debug!(target: LOG_TARGET, match_id = %match_id, "rating update discarded (no-op sink)");
    }
}
