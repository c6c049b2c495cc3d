//! Match-lifecycle events the driver reports to its owner (the
//! matchmaker), distinct from the wire `ServerMessage`s it sends to
//! clients.

use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct GameEndReport {
    pub match_id: Uuid,
    pub user_ids: [String; 2],
    pub scores: [u32; 2],
    /// `None` means a draw.
    pub winner_idx: Option<usize>,
    /// True when the match ended via a reconnection timeout rather than
    /// both players finishing the board (SPEC_FULL §12.1: ratings are not
    /// updated for abandoned matches).
    pub abandoned: bool,
}
