//! The match board: a flat grid of paired cards (C1).
//!
//! A small, pure, deterministically testable state struct with RNG
//! injected by the caller rather than pulled from thread-local entropy,
//! so tests can seed shuffles.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;

/// Visible lifecycle of a single card, independent of its index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CardState {
    Hidden,
    Revealed,
    Matched,
    Removed,
}

/// The four elemental affinities a non-arcana pair may carry, consumed by
/// the Elementals power-up (see `powerups::effects::elementals`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Element {
    Fire,
    Water,
    Air,
    Earth,
}

impl Element {
    pub const ALL: [Element; 4] = [Element::Fire, Element::Water, Element::Air, Element::Earth];
}

#[derive(Debug, Clone, Copy)]
pub struct Card {
    pub index: usize,
    pub pair_id: u32,
    pub element: Option<Element>,
    pub state: CardState,
    /// Which player (0/1) completed this pair, once `state == Matched`.
    /// Consulted by power-ups that target previously-resolved pairs
    /// (Necromancy, Leech).
    pub matched_by: Option<usize>,
}

/// The full board for one match: a fixed `rows * cols` grid of cards,
/// `arcana_pairs` of which carry a power-up instead of an element.
#[derive(Debug, Clone)]
pub struct Board {
    pub rows: usize,
    pub cols: usize,
    pub cards: Vec<Card>,
    pub arcana_pairs: usize,
}

impl Board {
    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn card(&self, index: usize) -> &Card {
        &self.cards[index]
    }

    pub fn card_mut(&mut self, index: usize) -> &mut Card {
        &mut self.cards[index]
    }

    /// True once every card has been matched (or removed by a power-up
    /// that retires cards from play, e.g. Oblivion).
    pub fn all_matched(&self) -> bool {
        self.cards
            .iter()
            .all(|c| matches!(c.state, CardState::Matched | CardState::Removed))
    }

    /// Indices of hidden cards within a Manhattan-distance-1 "radar"
    /// region of `center`, used by the Clairvoyance power-up's
    /// area variant.
    pub fn radar_region_indices(&self, center: usize) -> Vec<usize> {
        let (cr, cc) = self.rc(center);
        let mut out = Vec::new();
        for dr in -1i64..=1 {
            for dc in -1i64..=1 {
                let r = cr as i64 + dr;
                let c = cc as i64 + dc;
                if r < 0 || c < 0 {
                    continue;
                }
                let (r, c) = (r as usize, c as usize);
                if r >= self.rows || c >= self.cols {
                    continue;
                }
                let idx = r * self.cols + c;
                if self.cards[idx].state == CardState::Hidden {
                    out.push(idx);
                }
            }
        }
        out
    }

    fn rc(&self, index: usize) -> (usize, usize) {
        (index / self.cols, index % self.cols)
    }

    /// Re-shuffle the positions of every card still `Hidden`, leaving
    /// matched/removed/currently-revealed cards exactly where they are.
    /// Used by the Chaos power-up.
    pub fn shuffle_unmatched<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let mut hidden_indices: Vec<usize> = self
            .cards
            .iter()
            .filter(|c| c.state == CardState::Hidden)
            .map(|c| c.index)
            .collect();
        let mut payload: Vec<(u32, Option<Element>)> = hidden_indices
            .iter()
            .map(|&i| (self.cards[i].pair_id, self.cards[i].element))
            .collect();
        payload.shuffle(rng);
        hidden_indices.shuffle(rng);
        for (slot, (pair_id, element)) in hidden_indices.into_iter().zip(payload) {
            let card = &mut self.cards[slot];
            card.pair_id = pair_id;
            card.element = element;
        }
    }

    /// Shuffle pair identities only among the given index subset, keeping
    /// every other card untouched. Used by power-ups with a localized
    /// scramble effect.
    pub fn shuffle_pair_ids_among_indices<R: Rng + ?Sized>(&mut self, indices: &[usize], rng: &mut R) {
        let mut payload: Vec<(u32, Option<Element>)> = indices
            .iter()
            .map(|&i| (self.cards[i].pair_id, self.cards[i].element))
            .collect();
        payload.shuffle(rng);
        for (&slot, (pair_id, element)) in indices.iter().zip(payload) {
            let card = &mut self.cards[slot];
            card.pair_id = pair_id;
            card.element = element;
        }
    }
}

/// Build a fresh, shuffled board. `arcana_pair_ids` are the pair ids that
/// carry a power-up (assigned by `powerups::pick_arcana_for_match` and
/// threaded in here so the board and the power-up-per-pair map agree on
/// ids); all remaining pairs are assigned elements round-robin then
/// shuffled in with the rest.
pub fn new_board<R: Rng + ?Sized>(
    rows: usize,
    cols: usize,
    arcana_pair_count: usize,
    rng: &mut R,
) -> Board {
    assert!((rows * cols) % 2 == 0, "board must have an even cell count");
    let total_pairs = (rows * cols) / 2;
    assert!(
        arcana_pair_count <= total_pairs,
        "cannot have more arcana pairs than pairs on the board"
    );

    let mut cards = Vec::with_capacity(rows * cols);
    for pair_id in 0..total_pairs as u32 {
        let element = if (pair_id as usize) < arcana_pair_count {
            None
        } else {
            Some(Element::ALL[((pair_id as usize - arcana_pair_count) / 3) % Element::ALL.len()])
        };
        for _ in 0..2 {
            cards.push(Card {
                index: 0,
                pair_id,
                element,
                state: CardState::Hidden,
                matched_by: None,
            });
        }
    }
    cards.shuffle(rng);
    for (i, card) in cards.iter_mut().enumerate() {
        card.index = i;
    }

    Board {
        rows,
        cols,
        cards,
        arcana_pairs: arcana_pair_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn new_board_has_matching_pair_counts() {
        let mut rng = StdRng::seed_from_u64(1);
        let board = new_board(4, 4, 3, &mut rng);
        assert_eq!(board.len(), 16);
        let mut counts = std::collections::HashMap::new();
        for card in &board.cards {
            *counts.entry(card.pair_id).or_insert(0) += 1;
        }
        assert!(counts.values().all(|&c| c == 2));
        assert_eq!(counts.len(), 8);
    }

    #[test]
    fn all_matched_true_only_when_everything_resolved() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut board = new_board(2, 2, 0, &mut rng);
        assert!(!board.all_matched());
        for card in board.cards.iter_mut() {
            card.state = CardState::Matched;
        }
        assert!(board.all_matched());
    }

    #[test]
    fn shuffle_unmatched_skips_matched_cards() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut board = new_board(4, 4, 0, &mut rng);
        board.cards[0].state = CardState::Matched;
        let pinned = (board.cards[0].pair_id, board.cards[0].element);
        board.shuffle_unmatched(&mut rng);
        assert_eq!((board.cards[0].pair_id, board.cards[0].element), pinned);
    }

    #[test]
    fn radar_region_excludes_out_of_bounds_and_non_hidden() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut board = new_board(4, 4, 0, &mut rng);
        board.cards[0].state = CardState::Matched;
        let region = board.radar_region_indices(0);
        assert!(!region.contains(&0));
        assert!(region.iter().all(|&i| i < 16));
    }
}
