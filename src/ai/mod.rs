//! AI opponent (C4): observes the same per-viewer broadcasts a human
//! client would receive and reacts by sending `Action`s into the match's
//! driver channel, exactly as `session` does on behalf of a real socket.
//! The AI never sees anything a human viewer couldn't — it only ever
//! reads `pairId` off cards already `Revealed`/`Matched` in its own
//! `game_state` snapshot, and infers element groupings purely from its
//! own highlighted indices after casting Elementals (the wire schema
//! carries no `element` field).

pub mod profiles;

use std::collections::HashMap;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use tracing::debug;

use crate::board::CardState;
use crate::game::Action;
use crate::wire::ServerMessage;

use profiles::AiProfile;

pub const LOG_TARGET: &str = "ai";

/// Cards considered for Clairvoyance's hypergeometric valuation, matching
/// the 3×3 region (plus the target itself) `Clairvoyance::apply` reveals.
const CLAIRVOYANCE_REGION_SIZE: usize = 9;

pub fn spawn(
    player_idx: usize,
    profile: AiProfile,
    board_rows: usize,
    board_cols: usize,
    actions_tx: mpsc::Sender<Action>,
    inbound: mpsc::Receiver<ServerMessage>,
    seed: Option<u64>,
) {
    let rng = seed.map(StdRng::seed_from_u64).unwrap_or_else(StdRng::from_entropy);
    let ai = AiOpponent {
        player_idx,
        profile,
        board_rows,
        board_cols,
        actions_tx,
        inbound,
        rng,
        memory: HashMap::new(),
        element_memory: HashMap::new(),
        next_element_group: 0,
        last_cast_power_up: None,
        last_highlight: Vec::new(),
        last_cards: Vec::new(),
    };
    crate::tokio_tools::spawn_named_task(format!("ai-{player_idx}"), ai.run());
}

struct AiOpponent {
    player_idx: usize,
    profile: AiProfile,
    board_rows: usize,
    board_cols: usize,
    actions_tx: mpsc::Sender<Action>,
    inbound: mpsc::Receiver<ServerMessage>,
    rng: StdRng,
    /// index -> pairId for every card the AI has ever seen revealed.
    memory: HashMap<usize, u32>,
    /// index -> opaque element-group id, learned only from highlights left
    /// by the AI's own Elementals casts. Cleared after any Chaos.
    element_memory: HashMap<usize, u32>,
    next_element_group: u32,
    /// Set right after the AI casts a power-up, consumed by the next
    /// `observe` to interpret that cast's resulting highlight set.
    last_cast_power_up: Option<String>,
    last_highlight: Vec<usize>,
    last_cards: Vec<crate::wire::CardWire>,
}

impl AiOpponent {
    async fn run(mut self) {
        while let Some(msg) = self.inbound.recv().await {
            match msg {
                ServerMessage::GameState {
                    cards,
                    your_turn,
                    hand,
                    flipped_indices,
                    highlight_indices,
                    ..
                } => {
                    self.observe(&cards, highlight_indices.unwrap_or_default());
                    self.last_cards = cards;
                    if your_turn && flipped_indices.len() < 2 {
                        self.act(&hand, &flipped_indices).await;
                    }
                }
                ServerMessage::PowerupUsed { power_up_label, .. } => {
                    if power_up_label == "Chaos" {
                        self.element_memory.clear();
                    }
                }
                ServerMessage::GameOver { .. } => break,
                _ => {}
            }
        }
        debug!(target: LOG_TARGET, player = self.player_idx, "ai opponent task exiting");
    }

    fn observe(&mut self, cards: &[crate::wire::CardWire], highlight_indices: Vec<usize>) {
        self.memory
            .retain(|&idx, _| !matches!(cards.get(idx).map(|c| c.state), Some(CardState::Matched)));
        self.element_memory
            .retain(|&idx, _| matches!(cards.get(idx).map(|c| c.state), Some(CardState::Hidden)));

        for card in cards {
            if let Some(pair_id) = card.pair_id {
                if matches!(card.state, CardState::Revealed | CardState::Matched)
                    && !self.memory.contains_key(&card.index)
                {
                    self.memory.insert(card.index, pair_id);
                }
            }
        }

        if let Some(power_up_id) = self.last_cast_power_up.take() {
            if power_up_id == "elementals" && !highlight_indices.is_empty() {
                let group = self.next_element_group;
                self.next_element_group += 1;
                for &idx in &highlight_indices {
                    self.element_memory.insert(idx, group);
                }
            }
        }
        self.last_highlight = highlight_indices;
    }

    fn known_pair(&self) -> Option<(usize, usize)> {
        let mut by_pair: HashMap<u32, Vec<usize>> = HashMap::new();
        for (&index, &pair_id) in &self.memory {
            by_pair.entry(pair_id).or_default().push(index);
        }
        by_pair
            .into_values()
            .find(|indices| indices.len() >= 2)
            .map(|indices| (indices[0], indices[1]))
    }

    fn is_hidden(&self, index: usize) -> bool {
        self.last_cards
            .iter()
            .any(|c| c.index == index && c.state == CardState::Hidden)
    }

    fn pairs_remaining(&self) -> usize {
        let hidden = self.last_cards.iter().filter(|c| c.state == CardState::Hidden).count();
        (hidden / 2).max(1)
    }

    /// Expected value of flipping blind: 1 + 1/(2(P-1)-1) when a complete
    /// pair is already memorized (the second flip is then guaranteed),
    /// else the baseline random-pair probability 1/(2P-1).
    fn flip_ev(&self, pairs_remaining: usize) -> f64 {
        let p = pairs_remaining as f64;
        if self.known_pair().is_some() {
            1.0 + 1.0 / (2.0 * (p - 1.0) - 1.0).max(1.0)
        } else {
            1.0 / (2.0 * p - 1.0).max(1.0)
        }
    }

    /// Expected value of casting Elementals: the fraction of hidden cards
    /// that fall in the largest element group the AI has actually
    /// memorized (a cast that finds nothing is simply a wasted copy).
    fn elementals_ev(&self) -> f64 {
        let hidden_total = self.last_cards.iter().filter(|c| c.state == CardState::Hidden).count();
        if hidden_total == 0 {
            return -1.0;
        }
        let mut group_sizes: HashMap<u32, usize> = HashMap::new();
        for (&idx, &group) in &self.element_memory {
            if self.is_hidden(idx) {
                *group_sizes.entry(group).or_insert(0) += 1;
            }
        }
        let best = group_sizes.values().copied().max().unwrap_or(0);
        best as f64 / hidden_total as f64
    }

    /// Expected pairs revealed by a Clairvoyance cast over the `k`-card
    /// region it exposes: P · C(2P-2, k-2) / C(2P, k), the hypergeometric
    /// chance the region contains at least one complete pair.
    fn clairvoyance_ev(&self, pairs_remaining: usize) -> f64 {
        let p = pairs_remaining;
        let total = 2 * p;
        let k = CLAIRVOYANCE_REGION_SIZE.min(total);
        if total < 2 || k < 2 {
            return -1.0;
        }
        let denom = binomial(total, k);
        if denom == 0.0 {
            return -1.0;
        }
        p as f64 * binomial(total - 2, k - 2) / denom
    }

    fn power_up_ev(&self, power_up_id: &str, pairs_remaining: usize) -> f64 {
        match power_up_id {
            "chaos" => self.flip_ev(pairs_remaining),
            "elementals" => self.elementals_ev(),
            "clairvoyance" => self.clairvoyance_ev(pairs_remaining),
            _ => -1.0,
        }
    }

    /// Picks a power-up to cast this turn, or `None` to flip instead.
    /// The EV-best usable power-up is chosen unless it trails the flip
    /// baseline, with `arcanaRandomness` chance of overriding that choice
    /// with a uniformly random usable power-up instead.
    fn choose_power_up(&mut self, hand: &[crate::wire::HandEntry]) -> Option<String> {
        let usable: Vec<&crate::wire::HandEntry> = hand.iter().filter(|h| h.usable_count > 0).collect();
        if usable.is_empty() {
            return None;
        }

        if self.rng.gen::<f64>() < self.profile.arcana_randomness {
            let idx = self.rng.gen_range(0..usable.len());
            return Some(usable[idx].power_up_id.clone());
        }

        let pairs_remaining = self.pairs_remaining();
        let flip_ev = self.flip_ev(pairs_remaining);
        usable
            .iter()
            .map(|entry| (entry.power_up_id.clone(), self.power_up_ev(&entry.power_up_id, pairs_remaining)))
            .filter(|(_, ev)| *ev > flip_ev)
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id)
    }

    /// For area effects (clairvoyance/oblivion): the hidden index whose
    /// clipped 3×3 region covers the most still-hidden cards, ties broken
    /// at random.
    fn choose_target_by_region(&mut self) -> Option<usize> {
        let hidden: Vec<usize> = self
            .last_cards
            .iter()
            .filter(|c| c.state == CardState::Hidden)
            .map(|c| c.index)
            .collect();
        if hidden.is_empty() {
            return None;
        }
        let mut best_score = -1i64;
        let mut best: Vec<usize> = Vec::new();
        for &idx in &hidden {
            let score = self
                .region_indices(idx)
                .into_iter()
                .filter(|&i| self.is_hidden(i))
                .count() as i64;
            if score > best_score {
                best_score = score;
                best = vec![idx];
            } else if score == best_score {
                best.push(idx);
            }
        }
        best.get(self.rng.gen_range(0..best.len())).copied()
    }

    fn region_indices(&self, center: usize) -> Vec<usize> {
        let cr = center / self.board_cols;
        let cc = center % self.board_cols;
        let mut out = Vec::new();
        for dr in -1i64..=1 {
            for dc in -1i64..=1 {
                let r = cr as i64 + dr;
                let c = cc as i64 + dc;
                if r < 0 || c < 0 {
                    continue;
                }
                let (r, c) = (r as usize, c as usize);
                if r >= self.board_rows || c >= self.board_cols {
                    continue;
                }
                out.push(r * self.board_cols + c);
            }
        }
        out
    }

    /// For Elementals: a hidden card in the largest memorized element
    /// group, falling back to a uniformly random hidden card when no
    /// element grouping is known yet.
    fn choose_target_by_element(&mut self) -> Option<usize> {
        let mut groups: HashMap<u32, Vec<usize>> = HashMap::new();
        for (&idx, &group) in &self.element_memory {
            if self.is_hidden(idx) {
                groups.entry(group).or_default().push(idx);
            }
        }
        if let Some((_, indices)) = groups.into_iter().max_by_key(|(_, v)| v.len()) {
            return indices.get(self.rng.gen_range(0..indices.len())).copied();
        }
        self.random_hidden_index(&[])
    }

    fn choose_target(&mut self, power_up_id: &str) -> Option<usize> {
        match power_up_id {
            "clairvoyance" | "oblivion" => self.choose_target_by_region(),
            "elementals" => self.choose_target_by_element(),
            _ => None,
        }
    }

    async fn act(&mut self, hand: &[crate::wire::HandEntry], flipped_indices: &[usize]) {
        // forgetChance decays memory per entry, applied here (each AI
        // turn) rather than at observe time.
        let forget_chance = self.profile.forget_chance;
        let rng = &mut self.rng;
        self.memory.retain(move |_, _| rng.gen::<f64>() >= forget_chance);

        let delay_ms = self
            .rng
            .gen_range(self.profile.delay_min.as_millis() as u64..=self.profile.delay_max.as_millis() as u64);
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;

        if flipped_indices.is_empty() {
            if let Some(power_up_id) = self.choose_power_up(hand) {
                let target = self.choose_target(&power_up_id);
                let _ = self
                    .actions_tx
                    .send(Action::UsePowerUp {
                        player_idx: self.player_idx,
                        power_up_id: power_up_id.clone(),
                        card_index: target,
                    })
                    .await;
                self.last_cast_power_up = Some(power_up_id);
                return;
            }
        }

        if let Some(index) = self.choose_flip_index(flipped_indices) {
            let _ = self
                .actions_tx
                .send(Action::FlipCard {
                    player_idx: self.player_idx,
                    index,
                })
                .await;
        }
    }

    fn choose_flip_index(&mut self, flipped_indices: &[usize]) -> Option<usize> {
        if flipped_indices.is_empty() {
            if self.rng.gen::<f64>() < self.profile.use_best_move_chance {
                if let Some((a, _)) = self.known_pair() {
                    return Some(a);
                }
                if let Some(&idx) = self.last_highlight.iter().find(|&&i| self.is_hidden(i)) {
                    return Some(idx);
                }
                if let Some(idx) = self.unseen_hidden_index(flipped_indices) {
                    return Some(idx);
                }
            }
            return self.random_hidden_index(flipped_indices);
        }

        let first = flipped_indices[0];
        if let Some(&pair_id) = self.memory.get(&first) {
            if let Some(idx) = self
                .memory
                .iter()
                .find(|(&idx, &pid)| idx != first && pid == pair_id)
                .map(|(&idx, _)| idx)
            {
                return Some(idx);
            }
        }
        if self.rng.gen::<f64>() < self.profile.use_best_move_chance {
            if let Some(&group) = self.element_memory.get(&first) {
                let candidates: Vec<usize> = self
                    .element_memory
                    .iter()
                    .filter(|(&idx, &g)| idx != first && g == group && self.is_hidden(idx))
                    .map(|(&idx, _)| idx)
                    .collect();
                if !candidates.is_empty() {
                    return Some(candidates[self.rng.gen_range(0..candidates.len())]);
                }
            }
        }
        self.random_hidden_index(flipped_indices)
    }

    /// Prefers a hidden card never revealed to this AI before, so a blind
    /// flip maximizes new information rather than re-flipping a tile
    /// whose pair-id simply fell out of memory.
    fn unseen_hidden_index(&mut self, excluded: &[usize]) -> Option<usize> {
        let candidates: Vec<usize> = self
            .last_cards
            .iter()
            .filter(|c| c.state == CardState::Hidden && !excluded.contains(&c.index) && !self.memory.contains_key(&c.index))
            .map(|c| c.index)
            .collect();
        if candidates.is_empty() {
            None
        } else {
            Some(candidates[self.rng.gen_range(0..candidates.len())])
        }
    }

    fn random_hidden_index(&mut self, excluded: &[usize]) -> Option<usize> {
        let candidates: Vec<usize> = self
            .last_cards
            .iter()
            .filter(|c| c.state == CardState::Hidden && !excluded.contains(&c.index))
            .map(|c| c.index)
            .collect();
        if candidates.is_empty() {
            None
        } else {
            Some(candidates[self.rng.gen_range(0..candidates.len())])
        }
    }
}

/// `n choose k` as `f64`, computed iteratively to avoid overflow for the
/// board sizes this game uses.
fn binomial(n: usize, k: usize) -> f64 {
    if k > n {
        return 0.0;
    }
    let k = k.min(n - k);
    let mut result = 1.0f64;
    for i in 0..k {
        result *= (n - i) as f64;
        result /= (i + 1) as f64;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binomial_matches_known_values() {
        assert_eq!(binomial(5, 0), 1.0);
        assert_eq!(binomial(5, 5), 1.0);
        assert_eq!(binomial(5, 2), 10.0);
        assert_eq!(binomial(2, 5), 0.0);
    }

    #[test]
    fn flip_ev_prefers_known_pair_over_baseline() {
        let mut ai = test_ai();
        ai.memory.insert(0, 7);
        ai.memory.insert(1, 7);
        let with_pair = ai.flip_ev(5);
        ai.memory.clear();
        let without_pair = ai.flip_ev(5);
        assert!(with_pair > without_pair);
    }

    #[test]
    fn elementals_ev_is_zero_without_any_memorized_group() {
        let mut ai = test_ai();
        ai.last_cards = vec![
            crate::wire::CardWire { index: 0, state: CardState::Hidden, pair_id: None },
            crate::wire::CardWire { index: 1, state: CardState::Hidden, pair_id: None },
        ];
        assert_eq!(ai.elementals_ev(), 0.0);
    }

    fn test_ai() -> AiOpponent {
        let (actions_tx, _rx) = mpsc::channel(1);
        let (_tx, inbound) = mpsc::channel(1);
        AiOpponent {
            player_idx: 1,
            profile: profiles::PROFILES[0].clone(),
            board_rows: 4,
            board_cols: 4,
            actions_tx,
            inbound,
            rng: StdRng::seed_from_u64(1),
            memory: HashMap::new(),
            element_memory: HashMap::new(),
            next_element_group: 0,
            last_cast_power_up: None,
            last_highlight: Vec::new(),
            last_cards: Vec::new(),
        }
    }
}
