//! Concrete power-up effect implementations, registered by id.
//!
//! Each effect is a small zero-field struct implementing `PowerUpEffect`,
//! one struct per behavior behind a shared trait.

use crate::board::CardState;

use super::{PowerUpContext, PowerUpEffect, PowerUpOutcome, PowerUpRegistry, Rarity};

pub fn register_all(registry: &mut PowerUpRegistry) {
    registry.register(Box::new(Chaos));
    registry.register(Box::new(Clairvoyance));
    registry.register(Box::new(Unveiling));
    registry.register(Box::new(Elementals));
    registry.register(Box::new(Leech));
    registry.register(Box::new(BloodPact));
    registry.register(Box::new(Necromancy));
    registry.register(Box::new(Oblivion));
}

pub struct Chaos;

impl PowerUpEffect for Chaos {
    fn id(&self) -> &'static str {
        "chaos"
    }
    fn label(&self) -> &'static str {
        "Chaos"
    }
    fn rarity(&self) -> Rarity {
        Rarity::Common
    }
    fn apply(&self, ctx: &mut PowerUpContext<'_>) -> PowerUpOutcome {
        ctx.board.shuffle_unmatched(ctx.rng);
        ctx.active.known_indices.clear();
        ctx.opponent.known_indices.clear();
        ctx.active.highlight_indices.clear();
        ctx.opponent.highlight_indices.clear();
        PowerUpOutcome {
            no_effect: false,
            message: Some("The board's hidden cards were reshuffled.".into()),
            reveal_indices: Vec::new(),
        }
    }
}

pub struct Clairvoyance;

impl PowerUpEffect for Clairvoyance {
    fn id(&self) -> &'static str {
        "clairvoyance"
    }
    fn label(&self) -> &'static str {
        "Clairvoyance"
    }
    fn rarity(&self) -> Rarity {
        Rarity::Rare
    }
    fn requires_target(&self) -> bool {
        true
    }
    fn apply(&self, ctx: &mut PowerUpContext<'_>) -> PowerUpOutcome {
        let Some(target) = ctx.target_index else {
            return no_effect("Clairvoyance needs a target card.");
        };
        if ctx.board.card(target).state != CardState::Hidden {
            return no_effect("That card is not hidden.");
        }
        let mut region = ctx.board.radar_region_indices(target);
        region.push(target);
        for &idx in &region {
            ctx.board.card_mut(idx).state = CardState::Revealed;
            ctx.active.known_indices.insert(idx);
            ctx.opponent.known_indices.insert(idx);
        }
        PowerUpOutcome {
            no_effect: false,
            message: Some("A patch of the board was revealed.".into()),
            reveal_indices: region,
        }
    }
}

pub struct Unveiling;

impl PowerUpEffect for Unveiling {
    fn id(&self) -> &'static str {
        "unveiling"
    }
    fn label(&self) -> &'static str {
        "Unveiling"
    }
    fn rarity(&self) -> Rarity {
        Rarity::Common
    }
    fn apply(&self, ctx: &mut PowerUpContext<'_>) -> PowerUpOutcome {
        let highlights: Vec<usize> = ctx
            .board
            .cards
            .iter()
            .filter(|c| c.state == CardState::Hidden && !ctx.active.known_indices.contains(&c.index))
            .map(|c| c.index)
            .collect();
        if highlights.is_empty() {
            return no_effect("You haven't seen any hidden cards yet.");
        }
        *ctx.active.highlight_indices = highlights;
        PowerUpOutcome {
            no_effect: false,
            message: Some("Previously seen cards were highlighted for you.".into()),
            reveal_indices: Vec::new(),
        }
    }
}

pub struct Elementals;

impl PowerUpEffect for Elementals {
    fn id(&self) -> &'static str {
        "elementals"
    }
    fn label(&self) -> &'static str {
        "Elementals"
    }
    fn rarity(&self) -> Rarity {
        Rarity::Common
    }
    fn requires_target(&self) -> bool {
        true
    }
    fn apply(&self, ctx: &mut PowerUpContext<'_>) -> PowerUpOutcome {
        let Some(target) = ctx.target_index else {
            return no_effect("Elementals needs a target card.");
        };
        let card = *ctx.board.card(target);
        let Some(element) = card.element else {
            return no_effect("That card has no elemental affinity.");
        };
        if card.state != CardState::Hidden {
            return no_effect("That card is not hidden.");
        }
        let matches: Vec<usize> = ctx
            .board
            .cards
            .iter()
            .filter(|c| c.index != target && c.state == CardState::Hidden && c.element == Some(element))
            .map(|c| c.index)
            .collect();
        *ctx.active.highlight_indices = matches.clone();
        PowerUpOutcome {
            no_effect: matches.is_empty(),
            message: Some("Cards sharing that card's element were highlighted.".to_string()),
            reveal_indices: Vec::new(),
        }
    }
}

/// Marks the caster so that the next time the opponent completes a match,
/// the point goes to the caster instead. Consumed by `game::engine`'s
/// match-resolution step.
pub struct Leech;

impl PowerUpEffect for Leech {
    fn id(&self) -> &'static str {
        "leech"
    }
    fn label(&self) -> &'static str {
        "Leech"
    }
    fn rarity(&self) -> Rarity {
        Rarity::Rare
    }
    fn apply(&self, ctx: &mut PowerUpContext<'_>) -> PowerUpOutcome {
        if *ctx.active.leech_active {
            return no_effect("Leech is already active.");
        }
        *ctx.active.leech_active = true;
        PowerUpOutcome {
            no_effect: false,
            message: Some("The opponent's next match will be stolen.".into()),
            reveal_indices: Vec::new(),
        }
    }
}

/// Marks the caster's next self-completed match to award double points.
/// Consumed by `game::engine`'s match-resolution step.
pub struct BloodPact;

impl PowerUpEffect for BloodPact {
    fn id(&self) -> &'static str {
        "blood_pact"
    }
    fn label(&self) -> &'static str {
        "Blood Pact"
    }
    fn rarity(&self) -> Rarity {
        Rarity::Legendary
    }
    fn apply(&self, ctx: &mut PowerUpContext<'_>) -> PowerUpOutcome {
        if *ctx.active.blood_pact_active {
            return no_effect("Blood Pact is already active.");
        }
        *ctx.active.blood_pact_active = true;
        PowerUpOutcome {
            no_effect: false,
            message: Some("Three matches in a row, without a slip, will earn a bonus.".into()),
            reveal_indices: Vec::new(),
        }
    }
}

/// Returns every resolved pair to play except the power-up's own arcana
/// pair (which would otherwise revive itself), then scrambles pair
/// identities among the revived positions.
pub struct Necromancy;

impl PowerUpEffect for Necromancy {
    fn id(&self) -> &'static str {
        "necromancy"
    }
    fn label(&self) -> &'static str {
        "Necromancy"
    }
    fn rarity(&self) -> Rarity {
        Rarity::Legendary
    }
    fn apply(&self, ctx: &mut PowerUpContext<'_>) -> PowerUpOutcome {
        let self_pair_id = ctx
            .pair_id_to_power_up
            .iter()
            .find(|(_, id)| id.as_str() == "necromancy")
            .map(|(&pair_id, _)| pair_id);

        let revived: Vec<usize> = ctx
            .board
            .cards
            .iter()
            .filter(|c| c.state == CardState::Matched && Some(c.pair_id) != self_pair_id)
            .map(|c| c.index)
            .collect();
        if revived.is_empty() {
            return no_effect("There are no resolved pairs to revive.");
        }

        for &idx in &revived {
            let card = ctx.board.card_mut(idx);
            card.state = CardState::Hidden;
            card.matched_by = None;
        }
        ctx.board.shuffle_pair_ids_among_indices(&revived, ctx.rng);

        PowerUpOutcome {
            no_effect: false,
            message: Some("Resolved pairs returned to play, their identities scrambled.".into()),
            reveal_indices: Vec::new(),
        }
    }
}

/// Permanently removes a hidden pair from play without awarding a point
/// to either side.
pub struct Oblivion;

impl PowerUpEffect for Oblivion {
    fn id(&self) -> &'static str {
        "oblivion"
    }
    fn label(&self) -> &'static str {
        "Oblivion"
    }
    fn rarity(&self) -> Rarity {
        Rarity::Rare
    }
    fn requires_target(&self) -> bool {
        true
    }
    fn apply(&self, ctx: &mut PowerUpContext<'_>) -> PowerUpOutcome {
        let Some(target) = ctx.target_index else {
            return no_effect("Oblivion needs a target card.");
        };
        let card = *ctx.board.card(target);
        if card.state != CardState::Hidden {
            return no_effect("That card is not hidden.");
        }
        let pair_id = card.pair_id;
        for c in ctx.board.cards.iter_mut().filter(|c| c.pair_id == pair_id) {
            c.state = CardState::Removed;
        }
        PowerUpOutcome {
            no_effect: false,
            message: Some("A hidden pair was erased from the board.".into()),
            reveal_indices: Vec::new(),
        }
    }
}

fn no_effect(message: &str) -> PowerUpOutcome {
    PowerUpOutcome {
        no_effect: true,
        message: Some(message.to_string()),
        reveal_indices: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::new_board;
    use crate::config::RuleConfig;
    use crate::powerups::PlayerState;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::{HashMap, HashSet};

    fn harness<'a>(
        board: &'a mut crate::board::Board,
        active_score: &'a mut u32,
        active_hand: &'a mut HashMap<String, u32>,
        active_known: &'a mut HashSet<usize>,
        active_highlight: &'a mut Vec<usize>,
        active_leech: &'a mut bool,
        active_pact: &'a mut bool,
        opp_score: &'a mut u32,
        opp_hand: &'a mut HashMap<String, u32>,
        opp_known: &'a mut HashSet<usize>,
        opp_highlight: &'a mut Vec<usize>,
        opp_leech: &'a mut bool,
        opp_pact: &'a mut bool,
        pair_map: &'a HashMap<u32, String>,
        target: Option<usize>,
        rng: &'a mut StdRng,
        config: &'a RuleConfig,
    ) -> PowerUpContext<'a> {
        PowerUpContext {
            board,
            active: PlayerState {
                score: active_score,
                hand: active_hand,
                known_indices: active_known,
                highlight_indices: active_highlight,
                leech_active: active_leech,
                blood_pact_active: active_pact,
            },
            opponent: PlayerState {
                score: opp_score,
                hand: opp_hand,
                known_indices: opp_known,
                highlight_indices: opp_highlight,
                leech_active: opp_leech,
                blood_pact_active: opp_pact,
            },
            pair_id_to_power_up: pair_map,
            target_index: target,
            rng,
            config,
        }
    }

    #[test]
    fn leech_cannot_stack() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut board = new_board(4, 4, 0, &mut rng);
        let config = RuleConfig::default();
        let (mut s1, mut h1, mut k1, mut hl1, mut lz1, mut bp1) =
            (0u32, HashMap::new(), HashSet::new(), Vec::new(), true, false);
        let (mut s2, mut h2, mut k2, mut hl2, mut lz2, mut bp2) =
            (0u32, HashMap::new(), HashSet::new(), Vec::new(), false, false);
        let pair_map = HashMap::new();
        let mut ctx = harness(
            &mut board, &mut s1, &mut h1, &mut k1, &mut hl1, &mut lz1, &mut bp1, &mut s2, &mut h2, &mut k2,
            &mut hl2, &mut lz2, &mut bp2, &pair_map, None, &mut rng, &config,
        );
        let outcome = Leech.apply(&mut ctx);
        assert!(outcome.no_effect);
    }

    #[test]
    fn oblivion_removes_both_cards_of_pair() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut board = new_board(2, 2, 0, &mut rng);
        let target_pair = board.cards[0].pair_id;
        let config = RuleConfig::default();
        let (mut s1, mut h1, mut k1, mut hl1, mut lz1, mut bp1) =
            (0u32, HashMap::new(), HashSet::new(), Vec::new(), false, false);
        let (mut s2, mut h2, mut k2, mut hl2, mut lz2, mut bp2) =
            (0u32, HashMap::new(), HashSet::new(), Vec::new(), false, false);
        let pair_map = HashMap::new();
        let target_idx = board.cards[0].index;
        let mut ctx = harness(
            &mut board, &mut s1, &mut h1, &mut k1, &mut hl1, &mut lz1, &mut bp1, &mut s2, &mut h2, &mut k2,
            &mut hl2, &mut lz2, &mut bp2, &pair_map, Some(target_idx), &mut rng, &config,
        );
        let outcome = Oblivion.apply(&mut ctx);
        assert!(!outcome.no_effect);
        assert!(board
            .cards
            .iter()
            .filter(|c| c.pair_id == target_pair)
            .all(|c| c.state == CardState::Removed));
    }
}
