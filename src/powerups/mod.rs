//! Power-up ("arcana") registry and effect dispatch (C2).
//!
//! Power-ups are data-driven: each is registered once by id and looked up
//! by that id at use time, rather than matched on a closed enum. This
//! keeps `game::engine` ignorant of individual effect bodies — it only
//! knows the `PowerUpEffect` trait.

pub mod effects;

use std::collections::{HashMap, HashSet};

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::board::Board;
use crate::config::RuleConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rarity {
    Common,
    Rare,
    Legendary,
}

impl Rarity {
    /// Relative weight used by weighted-random arcana selection; higher
    /// rarity is drawn less often.
    pub fn weight(self) -> u32 {
        match self {
            Rarity::Common => 6,
            Rarity::Rare => 3,
            Rarity::Legendary => 1,
        }
    }
}

/// Mutable view of one side of the match, handed to a power-up's `apply`.
/// Effects only ever see the fields relevant to them, never the raw
/// `Match` struct, keeping `game::engine` the single place board/score
/// invariants are enforced end to end.
pub struct PlayerState<'a> {
    pub score: &'a mut u32,
    pub hand: &'a mut HashMap<String, u32>,
    pub known_indices: &'a mut HashSet<usize>,
    pub highlight_indices: &'a mut Vec<usize>,
    pub leech_active: &'a mut bool,
    pub blood_pact_active: &'a mut bool,
}

pub struct PowerUpContext<'a> {
    pub board: &'a mut Board,
    pub active: PlayerState<'a>,
    pub opponent: PlayerState<'a>,
    pub pair_id_to_power_up: &'a HashMap<u32, String>,
    pub target_index: Option<usize>,
    pub rng: &'a mut dyn RngCore,
    pub config: &'a RuleConfig,
}

/// Result of applying a power-up, consumed by `game::engine` to build the
/// `powerup_used` / `powerup_effect_resolved` broadcasts and to arm any
/// follow-up timer (currently only Clairvoyance's reveal window).
#[derive(Debug, Default, Clone)]
pub struct PowerUpOutcome {
    /// The power-up had no valid target or was already active; consumed
    /// from the hand anyway per spec (a wasted cast still costs a copy).
    pub no_effect: bool,
    pub message: Option<String>,
    /// Indices temporarily set to `Revealed` that the engine must hide
    /// again after `config.clairvoyance_reveal_ms`.
    pub reveal_indices: Vec<usize>,
}

pub trait PowerUpEffect: Send + Sync {
    fn id(&self) -> &'static str;
    fn label(&self) -> &'static str;
    fn rarity(&self) -> Rarity;
    /// Whether this effect needs a `cardIndex` from the client to act on.
    fn requires_target(&self) -> bool {
        false
    }
    fn apply(&self, ctx: &mut PowerUpContext<'_>) -> PowerUpOutcome;
}

pub struct PowerUpRegistry {
    order: Vec<Box<dyn PowerUpEffect>>,
    by_id: HashMap<&'static str, usize>,
}

impl PowerUpRegistry {
    pub fn new() -> Self {
        Self {
            order: Vec::new(),
            by_id: HashMap::new(),
        }
    }

    pub fn register(&mut self, effect: Box<dyn PowerUpEffect>) {
        let id = effect.id();
        let idx = self.order.len();
        self.order.push(effect);
        self.by_id.insert(id, idx);
    }

    pub fn get(&self, id: &str) -> Option<&dyn PowerUpEffect> {
        self.by_id.get(id).map(|&i| self.order[i].as_ref())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.order.iter().map(|e| e.id())
    }

    /// Pick `n` distinct power-up ids to seed a new match's arcana pairs,
    /// weighted by rarity. Falls back to registration order when fewer
    /// power-ups are registered than requested.
    pub fn pick_arcana_for_match<R: rand::Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Vec<String> {
        let n = n.min(self.order.len());
        let mut pool: Vec<&str> = self.order.iter().map(|e| e.id()).collect();
        let mut chosen = Vec::with_capacity(n);
        for _ in 0..n {
            if pool.is_empty() {
                break;
            }
            let weights: Vec<u32> = pool
                .iter()
                .map(|id| self.get(id).map(|e| e.rarity().weight()).unwrap_or(1))
                .collect();
            let total: u32 = weights.iter().sum();
            let mut pick = rng.gen_range(0..total.max(1));
            let mut idx = 0;
            for (i, w) in weights.iter().enumerate() {
                if pick < *w {
                    idx = i;
                    break;
                }
                pick -= *w;
            }
            chosen.push(pool.remove(idx).to_string());
        }
        chosen
    }

    /// Registration-order selection used by deterministic tests.
    pub fn pick_arcana_deterministic(&self, n: usize) -> Vec<String> {
        self.order.iter().take(n).map(|e| e.id().to_string()).collect()
    }
}

impl Default for PowerUpRegistry {
    fn default() -> Self {
        let mut reg = Self::new();
        effects::register_all(&mut reg);
        reg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn pick_arcana_is_distinct_and_bounded() {
        let reg = PowerUpRegistry::default();
        let mut rng = StdRng::seed_from_u64(7);
        let picked = reg.pick_arcana_for_match(5, &mut rng);
        let unique: HashSet<_> = picked.iter().collect();
        assert_eq!(unique.len(), picked.len());
        assert!(picked.len() <= 5);
    }

    #[test]
    fn deterministic_pick_matches_registration_order() {
        let reg = PowerUpRegistry::default();
        let expected: Vec<String> = reg.ids().take(3).map(|s| s.to_string()).collect();
        assert_eq!(reg.pick_arcana_deterministic(3), expected);
    }
}
