//! Named AI difficulty presets (C4, SPEC_FULL §11).

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AiProfile {
    pub display_names: &'static [&'static str],
    /// Probability an observed reveal fails to stick in memory.
    pub forget_chance: f64,
    pub delay_min: Duration,
    pub delay_max: Duration,
    /// Probability the AI plays its best known move (known pair, highlight,
    /// same-element follow-up, unseen tile) instead of a uniformly random one.
    pub use_best_move_chance: f64,
    /// Probability the AI discards its expected-value-best power-up choice
    /// in favor of a uniformly random usable one.
    pub arcana_randomness: f64,
}

pub const PROFILES: &[AiProfile] = &[
    AiProfile {
        display_names: &["Apprentice"],
        forget_chance: 0.45,
        delay_min: Duration::from_millis(600),
        delay_max: Duration::from_millis(1800),
        use_best_move_chance: 0.35,
        arcana_randomness: 0.15,
    },
    AiProfile {
        display_names: &["Warden"],
        forget_chance: 0.2,
        delay_min: Duration::from_millis(500),
        delay_max: Duration::from_millis(1400),
        use_best_move_chance: 0.65,
        arcana_randomness: 0.3,
    },
    AiProfile {
        display_names: &["Oracle"],
        forget_chance: 0.05,
        delay_min: Duration::from_millis(400),
        delay_max: Duration::from_millis(1000),
        use_best_move_chance: 0.9,
        arcana_randomness: 0.45,
    },
];

pub fn pick_profile_and_name<R: rand::Rng + ?Sized>(rng: &mut R) -> (AiProfile, String) {
    let profile = PROFILES[rng.gen_range(0..PROFILES.len())].clone();
    let name = profile.display_names[rng.gen_range(0..profile.display_names.len())].to_string();
    (profile, name)
}
