//! Process configuration: CLI flags/env vars (`ServerArgs`) and the
//! gameplay tunables they feed into (`RuleConfig`).
//!
//! A single `clap::Parser` derive with `env = "..."` attributes so every
//! flag can also be set from the environment, loaded after `dotenv`.

use std::time::Duration;

use clap::Parser;

/// Gameplay timing/sizing knobs, threaded into `game::engine::MatchDriver`
/// and `matchmaker`/`ai` at match-creation time. Kept separate from
/// `ServerArgs` so tests can construct one directly without going through
/// CLI parsing.
#[derive(Debug, Clone)]
pub struct RuleConfig {
    pub board_rows: usize,
    pub board_cols: usize,
    pub arcana_pairs: usize,
    pub reveal_duration: Duration,
    pub turn_limit: Duration,
    pub turn_countdown_show: Duration,
    pub reconnect_timeout: Duration,
    pub ai_pair_timeout: Duration,
    pub clairvoyance_reveal: Duration,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            board_rows: 4,
            board_cols: 4,
            arcana_pairs: 3,
            reveal_duration: Duration::from_millis(900),
            turn_limit: Duration::from_secs(20),
            turn_countdown_show: Duration::from_secs(5),
            reconnect_timeout: Duration::from_secs(20),
            ai_pair_timeout: Duration::from_secs(8),
            clairvoyance_reveal: Duration::from_millis(2000),
        }
    }
}

impl From<&ServerArgs> for RuleConfig {
    fn from(args: &ServerArgs) -> Self {
        Self {
            board_rows: args.board_rows,
            board_cols: args.board_cols,
            arcana_pairs: args.arcana_pairs,
            reveal_duration: Duration::from_millis(args.reveal_duration_ms),
            turn_limit: Duration::from_secs(args.turn_limit_sec),
            turn_countdown_show: Duration::from_secs(args.turn_countdown_show_sec),
            reconnect_timeout: Duration::from_secs(args.reconnect_timeout_sec),
            ai_pair_timeout: Duration::from_secs(args.ai_pair_timeout_sec),
            clairvoyance_reveal: Duration::from_millis(args.clairvoyance_reveal_ms),
        }
    }
}

/// CLI/env configuration for the `arcanum-server` binary.
#[derive(Debug, Parser, Clone)]
#[command(name = "arcanum-server", about = "Arcanum match server")]
pub struct ServerArgs {
    /// Address to bind the HTTP/WebSocket listener on.
    #[arg(long, env = "SERVER_BIND", default_value = "127.0.0.1:8080")]
    pub bind: String,

    /// JWKS endpoint used to verify bearer tokens on `auth`. Unset disables
    /// JWT validation for local development.
    #[arg(long, env = "AUTH_JWKS_URL")]
    pub auth_jwks_url: Option<String>,

    /// Postgres connection string. Unset uses the no-op persistence sink.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Emit structured logs as JSON instead of compact text.
    #[arg(long, env = "LOG_JSON", default_value_t = false)]
    pub log_json: bool,

    #[arg(long, env = "BOARD_ROWS", default_value_t = 4)]
    pub board_rows: usize,

    #[arg(long, env = "BOARD_COLS", default_value_t = 4)]
    pub board_cols: usize,

    #[arg(long, env = "ARCANA_PAIRS", default_value_t = 3)]
    pub arcana_pairs: usize,

    #[arg(long, env = "REVEAL_DURATION_MS", default_value_t = 900)]
    pub reveal_duration_ms: u64,

    #[arg(long, env = "TURN_LIMIT_SEC", default_value_t = 20)]
    pub turn_limit_sec: u64,

    #[arg(long, env = "TURN_COUNTDOWN_SHOW_SEC", default_value_t = 5)]
    pub turn_countdown_show_sec: u64,

    #[arg(long, env = "RECONNECT_TIMEOUT_SEC", default_value_t = 20)]
    pub reconnect_timeout_sec: u64,

    #[arg(long, env = "AI_PAIR_TIMEOUT_SEC", default_value_t = 8)]
    pub ai_pair_timeout_sec: u64,

    #[arg(long, env = "CLAIRVOYANCE_REVEAL_MS", default_value_t = 2000)]
    pub clairvoyance_reveal_ms: u64,
}

/// Loads `.env`: first a manifest-relative file (useful in `cargo run`
/// from the workspace root during development), then a plain `dotenv()`
/// for the process' working directory.
pub fn load_dotenv() {
    let manifest_env = concat!(env!("CARGO_MANIFEST_DIR"), "/.env");
    let _ = dotenv::from_filename(manifest_env);
    let _ = dotenv::dotenv();
}
