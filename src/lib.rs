pub mod ai;
pub mod auth;
pub mod board;
pub mod config;
pub mod db;
pub mod elo;
pub mod game;
pub mod hub;
pub mod matchmaker;
pub mod persistence;
pub mod powerups;
pub mod server;
pub mod session;
pub mod tokio_tools;
pub mod wire;
