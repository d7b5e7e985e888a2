//! Shared types, error model, and configuration for gobracket.
//!
//! This crate is the foundation depended on by all other gobracket crates.
//! It provides:
//! - [`GoBracketError`] — the unified error type
//! - API record types ([`Player`], [`Round`], [`Game`], [`Page`], ...)
//! - Configuration ([`AppConfig`], [`SchedulerConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    ApiConfig, AppConfig, DEFAULT_TOURNAMENT_ID, RenderDefaults, SchedulerConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from,
};
pub use error::{GoBracketError, Result};
pub use types::{
    Game, GameData, GameId, GamePlayers, Match, Page, Participant, Player, PlayerId, Round,
};
