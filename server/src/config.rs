//! Runtime configuration for the game engine and its server loop.

use clap::ValueEnum;
use shared::{BoardData, SemVer};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_BOARD_WIDTH: u16 = 25;
pub const DEFAULT_BOARD_HEIGHT: u16 = 25;
pub const DEFAULT_APPLE_COUNT: usize = 50;
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(500);
/// Consecutive ticks without a move before a snake is considered disconnected.
pub const DEFAULT_MISSED_TICK_THRESHOLD: u32 = 6;
pub const DEFAULT_MAX_CLIENTS: usize = 32;

/// How strictly a client's version must match the server's.
/// The major part always has to match and the patch part is never compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum VersionPolicy {
    IgnoreMinor,
    #[default]
    ExactMinor,
}

impl VersionPolicy {
    pub fn accepts(self, server: &SemVer, client: &SemVer) -> bool {
        match self {
            VersionPolicy::IgnoreMinor => server.equals_ignoring(client, true, true),
            VersionPolicy::ExactMinor => server.equals_ignoring(client, false, true),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("board dimensions must be at least 1x1, got {width}x{height}")]
    BoardTooSmall { width: u16, height: u16 },
    #[error("tick interval must be greater than zero")]
    ZeroTickInterval,
    #[error("at least one client must be allowed to connect")]
    NoClients,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameConfig {
    pub board_width: u16,
    pub board_height: u16,
    /// Apples kept on the board at all times.
    pub apple_count: usize,
    pub tick_interval: Duration,
    pub missed_tick_threshold: u32,
    pub max_clients: usize,
    pub version_policy: VersionPolicy,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            board_width: DEFAULT_BOARD_WIDTH,
            board_height: DEFAULT_BOARD_HEIGHT,
            apple_count: DEFAULT_APPLE_COUNT,
            tick_interval: DEFAULT_TICK_INTERVAL,
            missed_tick_threshold: DEFAULT_MISSED_TICK_THRESHOLD,
            max_clients: DEFAULT_MAX_CLIENTS,
            version_policy: VersionPolicy::default(),
        }
    }
}

impl GameConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.board_width < 1 || self.board_height < 1 {
            return Err(ConfigError::BoardTooSmall {
                width: self.board_width,
                height: self.board_height,
            });
        }
        if self.tick_interval.is_zero() {
            return Err(ConfigError::ZeroTickInterval);
        }
        if self.max_clients == 0 {
            return Err(ConfigError::NoClients);
        }
        Ok(())
    }

    pub fn board_data(&self) -> BoardData {
        BoardData {
            width: self.board_width,
            height: self.board_height,
        }
    }
}
