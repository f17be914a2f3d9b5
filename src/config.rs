use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// All tournament timing and threshold constants.
///
/// Every field has a default matching the reference rules, so a missing or
/// partial `game.json` still yields a fully working server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub min_capacity: usize,
    pub max_capacity: usize,
    /// Delay between the GAME_PREVIEW broadcast and the round start.
    pub preview_delay_secs: u64,
    /// Delay between ROUND_END and the next GAME_PREVIEW.
    pub intermission_secs: u64,
    /// Tournament ends after this many rounds even if >1 player remains.
    pub elimination_rounds: u32,
    pub math_duration_secs: u64,
    pub typing_duration_secs: u64,
    pub typing_word_count: usize,
    pub race_duration_secs: u64,
    pub race_track_length: i32,
    /// Finish bonuses by rank; ranks past the end get the last entry.
    pub race_finish_bonuses: Vec<i64>,
    /// Honors START_GAME's test_mode flag (bypasses ready checks). Off in
    /// production builds unless explicitly enabled in game.json.
    pub allow_test_mode: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            min_capacity: 5,
            max_capacity: 50,
            preview_delay_secs: 5,
            intermission_secs: 5,
            elimination_rounds: 3,
            math_duration_secs: 20,
            typing_duration_secs: 30,
            typing_word_count: 50,
            race_duration_secs: 90,
            race_track_length: 10,
            race_finish_bonuses: vec![50, 30, 15, 5],
            allow_test_mode: false,
        }
    }
}

impl ServerConfig {
    /// Clamps a requested lobby capacity into the allowed range.
    pub fn clamp_capacity(&self, requested: usize) -> usize {
        requested.clamp(self.min_capacity, self.max_capacity)
    }
}

/// Resolves a path relative to the config directory.
fn config_path(sub: &str) -> PathBuf {
    let base = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config".to_string());
    Path::new(&base).join(sub)
}

/// Load the server configuration, falling back to defaults when the file is
/// missing or unreadable.
pub fn load() -> ServerConfig {
    let path = config_path("game.json");
    match fs::read_to_string(&path) {
        Ok(data) => match serde_json::from_str(&data) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!("Failed to parse {}: {} (using defaults)", path.display(), e);
                ServerConfig::default()
            }
        },
        Err(_) => {
            tracing::info!("No config at {}, using defaults", path.display());
            ServerConfig::default()
        }
    }
}
