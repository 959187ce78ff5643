mod config;
pub mod database;
pub mod migrations;

pub use config::{AlarmConfig, ChallengeConfig, Config, EscalationConfig};
pub use database::Database;

use std::path::PathBuf;

/// Returns the data directory, creating it when missing.
///
/// Resolution order:
/// 1. `NOOZE_DATA_DIR` if set.
/// 2. `~/.config/nooze-dev/` when `NOOZE_ENV=dev`.
/// 3. `~/.config/nooze/`.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> std::io::Result<PathBuf> {
    let dir = match std::env::var_os("NOOZE_DATA_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");

            let env = std::env::var("NOOZE_ENV").unwrap_or_else(|_| "production".to_string());

            if env == "dev" {
                base_dir.join("nooze-dev")
            } else {
                base_dir.join("nooze")
            }
        }
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
