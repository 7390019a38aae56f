pub mod database;
pub mod store;

pub use database::Database;
pub use store::{keys, Store};

use std::path::PathBuf;

/// Returns `~/.config/covisit[-dev]/` based on COVISIT_ENV.
///
/// Set COVISIT_ENV=dev to use the development data directory.
pub fn data_dir() -> Result<PathBuf, std::io::Error> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("COVISIT_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("covisit-dev")
    } else {
        base_dir.join("covisit")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
