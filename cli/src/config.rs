use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::PathBuf;

use basket_core::pricing::DEFAULT_ZIP_CODE;
use basket_core::stores::normalize_zip;

const DEFAULT_USER: &str = "local";

pub struct Config {
    pub db_path: PathBuf,
    pub data_dir: PathBuf,
    /// Owner of the list the CLI works on (`BASKET_USER`).
    pub user_id: String,
    /// ZIP used when none is given (`BASKET_DEFAULT_ZIP`).
    pub default_zip: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        let proj_dirs =
            ProjectDirs::from("", "", "basket").context("Could not determine home directory")?;

        let data_dir = proj_dirs.data_dir().to_path_buf();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        let db_path = data_dir.join("basket.db");
        let (user_id, default_zip) = env_overrides(
            std::env::var("BASKET_USER").ok(),
            std::env::var("BASKET_DEFAULT_ZIP").ok(),
        );
        tracing::debug!(db = %db_path.display(), user = %user_id, zip = %default_zip, "loaded config");

        Ok(Config {
            db_path,
            data_dir,
            user_id,
            default_zip,
        })
    }

    /// Load the API key from disk, or generate a new one.
    ///
    /// Returns `(key, newly_created)` where `newly_created` is true when a
    /// fresh key was just generated (first run).
    pub fn load_or_create_api_key(&self) -> Result<(String, bool)> {
        use rand::Rng;
        use std::fmt::Write;

        let path = self.data_dir.join("api_key");

        if path.exists() {
            let key = std::fs::read_to_string(&path).context("Failed to read API key file")?;
            let key = key.trim().to_string();
            if !key.is_empty() {
                return Ok((key, false));
            }
        }

        let bytes: [u8; 32] = rand::rng().random();
        let key = bytes
            .iter()
            .fold(String::with_capacity(64), |mut acc: String, b| {
                let _ = write!(acc, "{b:02x}");
                acc
            });
        std::fs::write(&path, &key).context("Failed to write API key file")?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
                .context("Failed to set API key file permissions")?;
        }
        tracing::info!(path = %path.display(), "generated new API key");
        Ok((key, true))
    }
}

/// Blank or unusable values fall back to the defaults.
fn env_overrides(user: Option<String>, zip: Option<String>) -> (String, String) {
    let user = user
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| DEFAULT_USER.to_string());
    let zip = zip
        .as_deref()
        .and_then(normalize_zip)
        .unwrap_or_else(|| DEFAULT_ZIP_CODE.to_string());
    (user, zip)
}
