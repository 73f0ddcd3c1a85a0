use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use cofound_shared::Role;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub user_id: Uuid,
    pub username: String,
    pub role: Role,
}

impl AuthTokens {
    /// Get the path to the auth token file
    fn token_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not find config directory")?
            .join("cofound");

        fs::create_dir_all(&config_dir)
            .context("Could not create config directory")?;

        Ok(config_dir.join("auth.json"))
    }

    /// Load tokens from the default location
    pub fn load() -> Result<Option<Self>> {
        Self::load_from(&Self::token_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(path)
            .context("Could not read auth file")?;

        let tokens: Self = serde_json::from_str(&contents)
            .context("Could not parse auth file")?;

        Ok(Some(tokens))
    }

    /// Save tokens to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::token_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)
            .context("Could not serialize tokens")?;

        fs::write(path, contents)
            .context("Could not write auth file")?;

        Ok(())
    }

    /// Delete stored tokens
    pub fn delete() -> Result<()> {
        let path = Self::token_path()?;

        if path.exists() {
            fs::remove_file(&path)
                .context("Could not delete auth file")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_survive_a_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.json");
        assert!(AuthTokens::load_from(&path).unwrap().is_none());

        let tokens = AuthTokens {
            access_token: "access".into(),
            refresh_token: "refresh".into(),
            user_id: Uuid::new_v4(),
            username: "alice".into(),
            role: Role::Founder,
        };
        tokens.save_to(&path).unwrap();

        let loaded = AuthTokens::load_from(&path).unwrap().unwrap();
        assert_eq!(loaded.user_id, tokens.user_id);
        assert_eq!(loaded.role, Role::Founder);
    }
}
