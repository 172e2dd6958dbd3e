// =============================================================================
// Session store — API credential persistence
// =============================================================================
//
// Keeps the api_key / api_secret / access_token triples produced by the login
// flow (which lives outside this process). Entries are append-only; the
// newest entry is the active one. Secrets are never logged.
// =============================================================================

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// One stored credential triple.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiCredentials {
    pub api_key: String,
    pub api_secret: String,
    #[serde(default)]
    pub access_token: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// JSON-file-backed credential store.
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The newest stored credential triple, if any.
    pub fn get_latest(&self) -> Result<Option<ApiCredentials>> {
        Ok(self.load()?.pop())
    }

    /// Append a new credential pair. The access token is filled in later by
    /// `set_access_token` once the login flow completes.
    pub fn save(&self, api_key: impl Into<String>, api_secret: impl Into<String>) -> Result<()> {
        let mut entries = self.load()?;
        entries.push(ApiCredentials {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            access_token: None,
            created_at: Utc::now(),
        });
        self.persist(&entries)?;
        info!(path = %self.path.display(), "credentials saved");
        Ok(())
    }

    /// Attach an access token to the newest entry. A missing entry is a
    /// warning, not an error, mirroring an UPDATE that matches no row.
    pub fn set_access_token(&self, access_token: impl Into<String>) -> Result<()> {
        let mut entries = self.load()?;
        match entries.last_mut() {
            Some(entry) => {
                entry.access_token = Some(access_token.into());
                self.persist(&entries)?;
                info!(path = %self.path.display(), "access token updated");
            }
            None => {
                warn!(path = %self.path.display(), "no stored credentials; access token not saved");
            }
        }
        Ok(())
    }

    fn load(&self) -> Result<Vec<ApiCredentials>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read credentials from {}", self.path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse credentials from {}", self.path.display()))
    }

    /// Atomic write: tmp sibling file, then rename.
    fn persist(&self, entries: &[ApiCredentials]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create credentials dir {}", parent.display())
                })?;
            }
        }

        let content = serde_json::to_string_pretty(entries)
            .context("failed to serialise credentials to JSON")?;

        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp credentials to {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("failed to rename tmp credentials to {}", self.path.display()))?;
        Ok(())
    }
}
