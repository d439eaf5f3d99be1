//! Resolution of the data directory, backend URL and session wiring.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use fieldsync_client::{ApiClient, ClientConfig, LocationTracker, SessionManager};
use fieldsync_core::{BaseUrl, TokenStore};
use fieldsync_store::FileStore;

use crate::platform::{CliPermissions, FileScheduler};

/// Settings remembered between invocations.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    api_url: Option<String>,
}

/// Everything a command needs to reach storage and the backend.
#[derive(Debug)]
pub struct AppContext {
    data_dir: PathBuf,
    api_url: Option<BaseUrl>,
    store: FileStore,
}

impl AppContext {
    /// Resolve from flags/environment, falling back to the platform data
    /// directory and the remembered backend URL.
    pub fn resolve(api_url: Option<&str>, data_dir: Option<&Path>) -> Result<Self> {
        let data_dir = match data_dir {
            Some(dir) => dir.to_path_buf(),
            None => ProjectDirs::from("", "", "fieldsync")
                .context("Could not determine data directory")?
                .data_dir()
                .to_path_buf(),
        };
        fs::create_dir_all(&data_dir).context("Failed to create data directory")?;

        let api_url = match api_url {
            Some(url) => Some(BaseUrl::new(url).context("Invalid API URL")?),
            None => load_settings(&data_dir)?
                .api_url
                .map(|url| BaseUrl::new(url).context("Invalid API URL in settings"))
                .transpose()?,
        };

        let store = FileStore::new(data_dir.join("session"));
        Ok(Self {
            data_dir,
            api_url,
            store,
        })
    }

    pub fn store(&self) -> Arc<dyn TokenStore> {
        Arc::new(self.store.clone())
    }

    pub fn config(&self) -> Result<ClientConfig> {
        match &self.api_url {
            Some(url) => Ok(ClientConfig::new(url.clone())),
            None => bail!("No backend configured. Pass --api-url or set FIELDSYNC_API_URL."),
        }
    }

    /// Persist the backend URL so later commands can omit it.
    pub fn remember_api_url(&self) -> Result<()> {
        let settings = Settings {
            api_url: self.api_url.as_ref().map(|url| url.to_string()),
        };
        let json = serde_json::to_string_pretty(&settings)?;
        fs::write(settings_path(&self.data_dir), json).context("Failed to write settings")?;
        Ok(())
    }

    pub fn scheduler(&self) -> Arc<FileScheduler> {
        Arc::new(FileScheduler::new(self.data_dir.join("tracking.json")))
    }

    pub fn tracker(&self, allow_background: bool) -> LocationTracker {
        LocationTracker::new(
            self.store(),
            self.scheduler(),
            Arc::new(CliPermissions::new(allow_background)),
        )
    }

    /// Build a session manager and restore the stored session.
    pub async fn session(&self, allow_background: bool) -> Result<SessionManager> {
        let client = ApiClient::new(self.config()?, self.store()).context("Failed to build client")?;
        let session = SessionManager::new(client, self.tracker(allow_background));
        session.restore().await;
        Ok(session)
    }

    /// Like [`session`](Self::session), but fails when nobody is logged in.
    pub async fn require_session(&self, allow_background: bool) -> Result<SessionManager> {
        let session = self.session(allow_background).await?;
        if !session.state().is_authenticated() {
            bail!("Not logged in. Run 'fieldsync login' first.");
        }
        Ok(session)
    }
}

fn settings_path(data_dir: &Path) -> PathBuf {
    data_dir.join("settings.json")
}

fn load_settings(data_dir: &Path) -> Result<Settings> {
    let path = settings_path(data_dir);
    if !path.exists() {
        return Ok(Settings::default());
    }

    let json = fs::read_to_string(&path).context("Failed to read settings")?;
    serde_json::from_str(&json).context("Invalid settings file")
}
