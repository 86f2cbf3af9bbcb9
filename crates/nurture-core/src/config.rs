use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{NurtureError, Result};

/// Placeholder secret shipped in the default config. The server refuses to
/// start with it outside of dev mode.
pub const DEV_SECRET: &str = "change-me";

/// Top-level configuration for the Nurture server.
///
/// Loaded from `~/.nurture/config.toml` by default. Every section falls back
/// to its defaults when omitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NurtureConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

impl NurtureConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: NurtureConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| NurtureError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Overlay secrets and credentials from environment variables.
    ///
    /// Secrets rarely belong in a config file checked into deployment repos,
    /// so each one has an env var that wins over the file value.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Same as [`apply_env_overrides`](Self::apply_env_overrides) with an
    /// injectable lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = non_empty("NURTURE_ACCESS_TOKEN_SECRET") {
            self.auth.access_token_secret = v;
        }
        if let Some(v) = non_empty("NURTURE_REFRESH_TOKEN_SECRET") {
            self.auth.refresh_token_secret = v;
        }
        if let Some(v) = non_empty("CLOUDINARY_CLOUD_NAME") {
            self.media.cloud_name = v;
        }
        if let Some(v) = non_empty("CLOUDINARY_API_KEY") {
            self.media.api_key = v;
        }
        if let Some(v) = non_empty("CLOUDINARY_API_SECRET") {
            self.media.api_secret = v;
        }
        if let Some(v) = non_empty("GEMINI_API_KEY") {
            self.chat.api_key = v;
        }
    }

    /// Reject configurations that would run with placeholder or identical
    /// token secrets.
    pub fn validate_secrets(&self) -> Result<()> {
        let auth = &self.auth;
        for (name, secret) in [
            ("access_token_secret", &auth.access_token_secret),
            ("refresh_token_secret", &auth.refresh_token_secret),
        ] {
            if secret.trim().is_empty() || secret == DEV_SECRET {
                return Err(NurtureError::Config(format!(
                    "auth.{} must be set to a non-default value",
                    name
                )));
            }
        }
        if auth.access_token_secret == auth.refresh_token_secret {
            return Err(NurtureError::Config(
                "access and refresh token secrets must differ".to_string(),
            ));
        }
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory for the SQLite database and disk media.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.nurture/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,
    /// Listen port.
    pub port: u16,
    /// Dashboard / app origins allowed to send credentialed requests.
    pub cors_origins: Vec<String>,
    /// Maximum auth requests per second across all clients.
    pub rate_limit_per_sec: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            cors_origins: vec![
                "http://localhost:5173".to_string(),
                "http://localhost:8081".to_string(),
            ],
            rate_limit_per_sec: 20,
        }
    }
}

/// Token and password settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub access_token_secret: String,
    /// Access token lifetime in minutes.
    pub access_token_expiry_mins: i64,
    pub refresh_token_secret: String,
    /// Refresh token lifetime in days.
    pub refresh_token_expiry_days: i64,
    /// Set the `Secure` attribute on session cookies.
    pub cookie_secure: bool,
    /// Session cookie Max-Age in days.
    pub cookie_max_age_days: i64,
    /// bcrypt work factor.
    pub bcrypt_cost: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            access_token_secret: DEV_SECRET.to_string(),
            access_token_expiry_mins: 24 * 60,
            refresh_token_secret: DEV_SECRET.to_string(),
            refresh_token_expiry_days: 10,
            cookie_secure: true,
            cookie_max_age_days: 7,
            bcrypt_cost: 10,
        }
    }
}

/// Media host selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaProvider {
    /// Files written under `disk_dir`, served from `public_base_url`.
    #[default]
    Disk,
    /// Cloudinary signed uploads.
    Cloudinary,
}

/// Media upload settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    pub provider: MediaProvider,
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    /// Remote folder uploads are placed in.
    pub folder: String,
    /// Directory for the disk provider. Relative paths resolve against the data dir.
    pub disk_dir: String,
    /// URL prefix under which disk uploads are reachable.
    pub public_base_url: String,
    /// Per-file upload limit in bytes.
    pub max_upload_bytes: usize,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            provider: MediaProvider::Disk,
            cloud_name: String::new(),
            api_key: String::new(),
            api_secret: String::new(),
            folder: "nurture".to_string(),
            disk_dir: "media".to_string(),
            public_base_url: "http://localhost:8000/media".to_string(),
            max_upload_bytes: 5 * 1024 * 1024,
        }
    }
}

/// Chatbot settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub enabled: bool,
    pub api_key: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: String::new(),
            model: "gemini-1.5-flash".to_string(),
            timeout_secs: 30,
        }
    }
}

impl ChatConfig {
    /// The chatbot only runs when enabled and a key is present.
    pub fn is_available(&self) -> bool {
        self.enabled && !self.api_key.trim().is_empty()
    }
}
