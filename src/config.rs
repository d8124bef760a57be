//! Service configuration. Loaded once at start-up and handed to the HTTP
//! server as `web::Data<Settings>`.

use anyhow::Result;
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Config file read when no path is given on the command line
pub const DEFAULT_CONFIG_FILE: &str = "colorscale.toml";

/// Upper bound on a remote image download, in seconds
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 25;

/// Largest accepted JSON body. Inline images are base 64, so this is generous
pub const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Settings {
    /// Interface the HTTP server binds to
    pub host: String,

    /// Port the HTTP server binds to
    pub port: u16,

    /// Shared secret expected in the `x-api-key` header. Empty disables auth
    pub api_key: String,

    pub fetch_timeout_secs: u64,

    /// Extra PEM certificates trusted when downloading `image_url`
    pub ca_bundle: Option<PathBuf>,

    pub max_body_bytes: usize,

    /// `tracing_subscriber::EnvFilter` directives
    pub log: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            host: "0.0.0.0".into(),
            port: 8080,
            api_key: String::new(),
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            ca_bundle: None,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            log: "info,actix_web=info".into(),
        }
    }
}

impl Settings {
    /// Load settings from defaults, then the optional TOML file at `path`,
    /// then the process environment (`API_KEY`, `PORT`, ...)
    pub fn load(path: Option<&str>) -> Result<Self> {
        Self::load_from(path, Environment::default())
    }

    fn load_from(path: Option<&str>, env: Environment) -> Result<Self> {
        let defaults = Settings::default();
        let path = path.unwrap_or(DEFAULT_CONFIG_FILE);

        let settings = Config::builder()
            .set_default("host", defaults.host)?
            .set_default("port", defaults.port as i64)?
            .set_default("api_key", defaults.api_key)?
            .set_default("fetch_timeout_secs", defaults.fetch_timeout_secs as i64)?
            .set_default("max_body_bytes", defaults.max_body_bytes as i64)?
            .set_default("log", defaults.log)?
            .add_source(File::new(path, FileFormat::Toml).required(false))
            .add_source(env)
            .build()?
            .try_deserialize::<Settings>()?;

        Ok(settings)
    }

    /// Whether `/analyze-strip` requires a matching `x-api-key`
    pub fn auth_enabled(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// Check a presented `x-api-key` value against the shared secret
    pub fn authorize(&self, presented: &str) -> bool {
        !self.auth_enabled() || presented == self.api_key
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn bind_addr(&self) -> (String, u16) {
        (self.host.clone(), self.port)
    }
}
