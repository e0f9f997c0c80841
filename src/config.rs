//! Application configuration.
//!
//! Built-in defaults overlaid with an optional TOML file. Every field the
//! file may set is optional; anything absent keeps its default, so an
//! empty or missing file yields a fully working configuration pointed at
//! the public catalog.

use std::path::PathBuf;

use serde::Deserialize;
use url::Url;
use uuid::Uuid;

use crate::error::Result;

/// Catalog API used when the configuration file does not name one.
const DEFAULT_CATALOG_URL: &str = "https://saavn.dev/";

#[derive(Clone, Debug)]
pub struct Config {
    pub app_name: String,
    pub app_version: String,
    pub app_lang: String,

    pub device_id: Uuid,

    pub user_agent: String,

    /// Base URL of the catalog API; endpoints are joined against it, so a
    /// trailing slash is required and enforced on load.
    pub catalog_url: Url,

    /// Websocket endpoint for activity broadcast; `None` disables presence.
    pub presence_url: Option<Url>,

    /// Base URL of the persistence service for play history; `None`
    /// disables history recording.
    pub persistence_url: Option<Url>,

    /// Account identifier attached to presence updates.
    pub user_id: String,

    /// Directory for the offline blob store.
    pub cache_dir: PathBuf,

    /// Initial state of the autoplay flag.
    pub autoplay: bool,
}

/// Optional overrides as they appear in the configuration file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    catalog_url: Option<Url>,
    presence_url: Option<Url>,
    persistence_url: Option<Url>,
    user_id: Option<String>,
    cache_dir: Option<PathBuf>,
    autoplay: Option<bool>,
}

impl Default for Config {
    /// Built-in defaults with a random device identity.
    ///
    /// # Panics
    ///
    /// Panics when the compiled-in application name or version would form
    /// an invalid `User-Agent` string.
    fn default() -> Self {
        let app_name = env!("CARGO_PKG_NAME").to_owned();
        let app_version = env!("CARGO_PKG_VERSION").to_owned();
        let app_lang = "en".to_owned();

        let device_id = Uuid::new_v4();

        // Additional `User-Agent` string checks on top of `reqwest::HeaderValue`.
        let illegal_chars = |chr| chr == '/' || chr == ';';
        if app_name.is_empty()
            || app_name.contains(illegal_chars)
            || app_version.is_empty()
            || app_version.contains(illegal_chars)
            || app_lang.chars().count() != 2
            || app_lang.contains(illegal_chars)
        {
            panic!(
                "application name, version and/or language invalid (\"{app_name}\"; \"{app_version}\"; \"{app_lang}\")"
            );
        }

        let os_name = std::env::consts::OS;
        let user_agent = format!("{app_name}/{app_version} (Rust; {os_name}; {app_lang})");
        trace!("user agent: {user_agent}");

        let catalog_url = Url::parse(DEFAULT_CATALOG_URL).expect("default catalog url is valid");

        Self {
            app_name,
            app_version,
            app_lang,

            device_id,

            user_agent,

            catalog_url,
            presence_url: None,
            persistence_url: None,
            user_id: device_id.to_string(),
            cache_dir: PathBuf::from("cache"),
            autoplay: true,
        }
    }
}

impl Config {
    /// Loads the configuration, overlaying `file` on the defaults.
    ///
    /// A missing file is not an error: the defaults apply and a hint is
    /// logged.
    ///
    /// # Errors
    ///
    /// Returns `Err` when the file exists but cannot be read or parsed, or
    /// when the resulting catalog URL cannot be a base for endpoints.
    pub fn from_file(file: &str) -> Result<Self> {
        let mut config = Self::default();

        match std::fs::read_to_string(file) {
            Ok(contents) => {
                let overrides: FileConfig = toml::from_str(&contents)?;
                config.apply(overrides);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("no configuration file at {file}; using defaults");
            }
            Err(e) => return Err(e.into()),
        }

        // `Url::join` drops the last path segment unless the base ends in
        // a slash.
        if !config.catalog_url.path().ends_with('/') {
            let path = format!("{}/", config.catalog_url.path());
            config.catalog_url.set_path(&path);
        }

        Ok(config)
    }

    fn apply(&mut self, overrides: FileConfig) {
        if let Some(catalog_url) = overrides.catalog_url {
            self.catalog_url = catalog_url;
        }
        if let Some(user_id) = overrides.user_id {
            self.user_id = user_id;
        }
        if let Some(cache_dir) = overrides.cache_dir {
            self.cache_dir = cache_dir;
        }
        if let Some(autoplay) = overrides.autoplay {
            self.autoplay = autoplay;
        }
        self.presence_url = overrides.presence_url.or(self.presence_url.take());
        self.persistence_url = overrides.persistence_url.or(self.persistence_url.take());
    }
}
