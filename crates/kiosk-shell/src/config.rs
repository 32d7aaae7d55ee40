//! Layered shell configuration.
//!
//! Sources, lowest precedence first:
//!
//! 1. built-in defaults
//! 2. a YAML file (`kiosk.yaml` in the working directory if present, or an
//!    explicit path which must exist)
//! 3. environment variables such as `KIOSK__SERVER__ADDR`
//! 4. command-line overrides

use config::{Config, Environment, File};
use kiosk_core::{Bounds, Pages};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::observability::{LogConfig, LogFormat};

/// Environment variable prefix and nesting separator.
pub const ENV_PREFIX: &str = "KIOSK";
const ENV_SEPARATOR: &str = "__";

/// Complete shell configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    pub server: ServerConfig,
    pub paths: PathsConfig,
    pub pages: Pages,
    pub window: WindowConfig,
    /// Delay between the loading page and the home page, in milliseconds.
    pub splash_ms: u64,
    pub log: LogConfig,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            paths: PathsConfig::default(),
            pages: Pages::default(),
            window: WindowConfig::default(),
            splash_ms: 1000,
            log: LogConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Control server bind address. Must be loopback.
    pub addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: kiosk_server::DEFAULT_ADDR,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Base directory pages are resolved against.
    pub web_root: PathBuf,
    /// Persisted settings object.
    pub settings_file: PathBuf,
    /// Window icon; a missing file is ignored.
    pub icon: PathBuf,
    /// Embedded view data directory.
    pub cache_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            web_root: PathBuf::from("."),
            settings_file: PathBuf::from("kiosk_settings.json"),
            icon: PathBuf::from("icon.png"),
            cache_dir: PathBuf::from("webview-cache"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub x: i32,
    pub y: i32,
    /// Always-on-top grace after entering fullscreen, in milliseconds.
    pub on_top_grace_ms: u64,
}

impl WindowConfig {
    /// Initial windowed geometry.
    pub fn bounds(&self) -> Bounds {
        Bounds::new(self.x, self.y, self.width, self.height)
    }

    pub fn on_top_grace(&self) -> Duration {
        Duration::from_millis(self.on_top_grace_ms)
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Kiosk".to_string(),
            width: 1280,
            height: 720,
            x: 100,
            y: 100,
            on_top_grace_ms: 1000,
        }
    }
}

/// Command-line values that take precedence over every other source.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub addr: Option<SocketAddr>,
    pub web_root: Option<PathBuf>,
    pub settings_file: Option<PathBuf>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
}

impl ShellConfig {
    /// Loads the configuration from all sources.
    ///
    /// Without `file`, `kiosk.yaml` in the working directory is used if it
    /// exists.
    pub fn load(file: Option<&Path>, overrides: &Overrides) -> Result<Self, ConfigError> {
        let environment = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator(ENV_SEPARATOR)
            .separator(ENV_SEPARATOR)
            .try_parsing(true);
        Self::from_sources(file, environment, overrides)
    }

    /// Splash delay between the loading and home pages.
    pub fn splash(&self) -> Duration {
        Duration::from_millis(self.splash_ms)
    }

    fn from_sources(
        file: Option<&Path>,
        environment: Environment,
        overrides: &Overrides,
    ) -> Result<Self, ConfigError> {
        let file = match file {
            Some(path) => File::from(path).required(true),
            None => File::with_name("kiosk").required(false),
        };

        let path_string = |path: &Option<PathBuf>| {
            path.as_ref().map(|p| p.to_string_lossy().into_owned())
        };

        let config = Config::builder()
            .add_source(Config::try_from(&ShellConfig::default())?)
            .add_source(file)
            .add_source(environment)
            .set_override_option("server.addr", overrides.addr.map(|a| a.to_string()))?
            .set_override_option("paths.web_root", path_string(&overrides.web_root))?
            .set_override_option("paths.settings_file", path_string(&overrides.settings_file))?
            .set_override_option("log.level", overrides.log_level.clone())?
            .set_override_option("log.format", overrides.log_format.map(LogFormat::as_str))?
            .build()?;

        let loaded: ShellConfig = config.try_deserialize()?;
        tracing::debug!(?loaded, "Configuration loaded");
        Ok(loaded)
    }
}
