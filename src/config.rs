use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// location of the config file, relative to $HOME
const CONFIG_PATH: &str = ".config/geoshard/config.toml";

const CONFIG_ENV: &str = "GEOSHARD_CONFIG";
const PORT_ENV: &str = "GEOSHARD_PORT";
const HOST_ENV: &str = "GEOSHARD_HOST";
const STORE_ENV: &str = "GEOSHARD_STORE";

fn default_port() -> u16 {
    63020
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_store() -> PathBuf {
    "store".into()
}

/// Configuration of the service
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Config {
    /// The port the HTTP server listens on
    #[serde(default = "default_port")]
    pub port: u16,

    /// The address the HTTP server binds to
    #[serde(default = "default_host")]
    pub host: String,

    /// The directory of the chunk store
    #[serde(default = "default_store")]
    pub store: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            store: default_store(),
        }
    }
}

impl Config {
    /// Load the configuration. Values from the environment override the
    /// config file ($GEOSHARD_CONFIG or $HOME/.config/geoshard/config.toml),
    /// missing values fall back to defaults. Command line flags are applied
    /// on top by the caller.
    pub fn load() -> Result<Self> {
        let path = match std::env::var_os(CONFIG_ENV) {
            Some(path) => Some(PathBuf::from(path)),
            None => std::env::var_os("HOME").map(|home| Path::new(&home).join(CONFIG_PATH)),
        };

        let mut config = match path {
            Some(ref path) if path.exists() => {
                let contents = std::fs::read_to_string(path)
                    .with_context(|| format!("unable to read configuration file at {path:?}"))?;
                toml::from_str(&contents).context("configuration malformed")?
            }
            _ => Config::default(),
        };

        if let Ok(port) = std::env::var(PORT_ENV) {
            config.port = port
                .parse()
                .with_context(|| format!("{PORT_ENV} is not a valid port: `{port}'"))?;
        }
        if let Ok(host) = std::env::var(HOST_ENV) {
            config.host = host;
        }
        if let Ok(store) = std::env::var(STORE_ENV) {
            config.store = store.into();
        }

        Ok(config)
    }
}
