use crate::config::AppConfig;
use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use std::path::Path;

/// Default location of the keeper's configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/Config.toml";

/// Prefix of environment variables merged over the file.
pub const ENV_PREFIX: &str = "KEEPER_";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads keeper configuration from the default TOML file and environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be read or parsed.
    pub fn load() -> Result<AppConfig> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Loads keeper configuration by layering built-in defaults, a TOML file and
    /// `KEEPER_`-prefixed environment variables (`__` separates nested keys, e.g.
    /// `KEEPER_NETWORKS__MAINNET__ORACLE`).
    ///
    /// A missing file is not an error; every value can come from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file or environment contain values of the wrong shape.
    pub fn load_from(path: impl AsRef<Path>) -> Result<AppConfig> {
        let path = path.as_ref();
        let config: AppConfig = Self::figment(path)
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.display()))?;

        tracing::debug!(
            path = %path.display(),
            networks = config.networks.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).ignore(&["private_key"]).split("__"))
    }
}
