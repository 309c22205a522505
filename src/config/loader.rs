use anyhow::{anyhow, Context, Result};
use ::config::{Config, Environment, File, FileFormat};
use std::path::Path;
use tracing::{debug, info};

use super::runtime::EngineConfig;

const ENV_PREFIX: &str = "STACKER";

/// Load `.env`, then layer an optional TOML file and `STACKER_*` environment
/// overrides (`STACKER_FOLDS__N_FOLDS=8`) over the defaults.
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    if let Ok(env_file) = dotenvy::dotenv() {
        debug!("Loaded environment from {:?}", env_file);
    }
    let config = build_config(path)?;
    info!(
        "Configuration loaded: profile={}, n_folds={}, embargo={}, {} learners",
        config.profile.name(),
        config.folds.n_folds,
        config.folds.embargo,
        config.learner_specs().len()
    );
    Ok(config)
}

pub fn build_config(path: Option<&Path>) -> Result<EngineConfig> {
    let mut builder = Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
    }
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    let config: EngineConfig = builder
        .build()
        .context("Failed to read configuration sources")?
        .try_deserialize()
        .context("Failed to parse configuration")?;

    config
        .validate()
        .map_err(|errors| anyhow!("Invalid configuration: {}", errors.join("; ")))?;
    Ok(config)
}

/// Default configuration with the learner preset written out, as TOML
pub fn render_default() -> Result<String> {
    toml::to_string_pretty(&EngineConfig::default().resolved()).context("Failed to render default configuration")
}
