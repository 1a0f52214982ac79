mod settings;

use std::path::Path;

use config::{Config, Environment, File};

use crate::utils::error::ConfigError;

pub use settings::{
    BrokerSettings, MessageSettings, OutputFormat, OutputSettings, PartialBrokerSettings,
    PartialMessageSettings, PartialOutputSettings, PartialSettings, PartialTestSettings,
    PartialTlsSettings, Settings, TestSettings, TlsSettings,
};

/// Prefix of environment overrides, e.g. `MQTT_BENCH__TEST__PUBS=4`.
pub const ENV_PREFIX: &str = "MQTT_BENCH";

/// Loads the benchmark settings.
///
/// Sources are layered lowest to highest: built-in defaults, `flags`, the
/// optional config `file`, then `MQTT_BENCH__*` environment variables.
/// The result is validated before it is returned.
pub fn load_config(flags: &PartialSettings, file: Option<&Path>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder().add_source(Config::try_from(flags)?);

    if let Some(path) = file {
        builder = builder.add_source(File::from(path).required(true));
    }

    let config = builder
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    // Merge with defaults
    let settings = partial.merge_over(Settings::default());
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests;
