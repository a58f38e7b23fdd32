mod settings;

use config::{Config, ConfigError, Environment, File};

use settings::PartialSettings;

pub use settings::{
    LocationSettings, PricingSettings, RealtimeSettings, ServerSettings, Settings,
    StorageSettings,
};

/// Prefix of environment variables read by [`load_config`], e.g.
/// `LIVEDISPATCH__SERVER__PORT=9000`.
pub const ENV_PREFIX: &str = "LIVEDISPATCH";

/// Loads the configuration from the default file and environment variables
/// Merges the configuration with default values
/// Returns a `Settings` struct containing every section of the configuration
pub fn load_config() -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(partial.merge(Settings::default()))
}
