//! Configuration loading from files and environment variables.

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};

use super::Settings;
use crate::error::{ServiceError, ServiceResult};

/// Base name of the optional settings file (`alchemy.toml`, `alchemy.yaml`, ...)
const CONFIG_FILE: &str = "alchemy";

/// Environment prefix, e.g. `ALCHEMY__QUEUE__MAX_WORKERS=4`
const ENV_PREFIX: &str = "ALCHEMY";

pub(crate) fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .try_parsing(true)
}

/// Load settings from the config file and env vars, then validate them.
pub fn load_settings() -> ServiceResult<Settings> {
    settings_from(
        Config::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(environment()),
    )
}

pub(crate) fn settings_from(builder: ConfigBuilder<DefaultState>) -> ServiceResult<Settings> {
    let settings: Settings = builder
        .build()
        .map_err(|e| ServiceError::Config {
            message: format!("Failed to build config: {}", e),
        })?
        .try_deserialize()
        .map_err(|e| ServiceError::Config {
            message: format!("Failed to deserialize settings: {}", e),
        })?;

    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;
    use std::collections::HashMap;
    use std::path::PathBuf;

    use crate::schemas::OutputFormat;

    fn from_toml(toml: &str) -> ServiceResult<Settings> {
        settings_from(Config::builder().add_source(File::from_str(toml, FileFormat::Toml)))
    }

    #[test]
    fn test_empty_sources_give_defaults() {
        let settings = from_toml("").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.queue.max_workers, 2);
        assert_eq!(settings.chunking.chunk_size, 512);
        assert_eq!(settings.chunking.chunk_overlap, 64);
        assert_eq!(settings.crawler.max_links_per_page, 5);
        assert!(settings.import.dir.is_none());
    }

    #[test]
    fn test_file_values_override_defaults() {
        let settings = from_toml(
            r#"
[queue]
max_workers = 4
capacity = 100

[chunking]
chunk_size = 256
default_output_format = "chunks"

[import]
dir = "/srv/inbox"
"#,
        )
        .unwrap();

        assert_eq!(settings.queue.max_workers, 4);
        assert_eq!(settings.queue.capacity, Some(100));
        assert_eq!(settings.queue.retention_secs, 3600);
        assert_eq!(settings.chunking.chunk_size, 256);
        assert_eq!(settings.chunking.chunk_overlap, 64);
        assert_eq!(settings.chunking.default_output_format, OutputFormat::Chunks);
        assert_eq!(
            settings.import.output_dir(),
            Some(PathBuf::from("/srv/inbox/processed"))
        );
    }

    #[test]
    fn test_environment_overrides_file() {
        let env: HashMap<String, String> = [
            ("ALCHEMY__QUEUE__MAX_WORKERS", "8"),
            ("ALCHEMY__FEATURES__LOAD_WEB", "false"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let settings = settings_from(
            Config::builder()
                .add_source(File::from_str("[queue]\nmax_workers = 3", FileFormat::Toml))
                .add_source(environment().source(Some(env))),
        )
        .unwrap();

        assert_eq!(settings.queue.max_workers, 8);
        assert!(!settings.features.load_web);
        assert!(settings.features.load_documents);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let error = from_toml("[chunking]\nchunk_size = 64\nchunk_overlap = 64").unwrap_err();
        assert!(matches!(error, ServiceError::Config { .. }));

        assert!(from_toml("[queue]\nmax_workers = 0").is_err());
        assert!(from_toml("[queue]\nmax_workers = \"many\"").is_err());
    }
}
