pub mod config {
    use serde::Deserialize;
    use std::path::PathBuf;

    /// Which store to fall back to when no database is configured.
    #[derive(Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
    #[serde(rename_all = "lowercase")]
    pub enum FallbackStorage {
        #[default]
        Memory,
        File,
    }

    #[derive(Deserialize, Debug, Default)]
    pub struct Config {
        /// Connection string for the relational store. Absent or empty means no database.
        #[serde(default)]
        pub database_url: Option<String>,
        #[serde(default = "default_port")]
        pub port: u16,
        #[serde(default)]
        pub storage: FallbackStorage,
        /// Overrides `<cwd>/tasks.json` for the file store.
        #[serde(default)]
        pub tasks_file: Option<PathBuf>,
        /// Directory of built client assets served outside `/api`.
        #[serde(default)]
        pub static_dir: Option<PathBuf>,
    }

    impl Config {
        /// Loads configuration from environment variables.
        pub fn from_env() -> anyhow::Result<Self> {
            let settings = config::Config::builder()
                .add_source(config::Environment::default())
                .build()?;

            let config: Config = settings.try_deserialize()?;
            Ok(config)
        }

        /// Returns the database URL if one is set and not blank.
        pub fn database_url(&self) -> Option<&str> {
            self.database_url
                .as_deref()
                .map(str::trim)
                .filter(|url| !url.is_empty())
        }
    }

    fn default_port() -> u16 {
        5000
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn can_ignore_blank_database_url() {
            let config = Config {
                database_url: Some("   ".to_string()),
                ..Default::default()
            };
            assert_eq!(config.database_url(), None);
        }

        #[test]
        fn can_deserialize_config_from_string_values() {
            let settings = config::Config::builder()
                .set_override("port", "8081")
                .unwrap()
                .set_override("storage", "file")
                .unwrap()
                .set_override("database_url", "postgres://localhost/tasks")
                .unwrap()
                .build()
                .unwrap();

            let config: Config = settings.try_deserialize().unwrap();

            assert_eq!(config.port, 8081);
            assert_eq!(config.storage, FallbackStorage::File);
            assert_eq!(config.database_url(), Some("postgres://localhost/tasks"));
            assert_eq!(config.tasks_file, None);
        }

        #[test]
        fn can_default_to_memory_storage_on_port_5000() {
            let settings = config::Config::builder().build().unwrap();
            let config: Config = settings.try_deserialize().unwrap();

            assert_eq!(config.port, 5000);
            assert_eq!(config.storage, FallbackStorage::Memory);
            assert_eq!(config.database_url(), None);
        }
    }
}
pub mod entities;
pub mod storage;
pub mod task;
pub mod user;
pub mod web;
