use anyhow::Result;
use config::{Config, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct SignConfig {
    pub threads: usize,
    #[serde(default = "default_private_key_file")]
    pub private_key_file: String,
    #[serde(default = "default_failed_keys_file")]
    pub failed_keys_file: String,
    #[serde(default = "default_database_file")]
    pub database_file: String,
    /// Inclusive [min, max] number of schemas to register per key.
    pub schemas_to_create: [u32; 2],
    /// Inclusive [min, max] number of attestations to create per key.
    pub attestations_to_create: [u32; 2],
    /// Inclusive [min, max] pause in seconds between successful creations.
    pub pause_between_creations: [u64; 2],
    #[serde(default)]
    pub use_proxy: bool,
    #[serde(default)]
    pub proxy: Option<String>,
}

fn default_private_key_file() -> String {
    "data/private_keys.txt".to_string()
}

fn default_failed_keys_file() -> String {
    "reports/failed_keys.txt".to_string()
}

fn default_database_file() -> String {
    "schemas.db".to_string()
}

impl SignConfig {
    pub fn load(path: &str) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::with_name(path))
            .build()?;

        settings.try_deserialize().map_err(|e| anyhow::anyhow!(e))
    }

    /// Proxy URL if proxying is enabled and an address is set.
    pub fn proxy_url(&self) -> Option<&str> {
        if self.use_proxy {
            self.proxy.as_deref().filter(|p| !p.is_empty())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_toml(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(SignConfig::load("no/such/config.toml").is_err());
    }

    #[test]
    fn malformed_toml_is_an_error() {
        let file = write_toml("threads = ");
        assert!(SignConfig::load(file.path().to_str().unwrap()).is_err());
    }

    #[test]
    fn loads_ranges_and_defaults() {
        let file = write_toml(
            "threads = 2\n\
             schemas_to_create = [1, 3]\n\
             attestations_to_create = [1, 1]\n\
             pause_between_creations = [0, 0]\n",
        );
        let config = SignConfig::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.threads, 2);
        assert_eq!(config.schemas_to_create, [1, 3]);
        assert_eq!(config.database_file, "schemas.db");
        assert!(config.proxy_url().is_none());
    }
}
