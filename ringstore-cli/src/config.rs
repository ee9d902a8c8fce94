use serde_derive::{Deserialize, Serialize};

/// Settings loaded from a JSON file given on the command line. Ground:
/// `kv-cli/src/config.rs`'s `ConfigLoad` -- trimmed to the handful of knobs
/// this inspection tool actually has a use for.
#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigLoad {
    pub log_level: Option<String>,
    pub log_dir: Option<String>,
}

impl Default for ConfigLoad {
    fn default() -> Self {
        ConfigLoad { log_level: Some("info".to_string()), log_dir: None }
    }
}

impl ConfigLoad {
    pub fn new(path: &str) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_config_has_info_level() {
        let cfg = ConfigLoad::default();
        assert_eq!(cfg.log_level.as_deref(), Some("info"));
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(ConfigLoad::new("/no/such/file.json").is_err());
    }
}
