use std::path::PathBuf;

use crate::config::Config;
use color_eyre::Result;
use daybook_storage::JsonFileStore;
use dirs::data_dir;
use tracing::debug;

/// Resolve the default data directory for Daybook.
pub fn default_data_dir() -> Result<PathBuf> {
    let base = data_dir().ok_or_else(|| color_eyre::eyre::eyre!("no data dir available"))?;
    Ok(base.join("daybook"))
}

/// Build the file store, honouring the `data_dir` override.
pub fn store_from_config(config: &Config) -> Result<JsonFileStore> {
    let root = match &config.data_dir {
        Some(root) => root.clone(),
        None => default_data_dir()?,
    };
    debug!(?root, "initializing file store");
    Ok(JsonFileStore::new(root))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_override_sets_store_root() {
        let config = Config {
            data_dir: Some(PathBuf::from("/tmp/daybook-override")),
            ..Config::default()
        };
        let store = store_from_config(&config).expect("store");
        assert_eq!(store.root(), PathBuf::from("/tmp/daybook-override"));
    }
}
