use crate::config::IndexOptions;
use crate::entry::Entry;
use crate::error::{Error, Result};
use crate::hash_storage::HashStorage;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const DEFAULT_INDEX_DIR: &str = "./hash_index";

const INDEX_DIR_ENV: &str = "RUSTY_EXT_HASH_DIR";
const CLUSTER_SIZE_ENV: &str = "RUSTY_EXT_HASH_CLUSTER";

/// The index the shell works against.
pub type Store = HashStorage<Entry>;

/// Where the shell keeps its index and how it is shaped.
#[derive(Debug, Clone, PartialEq)]
pub struct ShellConfig {
    pub dir: PathBuf,
    pub options: IndexOptions,
}

impl ShellConfig {
    /// Reads `RUSTY_EXT_HASH_DIR` and `RUSTY_EXT_HASH_CLUSTER`, falling back
    /// to `./hash_index` and the default cluster size.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(
            std::env::var(INDEX_DIR_ENV).ok(),
            std::env::var(CLUSTER_SIZE_ENV).ok(),
        )
    }

    fn from_vars(dir: Option<String>, cluster_size: Option<String>) -> Result<Self> {
        let mut options = IndexOptions::default();
        if let Some(raw) = cluster_size {
            options.cluster_size = raw.trim().parse().map_err(|_| {
                Error::InvalidArgument(format!(
                    "{} must be a number, got `{}`",
                    CLUSTER_SIZE_ENV, raw
                ))
            })?;
        }
        Ok(Self {
            dir: PathBuf::from(dir.unwrap_or_else(|| DEFAULT_INDEX_DIR.to_string())),
            options,
        })
    }
}

/// Installs the log subscriber, filtered by `RUST_LOG` and quiet by default.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Opens the index described by `config`, creating it on first use.
pub async fn setup_db(config: &ShellConfig) -> Result<Store> {
    HashStorage::open_or_create(&config.dir, config.options).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_env() {
        let config = ShellConfig::from_vars(None, None).unwrap();
        assert_eq!(config.dir, PathBuf::from(DEFAULT_INDEX_DIR));
        assert_eq!(config.options, IndexOptions::default());
    }

    #[test]
    fn reads_dir_and_cluster_size() {
        let config = ShellConfig::from_vars(Some("/tmp/idx".into()), Some(" 512 ".into())).unwrap();
        assert_eq!(config.dir, PathBuf::from("/tmp/idx"));
        assert_eq!(config.options.cluster_size, 512);
        assert!(ShellConfig::from_vars(None, Some("big".into())).is_err());
    }
}
