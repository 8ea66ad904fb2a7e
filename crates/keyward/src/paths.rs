use directories::ProjectDirs;
use eyre::ContextCompat as _;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct KeywardPaths {
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
    pub log_file: PathBuf,
}

impl KeywardPaths {
    pub fn discover() -> eyre::Result<Self> {
        // Test/CI override knobs.
        if let (Ok(data_dir), Ok(config_dir)) = (
            std::env::var("KEYWARD_DATA_DIR"),
            std::env::var("KEYWARD_CONFIG_DIR"),
        ) {
            return Ok(Self::at(PathBuf::from(config_dir), PathBuf::from(data_dir)));
        }

        let proj =
            ProjectDirs::from("", "", "keyward").context("failed to resolve project dirs")?;
        Ok(Self::at(
            proj.config_dir().to_path_buf(),
            proj.data_dir().to_path_buf(),
        ))
    }

    pub fn at(config_dir: PathBuf, data_dir: PathBuf) -> Self {
        let log_file = data_dir.join("keyward.log.jsonl");
        Self {
            config_dir,
            data_dir,
            log_file,
        }
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    /// Durable origin-scoped key/value storage (key ids, application state, whitelist, vault).
    pub fn storage_file(&self) -> PathBuf {
        self.data_dir.join("storage.json")
    }

    pub fn storage_lock_file(&self) -> PathBuf {
        self.data_dir.join("storage.lock")
    }

    pub fn ensure_private_dirs(&self) -> eyre::Result<()> {
        crate::fsutil::ensure_private_dir(&self.config_dir)?;
        crate::fsutil::ensure_private_dir(&self.data_dir)?;
        Ok(())
    }
}
