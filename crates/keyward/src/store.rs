use crate::{config::KeywardConfig, paths::KeywardPaths};
use eyre::Context as _;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

/// Apply environment variable overrides to the config (endpoints, session window).
fn apply_env_overrides(cfg: &mut KeywardConfig) {
    /// Helper: if an env var is set, apply `setter` with the trimmed value.
    fn apply_env(var: &str, setter: impl FnOnce(&str)) {
        if let Ok(u) = std::env::var(var) {
            setter(u.trim());
        }
    }

    apply_env("KEYWARD_HORIZON_URL", |v| {
        if !v.is_empty() {
            v.clone_into(&mut cfg.network.horizon_url);
        }
    });
    apply_env("KEYWARD_NETWORK_PASSPHRASE", |v| {
        if !v.is_empty() {
            v.clone_into(&mut cfg.network.network_passphrase);
        }
    });
    // An explicitly empty value disables faucet funding.
    apply_env("KEYWARD_FRIENDBOT_URL", |v| {
        cfg.network.friendbot_url = (!v.is_empty()).then(|| v.to_owned());
    });
    apply_env("KEYWARD_SESSION_SECONDS", |v| {
        if let Ok(n) = v.parse::<u64>() {
            if n > 0 {
                cfg.session_seconds = n;
            }
        }
    });
}

impl ConfigStore {
    pub fn new(paths: &KeywardPaths) -> Self {
        Self {
            path: paths.config_file(),
        }
    }

    pub fn load_or_init_default(&self) -> eyre::Result<KeywardConfig> {
        let Some(s) = crate::fsutil::read_to_string_if_exists(&self.path)? else {
            // Persist the plain defaults; env overrides are per-process only.
            let mut cfg = KeywardConfig::default();
            self.save(&cfg)?;
            apply_env_overrides(&mut cfg);
            return Ok(cfg);
        };

        let mut cfg: KeywardConfig = toml::from_str(&s).context("parse config.toml")?;
        apply_env_overrides(&mut cfg);
        Ok(cfg)
    }

    pub fn save(&self, cfg: &KeywardConfig) -> eyre::Result<()> {
        let s = toml::to_string_pretty(cfg).context("serialize config.toml")?;
        crate::fsutil::write_atomic_private(&self.path, s.as_bytes())
            .context("write config.toml")?;
        Ok(())
    }
}
