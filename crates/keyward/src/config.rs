use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const HORIZON_TESTNET_URL: &str = "https://horizon-testnet.stellar.org";
pub const FRIENDBOT_URL: &str = "https://friendbot.stellar.org";
pub const TESTNET_PASSPHRASE: &str = "Test SDF Network ; September 2015";

/// Default window for a decrypted key to stay in memory.
pub const DEFAULT_SESSION_SECONDS: u64 = 5 * 60;
/// Upper bound on the unlock window, whatever the config file or environment asks for.
pub const MAX_SESSION_SECONDS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Horizon endpoint that receives signed transactions.
    pub horizon_url: String,
    /// Network passphrase mixed into every transaction signature payload.
    pub network_passphrase: String,
    /// Faucet used to fund freshly created accounts. `None` disables funding.
    pub friendbot_url: Option<String>,
    pub request_timeout_seconds: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            horizon_url: HORIZON_TESTNET_URL.into(),
            network_passphrase: TESTNET_PASSPHRASE.into(),
            friendbot_url: Some(FRIENDBOT_URL.into()),
            request_timeout_seconds: 30,
        }
    }
}

/// Geometry and entry point of the confirmation popup the UI process opens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PopupConfig {
    pub base_url: String,
    pub width: u32,
    pub height: u32,
}

impl Default for PopupConfig {
    fn default() -> Self {
        Self {
            base_url: "index.html".into(),
            width: 400,
            height: 600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct KeywardConfig {
    pub network: NetworkConfig,
    pub popup: PopupConfig,
    /// How long a decrypted key stays in memory after unlock.
    pub session_seconds: u64,
}

impl Default for KeywardConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            popup: PopupConfig::default(),
            session_seconds: DEFAULT_SESSION_SECONDS,
        }
    }
}

impl KeywardConfig {
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_seconds.clamp(1, MAX_SESSION_SECONDS))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.network.request_timeout_seconds.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eyre::Context as _;

    #[test]
    fn partial_toml_falls_back_to_defaults() -> eyre::Result<()> {
        let cfg: KeywardConfig = toml::from_str(
            r#"
            session_seconds = 60

            [network]
            horizon_url = "http://127.0.0.1:8000"
            "#,
        )
        .context("parse config")?;
        assert_eq!(cfg.session_ttl(), Duration::from_secs(60));
        assert_eq!(cfg.network.horizon_url, "http://127.0.0.1:8000");
        assert_eq!(cfg.network.network_passphrase, TESTNET_PASSPHRASE);
        assert_eq!(cfg.popup, PopupConfig::default());
        Ok(())
    }

    #[test]
    fn session_window_is_clamped() {
        let huge = KeywardConfig {
            session_seconds: u64::MAX,
            ..KeywardConfig::default()
        };
        assert_eq!(huge.session_ttl(), Duration::from_secs(MAX_SESSION_SECONDS));

        let zero = KeywardConfig {
            session_seconds: 0,
            ..KeywardConfig::default()
        };
        assert_eq!(zero.session_ttl(), Duration::from_secs(1));
    }

    #[test]
    fn default_session_is_five_minutes() {
        assert_eq!(
            KeywardConfig::default().session_ttl(),
            Duration::from_secs(300)
        );
    }
}
