use crate::storage::{Storage, ALL_ACCOUNTS, APPLICATION_STATE, KEY_ID};
use eyre::Context as _;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Onboarding progress, persisted as a plain string.
///
/// `LOADING`, `STARTED` and `ERROR` are written with an `APPLICATION_` prefix; the bare names are
/// still read back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplicationState {
    #[serde(rename = "APPLICATION_LOADING", alias = "LOADING")]
    Loading,
    #[default]
    #[serde(rename = "APPLICATION_STARTED", alias = "STARTED")]
    Started,
    #[serde(rename = "PASSWORD_CREATED")]
    PasswordCreated,
    #[serde(rename = "MNEMONIC_PHRASE_CONFIRMED")]
    MnemonicPhraseConfirmed,
    #[serde(rename = "MNEMONIC_PHRASE_FAILED")]
    MnemonicPhraseFailed,
    #[serde(rename = "APPLICATION_ERROR", alias = "ERROR")]
    Error,
}

impl ApplicationState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Loading => "APPLICATION_LOADING",
            Self::Started => "APPLICATION_STARTED",
            Self::PasswordCreated => "PASSWORD_CREATED",
            Self::MnemonicPhraseConfirmed => "MNEMONIC_PHRASE_CONFIRMED",
            Self::MnemonicPhraseFailed => "MNEMONIC_PHRASE_FAILED",
            Self::Error => "APPLICATION_ERROR",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        [
            Self::Loading,
            Self::Started,
            Self::PasswordCreated,
            Self::MnemonicPhraseConfirmed,
            Self::MnemonicPhraseFailed,
            Self::Error,
        ]
        .into_iter()
        .find(|st| st.as_str() == s || st.as_str().strip_prefix("APPLICATION_") == Some(s))
    }

    const fn rank(self) -> u8 {
        match self {
            Self::Loading => 0,
            Self::Started | Self::Error => 1,
            Self::PasswordCreated => 2,
            Self::MnemonicPhraseFailed => 3,
            Self::MnemonicPhraseConfirmed => 4,
        }
    }

    /// The further along of `self` and `other`.
    pub const fn at_least(self, other: Self) -> Self {
        if other.rank() > self.rank() {
            other
        } else {
            self
        }
    }
}

/// One entry in the persisted account list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountEntry {
    pub public_key: String,
    pub key_id: String,
    /// Imported from a raw secret rather than derived from the wallet mnemonic.
    #[serde(default)]
    pub imported: bool,
}

/// Whether an adopted key joins the current account list or starts a new wallet's list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountList {
    Extend,
    Replace,
}

/// Typed view over the plain-string keys the routers persist.
#[derive(Debug, Clone)]
pub struct Persisted {
    storage: Arc<dyn Storage>,
}

impl Persisted {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub fn application_state(&self) -> eyre::Result<ApplicationState> {
        let Some(raw) = self.storage.get(APPLICATION_STATE)? else {
            return Ok(ApplicationState::default());
        };
        Ok(ApplicationState::parse(&raw).unwrap_or_else(|| {
            warn!(state = %raw, "unrecognized application state");
            ApplicationState::Error
        }))
    }

    pub fn set_application_state(&self, state: ApplicationState) -> eyre::Result<()> {
        self.storage.set(APPLICATION_STATE, state.as_str())?;
        info!(state = state.as_str(), "application state changed");
        Ok(())
    }

    pub fn active_key_id(&self) -> eyre::Result<Option<String>> {
        self.storage.get(KEY_ID)
    }

    pub fn set_active_key_id(&self, id: &str) -> eyre::Result<()> {
        self.storage.set(KEY_ID, id)
    }

    pub fn accounts(&self) -> eyre::Result<Vec<AccountEntry>> {
        let Some(raw) = self.storage.get(ALL_ACCOUNTS)? else {
            return Ok(Vec::new());
        };
        serde_json::from_str(&raw).context("parse allAccounts")
    }

    pub fn set_accounts(&self, accounts: &[AccountEntry]) -> eyre::Result<()> {
        let s = serde_json::to_string(accounts).context("serialize allAccounts")?;
        self.storage.set(ALL_ACCOUNTS, &s)
    }

    pub fn public_keys(&self) -> eyre::Result<Vec<String>> {
        Ok(self
            .accounts()?
            .into_iter()
            .map(|a| a.public_key)
            .collect())
    }

    /// Record `entry` in the account list and make it the active key.
    ///
    /// The list is written before `keyId`, so a failed write never leaves `keyId` naming a
    /// record the list does not know about.
    pub fn activate_account(&self, entry: AccountEntry, list: AccountList) -> eyre::Result<()> {
        let mut accounts = match list {
            AccountList::Extend => self.accounts()?,
            AccountList::Replace => Vec::new(),
        };
        let key_id = entry.key_id.clone();
        match accounts.iter_mut().find(|a| a.public_key == entry.public_key) {
            Some(existing) => *existing = entry,
            None => accounts.push(entry),
        }
        self.set_accounts(&accounts)?;
        self.set_active_key_id(&key_id)
    }
}
