//! Requests from the wallet's own UI. Trusted, but every secret still goes through the vault.

use super::{
    error_response,
    messages::{InternalRequest, Reply, Response},
    resolve,
    state::{AccountEntry, AccountList, ApplicationState},
    Background,
};
use crate::{
    errors::{KeywardError, MSG_NO_KEY},
    keys::{self, Keypair},
    queue::RequestId,
    session::Session,
    vault::{KeyExtra, KeyPayload},
};
use secrecy::SecretString;
use serde_json::Value;
use tracing::{debug, info, warn};

/// 128 bits of entropy, i.e. a 12-word phrase.
const MNEMONIC_ENTROPY_BITS: usize = 128;

impl Background {
    pub(super) async fn handle_internal(&mut self, message: Value) -> Reply {
        let req = match serde_json::from_value::<InternalRequest>(message) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "malformed internal request");
                return Reply::None;
            }
        };

        let (op, result) = match req {
            InternalRequest::CreateAccount { password } => (
                "createAccount",
                self.create_account(&SecretString::from(password)).await,
            ),
            InternalRequest::ImportAccount {
                password,
                private_key,
            } => (
                "importAccount",
                self.import_account(&SecretString::from(password), &private_key),
            ),
            InternalRequest::AddAccount { password } => (
                "addAccount",
                self.add_account(&SecretString::from(password)),
            ),
            InternalRequest::RecoverAccount {
                password,
                recover_mnemonic,
            } => (
                "recoverAccount",
                self.recover_account(&SecretString::from(password), &recover_mnemonic),
            ),
            InternalRequest::LoadAccount => ("loadAccount", self.load_account()),
            InternalRequest::GetMnemonicPhrase => ("getMnemonicPhrase", self.mnemonic_phrase()),
            InternalRequest::ConfirmPassword { password } => (
                "confirmPassword",
                self.confirm_password(&SecretString::from(password)),
            ),
            InternalRequest::ConfirmMnemonicPhrase {
                mnemonic_phrase_to_confirm,
            } => (
                "confirmMnemonicPhrase",
                self.confirm_mnemonic_phrase(&mnemonic_phrase_to_confirm),
            ),
            InternalRequest::GrantAccess { url, request_id } => {
                ("grantAccess", self.grant_access(&url, request_id))
            }
            InternalRequest::RejectAccess { request_id } => {
                ("rejectAccess", self.reject_access(request_id))
            }
            InternalRequest::SignTransaction { request_id } => {
                return Reply::Now(self.sign_transaction(request_id).await);
            }
            InternalRequest::RejectTransaction { request_id } => {
                ("rejectTransaction", self.reject_transaction(request_id))
            }
            InternalRequest::SignOut => return Reply::Now(self.sign_out()),
            InternalRequest::Unknown => {
                debug!("ignoring unknown internal request type");
                return Reply::None;
            }
        };

        Reply::Now(result.unwrap_or_else(|e| error_response(op, &e)))
    }

    /// Seal `payload`, record it as the active account and unlock it.
    ///
    /// Nothing about the account list changes until the vault record is written.
    fn adopt_key(
        &mut self,
        payload: &KeyPayload,
        password: &SecretString,
        imported: bool,
        list: AccountList,
    ) -> eyre::Result<()> {
        let key_id = self.vault.store(payload, password)?;
        self.persisted.activate_account(
            AccountEntry {
                public_key: payload.public_key.clone(),
                key_id,
                imported,
            },
            list,
        )?;
        self.session.start(Session::from(payload));
        Ok(())
    }

    /// Open the active record with `password`; fails the same way for a wrong password and for a
    /// wallet with no key yet.
    fn unlock_active(&self, password: &SecretString) -> eyre::Result<KeyPayload> {
        let Some(id) = self.persisted.active_key_id()? else {
            crate::vault::crypto::burn_kdf(password);
            return Err(KeywardError::Decryption.into());
        };
        self.vault.load(&id, password)
    }

    fn accounts_response(&self, public_key: &str) -> eyre::Result<Response> {
        Ok(Response {
            public_key: Some(public_key.to_owned()),
            all_accounts: Some(self.persisted.public_keys()?),
            ..Response::default()
        })
    }

    async fn create_account(&mut self, password: &SecretString) -> eyre::Result<Response> {
        let mnemonic = keys::generate_mnemonic(MNEMONIC_ENTROPY_BITS)?;
        let keypair = keys::derive_keypair(&mnemonic, 0)?;

        if let Err(e) = self.network.fund(keypair.public_key()).await {
            warn!(public_key = keypair.public_key(), error = %format!("{e:#}"), "account funding failed");
        }

        let payload = KeyPayload {
            public_key: keypair.public_key().to_owned(),
            private_key: keypair.secret().to_string(),
            extra: KeyExtra {
                mnemonic_phrase: Some(mnemonic.to_string()),
            },
        };
        self.adopt_key(&payload, password, false, AccountList::Replace)?;
        self.persisted
            .set_application_state(ApplicationState::PasswordCreated)?;
        info!(public_key = %payload.public_key, "account created");
        self.accounts_response(&payload.public_key)
    }

    fn import_account(
        &mut self,
        password: &SecretString,
        private_key: &str,
    ) -> eyre::Result<Response> {
        if self.persisted.active_key_id()?.is_some() {
            drop(self.unlock_active(password)?);
        }
        let keypair = Keypair::from_secret(private_key)?;
        let payload = KeyPayload {
            public_key: keypair.public_key().to_owned(),
            private_key: keypair.secret().to_string(),
            extra: KeyExtra::default(),
        };
        self.adopt_key(&payload, password, true, AccountList::Extend)?;

        let state = self.persisted.application_state()?;
        let advanced = state.at_least(ApplicationState::PasswordCreated);
        if advanced != state {
            self.persisted.set_application_state(advanced)?;
        }
        info!(public_key = %payload.public_key, "account imported");
        self.accounts_response(&payload.public_key)
    }

    fn add_account(&mut self, password: &SecretString) -> eyre::Result<Response> {
        let current = self.unlock_active(password)?;
        let mnemonic = current
            .extra
            .mnemonic_phrase
            .as_deref()
            .ok_or(KeywardError::MnemonicUnavailable)?;

        let derived = self
            .persisted
            .accounts()?
            .iter()
            .filter(|a| !a.imported)
            .count();
        let index = u32::try_from(derived)?;
        let keypair = keys::derive_keypair(mnemonic, index)?;

        let payload = KeyPayload {
            public_key: keypair.public_key().to_owned(),
            private_key: keypair.secret().to_string(),
            extra: current.extra.clone(),
        };
        self.adopt_key(&payload, password, false, AccountList::Extend)?;
        info!(public_key = %payload.public_key, index, "account added");
        self.accounts_response(&payload.public_key)
    }

    fn recover_account(
        &mut self,
        password: &SecretString,
        mnemonic: &str,
    ) -> eyre::Result<Response> {
        let keypair = keys::derive_keypair(mnemonic, 0)?;
        let payload = KeyPayload {
            public_key: keypair.public_key().to_owned(),
            private_key: keypair.secret().to_string(),
            extra: KeyExtra {
                mnemonic_phrase: Some(mnemonic.trim().to_owned()),
            },
        };
        self.adopt_key(&payload, password, false, AccountList::Replace)?;

        let state = self
            .persisted
            .application_state()?
            .at_least(ApplicationState::MnemonicPhraseConfirmed);
        self.persisted.set_application_state(state)?;
        info!(public_key = %payload.public_key, "account recovered");
        Ok(Response {
            application_state: Some(state),
            ..self.accounts_response(&payload.public_key)?
        })
    }

    fn load_account(&self) -> eyre::Result<Response> {
        Ok(Response {
            public_key: self.session.public_key(),
            all_accounts: Some(self.persisted.public_keys()?),
            application_state: Some(self.persisted.application_state()?),
            ..Response::default()
        })
    }

    fn mnemonic_phrase(&self) -> eyre::Result<Response> {
        let phrase = self
            .session
            .with_session(|s| s.mnemonic_phrase().map(ToOwned::to_owned))
            .ok_or(KeywardError::NoKeyAvailable)?
            .ok_or(KeywardError::MnemonicUnavailable)?;
        Ok(Response {
            mnemonic_phrase: Some(phrase),
            ..Response::default()
        })
    }

    fn confirm_password(&mut self, password: &SecretString) -> eyre::Result<Response> {
        let payload = self.unlock_active(password)?;
        self.session.start(Session::from(&payload));
        debug!(public_key = %payload.public_key, "unlocked");
        Ok(Response {
            application_state: Some(self.persisted.application_state()?),
            ..self.accounts_response(&payload.public_key)?
        })
    }

    fn confirm_mnemonic_phrase(&self, candidate: &str) -> eyre::Result<Response> {
        let correct = self
            .session
            .with_session(|s| s.mnemonic_phrase() == Some(candidate))
            .unwrap_or(false);
        let state = if correct {
            ApplicationState::MnemonicPhraseConfirmed
        } else {
            ApplicationState::MnemonicPhraseFailed
        };
        self.persisted.set_application_state(state)?;
        Ok(Response {
            is_correct_phrase: Some(correct),
            application_state: Some(state),
            ..Response::default()
        })
    }

    fn grant_access(&mut self, url: &str, request_id: Option<RequestId>) -> eyre::Result<Response> {
        let (id, pending) = self
            .access_queue
            .resolve(request_id)
            .ok_or(KeywardError::NoPendingAccessRequest)?;

        // The entry is already off the queue, so every branch must answer the page.
        let response = if url != pending.tab.url {
            warn!(%id, "granted url does not match the requesting tab");
            Response::error(KeywardError::AccessDenied.user_message())
        } else if let Err(e) = self.whitelist.grant(&pending.tab.url) {
            error_response("grantAccess", &e)
        } else {
            self.session
                .public_key()
                .map_or_else(|| Response::error(MSG_NO_KEY), Response::public_key)
        };
        info!(%id, granted = response.error.is_none(), "access request resolved");
        resolve(pending.responder, response.clone());
        Ok(response)
    }

    fn reject_access(&mut self, request_id: Option<RequestId>) -> eyre::Result<Response> {
        let (id, pending) = self
            .access_queue
            .resolve(request_id)
            .ok_or(KeywardError::NoPendingAccessRequest)?;
        let response = Response::error(KeywardError::AccessDenied.user_message());
        info!(%id, "access request rejected");
        resolve(pending.responder, response.clone());
        Ok(response)
    }

    fn sign_out(&mut self) -> Response {
        self.session.end();
        info!("signed out");
        Response {
            public_key: Some(String::new()),
            application_state: self.persisted.application_state().ok(),
            ..Response::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testkit::*;
    use super::*;
    use crate::{
        errors::{MSG_INCORRECT_PASSWORD, MSG_INVALID_MNEMONIC, MSG_INVALID_SECRET_KEY},
        network::mock::MockNetwork,
        storage::{MemoryStorage, Storage as _, ALL_ACCOUNTS, KEY_ID},
    };
    use eyre::ContextCompat as _;
    use serde_json::json;
    use std::sync::Arc;

    const SEP5_MNEMONIC: &str =
        "illness spike retreat truth genius clock brain pass fit cave bargain toe";

    #[tokio::test]
    async fn create_account_reports_key_and_state() -> eyre::Result<()> {
        let mut h = harness();
        let r = h
            .internal(json!({ "type": "createAccount", "password": "pw1" }))
            .await?;
        let pk = r.public_key.clone().context("public key")?;
        assert!(pk.starts_with('G'));
        assert_eq!(r.all_accounts, Some(vec![pk.clone()]));
        assert_eq!(h.network.funded(), vec![pk]);

        let loaded = h.internal(json!({ "type": "loadAccount" })).await?;
        assert_eq!(loaded.application_state, Some(ApplicationState::PasswordCreated));
        Ok(())
    }

    #[tokio::test]
    async fn failed_funding_does_not_fail_creation() -> eyre::Result<()> {
        let mut h = harness_with(
            MockNetwork {
                fund_fails: true,
                ..Default::default()
            },
            Arc::new(MemoryStorage::new()),
        );
        let r = h
            .internal(json!({ "type": "createAccount", "password": "pw1" }))
            .await?;
        assert!(r.error.is_none());
        assert!(r.public_key.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn recover_then_confirm_password_unlocks_derived_key() -> eyre::Result<()> {
        let mut h = harness();
        let r = h
            .internal(json!({
                "type": "recoverAccount",
                "password": "pw1",
                "recoverMnemonic": SEP5_MNEMONIC
            }))
            .await?;
        assert_eq!(
            r.application_state,
            Some(ApplicationState::MnemonicPhraseConfirmed)
        );

        h.internal(json!({ "type": "signOut" })).await?;
        let r = h
            .internal(json!({ "type": "confirmPassword", "password": "pw1" }))
            .await?;
        let expected = keys::derive_keypair(SEP5_MNEMONIC, 0)?;
        assert_eq!(r.public_key.as_deref(), Some(expected.public_key()));
        assert_eq!(h.bg.session.public_key().as_deref(), Some(expected.public_key()));
        Ok(())
    }

    #[tokio::test]
    async fn bad_recovery_phrase_leaves_state_alone() -> eyre::Result<()> {
        let mut h = harness();
        let r = h
            .internal(json!({
                "type": "recoverAccount",
                "password": "pw1",
                "recoverMnemonic": "not a real phrase"
            }))
            .await?;
        assert_eq!(r.error.as_deref(), Some(MSG_INVALID_MNEMONIC));
        let loaded = h.internal(json!({ "type": "loadAccount" })).await?;
        assert_eq!(loaded.application_state, Some(ApplicationState::Started));
        assert_eq!(loaded.all_accounts, Some(vec![]));
        Ok(())
    }

    #[tokio::test]
    async fn wrong_password_gives_generic_error_and_no_session() -> eyre::Result<()> {
        let mut h = harness();
        h.create_account("pw1").await?;
        h.internal(json!({ "type": "signOut" })).await?;

        let r = h
            .internal(json!({ "type": "confirmPassword", "password": "nope" }))
            .await?;
        assert_eq!(r.error.as_deref(), Some(MSG_INCORRECT_PASSWORD));
        assert!(!h.bg.session.is_active());

        // No wallet at all looks the same.
        let mut fresh = harness();
        let r = fresh
            .internal(json!({ "type": "confirmPassword", "password": "pw1" }))
            .await?;
        assert_eq!(r.error.as_deref(), Some(MSG_INCORRECT_PASSWORD));
        Ok(())
    }

    #[tokio::test]
    async fn mnemonic_confirmation_sets_state() -> eyre::Result<()> {
        let mut h = harness();
        h.create_account("pw1").await?;
        let phrase = h
            .internal(json!({ "type": "getMnemonicPhrase" }))
            .await?
            .mnemonic_phrase
            .context("phrase")?;
        assert_eq!(phrase.split_whitespace().count(), 12);

        let r = h
            .internal(json!({ "type": "confirmMnemonicPhrase", "mnemonicPhraseToConfirm": "wrong words" }))
            .await?;
        assert_eq!(r.is_correct_phrase, Some(false));
        assert_eq!(r.application_state, Some(ApplicationState::MnemonicPhraseFailed));

        let r = h
            .internal(json!({ "type": "confirmMnemonicPhrase", "mnemonicPhraseToConfirm": phrase }))
            .await?;
        assert_eq!(r.is_correct_phrase, Some(true));
        assert_eq!(
            r.application_state,
            Some(ApplicationState::MnemonicPhraseConfirmed)
        );
        Ok(())
    }

    #[tokio::test]
    async fn add_account_derives_next_index() -> eyre::Result<()> {
        let mut h = harness();
        h.internal(json!({
            "type": "recoverAccount",
            "password": "pw1",
            "recoverMnemonic": SEP5_MNEMONIC
        }))
        .await?;

        let r = h
            .internal(json!({ "type": "addAccount", "password": "pw1" }))
            .await?;
        let second = keys::derive_keypair(SEP5_MNEMONIC, 1)?;
        assert_eq!(r.public_key.as_deref(), Some(second.public_key()));
        assert_eq!(r.all_accounts.map(|a| a.len()), Some(2));

        let r = h
            .internal(json!({ "type": "addAccount", "password": "wrong" }))
            .await?;
        assert_eq!(r.error.as_deref(), Some(MSG_INCORRECT_PASSWORD));
        Ok(())
    }

    #[tokio::test]
    async fn import_account_requires_wallet_password() -> eyre::Result<()> {
        let mut h = harness();
        h.create_account("pw1").await?;
        let imported = keys::derive_keypair(SEP5_MNEMONIC, 0)?;

        let r = h
            .internal(json!({ "type": "importAccount", "password": "bad", "privateKey": imported.secret().as_str() }))
            .await?;
        assert_eq!(r.error.as_deref(), Some(MSG_INCORRECT_PASSWORD));

        let r = h
            .internal(json!({ "type": "importAccount", "password": "pw1", "privateKey": imported.secret().as_str() }))
            .await?;
        assert_eq!(r.public_key.as_deref(), Some(imported.public_key()));
        assert_eq!(r.all_accounts.map(|a| a.len()), Some(2));

        let r = h.internal(json!({ "type": "getMnemonicPhrase" })).await?;
        assert!(r.error.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn malformed_secret_key_says_so() -> eyre::Result<()> {
        let mut h = harness();
        let r = h
            .internal(json!({ "type": "importAccount", "password": "pw1", "privateKey": "SNOTAKEY" }))
            .await?;
        assert_eq!(r.error.as_deref(), Some(MSG_INVALID_SECRET_KEY));
        Ok(())
    }

    #[tokio::test]
    async fn failed_vault_write_keeps_existing_accounts() -> eyre::Result<()> {
        let storage = Arc::new(MemoryStorage::rejecting_writes_to("keystore:"));
        let existing = r#"[{"publicKey":"GOLD","keyId":"k0","imported":false}]"#;
        storage.set(ALL_ACCOUNTS, existing)?;
        storage.set(KEY_ID, "k0")?;
        let mut h = harness_with(MockNetwork::default(), storage.clone());

        let r = h
            .internal(json!({ "type": "createAccount", "password": "pw1" }))
            .await?;
        assert_eq!(r.error.as_deref(), Some("Storage unavailable"));

        let r = h
            .internal(json!({
                "type": "recoverAccount",
                "password": "pw1",
                "recoverMnemonic": SEP5_MNEMONIC
            }))
            .await?;
        assert_eq!(r.error.as_deref(), Some("Storage unavailable"));

        assert_eq!(storage.get(ALL_ACCOUNTS)?.as_deref(), Some(existing));
        assert_eq!(storage.get(KEY_ID)?.as_deref(), Some("k0"));
        assert!(!h.bg.session.is_active());
        Ok(())
    }

    #[tokio::test]
    async fn create_account_replaces_the_account_list() -> eyre::Result<()> {
        let mut h = harness();
        h.create_account("pw1").await?;
        let second = h.create_account("pw2").await?;
        let loaded = h.internal(json!({ "type": "loadAccount" })).await?;
        assert_eq!(loaded.all_accounts, Some(vec![second]));
        Ok(())
    }

    #[tokio::test]
    async fn sign_out_clears_session() -> eyre::Result<()> {
        let mut h = harness();
        h.create_account("pw1").await?;
        let r = h.internal(json!({ "type": "signOut" })).await?;
        assert_eq!(r.public_key.as_deref(), Some(""));
        assert_eq!(r.application_state, Some(ApplicationState::PasswordCreated));

        let loaded = h.internal(json!({ "type": "loadAccount" })).await?;
        assert!(loaded.public_key.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn unknown_and_malformed_requests_get_no_reply() {
        let mut h = harness();
        for msg in [json!({ "type": "launchRocket" }), json!({ "no": "type" })] {
            let reply = h
                .bg
                .handle(super::super::messages::Channel::Internal, None, msg)
                .await;
            assert!(matches!(reply, Reply::None));
        }
    }
}
