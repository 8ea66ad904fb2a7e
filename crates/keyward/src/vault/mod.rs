pub mod crypto;

use crate::{
    errors::KeywardError,
    storage::{keystore_slot, Storage},
};
use eyre::Context as _;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Non-key material stored alongside a keypair.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct KeyExtra {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub mnemonic_phrase: Option<String>,
}

/// Plaintext of a vault entry. Only ever lives in memory on its way into a session.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct KeyPayload {
    pub public_key: String,
    pub private_key: String,
    #[serde(default)]
    pub extra: KeyExtra,
}

impl std::fmt::Debug for KeyPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPayload")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

/// What actually sits in storage under `keystore:<id>`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedKeyRecord {
    pub id: String,
    pub cipher_payload: crypto::SealedBox,
    pub encrypter_name: String,
}

#[derive(Debug, Clone)]
pub struct Vault {
    storage: Arc<dyn Storage>,
}

impl Vault {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Seal `payload` under `password` and persist it. Returns the new record id.
    pub fn store(&self, payload: &KeyPayload, password: &SecretString) -> eyre::Result<String> {
        let id = Uuid::new_v4().to_string();
        let plaintext =
            Zeroizing::new(serde_json::to_vec(payload).context("serialize key payload")?);
        let record = EncryptedKeyRecord {
            cipher_payload: crypto::seal(password, &id, &plaintext)?,
            encrypter_name: crypto::ENCRYPTER_NAME.to_owned(),
            id,
        };
        let s = serde_json::to_string(&record).context("serialize key record")?;
        self.storage
            .set(&keystore_slot(&record.id), &s)
            .map_err(|e| KeywardError::Storage(format!("{e:#}")))?;
        debug!(key_id = %record.id, "stored key record");
        Ok(record.id)
    }

    /// Open the record `id` with `password`.
    ///
    /// A missing id, a corrupt record and a wrong password all yield [`KeywardError::Decryption`]
    /// after the same KDF work.
    pub fn load(&self, id: &str, password: &SecretString) -> eyre::Result<KeyPayload> {
        let raw = self
            .storage
            .get(&keystore_slot(id))
            .map_err(|e| KeywardError::Storage(format!("{e:#}")))?;

        let record = raw.and_then(|s| serde_json::from_str::<EncryptedKeyRecord>(&s).ok());
        let Some(record) = record.filter(|r| r.encrypter_name == crypto::ENCRYPTER_NAME) else {
            crypto::burn_kdf(password);
            return Err(KeywardError::Decryption.into());
        };

        let plaintext = crypto::open(password, &record.id, &record.cipher_payload)
            .map_err(|_open| KeywardError::Decryption)?;
        let payload: KeyPayload =
            serde_json::from_slice(&plaintext).map_err(|_parse| KeywardError::Decryption)?;
        Ok(payload)
    }
}
