use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const MSG_INCORRECT_PASSWORD: &str = "Incorrect password";
pub const MSG_INVALID_MNEMONIC: &str = "Invalid mnemonic phrase";
pub const MSG_INVALID_SECRET_KEY: &str = "Invalid secret key";
pub const MSG_ACCESS_DECLINED: &str = "User declined access";
pub const MSG_TRANSACTION_DECLINED: &str = "User declined to sign the transaction";
pub const MSG_NO_KEY: &str = "No key available";
pub const MSG_SUBMISSION_FAILED: &str = "Transaction submission failed";
pub const MSG_INTERNAL: &str = "Internal error";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeywardError {
    /// Wrong password, missing record id, or a corrupt vault entry; callers cannot tell which.
    #[error("decryption failed")]
    Decryption,

    #[error("key derivation failed")]
    Derivation,

    #[error("malformed secret key")]
    InvalidSecretKey,

    #[error("storage unavailable: {0}")]
    Storage(String),

    #[error("access denied")]
    AccessDenied,

    #[error("no key available")]
    NoKeyAvailable,

    #[error("no pending transaction")]
    NoPendingTransaction,

    #[error("no pending access request")]
    NoPendingAccessRequest,

    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("mnemonic phrase unavailable for this account")]
    MnemonicUnavailable,
}

impl KeywardError {
    /// Message shown to the wallet UI or relayed to a page.
    ///
    /// Vault and derivation failures collapse to a fixed string so the caller cannot learn which
    /// input was wrong.
    pub fn user_message(&self) -> String {
        match self {
            Self::Decryption => MSG_INCORRECT_PASSWORD.to_owned(),
            Self::Derivation => MSG_INVALID_MNEMONIC.to_owned(),
            Self::InvalidSecretKey => MSG_INVALID_SECRET_KEY.to_owned(),
            Self::Storage(_) => "Storage unavailable".to_owned(),
            Self::AccessDenied => MSG_ACCESS_DECLINED.to_owned(),
            Self::NoKeyAvailable => MSG_NO_KEY.to_owned(),
            Self::NoPendingTransaction => "No pending transaction".to_owned(),
            Self::NoPendingAccessRequest => "No pending access request".to_owned(),
            Self::InvalidTransaction(reason) => format!("Invalid transaction: {reason}"),
            Self::MnemonicUnavailable => "Mnemonic phrase unavailable".to_owned(),
        }
    }
}

/// A failed broadcast. Carried as the *result* of the signing flow, never raised.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubmissionError {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub status: Option<u16>,
    pub message: String,
    /// Provider body, forwarded verbatim so the confirmation surface can render it.
    #[serde(skip_serializing_if = "Value::is_null", default)]
    pub detail: Value,
}

impl SubmissionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
            detail: Value::Null,
        }
    }
}

/// Render any handler failure as a user-facing message.
pub fn render_error(e: &eyre::Report) -> String {
    if let Some(ke) = e.downcast_ref::<KeywardError>() {
        return ke.user_message();
    }
    MSG_INTERNAL.to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vault_failures_render_one_generic_message() {
        let wrong_pw: eyre::Report = KeywardError::Decryption.into();
        let wrapped = eyre::Report::new(KeywardError::Decryption).wrap_err("load keystore:abc");
        assert_eq!(render_error(&wrong_pw), MSG_INCORRECT_PASSWORD);
        assert_eq!(render_error(&wrapped), MSG_INCORRECT_PASSWORD);
    }

    #[test]
    fn foreign_errors_render_as_internal() {
        let e = eyre::eyre!("disk on fire: /home/alice/.keyward");
        assert_eq!(render_error(&e), MSG_INTERNAL);
    }
}
