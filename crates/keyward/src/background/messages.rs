use super::state::ApplicationState;
use crate::queue::RequestId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// The wallet's own UI.
    Internal,
    /// Content scripts relaying third-party pages.
    External,
}

/// The browser tab a request came from, as reported by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabContext {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tab_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub fav_icon_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum InternalRequest {
    CreateAccount {
        password: String,
    },
    ImportAccount {
        password: String,
        private_key: String,
    },
    AddAccount {
        password: String,
    },
    RecoverAccount {
        password: String,
        recover_mnemonic: String,
    },
    LoadAccount,
    GetMnemonicPhrase,
    ConfirmPassword {
        password: String,
    },
    ConfirmMnemonicPhrase {
        mnemonic_phrase_to_confirm: String,
    },
    GrantAccess {
        url: String,
        #[serde(default)]
        request_id: Option<RequestId>,
    },
    RejectAccess {
        #[serde(default)]
        request_id: Option<RequestId>,
    },
    SignTransaction {
        #[serde(default)]
        request_id: Option<RequestId>,
    },
    RejectTransaction {
        #[serde(default)]
        request_id: Option<RequestId>,
    },
    SignOut,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ExternalRequest {
    RequestAccess,
    SubmitTransaction {
        transaction_xdr: String,
    },
    #[serde(other)]
    Unknown,
}

/// Every reply shape either router produces. Absent fields are omitted on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub public_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub all_accounts: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub application_state: Option<ApplicationState>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub mnemonic_phrase: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub is_correct_phrase: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub transaction_status: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

impl Response {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn public_key(pk: impl Into<String>) -> Self {
        Self {
            public_key: Some(pk.into()),
            ..Self::default()
        }
    }
}

/// What a handler hands back to the transport.
#[derive(Debug)]
pub enum Reply {
    Now(Response),
    /// Keep the reply channel open; the response arrives once a confirmation step resolves.
    Later(oneshot::Receiver<Response>),
    None,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn internal_requests_parse_from_camel_case() -> eyre::Result<()> {
        let r: InternalRequest = serde_json::from_value(json!({
            "type": "recoverAccount",
            "password": "pw",
            "recoverMnemonic": "abandon"
        }))?;
        assert!(matches!(r, InternalRequest::RecoverAccount { .. }));

        let r: InternalRequest =
            serde_json::from_value(json!({ "type": "grantAccess", "url": "https://a", "requestId": 7 }))?;
        assert!(matches!(
            r,
            InternalRequest::GrantAccess { request_id: Some(RequestId(7)), .. }
        ));
        Ok(())
    }

    #[test]
    fn unknown_types_parse_to_unknown() -> eyre::Result<()> {
        let r: InternalRequest = serde_json::from_value(json!({ "type": "mineBitcoin" }))?;
        assert!(matches!(r, InternalRequest::Unknown));
        let r: ExternalRequest = serde_json::from_value(json!({ "type": "signOut" }))?;
        assert!(matches!(r, ExternalRequest::Unknown));
        Ok(())
    }

    #[test]
    fn response_omits_absent_fields() -> eyre::Result<()> {
        let v = serde_json::to_value(Response::public_key("GABC"))?;
        assert_eq!(v, json!({ "publicKey": "GABC" }));
        Ok(())
    }
}
