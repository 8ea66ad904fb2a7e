use crate::config::PopupConfig;
use base64::Engine as _;
use eyre::Context as _;
use serde::{Deserialize, Serialize};

const B64: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

pub const ROUTE_GRANT_ACCESS: &str = "grant-access";
pub const ROUTE_SIGN_TRANSACTION: &str = "sign-transaction";

/// A fixed-size window the UI process should open to ask the user something.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopupRequest {
    pub url: String,
    pub width: u32,
    pub height: u32,
}

impl PopupRequest {
    /// `{base}#/{route}?{urlencoded(base64(json(payload)))}` at the configured geometry.
    pub fn new<T: Serialize>(cfg: &PopupConfig, route: &str, payload: &T) -> eyre::Result<Self> {
        let json = serde_json::to_vec(payload).context("serialize popup payload")?;
        let encoded: String =
            url::form_urlencoded::byte_serialize(B64.encode(json).as_bytes()).collect();
        Ok(Self {
            url: format!("{}#/{route}?{encoded}", cfg.base_url),
            width: cfg.width,
            height: cfg.height,
        })
    }
}

/// Where confirmation popups go. The host forwards them to the UI; tests record them.
pub trait ConfirmationSurface: Send + Sync + std::fmt::Debug {
    fn open(&self, popup: PopupRequest);
}

#[cfg(test)]
pub(crate) mod recording {
    use super::*;
    use std::sync::{Mutex, PoisonError};

    #[derive(Debug, Default)]
    pub(crate) struct RecordingSurface {
        opened: Mutex<Vec<PopupRequest>>,
    }

    impl RecordingSurface {
        pub(crate) fn opened(&self) -> Vec<PopupRequest> {
            self.opened
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }
    }

    impl ConfirmationSurface for RecordingSurface {
        fn open(&self, popup: PopupRequest) {
            self.opened
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(popup);
        }
    }
}
