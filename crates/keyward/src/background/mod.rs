//! The dispatch actor.
//!
//! [`Background`] owns every piece of trust state: vault, session, whitelist, both pending
//! queues and the collaborators that reach outside the process. Exactly one task drives it, so
//! handlers never race each other; the only other task that touches state is the session
//! expiry timer, which only ever clears the session slot.

mod external;
mod internal;
pub mod messages;
mod signer;
pub mod state;

use crate::{
    config::KeywardConfig,
    errors::{render_error, KeywardError},
    network::NetworkClient,
    popup::ConfirmationSurface,
    queue::PendingQueue,
    session::SessionManager,
    storage::Storage,
    transaction::UnsignedTransaction,
    vault::Vault,
    whitelist::Whitelist,
};
use messages::{Channel, Reply, Response, TabContext};
use serde_json::Value;
use state::Persisted;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// A page waiting to learn whether it may see the public key.
#[derive(Debug)]
pub struct PendingAccessRequest {
    pub tab: TabContext,
    pub responder: oneshot::Sender<Response>,
}

/// A page-submitted transaction waiting for the user to sign or reject it.
#[derive(Debug)]
pub struct PendingTransaction {
    pub tx: UnsignedTransaction,
    pub tab: TabContext,
    pub responder: oneshot::Sender<Response>,
}

/// Resolve a parked caller. A caller that went away (closed tab) is not an error.
fn resolve(responder: oneshot::Sender<Response>, response: Response) {
    if responder.send(response).is_err() {
        debug!("pending caller is gone");
    }
}

#[derive(Debug)]
pub struct Background {
    persisted: Persisted,
    vault: Vault,
    session: SessionManager,
    whitelist: Whitelist,
    access_queue: PendingQueue<PendingAccessRequest>,
    tx_queue: PendingQueue<PendingTransaction>,
    network: Arc<dyn NetworkClient>,
    surface: Arc<dyn ConfirmationSurface>,
    config: KeywardConfig,
}

impl Background {
    pub fn new(
        storage: Arc<dyn Storage>,
        network: Arc<dyn NetworkClient>,
        surface: Arc<dyn ConfirmationSurface>,
        config: KeywardConfig,
    ) -> Self {
        Self {
            persisted: Persisted::new(Arc::clone(&storage)),
            vault: Vault::new(Arc::clone(&storage)),
            whitelist: Whitelist::new(storage),
            session: SessionManager::new(config.session_ttl()),
            access_queue: PendingQueue::new(),
            tx_queue: PendingQueue::new(),
            network,
            surface,
            config,
        }
    }

    /// Route one inbound message. Never fails; errors become `Response.error` or are logged.
    pub async fn handle(
        &mut self,
        channel: Channel,
        sender: Option<TabContext>,
        message: Value,
    ) -> Reply {
        match channel {
            Channel::Internal => self.handle_internal(message).await,
            Channel::External => {
                let Some(tab) = sender.filter(|t| !t.url.is_empty()) else {
                    warn!("external message without a sender tab, ignoring");
                    return Reply::None;
                };
                self.handle_external(tab, message)
            }
        }
    }

    pub fn pending_access(&self) -> usize {
        self.access_queue.len()
    }

    pub fn pending_transactions(&self) -> usize {
        self.tx_queue.len()
    }
}

/// Turn a handler failure into a reply; domain errors render their message, the rest are logged.
fn error_response(op: &str, e: &eyre::Report) -> Response {
    if e.downcast_ref::<KeywardError>().is_none() {
        warn!(op, error = %format!("{e:#}"), "handler failed");
    } else {
        debug!(op, error = %e, "handler rejected request");
    }
    Response::error(render_error(e))
}

#[cfg(test)]
pub(crate) mod testkit {
    use super::*;
    use crate::{
        errors::SubmissionError, network::mock::MockNetwork, popup::recording::RecordingSurface,
        storage::MemoryStorage,
    };
    use eyre::ContextCompat as _;
    use serde_json::json;

    pub(crate) struct Harness {
        pub bg: Background,
        pub storage: Arc<MemoryStorage>,
        pub network: Arc<MockNetwork>,
        pub surface: Arc<RecordingSurface>,
    }

    pub(crate) fn harness() -> Harness {
        harness_with(MockNetwork::default(), Arc::new(MemoryStorage::new()))
    }

    pub(crate) fn harness_rejecting(e: SubmissionError) -> Harness {
        harness_with(
            MockNetwork {
                reject_with: Some(e),
                ..MockNetwork::default()
            },
            Arc::new(MemoryStorage::new()),
        )
    }

    pub(crate) fn harness_with(network: MockNetwork, storage: Arc<MemoryStorage>) -> Harness {
        let network = Arc::new(network);
        let surface = Arc::new(RecordingSurface::default());
        let bg = Background::new(
            storage.clone(),
            network.clone(),
            surface.clone(),
            KeywardConfig::default(),
        );
        Harness {
            bg,
            storage,
            network,
            surface,
        }
    }

    pub(crate) fn tab(url: &str) -> TabContext {
        TabContext {
            url: url.into(),
            title: Some("Dapp".into()),
            tab_id: Some(3),
            fav_icon_url: None,
        }
    }

    impl Harness {
        pub(crate) async fn internal(&mut self, msg: Value) -> eyre::Result<Response> {
            match self.bg.handle(Channel::Internal, None, msg).await {
                Reply::Now(r) => Ok(r),
                other => eyre::bail!("expected an immediate reply, got {other:?}"),
            }
        }

        pub(crate) async fn external(&mut self, url: &str, msg: Value) -> Reply {
            self.bg.handle(Channel::External, Some(tab(url)), msg).await
        }

        pub(crate) async fn create_account(&mut self, password: &str) -> eyre::Result<String> {
            let r = self
                .internal(json!({ "type": "createAccount", "password": password }))
                .await?;
            r.public_key.context("createAccount returns a public key")
        }
    }

    pub(crate) fn deferred(reply: Reply) -> eyre::Result<oneshot::Receiver<Response>> {
        match reply {
            Reply::Later(rx) => Ok(rx),
            other => eyre::bail!("expected a deferred reply, got {other:?}"),
        }
    }
}
