//! Requests relayed from third-party pages. Only two message types are honored.

use super::{
    messages::{ExternalRequest, Reply, Response, TabContext},
    resolve, Background, PendingAccessRequest, PendingTransaction,
};
use crate::{
    errors::KeywardError,
    popup::{PopupRequest, ROUTE_GRANT_ACCESS, ROUTE_SIGN_TRANSACTION},
    queue::RequestId,
    transaction::UnsignedTransaction,
};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AccessPopupPayload<'a> {
    request_id: RequestId,
    #[serde(flatten)]
    tab: &'a TabContext,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignPopupPayload<'a> {
    request_id: RequestId,
    transaction_xdr: &'a str,
    #[serde(flatten)]
    tab: &'a TabContext,
}

impl Background {
    pub(super) fn handle_external(&mut self, tab: TabContext, message: Value) -> Reply {
        match serde_json::from_value::<ExternalRequest>(message) {
            Ok(ExternalRequest::RequestAccess) => self.request_access(tab),
            Ok(ExternalRequest::SubmitTransaction { transaction_xdr }) => {
                self.submit_transaction(tab, &transaction_xdr)
            }
            Ok(ExternalRequest::Unknown) => {
                debug!(origin = %tab.url, "ignoring external request");
                Reply::None
            }
            Err(e) => {
                warn!(origin = %tab.url, error = %e, "malformed external request");
                Reply::None
            }
        }
    }

    fn open_popup<T: Serialize>(&self, route: &str, payload: &T) {
        match PopupRequest::new(&self.config.popup, route, payload) {
            Ok(popup) => self.surface.open(popup),
            Err(e) => warn!(route, error = %format!("{e:#}"), "could not build popup"),
        }
    }

    fn request_access(&mut self, tab: TabContext) -> Reply {
        let whitelisted = self.whitelist.is_whitelisted(&tab.url).unwrap_or_else(|e| {
            warn!(error = %format!("{e:#}"), "whitelist unreadable, treating origin as unknown");
            false
        });
        if whitelisted {
            if let Some(pk) = self.session.public_key() {
                debug!(origin = %tab.url, "whitelisted origin, answering immediately");
                return Reply::Now(Response::public_key(pk));
            }
        }

        let (tx, rx) = oneshot::channel();
        // A repeat from the same tab takes over the open prompt instead of stacking another.
        if let Some((id, pending)) = self
            .access_queue
            .find_mut(|p| p.tab.url == tab.url && p.tab.tab_id == tab.tab_id)
        {
            let superseded = std::mem::replace(&mut pending.responder, tx);
            resolve(
                superseded,
                Response::error(KeywardError::AccessDenied.user_message()),
            );
            debug!(%id, origin = %tab.url, "repeat access request joined the pending prompt");
            return Reply::Later(rx);
        }

        let payload_tab = tab.clone();
        let id = self.access_queue.enqueue(PendingAccessRequest { tab, responder: tx });
        info!(%id, origin = %payload_tab.url, "access request pending");
        self.open_popup(
            ROUTE_GRANT_ACCESS,
            &AccessPopupPayload {
                request_id: id,
                tab: &payload_tab,
            },
        );
        Reply::Later(rx)
    }

    fn submit_transaction(&mut self, tab: TabContext, xdr: &str) -> Reply {
        let tx = match UnsignedTransaction::parse(xdr) {
            Ok(tx) => tx,
            Err(e) => {
                debug!(origin = %tab.url, error = %e, "rejecting unparseable transaction");
                return Reply::Now(Response::error(e.user_message()));
            }
        };

        let (responder, rx) = oneshot::channel();
        let payload_tab = tab.clone();
        let xdr = tx.xdr().to_owned();
        let id = self.tx_queue.enqueue(PendingTransaction { tx, tab, responder });
        info!(%id, origin = %payload_tab.url, "transaction pending signature");
        self.open_popup(
            ROUTE_SIGN_TRANSACTION,
            &SignPopupPayload {
                request_id: id,
                transaction_xdr: &xdr,
                tab: &payload_tab,
            },
        );
        Reply::Later(rx)
    }
}
