use super::{messages::Response, resolve, Background};
use crate::{
    errors::{KeywardError, MSG_NO_KEY, MSG_SUBMISSION_FAILED, MSG_TRANSACTION_DECLINED},
    keys::Keypair,
    queue::RequestId,
};
use serde_json::Value;
use tracing::{info, warn};

impl Background {
    /// Sign the pending transaction with the session key, broadcast it and answer both the page
    /// that submitted it and the UI with the same result.
    pub(super) async fn sign_transaction(&mut self, request_id: Option<RequestId>) -> Response {
        let keypair = match self
            .session
            .with_session(|s| Keypair::from_secret(&s.private_key))
        {
            None => return Response::error(MSG_NO_KEY),
            Some(Ok(kp)) => kp,
            Some(Err(e)) => return super::error_response("signTransaction", &e),
        };

        let Some((id, pending)) = self.tx_queue.resolve(request_id) else {
            return Response::error(KeywardError::NoPendingTransaction.user_message());
        };

        let signed = pending
            .tx
            .sign(&keypair, &self.config.network.network_passphrase);
        drop(keypair);
        info!(%id, hash = %signed.hash_hex, origin = %pending.tab.url, "transaction signed");

        let response = match self.network.submit(&signed).await {
            Ok(receipt) => Response {
                transaction_status: Some(receipt),
                ..Response::default()
            },
            Err(e) => {
                warn!(%id, status = ?e.status, message = %e.message, "transaction submission failed");
                let detail = if e.detail.is_null() {
                    Value::String(e.message)
                } else {
                    e.detail
                };
                Response {
                    error: Some(MSG_SUBMISSION_FAILED.to_owned()),
                    transaction_status: Some(detail),
                    ..Response::default()
                }
            }
        };
        resolve(pending.responder, response.clone());
        response
    }

    pub(super) fn reject_transaction(
        &mut self,
        request_id: Option<RequestId>,
    ) -> eyre::Result<Response> {
        let (id, pending) = self
            .tx_queue
            .resolve(request_id)
            .ok_or(KeywardError::NoPendingTransaction)?;
        info!(%id, origin = %pending.tab.url, "transaction rejected");
        let response = Response::error(MSG_TRANSACTION_DECLINED);
        resolve(pending.responder, response.clone());
        Ok(response)
    }
}
