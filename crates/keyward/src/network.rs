use crate::{config::NetworkConfig, errors::SubmissionError, transaction::SignedTransaction};
use async_trait::async_trait;
use eyre::Context as _;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// The ledger-facing collaborator: broadcast signed envelopes and fund new accounts.
#[async_trait]
pub trait NetworkClient: Send + Sync + std::fmt::Debug {
    /// Broadcast a signed envelope. The receipt is the provider's JSON body.
    async fn submit(&self, tx: &SignedTransaction) -> Result<Value, SubmissionError>;

    /// Ask a faucet to fund `public_key`. Best effort; callers only log failures.
    async fn fund(&self, public_key: &str) -> eyre::Result<()>;
}

#[derive(Debug, Clone)]
pub struct HorizonClient {
    http: reqwest::Client,
    horizon_url: String,
    friendbot_url: Option<String>,
}

impl HorizonClient {
    pub fn new(cfg: &NetworkConfig, timeout: Duration) -> eyre::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("build http client")?;
        Ok(Self {
            http,
            horizon_url: cfg.horizon_url.trim_end_matches('/').to_owned(),
            friendbot_url: cfg
                .friendbot_url
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToOwned::to_owned),
        })
    }
}

/// Horizon problem documents carry a human title; fall back to the HTTP status.
fn problem_message(status: reqwest::StatusCode, body: &Value) -> String {
    body.get("title")
        .and_then(Value::as_str)
        .map_or_else(|| format!("horizon http {status}"), ToOwned::to_owned)
}

#[async_trait]
impl NetworkClient for HorizonClient {
    async fn submit(&self, tx: &SignedTransaction) -> Result<Value, SubmissionError> {
        let url = format!("{}/transactions", self.horizon_url);
        let form = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("tx", &tx.envelope_xdr)
            .finish();

        let resp = self
            .http
            .post(url)
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body(form)
            .send()
            .await
            .map_err(|e| SubmissionError::new(format!("horizon request failed: {e}")))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| SubmissionError::new(format!("horizon response unreadable: {e}")))?;
        let body: Value = serde_json::from_str(&text).unwrap_or(Value::String(text));

        if status.is_success() {
            debug!(hash = %tx.hash_hex, "transaction accepted");
            return Ok(body);
        }
        warn!(hash = %tx.hash_hex, %status, "transaction rejected by horizon");
        Err(SubmissionError {
            status: Some(status.as_u16()),
            message: problem_message(status, &body),
            detail: body,
        })
    }

    async fn fund(&self, public_key: &str) -> eyre::Result<()> {
        let Some(base) = self.friendbot_url.as_deref() else {
            debug!("funding disabled");
            return Ok(());
        };
        let resp = self
            .http
            .get(base)
            .query(&[("addr", public_key)])
            .send()
            .await
            .context("friendbot request")?;
        if !resp.status().is_success() {
            eyre::bail!("friendbot http {}", resp.status());
        }
        Ok(())
    }
}
