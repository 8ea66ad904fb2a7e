use crate::storage::{Storage, WHITELIST};
use std::sync::Arc;
use tracing::info;
use url::Url;

const SEPARATOR: &str = ",";

/// Canonical form of an origin for whitelist comparisons.
///
/// Web URLs reduce to `scheme://host[:port]`, so paths, query strings and fragments never take
/// part in the comparison. Anything without a tuple origin keeps everything before `?` or `#`.
/// Returns an empty string for input that cannot be stored in the comma-joined list.
pub fn normalize_origin(raw: &str) -> String {
    let raw = raw.trim();
    let origin = match Url::parse(raw) {
        Ok(u) if u.origin().is_tuple() => u.origin().ascii_serialization(),
        _ => raw
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_owned(),
    };
    if origin.contains(SEPARATOR) {
        return String::new();
    }
    origin
}

/// Persisted set of pre-approved origins, stored comma-joined under `whitelist`.
///
/// Append-only: there is no revoke path.
#[derive(Debug, Clone)]
pub struct Whitelist {
    storage: Arc<dyn Storage>,
}

impl Whitelist {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub fn entries(&self) -> eyre::Result<Vec<String>> {
        let raw = self.storage.get(WHITELIST)?.unwrap_or_default();
        Ok(raw
            .split(SEPARATOR)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToOwned::to_owned)
            .collect())
    }

    pub fn is_whitelisted(&self, origin: &str) -> eyre::Result<bool> {
        let origin = normalize_origin(origin);
        if origin.is_empty() {
            return Ok(false);
        }
        Ok(self.entries()?.iter().any(|e| *e == origin))
    }

    pub fn grant(&self, origin: &str) -> eyre::Result<()> {
        let origin = normalize_origin(origin);
        if origin.is_empty() {
            eyre::bail!("refusing to whitelist an empty or unstorable origin");
        }
        let mut entries = self.entries()?;
        if entries.contains(&origin) {
            return Ok(());
        }
        entries.push(origin.clone());
        self.storage.set(WHITELIST, &entries.join(SEPARATOR))?;
        info!(%origin, "origin whitelisted");
        Ok(())
    }
}
