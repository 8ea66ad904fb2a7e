use crate::vault::{KeyExtra, KeyPayload};
use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};
use tokio::{task::JoinHandle, time::Instant};
use tracing::{debug, info};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Stand-in deadline when `now + ttl` does not fit in an `Instant` (about 30 years).
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// The decrypted secret while it is allowed to live in memory.
///
/// Clearing goes through the derived `Zeroize` impl, which walks every field; a new field whose
/// type can't be zeroized fails to compile instead of surviving sign-out.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Session {
    pub public_key: String,
    pub private_key: String,
    pub extra: KeyExtra,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

impl From<&KeyPayload> for Session {
    fn from(p: &KeyPayload) -> Self {
        Self {
            public_key: p.public_key.clone(),
            private_key: p.private_key.clone(),
            extra: p.extra.clone(),
        }
    }
}

impl Session {
    pub fn mnemonic_phrase(&self) -> Option<&str> {
        self.extra.mnemonic_phrase.as_deref()
    }
}

#[derive(Debug, Default)]
struct Slot {
    session: Option<Session>,
    expires_at: Option<Instant>,
    /// Bumped on every start so a stale timer can't end a newer session.
    generation: u64,
}

impl Slot {
    fn clear(&mut self) {
        if let Some(mut s) = self.session.take() {
            s.zeroize();
        }
        self.expires_at = None;
    }

    fn live(&mut self) -> Option<&Session> {
        if self.expires_at.is_some_and(|exp| Instant::now() >= exp) {
            self.clear();
        }
        self.session.as_ref()
    }
}

/// Owner of the single in-memory session and its expiry timer.
#[derive(Debug)]
pub struct SessionManager {
    slot: Arc<Mutex<Slot>>,
    timer: Option<JoinHandle<()>>,
    default_ttl: Duration,
}

impl SessionManager {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            slot: Arc::default(),
            timer: None,
            default_ttl,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cancel_timer(&mut self) {
        if let Some(t) = self.timer.take() {
            t.abort();
        }
    }

    pub fn start(&mut self, session: Session) {
        self.start_for(session, self.default_ttl);
    }

    /// Replace any live session with `session` and arm a one-shot expiry after `ttl`.
    pub fn start_for(&mut self, session: Session, ttl: Duration) {
        self.cancel_timer();
        let now = Instant::now();
        let deadline = now
            .checked_add(ttl)
            .or_else(|| now.checked_add(FAR_FUTURE))
            .unwrap_or(now);
        let generation = {
            let mut slot = self.lock();
            slot.clear();
            slot.session = Some(session);
            slot.expires_at = Some(deadline);
            slot.generation = slot.generation.wrapping_add(1);
            slot.generation
        };

        let slot = Arc::clone(&self.slot);
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.generation == generation {
                slot.clear();
                info!("session expired");
            }
        }));
        debug!(ttl_secs = ttl.as_secs(), "session started");
    }

    /// Sign out: wipe the secret and disarm the timer. Same effect as the timer firing.
    pub fn end(&mut self) {
        self.cancel_timer();
        self.lock().clear();
    }

    pub fn is_active(&self) -> bool {
        self.lock().live().is_some()
    }

    pub fn public_key(&self) -> Option<String> {
        self.lock().live().map(|s| s.public_key.clone())
    }

    /// Run `f` against the live session, if any.
    pub fn with_session<R>(&self, f: impl FnOnce(&Session) -> R) -> Option<R> {
        self.lock().live().map(f)
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.cancel_timer();
        self.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(tag: &str) -> Session {
        Session {
            public_key: format!("G{tag}"),
            private_key: format!("S{tag}"),
            extra: KeyExtra {
                mnemonic_phrase: Some(format!("words {tag}")),
            },
        }
    }

    #[test]
    fn zeroize_clears_every_field() {
        let mut s = secret("A");
        s.zeroize();
        assert!(s.public_key.is_empty());
        assert!(s.private_key.is_empty());
        assert!(s.extra.mnemonic_phrase.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn session_expires_after_ttl() {
        let mut mgr = SessionManager::new(Duration::from_secs(300));
        mgr.start(secret("A"));
        assert!(mgr.is_active());

        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(mgr.is_active());

        tokio::time::advance(Duration::from_secs(1)).await;
        tokio::task::yield_now().await;
        assert!(!mgr.is_active());
        assert!(mgr.with_session(|s| s.private_key.clone()).is_none());
        assert!(mgr.lock().session.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn timer_clears_slot_without_a_reader() {
        let mut mgr = SessionManager::new(Duration::from_secs(10));
        mgr.start(secret("A"));
        tokio::time::sleep(Duration::from_secs(11)).await;
        // Peek at the slot directly; `live()` would also clear it lazily.
        assert!(mgr.lock().session.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn restart_cancels_previous_timer() {
        let mut mgr = SessionManager::new(Duration::from_secs(10));
        mgr.start(secret("A"));
        tokio::time::advance(Duration::from_secs(8)).await;
        mgr.start(secret("B"));
        tokio::time::advance(Duration::from_secs(5)).await;
        tokio::task::yield_now().await;
        assert_eq!(mgr.public_key().as_deref(), Some("GB"));
    }

    #[tokio::test(start_paused = true)]
    async fn unrepresentable_ttl_does_not_panic() {
        let mut mgr = SessionManager::new(Duration::MAX);
        mgr.start(secret("A"));
        assert!(mgr.is_active());
        tokio::time::advance(Duration::from_secs(86_400)).await;
        assert_eq!(mgr.public_key().as_deref(), Some("GA"));
    }

    #[tokio::test]
    async fn end_behaves_like_expiry() {
        let mut mgr = SessionManager::new(Duration::from_secs(10));
        mgr.start(secret("A"));
        mgr.end();
        assert!(!mgr.is_active());
        assert!(mgr.public_key().is_none());
    }
}
