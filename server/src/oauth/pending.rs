//! Server-side memory of authorization attempts that are waiting for the
//! participant to come back from the provider.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use rand::{thread_rng, RngCore};

use super::pkce::{base64_url_encode, PkcePair};

/// Upper bound on attempts held at once. The oldest is dropped to make room.
pub const DEFAULT_MAX_PENDING: usize = 10_000;

struct Pending {
    verifier: String,
    created_at: Instant,
    /// Insertion order, used to find the oldest entry when full
    seq: u64,
}

#[derive(Default)]
struct Entries {
    by_token: HashMap<String, Pending>,
    next_seq: u64,
}

/// Maps opaque `state` tokens to PKCE verifiers until the callback arrives.
///
/// Entries are single-use, expire after `ttl`, and at most `max_entries` are kept.
#[derive(Clone)]
pub struct PendingAuthorizations {
    entries: Arc<Mutex<Entries>>,
    ttl: Duration,
    max_entries: usize,
}

impl PendingAuthorizations {
    pub fn new(ttl: Duration) -> Self {
        Self::with_limit(ttl, DEFAULT_MAX_PENDING)
    }

    pub fn with_limit(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(Entries::default())),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remember the verifier and hand back the state token that points at it
    pub fn begin(&self, pkce: &PkcePair) -> String {
        let mut token_bytes = [0u8; 32];
        thread_rng().fill_bytes(&mut token_bytes);
        let token = base64_url_encode(&token_bytes);

        let mut entries = self.lock();
        let ttl = self.ttl;
        entries
            .by_token
            .retain(|_, pending| pending.created_at.elapsed() < ttl);

        while entries.by_token.len() >= self.max_entries {
            let oldest = entries
                .by_token
                .iter()
                .min_by_key(|(_, pending)| pending.seq)
                .map(|(token, _)| token.clone());
            let Some(oldest) = oldest else { break };

            entries.by_token.remove(&oldest);
            tracing::warn!(
                max_entries = self.max_entries,
                "Pending authorizations full, dropped the oldest"
            );
        }

        let seq = entries.next_seq;
        entries.next_seq += 1;
        entries.by_token.insert(
            token.clone(),
            Pending {
                verifier: pkce.verifier.clone(),
                created_at: Instant::now(),
                seq,
            },
        );

        tracing::debug!(pending = entries.by_token.len(), "Stored pending authorization");
        token
    }

    /// Remove and return the verifier for `token`, if it exists and is still fresh
    pub fn take(&self, token: &str) -> Option<String> {
        let pending = self.lock().by_token.remove(token)?;

        if pending.created_at.elapsed() >= self.ttl {
            tracing::info!("Pending authorization expired before the callback arrived");
            return None;
        }

        Some(pending.verifier)
    }

    pub fn len(&self) -> usize {
        self.lock().by_token.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_recovers_verifier_once() {
        let pending = PendingAuthorizations::new(Duration::from_secs(600));
        let pkce = PkcePair::generate();

        let token = pending.begin(&pkce);
        assert_ne!(token, pkce.verifier);
        assert_eq!(pending.len(), 1);

        assert_eq!(pending.take(&token), Some(pkce.verifier.clone()));
        assert_eq!(pending.take(&token), None);
        assert!(pending.is_empty());
    }

    #[test]
    fn test_unknown_token_is_not_recoverable() {
        let pending = PendingAuthorizations::new(Duration::from_secs(600));
        pending.begin(&PkcePair::generate());

        assert_eq!(pending.take("not-a-token"), None);
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn test_expired_entries_are_dropped() {
        let pending = PendingAuthorizations::new(Duration::ZERO);
        let token = pending.begin(&PkcePair::generate());

        assert_eq!(pending.take(&token), None);
    }

    #[test]
    fn test_begin_sweeps_expired_entries() {
        let pending = PendingAuthorizations::new(Duration::ZERO);
        pending.begin(&PkcePair::generate());
        pending.begin(&PkcePair::generate());

        // Each insert clears whatever had already expired
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn test_full_store_drops_oldest_attempts() {
        let pending = PendingAuthorizations::with_limit(Duration::from_secs(600), 3);
        let attempts: Vec<(String, PkcePair)> = (0..5)
            .map(|_| {
                let pkce = PkcePair::generate();
                (pending.begin(&pkce), pkce)
            })
            .collect();

        assert_eq!(pending.len(), 3);
        assert_eq!(pending.take(&attempts[0].0), None);
        assert_eq!(pending.take(&attempts[1].0), None);
        for (token, pkce) in &attempts[2..] {
            assert_eq!(pending.take(token), Some(pkce.verifier.clone()));
        }
    }

    #[test]
    fn test_clones_share_entries() {
        let pending = PendingAuthorizations::new(Duration::from_secs(600));
        let other = pending.clone();
        let pkce = PkcePair::generate();

        let token = pending.begin(&pkce);
        assert_eq!(other.take(&token), Some(pkce.verifier));
    }
}
