//! `OAuthStateStore`: the only mutable global state in the auth flow.
//! Three TTL-keyed tables — pending authorizations, one-shot authorization
//! codes, refresh tokens — each bounded in capacity and swept every
//! minute. Single-use rows are taken-and-removed atomically under the
//! table's own write lock, never via a separate check-then-delete.

use chrono::{DateTime, Duration, Utc};
use gateway_core::error::{GatewayError, GatewayResult};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

pub const PENDING_AUTHORIZATION_TTL_MINS: i64 = 10;
pub const AUTHORIZATION_CODE_TTL_MINS: i64 = 10;
pub const REFRESH_TOKEN_TTL_DAYS: i64 = 30;

/// Bound on rows per table. Chosen generously above any realistic
/// in-flight flow count; exceeding it means either a client bug or abuse,
/// not a legitimate surge.
const TABLE_CAPACITY: usize = 10_000;

#[derive(Debug, Clone)]
pub struct PendingAuthorization {
    pub redirect_uri: String,
    pub code_challenge: String,
    pub caller_state: String,
    pub nonce: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct AuthorizationCode {
    pub redirect_uri: String,
    pub code_challenge: String,
    pub upstream_user_id: String,
    pub upstream_access_token: String,
    pub upstream_refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RefreshTokenRecord {
    pub upstream_user_id: String,
    pub upstream_access_token: String,
    pub upstream_refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

trait Expirable {
    fn expires_at(&self) -> DateTime<Utc>;
}
impl Expirable for PendingAuthorization {
    fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}
impl Expirable for AuthorizationCode {
    fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}
impl Expirable for RefreshTokenRecord {
    fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}

struct Table<T> {
    rows: HashMap<String, T>,
    insertion_order: VecDeque<String>,
}

impl<T: Expirable + Clone> Table<T> {
    fn new() -> Self {
        Self {
            rows: HashMap::new(),
            insertion_order: VecDeque::new(),
        }
    }

    fn insert(&mut self, key: String, value: T, now: DateTime<Utc>) -> GatewayResult<()> {
        if self.rows.len() >= TABLE_CAPACITY {
            if !self.evict_one_expired(now) {
                // No expired row to make room: evict the oldest unexpired
                // row, which fails that in-flight flow with server_error.
                if let Some(oldest) = self.insertion_order.pop_front() {
                    self.rows.remove(&oldest);
                } else {
                    return Err(GatewayError::ServerError("state store at capacity".to_string()));
                }
            }
        }
        self.rows.insert(key.clone(), value);
        self.insertion_order.push_back(key);
        Ok(())
    }

    fn evict_one_expired(&mut self, now: DateTime<Utc>) -> bool {
        if let Some(key) = self
            .rows
            .iter()
            .find(|(_, v)| v.expires_at() <= now)
            .map(|(k, _)| k.clone())
        {
            self.rows.remove(&key);
            self.insertion_order.retain(|k| k != &key);
            true
        } else {
            false
        }
    }

    /// Atomic take-and-remove: returns the row only if present and
    /// unexpired, removing it unconditionally if present (expired or not)
    /// so a replay can never observe a stale row twice.
    fn take(&mut self, key: &str, now: DateTime<Utc>) -> Option<T> {
        let value = self.rows.remove(key)?;
        self.insertion_order.retain(|k| k != key);
        if value.expires_at() <= now {
            None
        } else {
            Some(value)
        }
    }

    fn sweep_expired(&mut self, now: DateTime<Utc>) {
        let expired: Vec<String> = self
            .rows
            .iter()
            .filter(|(_, v)| v.expires_at() <= now)
            .map(|(k, _)| k.clone())
            .collect();
        for key in expired {
            self.rows.remove(&key);
            self.insertion_order.retain(|k| k != &key);
        }
    }
}

pub struct OAuthStateStore {
    pending: RwLock<Table<PendingAuthorization>>,
    codes: RwLock<Table<AuthorizationCode>>,
    refresh_tokens: RwLock<Table<RefreshTokenRecord>>,
}

impl OAuthStateStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            pending: RwLock::new(Table::new()),
            codes: RwLock::new(Table::new()),
            refresh_tokens: RwLock::new(Table::new()),
        })
    }

    pub async fn insert_pending(&self, key: String, row: PendingAuthorization, now: DateTime<Utc>) -> GatewayResult<()> {
        self.pending.write().await.insert(key, row, now)
    }

    /// Atomically consumes the pending-authorization row identified by
    /// `key`. Returns `None` if absent or expired — both map to the same
    /// caller-visible failure so a replay cannot distinguish "never
    /// existed" from "already consumed".
    pub async fn take_pending(&self, key: &str, now: DateTime<Utc>) -> Option<PendingAuthorization> {
        self.pending.write().await.take(key, now)
    }

    pub async fn insert_code(&self, key: String, row: AuthorizationCode, now: DateTime<Utc>) -> GatewayResult<()> {
        self.codes.write().await.insert(key, row, now)
    }

    pub async fn take_code(&self, key: &str, now: DateTime<Utc>) -> Option<AuthorizationCode> {
        self.codes.write().await.take(key, now)
    }

    pub async fn insert_refresh_token(&self, key: String, row: RefreshTokenRecord, now: DateTime<Utc>) -> GatewayResult<()> {
        self.refresh_tokens.write().await.insert(key, row, now)
    }

    /// Refresh tokens are looked up, not single-use by themselves — the
    /// grant optionally rotates the id (4.3), which is modeled as a
    /// take-then-reinsert-under-a-new-key by the caller.
    pub async fn take_refresh_token(&self, key: &str, now: DateTime<Utc>) -> Option<RefreshTokenRecord> {
        self.refresh_tokens.write().await.take(key, now)
    }

    /// Visits each table and removes expired rows. Run on a 1-minute tick
    /// by [`spawn_sweeper`].
    pub async fn sweep(&self, now: DateTime<Utc>) {
        self.pending.write().await.sweep_expired(now);
        self.codes.write().await.sweep_expired(now);
        self.refresh_tokens.write().await.sweep_expired(now);
    }
}

pub fn pending_authorization_expiry(now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::minutes(PENDING_AUTHORIZATION_TTL_MINS)
}

pub fn authorization_code_expiry(now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::minutes(AUTHORIZATION_CODE_TTL_MINS)
}

pub fn refresh_token_expiry(now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::days(REFRESH_TOKEN_TTL_DAYS)
}

/// Spawns the background sweeper: one tick per minute, per 4.3.
pub fn spawn_sweeper(store: Arc<OAuthStateStore>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            interval.tick().await;
            store.sweep(Utc::now()).await;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(now: DateTime<Utc>) -> PendingAuthorization {
        PendingAuthorization {
            redirect_uri: "http://localhost:5173/cb".to_string(),
            code_challenge: "chal".to_string(),
            caller_state: "abc".to_string(),
            nonce: "nonce".to_string(),
            expires_at: pending_authorization_expiry(now),
        }
    }

    #[tokio::test]
    async fn pending_authorization_is_single_use() {
        let store = OAuthStateStore::new();
        let now = Utc::now();
        store.insert_pending("K".to_string(), pending(now), now).await.unwrap();

        let first = store.take_pending("K", now).await;
        assert!(first.is_some());
        let second = store.take_pending("K", now).await;
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn expired_pending_authorization_is_not_returned() {
        let store = OAuthStateStore::new();
        let now = Utc::now();
        store.insert_pending("K".to_string(), pending(now), now).await.unwrap();

        let later = now + Duration::minutes(PENDING_AUTHORIZATION_TTL_MINS + 1);
        assert!(store.take_pending("K", later).await.is_none());
    }

    #[tokio::test]
    async fn concurrent_takes_resolve_exactly_once() {
        let store = OAuthStateStore::new();
        let now = Utc::now();
        store.insert_pending("K".to_string(), pending(now), now).await.unwrap();

        let (a, b) = tokio::join!(store.take_pending("K", now), store.take_pending("K", now));
        let successes = [a.is_some(), b.is_some()].iter().filter(|x| **x).count();
        assert_eq!(successes, 1);
    }

    #[tokio::test]
    async fn sweep_removes_expired_rows_only() {
        let store = OAuthStateStore::new();
        let now = Utc::now();
        store.insert_pending("fresh".to_string(), pending(now), now).await.unwrap();
        let mut stale = pending(now);
        stale.expires_at = now - Duration::minutes(1);
        store.insert_pending("stale".to_string(), stale, now).await.unwrap();

        store.sweep(now).await;

        assert!(store.take_pending("fresh", now).await.is_some());
        assert!(store.take_pending("stale", now).await.is_none());
    }
}
