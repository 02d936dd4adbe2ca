//! `SessionTable`: a concurrent map from session id to [`Session`], with a
//! monotonic last-touched timestamp and a janitor that evicts idle
//! sessions. Generic over the per-session engine type so this crate never
//! depends on `gateway-server`'s `McpInstance` — the engine only needs to
//! know how to close itself.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use gateway_core::error::{GatewayError, GatewayResult};
use gateway_core::identifiers::generate_session_id;
use tokio::sync::RwLock;

use crate::stream::StreamTransport;

/// Idle threshold after which a session's last-touched age evicts it
/// (spec 3, Session invariant 3).
pub const SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Janitor tick interval (spec 4.7).
pub const JANITOR_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[async_trait]
pub trait SessionEngine: Send + Sync {
    /// Called once, when the session is evicted or the server shuts down.
    async fn close(&self);
}

pub struct Session<T> {
    pub id: String,
    pub engine: Arc<T>,
    pub transport: Arc<StreamTransport>,
    pub created_at: Instant,
    last_touched: RwLock<Instant>,
}

impl<T> Session<T> {
    pub async fn touch(&self) {
        *self.last_touched.write().await = Instant::now();
    }

    pub async fn idle_for(&self) -> Duration {
        self.last_touched.read().await.elapsed()
    }
}

pub struct SessionTable<T: SessionEngine> {
    sessions: RwLock<HashMap<String, Arc<Session<T>>>>,
}

impl<T: SessionEngine + 'static> SessionTable<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sessions: RwLock::new(HashMap::new()),
        })
    }

    /// If `session_id` is absent, mints a fresh id, constructs a new
    /// session via `make_engine`, and registers it. If present, the
    /// request must be sticky to an existing session: an unknown id fails
    /// `session_not_found` rather than silently minting a replacement — a
    /// caller that lost its session (eviction, restart) must notice and
    /// re-bind with no session id.
    pub async fn bind_or_create<F>(self: &Arc<Self>, session_id: Option<&str>, make_engine: F) -> GatewayResult<Arc<Session<T>>>
    where
        F: FnOnce(&str) -> T,
    {
        if let Some(id) = session_id {
            return match self.sessions.read().await.get(id).cloned() {
                Some(existing) => {
                    existing.touch().await;
                    Ok(existing)
                }
                None => Err(GatewayError::SessionNotFound(id.to_string())),
            };
        }

        let id = generate_session_id();
        let session = Arc::new(Session {
            engine: Arc::new(make_engine(&id)),
            id: id.clone(),
            transport: StreamTransport::new(),
            created_at: Instant::now(),
            last_touched: RwLock::new(Instant::now()),
        });
        self.sessions.write().await.insert(id, session.clone());
        Ok(session)
    }

    pub async fn get_by_id(&self, id: &str) -> Option<Arc<Session<T>>> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Removes and closes one session by id. A no-op if `id` is unknown.
    pub async fn remove(&self, id: &str) {
        self.evict(id).await;
    }

    async fn evict(&self, id: &str) {
        let removed = self.sessions.write().await.remove(id);
        if let Some(session) = removed {
            session.transport.close().await;
            session.engine.close().await;
        }
    }

    /// One janitor pass: evicts every session idle beyond
    /// [`SESSION_IDLE_TIMEOUT`].
    pub async fn evict_idle(&self) {
        let stale: Vec<String> = {
            let sessions = self.sessions.read().await;
            let mut stale = Vec::new();
            for (id, session) in sessions.iter() {
                if session.idle_for().await > SESSION_IDLE_TIMEOUT {
                    stale.push(id.clone());
                }
            }
            stale
        };
        for id in stale {
            self.evict(&id).await;
        }
    }

    /// Closes every session; used on server shutdown.
    pub async fn close_all(&self) {
        let ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        for id in ids {
            self.evict(&id).await;
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

/// Spawns the janitor task: one tick every [`JANITOR_INTERVAL`].
pub fn spawn_janitor<T: SessionEngine + 'static>(table: Arc<SessionTable<T>>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(JANITOR_INTERVAL);
        loop {
            interval.tick().await;
            table.evict_idle().await;
        }
    })
}
