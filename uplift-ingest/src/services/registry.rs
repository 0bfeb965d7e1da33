//! Concurrency-safe session registry
//!
//! Single source of truth for all sessions, in flight and recently
//! completed. The outer lock guards the index (insertion order preserved for
//! deterministic listing); each session carries its own lock, so updates to
//! different sessions proceed independently while updates to the same
//! session are mutually exclusive. This prevents lost updates between the
//! transfer driver and the poller.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{SessionFilter, UploadSession};
use uplift_common::{Error, Result};

#[derive(Default)]
struct RegistryIndex {
    /// Session ids in insertion order
    order: Vec<Uuid>,
    sessions: HashMap<Uuid, Arc<RwLock<UploadSession>>>,
}

/// Registry of all upload sessions
#[derive(Default)]
pub struct SessionRegistry {
    index: RwLock<RegistryIndex>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session; at most one live entry per id
    pub async fn register(&self, session: UploadSession) -> Result<()> {
        let mut index = self.index.write().await;
        let id = session.session_id();
        if index.sessions.contains_key(&id) {
            return Err(Error::Internal(format!("duplicate session id {}", id)));
        }
        index.order.push(id);
        index.sessions.insert(id, Arc::new(RwLock::new(session)));
        Ok(())
    }

    /// Snapshot of one session
    pub async fn get(&self, id: Uuid) -> Option<UploadSession> {
        let entry = self.entry(id).await?;
        let session = entry.read().await;
        Some(session.clone())
    }

    /// Atomic read-modify-write of one session
    ///
    /// The mutator runs under the session's own write lock; the index lock
    /// is released first, so a slow mutation on one session never blocks
    /// operations on others. Returns None when the id is unknown.
    pub async fn update<F, R>(&self, id: Uuid, mutator: F) -> Option<R>
    where
        F: FnOnce(&mut UploadSession) -> R,
    {
        let entry = self.entry(id).await?;
        let mut session = entry.write().await;
        Some(mutator(&mut session))
    }

    /// Ordered snapshots of all sessions, optionally filtered
    pub async fn list(&self, filter: Option<SessionFilter>) -> Vec<UploadSession> {
        let entries: Vec<Arc<RwLock<UploadSession>>> = {
            let index = self.index.read().await;
            index
                .order
                .iter()
                .filter_map(|id| index.sessions.get(id).cloned())
                .collect()
        };

        let mut snapshots = Vec::with_capacity(entries.len());
        for entry in entries {
            let session = entry.read().await;
            if filter.map_or(true, |f| session.matches(f)) {
                snapshots.push(session.clone());
            }
        }
        snapshots
    }

    /// Remove one session, returning its final snapshot
    pub async fn evict(&self, id: Uuid) -> Option<UploadSession> {
        let entry = {
            let mut index = self.index.write().await;
            let entry = index.sessions.remove(&id)?;
            index.order.retain(|other| *other != id);
            entry
        };
        let session = entry.read().await;
        Some(session.clone())
    }

    /// Retention sweep: drop terminal sessions not updated within `max_age`
    ///
    /// In-flight sessions are never swept; they either progress or
    /// accumulate toward an escalation threshold.
    pub async fn evict_expired(&self, max_age: Duration) -> Vec<Uuid> {
        let cutoff = Utc::now() - max_age;
        let mut expired = Vec::new();
        for session in self.list(Some(SessionFilter::Terminal)).await {
            if session.updated_at() < cutoff {
                expired.push(session.session_id());
            }
        }
        if !expired.is_empty() {
            let mut index = self.index.write().await;
            for id in &expired {
                index.sessions.remove(id);
            }
            index.order.retain(|id| !expired.contains(id));
        }
        expired
    }

    /// Number of registered sessions
    pub async fn len(&self) -> usize {
        self.index.read().await.order.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// True while any session is non-terminal; drives poller idling
    pub async fn has_active(&self) -> bool {
        !self.list(Some(SessionFilter::Active)).await.is_empty()
    }

    async fn entry(&self, id: Uuid) -> Option<Arc<RwLock<UploadSession>>> {
        self.index.read().await.sessions.get(&id).cloned()
    }
}
