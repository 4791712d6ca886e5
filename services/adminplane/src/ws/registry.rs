//! Registry of live WebSocket sessions.
//!
//! # Purpose and responsibility
//! Indexes sessions by id and by user so server code can push an [`Envelope`]
//! to one session, every session of a user, every session of a user type, or
//! everyone.
//!
//! # Key invariants
//! - Both indices live behind one lock, so a session is either in both or in
//!   neither. Empty per-user lists are dropped.
//! - Fan-out clones the target list under the read lock and writes after
//!   releasing it; a slow connection never blocks registry mutation.
//! - Each session serializes its own writes through a per-session mutex, so
//!   frames never interleave on the wire.
//! - Delivery is best effort. A failed write is counted and logged, and the
//!   session stays registered until its connection task removes it.
//! - Each write is bounded by the registry's send timeout, so one stalled peer
//!   cannot hold a fan-out open; an expired write counts as a failure.
use super::message::Envelope;
use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::SinkExt;
use futures::future::join_all;
use futures::stream::SplitSink;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use warden_authz::{Identity, TenantId, UserId};

#[derive(Debug, Error)]
pub enum SendError {
    #[error("connection closed")]
    Closed,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("send timed out after {0:?}")]
    Timeout(Duration),
}

/// Upper bound on one write, including the wait for the session's lock.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Outbound half of a connection.
#[async_trait]
pub trait SessionSink: Send {
    async fn send_text(&mut self, text: String) -> Result<(), SendError>;
    async fn close(&mut self) -> Result<(), SendError>;
}

#[async_trait]
impl SessionSink for SplitSink<WebSocket, Message> {
    async fn send_text(&mut self, text: String) -> Result<(), SendError> {
        SinkExt::send(self, Message::Text(text))
            .await
            .map_err(|err| SendError::Transport(err.to_string()))
    }

    async fn close(&mut self) -> Result<(), SendError> {
        SinkExt::close(self)
            .await
            .map_err(|err| SendError::Transport(err.to_string()))
    }
}

pub struct Session {
    id: String,
    user_id: UserId,
    user_type: i32,
    tenant_id: TenantId,
    sink: Mutex<Box<dyn SessionSink>>,
}

impl Session {
    pub fn new(id: impl Into<String>, identity: &Identity, sink: Box<dyn SessionSink>) -> Self {
        Self {
            id: id.into(),
            user_id: identity.user_id,
            user_type: identity.user_type,
            tenant_id: identity.tenant_id,
            sink: Mutex::new(sink),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn user_type(&self) -> i32 {
        self.user_type
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub async fn send_text(&self, text: String) -> Result<(), SendError> {
        self.sink.lock().await.send_text(text).await
    }

    pub async fn send(&self, envelope: &Envelope) -> Result<(), SendError> {
        self.send_text(envelope.to_text()?).await
    }

    pub async fn close(&self) -> Result<(), SendError> {
        self.sink.lock().await.close().await
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("user_type", &self.user_type)
            .field("tenant_id", &self.tenant_id)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct Indices {
    sessions: HashMap<String, Arc<Session>>,
    by_user: HashMap<UserId, Vec<Arc<Session>>>,
}

pub struct SessionRegistry {
    inner: RwLock<Indices>,
    send_timeout: Duration,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self {
            inner: RwLock::new(Indices::default()),
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_send_timeout(mut self, send_timeout: Duration) -> Self {
        self.send_timeout = send_timeout;
        self
    }

    pub fn send_timeout(&self) -> Duration {
        self.send_timeout
    }

    fn read(&self) -> RwLockReadGuard<'_, Indices> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Indices> {
        self.inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register `session`. Returns `false` if its id is already present.
    pub fn add(&self, session: Arc<Session>) -> bool {
        let len = {
            let mut indices = self.write();
            if indices.sessions.contains_key(session.id()) {
                return false;
            }
            indices
                .by_user
                .entry(session.user_id())
                .or_default()
                .push(session.clone());
            indices.sessions.insert(session.id().to_string(), session);
            indices.sessions.len()
        };
        metrics::gauge!("warden_ws_sessions").set(len as f64);
        true
    }

    pub fn remove(&self, id: &str) -> Option<Arc<Session>> {
        let (removed, len) = {
            let mut indices = self.write();
            let removed = indices.sessions.remove(id);
            if let Some(session) = &removed {
                let user = session.user_id();
                if let Some(list) = indices.by_user.get_mut(&user) {
                    list.retain(|candidate| candidate.id() != id);
                    if list.is_empty() {
                        indices.by_user.remove(&user);
                    }
                }
            }
            (removed, indices.sessions.len())
        };
        metrics::gauge!("warden_ws_sessions").set(len as f64);
        removed
    }

    pub fn get_by_user(&self, user: UserId) -> Vec<Arc<Session>> {
        self.read().by_user.get(&user).cloned().unwrap_or_default()
    }

    pub fn get_by_session(&self, id: &str) -> Option<Arc<Session>> {
        self.read().sessions.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write `envelope` to every session of `user`; returns successful writes.
    pub async fn send(&self, user: UserId, envelope: &Envelope) -> usize {
        let targets = self.get_by_user(user);
        deliver(targets, envelope, self.send_timeout).await
    }

    pub async fn send_to(&self, id: &str, envelope: &Envelope) -> bool {
        let targets: Vec<_> = self.get_by_session(id).into_iter().collect();
        deliver(targets, envelope, self.send_timeout).await == 1
    }

    pub async fn broadcast(&self, envelope: &Envelope) -> usize {
        let targets: Vec<_> = self.read().sessions.values().cloned().collect();
        deliver(targets, envelope, self.send_timeout).await
    }

    pub async fn broadcast_by_user_type(&self, user_type: i32, envelope: &Envelope) -> usize {
        let targets: Vec<_> = self
            .read()
            .sessions
            .values()
            .filter(|session| session.user_type() == user_type)
            .cloned()
            .collect();
        deliver(targets, envelope, self.send_timeout).await
    }
}

async fn deliver(targets: Vec<Arc<Session>>, envelope: &Envelope, limit: Duration) -> usize {
    if targets.is_empty() {
        return 0;
    }
    let text = match envelope.to_text() {
        Ok(text) => text,
        Err(err) => {
            tracing::warn!(
                error = %err,
                message_type = %envelope.message_type,
                "envelope encode failed"
            );
            return 0;
        }
    };
    let results = join_all(targets.iter().map(|session| {
        let text = text.clone();
        async move {
            let result = match tokio::time::timeout(limit, session.send_text(text)).await {
                Ok(result) => result,
                Err(_) => Err(SendError::Timeout(limit)),
            };
            (session.id(), result)
        }
    }))
    .await;
    let mut delivered = 0;
    for (id, result) in results {
        match result {
            Ok(()) => delivered += 1,
            Err(err) => {
                metrics::counter!("warden_ws_send_failures_total").increment(1);
                tracing::debug!(session_id = id, error = %err, "websocket send failed");
            }
        }
    }
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;
    use warden_authz::{USER_TYPE_ADMIN, USER_TYPE_MEMBER};

    struct StalledSink;

    #[async_trait]
    impl SessionSink for StalledSink {
        async fn send_text(&mut self, _text: String) -> Result<(), SendError> {
            std::future::pending().await
        }

        async fn close(&mut self) -> Result<(), SendError> {
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct RecordingSink {
        frames: Arc<StdMutex<Vec<String>>>,
        fail: bool,
    }

    impl RecordingSink {
        fn frames(&self) -> Vec<String> {
            self.frames.lock().expect("frames").clone()
        }
    }

    #[async_trait]
    impl SessionSink for RecordingSink {
        async fn send_text(&mut self, text: String) -> Result<(), SendError> {
            if self.fail {
                return Err(SendError::Closed);
            }
            self.frames.lock().expect("frames").push(text);
            Ok(())
        }

        async fn close(&mut self) -> Result<(), SendError> {
            Ok(())
        }
    }

    fn session(id: &str, user: i64, user_type: i32) -> (Arc<Session>, RecordingSink) {
        let sink = RecordingSink::default();
        let identity = Identity::new(UserId::new(user), user_type, TenantId::new(1));
        (
            Arc::new(Session::new(id, &identity, Box::new(sink.clone()))),
            sink,
        )
    }

    #[test]
    fn add_remove_keeps_indices_in_step() {
        let registry = SessionRegistry::new();
        let (s1, _) = session("s1", 9, USER_TYPE_ADMIN);
        let (s2, _) = session("s2", 9, USER_TYPE_ADMIN);
        assert!(registry.add(s1.clone()));
        assert!(!registry.add(s1.clone()), "duplicate id");
        assert!(registry.add(s2));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get_by_user(UserId::new(9)).len(), 2);

        let removed = registry.remove("s1").expect("removed");
        assert_eq!(removed.id(), "s1");
        assert!(registry.get_by_session("s1").is_none());
        assert_eq!(registry.get_by_user(UserId::new(9)).len(), 1);

        registry.remove("s2");
        assert!(registry.is_empty());
        assert!(registry.read().by_user.is_empty());
        assert!(registry.remove("s2").is_none());
    }

    #[test]
    fn add_then_remove_restores_state() {
        let registry = SessionRegistry::new();
        let (s1, _) = session("s1", 1, USER_TYPE_ADMIN);
        registry.add(s1);
        let (s2, _) = session("s2", 2, USER_TYPE_ADMIN);
        registry.add(s2);
        registry.remove("s2");
        assert_eq!(registry.len(), 1);
        assert!(registry.get_by_user(UserId::new(2)).is_empty());
        assert_eq!(registry.get_by_user(UserId::new(1)).len(), 1);
    }

    #[tokio::test]
    async fn send_reaches_every_session_of_user() {
        let registry = SessionRegistry::new();
        let (s1, sink1) = session("s1", 9, USER_TYPE_ADMIN);
        let (s2, sink2) = session("s2", 9, USER_TYPE_ADMIN);
        let (s3, sink3) = session("s3", 10, USER_TYPE_ADMIN);
        registry.add(s1);
        registry.add(s2);
        registry.add(s3);

        let message = Envelope::new("notice", json!("m"));
        assert_eq!(registry.send(UserId::new(9), &message).await, 2);
        assert_eq!(sink1.frames().len(), 1);
        assert_eq!(sink2.frames().len(), 1);
        assert!(sink3.frames().is_empty());

        registry.remove("s1");
        assert_eq!(registry.send(UserId::new(9), &message).await, 1);
        assert_eq!(sink1.frames().len(), 1);
        assert_eq!(sink2.frames().len(), 2);
    }

    #[tokio::test]
    async fn targeted_and_broadcast_sends() {
        let registry = SessionRegistry::new();
        let (admin, admin_sink) = session("a", 1, USER_TYPE_ADMIN);
        let (member, member_sink) = session("m", 2, USER_TYPE_MEMBER);
        registry.add(admin);
        registry.add(member);
        let message = Envelope::new("notice", json!({}));

        assert!(registry.send_to("m", &message).await);
        assert!(!registry.send_to("missing", &message).await);
        assert_eq!(member_sink.frames().len(), 1);

        assert_eq!(
            registry
                .broadcast_by_user_type(USER_TYPE_ADMIN, &message)
                .await,
            1
        );
        assert_eq!(admin_sink.frames().len(), 1);

        assert_eq!(registry.broadcast(&message).await, 2);
        assert_eq!(admin_sink.frames().len(), 2);
        assert_eq!(member_sink.frames().len(), 2);
    }

    #[tokio::test]
    async fn failed_writes_are_swallowed() {
        let registry = SessionRegistry::new();
        let (good, good_sink) = session("good", 9, USER_TYPE_ADMIN);
        let broken = RecordingSink {
            fail: true,
            ..RecordingSink::default()
        };
        let identity = Identity::new(UserId::new(9), USER_TYPE_ADMIN, TenantId::new(1));
        registry.add(good);
        registry.add(Arc::new(Session::new("bad", &identity, Box::new(broken))));

        let delivered = registry
            .send(UserId::new(9), &Envelope::new("notice", json!(1)))
            .await;
        assert_eq!(delivered, 1);
        assert_eq!(good_sink.frames().len(), 1);
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn stalled_session_does_not_hold_up_fan_out() {
        let registry = SessionRegistry::new().with_send_timeout(Duration::from_millis(50));
        let (good, good_sink) = session("good", 9, USER_TYPE_ADMIN);
        let identity = Identity::new(UserId::new(9), USER_TYPE_ADMIN, TenantId::new(1));
        registry.add(good);
        registry.add(Arc::new(Session::new(
            "stalled",
            &identity,
            Box::new(StalledSink),
        )));

        let delivered = tokio::time::timeout(
            Duration::from_secs(2),
            registry.send(UserId::new(9), &Envelope::new("notice", json!(1))),
        )
        .await
        .expect("fan-out finishes despite the stalled peer");
        assert_eq!(delivered, 1);
        assert_eq!(good_sink.frames().len(), 1);
        assert_eq!(registry.len(), 2);

        // A timed-out write releases the session lock.
        assert!(
            !registry
                .send_to("stalled", &Envelope::new("notice", json!(2)))
                .await
        );
        assert_eq!(SessionRegistry::new().send_timeout(), DEFAULT_SEND_TIMEOUT);
    }
}
