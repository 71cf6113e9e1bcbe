//! Test Helper Utilities
//!
//! Shared utilities for testing tripnest-favorites

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tripnest_common::events::{DesiredState, EventBus, FavoritesEvent};
use tripnest_favorites::persistence::MemoryPersistence;
use tripnest_favorites::remote::{RemoteAck, RemoteFavorite, RemoteFavoritesApi, ToggleRequest};
use tripnest_favorites::{FavoritesService, RemoteError};

/// Reply used when the remote answers without being gated
#[derive(Debug, Clone, Copy)]
pub enum AutoReply {
    Ok,
    NetworkError,
    NotFound,
}

impl AutoReply {
    fn build(self, desired: DesiredState) -> Result<RemoteAck, RemoteError> {
        match self {
            AutoReply::Ok => Ok(RemoteAck::Applied),
            AutoReply::NetworkError => Err(RemoteError::Network("connection reset".to_string())),
            AutoReply::NotFound if desired == DesiredState::Absent => Ok(RemoteAck::AlreadyAbsent),
            AutoReply::NotFound => Err(RemoteError::Status {
                status: 404,
                body: "not found".to_string(),
            }),
        }
    }
}

type Responder = oneshot::Sender<Result<RemoteAck, RemoteError>>;

/// Remote whose toggle responses are released by the test, in any order
pub struct ScriptedRemote {
    auto: Option<AutoReply>,
    calls: Mutex<Vec<(ToggleRequest, DesiredState)>>,
    responders: Mutex<Vec<Option<Responder>>>,
    list: Mutex<Option<Vec<RemoteFavorite>>>,
    list_calls: Mutex<usize>,
    list_gate: Mutex<Option<oneshot::Receiver<()>>>,
}

impl ScriptedRemote {
    /// Every toggle waits for `respond`
    pub fn gated() -> Arc<Self> {
        Arc::new(Self::with_auto(None))
    }

    /// Every toggle answers immediately
    pub fn auto(reply: AutoReply) -> Arc<Self> {
        Arc::new(Self::with_auto(Some(reply)))
    }

    fn with_auto(auto: Option<AutoReply>) -> Self {
        Self {
            auto,
            calls: Mutex::new(Vec::new()),
            responders: Mutex::new(Vec::new()),
            list: Mutex::new(None),
            list_calls: Mutex::new(0),
            list_gate: Mutex::new(None),
        }
    }

    /// `None` makes `list_favorites` fail
    pub fn set_list(&self, list: Option<Vec<RemoteFavorite>>) {
        *self.list.lock() = list;
    }

    /// Hold the next `list_favorites` until the returned sender fires
    ///
    /// The list is read when released, not when requested.
    pub fn hold_list(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.list_gate.lock() = Some(rx);
        tx
    }

    pub async fn wait_for_list_calls(&self, count: usize) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while *self.list_calls.lock() < count {
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for {} list calls",
                count
            );
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }

    pub fn calls(&self) -> Vec<(ToggleRequest, DesiredState)> {
        self.calls.lock().clone()
    }

    pub async fn wait_for_calls(&self, count: usize) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while self.calls.lock().len() < count {
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for {} remote calls",
                count
            );
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }

    /// Release the response for the `index`-th toggle call (0-based)
    pub fn respond(&self, index: usize, result: Result<RemoteAck, RemoteError>) {
        let responder = self
            .responders
            .lock()
            .get_mut(index)
            .and_then(Option::take)
            .expect("no pending call at that index");
        let _ = responder.send(result);
    }
}

#[async_trait]
impl RemoteFavoritesApi for ScriptedRemote {
    async fn set_favorite(
        &self,
        request: &ToggleRequest,
        desired: DesiredState,
    ) -> Result<RemoteAck, RemoteError> {
        let receiver = {
            // register call and responder together so indexes line up
            let mut responders = self.responders.lock();
            self.calls.lock().push((request.clone(), desired));
            if let Some(reply) = self.auto {
                responders.push(None);
                return reply.build(desired);
            }
            let (tx, rx) = oneshot::channel();
            responders.push(Some(tx));
            rx
        };

        receiver
            .await
            .unwrap_or_else(|_| Err(RemoteError::Network("responder dropped".to_string())))
    }

    async fn list_favorites(&self) -> Result<Vec<RemoteFavorite>, RemoteError> {
        *self.list_calls.lock() += 1;
        let gate = self.list_gate.lock().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        self.list
            .lock()
            .clone()
            .ok_or_else(|| RemoteError::Network("backend unreachable".to_string()))
    }
}

pub struct Harness {
    pub service: FavoritesService,
    pub remote: Arc<ScriptedRemote>,
    pub persistence: Arc<MemoryPersistence>,
    pub events: Arc<EventBus>,
}

pub fn harness(remote: Arc<ScriptedRemote>) -> Harness {
    harness_with_persistence(remote, Arc::new(MemoryPersistence::new()))
}

pub fn harness_with_persistence(
    remote: Arc<ScriptedRemote>,
    persistence: Arc<MemoryPersistence>,
) -> Harness {
    let events = Arc::new(EventBus::new(64));
    let service = FavoritesService::new(remote.clone(), persistence.clone(), events.clone());
    Harness {
        service,
        remote,
        persistence,
        events,
    }
}

/// Drain whatever events are currently buffered
pub fn drain_events(rx: &mut tokio::sync::broadcast::Receiver<FavoritesEvent>) -> Vec<FavoritesEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
