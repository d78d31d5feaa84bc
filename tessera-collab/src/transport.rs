//! Poll transport and the background driver that runs it.
//!
//! The sync channel is strict request/response: one `POST` per tick to
//! the updates endpoint, bincode body both ways. [`Transport`] abstracts
//! where the other end lives: over HTTP for real deployments, or an
//! in-process [`SyncRelay`](crate::relay::SyncRelay) for tests and
//! single-host setups, which also makes every integration test
//! deterministic by driving [`PollDriver::poll_once`] directly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use crate::awareness::PresenceTracker;
use crate::config::CollabConfig;
use crate::protocol::{PollRequest, PollResponse, ProtocolError};
use crate::relay::SyncRelay;
use crate::session::DocumentSession;

/// Relative path of the updates endpoint under the configured base URL.
pub const UPDATES_ROUTE: &str = "tessera-sync/v1/updates";

/// Where poll requests go.
pub enum Transport {
    Http(HttpTransport),
    Local(LocalTransport),
}

impl Transport {
    pub async fn exchange(&self, req: &PollRequest) -> Result<PollResponse, ProtocolError> {
        match self {
            Transport::Http(t) => t.exchange(req).await,
            Transport::Local(t) => t.exchange(req),
        }
    }
}

/// HTTP poll transport.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(config: &CollabConfig) -> Result<Self, ProtocolError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ProtocolError::Transport(e.to_string()))?;
        let endpoint = format!(
            "{}/{UPDATES_ROUTE}",
            config.base_url.trim_end_matches('/')
        );
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn exchange(&self, req: &PollRequest) -> Result<PollResponse, ProtocolError> {
        let body = req.encode()?;
        let resp = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .send()
            .await
            .map_err(|e| ProtocolError::Transport(e.to_string()))?
            .error_for_status()
            .map_err(|e| ProtocolError::Transport(e.to_string()))?;
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| ProtocolError::Transport(e.to_string()))?;
        PollResponse::decode(&bytes)
    }
}

/// In-process transport against a shared relay.
pub struct LocalTransport {
    relay: Arc<SyncRelay>,
}

impl LocalTransport {
    pub fn new(relay: Arc<SyncRelay>) -> Self {
        Self { relay }
    }

    fn exchange(&self, req: &PollRequest) -> Result<PollResponse, ProtocolError> {
        self.relay.handle(req)
    }
}

/// Drives one session's poll loop.
pub struct PollDriver {
    session: Arc<DocumentSession>,
    presence: Arc<PresenceTracker>,
    transport: Transport,
}

impl PollDriver {
    pub fn new(
        session: Arc<DocumentSession>,
        presence: Arc<PresenceTracker>,
        transport: Transport,
    ) -> Self {
        Self {
            session,
            presence,
            transport,
        }
    }

    /// One full tick: build the request, exchange, integrate.
    ///
    /// A failure counts toward the disconnect threshold; queued updates
    /// stay queued and are retransmitted on the next tick.
    pub async fn poll_once(&self) -> Result<(), ProtocolError> {
        let req = self.session.build_request(Some(self.presence.payload()));
        match self.transport.exchange(&req).await {
            Ok(resp) => {
                if let Err(e) = self.session.absorb_response(&resp) {
                    log::error!("[sync {}] bad server diff: {e}", self.session.key());
                    return Err(ProtocolError::Deserialization(e.to_string()));
                }
                self.presence.record_batch(resp.peers);
                Ok(())
            }
            Err(e) => {
                let failures = self.presence.record_failure();
                log::warn!(
                    "[sync {}] poll failed ({failures} consecutive): {e}",
                    self.session.key()
                );
                Err(e)
            }
        }
    }

    /// Poll until `stop` is set, then flush once and exit.
    ///
    /// The first poll happens immediately so a fresh session syncs
    /// without waiting a full interval. `wake` short-circuits the
    /// sleep, both for teardown and for urgent flushes.
    pub async fn run(self, stop: Arc<AtomicBool>, wake: Arc<Notify>, interval: Duration) {
        loop {
            let _ = self.poll_once().await;
            if stop.load(Ordering::Acquire) {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = wake.notified() => {}
            }
            if stop.load(Ordering::Acquire) {
                // Final flush so edits made since the last tick reach
                // the relay before the session is torn down.
                let _ = self.poll_once().await;
                break;
            }
        }
        log::debug!("[sync {}] poll loop stopped", self.session.key());
    }
}
