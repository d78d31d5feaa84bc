//! Session registry: shared, reference-counted collaboration sessions.
//!
//! Several editor surfaces can look at the same object at once (the
//! canvas, an inspector, a preview pane). They must share one session,
//! one poll loop and one undo history, so the registry hands out
//! reference-counted [`CollabHandle`]s keyed by [`SessionKey`]. The
//! first acquire creates the session and spawns its poll loop; the last
//! release signals the loop, which flushes pending edits once and
//! exits.
//!
//! The registry is constructed once and passed where needed; there is
//! no process-global instance.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use crate::awareness::PresenceTracker;
use crate::config::CollabConfig;
use crate::handle::CollabHandle;
use crate::protocol::{CollaboratorInfo, ProtocolError, SessionKey};
use crate::relay::SyncRelay;
use crate::session::DocumentSession;
use crate::transport::{HttpTransport, LocalTransport, PollDriver, Transport};

enum TransportSource {
    Http,
    Local(Arc<SyncRelay>),
}

struct Entry {
    session: Arc<DocumentSession>,
    presence: Arc<PresenceTracker>,
    stop: Arc<AtomicBool>,
    wake: Arc<Notify>,
    refs: usize,
}

/// Owns every live session in the process.
pub struct CollabRegistry {
    config: CollabConfig,
    source: TransportSource,
    entries: Mutex<HashMap<SessionKey, Entry>>,
}

impl CollabRegistry {
    /// Registry syncing over HTTP against `config.base_url`.
    pub fn new(config: CollabConfig) -> Self {
        Self {
            config,
            source: TransportSource::Http,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Registry syncing against an in-process relay.
    pub fn with_relay(config: CollabConfig, relay: Arc<SyncRelay>) -> Self {
        Self {
            config,
            source: TransportSource::Local(relay),
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<SessionKey, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn make_transport(&self) -> Result<Transport, ProtocolError> {
        match &self.source {
            TransportSource::Http => Ok(Transport::Http(HttpTransport::new(&self.config)?)),
            TransportSource::Local(relay) => {
                Ok(Transport::Local(LocalTransport::new(relay.clone())))
            }
        }
    }

    /// Join (or create) the session for `key`.
    ///
    /// Returns `None` when collaboration is disabled or the key names
    /// nothing; callers then run fully local with no sync. Must be
    /// called from within a Tokio runtime, which hosts the poll loop.
    pub fn acquire(
        self: &Arc<Self>,
        key: SessionKey,
        info: CollaboratorInfo,
    ) -> Option<CollabHandle> {
        if !self.config.enabled {
            log::debug!("[registry] collaboration disabled, not joining {key}");
            return None;
        }
        if !key.is_valid() {
            log::debug!("[registry] refusing invalid session key {key}");
            return None;
        }

        let mut entries = self.entries();
        if let Some(entry) = entries.get_mut(&key) {
            entry.refs += 1;
            return Some(CollabHandle::new(
                self.clone(),
                key,
                entry.session.clone(),
                entry.presence.clone(),
            ));
        }

        let transport = match self.make_transport() {
            Ok(t) => t,
            Err(e) => {
                log::error!("[registry] cannot build transport for {key}: {e}");
                return None;
            }
        };

        let session = Arc::new(DocumentSession::new(key.clone(), &self.config));
        let presence = Arc::new(PresenceTracker::new(info, &self.config));
        let stop = Arc::new(AtomicBool::new(false));
        let wake = Arc::new(Notify::new());

        let driver = PollDriver::new(session.clone(), presence.clone(), transport);
        tokio::spawn(driver.run(stop.clone(), wake.clone(), self.config.poll_interval));
        log::info!("[registry] session {key} created");

        entries.insert(
            key.clone(),
            Entry {
                session: session.clone(),
                presence: presence.clone(),
                stop,
                wake,
                refs: 1,
            },
        );
        Some(CollabHandle::new(self.clone(), key, session, presence))
    }

    /// Drop one reference. On the last one the poll loop is told to
    /// flush and stop, and the session is forgotten.
    pub(crate) fn release(&self, key: &SessionKey) {
        let mut entries = self.entries();
        let Some(entry) = entries.get_mut(key) else {
            return;
        };
        entry.refs -= 1;
        if entry.refs > 0 {
            return;
        }
        let entry = match entries.remove(key) {
            Some(e) => e,
            None => return,
        };
        entry.stop.store(true, Ordering::Release);
        entry.wake.notify_one();
        log::info!("[registry] session {key} released, flushing");
    }

    /// Ask a session's poll loop to run a tick as soon as possible.
    pub fn nudge(&self, key: &SessionKey) {
        if let Some(entry) = self.entries().get(key) {
            entry.wake.notify_one();
        }
    }

    pub fn session_count(&self) -> usize {
        self.entries().len()
    }

    pub fn ref_count(&self, key: &SessionKey) -> usize {
        self.entries().get(key).map_or(0, |e| e.refs)
    }
}
