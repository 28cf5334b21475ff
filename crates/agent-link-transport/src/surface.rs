//! Terminal surfaces that session output is written to.

use std::{
    collections::VecDeque,
    sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use bytes::Bytes;
use futures::{StreamExt, stream::BoxStream};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

/// Default scroll-back limit (1 MiB).
pub const DEFAULT_HISTORY_BYTES: usize = 1024 * 1024;

const LIVE_CAPACITY: usize = 1024;

/// Where a session writes agent output.
///
/// A session owns its surface for its whole life and calls
/// [`TerminalSurface::release`] exactly once when it closes.
pub trait TerminalSurface: Send + Sync {
    /// Write bytes verbatim.
    fn write(&self, data: &[u8]);

    /// Free buffers and detach listeners.
    fn release(&self);
}

struct Inner {
    history: VecDeque<Bytes>,
    total_bytes: usize,
    live: Option<broadcast::Sender<Bytes>>,
}

/// Scroll-back buffer with live fan-out.
///
/// Late subscribers receive the retained history first and then switch to
/// live output. Oldest chunks are evicted once the byte limit is exceeded.
pub struct ScreenBuffer {
    inner: RwLock<Inner>,
    limit: usize,
}

impl Default for ScreenBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl ScreenBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_HISTORY_BYTES)
    }

    /// Buffer retaining at most `limit` bytes of history.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        let (live, _) = broadcast::channel(LIVE_CAPACITY);
        Self {
            inner: RwLock::new(Inner {
                history: VecDeque::with_capacity(32),
                total_bytes: 0,
                live: Some(live),
            }),
            limit,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_lock(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a chunk. Ignored once released.
    pub fn push(&self, chunk: Bytes) {
        if chunk.is_empty() {
            return;
        }
        let mut inner = self.write_lock();
        let Some(live) = &inner.live else {
            return;
        };
        let _ = live.send(chunk.clone());

        // History keeps only the tail of an oversized chunk.
        let chunk = if chunk.len() > self.limit {
            chunk.slice(chunk.len() - self.limit..)
        } else {
            chunk
        };
        if chunk.is_empty() {
            return;
        }
        let bytes = chunk.len();
        while inner.total_bytes.saturating_add(bytes) > self.limit {
            if let Some(front) = inner.history.pop_front() {
                inner.total_bytes = inner.total_bytes.saturating_sub(front.len());
            } else {
                break;
            }
        }
        inner.history.push_back(chunk);
        inner.total_bytes = inner.total_bytes.saturating_add(bytes);
    }

    /// Retained history as one contiguous byte vector.
    #[must_use]
    pub fn history(&self) -> Vec<u8> {
        let inner = self.read();
        let mut out = Vec::with_capacity(inner.total_bytes);
        for chunk in &inner.history {
            out.extend_from_slice(chunk);
        }
        out
    }

    /// Live receiver, or `None` once released.
    #[must_use]
    pub fn subscribe(&self) -> Option<broadcast::Receiver<Bytes>> {
        self.read().live.as_ref().map(broadcast::Sender::subscribe)
    }

    /// Stream that yields history first, then live output until release.
    #[must_use]
    pub fn history_plus_stream(&self) -> BoxStream<'static, Bytes> {
        let (history, rx) = {
            let inner = self.read();
            let history: Vec<Bytes> = inner.history.iter().cloned().collect();
            (history, inner.live.as_ref().map(broadcast::Sender::subscribe))
        };

        let hist = futures::stream::iter(history);
        match rx {
            Some(rx) => {
                let live = BroadcastStream::new(rx).filter_map(|res| async move { res.ok() });
                hist.chain(live).boxed()
            }
            None => hist.boxed(),
        }
    }

    /// Number of attached live listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.read()
            .live
            .as_ref()
            .map_or(0, broadcast::Sender::receiver_count)
    }

    #[must_use]
    pub fn is_released(&self) -> bool {
        self.read().live.is_none()
    }
}

impl TerminalSurface for ScreenBuffer {
    fn write(&self, data: &[u8]) {
        self.push(Bytes::copy_from_slice(data));
    }

    fn release(&self) {
        let mut inner = self.write_lock();
        inner.history.clear();
        inner.history.shrink_to_fit();
        inner.total_bytes = 0;
        // Dropping the sender ends every listener's stream.
        inner.live = None;
    }
}
