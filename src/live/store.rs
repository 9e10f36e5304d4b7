use crate::models::LiveStats;
use std::sync::Arc;
use tokio::sync::watch;

/// Process-wide holder of the latest live tally.
///
/// Any number of views read it; only the subscription bridge writes it, and only by
/// replacing the whole value. Sign-out clears it.
#[derive(Clone)]
pub struct LiveStatsStore {
    tx: Arc<watch::Sender<Option<LiveStats>>>,
}

impl LiveStatsStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Current value, or `None` when nothing has arrived since start or the last clear.
    pub fn read(&self) -> Option<LiveStats> {
        self.tx.borrow().clone()
    }

    /// Read handle that is notified on every replace or clear.
    pub fn subscribe(&self) -> watch::Receiver<Option<LiveStats>> {
        self.tx.subscribe()
    }

    pub(crate) fn replace(&self, stats: LiveStats) {
        self.tx.send_replace(Some(stats));
    }

    pub(crate) fn clear(&self) {
        self.tx.send_replace(None);
    }
}

impl Default for LiveStatsStore {
    fn default() -> Self {
        Self::new()
    }
}
