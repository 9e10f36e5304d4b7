use crate::live::normalizer::{self, Snapshot};
use crate::live::store::LiveStatsStore;
use crate::live::transport::SubscriptionTransport;
use futures_util::StreamExt;
use log::{error, info, warn};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const STATS_UPDATED_SUBSCRIPTION: &str =
    "subscription ListenToUpdates { onStatsUpdated { standings } }";

const TOPIC_FIELD: &str = "onStatsUpdated";
const DOCUMENT_FIELD: &str = "standings";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Connecting,
    Live,
    Disconnected,
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkStatus::Connecting => f.write_str("Connecting…"),
            LinkStatus::Live => f.write_str("Live"),
            LinkStatus::Disconnected => f.write_str("Disconnected"),
        }
    }
}

/// Called with the new total whenever a message carries an explicit `totalVotes`.
pub type TotalVotesObserver = Arc<dyn Fn(u64) + Send + Sync>;

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("payload has no onStatsUpdated.standings field")]
    MissingDocument,
    #[error("standings is not a string: {0}")]
    NotAString(Value),
    #[error("standings is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Pulls the string-encoded stats document out of a subscription payload and decodes it.
pub fn decode_document(payload: &Value) -> Result<Value, PayloadError> {
    let field = payload
        .get(TOPIC_FIELD)
        .and_then(|topic| topic.get(DOCUMENT_FIELD))
        .ok_or(PayloadError::MissingDocument)?;

    let encoded = field
        .as_str()
        .ok_or_else(|| PayloadError::NotAString(field.clone()))?;

    Ok(serde_json::from_str(encoded)?)
}

/// Everything one message is allowed to touch.
struct FeedSink {
    store: LiveStatsStore,
    status: watch::Sender<LinkStatus>,
    latest: watch::Sender<Option<Snapshot>>,
    observer: Option<TotalVotesObserver>,
}

impl FeedSink {
    /// Applies one payload. A payload that fails to decode changes nothing.
    fn apply(&self, payload: &Value) {
        let document = match decode_document(payload) {
            Ok(document) => document,
            Err(e) => {
                warn!("Discarding live stats message: {}", e);
                return;
            }
        };

        let snapshot = normalizer::from_live_message(&document);
        let explicit_total = snapshot.total_votes;

        self.status.send_replace(LinkStatus::Live);
        self.store.replace(snapshot.to_live_stats());
        self.latest.send_replace(Some(snapshot));

        if let (Some(observer), Some(total)) = (&self.observer, explicit_total) {
            observer(total);
        }
    }

    fn disconnect(&self) {
        self.status.send_replace(LinkStatus::Disconnected);
    }
}

/// One push subscription, owned by one mounted live view.
///
/// Opening never blocks: the connection is made on a background task and the status
/// starts as `Connecting`. `close` (or dropping the handle) stops it for good; open a
/// new one to reconnect.
pub struct LiveSubscription {
    status: watch::Receiver<LinkStatus>,
    latest: watch::Receiver<Option<Snapshot>>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl LiveSubscription {
    pub fn open(
        transport: Arc<dyn SubscriptionTransport>,
        store: LiveStatsStore,
        observer: Option<TotalVotesObserver>,
    ) -> Self {
        let (status_tx, status_rx) = watch::channel(LinkStatus::Connecting);
        let (latest_tx, latest_rx) = watch::channel(None);
        let cancel = CancellationToken::new();

        let sink = FeedSink {
            store,
            status: status_tx,
            latest: latest_tx,
            observer,
        };
        let handle = tokio::spawn(run_subscription(transport, sink, cancel.clone()));

        Self {
            status: status_rx,
            latest: latest_rx,
            cancel,
            handle: Some(handle),
        }
    }

    pub fn status(&self) -> LinkStatus {
        *self.status.borrow()
    }

    /// Last successfully decoded message, if any arrived on this subscription.
    pub fn latest(&self) -> Option<Snapshot> {
        self.latest.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<LinkStatus> {
        self.status.clone()
    }

    pub fn watch_latest(&self) -> watch::Receiver<Option<Snapshot>> {
        self.latest.clone()
    }

    /// Unsubscribes and waits for the feed task, so nothing is processed after this returns.
    pub async fn close(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                error!("Live subscription task failed: {}", e);
            }
        }
    }
}

impl Drop for LiveSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_subscription(
    transport: Arc<dyn SubscriptionTransport>,
    sink: FeedSink,
    cancel: CancellationToken,
) {
    info!("Opening live stats subscription...");

    let mut feed = tokio::select! {
        biased;
        _ = cancel.cancelled() => return,
        opened = transport.subscribe(STATS_UPDATED_SUBSCRIPTION) => match opened {
            Ok(feed) => feed,
            Err(e) => {
                error!("Failed to open live stats subscription: {}", e);
                sink.disconnect();
                return;
            }
        },
    };

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Live stats subscription closed");
                break;
            }
            next = feed.next() => match next {
                Some(Ok(payload)) => sink.apply(&payload),
                Some(Err(e)) => {
                    error!("Live stats subscription error: {}", e);
                    sink.disconnect();
                    break;
                }
                None => {
                    warn!("Live stats subscription ended");
                    sink.disconnect();
                    break;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live::transport::TransportError;
    use crate::live::transport::testing::{ChannelTransport, FailingTransport};
    use crate::models::LiveStats;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::timeout;

    fn message(document: &str) -> Value {
        json!({ "onStatsUpdated": { "standings": document } })
    }

    fn sink() -> (FeedSink, watch::Receiver<LinkStatus>, Arc<Mutex<Vec<u64>>>) {
        let (status_tx, status_rx) = watch::channel(LinkStatus::Connecting);
        let (latest_tx, _latest_rx) = watch::channel(None);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let sink = FeedSink {
            store: LiveStatsStore::new(),
            status: status_tx,
            latest: latest_tx,
            observer: Some(Arc::new(move |total: u64| seen_clone.lock().unwrap().push(total))),
        };
        (sink, status_rx, seen)
    }

    #[test]
    fn decodes_the_string_encoded_document() {
        let document = decode_document(&message(r#"{"totalVotes":2,"Yes":2}"#)).unwrap();
        assert_eq!(document, json!({"totalVotes": 2, "Yes": 2}));

        assert!(matches!(
            decode_document(&json!({})),
            Err(PayloadError::MissingDocument)
        ));
        assert!(matches!(
            decode_document(&json!({"onStatsUpdated": {"standings": {"Yes": 1}}})),
            Err(PayloadError::NotAString(_))
        ));
        assert!(matches!(
            decode_document(&message("{not json")),
            Err(PayloadError::InvalidJson(_))
        ));
    }

    #[test]
    fn well_formed_message_goes_live_and_replaces_the_store() {
        let (sink, status, seen) = sink();
        sink.apply(&message(r#"{"statName":"Lunch","totalVotes":10,"Pizza":6,"Salad":4}"#));

        assert_eq!(*status.borrow(), LinkStatus::Live);
        assert_eq!(
            sink.store.read(),
            Some(LiveStats {
                total_votes: 10,
                standings: vec![("Pizza", 6), ("Salad", 4)].into_iter().collect(),
            })
        );
        let latest = sink.latest.borrow().clone().unwrap();
        assert_eq!(latest.title, "Lunch");
        assert_eq!(*seen.lock().unwrap(), vec![10]);
    }

    #[test]
    fn malformed_message_leaves_everything_as_it_was() {
        let (sink, status, seen) = sink();
        sink.apply(&message(r#"{"totalVotes":3,"Yes":3}"#));
        let before = sink.store.read();

        sink.apply(&message("{{{"));
        sink.apply(&json!({"unexpected": true}));

        assert_eq!(sink.store.read(), before);
        assert_eq!(*status.borrow(), LinkStatus::Live);
        assert_eq!(*seen.lock().unwrap(), vec![3]);
    }

    #[test]
    fn malformed_first_message_keeps_connecting() {
        let (sink, status, _seen) = sink();
        sink.apply(&message("nope"));
        assert_eq!(*status.borrow(), LinkStatus::Connecting);
        assert_eq!(sink.store.read(), None);
    }

    #[test]
    fn replaying_a_message_is_idempotent() {
        let (sink, _status, _seen) = sink();
        let payload = message(r#"{"totalVotes":5,"A":2,"B":3}"#);

        sink.apply(&payload);
        let first = sink.store.read();
        sink.apply(&payload);
        assert_eq!(sink.store.read(), first);
    }

    #[test]
    fn message_without_total_stores_zero_and_skips_observer() {
        let (sink, _status, seen) = sink();
        sink.apply(&message(r#"{"A":2}"#));
        assert_eq!(sink.store.read().unwrap().total_votes, 0);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn subscription_processes_messages_in_order() {
        let (transport, tx) = ChannelTransport::new();
        let transport = Arc::new(transport);
        let store = LiveStatsStore::new();
        let subscription = LiveSubscription::open(transport.clone(), store.clone(), None);
        assert_eq!(subscription.status(), LinkStatus::Connecting);

        let mut latest = subscription.watch_latest();
        tx.unbounded_send(Ok(message(r#"{"totalVotes":1,"A":1}"#))).unwrap();
        tx.unbounded_send(Ok(message(r#"{"totalVotes":2,"A":2}"#))).unwrap();

        timeout(
            Duration::from_secs(1),
            latest.wait_for(|snapshot| snapshot.as_ref().and_then(|s| s.total_votes) == Some(2)),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(subscription.status(), LinkStatus::Live);
        assert_eq!(store.read().unwrap().total_votes, 2);
        assert_eq!(
            *transport.queries.lock().unwrap(),
            vec![STATS_UPDATED_SUBSCRIPTION.to_string()]
        );
        subscription.close().await;
    }

    #[tokio::test]
    async fn transport_error_disconnects() {
        let (transport, tx) = ChannelTransport::new();
        let subscription = LiveSubscription::open(Arc::new(transport), LiveStatsStore::new(), None);
        let mut status = subscription.watch_status();

        tx.unbounded_send(Err(TransportError::Closed)).unwrap();
        timeout(
            Duration::from_secs(1),
            status.wait_for(|s| *s == LinkStatus::Disconnected),
        )
        .await
        .unwrap()
        .unwrap();
    }

    #[tokio::test]
    async fn failed_connect_disconnects() {
        let subscription =
            LiveSubscription::open(Arc::new(FailingTransport), LiveStatsStore::new(), None);
        let mut status = subscription.watch_status();
        timeout(
            Duration::from_secs(1),
            status.wait_for(|s| *s == LinkStatus::Disconnected),
        )
        .await
        .unwrap()
        .unwrap();
    }

    #[tokio::test]
    async fn nothing_is_processed_after_close() {
        let (transport, tx) = ChannelTransport::new();
        let store = LiveStatsStore::new();
        let subscription = LiveSubscription::open(Arc::new(transport), store.clone(), None);

        subscription.close().await;
        // The receiver may already be gone; either way nothing reaches the store.
        let _ = tx.unbounded_send(Ok(message(r#"{"totalVotes":9,"A":9}"#)));
        tokio::task::yield_now().await;

        assert_eq!(store.read(), None);
    }
}
