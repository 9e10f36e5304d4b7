use crate::live::bridge::{LinkStatus, LiveSubscription, TotalVotesObserver};
use crate::live::normalizer::{self, LiveDisplay, Snapshot};
use crate::live::store::LiveStatsStore;
use crate::live::transport::SubscriptionTransport;
use crate::models::Poll;
use log::info;
use std::sync::Arc;
use tokio::sync::watch;

/// A mounted live-results view for one poll.
pub struct LiveView {
    poll: Poll,
    store: LiveStatsStore,
    subscription: LiveSubscription,
}

impl LiveView {
    pub fn mount(
        poll: Poll,
        store: LiveStatsStore,
        transport: Arc<dyn SubscriptionTransport>,
        observer: Option<TotalVotesObserver>,
    ) -> Self {
        info!("Mounting live view for poll {} ({})", poll.id, poll.title);
        let subscription = LiveSubscription::open(transport, store.clone(), observer);
        Self {
            poll,
            store,
            subscription,
        }
    }

    pub fn poll(&self) -> &Poll {
        &self.poll
    }

    /// What to render right now.
    pub fn display(&self) -> LiveDisplay {
        let live = self.subscription.latest();
        let cached = self.store.read();
        normalizer::resolve(live.as_ref(), cached.as_ref(), &self.poll)
    }

    pub fn status(&self) -> LinkStatus {
        self.subscription.status()
    }

    /// Live participant count: the latest message or cached tally, zero until one exists.
    pub fn participants(&self) -> u64 {
        self.subscription
            .latest()
            .and_then(|snapshot| snapshot.total_votes)
            .or_else(|| self.store.read().map(|stats| stats.total_votes))
            .unwrap_or(0)
    }

    pub fn watch_updates(&self) -> watch::Receiver<Option<Snapshot>> {
        self.subscription.watch_latest()
    }

    pub fn watch_status(&self) -> watch::Receiver<LinkStatus> {
        self.subscription.watch_status()
    }

    pub async fn unmount(self) {
        info!("Unmounting live view for poll {}", self.poll.id);
        self.subscription.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live::normalizer::SnapshotSource;
    use crate::live::transport::testing::ChannelTransport;
    use crate::models::{LiveStats, PollOption, PollStatus};
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::timeout;

    fn poll() -> Poll {
        Poll {
            id: "p1".to_string(),
            title: "Favourite fruit".to_string(),
            description: None,
            options: vec![
                PollOption { id: "1".to_string(), text: "Apple".to_string(), votes: 1 },
                PollOption { id: "2".to_string(), text: "Pear".to_string(), votes: 0 },
            ],
            status: PollStatus::Active,
            created_at: None,
            closed_at: None,
            total_votes: 1,
        }
    }

    #[tokio::test]
    async fn starts_from_the_poll_then_switches_to_live_data() {
        let (transport, tx) = ChannelTransport::new();
        let store = LiveStatsStore::new();
        let view = LiveView::mount(poll(), store, Arc::new(transport), None);
        assert_eq!(view.poll().id, "p1");

        let display = view.display();
        assert_eq!(display.source, SnapshotSource::Poll);
        assert_eq!(display.total_votes, 1);
        assert_eq!(view.participants(), 0);

        let mut updates = view.watch_updates();
        tx.unbounded_send(Ok(json!({
            "onStatsUpdated": { "standings": r#"{"statName":"Fruit","totalVotes":4,"Apple":3,"Pear":1}"# }
        })))
        .unwrap();
        timeout(Duration::from_secs(1), updates.wait_for(Option::is_some))
            .await
            .unwrap()
            .unwrap();

        let display = view.display();
        assert_eq!(display.source, SnapshotSource::Live);
        assert_eq!(display.title, "Fruit");
        assert_eq!(display.total_votes, 4);
        assert_eq!(view.participants(), 4);
        assert_eq!(view.status(), LinkStatus::Live);

        view.unmount().await;
    }

    #[tokio::test]
    async fn remount_shows_cached_tally_until_a_message_arrives() {
        let store = LiveStatsStore::new();
        store.replace(LiveStats {
            total_votes: 7,
            standings: vec![("Apple", 5), ("Pear", 2)].into_iter().collect(),
        });

        let (transport, _tx) = ChannelTransport::new();
        let view = LiveView::mount(poll(), store, Arc::new(transport), None);

        let display = view.display();
        assert_eq!(display.source, SnapshotSource::Cached);
        assert_eq!(display.title, "Favourite fruit");
        assert_eq!(display.total_votes, 7);
        assert_eq!(view.participants(), 7);
        view.unmount().await;
    }

    #[tokio::test]
    async fn cleared_store_means_empty_live_state() {
        let store = LiveStatsStore::new();
        store.replace(LiveStats { total_votes: 7, standings: Default::default() });
        store.clear();

        let (transport, _tx) = ChannelTransport::new();
        let view = LiveView::mount(poll(), store, Arc::new(transport), None);
        assert_eq!(view.participants(), 0);
        assert_eq!(view.display().source, SnapshotSource::Poll);
        view.unmount().await;
    }
}
