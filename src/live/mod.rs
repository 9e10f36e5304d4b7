pub mod bridge;
pub mod normalizer;
pub mod store;
pub mod transport;
pub mod view;

pub use bridge::{LinkStatus, LiveSubscription, TotalVotesObserver};
pub use normalizer::{LiveDisplay, Snapshot, SnapshotSource};
pub use store::LiveStatsStore;
pub use transport::{AppSyncTransport, SubscriptionTransport, TransportError};
pub use view::LiveView;
