use crate::api::{ApiError, PollApi};
use crate::forms::{EditPollForm, FieldErrors, PollForm};
use crate::live::LiveStatsStore;
use crate::models::Poll;
use log::{error, info, warn};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const CLOSED_NOTICE: &str = "Poll closed successfully";
pub const DELETED_NOTICE: &str = "Poll deleted successfully";
pub const UPDATED_NOTICE: &str = "Poll updated successfully";
pub const CREATED_NOTICE: &str = "Poll created successfully";

/// Lifetime of a screen. Requests started inside it run to completion, but their
/// results are only handed back while the scope is still mounted.
#[derive(Clone, Debug, Default)]
pub struct MountScope {
    token: CancellationToken,
}

impl MountScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_mounted(&self) -> bool {
        !self.token.is_cancelled()
    }

    pub fn unmount(&self) {
        self.token.cancel();
    }

    /// Awaits `fut` fully; `None` if the scope was unmounted before it finished.
    pub async fn run<F: Future>(&self, fut: F) -> Option<F::Output> {
        let output = fut.await;
        self.is_mounted().then_some(output)
    }
}

/// Admin controller for the active poll.
pub struct Dashboard<A: PollApi> {
    api: Arc<A>,
    store: LiveStatsStore,
    scope: MountScope,
    poll: Option<Poll>,
    error: Option<String>,
    notice: Option<String>,
}

impl<A: PollApi> Dashboard<A> {
    pub fn new(api: Arc<A>, store: LiveStatsStore) -> Self {
        Self {
            api,
            store,
            scope: MountScope::new(),
            poll: None,
            error: None,
            notice: None,
        }
    }

    pub fn scope(&self) -> MountScope {
        self.scope.clone()
    }

    pub fn poll(&self) -> Option<&Poll> {
        self.poll.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn can_close(&self) -> bool {
        self.poll.as_ref().is_some_and(Poll::can_close)
    }

    pub fn active_polls(&self) -> usize {
        usize::from(self.poll.is_some())
    }

    /// Cached live total when it is non-zero, else the poll's own total.
    pub fn participants(&self) -> u64 {
        self.store
            .read()
            .map(|stats| stats.total_votes)
            .filter(|total| *total > 0)
            .or_else(|| self.poll.as_ref().map(|poll| poll.total_votes))
            .unwrap_or(0)
    }

    pub async fn refresh(&mut self) {
        let api = Arc::clone(&self.api);
        let Some(result) = self.scope.run(async move { api.active_poll().await }).await else {
            info!("Dashboard unmounted, dropping poll fetch result");
            return;
        };

        match result {
            Ok(poll) => {
                if poll.is_none() {
                    info!("No active poll found");
                }
                self.poll = poll;
                self.error = None;
            }
            Err(e) => {
                error!("Failed to fetch poll: {}", e);
                self.error = Some(e.to_string());
            }
        }
    }

    pub async fn close(&mut self) {
        let Some(poll) = self.poll.as_ref() else { return };
        if !poll.can_close() {
            warn!("Poll {} is {}, not closing", poll.id, poll.status);
            return;
        }

        let api = Arc::clone(&self.api);
        let poll_id = poll.id.clone();
        let result = self.scope.run(async move { api.close_poll(&poll_id).await }).await;
        self.settle(result, "closing", CLOSED_NOTICE).await;
    }

    /// Callers confirm with the user before this.
    pub async fn delete(&mut self) {
        let Some(poll) = self.poll.as_ref() else { return };

        let api = Arc::clone(&self.api);
        let poll_id = poll.id.clone();
        let result = self.scope.run(async move { api.delete_poll(&poll_id).await }).await;
        self.settle(result, "deleting", DELETED_NOTICE).await;
    }

    pub async fn save_edit(&mut self, form: &EditPollForm) -> Result<(), FieldErrors> {
        let changes = form.validate()?;
        let Some(poll) = self.poll.as_ref() else { return Ok(()) };

        let api = Arc::clone(&self.api);
        let poll_id = poll.id.clone();
        let result = self
            .scope
            .run(async move { api.update_poll(&poll_id, &changes).await })
            .await;
        self.settle(result, "updating", UPDATED_NOTICE).await;
        Ok(())
    }

    pub async fn create(&mut self, form: &PollForm) -> Result<(), FieldErrors> {
        let request = form.validate()?;

        let api = Arc::clone(&self.api);
        let result = self.scope.run(async move { api.create_poll(&request).await }).await;
        self.settle(result, "creating", CREATED_NOTICE).await;
        Ok(())
    }

    async fn settle<T>(&mut self, result: Option<Result<T, ApiError>>, action: &str, notice: &str) {
        match result {
            None => info!("Dashboard unmounted, dropping result of {} poll", action),
            Some(Ok(_)) => {
                info!("{}", notice);
                self.error = None;
                self.notice = Some(notice.to_string());
                self.refresh().await;
            }
            Some(Err(e)) => {
                error!("Error {} poll: {}", action, e);
                self.notice = None;
                self.error = Some(e.to_string());
            }
        }
    }
}
