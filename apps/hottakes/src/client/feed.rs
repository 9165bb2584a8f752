use tracing::{debug, warn};

use hottakes_wire::{FeedEvent, SortMode, Take, TakesPage, validate_take_content};

use super::ClientError;
use super::reconcile::{LikeSnapshot, MutationKind, Reconciler};
use crate::api::{ApiClient, ApiConfig};
use crate::config::Config;
use crate::session::Topic;
use crate::session::connection::{LiveEvent, TopicConnection};
use crate::session::router;

/// A visible change to the feed list, reported by `next_change`.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedChange {
    Inserted(Take),
    LikeChanged { id: String, like_count: u64 },
    Removed { id: String },
}

/// The feed list proper: one deduplicated ordered collection fed by
/// paged fetches and live insertions. Owns the reconciler for
/// self-authored takes.
pub struct FeedState {
    takes: Vec<Take>,
    cursor: Option<String>,
    loading_more: bool,
    sort: SortMode,
    reconcile: Reconciler,
}

impl FeedState {
    pub fn new(sort: SortMode) -> Self {
        Self {
            takes: Vec::new(),
            cursor: None,
            loading_more: false,
            sort,
            reconcile: Reconciler::new(),
        }
    }

    pub fn takes(&self) -> &[Take] {
        &self.takes
    }

    pub fn sort(&self) -> SortMode {
        self.sort
    }

    fn contains(&self, id: &str) -> bool {
        self.takes.iter().any(|take| take.id == id)
    }

    /// Discard the list and cursor for a sort switch. Pending echo
    /// state survives; a sort change does not unsend a submission.
    pub fn reset(&mut self, sort: SortMode) {
        self.sort = sort;
        self.takes.clear();
        self.cursor = None;
        self.loading_more = false;
    }

    /// Append a fetched page, skipping ids already present. The cursor
    /// always moves to the page's `next_cursor`; `None` is terminal.
    pub fn apply_page(&mut self, page: TakesPage) {
        self.loading_more = false;
        self.cursor = page.next_cursor;
        for take in page.takes {
            if !self.contains(&take.id) {
                self.takes.push(take);
            }
        }
    }

    /// Claim the cursor for a fetch. Returns `None` while a load is in
    /// flight or when no further page exists, collapsing repeated
    /// triggers to one fetch.
    pub fn begin_load_more(&mut self) -> Option<String> {
        if self.loading_more {
            return None;
        }
        let cursor = self.cursor.clone()?;
        self.loading_more = true;
        Some(cursor)
    }

    /// Release the in-flight guard after a failed fetch so the cursor
    /// can be retried.
    pub fn abort_load_more(&mut self) {
        self.loading_more = false;
    }

    /// Head-insert a take the server confirmed for this client. Applied
    /// in any sort; the suppression rule covers live events only.
    pub fn insert_confirmed(&mut self, take: Take) {
        if !self.contains(&take.id) {
            self.takes.insert(0, take);
        }
    }

    /// Apply one live event, never touching the cursor. Returns the
    /// visible change, if any.
    pub fn apply_event(&mut self, event: FeedEvent) -> Option<FeedChange> {
        match event {
            FeedEvent::NewTake(take) => {
                if self.sort != SortMode::Newest {
                    debug!(id = %take.id, sort = ?self.sort, "live insert suppressed for ranked sort");
                    return None;
                }
                if !self
                    .reconcile
                    .admit(MutationKind::TakeCreate, &take.id, &take.content)
                {
                    return None;
                }
                if self.contains(&take.id) {
                    return None;
                }
                self.takes.insert(0, take.clone());
                Some(FeedChange::Inserted(take))
            }
            FeedEvent::LikeUpdate { id, like_count } => {
                let take = self.takes.iter_mut().find(|take| take.id == id)?;
                take.like_count = like_count;
                Some(FeedChange::LikeChanged { id, like_count })
            }
            FeedEvent::DeleteTake { id } => {
                let before = self.takes.len();
                self.takes.retain(|take| take.id != id);
                if self.takes.len() == before {
                    return None;
                }
                Some(FeedChange::Removed { id })
            }
        }
    }

    /// Flip the like flag optimistically, returning the new flag and a
    /// snapshot of the prior state for an exact revert.
    pub fn begin_toggle_like(&mut self, id: &str) -> Option<(bool, LikeSnapshot)> {
        let take = self.takes.iter_mut().find(|take| take.id == id)?;
        let snapshot = LikeSnapshot {
            user_liked: take.user_liked,
            like_count: take.like_count,
        };
        take.user_liked = !take.user_liked;
        take.like_count = if take.user_liked {
            take.like_count + 1
        } else {
            take.like_count.saturating_sub(1)
        };
        Some((take.user_liked, snapshot))
    }

    /// Restore the exact captured like state after a failed request.
    pub fn revert_like(&mut self, id: &str, snapshot: LikeSnapshot) {
        if let Some(take) = self.takes.iter_mut().find(|take| take.id == id) {
            take.user_liked = snapshot.user_liked;
            take.like_count = snapshot.like_count;
        }
    }
}

/// Client for the feed view: paged REST reads plus the feed push topic,
/// with this instance as the single consumer of both.
pub struct FeedClient {
    api: ApiClient,
    connection: TopicConnection,
    state: FeedState,
    page_size: u32,
}

impl FeedClient {
    /// Fetch the first page and open the live channel.
    pub async fn connect(config: &Config, sort: SortMode) -> Result<Self, ClientError> {
        let api_config =
            ApiConfig::new(&config.api_base)?.with_session_token(config.session_token.clone());
        let api = ApiClient::new(api_config)?;
        let connection =
            TopicConnection::open(api.config().base_url(), Topic::Feed, config.connection)?;
        let mut state = FeedState::new(sort);
        let page = api.fetch_takes(sort, config.page_size, None).await?;
        state.apply_page(page);
        Ok(Self {
            api,
            connection,
            state,
            page_size: config.page_size,
        })
    }

    pub fn takes(&self) -> &[Take] {
        self.state.takes()
    }

    pub fn sort(&self) -> SortMode {
        self.state.sort()
    }

    /// Switch sort: discard the list and cursor, refetch from the top.
    pub async fn set_sort(&mut self, sort: SortMode) -> Result<(), ClientError> {
        self.state.reset(sort);
        let page = self.api.fetch_takes(sort, self.page_size, None).await?;
        self.state.apply_page(page);
        Ok(())
    }

    /// Fetch the next page if one exists. Returns whether a fetch
    /// actually happened.
    pub async fn load_more(&mut self) -> Result<bool, ClientError> {
        let Some(cursor) = self.state.begin_load_more() else {
            return Ok(false);
        };
        match self
            .api
            .fetch_takes(self.state.sort(), self.page_size, Some(&cursor))
            .await
        {
            Ok(page) => {
                self.state.apply_page(page);
                Ok(true)
            }
            Err(err) => {
                self.state.abort_load_more();
                Err(err.into())
            }
        }
    }

    /// Validate and submit a new take. On confirmation the take is
    /// head-inserted and its id armed against the push echo.
    pub async fn submit_take(&mut self, content: &str) -> Result<Take, ClientError> {
        let trimmed = validate_take_content(content)?;
        self.state
            .reconcile
            .note_in_flight(MutationKind::TakeCreate, trimmed.to_string());
        match self.api.create_take(trimmed).await {
            Ok(take) => {
                self.state
                    .reconcile
                    .confirm(MutationKind::TakeCreate, take.id.clone());
                self.state.insert_confirmed(take.clone());
                Ok(take)
            }
            Err(err) => {
                self.state.reconcile.clear_in_flight(MutationKind::TakeCreate);
                Err(err.into())
            }
        }
    }

    /// Optimistic like/unlike with exact revert on failure. The
    /// server's `like_update` event later settles the absolute count.
    pub async fn toggle_like(&mut self, id: &str) -> Result<(), ClientError> {
        let Some((now_liked, snapshot)) = self.state.begin_toggle_like(id) else {
            return Err(ClientError::UnknownTake(id.to_string()));
        };
        if let Err(err) = self.api.set_like(id, now_liked).await {
            self.state.revert_like(id, snapshot);
            return Err(err.into());
        }
        Ok(())
    }

    /// Drive the live channel until an event changes the visible list.
    /// Returns `None` once the connection has permanently ended.
    pub async fn next_change(&mut self) -> Option<FeedChange> {
        loop {
            match self.connection.recv().await? {
                LiveEvent::Frame(envelope) => {
                    if let Some(event) = router::route_feed(&envelope) {
                        if let Some(change) = self.state.apply_event(event) {
                            return Some(change);
                        }
                    }
                }
                LiveEvent::TransportError(err) => {
                    warn!(error = %err, "feed push transport error");
                }
            }
        }
    }

    pub async fn close(&mut self) {
        self.connection.close().await;
    }
}
