use tracing::warn;

use hottakes_wire::{Comment, CommentEvent, Take, validate_comment_content};

use super::ClientError;
use super::reconcile::{MutationKind, Reconciler};
use crate::api::{ApiClient, ApiConfig};
use crate::config::Config;
use crate::session::Topic;
use crate::session::connection::{LiveEvent, TopicConnection};
use crate::session::router;

#[derive(Debug, Clone, PartialEq)]
pub enum CommentsChange {
    CommentAdded(Comment),
}

/// One take's comment thread: a snapshot fetched over REST plus live
/// tail-appends, with the take's `comment_count` bumped exactly once
/// per logical comment.
pub struct CommentsState {
    take: Take,
    comments: Vec<Comment>,
    reconcile: Reconciler,
}

impl CommentsState {
    pub fn new(take: Take, comments: Vec<Comment>) -> Self {
        Self {
            take,
            comments,
            reconcile: Reconciler::new(),
        }
    }

    pub fn take(&self) -> &Take {
        &self.take
    }

    pub fn comments(&self) -> &[Comment] {
        &self.comments
    }

    fn contains(&self, id: &str) -> bool {
        self.comments.iter().any(|comment| comment.id == id)
    }

    fn append(&mut self, comment: Comment) {
        self.comments.push(comment);
        self.take.comment_count += 1;
    }

    /// Append a comment the server confirmed for this client.
    pub fn insert_confirmed(&mut self, comment: Comment) {
        if !self.contains(&comment.id) {
            self.append(comment);
        }
    }

    /// Apply one live event; self-authored echoes are discarded by the
    /// reconciler so they never double-append or double-count.
    pub fn apply_event(&mut self, event: CommentEvent) -> Option<CommentsChange> {
        let CommentEvent::NewComment(comment) = event;
        if !self
            .reconcile
            .admit(MutationKind::CommentCreate, &comment.id, &comment.content)
        {
            return None;
        }
        if self.contains(&comment.id) {
            return None;
        }
        self.append(comment.clone());
        Some(CommentsChange::CommentAdded(comment))
    }
}

/// Client for a single take's comment view. Same shape as the feed
/// client: REST snapshot, push topic, single consumer.
pub struct CommentsClient {
    api: ApiClient,
    connection: TopicConnection,
    state: CommentsState,
    take_id: String,
}

impl CommentsClient {
    /// Fetch the take and its comments, then open the live channel
    /// scoped to this take's topic path.
    pub async fn connect(config: &Config, take_id: &str) -> Result<Self, ClientError> {
        let api_config =
            ApiConfig::new(&config.api_base)?.with_session_token(config.session_token.clone());
        let api = ApiClient::new(api_config)?;
        let connection = TopicConnection::open(
            api.config().base_url(),
            Topic::Comments {
                take_id: take_id.to_string(),
            },
            config.connection,
        )?;
        let take = api.fetch_take(take_id).await?;
        let comments = api.fetch_comments(take_id).await?;
        Ok(Self {
            api,
            connection,
            state: CommentsState::new(take, comments),
            take_id: take_id.to_string(),
        })
    }

    pub fn take(&self) -> &Take {
        self.state.take()
    }

    pub fn comments(&self) -> &[Comment] {
        self.state.comments()
    }

    /// Validate and submit a comment; on confirmation it is appended
    /// and its id armed against the push echo.
    pub async fn submit_comment(&mut self, content: &str) -> Result<Comment, ClientError> {
        let trimmed = validate_comment_content(content)?;
        self.state
            .reconcile
            .note_in_flight(MutationKind::CommentCreate, trimmed.to_string());
        match self.api.create_comment(&self.take_id, trimmed).await {
            Ok(comment) => {
                self.state
                    .reconcile
                    .confirm(MutationKind::CommentCreate, comment.id.clone());
                self.state.insert_confirmed(comment.clone());
                Ok(comment)
            }
            Err(err) => {
                self.state
                    .reconcile
                    .clear_in_flight(MutationKind::CommentCreate);
                Err(err.into())
            }
        }
    }

    /// Drive the live channel until a comment changes the thread.
    /// Returns `None` once the connection has permanently ended.
    pub async fn next_change(&mut self) -> Option<CommentsChange> {
        loop {
            match self.connection.recv().await? {
                LiveEvent::Frame(envelope) => {
                    if let Some(event) = router::route_comment(&envelope) {
                        if let Some(change) = self.state.apply_event(event) {
                            return Some(change);
                        }
                    }
                }
                LiveEvent::TransportError(err) => {
                    warn!(error = %err, "comments push transport error");
                }
            }
        }
    }

    pub async fn close(&mut self) {
        self.connection.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_take() -> Take {
        Take {
            id: "t-1".to_string(),
            content: "hot".to_string(),
            like_count: 0,
            comment_count: 0,
            created_at: Utc::now(),
            username: "ava".to_string(),
            user_liked: false,
        }
    }

    fn comment(id: &str, content: &str) -> Comment {
        Comment {
            id: id.to_string(),
            take_id: "t-1".to_string(),
            content: content.to_string(),
            username: "kai".to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_remote_comment_appends_and_bumps_count() {
        let mut state = CommentsState::new(sample_take(), vec![]);

        let change = state.apply_event(CommentEvent::NewComment(comment("c-1", "nice")));
        assert!(matches!(change, Some(CommentsChange::CommentAdded(_))));
        assert_eq!(state.comments().len(), 1);
        assert_eq!(state.take().comment_count, 1);
    }

    #[tokio::test]
    async fn test_count_bumps_once_when_confirmation_wins() {
        let mut state = CommentsState::new(sample_take(), vec![]);

        state
            .reconcile
            .note_in_flight(MutationKind::CommentCreate, "mine".to_string());
        state
            .reconcile
            .confirm(MutationKind::CommentCreate, "c-1".to_string());
        state.insert_confirmed(comment("c-1", "mine"));

        assert!(
            state
                .apply_event(CommentEvent::NewComment(comment("c-1", "mine")))
                .is_none()
        );
        assert_eq!(state.comments().len(), 1);
        assert_eq!(state.take().comment_count, 1);
    }

    #[tokio::test]
    async fn test_count_bumps_once_when_echo_wins() {
        let mut state = CommentsState::new(sample_take(), vec![]);

        state
            .reconcile
            .note_in_flight(MutationKind::CommentCreate, "mine".to_string());

        assert!(
            state
                .apply_event(CommentEvent::NewComment(comment("c-1", "mine")))
                .is_none()
        );

        state
            .reconcile
            .confirm(MutationKind::CommentCreate, "c-1".to_string());
        state.insert_confirmed(comment("c-1", "mine"));

        assert_eq!(state.comments().len(), 1);
        assert_eq!(state.take().comment_count, 1);
    }

    #[tokio::test]
    async fn test_snapshot_comments_are_kept() {
        let state = CommentsState::new(
            sample_take(),
            vec![comment("c-1", "first"), comment("c-2", "second")],
        );
        assert_eq!(state.comments().len(), 2);
    }
}
