//! Shared wire definitions for the hottakes feed protocol.
//! Keeping this in a dedicated crate lets the client core and test
//! servers agree on payload shapes without pulling in runtime code.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Maximum take length accepted by the server-side validator.
pub const TAKE_MAX_CHARS: usize = 500;
/// Maximum comment length accepted by the server-side validator.
pub const COMMENT_MAX_CHARS: usize = 300;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Take {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub like_count: u64,
    #[serde(default)]
    pub comment_count: u64,
    pub created_at: DateTime<Utc>,
    pub username: String,
    #[serde(default)]
    pub user_liked: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Comment {
    pub id: String,
    pub take_id: String,
    pub content: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

/// Feed ordering requested from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SortMode {
    #[default]
    #[serde(rename = "newest")]
    Newest,
    #[serde(rename = "hottest_24h")]
    Hottest24h,
    #[serde(rename = "hottest_7d")]
    Hottest7d,
}

impl SortMode {
    /// Value used for the `sort` query parameter.
    pub fn as_query(&self) -> &'static str {
        match self {
            SortMode::Newest => "newest",
            SortMode::Hottest24h => "hottest_24h",
            SortMode::Hottest7d => "hottest_7d",
        }
    }
}

/// Every push frame is a `{"type": ..., "data": ...}` envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn parse(text: &str) -> Result<Self, WireError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Typed events carried on the feed topic.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    NewTake(Take),
    LikeUpdate { id: String, like_count: u64 },
    DeleteTake { id: String },
}

impl FeedEvent {
    /// Decode an envelope. `Ok(None)` means the type is unknown and the
    /// frame should be ignored; `Err` means a known type carried a
    /// payload that does not match its schema.
    pub fn from_envelope(envelope: &Envelope) -> Result<Option<Self>, WireError> {
        match envelope.kind.as_str() {
            "new_take" => {
                let take = serde_json::from_value(envelope.data.clone())?;
                Ok(Some(FeedEvent::NewTake(take)))
            }
            "like_update" => {
                let update: LikeUpdateData = serde_json::from_value(envelope.data.clone())?;
                Ok(Some(FeedEvent::LikeUpdate {
                    id: update.id,
                    like_count: update.like_count,
                }))
            }
            "delete_take" => {
                let delete: DeleteTakeData = serde_json::from_value(envelope.data.clone())?;
                Ok(Some(FeedEvent::DeleteTake { id: delete.id }))
            }
            _ => Ok(None),
        }
    }
}

/// Typed events carried on a per-take comments topic.
#[derive(Debug, Clone, PartialEq)]
pub enum CommentEvent {
    NewComment(Comment),
}

impl CommentEvent {
    pub fn from_envelope(envelope: &Envelope) -> Result<Option<Self>, WireError> {
        match envelope.kind.as_str() {
            "new_comment" => {
                let comment = serde_json::from_value(envelope.data.clone())?;
                Ok(Some(CommentEvent::NewComment(comment)))
            }
            _ => Ok(None),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LikeUpdateData {
    id: String,
    like_count: u64,
}

#[derive(Debug, Deserialize)]
struct DeleteTakeData {
    id: String,
}

/// One page of the takes listing. `next_cursor` is opaque; `null` marks
/// the end of the collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TakesPage {
    pub takes: Vec<Take>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentsPage {
    pub comments: Vec<Comment>,
}

#[derive(Error, Debug)]
pub enum WireError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ContentError {
    #[error("content is empty")]
    Empty,
    #[error("content exceeds {limit} characters")]
    TooLong { limit: usize },
}

/// Client-side mirror of the server's take validator. Returns the
/// trimmed content that should be submitted.
pub fn validate_take_content(content: &str) -> Result<&str, ContentError> {
    validate(content, TAKE_MAX_CHARS)
}

/// Client-side mirror of the server's comment validator.
pub fn validate_comment_content(content: &str) -> Result<&str, ContentError> {
    validate(content, COMMENT_MAX_CHARS)
}

fn validate(content: &str, limit: usize) -> Result<&str, ContentError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(ContentError::Empty);
    }
    if trimmed.chars().count() > limit {
        return Err(ContentError::TooLong { limit });
    }
    Ok(trimmed)
}
