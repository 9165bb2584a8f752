pub mod connection;
pub mod router;

use thiserror::Error;
use url::Url;

/// A push topic the server can stream events for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Topic {
    Feed,
    Comments { take_id: String },
}

impl Topic {
    fn path(&self) -> String {
        match self {
            Topic::Feed => "ws/feed".to_string(),
            Topic::Comments { take_id } => format!("ws/takes/{take_id}/comments"),
        }
    }
}

/// Derive the push address for a topic from the API base address by
/// protocol substitution (http -> ws, https -> wss).
pub fn live_url(base_url: &Url, topic: &Topic) -> Result<Url, LiveError> {
    let mut url = base_url
        .join(&topic.path())
        .map_err(|err| LiveError::InvalidAddress(format!("invalid topic path: {err}")))?;
    let scheme = match url.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => {
            return Err(LiveError::InvalidAddress(format!(
                "unsupported scheme for push connection: {other}"
            )));
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| LiveError::InvalidAddress("scheme substitution failed".to_string()))?;
    Ok(url)
}

#[derive(Error, Debug)]
pub enum LiveError {
    #[error("invalid push address: {0}")]
    InvalidAddress(String),
    #[error("connection closed")]
    Closed,
}
