pub mod comments;
pub mod feed;
pub mod reconcile;

use thiserror::Error;

use crate::api::ApiError;
use crate::session::LiveError;
use hottakes_wire::ContentError;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Live(#[from] LiveError),
    #[error("invalid content: {0}")]
    Content(#[from] ContentError),
    #[error("unknown take: {0}")]
    UnknownTake(String),
}
