use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::sync::broadcast;
use tokio::time::{sleep, timeout};

use hottakes_client_core::api::ApiError;
use hottakes_client_core::client::ClientError;
use hottakes_client_core::client::comments::{CommentsChange, CommentsClient};
use hottakes_client_core::client::feed::{FeedChange, FeedClient};
use hottakes_client_core::config::{Config, ConnectionConfig};
use hottakes_wire::{Comment, CommentsPage, SortMode, Take, TakesPage};

#[derive(Clone)]
struct ServerState {
    takes: Arc<Mutex<Vec<Take>>>,
    comments: Arc<Mutex<Vec<Comment>>>,
    next_id: Arc<AtomicU64>,
    feed_tx: broadcast::Sender<String>,
    comments_tx: broadcast::Sender<String>,
}

impl ServerState {
    fn new() -> Self {
        Self {
            takes: Arc::new(Mutex::new(Vec::new())),
            comments: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            feed_tx: broadcast::channel(64).0,
            comments_tx: broadcast::channel(64).0,
        }
    }

    fn seed_take(&self, id: &str, content: &str, like_count: u64) {
        self.takes.lock().unwrap().push(Take {
            id: id.to_string(),
            content: content.to_string(),
            like_count,
            comment_count: 0,
            created_at: Utc::now(),
            username: "seed".to_string(),
            user_liked: false,
        });
    }
}

fn remote_take(id: &str, content: &str) -> Take {
    Take {
        id: id.to_string(),
        content: content.to_string(),
        like_count: 0,
        comment_count: 0,
        created_at: Utc::now(),
        username: "remote".to_string(),
        user_liked: false,
    }
}

async fn list_takes(
    State(state): State<ServerState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<TakesPage> {
    let takes = state.takes.lock().unwrap();
    let limit: usize = params
        .get("limit")
        .and_then(|v| v.parse().ok())
        .unwrap_or(20);
    let offset: usize = params
        .get("cursor")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let start = offset.min(takes.len());
    let end = (start + limit).min(takes.len());
    let next_cursor = (end < takes.len()).then(|| end.to_string());
    Json(TakesPage {
        takes: takes[start..end].to_vec(),
        next_cursor,
    })
}

async fn get_take(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> Result<Json<Take>, StatusCode> {
    state
        .takes
        .lock()
        .unwrap()
        .iter()
        .find(|take| take.id == id)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn create_take(State(state): State<ServerState>, Json(body): Json<Value>) -> Json<Take> {
    let content = body["content"].as_str().unwrap_or_default().to_string();
    let n = state.next_id.fetch_add(1, Ordering::SeqCst);
    let take = Take {
        id: format!("srv-{n}"),
        content,
        like_count: 0,
        comment_count: 0,
        created_at: Utc::now(),
        username: "me".to_string(),
        user_liked: false,
    };
    state.takes.lock().unwrap().insert(0, take.clone());
    let _ = state
        .feed_tx
        .send(json!({"type": "new_take", "data": take}).to_string());
    // The push echo races ahead of the HTTP confirmation.
    sleep(Duration::from_millis(100)).await;
    Json(take)
}

async fn delete_take_route(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> Json<Value> {
    state.takes.lock().unwrap().retain(|take| take.id != id);
    let _ = state
        .feed_tx
        .send(json!({"type": "delete_take", "data": {"id": id}}).to_string());
    Json(json!({"message": "deleted"}))
}

async fn like_take(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> axum::response::Response {
    set_like(state, id, true).await
}

async fn unlike_take(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> axum::response::Response {
    set_like(state, id, false).await
}

async fn set_like(state: ServerState, id: String, liked: bool) -> axum::response::Response {
    if id == "fail" {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"detail": "nope"})),
        )
            .into_response();
    }
    let like_count = {
        let mut takes = state.takes.lock().unwrap();
        let Some(take) = takes.iter_mut().find(|take| take.id == id) else {
            return StatusCode::NOT_FOUND.into_response();
        };
        if liked {
            take.like_count += 1;
        } else {
            take.like_count = take.like_count.saturating_sub(1);
        }
        take.like_count
    };
    let _ = state
        .feed_tx
        .send(json!({"type": "like_update", "data": {"id": id, "like_count": like_count}}).to_string());
    StatusCode::OK.into_response()
}

async fn list_comments(State(state): State<ServerState>) -> Json<CommentsPage> {
    Json(CommentsPage {
        comments: state.comments.lock().unwrap().clone(),
    })
}

async fn create_comment(
    State(state): State<ServerState>,
    Path(take_id): Path<String>,
    Json(body): Json<Value>,
) -> Json<Comment> {
    let content = body["content"].as_str().unwrap_or_default().to_string();
    let n = state.next_id.fetch_add(1, Ordering::SeqCst);
    let comment = Comment {
        id: format!("c-{n}"),
        take_id,
        content,
        username: "me".to_string(),
        created_at: Utc::now(),
    };
    state.comments.lock().unwrap().push(comment.clone());
    let _ = state
        .comments_tx
        .send(json!({"type": "new_comment", "data": comment}).to_string());
    sleep(Duration::from_millis(100)).await;
    Json(comment)
}

async fn feed_ws(State(state): State<ServerState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let rx = state.feed_tx.subscribe();
    ws.on_upgrade(move |socket| push_loop(socket, rx))
}

async fn comments_ws(
    State(state): State<ServerState>,
    Path(_take_id): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let rx = state.comments_tx.subscribe();
    ws.on_upgrade(move |socket| push_loop(socket, rx))
}

async fn push_loop(socket: WebSocket, mut rx: broadcast::Receiver<String>) {
    let (mut sender, mut receiver) = socket.split();
    loop {
        tokio::select! {
            frame = rx.recv() => match frame {
                Ok(text) => {
                    if sender.send(Message::Text(text)).await.is_err() {
                        return;
                    }
                }
                Err(_) => return,
            },
            inbound = receiver.next() => match inbound {
                Some(Ok(_)) => {}
                _ => return,
            },
        }
    }
}

async fn spawn_server() -> (ServerState, Config) {
    let state = ServerState::new();
    let app = Router::new()
        .route("/takes", get(list_takes).post(create_take))
        .route("/takes/:id", get(get_take).delete(delete_take_route))
        .route("/takes/:id/like", axum::routing::post(like_take).delete(unlike_take))
        .route("/takes/:id/comments", get(list_comments).post(create_comment))
        .route("/ws/feed", get(feed_ws))
        .route("/ws/takes/:id/comments", get(comments_ws))
        .with_state(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let config = Config {
        api_base: format!("http://{addr}"),
        page_size: 2,
        session_token: None,
        connection: ConnectionConfig {
            heartbeat_interval: Duration::from_secs(30),
            reconnect_base: Duration::from_millis(10),
            max_reconnect_attempts: 5,
        },
    };
    (state, config)
}

async fn wait_for_subscriber(tx: &broadcast::Sender<String>) {
    timeout(Duration::from_secs(5), async {
        while tx.receiver_count() == 0 {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("push subscriber never arrived");
}

#[tokio::test]
async fn test_first_page_then_load_more_to_terminal_cursor() {
    let (state, config) = spawn_server().await;
    state.seed_take("a", "first", 0);
    state.seed_take("b", "second", 0);
    state.seed_take("c", "third", 0);

    let mut feed = FeedClient::connect(&config, SortMode::Newest).await.unwrap();
    assert_eq!(feed.takes().len(), 2);

    assert!(feed.load_more().await.unwrap());
    let ids: Vec<&str> = feed.takes().iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);

    // Terminal cursor: nothing left to fetch.
    assert!(!feed.load_more().await.unwrap());
    feed.close().await;
}

#[tokio::test]
async fn test_submitted_take_renders_once_despite_echo() {
    let (state, config) = spawn_server().await;

    let mut feed = FeedClient::connect(&config, SortMode::Newest).await.unwrap();
    wait_for_subscriber(&state.feed_tx).await;

    let take = feed.submit_take("my own take").await.unwrap();
    assert_eq!(feed.takes().len(), 1);
    assert_eq!(feed.takes()[0].id, take.id);

    // The echo that was broadcast before the confirmation must not
    // surface as a second insert.
    assert!(
        timeout(Duration::from_millis(300), feed.next_change())
            .await
            .is_err()
    );
    assert_eq!(feed.takes().len(), 1);
    feed.close().await;
}

#[tokio::test]
async fn test_remote_take_inserts_at_head() {
    let (state, config) = spawn_server().await;
    state.seed_take("a", "existing", 0);

    let mut feed = FeedClient::connect(&config, SortMode::Newest).await.unwrap();
    wait_for_subscriber(&state.feed_tx).await;

    let _ = state
        .feed_tx
        .send(json!({"type": "new_take", "data": remote_take("r-1", "from elsewhere")}).to_string());

    let change = timeout(Duration::from_secs(5), feed.next_change())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(change, FeedChange::Inserted(ref take) if take.id == "r-1"));
    assert_eq!(feed.takes()[0].id, "r-1");
    feed.close().await;
}

#[tokio::test]
async fn test_ranked_sort_suppresses_live_insert() {
    let (state, config) = spawn_server().await;
    state.seed_take("a", "existing", 0);

    let mut feed = FeedClient::connect(&config, SortMode::Hottest24h)
        .await
        .unwrap();
    wait_for_subscriber(&state.feed_tx).await;

    let _ = state
        .feed_tx
        .send(json!({"type": "new_take", "data": remote_take("r-1", "from elsewhere")}).to_string());

    assert!(
        timeout(Duration::from_millis(300), feed.next_change())
            .await
            .is_err()
    );
    assert_eq!(feed.takes().len(), 1);
    feed.close().await;
}

#[tokio::test]
async fn test_like_settles_on_absolute_server_count() {
    let (state, config) = spawn_server().await;
    state.seed_take("a", "likable", 5);

    let mut feed = FeedClient::connect(&config, SortMode::Newest).await.unwrap();
    wait_for_subscriber(&state.feed_tx).await;

    feed.toggle_like("a").await.unwrap();
    assert!(feed.takes()[0].user_liked);
    assert_eq!(feed.takes()[0].like_count, 6);

    let change = timeout(Duration::from_secs(5), feed.next_change())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        change,
        FeedChange::LikeChanged {
            id: "a".to_string(),
            like_count: 6
        }
    );
    feed.close().await;
}

#[tokio::test]
async fn test_failed_like_reverts_to_captured_state() {
    let (state, config) = spawn_server().await;
    state.seed_take("fail", "unlikable", 7);

    let mut feed = FeedClient::connect(&config, SortMode::Newest).await.unwrap();

    let err = feed.toggle_like("fail").await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Api(ApiError::Rejected(ref detail)) if detail == "nope"
    ));
    assert!(!feed.takes()[0].user_liked);
    assert_eq!(feed.takes()[0].like_count, 7);
    feed.close().await;
}

#[tokio::test]
async fn test_delete_event_removes_entry() {
    let (state, config) = spawn_server().await;
    state.seed_take("a", "doomed", 0);
    state.seed_take("b", "survivor", 0);

    let mut feed = FeedClient::connect(&config, SortMode::Newest).await.unwrap();
    wait_for_subscriber(&state.feed_tx).await;

    let _ = state
        .feed_tx
        .send(json!({"type": "delete_take", "data": {"id": "a"}}).to_string());

    let change = timeout(Duration::from_secs(5), feed.next_change())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        change,
        FeedChange::Removed {
            id: "a".to_string()
        }
    );
    let ids: Vec<&str> = feed.takes().iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["b"]);
    feed.close().await;
}

#[tokio::test]
async fn test_comment_count_bumps_exactly_once() {
    let (state, config) = spawn_server().await;
    state.seed_take("a", "discussed", 0);

    let mut thread = CommentsClient::connect(&config, "a").await.unwrap();
    wait_for_subscriber(&state.comments_tx).await;

    thread.submit_comment("my reply").await.unwrap();
    assert_eq!(thread.comments().len(), 1);
    assert_eq!(thread.take().comment_count, 1);

    // The self-authored echo must not append or bump a second time.
    assert!(
        timeout(Duration::from_millis(300), thread.next_change())
            .await
            .is_err()
    );
    assert_eq!(thread.comments().len(), 1);
    assert_eq!(thread.take().comment_count, 1);

    // A remote comment still lands.
    let remote = Comment {
        id: "c-remote".to_string(),
        take_id: "a".to_string(),
        content: "hot indeed".to_string(),
        username: "remote".to_string(),
        created_at: Utc::now(),
    };
    let _ = state
        .comments_tx
        .send(json!({"type": "new_comment", "data": remote}).to_string());

    let change = timeout(Duration::from_secs(5), thread.next_change())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(change, CommentsChange::CommentAdded(ref c) if c.id == "c-remote"));
    assert_eq!(thread.take().comment_count, 2);
    thread.close().await;
}
