use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, interval_at, sleep};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, warn};
use url::Url;

use hottakes_wire::Envelope;

use super::{LiveError, Topic, live_url};
use crate::config::ConnectionConfig;

/// Outbound heartbeat token expected by the server.
const HEARTBEAT_TOKEN: &str = "ping";

/// What a topic connection surfaces to its consumer.
#[derive(Debug)]
pub enum LiveEvent {
    /// A parsed `{type, data}` frame.
    Frame(Envelope),
    /// A transport-level error. Reported for observability only; the
    /// connection keeps running until the peer closes.
    TransportError(String),
}

/// One push connection per topic. A supervisor task owns the socket,
/// reconnects with exponential backoff when the peer closes, and gives
/// up silently once the attempt budget is spent. Events arrive on an
/// unbounded channel; the channel closes when the supervisor exits.
pub struct TopicConnection {
    events: mpsc::UnboundedReceiver<LiveEvent>,
    shutdown: watch::Sender<bool>,
    supervisor: Option<tokio::task::JoinHandle<()>>,
}

impl TopicConnection {
    /// Open a push connection for `topic`, derived from the API base
    /// address. The returned handle is live immediately; the first
    /// connect happens on the supervisor task.
    pub fn open(
        base_url: &Url,
        topic: Topic,
        config: ConnectionConfig,
    ) -> Result<Self, LiveError> {
        let url = live_url(base_url, &topic)?;
        let (event_tx, events) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let supervisor = tokio::spawn(supervise(url, config, event_tx, shutdown_rx));
        Ok(Self {
            events,
            shutdown,
            supervisor: Some(supervisor),
        })
    }

    /// Next event, or `None` once the connection has permanently ended.
    pub async fn recv(&mut self) -> Option<LiveEvent> {
        self.events.recv().await
    }

    /// Request shutdown, cancel any pending reconnect, close the socket
    /// and wait for the supervisor to finish. Idempotent, and safe to
    /// call before the first connect completes.
    pub async fn close(&mut self) {
        let _ = self.shutdown.send(true);
        if let Some(handle) = self.supervisor.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for TopicConnection {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
        if let Some(handle) = &self.supervisor {
            handle.abort();
        }
    }
}

async fn supervise(
    url: Url,
    config: ConnectionConfig,
    events: mpsc::UnboundedSender<LiveEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut attempt: u32 = 0;
    loop {
        if *shutdown.borrow() {
            return;
        }

        let connected = tokio::select! {
            _ = shutdown.changed() => return,
            result = connect_async(url.as_str()) => result,
        };

        match connected {
            Ok((ws_stream, _)) => {
                attempt = 0;
                debug!(url = %url, "push connection established");
                pump(ws_stream, &config, &events, &mut shutdown).await;
                if *shutdown.borrow() {
                    return;
                }
                debug!(url = %url, "push connection closed by peer");
            }
            Err(err) => {
                let _ = events.send(LiveEvent::TransportError(err.to_string()));
            }
        }

        if attempt >= config.max_reconnect_attempts {
            debug!(url = %url, attempts = attempt, "reconnect budget spent, giving up");
            return;
        }
        let delay = config.reconnect_delay(attempt);
        attempt += 1;
        debug!(url = %url, attempt, delay_ms = delay.as_millis() as u64, "reconnect scheduled");
        tokio::select! {
            _ = shutdown.changed() => return,
            _ = sleep(delay) => {}
        }
    }
}

/// Drive one established socket: heartbeat out, frames in. Returns when
/// the peer closes, the stream ends, or shutdown is requested.
async fn pump(
    ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    config: &ConnectionConfig,
    events: &mpsc::UnboundedSender<LiveEvent>,
    shutdown: &mut watch::Receiver<bool>,
) {
    let (mut sink, mut stream) = ws_stream.split();
    // First tick lands one full interval after establishment.
    let mut heartbeat = interval_at(
        Instant::now() + config.heartbeat_interval,
        config.heartbeat_interval,
    );

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                let _ = sink.send(Message::Close(None)).await;
                return;
            }
            _ = heartbeat.tick() => {
                if let Err(err) = sink.send(Message::Text(HEARTBEAT_TOKEN.to_string())).await {
                    warn!(error = %err, "heartbeat send failed");
                }
            }
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => match Envelope::parse(&text) {
                        Ok(envelope) => {
                            let _ = events.send(LiveEvent::Frame(envelope));
                        }
                        Err(err) => {
                            warn!(error = %err, "dropping malformed frame");
                        }
                    },
                    Some(Ok(Message::Close(_))) | None => return,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        let _ = events.send(LiveEvent::TransportError(err.to_string()));
                    }
                }
            }
        }
    }
}
