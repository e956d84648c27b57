use std::time::{Duration, Instant};

use bytes::Bytes;
use firesight_common::config::StreamConfig;
use firesight_common::frame::{StreamUpdate, WirePayload};
use firesight_common::models::CameraId;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::oneshot;
use tokio::time::Interval;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::consumer::{Connector, Socket, SocketEvents};

/// Control message the backend answers with `{"type":"pong"}`.
const KEEPALIVE_PING: &str = r#"{"type":"ping"}"#;
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Opens one WebSocket per camera at `{ws_url}/{path}/{camera_id}`.
#[derive(Debug, Clone)]
pub struct WsConnector {
    base_url: String,
    path: String,
    connect_timeout: Duration,
    keepalive: Option<Duration>,
}

impl WsConnector {
    pub fn new(ws_url: &str, stream: &StreamConfig) -> Self {
        Self {
            base_url: ws_url.trim_end_matches('/').to_string(),
            path: stream.path.trim_matches('/').to_string(),
            connect_timeout: stream.connect_timeout(),
            keepalive: stream.keepalive(),
        }
    }

    pub fn stream_url(&self, camera_id: CameraId) -> String {
        if self.path.is_empty() {
            format!("{}/{camera_id}", self.base_url)
        } else {
            format!("{}/{}/{camera_id}", self.base_url, self.path)
        }
    }
}

/// Handle to a running socket task. Closing (or dropping) it tells the task
/// to send a close frame and exit.
pub struct WsSocket {
    shutdown: Option<oneshot::Sender<()>>,
}

impl Socket for WsSocket {
    fn close(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            // The task may already have exited after an error.
            let _ = tx.send(());
        }
    }
}

impl Drop for WsSocket {
    fn drop(&mut self) {
        self.close();
    }
}

impl Connector for WsConnector {
    type Socket = WsSocket;

    fn connect(&self, camera_id: CameraId, events: SocketEvents) -> WsSocket {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let url = self.stream_url(camera_id);
        tokio::spawn(run_socket(
            url,
            camera_id,
            self.connect_timeout,
            self.keepalive,
            events,
            shutdown_rx,
        ));
        WsSocket {
            shutdown: Some(shutdown_tx),
        }
    }
}

async fn run_socket(
    url: String,
    camera_id: CameraId,
    connect_timeout: Duration,
    keepalive: Option<Duration>,
    events: SocketEvents,
    mut shutdown: oneshot::Receiver<()>,
) {
    debug!(url = %url, %camera_id, "connecting to stream");

    let connect = tokio::time::timeout(connect_timeout, tokio_tungstenite::connect_async(url.as_str()));
    let ws = tokio::select! {
        _ = &mut shutdown => return,
        result = connect => match result {
            Ok(Ok((ws, _response))) => ws,
            Ok(Err(e)) => {
                events.failed(format!("connect failed: {e}"));
                return;
            }
            Err(_) => {
                events.failed(format!("connect timed out after {connect_timeout:?}"));
                return;
            }
        },
    };

    info!(url = %url, %camera_id, "connected to stream");
    if !events.opened() {
        return;
    }

    let (mut sink, mut stream) = ws.split();
    let mut ping = keepalive.map(|period| {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        interval
    });
    // The first tick of an interval fires immediately.
    if let Some(interval) = ping.as_mut() {
        interval.tick().await;
    }

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                let _ = tokio::time::timeout(CLOSE_GRACE, sink.send(Message::Close(None))).await;
                debug!(%camera_id, "socket task shut down");
                return;
            }
            _ = next_tick(&mut ping) => {
                if let Err(e) = sink.send(Message::Text(KEEPALIVE_PING.into())).await {
                    events.failed(format!("keepalive failed: {e}"));
                    return;
                }
            }
            msg = stream.next() => {
                let arrived = Instant::now();
                let payload = match msg {
                    Some(Ok(Message::Text(text))) => WirePayload::Text(text.to_string()),
                    Some(Ok(Message::Binary(data))) => WirePayload::Binary(Bytes::from(data)),
                    Some(Ok(Message::Close(_))) | None => {
                        events.closed();
                        return;
                    }
                    // Ping/pong are answered by tungstenite itself.
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!(%camera_id, error = %e, "stream read error");
                        events.failed(e.to_string());
                        return;
                    }
                };

                match StreamUpdate::decode(&payload) {
                    Ok(update) => {
                        if !events.update_at(update, arrived) {
                            return;
                        }
                    }
                    Err(e) => debug!(%camera_id, error = %e, "dropping malformed stream message"),
                }
            }
        }
    }
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::{ConnectionState, FeedChange, StreamConsumer};
    use axum::extract::ws::{Message as AxumMessage, WebSocket, WebSocketUpgrade};
    use axum::extract::{Path, State};
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::Router;
    use firesight_common::frame::FrameSource;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct Counters {
        connections: AtomicUsize,
        pings: AtomicUsize,
        disconnects: AtomicUsize,
    }

    type Script = fn(i64) -> Vec<AxumMessage>;

    #[derive(Clone)]
    struct Backend {
        counters: Arc<Counters>,
        script: Script,
    }

    async fn stream_handler(
        ws: WebSocketUpgrade,
        Path(id): Path<i64>,
        State(backend): State<Backend>,
    ) -> impl IntoResponse {
        ws.on_upgrade(move |socket| serve_socket(socket, id, backend))
    }

    async fn serve_socket(mut socket: WebSocket, id: i64, backend: Backend) {
        backend.counters.connections.fetch_add(1, Ordering::SeqCst);
        for msg in (backend.script)(id) {
            if socket.send(msg).await.is_err() {
                return;
            }
        }
        while let Some(Ok(msg)) = socket.recv().await {
            match msg {
                AxumMessage::Text(text) if text.contains("ping") => {
                    backend.counters.pings.fetch_add(1, Ordering::SeqCst);
                    let _ = socket
                        .send(AxumMessage::Text(r#"{"type":"pong"}"#.into()))
                        .await;
                }
                AxumMessage::Close(_) => break,
                _ => {}
            }
        }
        backend.counters.disconnects.fetch_add(1, Ordering::SeqCst);
    }

    async fn spawn_backend(script: Script) -> (String, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let app = Router::new()
            .route("/ws/stream/:id", get(stream_handler))
            .with_state(Backend {
                counters: Arc::clone(&counters),
                script,
            });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("ws://{addr}/ws"), counters)
    }

    fn connector(ws_url: &str, keepalive_secs: u64) -> WsConnector {
        let stream = StreamConfig {
            connect_timeout_secs: 2,
            keepalive_secs,
            ..StreamConfig::default()
        };
        WsConnector::new(ws_url, &stream)
    }

    async fn wait_for<C: Connector>(
        consumer: &mut StreamConsumer<C>,
        mut done: impl FnMut(&StreamConsumer<C>) -> bool,
    ) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !done(consumer) {
                if consumer.next_change().await.is_none() {
                    break;
                }
            }
        })
        .await
        .expect("timed out waiting for stream state");
    }

    fn mixed_script(_id: i64) -> Vec<AxumMessage> {
        vec![
            AxumMessage::Text(r#"{"frame":"AAAA","detections":3}"#.into()),
            AxumMessage::Text("{not json".into()),
            AxumMessage::Binary(vec![1, 2, 3]),
            AxumMessage::Text(r#"{"fps":9.5}"#.into()),
        ]
    }

    fn silent_script(_id: i64) -> Vec<AxumMessage> {
        Vec::new()
    }

    fn closing_script(_id: i64) -> Vec<AxumMessage> {
        vec![AxumMessage::Close(None)]
    }

    #[test]
    fn stream_url_joins_segments() {
        let c = WsConnector::new("ws://host:8000/ws/", &StreamConfig::default());
        assert_eq!(c.stream_url(CameraId(4)), "ws://host:8000/ws/stream/4");
        let c = WsConnector::new(
            "ws://host/ws",
            &StreamConfig {
                path: "/live/".into(),
                ..StreamConfig::default()
            },
        );
        assert_eq!(c.stream_url(CameraId(1)), "ws://host/ws/live/1");
    }

    #[tokio::test]
    async fn decodes_both_payload_shapes_and_skips_malformed() {
        let (ws_url, counters) = spawn_backend(mixed_script).await;
        let mut consumer = StreamConsumer::new(connector(&ws_url, 0), CameraId(1));
        consumer.open(CameraId(1));
        assert_eq!(consumer.state(), ConnectionState::Connecting);

        wait_for(&mut consumer, |c| c.fps() == 9.5).await;

        assert_eq!(consumer.state(), ConnectionState::Open);
        assert_eq!(consumer.detection_count(), 3);
        // The inline frame may be overwritten before it is taken.
        assert!((1..=2).contains(&consumer.frames_received()));
        let frame = consumer.last_frame().unwrap();
        assert_eq!(frame.data.as_ref(), &[1, 2, 3]);
        assert_eq!(frame.source, FrameSource::Binary);
        assert_eq!(counters.connections.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn close_releases_socket_and_silences_updates() {
        let (ws_url, counters) = spawn_backend(mixed_script).await;
        let mut consumer = StreamConsumer::new(connector(&ws_url, 0), CameraId(1));
        consumer.open(CameraId(1));
        wait_for(&mut consumer, |c| c.state() == ConnectionState::Open).await;

        consumer.close();
        tokio::time::timeout(Duration::from_secs(5), async {
            while counters.disconnects.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("server never saw the client close");

        assert!(consumer.process_pending().is_empty());
        assert_eq!(consumer.state(), ConnectionState::Closed);
        assert!(consumer.last_frame().is_none());
    }

    #[tokio::test]
    async fn switching_camera_keeps_one_connection() {
        let (ws_url, counters) = spawn_backend(silent_script).await;
        let mut consumer = StreamConsumer::new(connector(&ws_url, 0), CameraId(1));
        consumer.open(CameraId(1));
        wait_for(&mut consumer, |c| c.state() == ConnectionState::Open).await;

        consumer.open(CameraId(2));
        wait_for(&mut consumer, |c| c.state() == ConnectionState::Open).await;

        tokio::time::timeout(Duration::from_secs(5), async {
            while counters.disconnects.load(Ordering::SeqCst) < 1 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("first socket was not closed");
        assert_eq!(counters.connections.load(Ordering::SeqCst), 2);
        assert_eq!(consumer.camera_id(), CameraId(2));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_an_error_with_no_retry() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut consumer = StreamConsumer::new(connector(&format!("ws://{addr}/ws"), 0), CameraId(3));
        consumer.open(CameraId(3));
        let change = tokio::time::timeout(Duration::from_secs(5), consumer.next_change())
            .await
            .unwrap();
        assert_eq!(change, Some(FeedChange::State(ConnectionState::Error)));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(consumer.process_pending().is_empty());
        assert_eq!(consumer.state(), ConnectionState::Error);
    }

    #[tokio::test]
    async fn server_close_ends_in_closed_state() {
        let (ws_url, _counters) = spawn_backend(closing_script).await;
        let mut consumer = StreamConsumer::new(connector(&ws_url, 0), CameraId(1));
        consumer.open(CameraId(1));
        wait_for(&mut consumer, |c| c.state() == ConnectionState::Closed).await;
        assert_eq!(consumer.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn keepalive_pings_reach_the_backend() {
        let (ws_url, counters) = spawn_backend(silent_script).await;
        let mut stream = StreamConfig::default();
        stream.keepalive_secs = 1;
        let mut consumer = StreamConsumer::new(WsConnector::new(&ws_url, &stream), CameraId(1));
        consumer.open(CameraId(1));
        wait_for(&mut consumer, |c| c.state() == ConnectionState::Open).await;

        tokio::time::timeout(Duration::from_secs(5), async {
            while counters.pings.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("no keepalive ping arrived");

        // The pong reply decodes to an empty update and changes nothing.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(consumer.process_pending().is_empty());
        assert_eq!(consumer.detection_count(), 0);
    }
}
