use firesight_common::models::CameraId;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::consumer::{ConnectionState, Connector, FeedChange, FeedStatus, StreamConsumer};
use crate::snapshot::SnapshotSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileCommand {
    Reconnect,
    Switch(CameraId),
    Close,
}

/// Owner-side handle of a running tile.
pub struct TileHandle {
    commands: mpsc::Sender<TileCommand>,
    status: watch::Receiver<FeedStatus>,
    task: JoinHandle<()>,
}

impl TileHandle {
    pub fn status(&self) -> FeedStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<FeedStatus> {
        self.status.clone()
    }

    /// Returns `false` if the tile has already shut down.
    pub async fn send(&self, command: TileCommand) -> bool {
        self.commands.send(command).await.is_ok()
    }

    /// Close the feed and wait for the tile task to finish.
    pub async fn shutdown(self) {
        let _ = self.commands.send(TileCommand::Close).await;
        if let Err(e) = self.task.await {
            warn!(error = %e, "tile task panicked");
        }
    }
}

/// Start a tile for `camera_id`. The tile exclusively owns its consumer and
/// connects right away.
pub fn spawn_tile<C>(connector: C, camera_id: CameraId, snapshots: Option<SnapshotSink>) -> TileHandle
where
    C: Connector + Send + 'static,
    C::Socket: Send + 'static,
{
    let mut consumer = StreamConsumer::new(connector, camera_id);
    consumer.open(camera_id);

    let (status_tx, status_rx) = watch::channel(consumer.status());
    let (command_tx, command_rx) = mpsc::channel(16);
    let task = tokio::spawn(run_tile(consumer, command_rx, status_tx, snapshots));

    TileHandle {
        commands: command_tx,
        status: status_rx,
        task,
    }
}

async fn run_tile<C: Connector>(
    mut consumer: StreamConsumer<C>,
    mut commands: mpsc::Receiver<TileCommand>,
    status: watch::Sender<FeedStatus>,
    snapshots: Option<SnapshotSink>,
) {
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(TileCommand::Reconnect) => {
                    info!(camera_id = %consumer.camera_id(), "manual reconnect");
                    consumer.reconnect();
                }
                Some(TileCommand::Switch(next)) => {
                    let previous = consumer.camera_id();
                    consumer.open(next);
                    if previous != next {
                        if let Some(sink) = &snapshots {
                            sink.release(previous).await;
                        }
                    }
                }
                Some(TileCommand::Close) | None => {
                    consumer.close();
                    if let Some(sink) = &snapshots {
                        sink.release(consumer.camera_id()).await;
                    }
                    status.send_replace(consumer.status());
                    debug!(camera_id = %consumer.camera_id(), "tile stopped");
                    return;
                }
            },
            change = consumer.next_change() => match change {
                Some(FeedChange::State(ConnectionState::Error)) => {
                    let id = consumer.camera_id();
                    warn!(camera_id = %id, "connection lost, type `reconnect {id}` to retry");
                    if let Some(sink) = &snapshots {
                        sink.release(id).await;
                    }
                }
                Some(FeedChange::State(ConnectionState::Closed)) => {
                    if let Some(sink) = &snapshots {
                        sink.release(consumer.camera_id()).await;
                    }
                }
                Some(FeedChange::Updated { frame: true, .. }) => {
                    if let (Some(sink), Some(frame)) = (&snapshots, consumer.last_frame()) {
                        if let Err(e) = sink.write(consumer.camera_id(), frame).await {
                            warn!(error = %e, "failed to write snapshot");
                        }
                    }
                }
                Some(_) => {}
                None => return,
            },
        }
        status.send_replace(consumer.status());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::tests::FakeConnector;
    use bytes::Bytes;
    use firesight_common::frame::StreamUpdate;
    use std::time::Duration;

    async fn wait_state(handle: &TileHandle, state: ConnectionState) -> FeedStatus {
        let mut rx = handle.subscribe();
        let status = tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| s.state == state))
            .await
            .expect("timed out waiting for tile state")
            .expect("tile status channel closed")
            .clone();
        status
    }

    #[tokio::test]
    async fn tile_connects_and_publishes_updates() {
        let fake = FakeConnector::default();
        let tile = spawn_tile(fake.clone(), CameraId(1), None);
        assert_eq!(tile.status().state, ConnectionState::Connecting);

        fake.socket(0).opened();
        wait_state(&tile, ConnectionState::Open).await;

        fake.socket(0).update(StreamUpdate::Structured {
            frame: None,
            detections: Some(4),
            fps: Some(15.0),
        });
        let mut rx = tile.subscribe();
        let status = tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| s.detection_count == 4))
            .await
            .unwrap()
            .unwrap()
            .clone();
        assert_eq!(status.fps, 15.0);

        tile.shutdown().await;
        assert_eq!(fake.live(), 0);
    }

    #[tokio::test]
    async fn error_waits_for_manual_reconnect() {
        let fake = FakeConnector::default();
        let tile = spawn_tile(fake.clone(), CameraId(2), None);
        fake.socket(0).failed("refused");
        wait_state(&tile, ConnectionState::Error).await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fake.opened().len(), 1);

        assert!(tile.send(TileCommand::Reconnect).await);
        wait_state(&tile, ConnectionState::Connecting).await;
        assert_eq!(fake.opened(), vec![CameraId(2), CameraId(2)]);
        tile.shutdown().await;
    }

    #[tokio::test]
    async fn switch_keeps_a_single_socket() {
        let fake = FakeConnector::default();
        let tile = spawn_tile(fake.clone(), CameraId(1), None);
        fake.socket(0).opened();
        wait_state(&tile, ConnectionState::Open).await;

        assert!(tile.send(TileCommand::Switch(CameraId(5))).await);
        let status = wait_state(&tile, ConnectionState::Connecting).await;
        assert_eq!(status.camera_id, CameraId(5));
        assert_eq!(fake.live(), 1);
        assert_eq!(fake.log.lock().unwrap().max_live, 1);
        tile.shutdown().await;
    }

    #[tokio::test]
    async fn snapshots_follow_the_feed() {
        let dir = std::env::temp_dir().join(format!("firesight-tile-{}", std::process::id()));
        let sink = SnapshotSink::create(&dir).await.unwrap();
        let fake = FakeConnector::default();
        let tile = spawn_tile(fake.clone(), CameraId(8), Some(sink.clone()));
        fake.socket(0).opened();
        fake.socket(0).update(StreamUpdate::RawFrame(Bytes::from_static(&[0xFF, 0xD8, 0xFF])));

        let mut rx = tile.subscribe();
        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| s.frames_received == 1))
            .await
            .unwrap()
            .unwrap();
        let path = sink.path_for(CameraId(8));
        assert_eq!(std::fs::read(&path).unwrap(), vec![0xFF, 0xD8, 0xFF]);

        tile.shutdown().await;
        assert!(!path.exists());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
