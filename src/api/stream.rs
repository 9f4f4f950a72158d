use async_trait::async_trait;
use axum::extract::State;
use axum::response::sse::{Event, Sse};
use futures::stream::{self, Stream};
use std::convert::Infallible;
use tokio::sync::mpsc;

use super::server::AppState;
use crate::errors::{NotifierError, Result};
use crate::stream::{serve_connection, EventWriter, StreamEvent};
use crate::utils::wait_for_shutdown;

/// Frames sink items as server-sent events into the response body.
struct SseWriter {
    tx: mpsc::Sender<Event>,
}

#[async_trait]
impl EventWriter for SseWriter {
    async fn write(&mut self, event: StreamEvent) -> Result<()> {
        let mut frame = Event::default().data(event.to_json()?);
        if let Some(seq) = event.seq() {
            frame = frame.id(seq.to_string());
        }
        self.tx.send(frame).await.map_err(|_| NotifierError::ClientGone)
    }
}

/// `GET /alerts/stream`
///
/// Notifications arrive as `id: <seq>` + `data: <event>`; heartbeats carry
/// only `data: {"timestamp": ...}`. A jump in `id` means this client missed
/// events under backpressure.
pub async fn stream_alerts(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let sink = state.registry.connect();
    let (tx, rx) = mpsc::channel::<Event>(1);

    let writer = SseWriter { tx: tx.clone() };
    let mut shutdown = state.shutdown.clone();
    let cancelled = async move {
        tokio::select! {
            _ = tx.closed() => {}
            _ = wait_for_shutdown(&mut shutdown) => {}
        }
    };

    tokio::spawn(serve_connection(
        state.registry.clone(),
        sink,
        writer,
        cancelled,
        state.heartbeat_interval,
    ));

    let body = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (Ok(event), rx))
    });
    Sse::new(body)
}
