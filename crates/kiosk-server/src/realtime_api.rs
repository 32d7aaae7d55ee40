//! Live settings updates over WebSocket.
//!
//! `GET /ws/settings` streams every committed settings change so the UI can
//! re-theme without polling:
//!
//! ```json
//! {"type": "change", "key": "theme", "oldValue": "dark", "newValue": "orange"}
//! {"type": "lagged", "missed": 3}
//! ```
//!
//! Incoming text frames are ignored. A failure inside the session is
//! captured like a failed request and the socket is closed with 1011.

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use kiosk_core::SettingChange;
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info};

use crate::api::AppState;
use crate::error::SessionError;

/// Create the real-time routes.
pub fn realtime_routes() -> Router<AppState> {
    Router::new().route("/ws/settings", get(ws_handler))
}

/// Frames sent to socket clients.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SocketMessage {
    /// A committed settings change.
    Change(SettingChange),
    /// The client fell behind and `missed` changes were dropped.
    Lagged { missed: u64 },
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let mut changes = state.settings.subscribe();
    let (mut ws_sender, mut ws_receiver) = socket.split();
    info!("Settings socket connected");

    match forward_changes(&mut ws_sender, &mut ws_receiver, &mut changes).await {
        Ok(()) => debug!("Settings socket closed"),
        Err(e) => {
            state.errors.record_error(&e);
            let close = Message::Close(Some(CloseFrame {
                code: close_code::ERROR,
                reason: "server error".into(),
            }));
            // The transport may already be gone.
            let _ = ws_sender.send(close).await;
            state.shell.show_errors();
        }
    }
}

/// Forwards settings changes to `sink` until the client closes the socket
/// or the settings store goes away.
pub async fn forward_changes<S, R, E>(
    sink: &mut S,
    incoming: &mut R,
    changes: &mut broadcast::Receiver<SettingChange>,
) -> Result<(), SessionError>
where
    S: Sink<Message> + Unpin,
    S::Error: std::error::Error + Send + Sync + 'static,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: std::error::Error + Send + Sync + 'static,
{
    loop {
        tokio::select! {
            change = changes.recv() => {
                let message = match change {
                    Ok(change) => SocketMessage::Change(change),
                    Err(RecvError::Lagged(missed)) => {
                        debug!(missed, "Settings socket lagged");
                        SocketMessage::Lagged { missed }
                    }
                    Err(RecvError::Closed) => return Ok(()),
                };

                let text = serde_json::to_string(&message)?;
                sink.send(Message::Text(text.into()))
                    .await
                    .map_err(|e| SessionError::Transport(Box::new(e)))?;
            }
            frame = incoming.next() => match frame {
                None | Some(Ok(Message::Close(_))) => return Ok(()),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(SessionError::Transport(Box::new(e))),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{sink, stream};
    use kiosk_core::{ErrorLog, SettingsStore};
    use serde_json::{json, Value};
    use std::convert::Infallible;
    use std::sync::{Arc, Mutex};

    type Incoming = stream::Pending<Result<Message, axum::Error>>;
    type Sent = Arc<Mutex<Vec<Message>>>;

    /// A sink that keeps every frame it is given.
    fn recorder() -> (Sent, impl Sink<Message, Error = Infallible> + Unpin) {
        let sent = Sent::default();
        let frames = sent.clone();
        let sink = sink::unfold((), move |(), message: Message| {
            let frames = frames.clone();
            async move {
                frames.lock().unwrap().push(message);
                Ok::<_, Infallible>(())
            }
        });
        (sent, Box::pin(sink))
    }

    fn store(dir: &tempfile::TempDir) -> SettingsStore {
        SettingsStore::open(dir.path().join("settings.json"), Arc::new(ErrorLog::new()))
    }

    fn frames(sent: &Sent) -> Vec<Value> {
        sent.lock()
            .unwrap()
            .iter()
            .map(|message| match message {
                Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
                other => panic!("unexpected frame {other:?}"),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_changes_are_forwarded() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let mut changes = store.subscribe();

        store.set("theme", json!("orange")).unwrap();
        drop(store);

        let (sent, mut sink) = recorder();
        let mut incoming: Incoming = stream::pending();
        forward_changes(&mut sink, &mut incoming, &mut changes)
            .await
            .unwrap();

        let frames = frames(&sent);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["type"], "change");
        assert_eq!(frames[0]["key"], "theme");
        assert_eq!(frames[0]["oldValue"], "dark");
        assert_eq!(frames[0]["newValue"], "orange");
    }

    #[tokio::test]
    async fn test_lagging_client_keeps_streaming() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let mut changes = store.subscribe();

        for _ in 0..70 {
            store.toggle_fullscreen().unwrap();
        }
        drop(store);

        let (sent, mut sink) = recorder();
        let mut incoming: Incoming = stream::pending();
        forward_changes(&mut sink, &mut incoming, &mut changes)
            .await
            .unwrap();

        let frames = frames(&sent);
        assert_eq!(frames[0], json!({"type": "lagged", "missed": 6}));
        assert_eq!(frames.len(), 65);
        assert!(frames[1..].iter().all(|frame| frame["type"] == "change"));
    }

    #[tokio::test]
    async fn test_client_close_ends_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let mut changes = store.subscribe();

        let (sent, mut sink) = recorder();
        let mut incoming = stream::iter(vec![
            Ok::<_, axum::Error>(Message::Text("hello".into())),
            Ok(Message::Close(None)),
        ]);
        forward_changes(&mut sink, &mut incoming, &mut changes)
            .await
            .unwrap();

        assert!(sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let mut changes = store.subscribe();
        store.set("notifications", json!(false)).unwrap();

        let mut broken = Box::pin(sink::unfold((), |(), _message: Message| async {
            Err::<(), _>(std::io::Error::other("connection reset"))
        }));
        let mut incoming: Incoming = stream::pending();

        let result = forward_changes(&mut broken, &mut incoming, &mut changes).await;
        assert!(matches!(result, Err(SessionError::Transport(_))));
    }
}
