//! Local RIS Live servers for tests.

use futures_util::{SinkExt, StreamExt};
use tokio::{net::TcpListener, task::JoinHandle};
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// A `ris_message` announcing `203.0.113.0/24` over a three-AS path.
pub const UPDATE: &str = r#"{"type":"ris_message","data":{"timestamp":1.5,"peer":"192.0.2.1","path":[64500,64501,64502],"announcements":[{"next_hop":"192.0.2.1","prefixes":["203.0.113.0/24"]}]}}"#;

/// A `ris_message` frame carrying `path`.
pub fn update_frame(path: &[u32]) -> Message {
    let path: Vec<String> = path.iter().map(u32::to_string).collect();
    Message::Text(
        format!(
            r#"{{"type":"ris_message","data":{{"timestamp":1.5,"peer":"192.0.2.1","path":[{}],"announcements":[{{"next_hop":"192.0.2.1","prefixes":["203.0.113.0/24"]}}]}}}}"#,
            path.join(",")
        )
        .into(),
    )
}

/// Serves `frames` to the first client after reading its subscription, then closes.
///
/// Returns the `ws://` url and a handle resolving to the subscription request.
///
/// # Panics
///
/// Panics if the listener cannot bind or the client misbehaves.
pub async fn serve(frames: Vec<Message>) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(tcp).await.unwrap();
        let subscription = match ws.next().await.unwrap().unwrap() {
            Message::Text(text) => text.to_string(),
            other => panic!("unexpected subscription frame: {other:?}"),
        };
        for frame in frames {
            ws.send(frame).await.unwrap();
        }
        let _ = ws.close(None).await;
        subscription
    });

    (format!("ws://{addr}"), handle)
}
