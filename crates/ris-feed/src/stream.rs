//! RIS Live WebSocket client.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

use crate::{BgpUpdate, FeedError, FeedResult, RisMessage, RisSubscription};

/// A subscribed RIS Live connection.
pub struct RisLiveStream {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    url: String,
    ignored: u64,
}

impl std::fmt::Debug for RisLiveStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RisLiveStream")
            .field("url", &self.url)
            .field("ignored", &self.ignored)
            .finish_non_exhaustive()
    }
}

impl RisLiveStream {
    /// Connects to `url` and sends `subscription`.
    pub async fn connect(url: &str, subscription: &RisSubscription) -> FeedResult<Self> {
        let (mut stream, _) = connect_async(url).await?;
        stream.send(Message::Text(subscription.to_request()?.into())).await?;

        tracing::info!(url, host = ?subscription.host, "Subscribed to RIS Live");

        Ok(Self { stream, url: url.to_string(), ignored: 0 })
    }

    /// Receives the next BGP update.
    ///
    /// Returns `Ok(None)` once the server closes the connection. Messages that are not
    /// `ris_message` updates, or that fail to decode, are skipped and counted.
    pub async fn next_update(&mut self) -> FeedResult<Option<BgpUpdate>> {
        loop {
            let Some(msg) = self.stream.next().await else {
                return Ok(None);
            };

            let text = match msg? {
                Message::Text(text) => text,
                Message::Binary(data) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => text.into(),
                    Err(_) => {
                        self.ignored += 1;
                        continue;
                    }
                },
                Message::Close(frame) => {
                    tracing::info!(url = %self.url, ?frame, "RIS Live closed the connection");
                    return Ok(None);
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            };

            match RisMessage::parse(text.as_str()) {
                Ok(RisMessage::Update(update)) => return Ok(Some(*update)),
                Ok(RisMessage::Error(message)) => return Err(FeedError::Server(message)),
                Ok(RisMessage::Other(kind)) => {
                    tracing::debug!(kind, "Ignoring RIS Live message");
                    self.ignored += 1;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping malformed RIS Live message");
                    self.ignored += 1;
                }
            }
        }
    }

    /// Number of frames skipped because they were not decodable updates.
    pub const fn ignored(&self) -> u64 {
        self.ignored
    }

    /// Endpoint this stream is connected to.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Sends a close frame and drains the connection.
    pub async fn close(mut self) -> FeedResult<()> {
        match self.stream.close(None).await {
            Ok(())
            | Err(
                tokio_tungstenite::tungstenite::Error::ConnectionClosed
                | tokio_tungstenite::tungstenite::Error::AlreadyClosed,
            ) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{UPDATE, serve};

    #[tokio::test]
    async fn yields_updates_and_skips_noise() {
        let (url, server) = serve(vec![
            Message::Ping(vec![1].into()),
            Message::Text(r#"{"type":"ris_rrc_list","data":[]}"#.into()),
            Message::Text("garbage".into()),
            Message::Text(UPDATE.into()),
        ])
        .await;

        let mut stream = RisLiveStream::connect(&url, &RisSubscription::default()).await.unwrap();
        let update = stream.next_update().await.unwrap().unwrap();
        assert_eq!(update.peer, "192.0.2.1");
        assert_eq!(update.path.len(), 3);
        assert_eq!(stream.ignored(), 2);

        assert!(stream.next_update().await.unwrap().is_none());

        let subscription = server.await.unwrap();
        assert!(subscription.contains("ris_subscribe"));
    }

    #[tokio::test]
    async fn server_error_is_returned() {
        let (url, _server) = serve(vec![Message::Text(
            r#"{"type":"ris_error","data":{"message":"unknown host"}}"#.into(),
        )])
        .await;

        let mut stream = RisLiveStream::connect(&url, &RisSubscription::default()).await.unwrap();
        let err = stream.next_update().await.unwrap_err();
        assert!(matches!(err, FeedError::Server(message) if message == "unknown host"));
    }
}
