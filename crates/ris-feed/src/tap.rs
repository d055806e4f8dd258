//! Background capture of a RIS Live stream.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use tokio::{
    sync::{Mutex, mpsc},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::{BgpUpdate, BoundedBuffer, FeedError, FeedResult, RisLiveStream};

/// Buffer shared between the tap task and its readers.
pub type SharedBuffer = Arc<Mutex<BoundedBuffer<BgpUpdate>>>;

/// Thread-safe counters updated by the tap task.
#[derive(Debug, Default)]
pub struct FeedCounters {
    /// Updates received from the stream.
    pub updates: AtomicU64,
    /// Updates handed to the forwarding channel.
    pub forwarded: AtomicU64,
    /// Updates dropped because the forwarding channel was full.
    pub forward_dropped: AtomicU64,
}

impl FeedCounters {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of updates received.
    pub fn updates(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }

    /// Returns the number of forwarded updates.
    pub fn forwarded(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }

    /// Returns the number of updates the forwarding channel could not take.
    pub fn forward_dropped(&self) -> u64 {
        self.forward_dropped.load(Ordering::Relaxed)
    }
}

/// A running tap: a task that copies every update into a [`SharedBuffer`] and,
/// optionally, forwards it to a channel.
#[derive(Debug)]
pub struct FeedTap {
    buffer: SharedBuffer,
    counters: Arc<FeedCounters>,
    cancel: CancellationToken,
    handle: JoinHandle<FeedResult<()>>,
}

impl FeedTap {
    /// Spawns the receive loop for `stream`.
    ///
    /// Forwarding never blocks the loop: when `forward` is full the update is only
    /// buffered and counted as dropped.
    pub fn spawn(
        stream: RisLiveStream,
        buffer: SharedBuffer,
        counters: Arc<FeedCounters>,
        forward: Option<mpsc::Sender<BgpUpdate>>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(
            stream,
            Arc::clone(&buffer),
            Arc::clone(&counters),
            forward,
            cancel.clone(),
        ));

        Self { buffer, counters, cancel, handle }
    }

    /// The buffer the tap writes into.
    pub fn buffer(&self) -> SharedBuffer {
        Arc::clone(&self.buffer)
    }

    /// Live counters.
    pub fn counters(&self) -> &FeedCounters {
        &self.counters
    }

    /// Copies the buffered updates, oldest first.
    pub async fn snapshot(&self) -> Vec<BgpUpdate> {
        self.buffer.lock().await.to_vec()
    }

    /// Whether the receive loop has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stops the receive loop and closes the connection.
    pub async fn stop(self) -> FeedResult<()> {
        self.cancel.cancel();
        self.handle.await.map_err(|e| FeedError::Task(e.to_string()))?
    }
}

async fn run(
    mut stream: RisLiveStream,
    buffer: SharedBuffer,
    counters: Arc<FeedCounters>,
    forward: Option<mpsc::Sender<BgpUpdate>>,
    cancel: CancellationToken,
) -> FeedResult<()> {
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            next = stream.next_update() => next,
        };

        let update = match next {
            Ok(Some(update)) => update,
            Ok(None) => {
                tracing::info!(url = stream.url(), "RIS Live stream ended");
                return Ok(());
            }
            Err(e) => {
                tracing::warn!(url = stream.url(), error = %e, "RIS Live stream failed");
                return Err(e);
            }
        };

        let received = counters.updates.fetch_add(1, Ordering::Relaxed) + 1;
        if received % 10 == 0 {
            tracing::info!(received, "Processed BGP updates");
        }

        if let Some(tx) = &forward {
            match tx.try_send(update.clone()) {
                Ok(()) => {
                    counters.forwarded.fetch_add(1, Ordering::Relaxed);
                }
                Err(mpsc::error::TrySendError::Full(_)) => {
                    counters.forward_dropped.fetch_add(1, Ordering::Relaxed);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }

        buffer.lock().await.push(update);
    }

    tracing::debug!(ignored = stream.ignored(), "Stopping RIS Live tap");
    stream.close().await
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio_tungstenite::tungstenite::Message;

    use super::*;
    use crate::{
        RisSubscription,
        test_utils::{UPDATE, serve},
    };

    #[tokio::test]
    async fn buffers_and_forwards_until_close() {
        let (url, _server) = serve(vec![Message::Text(UPDATE.into()); 5]).await;
        let stream = RisLiveStream::connect(&url, &RisSubscription::default()).await.unwrap();

        let buffer: SharedBuffer = Arc::new(Mutex::new(BoundedBuffer::new(3)));
        let counters = Arc::new(FeedCounters::new());
        let (tx, mut rx) = mpsc::channel(2);
        let tap = FeedTap::spawn(stream, Arc::clone(&buffer), Arc::clone(&counters), Some(tx));

        tokio::time::timeout(Duration::from_secs(5), async {
            while !tap.is_finished() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(tap.counters().updates(), 5);
        assert_eq!(tap.counters().forwarded() + tap.counters().forward_dropped(), 5);
        assert_eq!(tap.snapshot().await.len(), 3);
        assert_eq!(buffer.lock().await.dropped(), 2);
        assert!(rx.recv().await.is_some());

        tap.stop().await.unwrap();
    }

    #[tokio::test]
    async fn stop_cancels_idle_stream() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            // Hold the connection open until the client closes it.
            while let Some(Ok(msg)) = futures_util::StreamExt::next(&mut ws).await {
                if msg.is_close() {
                    break;
                }
            }
        });

        let stream = RisLiveStream::connect(&url, &RisSubscription::default()).await.unwrap();
        let tap = FeedTap::spawn(
            stream,
            Arc::new(Mutex::new(BoundedBuffer::default())),
            Arc::new(FeedCounters::new()),
            None,
        );

        tokio::time::timeout(Duration::from_secs(5), tap.stop()).await.unwrap().unwrap();
        tokio::time::timeout(Duration::from_secs(5), server).await.unwrap().unwrap();
    }
}
