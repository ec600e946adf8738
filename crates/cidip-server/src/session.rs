//! Per-connection session
//!
//! A session owns one accepted connection. Each read is treated as one or
//! more complete messages: the chunk is split on line terminators, every
//! non-blank line is decoded, delivered to the handler and then echoed back
//! as the acknowledgement.
//!
//! A line that fails to decode ends the session. Without a framing delimiter
//! beyond the line terminator there is no reliable way to resynchronise
//! after corrupt input.

use crate::stats::ServerStats;
use cidip_core::{decode, DecodeError, Event, EventHandler};
use std::future::Future;
use std::io;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Default size of the read buffer
pub const DEFAULT_READ_BUFFER_SIZE: usize = 1024;

/// Default limit on a single handler call
pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(5);

/// Session settings
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Bytes requested per read
    pub read_buffer_size: usize,

    /// Close the connection after this long without data (None = never)
    pub idle_timeout: Option<Duration>,

    /// Abandon a handler call after this long
    pub handler_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            idle_timeout: None,
            handler_timeout: DEFAULT_HANDLER_TIMEOUT,
        }
    }
}

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Peer closed the connection
    PeerClosed,
    /// A line failed to decode
    DecodeFailed(DecodeError),
    /// The session was cancelled
    Cancelled,
    /// No data arrived within the idle timeout
    IdleTimeout,
    /// Read or write failure
    Io(io::ErrorKind),
}

/// Summary returned when a session closes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub peer: String,
    pub events_delivered: u64,
    pub outcome: SessionOutcome,
}

enum ReadEvent {
    Data(usize),
    Eof,
    Idle,
    Cancelled,
    Failed(io::Error),
}

enum WriteEvent {
    Done,
    Cancelled,
    Failed(io::Error),
}

/// One accepted connection and its decode pipeline
pub struct ConnectionSession<S> {
    stream: S,
    peer: String,
    handler: Arc<dyn EventHandler>,
    config: SessionConfig,
    stats: Arc<ServerStats>,
    cancel: CancellationToken,
    buffer: Vec<u8>,
    delivered: u64,
}

impl<S> ConnectionSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(
        stream: S,
        peer: impl Into<String>,
        handler: Arc<dyn EventHandler>,
        config: SessionConfig,
    ) -> Self {
        let buffer = vec![0u8; config.read_buffer_size.max(1)];
        Self {
            stream,
            peer: peer.into(),
            handler,
            config,
            stats: Arc::new(ServerStats::new()),
            cancel: CancellationToken::new(),
            buffer,
            delivered: 0,
        }
    }

    /// Report into shared statistics
    pub fn with_stats(mut self, stats: Arc<ServerStats>) -> Self {
        self.stats = stats;
        self
    }

    /// Stop the session when `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run until the connection closes, then release it
    pub async fn run(mut self) -> SessionReport {
        self.stats.session_opened();
        debug!("Session opened for {}", self.peer);

        let outcome = self.read_loop().await;

        // Best effort: the peer may already be gone
        if let Err(e) = self.stream.shutdown().await {
            debug!("Shutdown of {} failed: {}", self.peer, e);
        }
        self.stats.session_closed();

        match &outcome {
            SessionOutcome::PeerClosed => info!("Connection closed by {}", self.peer),
            SessionOutcome::Cancelled => info!("Connection to {} cancelled", self.peer),
            SessionOutcome::IdleTimeout => info!("Connection to {} idle, closing", self.peer),
            SessionOutcome::DecodeFailed(e) => {
                warn!("Closing connection to {} after decode failure: {}", self.peer, e)
            }
            SessionOutcome::Io(kind) => error!("Connection to {} failed: {:?}", self.peer, kind),
        }

        SessionReport {
            peer: self.peer,
            events_delivered: self.delivered,
            outcome,
        }
    }

    async fn read_loop(&mut self) -> SessionOutcome {
        loop {
            let n = match self.next_read().await {
                ReadEvent::Data(n) => n,
                ReadEvent::Eof => return SessionOutcome::PeerClosed,
                ReadEvent::Idle => return SessionOutcome::IdleTimeout,
                ReadEvent::Cancelled => return SessionOutcome::Cancelled,
                ReadEvent::Failed(e) => {
                    error!("Read error from {}: {}", self.peer, e);
                    return SessionOutcome::Io(e.kind());
                }
            };

            self.stats
                .bytes_received
                .fetch_add(n as u64, Ordering::Relaxed);
            let chunk = String::from_utf8_lossy(&self.buffer[..n]).into_owned();

            for line in chunk.lines().map(str::trim).filter(|l| !l.is_empty()) {
                if self.cancel.is_cancelled() {
                    return SessionOutcome::Cancelled;
                }

                let event = match decode(line) {
                    Ok(event) => event,
                    Err(e) => {
                        self.stats.decode_errors.fetch_add(1, Ordering::Relaxed);
                        warn!("Invalid message from {}: {} - line: {:?}", self.peer, e, line);
                        return SessionOutcome::DecodeFailed(e);
                    }
                };

                self.deliver(event).await;

                match self.acknowledge(line).await {
                    WriteEvent::Done => {}
                    WriteEvent::Cancelled => return SessionOutcome::Cancelled,
                    WriteEvent::Failed(e) => {
                        error!("Failed to acknowledge to {}: {}", self.peer, e);
                        return SessionOutcome::Io(e.kind());
                    }
                }
            }
        }
    }

    /// Wait for the next chunk, cancellation or the idle limit
    async fn next_read(&mut self) -> ReadEvent {
        let idle_timeout = self.config.idle_timeout;
        let read = self.stream.read(&mut self.buffer);

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => ReadEvent::Cancelled,
            result = with_timeout(idle_timeout, read) => match result {
                None => ReadEvent::Idle,
                Some(Ok(0)) => ReadEvent::Eof,
                Some(Ok(n)) => ReadEvent::Data(n),
                Some(Err(e)) => ReadEvent::Failed(e),
            },
        }
    }

    async fn deliver(&mut self, event: Event) {
        debug!(
            "Event from {}: client={} cid={}",
            self.peer,
            event.client_code(),
            event.cid()
        );

        let limit = self.config.handler_timeout;
        if tokio::time::timeout(limit, self.handler.on_event(event))
            .await
            .is_err()
        {
            self.stats.handler_timeouts.fetch_add(1, Ordering::Relaxed);
            warn!(
                "Handler {} exceeded {:?} for event from {}",
                self.handler.name(),
                limit,
                self.peer
            );
        }

        self.delivered += 1;
        self.stats.events_delivered.fetch_add(1, Ordering::Relaxed);
    }

    /// Echo the trimmed line back to the peer
    ///
    /// A peer that stops reading blocks the write, so it is raced against
    /// cancellation like a read.
    async fn acknowledge(&mut self, line: &str) -> WriteEvent {
        let stream = &mut self.stream;
        let write = async move {
            stream.write_all(line.as_bytes()).await?;
            stream.flush().await
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => WriteEvent::Cancelled,
            result = write => match result {
                Ok(()) => WriteEvent::Done,
                Err(e) => WriteEvent::Failed(e),
            },
        }
    }
}

async fn with_timeout<F: Future>(limit: Option<Duration>, fut: F) -> Option<F::Output> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut).await.ok(),
        None => Some(fut.await),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cidip_core::{DecodeErrorKind, FnHandler};
    use std::sync::atomic::AtomicUsize;
    use std::pin::Pin;
    use std::sync::Mutex;
    use std::task::{Context, Poll};
    use tokio::io::{duplex, DuplexStream, ReadBuf};

    const VALID_1: &str = "user,pass,AXPRO,18340101501";
    const VALID_2: &str = "user,pass,AXPRO,18160200602";
    const VALID_3: &str = "user,pass,AXPRO,18113001003";

    fn recording_handler() -> (Arc<dyn EventHandler>, Arc<Mutex<Vec<Event>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler = FnHandler::new("recorder", move |event| {
            sink.lock().unwrap().push(event);
        });
        (Arc::new(handler), seen)
    }

    fn session_config() -> SessionConfig {
        SessionConfig {
            handler_timeout: Duration::from_secs(1),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_delivers_and_acknowledges_each_line() {
        let (mut client, server) = duplex(4096);
        let (handler, seen) = recording_handler();
        let session = ConnectionSession::new(server, "test", handler, session_config());
        let task = tokio::spawn(session.run());

        for line in [VALID_1, VALID_2] {
            client
                .write_all(format!("{}\r\n", line).as_bytes())
                .await
                .unwrap();
            let mut ack = vec![0u8; line.len()];
            client.read_exact(&mut ack).await.unwrap();
            assert_eq!(ack, line.as_bytes());
        }

        drop(client);
        let report = task.await.unwrap();
        assert_eq!(report.outcome, SessionOutcome::PeerClosed);
        assert_eq!(report.events_delivered, 2);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].event_code(), 401);
        assert!(seen[1].is_test());
    }

    #[tokio::test]
    async fn test_multiple_lines_in_one_read() {
        let (mut client, server) = duplex(4096);
        let (handler, seen) = recording_handler();
        let task = tokio::spawn(
            ConnectionSession::new(server, "test", handler, session_config()).run(),
        );

        let payload = format!("{}\n\n{}\n{}\n", VALID_1, VALID_2, VALID_3);
        client.write_all(payload.as_bytes()).await.unwrap();

        let expected = format!("{}{}{}", VALID_1, VALID_2, VALID_3);
        let mut acks = vec![0u8; expected.len()];
        client.read_exact(&mut acks).await.unwrap();
        assert_eq!(acks, expected.as_bytes());

        drop(client);
        let report = task.await.unwrap();
        assert_eq!(report.events_delivered, 3);

        let codes: Vec<u16> = seen.lock().unwrap().iter().map(Event::event_code).collect();
        assert_eq!(codes, vec![401, 602, 130]);
    }

    #[tokio::test]
    async fn test_malformed_line_closes_after_valid_ones() {
        let (mut client, server) = duplex(4096);
        let (handler, seen) = recording_handler();
        let stats = Arc::new(ServerStats::new());
        let task = tokio::spawn(
            ConnectionSession::new(server, "test", handler, session_config())
                .with_stats(stats.clone())
                .run(),
        );

        let payload = format!("{}\n{}\na,b,c\n{}\n", VALID_1, VALID_2, VALID_3);
        client.write_all(payload.as_bytes()).await.unwrap();

        let report = task.await.unwrap();
        assert_eq!(report.events_delivered, 2);
        match &report.outcome {
            SessionOutcome::DecodeFailed(e) => {
                assert_eq!(e.kind(), DecodeErrorKind::MalformedEnvelope)
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(seen.lock().unwrap().len(), 2);

        // Only the valid lines were acknowledged, then the stream was closed
        let mut acks = Vec::new();
        client.read_to_end(&mut acks).await.unwrap();
        assert_eq!(acks, format!("{}{}", VALID_1, VALID_2).as_bytes());

        let snap = stats.snapshot();
        assert_eq!(snap.decode_errors, 1);
        assert_eq!(snap.events_delivered, 2);
        assert_eq!(snap.active_sessions, 0);
    }

    #[tokio::test]
    async fn test_bad_cid_closes_immediately() {
        let (mut client, server) = duplex(4096);
        let (handler, seen) = recording_handler();
        let task = tokio::spawn(
            ConnectionSession::new(server, "test", handler, session_config()).run(),
        );

        client.write_all(b"a,b,c,1A340101501").await.unwrap();

        let report = task.await.unwrap();
        assert_eq!(report.events_delivered, 0);
        assert!(matches!(
            report.outcome,
            SessionOutcome::DecodeFailed(DecodeError::InvalidCidFormat { .. })
        ));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_stops_pending_read() {
        let (_client, server) = duplex(4096);
        let (handler, seen) = recording_handler();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(
            ConnectionSession::new(server, "test", handler, session_config())
                .with_cancellation(cancel.clone())
                .run(),
        );

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let report = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("session did not stop")
            .unwrap();
        assert_eq!(report.outcome, SessionOutcome::Cancelled);
        assert!(seen.lock().unwrap().is_empty());
    }

    /// Stream whose peer never reads: writes stay pending forever
    struct StalledWriter {
        inner: DuplexStream,
    }

    impl AsyncRead for StalledWriter {
        fn poll_read(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Pin::new(&mut self.inner).poll_read(cx, buf)
        }
    }

    impl AsyncWrite for StalledWriter {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Pending
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_cancellation_stops_blocked_acknowledgement() {
        let (mut client, server) = duplex(4096);
        let (handler, seen) = recording_handler();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(
            ConnectionSession::new(
                StalledWriter { inner: server },
                "test",
                handler,
                session_config(),
            )
            .with_cancellation(cancel.clone())
            .run(),
        );

        client
            .write_all(format!("{}\n", VALID_1).as_bytes())
            .await
            .unwrap();

        // Delivered, now stuck writing the acknowledgement
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!task.is_finished());
        assert_eq!(seen.lock().unwrap().len(), 1);

        cancel.cancel();
        let report = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("session did not stop")
            .unwrap();
        assert_eq!(report.outcome, SessionOutcome::Cancelled);
        assert_eq!(report.events_delivered, 1);
    }

    #[tokio::test]
    async fn test_failed_acknowledgement_keeps_delivery() {
        let (mut client, server) = duplex(4096);
        let (handler, seen) = recording_handler();
        let stats = Arc::new(ServerStats::new());

        // The peer is gone before the acknowledgement can be written
        client
            .write_all(format!("{}\n", VALID_1).as_bytes())
            .await
            .unwrap();
        drop(client);

        let report = ConnectionSession::new(server, "test", handler, session_config())
            .with_stats(stats.clone())
            .run()
            .await;
        assert!(matches!(report.outcome, SessionOutcome::Io(_)));
        assert_eq!(report.events_delivered, 1);
        assert_eq!(stats.snapshot().events_delivered, 1);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].event_code(), 401);
    }

    #[tokio::test]
    async fn test_idle_timeout() {
        let (_client, server) = duplex(4096);
        let (handler, _) = recording_handler();
        let config = SessionConfig {
            idle_timeout: Some(Duration::from_millis(50)),
            ..session_config()
        };

        let report = tokio::time::timeout(
            Duration::from_secs(2),
            ConnectionSession::new(server, "test", handler, config).run(),
        )
        .await
        .expect("idle timeout did not fire");
        assert_eq!(report.outcome, SessionOutcome::IdleTimeout);
    }

    struct SlowHandler {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EventHandler for SlowHandler {
        fn name(&self) -> &str {
            "slow"
        }

        async fn on_event(&self, _event: Event) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
    }

    #[tokio::test]
    async fn test_slow_handler_is_bounded() {
        let (mut client, server) = duplex(4096);
        let handler = Arc::new(SlowHandler {
            calls: AtomicUsize::new(0),
        });
        let stats = Arc::new(ServerStats::new());
        let config = SessionConfig {
            handler_timeout: Duration::from_millis(20),
            ..Default::default()
        };
        let task = tokio::spawn(
            ConnectionSession::new(server, "test", handler.clone(), config)
                .with_stats(stats.clone())
                .run(),
        );

        client.write_all(VALID_1.as_bytes()).await.unwrap();
        let mut ack = vec![0u8; VALID_1.len()];
        tokio::time::timeout(Duration::from_secs(2), client.read_exact(&mut ack))
            .await
            .expect("no acknowledgement")
            .unwrap();
        assert_eq!(ack, VALID_1.as_bytes());

        drop(client);
        let report = task.await.unwrap();
        assert_eq!(report.events_delivered, 1);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        assert_eq!(stats.snapshot().handler_timeouts, 1);
    }

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert_eq!(config.read_buffer_size, 1024);
        assert_eq!(config.idle_timeout, None);
        assert_eq!(config.handler_timeout, Duration::from_secs(5));
    }
}
