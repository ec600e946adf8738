//! TCP listener for Contact ID panels
//!
//! Accepts connections and runs one [`ConnectionSession`] task per
//! connection. Sessions are independent: a session that fails or closes has
//! no effect on the listener or on other sessions.

use crate::session::{ConnectionSession, SessionConfig, SessionOutcome};
use crate::stats::ServerStats;
use cidip_core::config::ListenerSettings;
use cidip_core::EventHandler;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Pause after a failed accept before trying again
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Listener settings
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Interface to bind
    pub host: String,

    /// Port to bind (0 picks an ephemeral port)
    pub port: u16,

    /// Settings applied to every session
    pub session: SessionConfig,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            session: SessionConfig::default(),
        }
    }
}

impl From<&ListenerSettings> for ListenerConfig {
    fn from(settings: &ListenerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            session: SessionConfig {
                read_buffer_size: settings.read_buffer_size,
                idle_timeout: settings.idle_timeout(),
                handler_timeout: settings.handler_timeout(),
            },
        }
    }
}

/// Contact ID over IP receiver
pub struct ContactIdServer {
    listener: TcpListener,
    config: ListenerConfig,
    handler: Arc<dyn EventHandler>,
    stats: Arc<ServerStats>,
    cancel: CancellationToken,
}

impl ContactIdServer {
    /// Bind the listening socket
    pub async fn bind(config: ListenerConfig, handler: Arc<dyn EventHandler>) -> io::Result<Self> {
        let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
        info!("Serving on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            config,
            handler,
            stats: Arc::new(ServerStats::new()),
            cancel: CancellationToken::new(),
        })
    }

    /// Address actually bound
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Get statistics
    pub fn stats(&self) -> Arc<ServerStats> {
        self.stats.clone()
    }

    /// Token that stops the listener and every session when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Accept connections until shut down, then wait for sessions to close
    pub async fn run(self) -> io::Result<()> {
        let mut sessions = JoinSet::new();

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!("Shutdown requested, closing {} session(s)", sessions.len());
                    break;
                }
                Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(e) = joined {
                        error!("Session task failed: {}", e);
                    }
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        self.stats.connections.fetch_add(1, Ordering::Relaxed);
                        info!("Connection from {}", peer);
                        self.spawn_session(&mut sessions, stream, peer);
                    }
                    Err(e) => {
                        error!("Accept error: {}", e);
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
            }
        }

        // Session tokens are children of ours, so they are already cancelled
        while let Some(joined) = sessions.join_next().await {
            if let Err(e) = joined {
                error!("Session task failed: {}", e);
            }
        }

        info!("Listener stopped");
        Ok(())
    }

    fn spawn_session(
        &self,
        sessions: &mut JoinSet<()>,
        stream: tokio::net::TcpStream,
        peer: SocketAddr,
    ) {
        let session = ConnectionSession::new(
            stream,
            peer.to_string(),
            self.handler.clone(),
            self.config.session.clone(),
        )
        .with_stats(self.stats.clone())
        .with_cancellation(self.cancel.child_token());

        sessions.spawn(async move {
            let report = session.run().await;
            match report.outcome {
                SessionOutcome::DecodeFailed(_) | SessionOutcome::Io(_) => info!(
                    "Session {} ended abnormally after {} event(s)",
                    report.peer, report.events_delivered
                ),
                _ => debug!(
                    "Session {} ended after {} event(s)",
                    report.peer, report.events_delivered
                ),
            }
        });
    }
}
