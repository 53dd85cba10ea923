//! `CrewsyncServer` builder and server loop.
//!
//! This is the entry point for running a battle server. It ties the layers
//! together: the WebSocket transport accepts connections, each connection
//! gets a handler task, and every handler talks to one engine actor that
//! owns all room state.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crewsync_protocol::JsonCodec;
use crewsync_room::{spawn_engine, BattleConfig, EngineHandle};
use crewsync_timer::TokioClock;
use crewsync_transport::{Transport, WebSocketTransport};

use crate::handler::handle_connection;
use crate::CrewsyncError;

/// Server-level settings. Battle rules live in [`BattleConfig`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to.
    pub bind_addr: String,
    /// A connection that sends nothing for this long is closed.
    pub idle_timeout: Duration,
    /// Capacity of the engine command queue.
    pub engine_channel_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            idle_timeout: Duration::from_secs(60),
            engine_channel_size: 1024,
        }
    }
}

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState {
    pub(crate) engine: EngineHandle,
    pub(crate) codec: JsonCodec,
    pub(crate) idle_timeout: Duration,
}

/// Builder for configuring and starting a crewsync server.
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
/// use crewsync::prelude::*;
///
/// # async fn start() -> Result<(), CrewsyncError> {
/// let server = CrewsyncServer::builder()
///     .bind("0.0.0.0:8080")
///     .battle_config(BattleConfig {
///         round_duration: Duration::from_secs(90),
///         ..BattleConfig::default()
///     })
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct CrewsyncServerBuilder {
    config: ServerConfig,
    battle: BattleConfig,
}

impl CrewsyncServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Sets the battle rules every room follows.
    pub fn battle_config(mut self, config: BattleConfig) -> Self {
        self.battle = config;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    pub fn engine_channel_size(mut self, size: usize) -> Self {
        self.config.engine_channel_size = size;
        self
    }

    /// Replaces all server-level settings at once.
    pub fn server_config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Binds the listener and spawns the engine actor.
    ///
    /// Must be called from inside a Tokio runtime.
    pub async fn build(self) -> Result<CrewsyncServer, CrewsyncError> {
        let transport = WebSocketTransport::bind(&self.config.bind_addr).await?;
        let engine = spawn_engine(
            self.battle,
            TokioClock::new(),
            self.config.engine_channel_size,
        );

        let state = Arc::new(ServerState {
            engine,
            codec: JsonCodec,
            idle_timeout: self.config.idle_timeout,
        });

        Ok(CrewsyncServer { transport, state })
    }
}

/// A bound crewsync server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct CrewsyncServer {
    transport: WebSocketTransport,
    state: Arc<ServerState>,
}

impl CrewsyncServer {
    /// Creates a new builder.
    pub fn builder() -> CrewsyncServerBuilder {
        CrewsyncServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, CrewsyncError> {
        Ok(self.transport.local_addr()?)
    }

    /// Handle to the engine actor, for stats or an external shutdown.
    pub fn engine(&self) -> &EngineHandle {
        &self.state.engine
    }

    /// Runs the accept loop until the process is terminated.
    pub async fn run(self) -> Result<(), CrewsyncError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the accept loop until `shutdown` resolves, then stops the
    /// engine actor.
    pub async fn run_until(
        mut self,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), CrewsyncError> {
        tracing::info!(
            addr = %self.local_addr()?,
            idle_timeout_ms = self.state.idle_timeout.as_millis() as u64,
            "crewsync server running"
        );
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = self.transport.accept() => match accepted {
                    Ok(conn) => {
                        let state = Arc::clone(&self.state);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(conn, state).await {
                                tracing::debug!(error = %e, "connection ended with error");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                    }
                },
                () = &mut shutdown => break,
            }
        }

        tracing::info!("crewsync server shutting down");
        self.transport.shutdown().await?;
        // Already stopped is fine.
        let _ = self.state.engine.shutdown().await;
        Ok(())
    }
}
