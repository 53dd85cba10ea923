//! Engine actor: the one Tokio task that owns the [`BattleEngine`].
//!
//! Connection handlers never touch room state. They send commands through
//! an [`EngineHandle`], and the actor applies them strictly one at a time,
//! interleaved with timer fires. That ordering is what makes every room
//! transition atomic without locks.

use std::collections::HashMap;

use crewsync_protocol::{AckFrame, ClientEvent, Recipient, ServerEvent, ServerFrame};
use crewsync_timer::{Clock, TimerFactory, TimerFired, TokioTimers};
use crewsync_transport::ConnectionId;
use tokio::sync::{mpsc, oneshot};

use crate::{BattleConfig, BattleEngine, Dispatch, EngineUnavailable, TimerTag};

/// Channel the actor writes a connection's outbound frames to.
pub type ConnectionSender = mpsc::UnboundedSender<ServerFrame>;

/// Commands sent to the engine actor through its channel.
pub(crate) enum EngineCommand {
    /// A connection was accepted.
    Connect {
        connection_id: ConnectionId,
        sender: ConnectionSender,
    },

    /// A decoded client frame.
    Event {
        connection_id: ConnectionId,
        event: ClientEvent,
        ack: Option<u64>,
    },

    /// The connection closed, errored, or idled out.
    Disconnect { connection_id: ConnectionId },

    /// Request counters.
    Stats { reply: oneshot::Sender<EngineStats> },

    /// Stop the actor.
    Shutdown,
}

/// Point-in-time counters from the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineStats {
    pub rooms: usize,
    pub connections: usize,
    pub timers: usize,
}

/// Handle to the running engine actor. Cheap to clone.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    sender: mpsc::Sender<EngineCommand>,
}

impl EngineHandle {
    /// Registers a connection and where its frames go.
    pub async fn connect(
        &self,
        connection_id: ConnectionId,
        sender: ConnectionSender,
    ) -> Result<(), EngineUnavailable> {
        self.send(EngineCommand::Connect {
            connection_id,
            sender,
        })
        .await
    }

    /// Forwards a client action. Results come back on the connection's
    /// outbox, not here.
    pub async fn send_event(
        &self,
        connection_id: ConnectionId,
        event: ClientEvent,
        ack: Option<u64>,
    ) -> Result<(), EngineUnavailable> {
        self.send(EngineCommand::Event {
            connection_id,
            event,
            ack,
        })
        .await
    }

    pub async fn disconnect(&self, connection_id: ConnectionId) -> Result<(), EngineUnavailable> {
        self.send(EngineCommand::Disconnect { connection_id }).await
    }

    /// Queues a disconnect without waiting, for use from `Drop`. Falls
    /// back to a spawned send when the channel is full.
    pub fn disconnect_later(&self, connection_id: ConnectionId) {
        let cmd = EngineCommand::Disconnect { connection_id };
        if let Err(mpsc::error::TrySendError::Full(cmd)) = self.sender.try_send(cmd) {
            let sender = self.sender.clone();
            tokio::spawn(async move {
                let _ = sender.send(cmd).await;
            });
        }
    }

    pub async fn stats(&self) -> Result<EngineStats, EngineUnavailable> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(EngineCommand::Stats { reply: reply_tx }).await?;
        reply_rx.await.map_err(|_| EngineUnavailable)
    }

    /// Tells the actor to stop. Pending commands queued before this one
    /// are still applied.
    pub async fn shutdown(&self) -> Result<(), EngineUnavailable> {
        self.send(EngineCommand::Shutdown).await
    }

    async fn send(&self, cmd: EngineCommand) -> Result<(), EngineUnavailable> {
        self.sender.send(cmd).await.map_err(|_| EngineUnavailable)
    }
}

/// The internal actor state. Runs inside a Tokio task.
struct EngineActor<C: Clock> {
    engine: BattleEngine<C, TokioTimers<TimerTag>>,
    outboxes: HashMap<ConnectionId, ConnectionSender>,
    receiver: mpsc::Receiver<EngineCommand>,
    timer_rx: mpsc::UnboundedReceiver<TimerFired<TimerTag>>,
}

impl<C: Clock> EngineActor<C> {
    /// Runs the actor loop until shutdown or until every handle is gone.
    async fn run(mut self) {
        tracing::info!("battle engine started");

        loop {
            tokio::select! {
                cmd = self.receiver.recv() => {
                    match cmd {
                        Some(EngineCommand::Shutdown) | None => break,
                        Some(cmd) => self.handle_command(cmd),
                    }
                }
                Some(fired) = self.timer_rx.recv() => {
                    let out = self.engine.on_timer(fired);
                    self.deliver(out);
                }
            }
        }

        tracing::info!(rooms = self.engine.rooms().len(), "battle engine stopped");
    }

    fn handle_command(&mut self, cmd: EngineCommand) {
        match cmd {
            EngineCommand::Connect {
                connection_id,
                sender,
            } => {
                self.engine.connect(connection_id);
                self.outboxes.insert(connection_id, sender);
            }
            EngineCommand::Event {
                connection_id,
                event,
                ack,
            } => match self.engine.handle(connection_id, event) {
                Ok(out) => {
                    self.deliver(out);
                    if let Some(ack) = ack {
                        self.send_to(connection_id, ServerFrame::Ack(AckFrame::ok(ack)));
                    }
                }
                Err(err) => {
                    let body = err.body();
                    let ack_frame = ack.map(|ack| AckFrame::rejected(ack, &body));
                    self.send_to(connection_id, ServerFrame::Event(ServerEvent::Error(body)));
                    if let Some(frame) = ack_frame {
                        self.send_to(connection_id, ServerFrame::Ack(frame));
                    }
                }
            },
            EngineCommand::Disconnect { connection_id } => {
                self.outboxes.remove(&connection_id);
                let out = self.engine.disconnect(connection_id);
                self.deliver(out);
            }
            EngineCommand::Stats { reply } => {
                let _ = reply.send(EngineStats {
                    rooms: self.engine.rooms().len(),
                    connections: self.engine.sessions().len(),
                    timers: self.engine.timers().active(),
                });
            }
            // Handled by the loop.
            EngineCommand::Shutdown => {}
        }
    }

    /// Resolves each recipient to connection outboxes. Room recipients are
    /// resolved now, after the operation, so departed members are skipped
    /// and new ones included.
    fn deliver(&self, dispatches: Vec<Dispatch>) {
        for (recipient, event) in dispatches {
            match recipient {
                Recipient::Room(battle_id) => {
                    for conn in self.engine.room_connections(&battle_id) {
                        self.send_to(conn, ServerFrame::Event(event.clone()));
                    }
                }
                Recipient::Connection(conn) => {
                    self.send_to(conn, ServerFrame::Event(event));
                }
            }
        }
    }

    /// Drops the frame if the connection's writer is gone.
    fn send_to(&self, connection_id: ConnectionId, frame: ServerFrame) {
        if let Some(sender) = self.outboxes.get(&connection_id) {
            if sender.send(frame).is_err() {
                tracing::debug!(conn_id = %connection_id, "outbox closed, frame dropped");
            }
        }
    }
}

/// Spawns the engine actor and returns a handle to it.
///
/// `channel_size` bounds the command queue; handlers wait when it is full.
/// Must be called from inside a Tokio runtime.
pub fn spawn_engine<C: Clock>(config: BattleConfig, clock: C, channel_size: usize) -> EngineHandle {
    let (tx, rx) = mpsc::channel(channel_size.max(1));
    let (timers, timer_rx) = TokioTimers::new();

    let actor = EngineActor {
        engine: BattleEngine::new(config, clock, timers),
        outboxes: HashMap::new(),
        receiver: rx,
        timer_rx,
    };
    tokio::spawn(actor.run());

    EngineHandle { sender: tx }
}
