//! SessionActor - owns one live session with the target application
//!
//! All session state (configs, values, dirty-set, binding engine, transport
//! sink) lives in the actor and is only touched from its run loop. Callers
//! talk to it through `SessionHandle`; transport tasks report back through
//! the same command channel, tagged with their connection id.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, trace, warn};

use super::actor_handle::SessionHandle;
use super::commands::SessionCommand;
use super::store::SessionStore;
use super::types::{
    ConnectionId, EditOrigin, SessionEvent, SessionSettings, SessionSnapshot, SessionState,
};
use crate::bindings::{BindingEngine, BindingKind, BindingOutcome};
use crate::error::{BindingError, PersistenceError, WireError};
use crate::fixable::{FixableId, FixableValue};
use crate::midi::ControllerMessage;
use crate::persistence::ValueStore;
use crate::transport::{Connector, FrameSink, FrameSource};
use crate::wire::{self, WireMessage};

pub struct SessionActor {
    settings: SessionSettings,
    connector: Arc<dyn Connector>,
    value_store: Option<Arc<dyn ValueStore>>,

    state: SessionState,
    /// Current connection attempt; notifications for any other id are stale
    connection: Option<ConnectionId>,
    sink: Option<Box<dyn FrameSink>>,
    /// Connect task, then receive loop, of the current connection
    transport_task: Option<JoinHandle<()>>,

    store: SessionStore,
    engine: BindingEngine,

    /// Pending flush of the dirty-set
    flush_at: Option<Instant>,

    /// Handed to transport tasks; weak so dropping every handle stops the actor
    command_tx: mpsc::WeakUnboundedSender<SessionCommand>,
    command_rx: mpsc::UnboundedReceiver<SessionCommand>,
    events: mpsc::UnboundedSender<SessionEvent>,

    batches_sent: u64,
}

impl SessionActor {
    /// Spawn a new SessionActor and return a handle plus its event stream
    pub fn spawn(
        settings: SessionSettings,
        connector: Arc<dyn Connector>,
        value_store: Option<Arc<dyn ValueStore>>,
    ) -> (SessionHandle, mpsc::UnboundedReceiver<SessionEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let mut engine = BindingEngine::new();
        for (number, descriptor) in &settings.preset_bindings {
            engine.bind(*number, descriptor.clone());
        }

        let actor = SessionActor {
            settings,
            connector,
            value_store,
            state: SessionState::Disconnected,
            connection: None,
            sink: None,
            transport_task: None,
            store: SessionStore::new(),
            engine,
            flush_at: None,
            command_tx: cmd_tx.downgrade(),
            command_rx: cmd_rx,
            events: event_tx,
            batches_sent: 0,
        };

        tokio::spawn(actor.run());

        info!("SessionActor spawned");

        (SessionHandle::new(cmd_tx), event_rx)
    }

    async fn run(mut self) {
        debug!("SessionActor run loop started");

        loop {
            let flush_at = self.flush_at;
            tokio::select! {
                cmd = self.command_rx.recv() => {
                    let Some(cmd) = cmd else { break };
                    trace!(?cmd, "Processing command");
                    if matches!(cmd, SessionCommand::Shutdown) {
                        info!("SessionActor received shutdown command");
                        break;
                    }
                    self.handle_command(cmd).await;
                }
                _ = sleep_until(flush_at.unwrap_or_else(Instant::now)), if flush_at.is_some() => {
                    self.flush_at = None;
                    self.flush().await;
                }
            }
        }

        if let Some(mut sink) = self.sink.take() {
            sink.close().await;
        }
        if let Some(task) = self.transport_task.take() {
            task.abort();
        }

        info!(
            batches_sent = self.batches_sent,
            "SessionActor run loop terminated"
        );
    }

    async fn handle_command(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::Open { endpoint } => self.handle_open(endpoint),
            SessionCommand::HangUp => self.handle_hang_up().await,
            SessionCommand::LocalEdit { id, value, origin } => {
                self.handle_local_edit(id, value, origin);
            }
            SessionCommand::CancelBinding => {
                if self.engine.cancel_binding().is_some() {
                    self.emit(SessionEvent::Changed);
                }
            }

            SessionCommand::Controller { message, done } => {
                self.handle_controller(&message);
                let _ = done.send(());
            }
            SessionCommand::StartBinding {
                target,
                kind,
                response,
            } => {
                let result = self.handle_start_binding(target, kind);
                let _ = response.send(result);
            }
            SessionCommand::ListBindings { response } => {
                let _ = response.send(self.engine.bindings().sorted());
            }
            SessionCommand::Unbind { number, response } => {
                let removed = self.engine.unbind(number);
                if removed.is_some() {
                    self.emit(SessionEvent::Changed);
                }
                let _ = response.send(removed);
            }
            SessionCommand::Persist { response } => {
                let result = self.handle_persist().await;
                let _ = response.send(result);
            }
            SessionCommand::Restore { response } => {
                let result = self.handle_restore().await;
                let _ = response.send(result);
            }
            SessionCommand::Snapshot { response } => {
                let _ = response.send(self.snapshot());
            }

            SessionCommand::TransportReady { connection, sink } => {
                self.handle_transport_ready(connection, sink).await;
            }
            SessionCommand::ConnectFailed { connection, error } => {
                if self.is_current(connection) {
                    warn!("Connection {} failed: {}", connection, error);
                    self.disconnect(connection).await;
                }
            }
            SessionCommand::Inbound {
                connection,
                message,
            } => {
                if self.is_current(connection) {
                    self.handle_inbound(connection, message).await;
                } else {
                    trace!("Ignoring frame from stale connection {}", connection);
                }
            }
            SessionCommand::TransportClosed { connection, error } => {
                if self.is_current(connection) {
                    match error {
                        Some(e) => warn!("Connection {} lost: {}", connection, e),
                        None => info!("Connection {} closed by peer", connection),
                    }
                    self.disconnect(connection).await;
                }
            }

            // Handled by the run loop
            SessionCommand::Shutdown => {}
        }
    }

    // =========================================================================
    // Connection lifecycle
    // =========================================================================

    fn handle_open(&mut self, endpoint: String) {
        if self.state != SessionState::Disconnected {
            warn!(
                "Ignoring connect to {}: session is {}",
                endpoint, self.state
            );
            return;
        }
        let connection = ConnectionId::next();
        self.connection = Some(connection);
        self.set_state(SessionState::Connecting);
        info!("Connecting to {} ({})", endpoint, connection);

        let connector = Arc::clone(&self.connector);
        let tx = self.command_tx.clone();
        self.transport_task = Some(tokio::spawn(async move {
            let result = connector.connect(&endpoint).await;
            let Some(strong) = tx.upgrade() else {
                return;
            };
            match result {
                Ok((sink, source)) => {
                    let ready = strong
                        .send(SessionCommand::TransportReady { connection, sink })
                        .is_ok();
                    drop(strong);
                    if ready {
                        receive_loop(connection, source, tx).await;
                    }
                }
                Err(error) => {
                    let _ = strong.send(SessionCommand::ConnectFailed { connection, error });
                }
            }
        }));
    }

    async fn handle_transport_ready(&mut self, connection: ConnectionId, mut sink: Box<dyn FrameSink>) {
        if !self.is_current(connection) {
            debug!("Dropping transport of abandoned connection {}", connection);
            sink.close().await;
            return;
        }
        debug!("Connection {} open, waiting for session start", connection);
        self.sink = Some(sink);
    }

    async fn handle_inbound(
        &mut self,
        connection: ConnectionId,
        message: Result<WireMessage, WireError>,
    ) {
        let message = match message {
            Ok(message) => message,
            Err(e) => {
                warn!("Dropping undecodable frame on {}: {}", connection, e);
                self.emit(SessionEvent::DecodeFailed {
                    connection,
                    error: e.to_string(),
                });
                return;
            }
        };

        match message {
            WireMessage::SessionStart {
                stream_name,
                configs,
                values,
            } => {
                info!(
                    "Session '{}' started with {} fixables",
                    stream_name,
                    configs.len()
                );
                self.store.begin_session(stream_name.clone(), configs, values);
                self.engine.apply_configs(self.store.configs());
                self.flush_at = None;
                self.state = SessionState::Connected;
                self.emit(SessionEvent::Connected {
                    connection,
                    stream_name,
                });
                self.emit(SessionEvent::Changed);

                if self.settings.sync_on_start {
                    let values = self.store.values_list();
                    if !values.is_empty() {
                        debug!("Syncing {} values back to the target", values.len());
                        self.send(WireMessage::ValueBatch { values }).await;
                    }
                }
            }
            WireMessage::ValueBatch { values } => {
                if self.state != SessionState::Connected {
                    warn!("Ignoring value batch received before session start");
                    return;
                }
                trace!("Received {} values", values.len());
                self.store.apply_inbound(values);
                self.emit(SessionEvent::Changed);
            }
            WireMessage::SessionEnd => {
                info!("Target ended session on {}", connection);
                self.disconnect(connection).await;
            }
        }
    }

    async fn handle_hang_up(&mut self) {
        let Some(connection) = self.connection else {
            debug!("Hang up requested while disconnected");
            return;
        };
        if self.sink.is_none() {
            info!("Abandoning connection attempt {}", connection);
            self.disconnect(connection).await;
            return;
        }

        self.flush_at = None;
        self.flush().await;
        info!("Hanging up {}", connection);
        self.send(WireMessage::SessionEnd).await;
    }

    /// Tear down `connection`; a no-op unless it is the current one
    async fn disconnect(&mut self, connection: ConnectionId) {
        if !self.is_current(connection) {
            return;
        }
        self.connection = None;
        self.flush_at = None;
        if let Some(mut sink) = self.sink.take() {
            sink.close().await;
        }
        if let Some(task) = self.transport_task.take() {
            task.abort();
        }
        self.state = SessionState::Disconnected;
        self.emit(SessionEvent::Disconnected { connection });
        self.emit(SessionEvent::Changed);
    }

    fn is_current(&self, connection: ConnectionId) -> bool {
        self.connection == Some(connection)
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            self.state = state;
            self.emit(SessionEvent::Changed);
        }
    }

    // =========================================================================
    // Edits and outbound batches
    // =========================================================================

    fn handle_local_edit(&mut self, id: FixableId, value: FixableValue, origin: EditOrigin) {
        trace!(%id, %value, ?origin, "Local edit");
        self.store.apply_local_edit(id, value);
        self.flush_at = Some(Instant::now() + self.settings.window(origin));
        self.emit(SessionEvent::Changed);
    }

    async fn flush(&mut self) {
        if self.state != SessionState::Connected || self.sink.is_none() {
            trace!(
                "Not connected, keeping {} dirty values",
                self.store.dirty().len()
            );
            return;
        }
        let values = self.store.take_dirty_batch();
        if values.is_empty() {
            return;
        }
        debug!("Flushing {} values", values.len());
        self.send(WireMessage::ValueBatch { values }).await;
    }

    async fn send(&mut self, message: WireMessage) {
        let frame = match wire::encode(&message) {
            Ok(frame) => frame,
            Err(e) => {
                error!("Failed to encode {}: {}", message.name(), e);
                return;
            }
        };
        let Some(sink) = self.sink.as_mut() else {
            return;
        };

        match sink.send_frame(frame).await {
            Ok(()) => {
                if matches!(message, WireMessage::ValueBatch { .. }) {
                    self.batches_sent += 1;
                }
            }
            Err(e) => {
                warn!("Failed to send {}: {}", message.name(), e);
                if let Some(connection) = self.connection {
                    self.disconnect(connection).await;
                }
            }
        }
    }

    // =========================================================================
    // Controller input and learn mode
    // =========================================================================

    fn handle_controller(&mut self, message: &ControllerMessage) {
        match self.engine.process(message) {
            BindingOutcome::Update { id, value } => {
                self.handle_local_edit(id, value, EditOrigin::Controller);
            }
            BindingOutcome::Bound {
                number,
                descriptor,
                ..
            } => {
                self.emit(SessionEvent::Bound { number, descriptor });
                self.emit(SessionEvent::Changed);
            }
            BindingOutcome::Incompatible { kind, voice } => {
                self.emit(SessionEvent::BindingIncompatible { kind, voice });
            }
            BindingOutcome::Dropped | BindingOutcome::Unbound => {}
        }
    }

    fn handle_start_binding(
        &mut self,
        target: FixableId,
        kind: Option<BindingKind>,
    ) -> Result<BindingKind, BindingError> {
        let kind = match kind {
            None => self.engine.start_binding(target)?,
            Some(kind) => {
                let phase = self
                    .store
                    .value(&target)
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                self.engine.start_binding_as(target, kind, phase)?;
                kind
            }
        };
        self.emit(SessionEvent::Changed);
        Ok(kind)
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    async fn handle_persist(&mut self) -> Result<usize, PersistenceError> {
        let value_store = self.value_store.clone().ok_or(PersistenceError::Unavailable)?;
        let stream_name = self
            .store
            .stream_name()
            .ok_or(PersistenceError::NoSession)?
            .to_string();

        let values = self.store.values_list();
        let count = values.len();
        value_store.store(&stream_name, values).await?;
        info!("Persisted {} values for '{}'", count, stream_name);
        Ok(count)
    }

    /// Re-apply stored values as user edits, skipping unknown ids and kind mismatches
    ///
    /// Floats are clamped to the current range, which may have changed since
    /// they were stored.
    async fn handle_restore(&mut self) -> Result<usize, PersistenceError> {
        let value_store = self.value_store.clone().ok_or(PersistenceError::Unavailable)?;
        let stream_name = self
            .store
            .stream_name()
            .ok_or(PersistenceError::NoSession)?
            .to_string();

        let mut restored = 0;
        for (id, value) in value_store.load(&stream_name).await? {
            let range = match self.store.config(&id) {
                Some(config) if config.accepts(&value) => config.range(),
                _ => {
                    debug!("Skipping stored value for {}", id);
                    continue;
                }
            };
            self.handle_local_edit(id, value.clamped(range), EditOrigin::User);
            restored += 1;
        }
        info!("Restored {} values for '{}'", restored, stream_name);
        Ok(restored)
    }

    // =========================================================================
    // Observers
    // =========================================================================

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            connection: self.connection,
            stream_name: self.store.stream_name().map(str::to_string),
            rows: self.store.rows(),
            dirty: self.store.dirty().ids().to_vec(),
            pending_binding: self
                .engine
                .pending()
                .map(|p| (p.target.clone(), p.kind)),
        }
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}

/// Forward inbound frames of one connection to the actor until it ends
///
/// Stops early once the actor is gone; the actor aborts it on disconnect.
async fn receive_loop(
    connection: ConnectionId,
    mut source: Box<dyn FrameSource>,
    tx: mpsc::WeakUnboundedSender<SessionCommand>,
) {
    let error = loop {
        match source.next_frame().await {
            Some(Ok(frame)) => {
                let message = wire::decode(&frame);
                let Some(strong) = tx.upgrade() else {
                    return;
                };
                if strong
                    .send(SessionCommand::Inbound {
                        connection,
                        message,
                    })
                    .is_err()
                {
                    return;
                }
            }
            Some(Err(error)) => break Some(error),
            None => break None,
        }
    };
    debug!("Receive loop for {} finished", connection);
    if let Some(strong) = tx.upgrade() {
        let _ = strong.send(SessionCommand::TransportClosed { connection, error });
    }
}
