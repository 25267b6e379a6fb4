//! SessionHandle - public API of the SessionActor
//!
//! Fire-and-forget methods for edits and lifecycle requests, async methods
//! with oneshot responses for queries. `ControllerHandoff` is the narrow
//! entry point for hardware input threads.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use super::actor::SessionActor;
use super::commands::SessionCommand;
use super::types::{EditOrigin, SessionEvent, SessionSettings, SessionSnapshot};
use crate::bindings::{BindingDescriptor, BindingKind};
use crate::error::SessionError;
use crate::fixable::{FixableId, FixableValue};
use crate::midi::ControllerMessage;
use crate::persistence::ValueStore;
use crate::transport::Connector;

/// Handle for interacting with the SessionActor
#[derive(Clone)]
pub struct SessionHandle {
    cmd_tx: mpsc::UnboundedSender<SessionCommand>,
}

impl SessionHandle {
    pub(crate) fn new(cmd_tx: mpsc::UnboundedSender<SessionCommand>) -> Self {
        Self { cmd_tx }
    }

    /// Spawn a new SessionActor; see [`SessionActor::spawn`]
    pub fn spawn(
        settings: SessionSettings,
        connector: Arc<dyn Connector>,
        value_store: Option<Arc<dyn ValueStore>>,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        SessionActor::spawn(settings, connector, value_store)
    }

    // =========================================================================
    // Fire-and-forget
    // =========================================================================

    /// Connect to `endpoint`; ignored unless disconnected
    pub fn open_connection(&self, endpoint: impl Into<String>) {
        let _ = self.cmd_tx.send(SessionCommand::Open {
            endpoint: endpoint.into(),
        });
    }

    /// Ask the target to end the session
    ///
    /// The session stays connected until the target answers or the
    /// transport closes.
    pub fn hang_up(&self) {
        let _ = self.cmd_tx.send(SessionCommand::HangUp);
    }

    /// Record a user edit; it reaches the target with the next flush
    pub fn apply_local_edit(&self, id: FixableId, value: FixableValue) {
        let _ = self.cmd_tx.send(SessionCommand::LocalEdit {
            id,
            value,
            origin: EditOrigin::User,
        });
    }

    pub fn cancel_binding(&self) {
        let _ = self.cmd_tx.send(SessionCommand::CancelBinding);
    }

    pub fn shutdown(&self) {
        let _ = self.cmd_tx.send(SessionCommand::Shutdown);
    }

    // =========================================================================
    // Request-response
    // =========================================================================

    /// Enter learn mode for `target` with the kind its config implies
    pub async fn start_binding(&self, target: FixableId) -> Result<BindingKind, SessionError> {
        self.request_binding(target, None).await
    }

    /// Enter learn mode with an explicit binding kind
    pub async fn start_binding_as(
        &self,
        target: FixableId,
        kind: BindingKind,
    ) -> Result<BindingKind, SessionError> {
        self.request_binding(target, Some(kind)).await
    }

    async fn request_binding(
        &self,
        target: FixableId,
        kind: Option<BindingKind>,
    ) -> Result<BindingKind, SessionError> {
        let (response, rx) = oneshot::channel();
        self.send(SessionCommand::StartBinding {
            target,
            kind,
            response,
        })?;
        Ok(rx.await.map_err(|_| SessionError::ActorGone)??)
    }

    /// Current bindings ordered by input number
    pub async fn bindings(&self) -> Result<Vec<(u8, BindingDescriptor)>, SessionError> {
        let (response, rx) = oneshot::channel();
        self.send(SessionCommand::ListBindings { response })?;
        rx.await.map_err(|_| SessionError::ActorGone)
    }

    /// Remove the binding of an input number, returning what it was bound to
    pub async fn unbind(&self, number: u8) -> Result<Option<BindingDescriptor>, SessionError> {
        let (response, rx) = oneshot::channel();
        self.send(SessionCommand::Unbind { number, response })?;
        rx.await.map_err(|_| SessionError::ActorGone)
    }

    /// Store every current value under the session's stream name
    pub async fn persist(&self) -> Result<usize, SessionError> {
        let (response, rx) = oneshot::channel();
        self.send(SessionCommand::Persist { response })?;
        Ok(rx.await.map_err(|_| SessionError::ActorGone)??)
    }

    /// Re-apply stored values as local edits, returning how many applied
    pub async fn restore(&self) -> Result<usize, SessionError> {
        let (response, rx) = oneshot::channel();
        self.send(SessionCommand::Restore { response })?;
        Ok(rx.await.map_err(|_| SessionError::ActorGone)??)
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        let (response, rx) = oneshot::channel();
        self.send(SessionCommand::Snapshot { response })?;
        rx.await.map_err(|_| SessionError::ActorGone)
    }

    pub fn controller_handoff(&self) -> ControllerHandoff {
        ControllerHandoff {
            cmd_tx: self.cmd_tx.clone(),
        }
    }

    fn send(&self, cmd: SessionCommand) -> Result<(), SessionError> {
        self.cmd_tx.send(cmd).map_err(|_| SessionError::ActorGone)
    }
}

/// Delivers controller messages into the session
///
/// Each delivery returns only after the session processed the message, so
/// a hardware thread never races ahead of the binding engine.
#[derive(Clone)]
pub struct ControllerHandoff {
    cmd_tx: mpsc::UnboundedSender<SessionCommand>,
}

impl ControllerHandoff {
    /// Deliver from a non-async thread (e.g. a MIDI callback)
    ///
    /// Must not be called from within the tokio runtime.
    pub fn deliver_blocking(&self, message: ControllerMessage) -> bool {
        match self.enqueue(message) {
            Some(done) => done.blocking_recv().is_ok(),
            None => false,
        }
    }

    pub async fn deliver(&self, message: ControllerMessage) -> bool {
        match self.enqueue(message) {
            Some(done) => done.await.is_ok(),
            None => false,
        }
    }

    fn enqueue(&self, message: ControllerMessage) -> Option<oneshot::Receiver<()>> {
        let (done, rx) = oneshot::channel();
        self.cmd_tx
            .send(SessionCommand::Controller { message, done })
            .ok()?;
        Some(rx)
    }
}
