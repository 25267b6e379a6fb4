//! Commands processed by the session actor
//!
//! Public operations arrive from `SessionHandle`; transport notifications
//! arrive from the connect and receive-loop tasks the actor spawns. Every
//! transport notification carries the connection it belongs to so stale
//! ones can be ignored.

use std::fmt;
use tokio::sync::oneshot;

use super::types::{EditOrigin, SessionSnapshot};
use super::ConnectionId;
use crate::bindings::{BindingDescriptor, BindingKind};
use crate::error::{BindingError, PersistenceError, TransportError, WireError};
use crate::fixable::{FixableId, FixableValue};
use crate::midi::ControllerMessage;
use crate::transport::FrameSink;
use crate::wire::WireMessage;

pub enum SessionCommand {
    // -------------------------------------------------------------------------
    // Fire and forget
    // -------------------------------------------------------------------------
    Open {
        endpoint: String,
    },
    HangUp,
    LocalEdit {
        id: FixableId,
        value: FixableValue,
        origin: EditOrigin,
    },
    CancelBinding,

    // -------------------------------------------------------------------------
    // Request-response
    // -------------------------------------------------------------------------
    /// `done` fires once the message is fully processed
    Controller {
        message: ControllerMessage,
        done: oneshot::Sender<()>,
    },
    StartBinding {
        target: FixableId,
        kind: Option<BindingKind>,
        response: oneshot::Sender<Result<BindingKind, BindingError>>,
    },
    ListBindings {
        response: oneshot::Sender<Vec<(u8, BindingDescriptor)>>,
    },
    Unbind {
        number: u8,
        response: oneshot::Sender<Option<BindingDescriptor>>,
    },
    Persist {
        response: oneshot::Sender<Result<usize, PersistenceError>>,
    },
    Restore {
        response: oneshot::Sender<Result<usize, PersistenceError>>,
    },
    Snapshot {
        response: oneshot::Sender<SessionSnapshot>,
    },

    // -------------------------------------------------------------------------
    // Transport notifications
    // -------------------------------------------------------------------------
    TransportReady {
        connection: ConnectionId,
        sink: Box<dyn FrameSink>,
    },
    ConnectFailed {
        connection: ConnectionId,
        error: TransportError,
    },
    Inbound {
        connection: ConnectionId,
        message: Result<WireMessage, WireError>,
    },
    TransportClosed {
        connection: ConnectionId,
        error: Option<TransportError>,
    },

    Shutdown,
}

// Manual Debug implementation because FrameSink and the responders don't implement Debug
impl fmt::Debug for SessionCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionCommand::Open { endpoint } => {
                f.debug_struct("Open").field("endpoint", endpoint).finish()
            }
            SessionCommand::HangUp => write!(f, "HangUp"),
            SessionCommand::LocalEdit { id, value, origin } => f
                .debug_struct("LocalEdit")
                .field("id", id)
                .field("value", value)
                .field("origin", origin)
                .finish(),
            SessionCommand::CancelBinding => write!(f, "CancelBinding"),
            SessionCommand::Controller { message, .. } => f
                .debug_struct("Controller")
                .field("message", message)
                .finish_non_exhaustive(),
            SessionCommand::StartBinding { target, kind, .. } => f
                .debug_struct("StartBinding")
                .field("target", target)
                .field("kind", kind)
                .finish_non_exhaustive(),
            SessionCommand::ListBindings { .. } => write!(f, "ListBindings"),
            SessionCommand::Unbind { number, .. } => f
                .debug_struct("Unbind")
                .field("number", number)
                .finish_non_exhaustive(),
            SessionCommand::Persist { .. } => write!(f, "Persist"),
            SessionCommand::Restore { .. } => write!(f, "Restore"),
            SessionCommand::Snapshot { .. } => write!(f, "Snapshot"),
            SessionCommand::TransportReady { connection, .. } => f
                .debug_struct("TransportReady")
                .field("connection", connection)
                .finish_non_exhaustive(),
            SessionCommand::ConnectFailed { connection, error } => f
                .debug_struct("ConnectFailed")
                .field("connection", connection)
                .field("error", error)
                .finish(),
            SessionCommand::Inbound {
                connection,
                message,
            } => f
                .debug_struct("Inbound")
                .field("connection", connection)
                .field(
                    "message",
                    &message.as_ref().map(|m| m.name()).map_err(|e| e.to_string()),
                )
                .finish(),
            SessionCommand::TransportClosed { connection, error } => f
                .debug_struct("TransportClosed")
                .field("connection", connection)
                .field("error", error)
                .finish(),
            SessionCommand::Shutdown => write!(f, "Shutdown"),
        }
    }
}
