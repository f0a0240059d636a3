//! Session status and its single-writer owner.
//!
//! Handlers never touch the status directly. They hold a [`StatusReporter`]
//! and send transition requests; one [`StatusOwner`] task applies them in
//! arrival order, keeps the latest value in a `watch` channel, and forwards
//! every accepted change to the designated consumer.

use tokio::sync::{mpsc, watch};

use crate::error::{PayloadError, SessionFault};

/// Where an install session currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Ready,
    SendingManifest,
    SendingPayload,
    /// Payload transfer finished; `Ok` carries the number of bytes sent.
    Completed(Result<u64, PayloadError>),
    Broken(SessionFault),
}

impl Status {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Completed(_) | Status::Broken(_))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Status::Completed(Ok(_)))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Status::Ready => "ready",
            Status::SendingManifest => "sending_manifest",
            Status::SendingPayload => "sending_payload",
            Status::Completed(Ok(_)) => "completed",
            Status::Completed(Err(_)) => "failed",
            Status::Broken(_) => "broken",
        }
    }
}

/// What the designated consumer receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Status(Status),
    /// A manifest or image response was dropped before its body was handed
    /// to the connection. Status is left unchanged; the device is expected to
    /// retry. A connection lost while those bytes are being written is not
    /// detected.
    ClientDisconnected { path: String },
}

#[derive(Debug)]
pub(crate) enum StatusCommand {
    Transition(Status),
    ClientDisconnected(String),
}

/// Cloneable handle through which handlers request transitions.
#[derive(Debug, Clone)]
pub struct StatusReporter {
    tx: mpsc::UnboundedSender<StatusCommand>,
}

impl StatusReporter {
    pub(crate) fn new(tx: mpsc::UnboundedSender<StatusCommand>) -> Self {
        Self { tx }
    }

    pub fn transition(&self, status: Status) {
        if self.tx.send(StatusCommand::Transition(status)).is_err() {
            tracing::debug!("status owner gone; transition dropped");
        }
    }

    pub fn client_disconnected(&self, path: &str) {
        let _ = self
            .tx
            .send(StatusCommand::ClientDisconnected(path.to_string()));
    }
}

/// Sole writer of a session's status.
pub(crate) struct StatusOwner {
    current: Status,
    snapshot: watch::Sender<Status>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

/// Receiving halves handed to the session.
pub(crate) struct StatusChannels {
    pub(crate) reporter: StatusReporter,
    pub(crate) commands: mpsc::UnboundedReceiver<StatusCommand>,
    pub(crate) snapshot: watch::Receiver<Status>,
    pub(crate) events: mpsc::UnboundedReceiver<SessionEvent>,
}

impl StatusOwner {
    pub(crate) fn new() -> (Self, StatusChannels) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(Status::Ready);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let owner = Self {
            current: Status::Ready,
            snapshot: snapshot_tx,
            events: event_tx,
        };
        let channels = StatusChannels {
            reporter: StatusReporter::new(cmd_tx),
            commands: cmd_rx,
            snapshot: snapshot_rx,
            events: event_rx,
        };
        (owner, channels)
    }

    /// Apply commands until every reporter is dropped.
    pub(crate) async fn run(mut self, mut commands: mpsc::UnboundedReceiver<StatusCommand>) {
        while let Some(cmd) = commands.recv().await {
            self.apply(cmd);
        }
        tracing::debug!(status = self.current.label(), "status owner finished");
    }

    /// Returns true when the status changed.
    pub(crate) fn apply(&mut self, cmd: StatusCommand) -> bool {
        match cmd {
            StatusCommand::Transition(next) => {
                if self.current.is_terminal() {
                    tracing::debug!(
                        current = self.current.label(),
                        requested = next.label(),
                        "ignoring transition out of terminal status"
                    );
                    return false;
                }
                if next == self.current {
                    return false;
                }
                match &next {
                    Status::Completed(Err(err)) => {
                        tracing::warn!(error = %err, "install failed")
                    }
                    Status::Broken(fault) => tracing::error!(error = %fault, "session broken"),
                    _ => tracing::info!(
                        from = self.current.label(),
                        to = next.label(),
                        "install status"
                    ),
                }
                self.current = next.clone();
                self.snapshot.send_replace(next.clone());
                let _ = self.events.send(SessionEvent::Status(next));
                true
            }
            StatusCommand::ClientDisconnected(path) => {
                tracing::warn!(path = %path, "client disconnected before response was sent");
                let _ = self.events.send(SessionEvent::ClientDisconnected { path });
                false
            }
        }
    }
}
