use std::sync::Arc;

use log::{debug, warn};
use notify_rust::{Notification, Timeout};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::capability::{CapabilityGate, NotifyError};

const NORMAL_TIMEOUT_MS: u32 = 5_000;
const URGENT_TIMEOUT_MS: u32 = 10_000;

/// One user-visible notification, as handed to a delivery backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotePayload {
    pub title: String,
    pub body: String,
    /// Deduplication tag, e.g. `task-<id>-<index>`.
    pub tag: Option<String>,
    /// Correlation back to the task that triggered this note.
    pub task_id: Option<String>,
    pub urgent: bool,
}

impl NotePayload {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            tag: None,
            task_id: None,
            urgent: false,
        }
    }

    pub fn tagged(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn for_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn urgent(mut self) -> Self {
        self.urgent = true;
        self
    }
}

/// Platform delivery path. Selected once at initialization; callers never
/// see which one is active.
pub trait NotificationBackend: Send + Sync {
    fn deliver(&self, note: &NotePayload) -> Result<(), String>;
}

fn render_desktop(note: &NotePayload) -> Result<(), String> {
    let timeout = if note.urgent {
        Timeout::Milliseconds(URGENT_TIMEOUT_MS)
    } else {
        Timeout::Milliseconds(NORMAL_TIMEOUT_MS)
    };

    Notification::new()
        .summary(&note.title)
        .body(&note.body)
        .appname("taskping")
        .timeout(timeout)
        .show()
        .map(|_| ())
        .map_err(|err| format!("show notification: {err}"))
}

/// In-process rendering, used on constrained sessions that keep the daemon
/// in the foreground.
pub struct DirectBackend;

impl NotificationBackend for DirectBackend {
    fn deliver(&self, note: &NotePayload) -> Result<(), String> {
        render_desktop(note)
    }
}

/// Typed message understood by the relay worker.
#[derive(Debug, Clone)]
pub enum RelayMessage {
    SimulatePush(NotePayload),
}

/// Hands notes to a persistent background worker task that renders them on
/// the dispatcher's behalf. The worker owns the actual platform call.
pub struct RelayBackend {
    tx: mpsc::UnboundedSender<RelayMessage>,
}

impl RelayBackend {
    /// Spawns the worker; must be called from within a tokio runtime.
    pub fn spawn() -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<RelayMessage>();
        let handle = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let RelayMessage::SimulatePush(note) = message;
                let result = tokio::task::spawn_blocking(move || render_desktop(&note)).await;
                match result {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => warn!("relay worker delivery failed: {err}"),
                    Err(err) => warn!("relay worker render task failed: {err}"),
                }
            }
            debug!("relay worker stopped");
        });
        (Self { tx }, handle)
    }
}

impl NotificationBackend for RelayBackend {
    fn deliver(&self, note: &NotePayload) -> Result<(), String> {
        self.tx
            .send(RelayMessage::SimulatePush(note.clone()))
            .map_err(|_| "relay worker is gone".to_string())
    }
}

/// The only component allowed to emit a user-visible notification.
pub struct Dispatcher {
    gate: Arc<CapabilityGate>,
    backend: Box<dyn NotificationBackend>,
}

impl Dispatcher {
    pub fn new(gate: Arc<CapabilityGate>, backend: Box<dyn NotificationBackend>) -> Self {
        Self { gate, backend }
    }

    /// Selects the delivery path from the gate's capability decision:
    /// constrained sessions render in-process, everything else relays
    /// through the background worker.
    pub fn with_platform_backend(gate: Arc<CapabilityGate>) -> (Self, Option<JoinHandle<()>>) {
        if gate.is_constrained_session() {
            debug!("dispatcher using direct delivery path");
            (Self::new(gate, Box::new(DirectBackend)), None)
        } else {
            debug!("dispatcher using relay delivery path");
            let (backend, worker) = RelayBackend::spawn();
            (Self::new(gate, Box::new(backend)), Some(worker))
        }
    }

    /// Fire-and-forget dispatch. Returns false without side effects when
    /// the gate disallows notifications, and false (never a panic) when the
    /// backend fails; a missed one-shot reminder is not retried.
    pub fn send(&self, note: NotePayload) -> bool {
        if !self.gate.can_use_notifications() || !self.gate.permission_granted() {
            debug!("dispatch suppressed (gate closed): {}", note.title);
            return false;
        }

        match self.backend.deliver(&note) {
            Ok(()) => {
                debug!("dispatched notification: {}", note.title);
                true
            }
            Err(err) => {
                warn!("dispatch failed: {err}");
                self.gate.record_error(NotifyError::DispatchFailure(err));
                false
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::{Arc, Mutex};

    use super::{NotePayload, NotificationBackend};

    /// Records every delivered payload instead of touching the desktop.
    #[derive(Default)]
    pub struct RecordingBackend {
        pub sent: Arc<Mutex<Vec<NotePayload>>>,
        pub fail: bool,
    }

    impl RecordingBackend {
        pub fn sent_handle(&self) -> Arc<Mutex<Vec<NotePayload>>> {
            self.sent.clone()
        }
    }

    impl NotificationBackend for RecordingBackend {
        fn deliver(&self, note: &NotePayload) -> Result<(), String> {
            if self.fail {
                return Err("simulated backend failure".to_string());
            }
            self.sent.lock().unwrap().push(note.clone());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::RecordingBackend;
    use super::*;
    use crate::capability::test_support::TestProbe;
    use crate::models::GrantState;

    fn open_gate() -> Arc<CapabilityGate> {
        Arc::new(CapabilityGate::new(&TestProbe::default(), GrantState::Granted))
    }

    #[test]
    fn send_respects_gate() {
        let gate = Arc::new(CapabilityGate::new(&TestProbe::default(), GrantState::Unset));
        let backend = RecordingBackend::default();
        let sent = backend.sent_handle();
        let dispatcher = Dispatcher::new(gate, Box::new(backend));

        assert!(!dispatcher.send(NotePayload::new("hi", "there")));
        assert!(sent.lock().unwrap().is_empty());
    }

    #[test]
    fn send_delivers_when_granted() {
        let backend = RecordingBackend::default();
        let sent = backend.sent_handle();
        let dispatcher = Dispatcher::new(open_gate(), Box::new(backend));

        let note = NotePayload::new("Task reminder", "don't forget")
            .tagged("task-1-0")
            .for_task("1");
        assert!(dispatcher.send(note));

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].tag.as_deref(), Some("task-1-0"));
    }

    #[test]
    fn backend_failure_is_caught_and_classified() {
        let gate = open_gate();
        let backend = RecordingBackend {
            fail: true,
            ..RecordingBackend::default()
        };
        let dispatcher = Dispatcher::new(gate.clone(), Box::new(backend));

        assert!(!dispatcher.send(NotePayload::new("x", "y")));
        assert!(matches!(gate.last_error(), Some(NotifyError::DispatchFailure(_))));
    }

    #[tokio::test]
    async fn relay_worker_stops_when_sender_drops() {
        let (backend, worker) = RelayBackend::spawn();
        drop(backend);
        worker.await.unwrap();
    }
}
