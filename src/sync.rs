use std::collections::HashSet;
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration};

use crate::capability::CapabilityGate;
use crate::models::Task;
use crate::scheduler::ReminderScheduler;
use crate::store::TaskStore;

pub const DEFAULT_STORE_POLL_SECS: u64 = 5;

/// Keeps the scheduler's live reminders consistent with the current task
/// collection. Scheduling is cancel-first, so resubmitting the whole
/// collection is safe and needs no diffing.
pub struct TaskSynchronizer {
    gate: Arc<CapabilityGate>,
    scheduler: Arc<ReminderScheduler>,
}

impl TaskSynchronizer {
    pub fn new(gate: Arc<CapabilityGate>, scheduler: Arc<ReminderScheduler>) -> Self {
        Self { gate, scheduler }
    }

    /// Reschedules every incomplete, dated task. No-op without permission.
    pub async fn update_task_notifications(&self, tasks: &[Task]) {
        if !self.gate.permission_granted() {
            return;
        }
        for task in tasks.iter().filter(|t| t.wants_reminders()) {
            self.scheduler.schedule_task_reminders(task).await;
        }
    }

    /// Full reconciliation: cancels reminders for tasks that vanished or
    /// were completed, then resubmits the rest. Used by the store watcher
    /// and on daemon startup (process-restart recovery).
    pub async fn reconcile(&self, tasks: &[Task]) {
        let wanted: HashSet<&str> = tasks
            .iter()
            .filter(|t| t.wants_reminders())
            .map(|t| t.id.as_str())
            .collect();

        let stale: Vec<String> = self
            .scheduler
            .live_reminders()
            .await
            .into_iter()
            .map(|info| info.task_id)
            .filter(|id| !wanted.contains(id.as_str()))
            .collect();

        for task_id in stale {
            self.scheduler.cancel_task_reminders(&task_id).await;
        }

        self.update_task_notifications(tasks).await;
    }
}

/// Polls the store file for changes and drives reconciliation; the
/// observer side of the task-CRUD boundary.
pub struct StoreWatcher {
    stop_tx: Option<watch::Sender<bool>>,
    handle: Option<JoinHandle<()>>,
}

impl StoreWatcher {
    pub fn new() -> Self {
        Self {
            stop_tx: None,
            handle: None,
        }
    }

    pub async fn start(
        &mut self,
        store: Arc<TaskStore>,
        sync: Arc<TaskSynchronizer>,
        poll_secs: u64,
    ) {
        self.stop().await;

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            info!("store watcher started (poll every {poll_secs}s)");

            // Resubmit everything once up front: nothing survives a restart,
            // so incomplete dated tasks must be rescheduled from the store.
            match store.load().await {
                Ok(tasks) => sync.reconcile(&tasks).await,
                Err(err) => warn!("store watcher: initial load failed: {err}"),
            }
            let mut last_seen = store.modified_ms().await;

            loop {
                tokio::select! {
                    _ = stop_rx.changed() => {
                        if *stop_rx.borrow() {
                            break;
                        }
                    }
                    _ = time::sleep(Duration::from_secs(poll_secs.max(1))) => {
                        let current = store.modified_ms().await;
                        if current == last_seen {
                            continue;
                        }
                        last_seen = current;
                        debug!("store watcher: task file changed, reconciling");
                        match store.load().await {
                            Ok(tasks) => sync.reconcile(&tasks).await,
                            Err(err) => warn!("store watcher: reload failed: {err}"),
                        }
                    }
                }
            }
            info!("store watcher stopped");
        });

        self.stop_tx = Some(stop_tx);
        self.handle = Some(handle);
    }

    pub async fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(true);
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Default for StoreWatcher {
    fn default() -> Self {
        Self::new()
    }
}
