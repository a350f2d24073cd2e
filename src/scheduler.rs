use std::collections::HashMap;
use std::sync::Arc;

use chrono::Local;
use log::{debug, info};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration};

use crate::capability::CapabilityGate;
use crate::dispatch::{Dispatcher, NotePayload};
use crate::models::{Priority, ReminderInfo, ReminderKind, Task, FINAL_WARNING_MS};

/// One armed reminder timer. The handle is owned here so cancellation can
/// always release it; a timer that fires naturally removes its own entry.
struct ReminderEntry {
    kind: ReminderKind,
    fires_at_ms: i64,
    handle: JoinHandle<()>,
}

/// Computes the reminder instants for a task, in epoch milliseconds.
///
/// Cadence instants start at `now + interval` and repeat while strictly
/// before the due date; a final warning at `due - 1h` is appended when still
/// in the future. The result is sorted ascending and deduplicated by
/// instant, so a cadence instant landing exactly on the final warning yields
/// one timer. The last instant is the urgent one.
pub fn reminder_instants(now_ms: i64, due_ms: i64, priority: Priority) -> Vec<i64> {
    if due_ms <= now_ms {
        return Vec::new();
    }

    let interval = priority.reminder_interval_ms();
    let mut instants = Vec::new();
    let mut next = now_ms + interval;
    while next < due_ms {
        instants.push(next);
        next += interval;
    }

    let final_warning = due_ms - FINAL_WARNING_MS;
    if final_warning > now_ms {
        instants.push(final_warning);
    }

    instants.sort_unstable();
    instants.dedup();
    instants
}

/// The live-reminder registry plus the timers that drain it.
///
/// Guarantees at most one live timer set per task: scheduling always cancels
/// the task's existing entries before arming new ones, so calling it on
/// every edit never leaks timers.
pub struct ReminderScheduler {
    gate: Arc<CapabilityGate>,
    dispatcher: Arc<Dispatcher>,
    registry: Arc<Mutex<HashMap<String, Vec<ReminderEntry>>>>,
}

impl ReminderScheduler {
    pub fn new(gate: Arc<CapabilityGate>, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            gate,
            dispatcher,
            registry: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Cancel-first reschedule for one task. No-op unless permission is
    /// granted and the task carries a future due date.
    pub async fn schedule_task_reminders(&self, task: &Task) {
        if !self.gate.permission_granted() {
            return;
        }
        let Some(due_ms) = task.due_millis() else {
            return;
        };

        let mut registry = self.registry.lock().await;

        // Release old handles before arming anything new for this id.
        if let Some(old) = registry.remove(&task.id) {
            for entry in &old {
                entry.handle.abort();
            }
        }

        let now_ms = Local::now().timestamp_millis();
        let instants = reminder_instants(now_ms, due_ms, task.priority);
        if instants.is_empty() {
            debug!("task {}: nothing to schedule (due too soon or past)", task.id);
            return;
        }

        let count = instants.len();
        let mut entries = Vec::with_capacity(count);
        for (index, fires_at_ms) in instants.iter().copied().enumerate() {
            let is_last = index == count - 1;
            let delay = Duration::from_millis((fires_at_ms - now_ms).max(0) as u64);
            let note = compose_task_note(task, index, is_last);
            let dispatcher = self.dispatcher.clone();
            let registry = self.registry.clone();
            let task_id = task.id.clone();

            let handle = tokio::spawn(async move {
                time::sleep(delay).await;
                dispatcher.send(note);
                // Natural firing cleans itself up.
                let mut registry = registry.lock().await;
                if let Some(entries) = registry.get_mut(&task_id) {
                    entries.retain(|e| e.fires_at_ms != fires_at_ms);
                    if entries.is_empty() {
                        registry.remove(&task_id);
                    }
                }
            });

            entries.push(ReminderEntry {
                kind: ReminderKind::TaskReminder,
                fires_at_ms,
                handle,
            });
        }

        info!(
            "task {}: armed {} reminder(s), next in {}s",
            task.id,
            count,
            (entries[0].fires_at_ms - now_ms) / 1000
        );
        registry.insert(task.id.clone(), entries);
    }

    /// Releases every live timer for the task. Safe to call when none exist.
    pub async fn cancel_task_reminders(&self, task_id: &str) {
        let mut registry = self.registry.lock().await;
        if let Some(entries) = registry.remove(task_id) {
            for entry in &entries {
                entry.handle.abort();
            }
            info!("task {task_id}: cancelled {} reminder(s)", entries.len());
        }
    }

    /// Snapshot of all live reminders, sorted by instant.
    pub async fn live_reminders(&self) -> Vec<ReminderInfo> {
        let registry = self.registry.lock().await;
        let mut out: Vec<ReminderInfo> = registry
            .iter()
            .flat_map(|(task_id, entries)| {
                entries.iter().map(|entry| ReminderInfo {
                    task_id: task_id.clone(),
                    kind: entry.kind,
                    fires_at_ms: entry.fires_at_ms,
                })
            })
            .collect();
        out.sort_by_key(|info| info.fires_at_ms);
        out
    }

    pub async fn live_count_for(&self, task_id: &str) -> usize {
        let registry = self.registry.lock().await;
        registry.get(task_id).map_or(0, |entries| entries.len())
    }

    /// Tears down every live timer; used on daemon shutdown.
    pub async fn shutdown(&self) {
        let mut registry = self.registry.lock().await;
        let drained = std::mem::take(&mut *registry);
        let mut released = 0usize;
        for (_, entries) in drained {
            for entry in &entries {
                entry.handle.abort();
            }
            released += entries.len();
        }
        if released > 0 {
            info!("scheduler shutdown: released {released} timer(s)");
        }
    }
}

fn compose_task_note(task: &Task, index: usize, is_last: bool) -> NotePayload {
    let note = if is_last {
        NotePayload::new("Task due soon", format!("Due within the hour: {}", task.title)).urgent()
    } else {
        NotePayload::new(
            format!("Task reminder ({})", task.priority.label()),
            format!("Don't forget: {}", task.title),
        )
    };
    note.tagged(format!("task-{}-{index}", task.id)).for_task(task.id.clone())
}
