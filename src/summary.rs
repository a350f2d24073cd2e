use std::sync::{Arc, Mutex};

use chrono::{DateTime, Days, Local, TimeZone};
use log::{info, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration};

use crate::dispatch::{Dispatcher, NotePayload};
use crate::models::Task;
use crate::store::TaskStore;
use crate::weather::WeatherClient;

pub const DEFAULT_MORNING_HOUR: u32 = 8;

/// Optional weather enrichment for the morning message.
pub struct WeatherContext {
    pub client: Arc<WeatherClient>,
    pub latitude: f64,
    pub longitude: f64,
}

/// Next local instant at `hour`:00 strictly after `now`, i.e. tomorrow
/// morning; the loop re-arms once per day.
pub fn next_morning_instant(now: DateTime<Local>, hour: u32) -> DateTime<Local> {
    let naive = (now.date_naive() + Days::new(1))
        .and_hms_opt(hour, 0, 0)
        .unwrap_or_else(|| (now.date_naive() + Days::new(1)).and_hms_opt(8, 0, 0).unwrap());
    // earliest() picks the valid side of a DST gap
    Local
        .from_local_datetime(&naive)
        .earliest()
        .unwrap_or_else(|| now + chrono::Duration::days(1))
}

/// Count-based morning summary; None when there is nothing outstanding.
pub fn compose_summary(tasks: &[Task], now: DateTime<Local>) -> Option<NotePayload> {
    let incomplete: Vec<&Task> = tasks.iter().filter(|t| !t.completed).collect();
    if incomplete.is_empty() {
        return None;
    }

    let end_of_today = now
        .date_naive()
        .and_hms_milli_opt(23, 59, 59, 999)
        .and_then(|naive| Local.from_local_datetime(&naive).latest())
        .unwrap_or(now);

    let urgent = incomplete
        .iter()
        .filter(|t| t.due_date.map_or(false, |due| due <= end_of_today))
        .count();

    let count = incomplete.len();
    let plural = if count > 1 { "s" } else { "" };
    let body = if urgent > 0 {
        let urgent_plural = if urgent > 1 { "s" } else { "" };
        format!("You have {count} task{plural} to do, {urgent} of them urgent{urgent_plural}!")
    } else {
        format!("You have {count} task{plural} to get done today.")
    };

    Some(NotePayload::new("Good morning!", body).tagged("morning-reminder"))
}

/// Self-re-arming daily summary loop. At most one summary timer is live
/// process-wide: starting again tears down the previous loop first.
pub struct SummaryScheduler {
    stop_tx: Option<watch::Sender<bool>>,
    handle: Option<JoinHandle<()>>,
    next_fire_ms: Arc<Mutex<Option<i64>>>,
}

impl SummaryScheduler {
    pub fn new() -> Self {
        Self {
            stop_tx: None,
            handle: None,
            next_fire_ms: Arc::new(Mutex::new(None)),
        }
    }

    pub async fn start(
        &mut self,
        morning_hour: u32,
        store: Arc<TaskStore>,
        dispatcher: Arc<Dispatcher>,
        weather: Option<WeatherContext>,
    ) {
        self.stop().await;

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let next_fire_ms = self.next_fire_ms.clone();

        let handle = tokio::spawn(async move {
            info!("morning summary loop started (fires at {morning_hour:02}:00)");
            loop {
                let now = Local::now();
                let next = next_morning_instant(now, morning_hour);
                let delay_ms = (next.timestamp_millis() - now.timestamp_millis()).max(0) as u64;
                if let Ok(mut guard) = next_fire_ms.lock() {
                    *guard = Some(next.timestamp_millis());
                }

                tokio::select! {
                    _ = stop_rx.changed() => {
                        if *stop_rx.borrow() {
                            break;
                        }
                    }
                    _ = time::sleep(Duration::from_millis(delay_ms)) => {
                        fire_summary(&store, &dispatcher, weather.as_ref()).await;
                        // Loop back around unconditionally so the schedule
                        // never stalls, even when nothing was dispatched.
                    }
                }
            }
            if let Ok(mut guard) = next_fire_ms.lock() {
                *guard = None;
            }
            info!("morning summary loop stopped");
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

    pub fn is_armed(&self) -> bool {
        self.handle.as_ref().map_or(false, |h| !h.is_finished())
    }

    pub fn next_fire_ms(&self) -> Option<i64> {
        self.next_fire_ms.lock().ok().and_then(|guard| *guard)
    }
}

impl Default for SummaryScheduler {
    fn default() -> Self {
        Self::new()
    }
}

async fn fire_summary(
    store: &TaskStore,
    dispatcher: &Dispatcher,
    weather: Option<&WeatherContext>,
) {
    let tasks = match store.load().await {
        Ok(tasks) => tasks,
        Err(err) => {
            warn!("morning summary: failed to read task store: {err}");
            return;
        }
    };

    let Some(mut note) = compose_summary(&tasks, Local::now()) else {
        info!("morning summary: no outstanding tasks, nothing to send");
        return;
    };

    if let Some(ctx) = weather {
        match ctx.client.current(ctx.latitude, ctx.longitude).await {
            Ok(snapshot) => {
                note.body = format!(
                    "{} Outside: {}°C, {}.",
                    note.body,
                    snapshot.temperature.round() as i64,
                    snapshot.description.to_lowercase()
                );
            }
            Err(err) => warn!("morning summary: weather lookup failed: {err}"),
        }
    }

    dispatcher.send(note);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::test_support::TestProbe;
    use crate::capability::CapabilityGate;
    use crate::dispatch::test_support::RecordingBackend;
    use crate::models::{GrantState, Priority};

    #[test]
    fn next_morning_is_tomorrow_at_hour() {
        let now = Local.with_ymd_and_hms(2026, 3, 10, 7, 59, 0).unwrap();
        let next = next_morning_instant(now, 8);
        assert_eq!(next, Local.with_ymd_and_hms(2026, 3, 11, 8, 0, 0).unwrap());

        // Already past 08:00 still lands on tomorrow.
        let later = Local.with_ymd_and_hms(2026, 3, 10, 8, 1, 0).unwrap();
        assert_eq!(
            next_morning_instant(later, 8),
            Local.with_ymd_and_hms(2026, 3, 11, 8, 0, 0).unwrap()
        );
    }

    #[test]
    fn summary_skips_empty_and_counts_urgent() {
        let now = Local::now();
        assert!(compose_summary(&[], now).is_none());

        let mut done = Task::new("done", Priority::Low, None);
        done.completed = true;
        assert!(compose_summary(&[done.clone()], now).is_none());

        let due_today = Task::new("pay rent", Priority::High, Some(now));
        let undated = Task::new("someday", Priority::Low, None);
        let note = compose_summary(&[done, due_today, undated], now).unwrap();
        assert_eq!(note.tag.as_deref(), Some("morning-reminder"));
        assert!(note.body.contains("2 tasks"));
        assert!(note.body.contains("1 of them urgent"));
    }

    #[test]
    fn summary_without_urgent_tasks() {
        let now = Local::now();
        let next_week = Task::new(
            "later",
            Priority::Medium,
            Some(now + chrono::Duration::days(7)),
        );
        let note = compose_summary(&[next_week], now).unwrap();
        assert!(note.body.contains("1 task "));
        assert!(!note.body.contains("urgent"));
    }

    fn temp_store(name: &str) -> Arc<TaskStore> {
        let path = std::env::temp_dir().join(format!(
            "taskping-summary-{name}-{}.json",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);
        Arc::new(TaskStore::new(path))
    }

    /// Gives the blocking pool wall-clock time to finish file reads while
    /// the tokio clock stays paused.
    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn summary_rearms_even_when_nothing_dispatched() {
        let gate = Arc::new(CapabilityGate::new(&TestProbe::default(), GrantState::Granted));
        let backend = RecordingBackend::default();
        let sent = backend.sent_handle();
        let dispatcher = Arc::new(Dispatcher::new(gate, Box::new(backend)));
        let store = temp_store("rearm");

        let mut scheduler = SummaryScheduler::new();
        scheduler.start(8, store.clone(), dispatcher, None).await;
        assert!(scheduler.is_armed());
        assert!(scheduler.next_fire_ms().is_some());

        // Sail past the first morning: the empty store dispatches nothing,
        // but the loop must re-arm for the following day.
        time::sleep(Duration::from_millis(25 * 3_600_000)).await;
        settle().await;
        assert!(sent.lock().unwrap().is_empty());
        assert!(scheduler.is_armed());
        assert!(scheduler.next_fire_ms().is_some());

        // A task appears before the next cycle (written synchronously so the
        // paused clock cannot slip past another morning meanwhile); the
        // re-armed loop picks it up, proving the skipped dispatch did not
        // stall the schedule.
        let task = Task::new("stretch", Priority::Low, None);
        std::fs::write(store.path(), serde_json::to_string(&vec![task]).unwrap()).unwrap();
        time::sleep(Duration::from_millis(25 * 3_600_000)).await;
        settle().await;
        assert_eq!(sent.lock().unwrap().len(), 1);
        assert!(scheduler.is_armed());

        scheduler.stop().await;
        assert!(!scheduler.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn starting_twice_keeps_a_single_live_loop() {
        let gate = Arc::new(CapabilityGate::new(&TestProbe::default(), GrantState::Granted));
        let dispatcher = Arc::new(Dispatcher::new(gate, Box::new(RecordingBackend::default())));
        let store = temp_store("single");

        let mut scheduler = SummaryScheduler::new();
        scheduler.start(8, store.clone(), dispatcher.clone(), None).await;
        scheduler.start(8, store, dispatcher, None).await;
        assert!(scheduler.is_armed());
        scheduler.stop().await;
    }
}
