pub mod capability;
pub mod config;
pub mod dispatch;
pub mod focus;
pub mod models;
pub mod scheduler;
pub mod store;
pub mod summary;
pub mod sync;
pub mod weather;

use std::sync::Arc;

use log::{info, warn};
use tokio::task::JoinHandle;

use capability::{CapabilityGate, DesktopProbe};
use config::AppConfig;
use dispatch::Dispatcher;
use scheduler::ReminderScheduler;
use store::TaskStore;
use summary::{SummaryScheduler, WeatherContext};
use sync::{StoreWatcher, TaskSynchronizer};
use weather::WeatherClient;

/// The wired-up reminder daemon: gate, dispatcher, scheduler, store watcher
/// and morning summary loop, started together and stopped together.
pub struct Daemon {
    pub gate: Arc<CapabilityGate>,
    pub scheduler: Arc<ReminderScheduler>,
    summary: SummaryScheduler,
    watcher: StoreWatcher,
    relay_worker: Option<JoinHandle<()>>,
}

impl Daemon {
    /// Builds every component and arms the loops. Reminders for incomplete
    /// dated tasks are resubmitted from the store right away, since nothing
    /// survives a process restart.
    pub async fn start(cfg: &AppConfig, store: Arc<TaskStore>) -> Result<Self, String> {
        let gate = Arc::new(CapabilityGate::new(&DesktopProbe, cfg.permission));
        if let Some(err) = gate.last_error() {
            warn!("starting with notifications unavailable: {err}");
        }
        if gate.can_use_notifications() && !gate.permission_granted() {
            info!("notification permission not granted yet; run `taskping grant`");
        }

        let (dispatcher, relay_worker) = Dispatcher::with_platform_backend(gate.clone());
        let dispatcher = Arc::new(dispatcher);
        let scheduler = Arc::new(ReminderScheduler::new(gate.clone(), dispatcher.clone()));
        let synchronizer = Arc::new(TaskSynchronizer::new(gate.clone(), scheduler.clone()));

        let mut watcher = StoreWatcher::new();
        watcher
            .start(store.clone(), synchronizer, cfg.store_poll_secs)
            .await;

        let weather = resolve_weather_context(cfg).await;
        let mut summary = SummaryScheduler::new();
        summary
            .start(cfg.morning_hour, store, dispatcher, weather)
            .await;

        info!("daemon started");
        Ok(Self {
            gate,
            scheduler,
            summary,
            watcher,
            relay_worker,
        })
    }

    /// Orderly teardown: stop the loops, release every timer handle, then
    /// drop the relay worker.
    pub async fn stop(mut self) {
        self.watcher.stop().await;
        self.summary.stop().await;
        self.scheduler.shutdown().await;
        if let Some(worker) = self.relay_worker.take() {
            worker.abort();
            let _ = worker.await;
        }
        info!("daemon stopped");
    }
}

async fn resolve_weather_context(cfg: &AppConfig) -> Option<WeatherContext> {
    if !cfg.weather.enabled {
        return None;
    }

    let client = match WeatherClient::new() {
        Ok(client) => Arc::new(client),
        Err(err) => {
            warn!("weather disabled: {err}");
            return None;
        }
    };

    if let (Some(latitude), Some(longitude)) = (cfg.weather.latitude, cfg.weather.longitude) {
        return Some(WeatherContext {
            client,
            latitude,
            longitude,
        });
    }

    let city = cfg.weather.city.as_deref()?;
    match client.geocode(city).await {
        Ok(place) => {
            info!(
                "weather location: {} ({}, {})",
                place.name, place.latitude, place.longitude
            );
            Some(WeatherContext {
                client,
                latitude: place.latitude,
                longitude: place.longitude,
            })
        }
        Err(err) => {
            warn!("weather disabled, geocoding failed: {err}");
            None
        }
    }
}
