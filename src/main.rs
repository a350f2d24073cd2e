use std::io::Write;
use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone};
use clap::{Parser, Subcommand};
use log::error;

use taskping::capability::{CapabilityGate, DesktopProbe};
use taskping::config::{self, AppConfig};
use taskping::dispatch::{Dispatcher, NotePayload};
use taskping::focus::{FocusEvent, FocusPhase, FocusTimer};
use taskping::models::{Priority, Task};
use taskping::store::TaskStore;
use taskping::weather::WeatherClient;
use taskping::Daemon;

#[derive(Parser)]
#[command(name = "taskping", version, about = "Task manager with priority-based reminders")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Add a task
    Add {
        title: String,
        #[arg(short, long, default_value = "medium")]
        priority: Priority,
        /// Due date: RFC3339, "YYYY-MM-DD HH:MM" or "YYYY-MM-DD"
        #[arg(short, long)]
        due: Option<String>,
    },
    /// List tasks (incomplete by default)
    List {
        #[arg(long)]
        all: bool,
    },
    /// Edit a task
    Edit {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(short, long)]
        priority: Option<Priority>,
        #[arg(short, long)]
        due: Option<String>,
        #[arg(long, conflicts_with = "due")]
        clear_due: bool,
    },
    /// Mark a task as completed
    Done { id: String },
    /// Delete a task
    Rm { id: String },
    /// Request notification permission
    Grant,
    /// Show current weather
    Weather { city: Option<String> },
    /// Run a Pomodoro focus session
    Focus {
        #[arg(long, default_value_t = 25)]
        minutes: u32,
        #[arg(long, default_value_t = 5)]
        break_minutes: u32,
    },
    /// Run the reminder daemon
    Run,
}

fn parse_due(input: &str) -> Result<DateTime<Local>, String> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(input) {
        return Ok(parsed.with_timezone(&Local));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(input, "%Y-%m-%d %H:%M") {
        if let Some(local) = Local.from_local_datetime(&naive).earliest() {
            return Ok(local);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        // Date without a time means due by end of that day.
        if let Some(naive) = date.and_hms_opt(23, 59, 0) {
            if let Some(local) = Local.from_local_datetime(&naive).earliest() {
                return Ok(local);
            }
        }
    }
    Err(format!(
        "unrecognized due date '{input}' (use RFC3339, \"YYYY-MM-DD HH:MM\" or \"YYYY-MM-DD\")"
    ))
}

fn print_task(task: &Task) {
    let mark = if task.completed { "x" } else { " " };
    let due = task
        .due_date
        .map(|d| format!(" · due {}", d.format("%Y-%m-%d %H:%M")))
        .unwrap_or_default();
    println!(
        "[{mark}] {}  {} ({}{due})",
        task.id,
        task.title,
        task.priority.label()
    );
}

async fn run_command(command: Command, cfg: AppConfig, store: Arc<TaskStore>) -> Result<(), String> {
    match command {
        Command::Add { title, priority, due } => {
            let due_date = due.as_deref().map(parse_due).transpose()?;
            let task = store.add(Task::new(title, priority, due_date)).await?;
            print_task(&task);
            Ok(())
        }
        Command::List { all } => {
            let tasks = store.load().await?;
            let mut shown = 0;
            for task in tasks.iter().filter(|t| all || !t.completed) {
                print_task(task);
                shown += 1;
            }
            if shown == 0 {
                println!("no tasks");
            }
            Ok(())
        }
        Command::Edit {
            id,
            title,
            priority,
            due,
            clear_due,
        } => {
            let due_date = due.as_deref().map(parse_due).transpose()?;
            let updated = store
                .update(&id, |task| {
                    if let Some(title) = title {
                        task.title = title;
                    }
                    if let Some(priority) = priority {
                        task.priority = priority;
                    }
                    if clear_due {
                        task.due_date = None;
                    } else if due_date.is_some() {
                        task.due_date = due_date;
                    }
                })
                .await?;
            print_task(&updated);
            Ok(())
        }
        Command::Done { id } => {
            let task = store.set_completed(&id, true).await?;
            print_task(&task);
            Ok(())
        }
        Command::Rm { id } => {
            let removed = store.delete(&id).await?;
            println!("deleted '{}'", removed.title);
            Ok(())
        }
        Command::Grant => {
            let gate = CapabilityGate::new(&DesktopProbe, cfg.permission);
            if gate.request_permission() {
                println!("notifications enabled");
            } else {
                match gate.last_error() {
                    Some(err) => println!("cannot enable notifications: {err}"),
                    None => println!("cannot enable notifications"),
                }
            }
            let path = config::config_path()?;
            let updated = AppConfig {
                permission: gate.grant_state(),
                ..cfg
            };
            config::save_config(&path, updated).await?;
            Ok(())
        }
        Command::Weather { city } => {
            let client = WeatherClient::new()?;
            let (latitude, longitude, name) = match city.or_else(|| cfg.weather.city.clone()) {
                Some(city) => {
                    let place = client.geocode(&city).await?;
                    (place.latitude, place.longitude, place.name)
                }
                None => match (cfg.weather.latitude, cfg.weather.longitude) {
                    (Some(lat), Some(lon)) => (lat, lon, format!("{lat}, {lon}")),
                    _ => return Err("no city given and none configured".to_string()),
                },
            };
            let snapshot = client.current(latitude, longitude).await?;
            println!(
                "{name}: {:.1}°C (feels like {:.1}°C), {}, humidity {:.0}%, wind {:.0} km/h",
                snapshot.temperature,
                snapshot.feels_like,
                snapshot.description,
                snapshot.humidity,
                snapshot.wind_speed
            );
            Ok(())
        }
        Command::Focus {
            minutes,
            break_minutes,
        } => run_focus_session(cfg, minutes, break_minutes).await,
        Command::Run => {
            let daemon = Daemon::start(&cfg, store).await?;
            println!("taskping daemon running, ctrl-c to stop");
            tokio::signal::ctrl_c()
                .await
                .map_err(|err| format!("failed to listen for ctrl-c: {err}"))?;
            daemon.stop().await;
            Ok(())
        }
    }
}

async fn run_focus_session(cfg: AppConfig, minutes: u32, break_minutes: u32) -> Result<(), String> {
    let gate = Arc::new(CapabilityGate::new(&DesktopProbe, cfg.permission));
    let (dispatcher, _worker) = Dispatcher::with_platform_backend(gate);

    let mut timer = FocusTimer::new(minutes.max(1) * 60, break_minutes.max(1) * 60);
    timer.start_focus();

    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(1));
    ticker.tick().await; // first tick is immediate

    loop {
        ticker.tick().await;
        let event = timer.tick();

        let label = match timer.phase() {
            FocusPhase::Focus => "focus",
            FocusPhase::Break => "break",
            _ => "done",
        };
        print!("\r{label} {}   ", timer.format_remaining());
        let _ = std::io::stdout().flush();

        match event {
            Some(FocusEvent::FocusEnded) => {
                dispatcher.send(
                    NotePayload::new("Focus complete", "Time for a break.").tagged("focus-end"),
                );
            }
            Some(FocusEvent::BreakEnded) => {
                dispatcher.send(
                    NotePayload::new("Break over", "Session complete, nice work.")
                        .tagged("break-end"),
                );
                break;
            }
            None => {}
        }
    }

    println!("\ncompleted {} cycle(s)", timer.cycles());
    Ok(())
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let cli = Cli::parse();

    let result = async {
        let config_path = config::config_path()?;
        let cfg = config::load_config(&config_path).await?;
        let store = Arc::new(TaskStore::new(TaskStore::default_path()?));
        run_command(cli.command, cfg, store).await
    }
    .await;

    if let Err(err) = result {
        error!("{err}");
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_supported_due_formats() {
        assert!(parse_due("2026-09-01T12:30:00+02:00").is_ok());
        assert!(parse_due("2026-09-01 12:30").is_ok());
        let eod = parse_due("2026-09-01").unwrap();
        assert_eq!(eod.format("%H:%M").to_string(), "23:59");
        assert!(parse_due("next tuesday").is_err());
    }
}
