//! `nooze run`: the foreground daemon.
//!
//! Timer fires and bus events are handled on one task; stdin carries
//! line commands. Every line written to stdout is one JSON object: events
//! carry a `type` field, command replies a `reply` field.

use std::sync::Arc;
use std::time::Duration;

use nooze_core::alarm::{TimedWakeLock, TokioWakeupTimer};
use nooze_core::{AlarmId, AlarmService, Config, EnforcementStore, Platform, WakeTime};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::console::{ConsoleAudio, ConsoleSurface, ConsoleVibrator};

const BELL_PASS: Duration = Duration::from_secs(2);
const PRINTER_DRAIN: Duration = Duration::from_millis(500);

/// A parsed stdin line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonCommand {
    Schedule { time: WakeTime, alarm_id: Option<AlarmId> },
    Cancel { alarm_id: Option<AlarmId> },
    Visible(bool),
    Challenge,
    Answer(String),
    Stop,
    Fire,
    Status,
    Consume,
    Quit,
}

impl DaemonCommand {
    /// Parse one line. Input starting with a digit or sign is an answer.
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let mut words = line.split_whitespace();
        let Some(head) = words.next() else {
            return Ok(None);
        };
        let rest: Vec<&str> = words.collect();

        let command = match head {
            "schedule" => {
                let time = rest
                    .first()
                    .ok_or("usage: schedule HH:MM [alarm-id]")?
                    .parse::<WakeTime>()
                    .map_err(|e| e.to_string())?;
                let alarm_id = parse_id(rest.get(1))?;
                Self::Schedule { time, alarm_id }
            }
            "cancel" => Self::Cancel {
                alarm_id: parse_id(rest.first())?,
            },
            "visible" => match rest.first().copied() {
                Some("on") => Self::Visible(true),
                Some("off") => Self::Visible(false),
                _ => return Err("usage: visible on|off".to_string()),
            },
            "challenge" => Self::Challenge,
            "answer" => Self::Answer(rest.join(" ")),
            "stop" => Self::Stop,
            "fire" => Self::Fire,
            "status" => Self::Status,
            "consume" => Self::Consume,
            "quit" | "exit" => Self::Quit,
            other if other.starts_with(|c: char| c.is_ascii_digit() || c == '-' || c == '+') => {
                Self::Answer(line.trim().to_string())
            }
            other => return Err(format!("unknown command: {other}")),
        };
        Ok(Some(command))
    }
}

fn parse_id(word: Option<&&str>) -> Result<Option<AlarmId>, String> {
    word.map(|w| w.parse::<AlarmId>().map_err(|_| format!("invalid alarm id: {w}")))
        .transpose()
}

enum Flow {
    Continue,
    Quit,
}

pub fn run(
    schedule: Option<String>,
    alarm_id: Option<AlarmId>,
) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(daemon(schedule, alarm_id));
    // A stdin read may still be parked on a blocking thread.
    runtime.shutdown_timeout(Duration::from_millis(200));
    result
}

async fn daemon(
    schedule: Option<String>,
    alarm_id: Option<AlarmId>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let store = EnforcementStore::open()?;
    let mut current_id = match alarm_id {
        Some(id) => id,
        None => store.alarm_id()?.unwrap_or(config.alarm.default_alarm_id),
    };

    let (timer, mut fires) = TokioWakeupTimer::new();
    let platform = Platform {
        timer: Arc::new(timer),
        wake_lock: Arc::new(TimedWakeLock::new()),
        surface: Arc::new(ConsoleSurface),
        audio: Arc::new(ConsoleAudio::new(BELL_PASS)),
        vibrator: Arc::new(ConsoleVibrator),
    };
    let service = AlarmService::new(config, store, platform);

    let mut events = service.events().subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(line) => println!("{line}"),
                    Err(e) => warn!(error = %e, "unprintable event"),
                },
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event printer lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let outcome = service.recover()?;
    info!(?outcome, "boot recovery");

    if let Some(time) = schedule {
        let wake: WakeTime = time.parse()?;
        service.schedule_daily(current_id, wake.hour(), wake.minute())?;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            Some(fire) = fires.recv() => {
                info!(alarm_id = fire.alarm_id, scheduled_for = %fire.scheduled_for, "trigger delivered");
                service.on_fire(fire.alarm_id);
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let command = match DaemonCommand::parse(&line) {
                    Ok(Some(command)) => command,
                    Ok(None) => continue,
                    Err(e) => {
                        reply_error(&e);
                        continue;
                    }
                };
                match handle(&service, command, &mut current_id) {
                    Ok(Flow::Continue) => {}
                    Ok(Flow::Quit) => break,
                    Err(e) => reply_error(&e.to_string()),
                }
            }
        }
    }

    service.stop_alert_now();
    // The printer drains what is buffered once the last sender is gone.
    drop(service);
    let _ = tokio::time::timeout(PRINTER_DRAIN, printer).await;
    Ok(())
}

fn handle(
    service: &AlarmService,
    command: DaemonCommand,
    current_id: &mut AlarmId,
) -> Result<Flow, Box<dyn std::error::Error>> {
    let reply = match command {
        DaemonCommand::Schedule { time, alarm_id } => {
            if let Some(id) = alarm_id {
                *current_id = id;
            }
            let fire_at = service.schedule_daily(*current_id, time.hour(), time.minute())?;
            json!({ "reply": "schedule", "alarm_id": *current_id, "fire_at": fire_at })
        }
        DaemonCommand::Cancel { alarm_id } => {
            let id = alarm_id.unwrap_or(*current_id);
            service.cancel_alarm(id)?;
            json!({ "reply": "cancel", "alarm_id": id })
        }
        DaemonCommand::Visible(visible) => {
            service.report_ring_ui_visibility(visible)?;
            json!({ "reply": "visible", "visible": visible })
        }
        DaemonCommand::Challenge => {
            let problem = service.begin_challenge()?;
            json!({ "reply": "challenge", "problem": problem, "prompt": problem.prompt() })
        }
        DaemonCommand::Answer(text) => {
            let verdict = service.submit_challenge_text(&text)?;
            let next = service.current_problem();
            json!({
                "reply": "answer",
                "verdict": verdict,
                "problem": next,
                "prompt": next.map(|p| p.prompt()),
            })
        }
        DaemonCommand::Stop => {
            json!({ "reply": "stop", "stopped": service.stop_alert_now() })
        }
        DaemonCommand::Fire => {
            let outcome = service.on_fire(*current_id);
            json!({ "reply": "fire", "alarm_id": *current_id, "outcome": outcome })
        }
        DaemonCommand::Status => {
            json!({
                "reply": "status",
                "alert": service.alert_state(),
                "enforcement": service.store().snapshot()?,
            })
        }
        DaemonCommand::Consume => {
            json!({ "reply": "consume", "record": service.consume_last_completion()? })
        }
        DaemonCommand::Quit => return Ok(Flow::Quit),
    };
    println!("{reply}");
    Ok(Flow::Continue)
}

fn reply_error(message: &str) {
    println!("{}", json!({ "reply": "error", "message": message }));
}
