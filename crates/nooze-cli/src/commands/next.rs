use chrono::Local;
use nooze_core::{next_occurrence, WakeTime};

pub fn run(time: &str) -> Result<(), Box<dyn std::error::Error>> {
    let wake: WakeTime = time.parse()?;
    let now = Local::now();
    let next = next_occurrence(wake, &now);
    let json = serde_json::json!({
        "wake_time": wake.to_string(),
        "next": next.to_rfc3339(),
        "in_secs": (next - now).num_seconds(),
    });
    println!("{json}");
    Ok(())
}
