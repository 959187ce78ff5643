use clap::Subcommand;
use nooze_core::Config;

const KEYS_HELP: &str = "\
Keys:
  alarm.default_alarm_id                         alarm id used when none is persisted (1001)
  alarm.wake_hold_ceiling_secs                   wake hold taken on each fire (10)
  escalation.reassert_interval_secs              re-post period while the ring screen is hidden (12)
  escalation.phase_two_after_secs                stronger vibration after (30)
  escalation.phase_three_after_secs              strongest vibration after (60)
  escalation.playback_retry_delay_ms             wait after a playback error (1000)
  escalation.max_consecutive_playback_failures   errors before audio gives up (10)
  challenge.problem_count                        problems to solve (4)
  challenge.operand_min / challenge.operand_max  operand range, capped at +/-1000000 (1..50)
  challenge.operators                            JSON list of add, sub, mul ([\"add\"])
  challenge.seed                                 fixed seed, or none for random";

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print one setting
    #[command(after_help = KEYS_HELP)]
    Get {
        /// Dotted key, e.g. "challenge.problem_count"
        key: String,
    },
    /// Change one setting; takes effect on the next `nooze run`
    #[command(after_help = KEYS_HELP)]
    Set {
        /// Dotted key, e.g. "escalation.reassert_interval_secs"
        key: String,
        /// New value, e.g. "20" or '["add","sub"]'
        value: String,
    },
    /// Print every setting as JSON
    List,
    /// Restore the default escalation and challenge settings
    Reset,
}

pub fn run(action: ConfigAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            match config.get(&key) {
                Some(value) => println!("{value}"),
                None => {
                    eprintln!("unknown key: {key}\n\n{KEYS_HELP}");
                    std::process::exit(1);
                }
            }
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            let stored = config.get(&key).unwrap_or(value);
            println!("{key} = {stored}");
        }
        ConfigAction::List => {
            let config = Config::load()?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        ConfigAction::Reset => {
            Config::default().save()?;
            println!("settings restored to defaults");
        }
    }
    Ok(())
}
