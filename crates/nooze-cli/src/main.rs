use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

mod commands;
mod console;

#[derive(Parser)]
#[command(name = "nooze", version, about = "Nooze wake-up alarm")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the alarm daemon, reading commands from stdin
    Run {
        /// Schedule the daily alarm at HH:MM on startup
        #[arg(long)]
        schedule: Option<String>,
        /// Alarm id to schedule under (defaults to the persisted id)
        #[arg(long)]
        alarm_id: Option<u32>,
    },
    /// Print enforcement state as JSON
    Status,
    /// Take the pending completion record (prints null when none)
    Consume,
    /// Preview the next occurrence of a wake time
    Next {
        /// Wake time as HH:MM
        time: String,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

/// Logs go to stderr, filtered by `NOOZE_LOG` (default `info`).
fn init_logging() {
    let filter = EnvFilter::try_from_env("NOOZE_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging();

    let result = match cli.command {
        Commands::Run { schedule, alarm_id } => commands::run::run(schedule, alarm_id),
        Commands::Status => commands::status::status(),
        Commands::Consume => commands::status::consume(),
        Commands::Next { time } => commands::next::run(&time),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
