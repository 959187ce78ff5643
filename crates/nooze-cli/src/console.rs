//! Terminal stand-ins for the user-facing platform seams.
//!
//! Everything is written to stderr so stdout stays a clean stream of JSON
//! lines.

use std::time::Duration;

use async_trait::async_trait;
use nooze_core::alarm::{AlarmId, AlertSurface, AudioOutput, VibrationPattern, Vibrator};
use nooze_core::{PlatformError, VibrationPhase};

pub struct ConsoleSurface;

impl AlertSurface for ConsoleSurface {
    fn launch_ring_ui(&self, alarm_id: AlarmId) -> Result<(), PlatformError> {
        eprintln!("[ring] alarm {alarm_id}: solve the challenge to stop (type `challenge`)");
        Ok(())
    }

    fn post_alert(&self, alarm_id: AlarmId) -> Result<(), PlatformError> {
        eprintln!("[alert] *** WAKE UP *** (alarm {alarm_id})");
        Ok(())
    }

    fn cancel_alert(&self, alarm_id: AlarmId) {
        eprintln!("[alert] cleared (alarm {alarm_id})");
    }

    fn claim_foreground(&self, _alarm_id: AlarmId) -> Result<(), PlatformError> {
        Ok(())
    }

    fn release_foreground(&self, _alarm_id: AlarmId) {}
}

/// Rings the terminal bell once per pass.
pub struct ConsoleAudio {
    pass: Duration,
}

impl ConsoleAudio {
    pub fn new(pass: Duration) -> Self {
        Self { pass }
    }
}

#[async_trait]
impl AudioOutput for ConsoleAudio {
    async fn play(&self) -> Result<(), PlatformError> {
        eprint!("\x07");
        tokio::time::sleep(self.pass).await;
        Ok(())
    }

    fn halt(&self) {
        eprintln!("[audio] silenced");
    }
}

pub struct ConsoleVibrator;

impl Vibrator for ConsoleVibrator {
    fn vibrate(&self, pattern: &VibrationPattern) -> Result<(), PlatformError> {
        let phase = [VibrationPhase::One, VibrationPhase::Two, VibrationPhase::Three]
            .into_iter()
            .find(|phase| phase.pattern() == pattern)
            .map(|phase| phase.as_u8().to_string())
            .unwrap_or_else(|| "custom".to_string());
        let peak = pattern.amplitudes.iter().max().copied().unwrap_or(0);
        eprintln!("[vibrate] phase {phase}, peak amplitude {peak}");
        Ok(())
    }

    fn cancel(&self) {
        eprintln!("[vibrate] off");
    }
}
