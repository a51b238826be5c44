//! Transport state and step timing

use serde::{Deserialize, Serialize};

/// Transport playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransportState {
    #[default]
    Stopped,
    Running,
}

/// Duration of one sixteenth-note step in milliseconds
pub fn step_duration_ms(tempo: u32) -> f64 {
    15_000.0 / tempo as f64
}

/// Audio-clock length of one step at the given sample rate
pub fn samples_per_step(tempo: u32, sample_rate: u32) -> f64 {
    sample_rate as f64 * 15.0 / tempo as f64
}

/// Transport controls and position. The step counter deliberately
/// survives stop/start; only a fresh transport begins at zero.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Transport {
    pub state: TransportState,
    pub current_step: u32,
}

impl Transport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self) {
        self.state = TransportState::Running;
    }

    pub fn stop(&mut self) {
        self.state = TransportState::Stopped;
    }

    /// Flip between Stopped and Running; returns the new state.
    pub fn toggle(&mut self) -> TransportState {
        self.state = match self.state {
            TransportState::Stopped => TransportState::Running,
            TransportState::Running => TransportState::Stopped,
        };
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == TransportState::Running
    }

    /// Advance one step modulo the loop length; returns the new step.
    pub fn advance(&mut self, timeline_length: u32) -> u32 {
        let len = timeline_length.max(1);
        self.current_step = (self.current_step + 1) % len;
        self.current_step
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_duration_follows_tempo() {
        assert_eq!(step_duration_ms(120), 125.0);
        assert_eq!(step_duration_ms(60), 250.0);
        assert_eq!(step_duration_ms(150), 100.0);
    }

    #[test]
    fn samples_per_step_at_44100() {
        // 120 BPM sixteenth = 125ms = 5512.5 samples at 44.1kHz
        assert!((samples_per_step(120, 44_100) - 5512.5).abs() < 1e-9);
    }

    #[test]
    fn loops_back_to_zero() {
        let mut transport = Transport::new();
        for _ in 0..16 {
            transport.advance(16);
        }
        assert_eq!(transport.current_step, 0);
        transport.advance(16);
        assert_eq!(transport.current_step, 1);
    }

    #[test]
    fn step_survives_stop_start() {
        let mut transport = Transport::new();
        transport.start();
        transport.advance(16);
        transport.advance(16);
        transport.stop();
        transport.start();
        assert_eq!(transport.current_step, 2);
    }

    #[test]
    fn toggle_alternates() {
        let mut transport = Transport::new();
        assert_eq!(transport.toggle(), TransportState::Running);
        assert_eq!(transport.toggle(), TransportState::Stopped);
    }
}
