//! Per-instrument voice synthesis
//!
//! Each channel kind maps to a recipe (generator, peak gain, envelope,
//! duration). A triggered voice owns all of its oscillator, filter, and
//! envelope state, renders one sample per tick, and goes silent after its
//! fixed duration. Voices on the same channel overlap freely; there is no
//! stealing, pooling, or cancellation.

use std::f64::consts::TAU;

use backbeat_core::{ChannelKind, CHANNEL_COUNT};

/// Floor that exponential decays ramp toward
const DECAY_FLOOR: f32 = 0.01;

/// Equal-tempered pitch for a MIDI note number (A4 = 69 = 440 Hz)
pub fn midi_to_hz(note: u8) -> f32 {
    440.0 * 2f32.powf((note as f32 - 69.0) / 12.0)
}

/// Signal source for a voice
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Generator {
    Sine,
    Triangle,
    Sawtooth,
    Square,
    /// White noise through a one-pole high-pass
    Noise { highpass_hz: f32 },
    /// Sine with an exponential frequency sweep (kick)
    SweptSine { start_hz: f32, end_hz: f32 },
}

/// Linear attack segment preceding the decay
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Attack {
    pub to: f32,
    pub secs: f32,
}

/// One row of the synthesis table: how a channel kind sounds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceRecipe {
    pub generator: Generator,
    pub peak: f32,
    pub attack: Option<Attack>,
    pub duration_secs: f32,
}

/// The synthesis table. Recipes are data; dispatch is a match on the
/// channel kind, not a trait hierarchy.
pub fn recipe(kind: ChannelKind) -> VoiceRecipe {
    match kind {
        ChannelKind::Kick => VoiceRecipe {
            generator: Generator::SweptSine {
                start_hz: 150.0,
                end_hz: 0.01,
            },
            peak: 1.0,
            attack: None,
            duration_secs: 0.5,
        },
        ChannelKind::Snare => VoiceRecipe {
            generator: Generator::Noise { highpass_hz: 1000.0 },
            peak: 0.5,
            attack: None,
            duration_secs: 0.2,
        },
        ChannelKind::HiHat => VoiceRecipe {
            generator: Generator::Noise { highpass_hz: 5000.0 },
            peak: 0.3,
            attack: None,
            duration_secs: 0.05,
        },
        ChannelKind::Bass => VoiceRecipe {
            generator: Generator::Triangle,
            peak: 0.4,
            attack: None,
            duration_secs: 0.4,
        },
        ChannelKind::Synth => VoiceRecipe {
            generator: Generator::Sawtooth,
            peak: 0.3,
            attack: None,
            duration_secs: 0.3,
        },
        ChannelKind::Piano => VoiceRecipe {
            generator: Generator::Sine,
            peak: 0.35,
            attack: None,
            duration_secs: 0.5,
        },
        ChannelKind::Guitar => VoiceRecipe {
            generator: Generator::Square,
            peak: 0.25,
            attack: None,
            duration_secs: 0.4,
        },
        ChannelKind::Strings => VoiceRecipe {
            generator: Generator::Sawtooth,
            peak: 0.2,
            attack: Some(Attack { to: 0.3, secs: 0.1 }),
            duration_secs: 0.8,
        },
    }
}

/// One fire-and-forget synthesis event
#[derive(Debug)]
pub struct Voice {
    kind: ChannelKind,
    recipe: VoiceRecipe,
    freq_hz: f32,
    sample_rate: f32,
    /// Frames to wait before the first audible sample, for sample-accurate
    /// starts inside a render block
    delay: u32,
    /// Frames rendered so far
    age: u32,
    total_frames: u32,
    phase: f64,
    hp_state: f32,
    hp_coeff: f32,
}

impl Voice {
    pub fn new(kind: ChannelKind, pitch: Option<u8>, sample_rate: f32, delay: u32) -> Self {
        let recipe = recipe(kind);
        let freq_hz = pitch.map(midi_to_hz).unwrap_or(0.0);
        let hp_coeff = match recipe.generator {
            Generator::Noise { highpass_hz } => {
                1.0 - (-(TAU as f32) * highpass_hz / sample_rate).exp()
            }
            _ => 0.0,
        };
        Self {
            kind,
            recipe,
            freq_hz,
            sample_rate,
            delay,
            age: 0,
            total_frames: (recipe.duration_secs * sample_rate) as u32,
            phase: 0.0,
            hp_state: 0.0,
            hp_coeff,
        }
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    /// Mixer slot this voice feeds
    pub fn channel(&self) -> usize {
        self.kind.index()
    }

    pub fn is_done(&self) -> bool {
        self.age >= self.total_frames
    }

    /// Render the next sample. Returns 0.0 while delayed or after the
    /// voice has run its fixed duration.
    pub fn tick(&mut self) -> f32 {
        if self.delay > 0 {
            self.delay -= 1;
            return 0.0;
        }
        if self.is_done() {
            return 0.0;
        }

        let t = self.age as f32 / self.sample_rate;
        self.age += 1;

        let sample = match self.recipe.generator {
            Generator::Sine => {
                let out = (self.phase * TAU).sin() as f32;
                self.advance_phase(self.freq_hz);
                out
            }
            Generator::Triangle => {
                let out = triangle(self.phase);
                self.advance_phase(self.freq_hz);
                out
            }
            Generator::Sawtooth => {
                let out = (2.0 * self.phase - 1.0) as f32;
                self.advance_phase(self.freq_hz);
                out
            }
            Generator::Square => {
                let out = if self.phase < 0.5 { 1.0 } else { -1.0 };
                self.advance_phase(self.freq_hz);
                out
            }
            Generator::Noise { .. } => {
                let noise = fastrand::f32() * 2.0 - 1.0;
                self.hp_state += self.hp_coeff * (noise - self.hp_state);
                noise - self.hp_state
            }
            Generator::SweptSine { start_hz, end_hz } => {
                let out = (self.phase * TAU).sin() as f32;
                // Web-Audio exponential ramp of the oscillator frequency
                let freq =
                    start_hz * (end_hz / start_hz).powf(t / self.recipe.duration_secs);
                self.advance_phase(freq);
                out
            }
        };

        sample * self.envelope(t)
    }

    fn advance_phase(&mut self, freq_hz: f32) {
        self.phase += freq_hz as f64 / self.sample_rate as f64;
        self.phase -= self.phase.floor();
    }

    /// Gain at time t following the Web-Audio ramp law:
    /// g(t) = g0 * (g1/g0)^(t/T)
    fn envelope(&self, t: f32) -> f32 {
        let duration = self.recipe.duration_secs;
        match self.recipe.attack {
            Some(attack) if t < attack.secs => {
                let frac = t / attack.secs;
                self.recipe.peak + (attack.to - self.recipe.peak) * frac
            }
            Some(attack) => {
                let decay_t = t - attack.secs;
                let decay_len = duration - attack.secs;
                attack.to * (DECAY_FLOOR / attack.to).powf(decay_t / decay_len)
            }
            None => self.recipe.peak * (DECAY_FLOOR / self.recipe.peak).powf(t / duration),
        }
    }
}

/// All currently sounding voices. Finished voices are reaped at block
/// boundaries; overlapping triggers simply coexist.
#[derive(Debug, Default)]
pub struct VoiceBank {
    voices: Vec<Voice>,
}

impl VoiceBank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(
        &mut self,
        kind: ChannelKind,
        pitch: Option<u8>,
        sample_rate: f32,
        delay_frames: u32,
    ) {
        self.voices
            .push(Voice::new(kind, pitch, sample_rate, delay_frames));
    }

    pub fn active(&self) -> usize {
        self.voices.len()
    }

    /// Tick every voice once, accumulating into per-channel buses
    pub fn mix_into(&mut self, buses: &mut [f32; CHANNEL_COUNT]) {
        for voice in &mut self.voices {
            buses[voice.channel()] += voice.tick();
        }
    }

    /// Drop voices that have run their full duration
    pub fn reap(&mut self) {
        self.voices.retain(|voice| !voice.is_done());
    }
}

fn triangle(phase: f64) -> f32 {
    let p = phase as f32;
    if p < 0.25 {
        4.0 * p
    } else if p < 0.75 {
        2.0 - 4.0 * p
    } else {
        4.0 * p - 4.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 44_100.0;

    #[test]
    fn concert_a_is_440() {
        assert_eq!(midi_to_hz(69), 440.0);
    }

    #[test]
    fn octaves_double() {
        assert!((midi_to_hz(81) - 880.0).abs() < 1e-3);
        assert!((midi_to_hz(57) - 220.0).abs() < 1e-3);
        // Middle C
        assert!((midi_to_hz(60) - 261.6256).abs() < 1e-3);
    }

    #[test]
    fn recipes_match_the_table() {
        assert_eq!(recipe(ChannelKind::Kick).peak, 1.0);
        assert_eq!(recipe(ChannelKind::Kick).duration_secs, 0.5);
        assert_eq!(recipe(ChannelKind::HiHat).duration_secs, 0.05);
        assert_eq!(
            recipe(ChannelKind::Snare).generator,
            Generator::Noise { highpass_hz: 1000.0 }
        );
        assert_eq!(recipe(ChannelKind::Guitar).generator, Generator::Square);
        assert!(recipe(ChannelKind::Strings).attack.is_some());
    }

    #[test]
    fn voice_runs_its_fixed_duration_then_dies() {
        let mut voice = Voice::new(ChannelKind::HiHat, None, SR, 0);
        let expected = (0.05 * SR) as u32;
        let mut frames = 0;
        while !voice.is_done() {
            voice.tick();
            frames += 1;
        }
        assert_eq!(frames, expected);
        assert_eq!(voice.tick(), 0.0);
    }

    #[test]
    fn delay_defers_the_first_audible_sample() {
        let mut voice = Voice::new(ChannelKind::Bass, Some(40), SR, 3);
        assert_eq!(voice.tick(), 0.0);
        assert_eq!(voice.tick(), 0.0);
        assert_eq!(voice.tick(), 0.0);
        // Delay consumed; the next few frames carry the triangle
        let heard: f32 = (0..64).map(|_| voice.tick().abs()).sum();
        assert!(heard > 0.0);
    }

    #[test]
    fn envelope_decays_exponentially() {
        let voice = Voice::new(ChannelKind::Piano, Some(69), SR, 0);
        let start = voice.envelope(0.0);
        let end = voice.envelope(0.5);
        assert!((start - 0.35).abs() < 1e-6);
        assert!((end - DECAY_FLOOR).abs() < 1e-4);
        assert!(voice.envelope(0.25) < start);
        assert!(voice.envelope(0.25) > end);
    }

    #[test]
    fn strings_attack_rises_then_decays() {
        let voice = Voice::new(ChannelKind::Strings, Some(60), SR, 0);
        assert!((voice.envelope(0.0) - 0.2).abs() < 1e-6);
        assert!((voice.envelope(0.1) - 0.3).abs() < 1e-3);
        assert!(voice.envelope(0.05) > 0.2);
        assert!(voice.envelope(0.05) < 0.3);
        assert!((voice.envelope(0.8) - DECAY_FLOOR).abs() < 1e-4);
    }

    #[test]
    fn guitar_voice_feeds_the_amp_channel() {
        let voice = Voice::new(ChannelKind::Guitar, Some(52), SR, 0);
        assert_eq!(voice.channel(), backbeat_core::GUITAR_CHANNEL);
    }

    #[test]
    fn bank_reaps_only_finished_voices() {
        let mut bank = VoiceBank::new();
        bank.trigger(ChannelKind::Kick, None, SR, 0);
        bank.trigger(ChannelKind::Snare, None, SR, 0);
        bank.trigger(ChannelKind::HiHat, None, SR, 0);
        assert_eq!(bank.active(), 3);

        // 3000 frames: past the hi-hat (0.05s) but inside snare and kick
        for _ in 0..3000 {
            let mut buses = [0.0f32; CHANNEL_COUNT];
            bank.mix_into(&mut buses);
        }
        bank.reap();
        assert_eq!(bank.active(), 2);

        // Run everything out
        for _ in 0..(SR as usize) {
            let mut buses = [0.0f32; CHANNEL_COUNT];
            bank.mix_into(&mut buses);
        }
        bank.reap();
        assert_eq!(bank.active(), 0);
    }

    #[test]
    fn overlapping_voices_sum() {
        let mut bank = VoiceBank::new();
        bank.trigger(ChannelKind::Piano, Some(60), SR, 0);
        bank.trigger(ChannelKind::Piano, Some(64), SR, 0);

        let mut peak_two = 0.0f32;
        for _ in 0..2000 {
            let mut buses = [0.0f32; CHANNEL_COUNT];
            bank.mix_into(&mut buses);
            peak_two = peak_two.max(buses[ChannelKind::Piano.index()].abs());
        }

        let mut solo = VoiceBank::new();
        solo.trigger(ChannelKind::Piano, Some(60), SR, 0);
        let mut peak_one = 0.0f32;
        for _ in 0..2000 {
            let mut buses = [0.0f32; CHANNEL_COUNT];
            solo.mix_into(&mut buses);
            peak_one = peak_one.max(buses[ChannelKind::Piano.index()].abs());
        }

        assert!(peak_two > peak_one);
    }
}
