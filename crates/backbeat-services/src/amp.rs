//! Guitar amplifier effects chain
//!
//! Fixed serial topology applied to the summed guitar bus, ahead of the
//! guitar channel gain: pre-gain, low shelf at 200 Hz, bell at 1 kHz,
//! high shelf at 3 kHz, presence bell at 4 kHz, post-gain. The six
//! normalized knobs re-parameterize every stage at once.

use std::fmt;

use fundsp::hacker::*;

use backbeat_core::GuitarAmpSettings;

const BASS_HZ: f32 = 200.0;
const MID_HZ: f32 = 1000.0;
const MID_Q: f32 = 1.0;
const TREBLE_HZ: f32 = 3000.0;
const PRESENCE_HZ: f32 = 4000.0;
const PRESENCE_Q: f32 = 2.0;
const SHELF_Q: f32 = 0.707;

/// Linear pre-gain for a drive knob position
pub fn drive_to_pre_gain(drive: f32) -> f32 {
    0.5 + drive * 2.0
}

/// EQ gain in dB for a knob position, centered at 0.5
pub fn knob_to_db(knob: f32, range_db: f32) -> f32 {
    (knob - 0.5) * range_db
}

pub struct AmpChain {
    pre_gain: f32,
    post_gain: f32,
    bass: An<FixedSvf<f64, LowshelfMode<f64>>>,
    mid: An<FixedSvf<f64, BellMode<f64>>>,
    treble: An<FixedSvf<f64, HighshelfMode<f64>>>,
    presence: An<FixedSvf<f64, BellMode<f64>>>,
}

impl fmt::Debug for AmpChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AmpChain")
            .field("pre_gain", &self.pre_gain)
            .field("post_gain", &self.post_gain)
            .finish()
    }
}

impl AmpChain {
    pub fn new(sample_rate: f32) -> Self {
        let mut bass = lowshelf_hz(BASS_HZ, SHELF_Q, 1.0);
        bass.set_sample_rate(sample_rate as f64);
        let mut mid = bell_hz(MID_HZ, MID_Q, 1.0);
        mid.set_sample_rate(sample_rate as f64);
        let mut treble = highshelf_hz(TREBLE_HZ, SHELF_Q, 1.0);
        treble.set_sample_rate(sample_rate as f64);
        let mut presence = bell_hz(PRESENCE_HZ, PRESENCE_Q, 1.0);
        presence.set_sample_rate(sample_rate as f64);

        let mut chain = Self {
            pre_gain: 1.0,
            post_gain: 1.0,
            bass,
            mid,
            treble,
            presence,
        };
        chain.set_params(&GuitarAmpSettings::default());
        chain
    }

    /// Re-parameterize all six stages from the knob values
    pub fn set_params(&mut self, amp: &GuitarAmpSettings) {
        self.pre_gain = drive_to_pre_gain(amp.drive);
        self.bass.set(Setting::center_q_gain(
            BASS_HZ,
            SHELF_Q,
            db_amp(knob_to_db(amp.bass, 24.0)),
        ));
        self.mid.set(Setting::center_q_gain(
            MID_HZ,
            MID_Q,
            db_amp(knob_to_db(amp.mid, 24.0)),
        ));
        self.treble.set(Setting::center_q_gain(
            TREBLE_HZ,
            SHELF_Q,
            db_amp(knob_to_db(amp.treble, 24.0)),
        ));
        self.presence.set(Setting::center_q_gain(
            PRESENCE_HZ,
            PRESENCE_Q,
            db_amp(knob_to_db(amp.presence, 12.0)),
        ));
        self.post_gain = amp.master;
    }

    pub fn pre_gain(&self) -> f32 {
        self.pre_gain
    }

    pub fn post_gain(&self) -> f32 {
        self.post_gain
    }

    /// Run one sample through the full chain
    pub fn tick(&mut self, sample: f32) -> f32 {
        let mut x = sample * self.pre_gain;
        x = self.bass.tick(&Frame::from([x]))[0];
        x = self.mid.tick(&Frame::from([x]))[0];
        x = self.treble.tick(&Frame::from([x]))[0];
        x = self.presence.tick(&Frame::from([x]))[0];
        x * self.post_gain
    }

    /// Process a block in place
    pub fn process(&mut self, samples: &mut [f32]) {
        for sample in samples.iter_mut() {
            *sample = self.tick(*sample);
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.bass.set_sample_rate(sample_rate as f64);
        self.mid.set_sample_rate(sample_rate as f64);
        self.treble.set_sample_rate(sample_rate as f64);
        self.presence.set_sample_rate(sample_rate as f64);
    }
}
