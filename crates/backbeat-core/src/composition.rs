//! Composition model: the canonical, serializable state of a piece

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Number of mixer channels. The slots are fixed and order is load-bearing.
pub const CHANNEL_COUNT: usize = 8;

/// Number of drum lanes at the front of the channel list
pub const DRUM_LANES: usize = 3;

/// Index of the channel routed through the amplifier chain
pub const GUITAR_CHANNEL: usize = 6;

/// Default number of steps in one loop
pub const DEFAULT_TIMELINE_LENGTH: u32 = 16;

/// The eight fixed channel slots. The discriminant is the channel index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Kick,
    Snare,
    HiHat,
    Bass,
    Synth,
    Piano,
    Guitar,
    Strings,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; CHANNEL_COUNT] = [
        Self::Kick,
        Self::Snare,
        Self::HiHat,
        Self::Bass,
        Self::Synth,
        Self::Piano,
        Self::Guitar,
        Self::Strings,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Kick => "Kick",
            Self::Snare => "Snare",
            Self::HiHat => "HiHat",
            Self::Bass => "Bass",
            Self::Synth => "Synth",
            Self::Piano => "Piano",
            Self::Guitar => "Guitar",
            Self::Strings => "Strings",
        }
    }

    /// Drum lanes trigger without a pitch
    pub fn is_drum(self) -> bool {
        matches!(self, Self::Kick | Self::Snare | Self::HiHat)
    }
}

/// Mixer state for one channel slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelState {
    pub name: String,
    /// Volume (0.0 to 1.0)
    pub volume: f32,
    pub muted: bool,
    pub solo: bool,
}

impl ChannelState {
    pub fn new(name: impl Into<String>, volume: f32) -> Self {
        Self {
            name: name.into(),
            volume,
            muted: false,
            solo: false,
        }
    }
}

/// Normalized knob values for the guitar amplifier chain
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GuitarAmpSettings {
    pub drive: f32,
    pub bass: f32,
    pub mid: f32,
    pub treble: f32,
    pub presence: f32,
    pub master: f32,
}

impl Default for GuitarAmpSettings {
    fn default() -> Self {
        Self {
            drive: 0.5,
            bass: 0.5,
            mid: 0.5,
            treble: 0.5,
            presence: 0.5,
            master: 0.7,
        }
    }
}

/// A polyphonic note, independent of the per-step monophonic grids
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PianoRollNote {
    pub id: String,
    pub start_step: u32,
    /// Length in steps (>= 1). Stored and edited, but playback triggers
    /// are instantaneous; duration does not sustain the voice.
    pub duration: u32,
    /// MIDI note number (0-127)
    pub pitch: u8,
    /// Channel index (0-7) the note plays on
    pub track: u8,
}

/// An imported audio clip overlaid on the loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportedClip {
    pub name: String,
    /// Opaque encoded audio bytes; decoded by the engine, never inspected here
    pub data: Vec<u8>,
    pub start_step: u32,
    /// Length in steps, derived from the decoded audio at import time
    pub duration: u32,
}

/// The root aggregate. Mutations replace the whole value; the engine only
/// ever reads the latest snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Composition {
    /// Beats per minute
    pub tempo: u32,
    pub master_volume: f32,
    /// Exactly CHANNEL_COUNT entries, in ChannelKind order
    pub channels: Vec<ChannelState>,
    /// Kick/Snare/HiHat flags per step
    pub drum_pattern: Vec<[bool; DRUM_LANES]>,
    pub bass_notes: Vec<Option<u8>>,
    pub synth_notes: Vec<Option<u8>>,
    pub piano_notes: Vec<Option<u8>>,
    pub guitar_notes: Vec<Option<u8>>,
    pub strings_notes: Vec<Option<u8>>,
    #[serde(default)]
    pub guitar_amp: GuitarAmpSettings,
    #[serde(default)]
    pub piano_roll_notes: Vec<PianoRollNote>,
    #[serde(default = "default_timeline_length")]
    pub timeline_length: u32,
    #[serde(default)]
    pub imported_audio: Option<ImportedClip>,
}

fn default_timeline_length() -> u32 {
    DEFAULT_TIMELINE_LENGTH
}

impl Default for Composition {
    fn default() -> Self {
        let steps = DEFAULT_TIMELINE_LENGTH as usize;
        Self {
            tempo: 120,
            master_volume: 0.7,
            channels: vec![
                ChannelState::new("Kick", 0.8),
                ChannelState::new("Snare", 0.7),
                ChannelState::new("HiHat", 0.6),
                ChannelState::new("Bass", 0.6),
                ChannelState::new("Synth", 0.5),
                ChannelState::new("Piano", 0.5),
                ChannelState::new("Guitar", 0.5),
                ChannelState::new("Strings", 0.4),
            ],
            drum_pattern: vec![[false; DRUM_LANES]; steps],
            bass_notes: vec![None; steps],
            synth_notes: vec![None; steps],
            piano_notes: vec![None; steps],
            guitar_notes: vec![None; steps],
            strings_notes: vec![None; steps],
            guitar_amp: GuitarAmpSettings::default(),
            piano_roll_notes: Vec::new(),
            timeline_length: DEFAULT_TIMELINE_LENGTH,
            imported_audio: None,
        }
    }
}

impl Composition {
    /// Monophonic note grid for a melodic channel, None for drum lanes
    pub fn melodic_notes(&self, kind: ChannelKind) -> Option<&[Option<u8>]> {
        match kind {
            ChannelKind::Bass => Some(&self.bass_notes),
            ChannelKind::Synth => Some(&self.synth_notes),
            ChannelKind::Piano => Some(&self.piano_notes),
            ChannelKind::Guitar => Some(&self.guitar_notes),
            ChannelKind::Strings => Some(&self.strings_notes),
            _ => None,
        }
    }

    /// Structural checks that defaulting must never paper over
    pub fn validate(&self) -> Result<()> {
        if self.channels.len() != CHANNEL_COUNT {
            return Err(CoreError::Invalid(format!(
                "expected {} channels, got {}",
                CHANNEL_COUNT,
                self.channels.len()
            )));
        }
        if self.tempo == 0 {
            return Err(CoreError::Invalid("tempo must be positive".into()));
        }
        Ok(())
    }

    /// Restore the model invariants: step grids sized to the timeline,
    /// gains and knobs within [0,1], piano-roll notes on valid tracks.
    pub fn normalize(&mut self) {
        self.timeline_length = self.timeline_length.max(1);
        let steps = self.timeline_length as usize;

        self.drum_pattern.resize(steps, [false; DRUM_LANES]);
        self.bass_notes.resize(steps, None);
        self.synth_notes.resize(steps, None);
        self.piano_notes.resize(steps, None);
        self.guitar_notes.resize(steps, None);
        self.strings_notes.resize(steps, None);

        self.master_volume = self.master_volume.clamp(0.0, 1.0);
        for channel in &mut self.channels {
            channel.volume = channel.volume.clamp(0.0, 1.0);
        }

        let amp = &mut self.guitar_amp;
        for knob in [
            &mut amp.drive,
            &mut amp.bass,
            &mut amp.mid,
            &mut amp.treble,
            &mut amp.presence,
            &mut amp.master,
        ] {
            *knob = knob.clamp(0.0, 1.0);
        }

        self.piano_roll_notes
            .retain(|note| (note.track as usize) < CHANNEL_COUNT && note.pitch <= 127);
        for note in &mut self.piano_roll_notes {
            note.duration = note.duration.max(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_kind_index_round_trip() {
        for (i, kind) in ChannelKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
            assert_eq!(ChannelKind::from_index(i), Some(*kind));
        }
        assert_eq!(ChannelKind::from_index(8), None);
        assert_eq!(ChannelKind::Guitar.index(), GUITAR_CHANNEL);
    }

    #[test]
    fn default_composition_is_valid() {
        let composition = Composition::default();
        composition.validate().unwrap();
        assert_eq!(composition.channels.len(), CHANNEL_COUNT);
        assert_eq!(composition.drum_pattern.len(), 16);
        assert_eq!(composition.channels[GUITAR_CHANNEL].name, "Guitar");
    }

    #[test]
    fn normalize_resizes_grids_and_clamps() {
        let mut composition = Composition {
            timeline_length: 8,
            master_volume: 1.7,
            ..Composition::default()
        };
        composition.channels[2].volume = -0.5;
        composition.piano_roll_notes.push(PianoRollNote {
            id: "a".into(),
            start_step: 0,
            duration: 0,
            pitch: 60,
            track: 4,
        });
        composition.piano_roll_notes.push(PianoRollNote {
            id: "b".into(),
            start_step: 0,
            duration: 2,
            pitch: 60,
            track: 9,
        });

        composition.normalize();

        assert_eq!(composition.drum_pattern.len(), 8);
        assert_eq!(composition.strings_notes.len(), 8);
        assert_eq!(composition.master_volume, 1.0);
        assert_eq!(composition.channels[2].volume, 0.0);
        assert_eq!(composition.piano_roll_notes.len(), 1);
        assert_eq!(composition.piano_roll_notes[0].duration, 1);
    }

    #[test]
    fn wrong_channel_count_is_invalid() {
        let mut composition = Composition::default();
        composition.channels.pop();
        assert!(composition.validate().is_err());
    }
}
