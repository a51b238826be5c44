//! Sample-accurate step scheduling
//!
//! Step boundaries are derived from the audio clock, not a wall-clock
//! timer: when playback starts the sequencer captures the step length in
//! samples and a fixed start reference, and every boundary is computed as
//! `n * samples_per_step` from that reference. Render blocks ask for the
//! boundaries they contain, each with its exact frame offset, so step
//! timing cannot drift however late the driver runs.

use backbeat_core::{samples_per_step, ChannelKind, Composition, Transport, DRUM_LANES};
use tracing::debug;

/// One source to sound at a step boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerSource {
    Voice {
        kind: ChannelKind,
        /// None for drum lanes, which trigger unpitched
        pitch: Option<u8>,
    },
    /// The imported clip, routed straight to the master gain
    Clip,
}

/// A step boundary falling inside a render block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepTrigger {
    pub step: u32,
    /// Frame offset from the start of the block
    pub offset: u32,
    /// Sources active at this step, in trigger order
    pub sources: Vec<TriggerSource>,
}

#[derive(Debug)]
pub struct Sequencer {
    transport: Transport,
    samples_per_step: f64,
    /// Frames rendered since the start reference
    sample_pos: u64,
    /// Boundaries emitted since the start reference
    steps_emitted: u64,
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl Sequencer {
    pub fn new() -> Self {
        Self {
            transport: Transport::new(),
            samples_per_step: 0.0,
            sample_pos: 0,
            steps_emitted: 0,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.transport.is_playing()
    }

    pub fn current_step(&self) -> u32 {
        self.transport.current_step
    }

    /// Begin playback, capturing the step length from the tempo. Tempo or
    /// timeline changes while running take effect on the next start. The
    /// step counter keeps its previous value.
    pub fn start(&mut self, tempo: u32, sample_rate: u32) {
        self.samples_per_step = samples_per_step(tempo.max(1), sample_rate);
        self.sample_pos = 0;
        self.steps_emitted = 0;
        self.transport.start();
    }

    pub fn stop(&mut self) {
        self.transport.stop();
    }

    /// Advance the audio clock by one render block, emitting every step
    /// boundary inside it. Returns nothing while stopped.
    pub fn advance(
        &mut self,
        frames: u32,
        composition: &Composition,
        clip_ready: bool,
    ) -> Vec<StepTrigger> {
        if !self.transport.is_playing() || self.samples_per_step <= 0.0 {
            return Vec::new();
        }

        let block_end = self.sample_pos + frames as u64;
        let mut triggers = Vec::new();

        // A boundary landing exactly on block_end fires now with an offset
        // of `frames`, so its voice starts on the first sample of the next
        // block; absolute timing is identical either way.
        loop {
            let boundary = (self.steps_emitted + 1) as f64 * self.samples_per_step;
            if boundary > block_end as f64 {
                break;
            }
            let offset = (boundary - self.sample_pos as f64) as u32;
            self.steps_emitted += 1;
            let step = self.transport.advance(composition.timeline_length);
            triggers.push(StepTrigger {
                step,
                offset,
                sources: sources_at(composition, step, clip_ready),
            });
        }

        self.sample_pos = block_end;
        triggers
    }
}

const MELODIC: [ChannelKind; 5] = [
    ChannelKind::Bass,
    ChannelKind::Synth,
    ChannelKind::Piano,
    ChannelKind::Guitar,
    ChannelKind::Strings,
];

/// Everything the composition says should sound at this step: drum lanes,
/// the monophonic grids, piano-roll notes starting here, and the imported
/// clip once decoded.
fn sources_at(composition: &Composition, step: u32, clip_ready: bool) -> Vec<TriggerSource> {
    let mut sources = Vec::new();
    let index = step as usize;

    if let Some(lanes) = composition.drum_pattern.get(index) {
        for lane in 0..DRUM_LANES {
            if lanes[lane] {
                if let Some(kind) = ChannelKind::from_index(lane) {
                    sources.push(TriggerSource::Voice { kind, pitch: None });
                }
            }
        }
    }

    for kind in MELODIC {
        let note = composition
            .melodic_notes(kind)
            .and_then(|grid| grid.get(index))
            .copied()
            .flatten();
        if let Some(pitch) = note {
            sources.push(TriggerSource::Voice {
                kind,
                pitch: Some(pitch),
            });
        }
    }

    for note in &composition.piano_roll_notes {
        if note.start_step != step {
            continue;
        }
        let Some(kind) = ChannelKind::from_index(note.track as usize) else {
            continue;
        };
        // Drum tracks fire their lane; melodic tracks take the note's pitch
        let pitch = if kind.is_drum() { None } else { Some(note.pitch) };
        sources.push(TriggerSource::Voice { kind, pitch });
    }

    if let Some(clip) = &composition.imported_audio {
        if clip.start_step == step {
            if clip_ready {
                sources.push(TriggerSource::Clip);
            } else {
                debug!(name = %clip.name, step, "Imported clip not decoded yet; skipping this pass");
            }
        }
    }

    sources
}
