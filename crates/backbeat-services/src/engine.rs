//! Audio engine: owns the output stream and renders the loop
//!
//! One render callback is the whole timeline: it drains preview triggers,
//! asks the sequencer for the step boundaries inside the block, ticks
//! every live voice into per-channel buses, runs the guitar bus through
//! the amp chain, applies the resolved mixer gains, overlays the imported
//! clip, and scales by the master gain. The UI side replaces the
//! composition wholesale; the callback only ever reads the latest
//! snapshot.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_channel::{bounded, Receiver, Sender};
use thiserror::Error;
use tracing::{debug, info};

use backbeat_core::{ChannelKind, Composition, MixLevels, CHANNEL_COUNT, GUITAR_CHANNEL};

use crate::amp::AmpChain;
use crate::audio_io::{AudioOutputError, RealtimeOutputStream};
use crate::clip_import::{spawn_decode, ClipSlot};
use crate::sequencer::{Sequencer, TriggerSource};
use crate::voices::VoiceBank;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Audio output error: {0}")]
    Output(#[from] AudioOutputError),
    #[error("Engine already running")]
    AlreadyRunning,
    #[error("Engine not running")]
    NotRunning,
}

/// A note played from the UI outside the sequenced loop
#[derive(Debug, Clone, Copy)]
struct PreviewTrigger {
    kind: ChannelKind,
    pitch: Option<u8>,
}

/// One playing pass of the imported clip, routed straight to master
#[derive(Debug)]
struct ClipPlayer {
    samples: Arc<Vec<f32>>,
    pos: usize,
    delay: u32,
}

impl ClipPlayer {
    fn new(samples: Arc<Vec<f32>>, delay: u32) -> Self {
        Self {
            samples,
            pos: 0,
            delay,
        }
    }

    fn is_done(&self) -> bool {
        self.pos >= self.samples.len()
    }

    fn tick(&mut self) -> f32 {
        if self.delay > 0 {
            self.delay -= 1;
            return 0.0;
        }
        let sample = self.samples.get(self.pos).copied().unwrap_or(0.0);
        self.pos += 1;
        sample
    }
}

/// Engine state shared between the control side and the render callback
pub struct EngineState {
    pub playing: AtomicBool,
    pub current_step: AtomicU32,
    sample_rate: u32,
    composition: Mutex<Composition>,
    levels: Mutex<MixLevels>,
    sequencer: Mutex<Sequencer>,
    voices: Mutex<VoiceBank>,
    amp: Mutex<AmpChain>,
    clip_slot: Arc<ClipSlot>,
    clip_players: Mutex<Vec<ClipPlayer>>,
    preview_rx: Receiver<PreviewTrigger>,
}

impl EngineState {
    fn new(sample_rate: u32, preview_rx: Receiver<PreviewTrigger>) -> Self {
        let composition = Composition::default();
        Self {
            playing: AtomicBool::new(false),
            current_step: AtomicU32::new(0),
            sample_rate,
            levels: Mutex::new(MixLevels::resolve(&composition)),
            composition: Mutex::new(composition),
            sequencer: Mutex::new(Sequencer::new()),
            voices: Mutex::new(VoiceBank::new()),
            amp: Mutex::new(AmpChain::new(sample_rate as f32)),
            clip_slot: Arc::new(ClipSlot::new()),
            clip_players: Mutex::new(Vec::new()),
            preview_rx,
        }
    }
}

/// The sequencing/synthesis engine behind the composer
pub struct AudioEngine {
    state: Arc<EngineState>,
    preview_tx: Sender<PreviewTrigger>,
    stream: Option<RealtimeOutputStream>,
    sample_rate: u32,
}

impl AudioEngine {
    pub fn new(sample_rate: u32) -> Self {
        let (preview_tx, preview_rx) = bounded(64);
        Self {
            state: Arc::new(EngineState::new(sample_rate, preview_rx)),
            preview_tx,
            stream: None,
            sample_rate,
        }
    }

    /// Shared state handle for observers
    pub fn state(&self) -> Arc<EngineState> {
        self.state.clone()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Arm the output stream. Playback still waits for `toggle_playback`.
    pub fn start(&mut self) -> Result<(), EngineError> {
        if self.stream.is_some() {
            return Err(EngineError::AlreadyRunning);
        }

        let state = self.state.clone();
        let stream = RealtimeOutputStream::start(move |buffer, _sample_rate, channels| {
            Self::render(&state, buffer, channels);
        })?;

        self.stream = Some(stream);
        info!("Audio engine started");
        Ok(())
    }

    /// Tear the output stream down. The one hard cancellation point:
    /// pending voices die with the stream.
    pub fn stop(&mut self) -> Result<(), EngineError> {
        let stream = self.stream.take().ok_or(EngineError::NotRunning)?;
        stream.stop();
        self.state.playing.store(false, Ordering::SeqCst);
        if let Ok(mut sequencer) = self.state.sequencer.lock() {
            sequencer.stop();
        }
        info!("Audio engine stopped");
        Ok(())
    }

    /// Replace the composition snapshot. Mixer levels and amp parameters
    /// are re-resolved synchronously; a changed imported clip kicks off a
    /// background decode.
    pub fn set_composition(&self, composition: Composition) {
        if let Ok(mut levels) = self.state.levels.lock() {
            *levels = MixLevels::resolve(&composition);
        }
        if let Ok(mut amp) = self.state.amp.lock() {
            amp.set_params(&composition.guitar_amp);
        }

        let clip_changed = {
            let Ok(mut current) = self.state.composition.lock() else {
                return;
            };
            let changed = match (&current.imported_audio, &composition.imported_audio) {
                (Some(old), Some(new)) => old.name != new.name || old.data != new.data,
                (None, None) => false,
                _ => true,
            };
            *current = composition;
            changed
        };

        if clip_changed {
            let Ok(current) = self.state.composition.lock() else {
                return;
            };
            match &current.imported_audio {
                Some(clip) => {
                    debug!(name = %clip.name, "Imported clip changed; decoding");
                    spawn_decode(self.state.clip_slot.clone(), clip.clone(), self.sample_rate);
                }
                None => {
                    self.state.clip_slot.clear();
                }
            }
        }
    }

    /// The only transport control exposed to the UI
    pub fn toggle_playback(&self) {
        let tempo = self
            .state
            .composition
            .lock()
            .map(|c| c.tempo)
            .unwrap_or(120);

        let Ok(mut sequencer) = self.state.sequencer.lock() else {
            return;
        };
        if sequencer.is_playing() {
            sequencer.stop();
            self.state.playing.store(false, Ordering::SeqCst);
            info!("Transport stopped");
        } else {
            sequencer.start(tempo, self.sample_rate);
            self.state.playing.store(true, Ordering::SeqCst);
            info!(tempo, "Transport running");
        }
    }

    pub fn is_playing(&self) -> bool {
        self.state.playing.load(Ordering::SeqCst)
    }

    pub fn current_step(&self) -> u32 {
        self.state.current_step.load(Ordering::SeqCst)
    }

    /// Sound a single instrument hit outside the loop, e.g. from an
    /// instrument panel click. Works whether or not the transport runs;
    /// dropped silently if the queue is full.
    pub fn preview(&self, kind: ChannelKind, pitch: Option<u8>) {
        if self
            .preview_tx
            .try_send(PreviewTrigger { kind, pitch })
            .is_err()
        {
            debug!(?kind, "Preview queue full; dropping trigger");
        }
    }

    /// Render one block into an interleaved buffer (called from the audio
    /// thread)
    fn render(state: &EngineState, buffer: &mut [f32], channels: u16) {
        let channels = channels.max(1) as usize;
        let num_frames = buffer.len() / channels;
        let sample_rate = state.sample_rate as f32;

        let Ok(composition) = state.composition.lock() else {
            buffer.fill(0.0);
            return;
        };
        let levels = match state.levels.lock() {
            Ok(levels) => *levels,
            Err(_) => {
                buffer.fill(0.0);
                return;
            }
        };
        let Ok(mut voices) = state.voices.lock() else {
            buffer.fill(0.0);
            return;
        };
        let Ok(mut clip_players) = state.clip_players.lock() else {
            buffer.fill(0.0);
            return;
        };
        let Ok(mut amp) = state.amp.lock() else {
            buffer.fill(0.0);
            return;
        };

        // Previews sound even while stopped
        while let Ok(preview) = state.preview_rx.try_recv() {
            voices.trigger(preview.kind, preview.pitch, sample_rate, 0);
        }

        // Step boundaries inside this block
        if state.playing.load(Ordering::SeqCst) {
            let clip_ready = state.clip_slot.get().is_some();
            let triggers = match state.sequencer.lock() {
                Ok(mut sequencer) => {
                    sequencer.advance(num_frames as u32, &composition, clip_ready)
                }
                Err(_) => Vec::new(),
            };

            for trigger in &triggers {
                state.current_step.store(trigger.step, Ordering::SeqCst);
                for source in &trigger.sources {
                    match source {
                        TriggerSource::Voice { kind, pitch } => {
                            voices.trigger(*kind, *pitch, sample_rate, trigger.offset);
                        }
                        TriggerSource::Clip => {
                            if let Some(decoded) = state.clip_slot.get() {
                                clip_players
                                    .push(ClipPlayer::new(decoded.samples, trigger.offset));
                            }
                        }
                    }
                }
            }
        }

        for frame in buffer.chunks_mut(channels) {
            let mut buses = [0.0f32; CHANNEL_COUNT];
            voices.mix_into(&mut buses);

            // Guitar goes through the amp before its channel gain
            let guitar = amp.tick(buses[GUITAR_CHANNEL]);

            let mut mix = 0.0f32;
            for (index, bus) in buses.iter().enumerate() {
                if index == GUITAR_CHANNEL {
                    continue;
                }
                mix += bus * levels.channel_gains[index];
            }
            mix += guitar * levels.channel_gains[GUITAR_CHANNEL];

            // The imported clip bypasses per-channel mixing
            for player in clip_players.iter_mut() {
                mix += player.tick();
            }

            frame.fill(mix * levels.master);
        }

        voices.reap();
        clip_players.retain(|player| !player.is_done());
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
