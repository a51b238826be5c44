//! backbeat-services: Audio engine, synthesis, and persistence services

pub mod amp;
pub mod audio_io;
pub mod clip_import;
pub mod engine;
pub mod sequencer;
pub mod store;
pub mod voices;

pub use amp::AmpChain;
pub use audio_io::{AudioOutputError, RealtimeOutputStream};
pub use clip_import::{
    decode_clip, import_clip, ClipImportError, ClipSlot, DecodedClip, MAX_CLIP_BYTES,
};
pub use engine::{AudioEngine, EngineError, EngineState};
pub use sequencer::{Sequencer, StepTrigger, TriggerSource};
pub use store::{CompositionStore, FsStore, StoreEntry, StoreError};
pub use voices::{midi_to_hz, recipe, Attack, Generator, Voice, VoiceBank, VoiceRecipe};
