//! backbeat-core: Domain types for the backbeat composer engine

mod composition;
mod error;
mod mixer;
mod serialize;
mod transport;

pub use composition::{
    ChannelKind, ChannelState, Composition, GuitarAmpSettings, ImportedClip, PianoRollNote,
    CHANNEL_COUNT, DEFAULT_TIMELINE_LENGTH, DRUM_LANES, GUITAR_CHANNEL,
};
pub use error::{CoreError, Result};
pub use mixer::MixLevels;
pub use serialize::{decode, encode};
pub use transport::{samples_per_step, step_duration_ms, Transport, TransportState};
