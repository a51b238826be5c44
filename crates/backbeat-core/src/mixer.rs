//! Mixer gain resolution

use crate::composition::{Composition, CHANNEL_COUNT};

/// Effective gain per channel plus the master gain, resolved from the
/// composition on every change. Solo is a global decision: one soloed
/// channel silences every non-soloed channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MixLevels {
    pub channel_gains: [f32; CHANNEL_COUNT],
    pub master: f32,
}

impl MixLevels {
    pub fn resolve(composition: &Composition) -> Self {
        let any_solo = composition.channels.iter().any(|ch| ch.solo);

        let mut channel_gains = [0.0f32; CHANNEL_COUNT];
        for (gain, channel) in channel_gains.iter_mut().zip(&composition.channels) {
            let audible = if any_solo {
                channel.solo && !channel.muted
            } else {
                !channel.muted
            };
            *gain = if audible {
                channel.volume.clamp(0.0, 1.0)
            } else {
                0.0
            };
        }

        Self {
            channel_gains,
            master: composition.master_volume.clamp(0.0, 1.0),
        }
    }
}

impl Default for MixLevels {
    fn default() -> Self {
        Self::resolve(&Composition::default())
    }
}
