//! Imported-clip decoding
//!
//! The composition stores an imported clip as opaque encoded bytes. The
//! engine decodes those bytes to mono samples at its own rate on a
//! background thread whenever the clip changes; the result never flows
//! back into the composition. A generation counter makes a decode that
//! finishes after its clip was replaced land in the bin instead of the
//! slot.

use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::thread;

use hound::{SampleFormat, WavReader};
use thiserror::Error;
use tracing::{info, warn};

use backbeat_core::{step_duration_ms, ImportedClip};

/// Upper bound on imported payloads, matching the composer's import dialog
pub const MAX_CLIP_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ClipImportError {
    #[error("Clip payload exceeds {MAX_CLIP_BYTES} bytes")]
    TooLarge,
    #[error("Unsupported clip container; expected RIFF/WAVE")]
    UnsupportedFormat,
    #[error("Failed to decode clip: {0}")]
    Decode(String),
    #[error("Failed to resample clip: {0}")]
    Resample(String),
}

/// A clip decoded to mono samples at the engine rate
#[derive(Debug, Clone)]
pub struct DecodedClip {
    pub samples: Arc<Vec<f32>>,
    pub sample_rate: u32,
}

/// Decode an opaque payload to playable form at the target rate.
pub fn decode_clip(data: &[u8], target_rate: u32) -> Result<DecodedClip, ClipImportError> {
    validate_payload(data)?;

    let reader = WavReader::new(Cursor::new(data))
        .map_err(|e| ClipImportError::Decode(e.to_string()))?;
    let spec = reader.spec();
    let samples = read_samples(reader)?;
    let mono = to_mono(&samples, spec.channels as usize);
    let resampled = resample_if_needed(&mono, spec.sample_rate, target_rate)?;

    Ok(DecodedClip {
        samples: Arc::new(resampled),
        sample_rate: target_rate,
    })
}

/// Cheap structural checks before handing bytes to the decoder
fn validate_payload(data: &[u8]) -> Result<(), ClipImportError> {
    if data.len() > MAX_CLIP_BYTES {
        return Err(ClipImportError::TooLarge);
    }
    if data.len() < 12 || &data[0..4] != b"RIFF" || &data[8..12] != b"WAVE" {
        return Err(ClipImportError::UnsupportedFormat);
    }
    Ok(())
}

fn read_samples(mut reader: WavReader<Cursor<&[u8]>>) -> Result<Vec<f32>, ClipImportError> {
    let spec = reader.spec();
    let samples: Result<Vec<f32>, _> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, 32) => reader.samples::<f32>().collect(),
        (SampleFormat::Int, bits) => {
            let scale = (1i64 << (bits - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect()
        }
        _ => return Err(ClipImportError::Decode("unsupported sample format".into())),
    };
    samples.map_err(|e| ClipImportError::Decode(e.to_string()))
}

/// Average interleaved channels down to mono
fn to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

fn resample_if_needed(
    samples: &[f32],
    from_rate: u32,
    to_rate: u32,
) -> Result<Vec<f32>, ClipImportError> {
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    use rubato::{
        Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType,
        WindowFunction,
    };

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(
        to_rate as f64 / from_rate as f64,
        2.0,
        params,
        samples.len(),
        1,
    )
    .map_err(|e| ClipImportError::Resample(e.to_string()))?;

    let input = vec![samples.to_vec()];
    let output = resampler
        .process(&input, None)
        .map_err(|e| ClipImportError::Resample(e.to_string()))?;

    Ok(output.into_iter().flatten().collect())
}

/// Build an `ImportedClip` from encoded bytes, deriving its length in
/// steps at the given tempo.
pub fn import_clip(
    name: impl Into<String>,
    data: Vec<u8>,
    start_step: u32,
    tempo: u32,
) -> Result<ImportedClip, ClipImportError> {
    validate_payload(&data)?;
    let reader = WavReader::new(Cursor::new(data.as_slice()))
        .map_err(|e| ClipImportError::Decode(e.to_string()))?;
    let secs = reader.duration() as f64 / reader.spec().sample_rate as f64;
    let steps = (secs * 1000.0 / step_duration_ms(tempo.max(1))).ceil() as u32;

    Ok(ImportedClip {
        name: name.into(),
        data,
        start_step,
        duration: steps.max(1),
    })
}

#[derive(Debug, Default)]
struct SlotInner {
    generation: u64,
    decoded: Option<DecodedClip>,
}

/// Shared landing slot for the background decode
#[derive(Debug, Default)]
pub struct ClipSlot {
    inner: Mutex<SlotInner>,
}

impl ClipSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop any decoded clip and invalidate in-flight decodes. Returns the
    /// generation a new decode must present to land.
    pub fn clear(&self) -> u64 {
        let Ok(mut inner) = self.inner.lock() else {
            return 0;
        };
        inner.generation += 1;
        inner.decoded = None;
        inner.generation
    }

    /// Store a decode result unless the slot has moved on
    pub fn install(&self, generation: u64, clip: DecodedClip) -> bool {
        let Ok(mut inner) = self.inner.lock() else {
            return false;
        };
        if inner.generation != generation {
            return false;
        }
        inner.decoded = Some(clip);
        true
    }

    pub fn get(&self) -> Option<DecodedClip> {
        self.inner.lock().ok().and_then(|inner| inner.decoded.clone())
    }
}

/// Fire-and-forget decode of a changed clip. Failure is logged and
/// discarded; the composition keeps the clip, unplayable.
pub fn spawn_decode(slot: Arc<ClipSlot>, clip: ImportedClip, target_rate: u32) {
    let generation = slot.clear();
    thread::spawn(move || match decode_clip(&clip.data, target_rate) {
        Ok(decoded) => {
            if slot.install(generation, decoded) {
                info!(name = %clip.name, "Imported clip decoded");
            }
        }
        Err(err) => {
            warn!(name = %clip.name, error = %err, "Imported clip decode failed");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A tiny mono 16-bit WAV, fully in memory
    fn wav_bytes(frames: usize, sample_rate: u32, channels: u16) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut buffer, spec).unwrap();
            for i in 0..frames {
                for _ in 0..channels {
                    let value = ((i % 100) as i16 - 50) * 100;
                    writer.write_sample(value).unwrap();
                }
            }
            writer.finalize().unwrap();
        }
        buffer.into_inner()
    }

    #[test]
    fn decodes_mono_wav_at_engine_rate() {
        let bytes = wav_bytes(500, 22_050, 1);
        let clip = decode_clip(&bytes, 22_050).unwrap();
        assert_eq!(clip.samples.len(), 500);
        assert_eq!(clip.sample_rate, 22_050);
    }

    #[test]
    fn stereo_is_mixed_down() {
        let bytes = wav_bytes(300, 44_100, 2);
        let clip = decode_clip(&bytes, 44_100).unwrap();
        assert_eq!(clip.samples.len(), 300);
    }

    #[test]
    fn non_wav_payload_is_rejected() {
        assert!(matches!(
            decode_clip(b"definitely not audio", 44_100),
            Err(ClipImportError::UnsupportedFormat)
        ));
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let data = vec![0u8; MAX_CLIP_BYTES + 1];
        assert!(matches!(
            decode_clip(&data, 44_100),
            Err(ClipImportError::TooLarge)
        ));
    }

    #[test]
    fn import_derives_duration_in_steps() {
        // 1 second of audio at 120 BPM: step = 125ms -> 8 steps
        let bytes = wav_bytes(22_050, 22_050, 1);
        let clip = import_clip("one-second", bytes, 4, 120).unwrap();
        assert_eq!(clip.duration, 8);
        assert_eq!(clip.start_step, 4);
        assert_eq!(clip.name, "one-second");
    }

    #[test]
    fn slot_rejects_stale_generations() {
        let slot = ClipSlot::new();
        let first = slot.clear();
        let second = slot.clear();

        let decoded = DecodedClip {
            samples: Arc::new(vec![0.0; 4]),
            sample_rate: 44_100,
        };
        assert!(!slot.install(first, decoded.clone()));
        assert!(slot.get().is_none());
        assert!(slot.install(second, decoded));
        assert!(slot.get().is_some());
    }

    #[test]
    fn clear_empties_the_slot() {
        let slot = ClipSlot::new();
        let generation = slot.clear();
        slot.install(
            generation,
            DecodedClip {
                samples: Arc::new(vec![0.1; 8]),
                sample_rate: 44_100,
            },
        );
        assert!(slot.get().is_some());
        slot.clear();
        assert!(slot.get().is_none());
    }
}
