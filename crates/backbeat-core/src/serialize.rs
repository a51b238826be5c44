//! Composition serialization with backward-compatible defaulting

use crate::composition::Composition;
use crate::error::Result;

/// Encode the full aggregate as a deterministic byte buffer.
pub fn encode(composition: &Composition) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(composition)?)
}

/// Decode a buffer produced by `encode` or by an older encoder.
///
/// Fields that did not exist in older buffers (amp settings, piano-roll
/// notes, timeline length, imported audio) fall back to their defaults;
/// anything structurally broken is an error, never a fallback.
pub fn decode(data: &[u8]) -> Result<Composition> {
    let mut composition: Composition = serde_json::from_slice(data)?;
    composition.validate()?;
    composition.normalize();
    Ok(composition)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composition::{
        ChannelKind, GuitarAmpSettings, ImportedClip, PianoRollNote, DEFAULT_TIMELINE_LENGTH,
    };

    fn full_composition() -> Composition {
        let mut composition = Composition::default();
        composition.tempo = 96;
        composition.drum_pattern[0] = [true, false, true];
        composition.bass_notes[3] = Some(40);
        composition.guitar_notes[7] = Some(52);
        composition.channels[1].muted = true;
        composition.guitar_amp.drive = 0.9;
        composition.piano_roll_notes.push(PianoRollNote {
            id: "note-1".into(),
            start_step: 2,
            duration: 4,
            pitch: 64,
            track: 5,
        });
        composition.imported_audio = Some(ImportedClip {
            name: "loop.wav".into(),
            data: vec![1, 2, 3, 4],
            start_step: 8,
            duration: 4,
        });
        composition
    }

    #[test]
    fn round_trip_preserves_everything() {
        let original = full_composition();
        let bytes = encode(&original).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn uses_camel_case_keys() {
        let bytes = encode(&full_composition()).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("\"masterVolume\""));
        assert!(text.contains("\"drumPattern\""));
        assert!(text.contains("\"pianoRollNotes\""));
        assert!(text.contains("\"startStep\""));
        assert!(text.contains("\"importedAudio\""));
    }

    /// A buffer written before amp settings, piano roll, timeline length,
    /// and audio import existed.
    fn legacy_buffer() -> Vec<u8> {
        let channels: Vec<String> = ChannelKind::ALL
            .iter()
            .map(|kind| {
                format!(
                    r#"{{"name":"{}","volume":0.5,"muted":false,"solo":false}}"#,
                    kind.name()
                )
            })
            .collect();
        let nulls = vec!["null"; 16].join(",");
        let drum_rows = vec!["[false,false,false]"; 16].join(",");
        format!(
            r#"{{"tempo":120,"masterVolume":0.7,"channels":[{}],"drumPattern":[{}],"bassNotes":[{}],"synthNotes":[{}],"pianoNotes":[{}],"guitarNotes":[{}],"stringsNotes":[{}]}}"#,
            channels.join(","),
            drum_rows,
            nulls,
            nulls,
            nulls,
            nulls,
            nulls
        )
        .into_bytes()
    }

    #[test]
    fn missing_fields_get_defaults() {
        let decoded = decode(&legacy_buffer()).unwrap();
        assert_eq!(decoded.guitar_amp, GuitarAmpSettings::default());
        assert_eq!(decoded.guitar_amp.master, 0.7);
        assert!(decoded.piano_roll_notes.is_empty());
        assert_eq!(decoded.timeline_length, DEFAULT_TIMELINE_LENGTH);
        assert!(decoded.imported_audio.is_none());
    }

    #[test]
    fn short_grids_are_padded_to_timeline_length() {
        let mut composition = Composition::default();
        composition.bass_notes.truncate(4);
        let bytes = encode(&composition).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.bass_notes.len(), 16);
        assert!(decoded.bass_notes.iter().all(|n| n.is_none()));
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(decode(b"not json at all").is_err());
        assert!(decode(b"{\"tempo\":\"fast\"}").is_err());
    }

    #[test]
    fn wrong_channel_count_is_rejected_not_defaulted() {
        let mut composition = Composition::default();
        composition.channels.truncate(5);
        let bytes = serde_json::to_vec(&composition).unwrap();
        assert!(decode(&bytes).is_err());
    }

    #[test]
    fn present_but_malformed_optional_field_is_an_error() {
        let mut text = String::from_utf8(encode(&Composition::default()).unwrap()).unwrap();
        text = text.replace("\"timelineLength\":16", "\"timelineLength\":\"sixteen\"");
        assert!(decode(text.as_bytes()).is_err());
    }
}
