//! backbeat-cli: headless driver for the backbeat engine
//!
//! Builds a demo composition, round-trips it through the store the way
//! the composer UI would on save/load, then plays it for a few loop
//! passes on the default output device.

use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use backbeat_core::{decode, encode, step_duration_ms, Composition};
use backbeat_services::{AudioEngine, CompositionStore, FsStore};

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("backbeat=info".parse()?),
        )
        .init();

    tracing::info!("Starting backbeat");

    let composition = demo_composition();

    let mut store = FsStore::open(std::env::temp_dir().join("backbeat-demo"))
        .context("opening composition store")?;
    let id = store.save("demo", &encode(&composition)?)?;
    let composition = decode(&store.load(id)?)?;
    tracing::info!(id, "Loaded demo composition from store");

    let mut engine = AudioEngine::new(44_100);
    engine.set_composition(composition.clone());
    engine.start().context("starting audio engine")?;
    engine.toggle_playback();

    let loop_ms = step_duration_ms(composition.tempo) * composition.timeline_length as f64;
    thread::sleep(Duration::from_millis((loop_ms * 4.0) as u64));

    engine.toggle_playback();
    // Let the tail of the last voices ring out before teardown
    thread::sleep(Duration::from_millis(800));
    engine.stop()?;

    Ok(())
}

/// A four-on-the-floor pattern with a bass line and one guitar stab
fn demo_composition() -> Composition {
    let mut composition = Composition::default();
    for step in 0..16 {
        composition.drum_pattern[step][0] = step % 4 == 0;
        composition.drum_pattern[step][2] = step % 2 == 0;
    }
    composition.drum_pattern[4][1] = true;
    composition.drum_pattern[12][1] = true;
    composition.bass_notes[0] = Some(36);
    composition.bass_notes[6] = Some(39);
    composition.bass_notes[8] = Some(43);
    composition.guitar_notes[2] = Some(52);
    composition.guitar_amp.drive = 0.7;
    composition
}
