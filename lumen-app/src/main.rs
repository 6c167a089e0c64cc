//! Lumen - light stick transmission demo
//!
//! Wires the engine to a console device link. With a `.efx` file argument
//! it plays the timeline through the position poller; without one it
//! streams live audio input through the spectrum analyzer.

mod config;
mod console;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleFormat;
use tracing_subscriber::EnvFilter;

use config::AppConfig;
use console::{ConsoleLink, ConsolePayloadBuilder};
use lumen_analysis::{SpectrumAnalyzer, DEFAULT_WINDOW_SIZE};
use lumen_control::{TransmissionCoordinator, TransmissionMonitor};
use lumen_engine::EffectEngine;
use lumen_link::{DeviceLink, Rgb};
use lumen_timeline::TimelineLoader;

/// Position poll interval for timeline playback
const POLL_INTERVAL: Duration = Duration::from_millis(100);

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let policy = AppConfig::load().to_policy();

    let link = Arc::new(ConsoleLink::new(&["stick-1"]));
    let monitor = Arc::new(TransmissionMonitor::new(&policy));
    let coordinator = Arc::new(TransmissionCoordinator::new(Arc::clone(&monitor), &policy));
    let engine = Arc::new(EffectEngine::new(
        Arc::clone(&link) as Arc<dyn DeviceLink>,
        Arc::new(ConsolePayloadBuilder),
        Arc::clone(&coordinator),
        Arc::clone(&monitor),
        &policy,
    ));

    // Log arbitration outcomes as they happen
    let events = coordinator.subscribe();
    thread::spawn(move || {
        for event in events.iter() {
            tracing::info!(?event, "control");
        }
    });

    // Connection confirmation: exclusive session, no interleaving
    if let Some(task) = Arc::clone(&engine).play_connection_effect(Rgb::new(0, 128, 255)) {
        task.wait();
    }

    let result = match std::env::args().nth(1) {
        Some(path) => run_timeline(&engine, &PathBuf::from(path)),
        None => run_live_audio(&engine),
    };

    tracing::info!(
        total = monitor.history(usize::MAX).len(),
        "transmissions recorded"
    );
    result
}

/// Drive timeline playback with a 100 ms position poller
fn run_timeline(engine: &Arc<EffectEngine>, path: &Path) -> anyhow::Result<()> {
    let timeline =
        TimelineLoader::load(path).with_context(|| format!("loading {}", path.display()))?;
    let end_ms = timeline
        .entries()
        .last()
        .map(|e| e.timestamp_ms)
        .unwrap_or(0);
    tracing::info!(entries = timeline.len(), end_ms, "playing timeline");
    engine.load_timeline(timeline);

    let start = Instant::now();
    let ticker = crossbeam_channel::tick(POLL_INTERVAL);
    while ticker.recv().is_ok() {
        let position = start.elapsed().as_millis() as u32;
        engine.update_position(position);
        if position > end_ms.saturating_add(1_000) {
            break;
        }
    }
    engine.reset();
    Ok(())
}

/// Stream live audio input through the analyzer into the engine
fn run_live_audio(engine: &Arc<EffectEngine>) -> anyhow::Result<()> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .context("no audio input device found")?;
    let supported = device.default_input_config()?;
    let channels = supported.channels() as usize;
    let stream_config: cpal::StreamConfig = supported.config();

    let err_fn = |err| tracing::error!(error = %err, "audio stream error");

    let stream = match supported.sample_format() {
        SampleFormat::F32 => {
            let mut analyzer = SpectrumAnalyzer::new(DEFAULT_WINDOW_SIZE);
            let mut window: Vec<i16> = Vec::with_capacity(DEFAULT_WINDOW_SIZE);
            let engine = Arc::clone(engine);
            device.build_input_stream(
                &stream_config,
                move |data: &[f32], _| {
                    for frame in data.chunks(channels) {
                        let mono: f32 = frame.iter().sum::<f32>() / channels as f32;
                        window.push((mono.clamp(-1.0, 1.0) * i16::MAX as f32) as i16);
                        if window.len() == DEFAULT_WINDOW_SIZE {
                            let band = analyzer.process(&window);
                            engine.process_spectrum(band);
                            window.clear();
                        }
                    }
                },
                err_fn,
                None,
            )?
        }
        SampleFormat::I16 => {
            let mut analyzer = SpectrumAnalyzer::new(DEFAULT_WINDOW_SIZE);
            let mut window: Vec<i16> = Vec::with_capacity(DEFAULT_WINDOW_SIZE);
            let engine = Arc::clone(engine);
            device.build_input_stream(
                &stream_config,
                move |data: &[i16], _| {
                    for frame in data.chunks(channels) {
                        let mono: i32 =
                            frame.iter().map(|&s| s as i32).sum::<i32>() / channels as i32;
                        window.push(mono as i16);
                        if window.len() == DEFAULT_WINDOW_SIZE {
                            let band = analyzer.process(&window);
                            engine.process_spectrum(band);
                            window.clear();
                        }
                    }
                },
                err_fn,
                None,
            )?
        }
        other => anyhow::bail!("unsupported sample format: {other:?}"),
    };

    stream.play()?;
    println!("streaming live audio; press Enter to quit");
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(())
}
