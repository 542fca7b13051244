//! Audio output sink with start/stop and end-of-playback notification.
//!
//! [`CpalSink`] plays mono f32 samples through the system output device
//! via cpal. Playback runs on a dedicated thread so callers never block;
//! the end callback fires exactly once on natural completion and is
//! suppressed when playback is stopped early.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::StreamConfig;
use tracing::{error, info};

use crate::config::AudioConfig;
use crate::error::{AssistError, Result};

/// Callback invoked once when playback reaches its natural end.
pub type EndCallback = Box<dyn FnOnce() + Send>;

/// An audio output stream the playback coordinator can drive.
///
/// At most one playback is active per sink; `start` tears down any
/// previous one. `stop` halts playback and suppresses the halted
/// request's end callback.
pub trait AudioSink: Send + Sync {
    /// Begin playing `samples`, invoking `on_end` at natural completion.
    ///
    /// # Errors
    ///
    /// Returns an error if the output stream cannot be created.
    fn start(&self, samples: Vec<f32>, on_end: EndCallback) -> Result<()>;

    /// Halt any in-progress playback. The halted playback's `on_end` does
    /// not fire. No-op when nothing is playing.
    fn stop(&self);
}

/// cpal-backed output sink.
pub struct CpalSink {
    config: AudioConfig,
    /// Stop flag of the active playback thread, if one is running.
    active: Mutex<Option<Arc<AtomicBool>>>,
}

impl CpalSink {
    /// Create a sink for the configured output device.
    pub fn new(config: AudioConfig) -> Self {
        Self {
            config,
            active: Mutex::new(None),
        }
    }

    /// List available output device names.
    ///
    /// # Errors
    ///
    /// Returns an error if devices cannot be enumerated.
    pub fn list_output_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .output_devices()
            .map_err(|e| AssistError::Audio(format!("cannot enumerate devices: {e}")))?;

        let mut names = Vec::new();
        for device in devices {
            if let Ok(desc) = device.description() {
                names.push(desc.name().to_owned());
            }
        }
        Ok(names)
    }

    fn set_active(&self, flag: Option<Arc<AtomicBool>>) -> Option<Arc<AtomicBool>> {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::replace(&mut *active, flag)
    }
}

impl AudioSink for CpalSink {
    fn start(&self, samples: Vec<f32>, on_end: EndCallback) -> Result<()> {
        // Tear down any previous playback first.
        self.stop();

        let stopped = Arc::new(AtomicBool::new(false));
        self.set_active(Some(Arc::clone(&stopped)));

        // cpal streams are !Send, so the stream is built and owned by the
        // playback thread; a rendezvous channel reports whether the
        // device opened so callers still get a synchronous error.
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<()>>();
        let config = self.config.clone();

        std::thread::spawn(move || {
            run_playback(config, samples, stopped, on_end, &ready_tx);
        });

        ready_rx
            .recv()
            .unwrap_or_else(|_| Err(AssistError::Audio("playback thread died".into())))
    }

    fn stop(&self) {
        if let Some(flag) = self.set_active(None) {
            flag.store(true, Ordering::Relaxed);
        }
    }
}

/// Internal buffer for tracking playback progress.
struct PlaybackBuffer {
    samples: Vec<f32>,
    position: usize,
    finished: bool,
}

/// Build the output stream, play the samples, and fire `on_end` once the
/// buffer drains — unless `stopped` is raised first.
fn run_playback(
    config: AudioConfig,
    samples: Vec<f32>,
    stopped: Arc<AtomicBool>,
    on_end: EndCallback,
    ready_tx: &std::sync::mpsc::Sender<Result<()>>,
) {
    let stream = match build_output_stream(&config, samples) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };
    let (stream, buffer) = stream;

    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(AssistError::Audio(format!(
            "failed to start output stream: {e}"
        ))));
        return;
    }
    let _ = ready_tx.send(Ok(()));

    loop {
        std::thread::sleep(std::time::Duration::from_millis(10));
        if stopped.load(Ordering::Relaxed) {
            // Halted early: drop the stream without notifying.
            return;
        }
        let finished = buffer
            .lock()
            .map(|buf| buf.finished)
            .unwrap_or(true);
        if finished {
            break;
        }
    }

    drop(stream);
    if !stopped.load(Ordering::Relaxed) {
        on_end();
    }
}

type StreamAndBuffer = (cpal::Stream, Arc<Mutex<PlaybackBuffer>>);

/// Open the configured output device and build a stream that drains the
/// sample buffer.
fn build_output_stream(config: &AudioConfig, samples: Vec<f32>) -> Result<StreamAndBuffer> {
    let host = cpal::default_host();

    let device = if let Some(ref name) = config.output_device {
        host.output_devices()
            .map_err(|e| AssistError::Audio(format!("cannot enumerate devices: {e}")))?
            .find(|d| {
                d.description()
                    .ok()
                    .map(|desc| desc.name() == name)
                    .unwrap_or(false)
            })
            .ok_or_else(|| AssistError::Audio(format!("output device '{name}' not found")))?
    } else {
        host.default_output_device()
            .ok_or_else(|| AssistError::Audio("no default output device".into()))?
    };

    let device_name = device
        .description()
        .map(|d| d.name().to_owned())
        .unwrap_or_else(|_| "<unknown>".into());
    info!("using output device: {device_name}");

    let stream_config = StreamConfig {
        channels: config.output_channels,
        sample_rate: config.output_sample_rate,
        buffer_size: cpal::BufferSize::Default,
    };

    let buffer = Arc::new(Mutex::new(PlaybackBuffer {
        samples,
        position: 0,
        finished: false,
    }));
    let buffer_clone = Arc::clone(&buffer);

    let stream = device
        .build_output_stream(
            &stream_config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                let mut buf = match buffer_clone.lock() {
                    Ok(b) => b,
                    Err(_) => return,
                };

                for sample in data.iter_mut() {
                    if buf.position < buf.samples.len() {
                        *sample = buf.samples[buf.position];
                        buf.position += 1;
                    } else {
                        *sample = 0.0;
                        buf.finished = true;
                    }
                }
            },
            move |err| {
                error!("audio output stream error: {err}");
            },
            None,
        )
        .map_err(|e| AssistError::Audio(format!("failed to build output stream: {e}")))?;

    Ok((stream, buffer))
}
