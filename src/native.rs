//! Microphone and speaker backed by the host's default audio stack.
//!
//! cpal streams are not `Send`, so each one lives on its own thread and is dropped there.

use crate::audio::{AudioClip, AudioFrame};
use crate::capture::AudioSource;
use crate::error::VoiceError;
use crate::playback::AudioSink;
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FrameCount, StreamConfig};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::HeapProd;
use rubato::Resampler;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc, Mutex, PoisonError};
use std::thread;
use tokio::sync::{mpsc, oneshot, Notify};
use voice_duplex_types::audio::DEFAULT_SAMPLE_RATE;
use voice_duplex_utils::{audio, device};

const INPUT_CHUNK_SIZE: usize = 1024;
const OUTPUT_CHUNK_SIZE: usize = 1024;
const RESAMPLE_CHUNK_SIZE: usize = 1024;
const OUTPUT_BUFFER_SECS: usize = 30;
const FRAME_QUEUE: usize = 64;

enum Signal {
    Stop,
    Failed(String),
}

fn device_error(error: impl std::fmt::Display) -> VoiceError {
    let message = error.to_string();
    let lowered = message.to_lowercase();
    if lowered.contains("permission") || lowered.contains("denied") {
        VoiceError::PermissionDenied(message)
    } else {
        VoiceError::DeviceUnavailable(message)
    }
}

/// Default (or named) input device, downmixed and resampled to the backend rate.
pub struct CpalMicrophone {
    device_name: Option<String>,
    sample_rate: u32,
    stop: Option<std_mpsc::Sender<Signal>>,
}

impl CpalMicrophone {
    pub fn new(device_name: Option<&str>) -> Self {
        Self {
            device_name: device_name.map(str::to_string),
            sample_rate: DEFAULT_SAMPLE_RATE,
            stop: None,
        }
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }
}

#[async_trait]
impl AudioSource for CpalMicrophone {
    async fn open(&mut self) -> Result<mpsc::Receiver<AudioFrame>, VoiceError> {
        self.close();
        let (frames_tx, frames_rx) = mpsc::channel(FRAME_QUEUE);
        let (ready_tx, ready_rx) = oneshot::channel();
        let (signal_tx, signal_rx) = std_mpsc::channel();
        let device_name = self.device_name.clone();
        let target_rate = self.sample_rate;
        let errors = signal_tx.clone();

        thread::Builder::new()
            .name("voice-capture".to_string())
            .spawn(move || {
                let opened = build_input(device_name.as_deref(), target_rate, frames_tx, errors);
                let stream = match opened {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                match signal_rx.recv() {
                    Ok(Signal::Failed(reason)) => {
                        tracing::error!("Input stream failed: {}", reason)
                    }
                    Ok(Signal::Stop) | Err(_) => tracing::debug!("Input stream stopping"),
                }
                drop(stream);
            })
            .map_err(device_error)?;

        ready_rx
            .await
            .map_err(|_| VoiceError::DeviceUnavailable("capture thread exited".to_string()))??;
        self.stop = Some(signal_tx);
        Ok(frames_rx)
    }

    fn close(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(Signal::Stop);
        }
    }
}

impl Drop for CpalMicrophone {
    fn drop(&mut self) {
        self.close();
    }
}

fn build_input(
    device_name: Option<&str>,
    target_rate: u32,
    frames: mpsc::Sender<AudioFrame>,
    errors: std_mpsc::Sender<Signal>,
) -> Result<cpal::Stream, VoiceError> {
    let input = device::get_or_default_input(device_name).map_err(device_error)?;
    let supported = input.default_input_config().map_err(device_error)?;
    let config = StreamConfig {
        channels: supported.channels(),
        sample_rate: supported.sample_rate(),
        buffer_size: cpal::BufferSize::Fixed(FrameCount::from(INPUT_CHUNK_SIZE as u32)),
    };
    let channels = config.channels as usize;
    let input_rate = config.sample_rate.0;
    tracing::info!(
        "input: device={:?}, config={:?}",
        input.name().unwrap_or_default(),
        &config
    );

    let mut resampler = if input_rate == target_rate {
        None
    } else {
        Some(
            audio::create_resampler(input_rate as f64, target_rate as f64, INPUT_CHUNK_SIZE)
                .map_err(device_error)?,
        )
    };
    let mut pending: VecDeque<f32> = VecDeque::with_capacity(INPUT_CHUNK_SIZE * 2);

    let on_data = move |data: &[f32], _: &cpal::InputCallbackInfo| {
        let mono = audio::downmix(data, channels);
        let samples = match resampler.as_mut() {
            None => mono,
            Some(resampler) => {
                pending.extend(mono);
                let mut resampled = Vec::new();
                while pending.len() >= resampler.input_frames_next() {
                    let block: Vec<f32> = pending.drain(..resampler.input_frames_next()).collect();
                    if let Ok(out) = resampler.process(&[block.as_slice()], None) {
                        if let Some(out) = out.first() {
                            resampled.extend_from_slice(out);
                        }
                    }
                }
                resampled
            }
        };
        if samples.is_empty() {
            return;
        }
        if let Err(e) = frames.try_send(AudioFrame::new(samples, target_rate)) {
            tracing::warn!("Dropping captured frame: {}", e);
        }
    };

    let stream = input
        .build_input_stream(
            &config,
            on_data,
            move |err| {
                let _ = errors.send(Signal::Failed(err.to_string()));
            },
            None,
        )
        .map_err(device_error)?;
    stream.play().map_err(device_error)?;
    Ok(stream)
}

/// Default (or named) output device fed through a ring buffer.
pub struct CpalSpeaker {
    producer: Mutex<HeapProd<f32>>,
    flush: Arc<AtomicBool>,
    stopped: Notify,
    output_rate: u32,
    shutdown: std_mpsc::Sender<Signal>,
}

impl CpalSpeaker {
    /// Opens the output device. Blocks until the stream is playing.
    pub fn new(device_name: Option<&str>) -> Result<Self, VoiceError> {
        let (ready_tx, ready_rx) = std_mpsc::sync_channel(1);
        let (shutdown_tx, shutdown_rx) = std_mpsc::channel();
        let errors = shutdown_tx.clone();
        let flush = Arc::new(AtomicBool::new(false));
        let device_name = device_name.map(str::to_string);
        let thread_flush = flush.clone();

        thread::Builder::new()
            .name("voice-playback".to_string())
            .spawn(move || {
                let (stream, producer, output_rate) =
                    match build_output(device_name.as_deref(), thread_flush, errors) {
                        Ok(opened) => opened,
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };
                let _ = ready_tx.send(Ok((producer, output_rate)));
                if let Ok(Signal::Failed(reason)) = shutdown_rx.recv() {
                    tracing::error!("Output stream failed: {}", reason);
                }
                drop(stream);
            })
            .map_err(device_error)?;

        let (producer, output_rate) = ready_rx
            .recv()
            .map_err(|_| VoiceError::DeviceUnavailable("playback thread exited".to_string()))??;
        Ok(Self {
            producer: Mutex::new(producer),
            flush,
            stopped: Notify::new(),
            output_rate,
            shutdown: shutdown_tx,
        })
    }

    fn resample(&self, clip: &AudioClip) -> Result<Vec<f32>, VoiceError> {
        let samples = clip.samples();
        if clip.sample_rate == self.output_rate {
            return Ok(samples);
        }
        let mut resampler = audio::create_resampler(
            clip.sample_rate as f64,
            self.output_rate as f64,
            RESAMPLE_CHUNK_SIZE,
        )
        .map_err(|e| VoiceError::PlaybackFailed(e.to_string()))?;
        let mut out = Vec::with_capacity(samples.len());
        for block in audio::split_for_chunks(&samples, resampler.input_frames_next()) {
            let resampled = resampler
                .process(&[block.as_slice()], None)
                .map_err(|e| VoiceError::PlaybackFailed(e.to_string()))?;
            if let Some(resampled) = resampled.first() {
                out.extend_from_slice(resampled);
            }
        }
        Ok(out)
    }
}

impl Drop for CpalSpeaker {
    fn drop(&mut self) {
        let _ = self.shutdown.send(Signal::Stop);
    }
}

#[async_trait]
impl AudioSink for CpalSpeaker {
    async fn play(&self, clip: AudioClip) -> Result<(), VoiceError> {
        let samples = self.resample(&clip)?;
        let stopped = self.stopped.notified();
        tokio::pin!(stopped);
        stopped.as_mut().enable();

        let pushed = self
            .producer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_slice(&samples);
        if pushed < samples.len() {
            tracing::warn!("Output buffer full, dropped {} samples", samples.len() - pushed);
        }

        tokio::select! {
            _ = tokio::time::sleep(clip.duration()) => {}
            _ = stopped => tracing::debug!("Playback stopped mid-clip"),
        }
        Ok(())
    }

    fn stop(&self) {
        self.flush.store(true, Ordering::Release);
        self.stopped.notify_waiters();
    }
}

type OpenedOutput = (cpal::Stream, HeapProd<f32>, u32);

fn build_output(
    device_name: Option<&str>,
    flush: Arc<AtomicBool>,
    errors: std_mpsc::Sender<Signal>,
) -> Result<OpenedOutput, VoiceError> {
    let output = device::get_or_default_output(device_name).map_err(device_error)?;
    let supported = output.default_output_config().map_err(device_error)?;
    let config = StreamConfig {
        channels: supported.channels(),
        sample_rate: supported.sample_rate(),
        buffer_size: cpal::BufferSize::Fixed(FrameCount::from(OUTPUT_CHUNK_SIZE as u32)),
    };
    let channels = config.channels as usize;
    let output_rate = config.sample_rate.0;
    tracing::info!(
        "output: device={:?}, config={:?}",
        output.name().unwrap_or_default(),
        &config
    );

    let buffer = audio::shared_buffer(output_rate as usize * OUTPUT_BUFFER_SECS);
    let (producer, mut consumer) = buffer.split();

    let on_data = move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
        if flush.swap(false, Ordering::AcqRel) {
            consumer.clear();
        }
        for frame in data.chunks_mut(channels) {
            let sample = consumer.try_pop().unwrap_or(0.0);
            frame.fill(sample);
        }
    };

    let stream = output
        .build_output_stream(
            &config,
            on_data,
            move |err| {
                let _ = errors.send(Signal::Failed(err.to_string()));
            },
            None,
        )
        .map_err(device_error)?;
    stream.play().map_err(device_error)?;
    Ok((stream, producer, output_rate))
}
