//! Microphone capture and speech-boundary detection.

mod vad;

pub use vad::{Observation, VoiceActivityDetector};

use crate::audio::{self, AudioFrame};
use crate::config::VadConfig;
use crate::error::VoiceError;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// A microphone, or anything that produces mono audio frames.
#[async_trait]
pub trait AudioSource: Send {
    /// Acquires the device and starts delivering frames.
    ///
    /// Fails with [`VoiceError::PermissionDenied`] or [`VoiceError::DeviceUnavailable`].
    async fn open(&mut self) -> Result<mpsc::Receiver<AudioFrame>, VoiceError>;

    /// Releases the device. Must be idempotent.
    fn close(&mut self);
}

#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    SpeechStart,
    SpeechEnd,
    /// Meter level in [0, 1].
    Volume(f32),
    Frame(AudioFrame),
    /// The frame stream ended without `stop()` being called.
    DeviceLost,
}

pub struct Capture {
    source: Box<dyn AudioSource>,
    config: VadConfig,
    events: mpsc::Sender<CaptureEvent>,
    task: Option<JoinHandle<()>>,
}

impl Capture {
    pub fn new(
        source: Box<dyn AudioSource>,
        config: VadConfig,
        events: mpsc::Sender<CaptureEvent>,
    ) -> Self {
        Self {
            source,
            config,
            events,
            task: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.task.is_some()
    }

    /// Opens the source and starts sampling. A no-op while already active.
    pub async fn start(&mut self) -> Result<(), VoiceError> {
        if self.is_active() {
            tracing::debug!("Capture already active, ignoring start");
            return Ok(());
        }
        let frames = self.source.open().await?;
        tracing::info!("Capture started");
        let config = self.config.clone();
        let events = self.events.clone();
        self.task = Some(tokio::spawn(run(frames, config, events)));
        Ok(())
    }

    /// Stops sampling and releases the device. Safe to call repeatedly.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            tracing::info!("Capture stopped");
        }
        self.source.close();
    }
}

impl Drop for Capture {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run(
    mut frames: mpsc::Receiver<AudioFrame>,
    config: VadConfig,
    events: mpsc::Sender<CaptureEvent>,
) {
    let mut vad = VoiceActivityDetector::new(&config);
    let silence = tokio::time::sleep(config.silence_timeout);
    tokio::pin!(silence);
    let mut silence_armed = false;

    loop {
        tokio::select! {
            frame = frames.recv() => {
                let Some(frame) = frame else {
                    tracing::warn!("Capture stream ended unexpectedly");
                    let _ = events.send(CaptureEvent::DeviceLost).await;
                    break;
                };
                let energy = audio::rms(&frame.samples);
                let observation = vad.observe(energy);
                if events.send(CaptureEvent::Volume(audio::meter_level(energy))).await.is_err() {
                    break;
                }
                if observation.started {
                    tracing::debug!("Speech started (energy {:.4})", energy);
                    let _ = events.send(CaptureEvent::SpeechStart).await;
                }
                if vad.is_speaking() {
                    if observation.voiced {
                        silence_armed = false;
                    } else if !silence_armed {
                        silence.as_mut().reset(Instant::now() + config.silence_timeout);
                        silence_armed = true;
                    }
                }
                if events.send(CaptureEvent::Frame(frame)).await.is_err() {
                    break;
                }
            }
            () = &mut silence, if silence_armed => {
                silence_armed = false;
                if vad.end_speech() {
                    tracing::debug!("Speech ended after {:?} of silence", config.silence_timeout);
                    let _ = events.send(CaptureEvent::SpeechEnd).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeMicrophone, MicControl};
    use std::time::Duration;

    fn capture(control: &MicControl) -> (Capture, mpsc::Receiver<CaptureEvent>) {
        let (tx, rx) = mpsc::channel(256);
        let source = FakeMicrophone::new(control.clone());
        (Capture::new(Box::new(source), VadConfig::default(), tx), rx)
    }

    async fn next_boundary(rx: &mut mpsc::Receiver<CaptureEvent>) -> CaptureEvent {
        loop {
            match rx.recv().await.expect("capture events closed") {
                CaptureEvent::Volume(_) | CaptureEvent::Frame(_) => continue,
                other => return other,
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn silence_timeout_ends_speech() {
        let control = MicControl::default();
        let (mut capture, mut rx) = capture(&control);
        capture.start().await.unwrap();

        control.speak(0.3, 5).await;
        assert_eq!(next_boundary(&mut rx).await, CaptureEvent::SpeechStart);

        let quiet_at = Instant::now();
        control.speak(0.0, 1).await;
        assert_eq!(next_boundary(&mut rx).await, CaptureEvent::SpeechEnd);
        assert!(quiet_at.elapsed() >= Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn voiced_frame_resets_silence_timer() {
        let control = MicControl::default();
        let (mut capture, mut rx) = capture(&control);
        capture.start().await.unwrap();

        control.speak(0.3, 2).await;
        assert_eq!(next_boundary(&mut rx).await, CaptureEvent::SpeechStart);

        control.speak(0.0, 1).await;
        tokio::time::sleep(Duration::from_millis(1000)).await;
        control.speak(0.3, 1).await;
        let resumed = Instant::now();
        control.speak(0.0, 1).await;

        assert_eq!(next_boundary(&mut rx).await, CaptureEvent::SpeechEnd);
        assert!(resumed.elapsed() >= Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn volume_is_reported_per_frame() {
        let control = MicControl::default();
        let (mut capture, mut rx) = capture(&control);
        capture.start().await.unwrap();

        control.speak(1.0, 1).await;
        match rx.recv().await.unwrap() {
            CaptureEvent::Volume(level) => assert!((level - 1.0).abs() < 1e-3),
            other => panic!("expected volume, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn permission_denied_is_reported_and_nothing_starts() {
        let control = MicControl::default();
        control.fail_with(VoiceError::PermissionDenied("user declined".into()));
        let (mut capture, _rx) = capture(&control);

        let err = capture.start().await.unwrap_err();
        assert!(matches!(err, VoiceError::PermissionDenied(_)));
        assert!(!capture.is_active());
    }

    #[tokio::test]
    async fn start_is_idempotent_and_stop_releases_device() {
        let control = MicControl::default();
        let (mut capture, _rx) = capture(&control);

        capture.start().await.unwrap();
        capture.start().await.unwrap();
        assert_eq!(control.opens(), 1);

        capture.stop();
        capture.stop();
        assert!(!control.is_open());
        assert_eq!(control.closes(), 1);
    }

    #[tokio::test]
    async fn lost_device_is_reported() {
        let control = MicControl::default();
        let (mut capture, mut rx) = capture(&control);
        capture.start().await.unwrap();

        control.unplug();
        assert_eq!(next_boundary(&mut rx).await, CaptureEvent::DeviceLost);
    }
}
