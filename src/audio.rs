use base64::Engine;
use voice_duplex_types::audio::Base64EncodedAudioBytes;

/// One block of captured mono audio.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Little-endian PCM16 bytes, as streamed to the speech backend.
    pub fn to_pcm16(&self) -> Vec<u8> {
        encode_pcm16(&self.samples)
    }
}

/// Synthesized audio for one sentence chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    pub pcm16: Vec<u8>,
    pub sample_rate: u32,
}

impl AudioClip {
    pub fn new(pcm16: Vec<u8>, sample_rate: u32) -> Self {
        Self { pcm16, sample_rate }
    }

    pub fn from_base64(audio: &Base64EncodedAudioBytes, sample_rate: u32) -> Option<Self> {
        match base64::engine::general_purpose::STANDARD.decode(audio) {
            Ok(pcm16) => Some(Self::new(pcm16, sample_rate)),
            Err(e) => {
                tracing::error!("Failed to decode base64 audio: {}", e);
                None
            }
        }
    }

    pub fn samples(&self) -> Vec<f32> {
        decode_pcm16(&self.pcm16)
    }

    pub fn duration(&self) -> std::time::Duration {
        if self.sample_rate == 0 {
            return std::time::Duration::ZERO;
        }
        let frames = (self.pcm16.len() / 2) as f64;
        std::time::Duration::from_secs_f64(frames / self.sample_rate as f64)
    }
}

pub fn encode_pcm16(samples: &[f32]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|&sample| {
            ((sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16).to_le_bytes()
        })
        .collect()
}

pub fn decode_pcm16(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|chunk| {
            let v = i16::from_le_bytes([chunk[0], chunk[1]]);
            (v as f32 / i16::MAX as f32).clamp(-1.0, 1.0)
        })
        .collect()
}

/// Root-mean-square energy of a block of samples.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

const METER_FLOOR_DB: f32 = -60.0;

/// Maps RMS energy onto a [0, 1] meter over -60 dBFS..0 dBFS.
pub fn meter_level(rms: f32) -> f32 {
    if rms <= 0.0 {
        return 0.0;
    }
    let db = 20.0 * rms.log10();
    ((db - METER_FLOOR_DB) / -METER_FLOOR_DB).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcm16_keeps_sign_and_scale() {
        let bytes = encode_pcm16(&[0.0, 1.0, -1.0, 0.5]);
        assert_eq!(bytes.len(), 8);
        let decoded = decode_pcm16(&bytes);
        assert_eq!(decoded[0], 0.0);
        assert!((decoded[1] - 1.0).abs() < 1e-4);
        assert!((decoded[2] + 1.0).abs() < 1e-4);
        assert!((decoded[3] - 0.5).abs() < 1e-3);
    }

    #[test]
    fn out_of_range_samples_are_clamped() {
        let decoded = decode_pcm16(&encode_pcm16(&[3.0, -3.0]));
        assert!((decoded[0] - 1.0).abs() < 1e-4);
        assert!((decoded[1] + 1.0).abs() < 1e-4);
    }

    #[test]
    fn meter_spans_zero_to_one() {
        assert_eq!(meter_level(0.0), 0.0);
        assert_eq!(meter_level(0.0001), 0.0);
        assert!((meter_level(1.0) - 1.0).abs() < 1e-6);
        let mid = meter_level(rms(&[0.03; 160]));
        assert!(mid > 0.3 && mid < 0.9, "mid level was {}", mid);
    }

    #[test]
    fn clip_duration_follows_sample_rate() {
        let clip = AudioClip::new(vec![0; 32_000], 16_000);
        assert_eq!(clip.duration(), std::time::Duration::from_secs(1));
    }

    #[test]
    fn invalid_base64_is_rejected() {
        assert!(AudioClip::from_base64(&"***".to_string(), 16_000).is_none());
        let clip = AudioClip::from_base64(&"AAAA".to_string(), 16_000).unwrap();
        assert_eq!(clip.pcm16, vec![0, 0, 0]);
    }
}
