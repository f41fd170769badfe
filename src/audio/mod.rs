//! Audio capture and playback.
//!
//! Capture produces fixed-size frames of 16 kHz mono s16le PCM, base64-coded
//! the way the realtime session expects. Playback decodes 24 kHz PCM chunks
//! and schedules them gaplessly against a monotonic sample clock.

pub mod capture;
pub mod playback;

use crate::error::{BridgeError, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

/// One fixed-size chunk of encoded microphone audio bound for the session.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Base64-coded little-endian 16-bit PCM.
    pub payload: String,
}

impl AudioFrame {
    /// Encode f32 samples in \[-1, 1\] as an outbound frame.
    #[must_use]
    pub fn from_samples(samples: &[f32]) -> Self {
        let mut pcm = Vec::with_capacity(samples.len() * 2);
        for &s in samples {
            let v = (s.clamp(-1.0, 1.0) * 32767.0) as i16;
            pcm.extend_from_slice(&v.to_le_bytes());
        }
        Self {
            payload: BASE64.encode(pcm),
        }
    }
}

/// Decode a base64 chunk of little-endian 16-bit PCM to f32 samples.
///
/// # Errors
///
/// Returns an error if the payload is not valid base64 or has an odd byte
/// count.
pub fn decode_pcm_chunk(payload: &str) -> Result<Vec<f32>> {
    let bytes = BASE64
        .decode(payload)
        .map_err(|e| BridgeError::Transport(format!("bad audio payload: {e}")))?;
    if bytes.len() % 2 != 0 {
        return Err(BridgeError::Transport(
            "bad audio payload: odd byte count".into(),
        ));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|b| f32::from(i16::from_le_bytes([b[0], b[1]])) / 32768.0)
        .collect())
}

/// Accumulates capture samples and emits exactly `frame_samples`-sized frames.
///
/// Carries the remainder across pushes so frame boundaries never drop or
/// duplicate samples, preserving capture order.
pub struct FrameChunker {
    frame_samples: usize,
    pending: Vec<f32>,
}

impl FrameChunker {
    #[must_use]
    pub fn new(frame_samples: usize) -> Self {
        Self {
            frame_samples,
            pending: Vec::with_capacity(frame_samples),
        }
    }

    /// Push captured samples; returns zero or more complete frames.
    pub fn push(&mut self, samples: &[f32]) -> Vec<AudioFrame> {
        self.pending.extend_from_slice(samples);
        let mut frames = Vec::new();
        while self.pending.len() >= self.frame_samples {
            let rest = self.pending.split_off(self.frame_samples);
            frames.push(AudioFrame::from_samples(&self.pending));
            self.pending = rest;
        }
        frames
    }
}

/// Convert interleaved multi-channel audio to mono by averaging channels.
pub(crate) fn to_mono(data: &[f32], channels: u16) -> Vec<f32> {
    let ch = channels as usize;
    data.chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}

/// Simple linear-interpolation downsampler.
///
/// For speech (48kHz → 16kHz) this is sufficient quality — no anti-alias
/// filter needed since human speech energy is below 8kHz.
pub(crate) fn downsample(samples: &[f32], src_rate: u32, dst_rate: u32) -> Vec<f32> {
    if src_rate == dst_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = src_rate as f64 / dst_rate as f64;
    let out_len = (samples.len() as f64 / ratio) as usize;
    let mut output = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let src_pos = i as f64 * ratio;
        let idx = src_pos as usize;
        let frac = src_pos - idx as f64;

        let sample = if idx + 1 < samples.len() {
            samples[idx] as f64 * (1.0 - frac) + samples[idx + 1] as f64 * frac
        } else {
            samples[idx.min(samples.len() - 1)] as f64
        };

        output.push(sample as f32);
    }

    output
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn frame_roundtrips_through_pcm() {
        let samples = vec![0.0, 0.5, -0.5, 1.0, -1.0];
        let frame = AudioFrame::from_samples(&samples);
        let decoded = decode_pcm_chunk(&frame.payload).unwrap();
        assert_eq!(decoded.len(), samples.len());
        for (a, b) in samples.iter().zip(&decoded) {
            assert!((a - b).abs() < 0.001, "{a} vs {b}");
        }
    }

    #[test]
    fn encode_clamps_out_of_range() {
        let frame = AudioFrame::from_samples(&[2.0, -2.0]);
        let decoded = decode_pcm_chunk(&frame.payload).unwrap();
        assert!(decoded[0] > 0.99);
        assert!(decoded[1] < -0.99);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode_pcm_chunk("not base64!!!").is_err());
        // Three bytes: valid base64, odd PCM length.
        assert!(decode_pcm_chunk(&BASE64.encode([1u8, 2, 3])).is_err());
    }

    #[test]
    fn chunker_emits_fixed_frames_in_order() {
        let mut chunker = FrameChunker::new(4);
        assert!(chunker.push(&[0.1, 0.2]).is_empty());

        // Completes one frame and leaves one sample pending.
        let frames = chunker.push(&[0.3, 0.4, 0.5]);
        assert_eq!(frames.len(), 1);
        let first = decode_pcm_chunk(&frames[0].payload).unwrap();
        assert!((first[0] - 0.1).abs() < 0.001);
        assert!((first[3] - 0.4).abs() < 0.001);

        // Pending sample leads the next frame: no loss, no reorder.
        let frames = chunker.push(&[0.6, 0.7, 0.8]).remove(0);
        let second = decode_pcm_chunk(&frames.payload).unwrap();
        assert!((second[0] - 0.5).abs() < 0.001);
    }

    #[test]
    fn downsample_halves_length() {
        let samples: Vec<f32> = (0..320).map(|i| (i as f32 / 320.0).sin()).collect();
        let out = downsample(&samples, 32_000, 16_000);
        assert_eq!(out.len(), 160);
    }

    #[test]
    fn to_mono_averages_channels() {
        let stereo = [1.0, 0.0, 0.5, 0.5];
        assert_eq!(to_mono(&stereo, 2), vec![0.5, 0.5]);
    }
}
