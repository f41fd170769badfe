//! Microphone audio capture using cpal.
//!
//! Captures at the device's native sample rate, downsamples to 16kHz mono,
//! and emits fixed-size encoded frames for the realtime session.

use crate::audio::{AudioFrame, FrameChunker, downsample, to_mono};
use crate::config::AudioConfig;
use crate::error::{BridgeError, Result};
use cpal::StreamConfig;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Audio capture from the system microphone via cpal.
///
/// Holds the exclusive OS handle to the microphone for its lifetime; the
/// handle is released when `run` returns.
pub struct CpalCapture {
    device: cpal::Device,
    stream_config: StreamConfig,
    /// The sample rate the session expects (16kHz).
    target_sample_rate: u32,
    /// Samples per emitted frame at the target rate.
    frame_samples: usize,
}

impl CpalCapture {
    /// Create a new capture instance.
    ///
    /// Uses the device's default configuration for maximum compatibility,
    /// then downsamples to the target rate in software.
    ///
    /// # Errors
    ///
    /// Returns an error if no input device is available. This aborts the
    /// whole connect attempt; the session is never opened.
    pub fn new(config: &AudioConfig) -> Result<Self> {
        let host = cpal::default_host();

        let device = if let Some(ref name) = config.input_device {
            host.input_devices()
                .map_err(|e| BridgeError::Audio(format!("cannot enumerate devices: {e}")))?
                .find(|d| {
                    d.description()
                        .ok()
                        .map(|desc| desc.name() == name)
                        .unwrap_or(false)
                })
                .ok_or_else(|| BridgeError::Audio(format!("input device '{name}' not found")))?
        } else {
            host.default_input_device()
                .ok_or_else(|| BridgeError::Audio("no default input device".into()))?
        };

        let device_name = device
            .description()
            .map(|d| d.name().to_owned())
            .unwrap_or_else(|_| "<unknown>".into());
        info!("using input device: {device_name}");

        let default_config = device
            .default_input_config()
            .map_err(|e| BridgeError::Audio(format!("no default input config: {e}")))?;

        let native_rate = default_config.sample_rate();
        let native_channels = default_config.channels();

        let stream_config = StreamConfig {
            channels: native_channels,
            sample_rate: native_rate,
            buffer_size: cpal::BufferSize::Default,
        };

        info!(
            "native input config: {}Hz, {} channels",
            native_rate, native_channels
        );

        Ok(Self {
            device,
            stream_config,
            target_sample_rate: config.input_sample_rate,
            frame_samples: config.frame_samples,
        })
    }

    /// Run the capture loop, sending encoded frames to the provided channel.
    ///
    /// Frames are emitted in capture order. The channel is unbounded: once
    /// capture has started no frame is dropped, frames are only delayed until
    /// the session writer drains them.
    ///
    /// Blocks until the cancellation token is triggered.
    ///
    /// # Errors
    ///
    /// Returns an error if the audio stream cannot be created.
    pub async fn run(
        &self,
        tx: mpsc::UnboundedSender<AudioFrame>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let native_rate = self.stream_config.sample_rate;
        let native_channels = self.stream_config.channels;
        let target_rate = self.target_sample_rate;
        let chunker = Mutex::new(FrameChunker::new(self.frame_samples));

        let stream = self
            .device
            .build_input_stream(
                &self.stream_config,
                move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                    let mono = if native_channels > 1 {
                        to_mono(data, native_channels)
                    } else {
                        data.to_vec()
                    };

                    let samples = if native_rate != target_rate {
                        downsample(&mono, native_rate, target_rate)
                    } else {
                        mono
                    };

                    let mut chunker = match chunker.lock() {
                        Ok(c) => c,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                    for frame in chunker.push(&samples) {
                        if tx.send(frame).is_err() {
                            // Session writer is gone; frames are discarded
                            // until the stream is torn down.
                            return;
                        }
                    }
                },
                move |err| {
                    error!("audio input stream error: {err}");
                },
                None,
            )
            .map_err(|e| BridgeError::Audio(format!("failed to build input stream: {e}")))?;

        stream
            .play()
            .map_err(|e| BridgeError::Audio(format!("failed to start input stream: {e}")))?;

        info!(
            "audio capture started: native {}Hz -> target {}Hz, {} samples/frame",
            native_rate, target_rate, self.frame_samples
        );

        // Hold the stream alive until cancelled.
        cancel.cancelled().await;

        drop(stream);
        info!("audio capture stopped, microphone released");
        Ok(())
    }

    /// List available input devices.
    ///
    /// # Errors
    ///
    /// Returns an error if devices cannot be enumerated.
    pub fn list_input_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|e| BridgeError::Audio(format!("cannot enumerate devices: {e}")))?;

        let mut names = Vec::new();
        for device in devices {
            if let Ok(desc) = device.description() {
                names.push(desc.name().to_owned());
            }
        }
        Ok(names)
    }
}
