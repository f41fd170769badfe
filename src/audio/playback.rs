//! Gapless playback of synthesized-audio chunks via cpal.
//!
//! Chunks arrive from the network in discrete, irregularly-timed messages.
//! Each is scheduled at `start = max(now, next_start)` on a monotonic sample
//! clock, then `next_start` advances by the chunk's duration. Chunks play
//! back-to-back in arrival order with no overlap; a gap opens only when
//! arrival is slower than consumption.

use crate::config::AudioConfig;
use crate::error::{BridgeError, Result};
use cpal::StreamConfig;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// How close (in seconds) a chunk's end must be to `next_start` for the
/// queue to count as drained and the speaking flag to clear.
const DRAIN_TOLERANCE: f64 = 0.1;

/// Monotonically-advancing schedule for the playback queue.
///
/// Pure time arithmetic; the audio callback drives it with the sample clock.
#[derive(Debug)]
pub struct PlaybackClock {
    next_start: f64,
}

impl PlaybackClock {
    #[must_use]
    pub fn new() -> Self {
        Self { next_start: 0.0 }
    }

    /// Earliest time the next chunk may start.
    #[must_use]
    pub fn next_start(&self) -> f64 {
        self.next_start
    }

    /// Reset to zero (session open).
    pub fn reset(&mut self) {
        self.next_start = 0.0;
    }

    /// Schedule a chunk of `duration` seconds at clock time `now`; returns
    /// its start time.
    pub fn schedule(&mut self, now: f64, duration: f64) -> f64 {
        let start = now.max(self.next_start);
        self.next_start = start + duration;
        start
    }

    /// Whether the queue has drained once playback reaches `now`.
    #[must_use]
    pub fn drained(&self, now: f64) -> bool {
        now >= self.next_start - DRAIN_TOLERANCE
    }
}

impl Default for PlaybackClock {
    fn default() -> Self {
        Self::new()
    }
}

/// A decoded chunk pinned to its scheduled start on the sample clock.
struct ScheduledChunk {
    start_sample: u64,
    samples: Vec<f32>,
    position: usize,
}

/// Shared state between the scheduling side and the audio callback.
struct SchedulerState {
    clock: PlaybackClock,
    queue: VecDeque<ScheduledChunk>,
    /// Samples emitted since the session opened; the playback clock.
    clock_samples: u64,
    sample_rate: u32,
}

impl SchedulerState {
    fn new(sample_rate: u32) -> Self {
        Self {
            clock: PlaybackClock::new(),
            queue: VecDeque::new(),
            clock_samples: 0,
            sample_rate,
        }
    }

    fn now(&self) -> f64 {
        self.clock_samples as f64 / f64::from(self.sample_rate)
    }

    /// Schedule a decoded chunk for playback. Returns its start time.
    fn enqueue(&mut self, samples: Vec<f32>) -> f64 {
        let duration = samples.len() as f64 / f64::from(self.sample_rate);
        let start = self.clock.schedule(self.now(), duration);
        self.queue.push_back(ScheduledChunk {
            start_sample: (start * f64::from(self.sample_rate)).round() as u64,
            samples,
            position: 0,
        });
        start
    }

    /// Fill an output buffer from the queue, advancing the clock.
    ///
    /// Returns `true` if the queue drained during this fill (a chunk ended
    /// with playback within tolerance of `next_start`).
    fn fill(&mut self, out: &mut [f32]) -> bool {
        let mut drained = false;
        for slot in out.iter_mut() {
            let t = self.clock_samples;
            let mut value = 0.0;

            if let Some(front) = self.queue.front_mut()
                && front.start_sample <= t
            {
                value = front.samples[front.position];
                front.position += 1;
                if front.position >= front.samples.len() {
                    self.queue.pop_front();
                    // Chunk completion: at this instant the clock sits at
                    // the chunk's end time.
                    let now = (t + 1) as f64 / f64::from(self.sample_rate);
                    if self.queue.is_empty() && self.clock.drained(now) {
                        drained = true;
                    }
                }
            }

            *slot = value;
            self.clock_samples += 1;
        }
        drained
    }

    fn reset(&mut self) {
        self.queue.clear();
        self.clock.reset();
        self.clock_samples = 0;
    }
}

/// Clonable handle for feeding the playback scheduler.
#[derive(Clone)]
pub struct PlaybackHandle {
    state: Arc<Mutex<SchedulerState>>,
    speaking_tx: watch::Sender<bool>,
}

impl PlaybackHandle {
    /// Schedule a decoded chunk and raise the speaking flag.
    pub fn enqueue(&self, samples: Vec<f32>) {
        if samples.is_empty() {
            return;
        }
        let mut state = lock(&self.state);
        state.enqueue(samples);
        let _ = self.speaking_tx.send(true);
    }

    /// Drop all queued audio and zero the playback clock.
    pub fn reset(&self) {
        lock(&self.state).reset();
        let _ = self.speaking_tx.send(false);
    }

    /// Watch the speaking indicator: true from the first scheduled chunk of
    /// a turn until the queue drains.
    #[must_use]
    pub fn speaking(&self) -> watch::Receiver<bool> {
        self.speaking_tx.subscribe()
    }
}

fn lock(state: &Arc<Mutex<SchedulerState>>) -> std::sync::MutexGuard<'_, SchedulerState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Fill one output buffer and clear the speaking flag on drain.
///
/// The flag is cleared while the scheduler lock is still held, so an
/// `enqueue` racing the drain cannot land between drain detection and the
/// clear.
fn fill_and_flag(
    state: &Arc<Mutex<SchedulerState>>,
    speaking_tx: &watch::Sender<bool>,
    out: &mut [f32],
) {
    let mut scheduler = lock(state);
    if scheduler.fill(out) {
        let _ = speaking_tx.send(false);
    }
}

/// Audio playback to system speakers via cpal.
pub struct CpalPlayback {
    device: cpal::Device,
    stream_config: StreamConfig,
    state: Arc<Mutex<SchedulerState>>,
    speaking_tx: watch::Sender<bool>,
}

impl CpalPlayback {
    /// Create a new playback scheduler at the configured output rate.
    ///
    /// # Errors
    ///
    /// Returns an error if no output device is available.
    pub fn new(config: &AudioConfig) -> Result<Self> {
        let host = cpal::default_host();

        let device = if let Some(ref name) = config.output_device {
            host.output_devices()
                .map_err(|e| BridgeError::Audio(format!("cannot enumerate devices: {e}")))?
                .find(|d| {
                    d.description()
                        .ok()
                        .map(|desc| desc.name() == name)
                        .unwrap_or(false)
                })
                .ok_or_else(|| BridgeError::Audio(format!("output device '{name}' not found")))?
        } else {
            host.default_output_device()
                .ok_or_else(|| BridgeError::Audio("no default output device".into()))?
        };

        let device_name = device
            .description()
            .map(|d| d.name().to_owned())
            .unwrap_or_else(|_| "<unknown>".into());
        info!("using output device: {device_name}");

        let stream_config = StreamConfig {
            channels: 1,
            sample_rate: config.output_sample_rate,
            buffer_size: cpal::BufferSize::Default,
        };

        let (speaking_tx, _) = watch::channel(false);

        Ok(Self {
            device,
            stream_config,
            state: Arc::new(Mutex::new(SchedulerState::new(config.output_sample_rate))),
            speaking_tx,
        })
    }

    /// Handle for scheduling chunks from the session reader.
    #[must_use]
    pub fn handle(&self) -> PlaybackHandle {
        PlaybackHandle {
            state: Arc::clone(&self.state),
            speaking_tx: self.speaking_tx.clone(),
        }
    }

    /// Run the output stream until cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error if the audio stream cannot be created or started.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        let state = Arc::clone(&self.state);
        let speaking_tx = self.speaking_tx.clone();

        let stream = self
            .device
            .build_output_stream(
                &self.stream_config,
                move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                    fill_and_flag(&state, &speaking_tx, data);
                },
                move |err| {
                    error!("audio output stream error: {err}");
                },
                None,
            )
            .map_err(|e| BridgeError::Audio(format!("failed to build output stream: {e}")))?;

        stream
            .play()
            .map_err(|e| BridgeError::Audio(format!("failed to start output stream: {e}")))?;

        info!(
            "playback scheduler started at {}Hz",
            self.stream_config.sample_rate
        );

        cancel.cancelled().await;

        drop(stream);
        info!("playback stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn chunks_never_overlap() {
        let mut clock = PlaybackClock::new();
        let first = clock.schedule(0.0, 0.5);
        let second = clock.schedule(0.1, 0.3);
        let third = clock.schedule(0.2, 0.2);
        assert_eq!(first, 0.0);
        // Arrived while the first chunk still plays: queued right behind it.
        assert_eq!(second, 0.5);
        assert_eq!(third, 0.8);
    }

    #[test]
    fn late_arrival_starts_immediately() {
        let mut clock = PlaybackClock::new();
        clock.schedule(0.0, 0.2);
        // Arrives after the queue ran dry: plays at the current clock time,
        // accepting the gap rather than glitching.
        let start = clock.schedule(1.0, 0.2);
        assert_eq!(start, 1.0);
        assert_eq!(clock.next_start(), 1.2);
    }

    #[test]
    fn prompt_arrivals_leave_no_gap() {
        let mut clock = PlaybackClock::new();
        let mut end = 0.0;
        for i in 0..10 {
            let now = i as f64 * 0.05; // chunks arrive faster than playback
            let start = clock.schedule(now, 0.1);
            assert!(start >= end, "no overlap");
            assert!(start - end < f64::EPSILON, "no gap injected");
            end = start + 0.1;
        }
    }

    #[test]
    fn reset_zeroes_the_clock() {
        let mut clock = PlaybackClock::new();
        clock.schedule(0.0, 3.0);
        clock.reset();
        assert_eq!(clock.next_start(), 0.0);
    }

    #[test]
    fn fill_plays_queued_chunks_back_to_back() {
        let mut state = SchedulerState::new(10);
        state.enqueue(vec![0.1; 5]);
        state.enqueue(vec![0.2; 5]);

        let mut out = [0.0f32; 10];
        let drained = state.fill(&mut out);
        assert_eq!(&out[..5], &[0.1; 5]);
        assert_eq!(&out[5..], &[0.2; 5]);
        // Queue emptied exactly at next_start: drained.
        assert!(drained);
    }

    #[test]
    fn fill_emits_silence_while_queue_empty() {
        let mut state = SchedulerState::new(10);
        let mut out = [1.0f32; 4];
        state.fill(&mut out);
        assert_eq!(out, [0.0; 4]);

        // A chunk arriving after silence starts at the current clock.
        assert!((state.now() - 0.4).abs() < 1e-9);
        let start = state.enqueue(vec![0.5; 2]);
        assert!((start - 0.4).abs() < 1e-9);
        let mut out = [0.0f32; 2];
        state.fill(&mut out);
        assert_eq!(out, [0.5; 2]);
    }

    #[test]
    fn speaking_flag_follows_fill_through_the_lock() {
        let state = Arc::new(Mutex::new(SchedulerState::new(10)));
        let (speaking_tx, speaking_rx) = watch::channel(false);
        let handle = PlaybackHandle {
            state: Arc::clone(&state),
            speaking_tx: speaking_tx.clone(),
        };

        handle.enqueue(vec![0.1; 5]);
        assert!(*speaking_rx.borrow());

        let mut out = [0.0f32; 5];
        fill_and_flag(&state, &speaking_tx, &mut out);
        assert!(!*speaking_rx.borrow());

        // A chunk scheduled after the drain raises the flag again; the
        // drain's clear never overwrites it.
        handle.enqueue(vec![0.2; 5]);
        assert!(*speaking_rx.borrow());
        fill_and_flag(&state, &speaking_tx, &mut out);
        assert!(!*speaking_rx.borrow());
    }

    #[test]
    fn speaking_clears_only_when_drained() {
        let mut state = SchedulerState::new(10);
        state.enqueue(vec![0.1; 5]);
        state.enqueue(vec![0.2; 5]);

        let mut out = [0.0f32; 5];
        // First chunk ends but the second is queued: not drained.
        assert!(!state.fill(&mut out));
        // Second chunk ends with nothing behind it: drained.
        assert!(state.fill(&mut out));
    }
}
