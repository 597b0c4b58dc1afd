//! Centralized configuration for the voice pipeline.
//!
//! A handful of tuning constants plus a small `Copy` struct so the rest of
//! the crate never hardcodes a magic number a second time.

// --- Buffer & Channel Limits ---

/// Minimum ring buffer capacity: one second of samples at 48kHz mono.
pub const MIN_RING_CAPACITY_SAMPLES: usize = 48_000;

/// Maximum size of a raw Opus encoded packet; anything larger is treated as
/// corrupt.
pub const MAX_ENCODED_FRAME_SIZE: usize = 4000;

/// Opus frame sizes are clamped to this range of samples per channel.
pub const MIN_FRAME_SAMPLES: usize = 120;
pub const MAX_FRAME_SAMPLES: usize = 480;

/// Hard cap on decompressed output: 5 seconds of samples.
pub const MAX_DECOMPRESS_SAMPLES: usize = 48_000 * 5;

// --- Tuning Parameters ---

/// How many ticks of silence (missing/short ring reads) before we log an
/// underrun at debug rather than spamming.
pub const CAPTURE_UNDERRUN_LOG_EVERY: u32 = 25;

/// Bounded queue push wait before a drop is declared.
pub const QUEUE_PUSH_WAIT: std::time::Duration = std::time::Duration::from_millis(75);

/// Feeder per-chunk wall-clock timeout multiplier (2x frame duration).
pub const FEEDER_TIMEOUT_MULTIPLIER: u32 = 2;

/// A session-wide, `Copy` set of tunables.
#[derive(Debug, Clone, Copy)]
pub struct AudioConfig {
    /// Sample rate in Hz. Fixed at 48000.
    pub sample_rate: u32,
    /// Channel count. Fixed at 1 (mono).
    pub channels: u16,
    /// Codec frame duration in milliseconds.
    pub frame_ms: u32,
    /// Number of encoded+encrypted chunks per wire batch.
    pub batch_size: usize,
    /// PCM chunks buffered before playback starts.
    pub prebuffer_packets: usize,
    /// Opus target bitrate in bits/sec.
    pub bitrate: i32,
    /// Ring buffer capacity, expressed in seconds of audio.
    pub ring_capacity_secs: f32,
    /// Bounded queue capacity (chunks).
    pub queue_capacity: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 1,
            frame_ms: 40,
            batch_size: 8,
            prebuffer_packets: 3,
            bitrate: 32_000,
            ring_capacity_secs: 1.0,
            queue_capacity: 100,
        }
    }
}

impl AudioConfig {
    /// Number of PCM samples (per channel) in one codec frame, clamped to
    /// the codec's supported frame-size range.
    pub fn samples_per_frame(&self) -> usize {
        let raw = (self.frame_ms as usize * self.sample_rate as usize / 1000) * self.channels as usize;
        raw.clamp(MIN_FRAME_SAMPLES, MAX_FRAME_SAMPLES)
    }

    /// Ring buffer capacity in samples, never below one second of audio.
    pub fn ring_capacity_samples(&self) -> usize {
        let raw = (self.sample_rate as f32 * self.ring_capacity_secs) as usize * self.channels as usize;
        raw.max(MIN_RING_CAPACITY_SAMPLES)
    }
}
