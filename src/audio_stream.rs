//! Owns the capture thread (ring -> encode -> VoiceQueue), the playback
//! feeder thread (PCMQueue -> ring), and the decoder thread (AudioQueue ->
//! decode -> PCMQueue); manages pre-roll.
//!
//! Device callbacks only ever touch a ring buffer through a weak handle —
//! they must never outlive the `AudioStream` that owns the strong
//! reference.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::codec::CodecSession;
use crate::config::AudioConfig;
use crate::error::AudioError;
use crate::queue::{Queue, POLL_SLEEP};
use crate::ring_buffer::RingBuffer;
use crate::runtime::AudioRuntime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Running,
    Draining,
    Closed,
}

pub struct AudioStream {
    cfg: AudioConfig,
    capture_ring: Arc<RingBuffer>,
    playback_ring: Arc<RingBuffer>,
    /// outbound encoded frames, produced by the capture/encode thread
    pub voice_queue: Arc<Queue<Vec<u8>>>,
    /// inbound decrypted-but-still-encoded batch members, fed by Session
    pub audio_queue: Arc<Queue<Vec<u8>>>,
    /// decoded PCM awaiting playback
    pcm_queue: Arc<Queue<Vec<i16>>>,

    encode_codec: Arc<Mutex<CodecSession>>,
    decode_codec: Arc<Mutex<CodecSession>>,

    state: Mutex<StreamState>,
    stop: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
    input_stream: Option<cpal::Stream>,
    output_stream: Option<cpal::Stream>,
    _runtime: Option<AudioRuntime>,
}

impl AudioStream {
    pub fn new(
        cfg: AudioConfig,
        encode_codec: Arc<Mutex<CodecSession>>,
        decode_codec: Arc<Mutex<CodecSession>>,
    ) -> Self {
        let ring_capacity = cfg.ring_capacity_samples();
        Self {
            cfg,
            capture_ring: Arc::new(RingBuffer::new(ring_capacity)),
            playback_ring: Arc::new(RingBuffer::new(ring_capacity)),
            voice_queue: Arc::new(Queue::new(cfg.queue_capacity)),
            audio_queue: Arc::new(Queue::new(cfg.queue_capacity)),
            pcm_queue: Arc::new(Queue::new(cfg.queue_capacity)),
            encode_codec,
            decode_codec,
            state: Mutex::new(StreamState::Idle),
            stop: Arc::new(AtomicBool::new(false)),
            threads: Vec::new(),
            input_stream: None,
            output_stream: None,
            _runtime: None,
        }
    }

    pub fn state(&self) -> StreamState {
        *self.state.lock().unwrap()
    }

    /// Idle -> Running: opens devices, spawns the capture-encode ticker,
    /// decoder, and feeder threads.
    pub fn start(&mut self) -> Result<(), AudioError> {
        {
            let mut state = self.state.lock().unwrap();
            if *state != StreamState::Idle {
                return Ok(());
            }
            *state = StreamState::Running;
        }
        self._runtime = Some(AudioRuntime::acquire());
        self.stop.store(false, Ordering::SeqCst);

        self.input_stream = Some(self.open_input_stream()?);
        self.output_stream = Some(self.open_output_stream()?);

        self.threads.push(self.spawn_capture_ticker());
        self.threads.push(self.spawn_decoder_thread());
        self.threads.push(self.spawn_feeder_thread());

        Ok(())
    }

    fn open_input_stream(&self) -> Result<cpal::Stream, AudioError> {
        let host = cpal::default_host();
        let device = host.default_input_device().ok_or(AudioError::DeviceError)?;
        let config = cpal::StreamConfig {
            channels: self.cfg.channels,
            sample_rate: cpal::SampleRate(self.cfg.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let ring: Weak<RingBuffer> = Arc::downgrade(&self.capture_ring);
        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Some(ring) = ring.upgrade() {
                        ring.write(data);
                    }
                },
                move |err| log::error!("capture stream error: {err}"),
                None,
            )
            .map_err(|e| {
                log::error!("open input stream error: {e}");
                AudioError::DeviceError
            })?;

        stream.play().map_err(|_| AudioError::StreamStartError)?;
        Ok(stream)
    }

    fn open_output_stream(&self) -> Result<cpal::Stream, AudioError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(AudioError::DeviceError)?;
        let config = cpal::StreamConfig {
            channels: self.cfg.channels,
            sample_rate: cpal::SampleRate(self.cfg.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let ring: Weak<RingBuffer> = Arc::downgrade(&self.playback_ring);
        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if let Some(ring) = ring.upgrade() {
                        ring.read(data);
                    } else {
                        data.fill(0.0);
                    }
                },
                move |err| log::error!("playback stream error: {err}"),
                None,
            )
            .map_err(|e| {
                log::error!("open output stream error: {e}");
                AudioError::DeviceError
            })?;

        stream.play().map_err(|_| AudioError::StreamStartError)?;
        Ok(stream)
    }

    /// Wakes every `frame_ms`; if the ring holds a whole frame, copies it
    /// out, encodes via the codec, and pushes to VoiceQueue. Skips the tick
    /// when the ring is short, logging an underrun at debug every
    /// `CAPTURE_UNDERRUN_LOG_EVERY`th occurrence rather than on every tick.
    fn spawn_capture_ticker(&self) -> JoinHandle<()> {
        let samples_per_frame = self.cfg.samples_per_frame();
        let tick = Duration::from_millis(self.cfg.frame_ms as u64);
        let ring = self.capture_ring.clone();
        let queue = self.voice_queue.clone();
        let codec = self.encode_codec.clone();
        let stop = self.stop.clone();

        thread::spawn(move || {
            let mut underrun_count: u32 = 0;

            while !stop.load(Ordering::SeqCst) {
                thread::sleep(tick);

                let available = ring.available();
                if available < samples_per_frame {
                    underrun_count += 1;
                    if underrun_count % crate::config::CAPTURE_UNDERRUN_LOG_EVERY == 0 {
                        log::debug!(
                            "capture underrun: ring has {available} of {samples_per_frame} samples ({underrun_count} underruns so far)"
                        );
                    }
                    continue;
                }
                underrun_count = 0;

                let mut chunk = vec![0i16; samples_per_frame];
                let n = ring.copy_chunk(&mut chunk);
                if n < samples_per_frame {
                    continue;
                }

                let encoded = {
                    let mut codec = codec.lock().unwrap();
                    codec.compress(&chunk)
                };
                match encoded {
                    Ok(bytes) if !bytes.is_empty() => {
                        queue.push(bytes);
                    }
                    Ok(_) => {}
                    Err(e) => log::warn!("capture encode failed: {e}"),
                }
            }
        })
    }

    /// Pops encoded batch members from AudioQueue, decodes, and pushes PCM
    /// to PCMQueue. Sleeps briefly and retries when the queue is empty.
    fn spawn_decoder_thread(&self) -> JoinHandle<()> {
        let audio_queue = self.audio_queue.clone();
        let pcm_queue = self.pcm_queue.clone();
        let codec = self.decode_codec.clone();
        let stop = self.stop.clone();

        thread::spawn(move || {
            while !stop.load(Ordering::SeqCst) {
                match audio_queue.pop() {
                    Some(encoded) => {
                        let decoded = {
                            let mut codec = codec.lock().unwrap();
                            codec.decompress(&encoded)
                        };
                        match decoded {
                            Ok(pcm) if !pcm.is_empty() => {
                                pcm_queue.push(pcm);
                            }
                            Ok(_) => {}
                            Err(e) => log::warn!("decode failed, skipping packet: {e}"),
                        }
                    }
                    None => thread::sleep(POLL_SLEEP),
                }
            }
        })
    }

    /// Waits for `prebuffer_packets` PCM chunks before unblocking output,
    /// then appends decoded PCM into the playback ring as it arrives.
    fn spawn_feeder_thread(&self) -> JoinHandle<()> {
        let pcm_queue = self.pcm_queue.clone();
        let ring = self.playback_ring.clone();
        let stop = self.stop.clone();
        let prebuffer = self.cfg.prebuffer_packets;
        let timeout = Duration::from_millis(self.cfg.frame_ms as u64 * crate::config::FEEDER_TIMEOUT_MULTIPLIER as u64);

        thread::spawn(move || {
            while pcm_queue.len() < prebuffer && !stop.load(Ordering::SeqCst) {
                thread::sleep(POLL_SLEEP);
            }
            log::debug!("pre-roll complete, starting playback feeder");

            while !stop.load(Ordering::SeqCst) {
                let start = std::time::Instant::now();
                loop {
                    if let Some(pcm) = pcm_queue.pop() {
                        ring.append(&pcm);
                        break;
                    }
                    if start.elapsed() > timeout {
                        // abandon this wait and check the cancellation flag again
                        break;
                    }
                    thread::sleep(POLL_SLEEP);
                }
            }
        })
    }

    /// Running -> Draining -> Closed: stops spawned threads, flushes the
    /// voice queue, stops and drops the device streams.
    pub fn close(&mut self) {
        {
            let mut state = self.state.lock().unwrap();
            if *state == StreamState::Closed {
                return;
            }
            *state = StreamState::Draining;
        }

        self.stop.store(true, Ordering::SeqCst);
        while self.voice_queue.pop().is_some() {}

        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }

        self.input_stream.take();
        self.output_stream.take();
        self._runtime.take();

        *self.state.lock().unwrap() = StreamState::Closed;
    }
}

impl Drop for AudioStream {
    fn drop(&mut self) {
        self.close();
    }
}
