//! Fixed-capacity single-producer/single-consumer sample buffer with
//! overwrite-oldest on overflow. Backs both the capture and playback paths.
//!
//! Lock discipline: a single short mutex around index arithmetic and a
//! slice copy is enough as long as the critical section stays bounded to
//! that arithmetic and a memcpy. Never allocates inside the critical
//! section.

use std::sync::Mutex;

struct Inner {
    buf: Vec<i16>,
    /// write index, always in [0, capacity)
    w: usize,
    /// read index, always in [0, capacity)
    r: usize,
    /// unread sample count, in [0, capacity]
    count: usize,
    volume: f32,
}

/// Circular sample buffer. `write`/`append` are the producer side (audio
/// callback or feeder thread); `read`/`copy_chunk` are the consumer side.
pub struct RingBuffer {
    inner: Mutex<Inner>,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Inner {
                buf: vec![0i16; capacity],
                w: 0,
                r: 0,
                count: 0,
                volume: 1.0,
            }),
        }
    }

    pub fn set_volume(&self, volume: f32) {
        self.inner.lock().unwrap().volume = volume;
    }

    /// Convert each float to i16 by clamping to [-1, 1] then scaling by
    /// 32767, and append. Caller: audio capture callback.
    pub fn write(&self, samples: &[f32]) {
        let mut inner = self.inner.lock().unwrap();
        for &s in samples {
            let clamped = s.clamp(-1.0, 1.0);
            let sample = (clamped * 32767.0) as i16;
            Self::push_one(&mut inner, sample);
        }
    }

    /// Append raw i16 samples, same overflow policy as `write`. Caller:
    /// playback feeder thread.
    pub fn append(&self, samples: &[i16]) {
        let mut inner = self.inner.lock().unwrap();
        for &s in samples {
            Self::push_one(&mut inner, s);
        }
    }

    fn push_one(inner: &mut Inner, sample: i16) {
        let cap = inner.buf.len();
        inner.buf[inner.w] = sample;
        inner.w = (inner.w + 1) % cap;
        if inner.count == cap {
            // full: drop oldest by advancing the read index too.
            inner.r = (inner.r + 1) % cap;
        } else {
            inner.count += 1;
        }
    }

    /// Fill `out` with `sample / 32767 * volume`; pad with silence once
    /// exhausted. Caller: audio playback callback. Never blocks on empty
    /// data, never panics.
    pub fn read(&self, out: &mut [f32]) {
        let mut inner = self.inner.lock().unwrap();
        let volume = inner.volume;
        for slot in out.iter_mut() {
            if inner.count > 0 {
                let cap = inner.buf.len();
                let sample = inner.buf[inner.r];
                inner.r = (inner.r + 1) % cap;
                inner.count -= 1;
                *slot = sample as f32 / 32767.0 * volume;
            } else {
                *slot = 0.0;
            }
        }
    }

    /// Copy up to `dest.len()` samples out, advancing the read index.
    /// Returns the number of samples actually copied.
    pub fn copy_chunk(&self, dest: &mut [i16]) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let to_copy = dest.len().min(inner.count);
        let cap = inner.buf.len();
        for slot in dest.iter_mut().take(to_copy) {
            *slot = inner.buf[inner.r];
            inner.r = (inner.r + 1) % cap;
        }
        inner.count -= to_copy;
        to_copy
    }

    /// Unread sample count.
    pub fn available(&self) -> usize {
        self.inner.lock().unwrap().count
    }

    /// Reallocate to a new capacity, zeroing indices.
    pub fn reset(&self, new_capacity: usize) {
        let new_capacity = new_capacity.max(1);
        let mut inner = self.inner.lock().unwrap();
        inner.buf = vec![0i16; new_capacity];
        inner.w = 0;
        inner.r = 0;
        inner.count = 0;
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().unwrap().buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_empty() {
        let rb = RingBuffer::new(10);
        assert_eq!(rb.available(), 0);
        let mut out = [1.0f32; 4];
        rb.read(&mut out);
        assert_eq!(out, [0.0; 4]);
    }

    #[test]
    fn overflow_retains_most_recent() {
        // capacity 10, write [1..20], read 10 -> [11..20]
        let rb = RingBuffer::new(10);
        let samples: Vec<i16> = (1..=20).collect();
        rb.append(&samples);
        assert_eq!(rb.available(), 10);
        let mut out = [0i16; 10];
        let n = rb.copy_chunk(&mut out);
        assert_eq!(n, 10);
        let expected: Vec<i16> = (11..=20).collect();
        assert_eq!(out.to_vec(), expected);
    }

    #[test]
    fn read_pads_silence_after_exhaustion() {
        let rb = RingBuffer::new(8);
        rb.append(&[100, 200, 300]);
        let mut out = [0.0f32; 5];
        rb.read(&mut out);
        assert_eq!(out[0], 100.0 / 32767.0);
        assert_eq!(out[1], 200.0 / 32767.0);
        assert_eq!(out[2], 300.0 / 32767.0);
        assert_eq!(out[3], 0.0);
        assert_eq!(out[4], 0.0);
    }

    #[test]
    fn float_write_clamps_and_scales() {
        let rb = RingBuffer::new(8);
        rb.write(&[2.0, -2.0, 0.5]);
        let mut out = [0i16; 3];
        rb.copy_chunk(&mut out);
        assert_eq!(out[0], 32767);
        assert_eq!(out[1], -32767);
        assert_eq!(out[2], (0.5 * 32767.0) as i16);
    }

    #[test]
    fn reset_reallocates_and_clears() {
        let rb = RingBuffer::new(4);
        rb.append(&[1, 2, 3]);
        rb.reset(16);
        assert_eq!(rb.capacity(), 16);
        assert_eq!(rb.available(), 0);
    }
}
