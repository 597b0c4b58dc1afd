//! PCM <-> encoded frame bytes. A `CodecSession` pairs a stateful Opus
//! encoder and decoder behind one fixed {sample rate, channels, bitrate,
//! frame duration}; state carries across frames, since rebuilding per-frame
//! causes audible discontinuities.

use byteorder::{BigEndian, ByteOrder};
use opus::{Application, Channels, Decoder as OpusDecoder, Encoder as OpusEncoder};

use crate::config::{AudioConfig, MAX_DECOMPRESS_SAMPLES, MAX_ENCODED_FRAME_SIZE, MAX_FRAME_SAMPLES};
use crate::error::CodecError;

fn opus_channels(channels: u16) -> Channels {
    if channels >= 2 {
        Channels::Stereo
    } else {
        Channels::Mono
    }
}

pub struct CodecSession {
    encoder: OpusEncoder,
    decoder: OpusDecoder,
    samples_per_frame: usize,
    channels: u16,
}

impl CodecSession {
    pub fn new(cfg: &AudioConfig) -> Result<Self, CodecError> {
        let channels = opus_channels(cfg.channels);
        let mut encoder = OpusEncoder::new(cfg.sample_rate, channels, Application::Voip)
            .map_err(|_| CodecError::SetupFailed)?;
        encoder
            .set_bitrate(opus::Bitrate::Bits(cfg.bitrate))
            .map_err(|_| CodecError::SetupFailed)?;
        let decoder =
            OpusDecoder::new(cfg.sample_rate, channels).map_err(|_| CodecError::SetupFailed)?;

        Ok(Self {
            encoder,
            decoder,
            samples_per_frame: cfg.samples_per_frame(),
            channels: cfg.channels,
        })
    }

    /// Split `pcm` into fixed-size codec frames, encode each, and
    /// concatenate as {2-byte big-endian length, payload} records. Samples
    /// past the last whole frame are discarded. A frame that fails to
    /// encode is skipped and logged; processing continues.
    pub fn compress(&mut self, pcm: &[i16]) -> Result<Vec<u8>, CodecError> {
        if pcm.is_empty() {
            return Err(CodecError::EmptyInput);
        }

        let mut out = Vec::new();
        let mut scratch = vec![0u8; MAX_ENCODED_FRAME_SIZE];

        for frame in pcm.chunks_exact(self.samples_per_frame) {
            match self.encoder.encode(frame, &mut scratch) {
                Ok(n) => {
                    if n == 0 || n > MAX_ENCODED_FRAME_SIZE {
                        log::warn!("opus encoder produced out-of-range frame length {n}, skipping");
                        continue;
                    }
                    let mut len_buf = [0u8; 2];
                    BigEndian::write_u16(&mut len_buf, n as u16);
                    out.extend_from_slice(&len_buf);
                    out.extend_from_slice(&scratch[..n]);
                }
                Err(e) => {
                    let err = CodecError::EncodeFailed(e.to_string());
                    log::warn!("{err}, skipping frame");
                }
            }
        }
        Ok(out)
    }

    /// Walk 2-byte-length-prefixed records, decoding each into PCM and
    /// appending to the output. Corrupt or over-sized length fields stop
    /// processing; per-packet decode failures are skipped. Hard-caps total
    /// output at `MAX_DECOMPRESS_SAMPLES`.
    pub fn decompress(&mut self, data: &[u8]) -> Result<Vec<i16>, CodecError> {
        if data.is_empty() {
            return Err(CodecError::EmptyInput);
        }

        let mut out = Vec::new();
        let mut scratch = vec![0i16; MAX_FRAME_SAMPLES * self.channels.max(1) as usize];
        let mut pos = 0usize;

        while pos + 2 <= data.len() {
            let n = BigEndian::read_u16(&data[pos..pos + 2]) as usize;
            pos += 2;

            if n == 0 || n > MAX_ENCODED_FRAME_SIZE || pos + n > data.len() {
                break;
            }

            match self.decoder.decode(&data[pos..pos + n], &mut scratch, false) {
                Ok(samples) => {
                    out.extend_from_slice(&scratch[..samples]);
                }
                Err(e) => {
                    let err = CodecError::DecodeFailed(e.to_string());
                    log::warn!("{err}, skipping packet");
                }
            }
            pos += n;

            if out.len() >= MAX_DECOMPRESS_SAMPLES {
                log::warn!("decompress output hit the {} sample cap, stopping", MAX_DECOMPRESS_SAMPLES);
                out.truncate(MAX_DECOMPRESS_SAMPLES);
                break;
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine_wave(samples: usize, freq_hz: f64, sample_rate: f64, amplitude: f64) -> Vec<i16> {
        (0..samples)
            .map(|i| {
                let t = i as f64 / sample_rate;
                (amplitude * (2.0 * std::f64::consts::PI * freq_hz * t).sin() * i16::MAX as f64) as i16
            })
            .collect()
    }

    #[test]
    fn round_trip_sine_wave_preserves_length_and_fidelity() {
        let cfg = AudioConfig::default();
        let mut codec = CodecSession::new(&cfg).expect("codec setup");

        let pcm = sine_wave(48_000, 440.0, 48_000.0, 0.5);
        let compressed = codec.compress(&pcm).expect("compress");
        let decoded = codec.decompress(&compressed).expect("decompress");

        let whole_frames = pcm.len() / cfg.samples_per_frame() * cfg.samples_per_frame();
        assert!(decoded.len() <= pcm.len());
        assert!(decoded.len() > 0);
        assert!(decoded.len() <= whole_frames);

        // Mean-squared error should be low for a clean sine at this bitrate.
        let n = decoded.len().min(pcm.len());
        let mse: f64 = (0..n)
            .map(|i| {
                let diff = decoded[i] as f64 - pcm[i] as f64;
                diff * diff
            })
            .sum::<f64>()
            / n as f64;
        assert!(mse < 5_000_000.0, "mse too high: {mse}");
    }

    #[test]
    fn empty_input_is_rejected() {
        let cfg = AudioConfig::default();
        let mut codec = CodecSession::new(&cfg).unwrap();
        assert!(codec.compress(&[]).is_err());
        assert!(codec.decompress(&[]).is_err());
    }

    #[test]
    fn corrupt_length_prefix_stops_without_panicking() {
        let cfg = AudioConfig::default();
        let mut codec = CodecSession::new(&cfg).unwrap();
        let garbage = vec![0xFFu8, 0xFF, 1, 2, 3];
        let result = codec.decompress(&garbage).unwrap();
        assert!(result.is_empty());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::collection::vec as pvec;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        /// For any non-empty PCM buffer, compress never produces more whole
        /// frames of output than whole frames of input, and decompress never
        /// panics on whatever compress produced.
        #[test]
        fn compress_decompress_never_panics_for_any_pcm(
            pcm in pvec(any::<i16>(), 1..4000)
        ) {
            let cfg = AudioConfig::default();
            let mut codec = CodecSession::new(&cfg).unwrap();
            let compressed = codec.compress(&pcm).unwrap();
            let decoded = codec.decompress(&compressed).unwrap();
            prop_assert!(decoded.len() <= MAX_DECOMPRESS_SAMPLES);
        }

        /// Arbitrary garbage handed to decompress never panics and never
        /// exceeds the decompressed-output cap.
        #[test]
        fn decompress_never_panics_on_arbitrary_bytes(
            garbage in pvec(any::<u8>(), 0..2000)
        ) {
            let cfg = AudioConfig::default();
            let mut codec = CodecSession::new(&cfg).unwrap();
            if garbage.is_empty() {
                prop_assert!(codec.decompress(&garbage).is_err());
            } else {
                let decoded = codec.decompress(&garbage).unwrap();
                prop_assert!(decoded.len() <= MAX_DECOMPRESS_SAMPLES);
            }
        }
    }
}
